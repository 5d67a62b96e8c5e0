use crate::models::PetProfile;

const BASE_INSTRUCTION: &str = "你是宠物营养专家。简要回答。\n重要：只输出最终答案，不要输出思考过程、推理过程或任何标签（如<thinking>、<reasoning>等）。";

const OUTPUT_TEMPLATE: &str = "\n格式：\n【风险等级】：[等级]\n【风险点】：[风险]\n【喂养建议】：[建议]";

pub const DEFAULT_PET_NAME: &str = "该宠物";

/// System instruction for one request. The allergy clause only appears when
/// the profile lists at least one allergy.
pub fn build_system_prompt(profile: Option<&PetProfile>) -> String {
    let mut prompt = String::from(BASE_INSTRUCTION);

    if let Some(profile) = profile.filter(|p| !p.allergies().is_empty()) {
        let pet_name = profile
            .name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_PET_NAME);
        prompt.push_str(&format!(
            "\n过敏原：{}对{}过敏。如食物含过敏原，标记【高危预警】，禁止喂食。",
            pet_name,
            profile.allergies().join("、")
        ));
    }

    prompt.push_str(OUTPUT_TEMPLATE);
    prompt
}

/// User turn: the question followed by the knowledge snippet, if any.
pub fn build_user_prompt(question: &str, knowledge: Option<&str>) -> String {
    match knowledge {
        Some(context) => format!("{}{}", question, context),
        None => question.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(name: Option<&str>, allergies: Option<Vec<&str>>) -> PetProfile {
        PetProfile {
            name: name.map(str::to_string),
            allergies: allergies.map(|a| a.into_iter().map(str::to_string).collect()),
            ..Default::default()
        }
    }

    #[test]
    fn test_without_profile() {
        let prompt = build_system_prompt(None);
        assert!(prompt.starts_with(BASE_INSTRUCTION));
        assert!(prompt.ends_with(OUTPUT_TEMPLATE));
        assert!(!prompt.contains("过敏原："));
    }

    #[test]
    fn test_allergy_clause_names_pet_and_every_allergen() {
        let prompt = build_system_prompt(Some(&profile(Some("咪咪"), Some(vec!["鸡肉", "牛奶", "小麦"]))));
        assert!(prompt.contains("过敏原：咪咪对鸡肉、牛奶、小麦过敏。"));
        for term in ["鸡肉", "牛奶", "小麦", "咪咪", "【高危预警】"] {
            assert!(prompt.contains(term), "missing {term}");
        }
        assert!(prompt.ends_with(OUTPUT_TEMPLATE));
    }

    #[test]
    fn test_default_pet_name() {
        for name in [None, Some("")] {
            let prompt = build_system_prompt(Some(&profile(name, Some(vec!["鱼"]))));
            assert!(prompt.contains("该宠物对鱼过敏"));
        }

        let prompt = build_system_prompt(Some(&profile(Some(" "), Some(vec!["鱼"]))));
        assert!(prompt.contains("过敏原： 对鱼过敏"));
    }

    #[test]
    fn test_empty_or_absent_allergies_add_no_clause() {
        for p in [profile(Some("豆豆"), None), profile(Some("豆豆"), Some(vec![]))] {
            let prompt = build_system_prompt(Some(&p));
            assert_eq!(prompt, build_system_prompt(None));
            assert!(!prompt.contains("豆豆"));
        }
    }

    #[test]
    fn test_user_prompt() {
        assert_eq!(build_user_prompt("能吃吗", None), "能吃吗");
        assert_eq!(build_user_prompt("能吃吗", Some("\n参考：x")), "能吃吗\n参考：x");
    }
}
