//! Static pet-food safety facts matched by keyword.
//!
//! Only the first keyword in table order that occurs in the question is
//! used. This is a known limitation: a question naming both "葡萄" and
//! "巧克力" only gets the chocolate fact because it is registered first.

use aho_corasick::AhoCorasick;
use std::sync::LazyLock;

/// Keyword → fact, in registration order.
pub const PET_KNOWLEDGE: &[(&str, &str)] = &[
    ("巧克力", "【高危预警】含可可碱，对宠物有毒，剂量大有生命危险。"),
    ("葡萄", "【高危预警】可能导致肾衰竭，少量也危险。建议立即就医。"),
    ("洋葱", "【高危预警】破坏红细胞，引起贫血，剂量大有生命危险。"),
    ("木糖醇", "【高危预警】导致胰岛素大量分泌，引起低血糖、肝衰竭，对宠物极度危险。"),
    ("牛油果", "【中危预警】含毒性物质persin，虽然狗猫反应较小，但不建议食用。"),
    ("生鸡蛋", "【中危预警】可能含有沙门氏菌，应煮熟，长期食用生蛋白会影响生物素吸收。"),
    ("咖啡", "【高危预警】含咖啡因，可能引起中毒。"),
    ("茶", "【高危预警】含咖啡因。"),
    ("西瓜", "【低风险】少量果肉安全，但种子和瓜皮不宜食用，糖尿病宠物需谨慎。"),
    ("苹果", "【低风险】果肉安全，但果核含有氰化物，必须去除。"),
];

static KEYWORDS: LazyLock<AhoCorasick> = LazyLock::new(|| {
    AhoCorasick::new(PET_KNOWLEDGE.iter().map(|(keyword, _)| keyword.to_lowercase()))
        .expect("Invalid knowledge keyword table")
});

/// Finds the table entry for the earliest-registered keyword contained in
/// `question`, regardless of where in the question it appears.
pub fn find_entry(question: &str) -> Option<(&'static str, &'static str)> {
    let haystack = question.to_lowercase();
    KEYWORDS
        .find_overlapping_iter(&haystack)
        .map(|m| m.pattern().as_usize())
        .min()
        .map(|index| PET_KNOWLEDGE[index])
}

/// Context snippet appended to the user prompt, e.g. `"\n参考：【葡萄】..."`.
pub fn lookup(question: &str) -> Option<String> {
    find_entry(question).map(|(keyword, fact)| format!("\n参考：【{}】{}", keyword, fact))
}
