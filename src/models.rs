use serde::{Deserialize, Serialize};

use crate::error::{AppError, MSG_EMPTY_QUESTION, Result};

/// Caller-supplied description of the pet. Lives for one request only.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PetProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub species: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allergies: Option<Vec<String>>,
}

impl PetProfile {
    pub fn allergies(&self) -> &[String] {
        self.allergies.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskRequest {
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pet_profile: Option<PetProfile>,
}

impl AskRequest {
    /// Returns the trimmed question, or a client error if nothing is left.
    pub fn validated_question(&self) -> Result<String> {
        let question = self.question.trim();
        if question.is_empty() {
            return Err(AppError::bad_request(MSG_EMPTY_QUESTION));
        }
        Ok(question.to_string())
    }
}

// ============================================================================
// Chat-completion wire messages
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_request() {
        let body = r#"{
            "question": "  狗狗能吃巧克力吗？ ",
            "pet_profile": {"name": "旺财", "type": "狗", "breed": "柯基", "allergies": ["鸡肉", "牛奶"]}
        }"#;
        let request: AskRequest = serde_json::from_str(body).unwrap();
        let profile = request.pet_profile.as_ref().unwrap();
        assert_eq!(profile.species.as_deref(), Some("狗"));
        assert_eq!(profile.allergies(), ["鸡肉".to_string(), "牛奶".to_string()]);
        assert_eq!(request.validated_question().unwrap(), "狗狗能吃巧克力吗？");
    }

    #[test]
    fn test_parse_minimal_request() {
        let request: AskRequest = serde_json::from_str(r#"{"question": "猫能喝牛奶吗"}"#).unwrap();
        assert!(request.pet_profile.is_none());

        let request: AskRequest =
            serde_json::from_str(r#"{"question": "x", "pet_profile": {}}"#).unwrap();
        assert!(request.pet_profile.unwrap().allergies().is_empty());
    }

    #[test]
    fn test_blank_question_rejected() {
        for question in ["", "   ", "\n\t "] {
            let request = AskRequest {
                question: question.to_string(),
                pet_profile: None,
            };
            let err = request.validated_question().unwrap_err();
            assert_eq!(err.code, crate::error::ErrorCode::BadRequest);
            assert_eq!(err.message, MSG_EMPTY_QUESTION);
        }
    }

    #[test]
    fn test_chat_message_roles_serialize_lowercase() {
        let json = serde_json::to_value(ChatMessage::system("hi")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "system", "content": "hi"}));
        let json = serde_json::to_value(ChatMessage::user("q")).unwrap();
        assert_eq!(json["role"], "user");
    }
}
