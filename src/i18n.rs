use serde::{Deserialize, Serialize};

/// 回答使用的语言
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Default)]
pub enum TargetLanguage {
    /// 跟随用户提问的语言
    #[serde(rename = "auto")]
    #[default]
    Auto,
    #[serde(rename = "zh")]
    Chinese,
    #[serde(rename = "en")]
    English,
    #[serde(rename = "ja")]
    Japanese,
    #[serde(rename = "de")]
    German,
    #[serde(rename = "fr")]
    French,
}

impl std::fmt::Display for TargetLanguage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetLanguage::Auto => write!(f, "auto"),
            TargetLanguage::Chinese => write!(f, "zh"),
            TargetLanguage::English => write!(f, "en"),
            TargetLanguage::Japanese => write!(f, "ja"),
            TargetLanguage::German => write!(f, "de"),
            TargetLanguage::French => write!(f, "fr"),
        }
    }
}

impl std::str::FromStr for TargetLanguage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(TargetLanguage::Auto),
            "zh" | "chinese" | "中文" => Ok(TargetLanguage::Chinese),
            "en" | "english" => Ok(TargetLanguage::English),
            "ja" | "japanese" | "日本語" => Ok(TargetLanguage::Japanese),
            "de" | "german" | "deutsch" => Ok(TargetLanguage::German),
            "fr" | "french" | "français" => Ok(TargetLanguage::French),
            _ => Err(format!("Unknown target language: {}", s)),
        }
    }
}

impl TargetLanguage {
    /// 追加到系统提示词末尾的语言指令
    pub fn prompt_instruction(&self) -> &'static str {
        match self {
            TargetLanguage::Auto => {
                "Answer in the same language the user used in their latest message."
            }
            TargetLanguage::Chinese => "请使用中文回答，表达准确、简洁、易于理解。",
            TargetLanguage::English => "Please answer in English, clearly and concisely.",
            TargetLanguage::Japanese => "日本語で、正確かつ簡潔に回答してください。",
            TargetLanguage::German => "Bitte antworten Sie auf Deutsch, präzise und verständlich.",
            TargetLanguage::French => "Veuillez répondre en français, de manière précise et concise.",
        }
    }
}
