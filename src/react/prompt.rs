//! 系统提示词与用户画像上下文

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::ProfileSection;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You help users find outfits from the store's catalog.

When the user mentions pop-culture fashion slang (e.g., 'indie', 'blokette', 'goth'), first call `glossary_lookup_tool` with the phrase to obtain canonical tags.
Assemble a normalized search query by calling the `query_to_search_str_tool` tool, passing the raw user query and the response from the glossary lookup tool. You must wait for the glossary lookup tool to return before calling the query_to_search_str_tool.
Next, call `catalog_search_tool` with the search string and wait for it to return a list of products.

Finally, present a grounded, neutral recommendation based ONLY on the returned products. Keep it concise, warm, and fashion-aware. Briefly mention how the items fit the vibe.
Do not imply the user chose any item; avoid phrases like 'nice choice'. Cite details strictly from the product JSON (name, brand, price, color, material). If no results are suitable, ask a brief, specific follow-up (e.g., price or color).";

/// 读取系统提示词文件；未配置或读取失败时使用内置提示词
pub fn load_system_prompt(path: Option<&Path>) -> String {
    match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(s) if !s.trim().is_empty() => s,
            Ok(_) => {
                tracing::warn!(path = %p.display(), "system prompt file is empty, using built-in prompt");
                DEFAULT_SYSTEM_PROMPT.to_string()
            }
            Err(e) => {
                tracing::warn!(path = %p.display(), error = %e, "failed to read system prompt, using built-in prompt");
                DEFAULT_SYSTEM_PROMPT.to_string()
            }
        },
        None => DEFAULT_SYSTEM_PROMPT.to_string(),
    }
}

/// 用户画像：只用于调整风格、尺码提示与语气
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub gender: Option<String>,
}

impl From<&ProfileSection> for UserProfile {
    fn from(p: &ProfileSection) -> Self {
        Self {
            age: p.age,
            gender: p.gender.clone(),
        }
    }
}

impl UserProfile {
    /// 作为第二条 system 消息注入工作对话
    pub fn context_text(&self) -> String {
        let mut parts = Vec::new();
        if let Some(age) = self.age {
            parts.push(format!("age={age}"));
        }
        if let Some(gender) = self.gender.as_deref().filter(|g| !g.trim().is_empty()) {
            parts.push(format!("gender={gender}"));
        }
        let profile = if parts.is_empty() {
            "none provided".to_string()
        } else {
            parts.join("; ")
        };
        format!(
            "User profile context: {profile}. Use this ONLY to tailor style, sizing hints, or tone. \
             Do not infer attributes, stereotype, or ask for unnecessary details."
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_profile_context() {
        let p = UserProfile {
            age: Some(30),
            gender: Some("Male".to_string()),
        };
        assert!(p.context_text().starts_with("User profile context: age=30; gender=Male."));
        assert!(UserProfile::default().context_text().contains("none provided"));
    }

    #[test]
    fn test_load_prompt_from_file_or_default() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "You are a stylist.").unwrap();
        assert_eq!(load_system_prompt(Some(f.path())), "You are a stylist.");
        assert_eq!(load_system_prompt(Some(Path::new("/nonexistent/prompt.txt"))), DEFAULT_SYSTEM_PROMPT);
        assert_eq!(load_system_prompt(None), DEFAULT_SYSTEM_PROMPT);
    }
}
