//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `TAILORD__*` 覆盖（双下划线表示嵌套，如 `TAILORD__LLM__PROVIDER=mock`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::llm::RetryConfig;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub orchestrator: OrchestratorSection,
    pub tools: ToolsSection,
    pub vector: VectorSection,
    pub profile: ProfileSection,
}

/// [app] 段：应用名、系统提示词、会话历史上限、HTTP 监听地址
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    /// 系统提示词文件；未设置或读取失败时使用内置提示词
    pub system_prompt_path: Option<PathBuf>,
    /// 持久历史最多保留的 user/assistant 消息条数
    pub max_history: usize,
    pub session_timeout_secs: u64,
    /// 获取会话锁的最长等待时间
    pub session_lock_timeout_secs: u64,
    pub bind_addr: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "Tailord".to_string(),
            system_prompt_path: None,
            max_history: 60,
            session_timeout_secs: 3600,
            session_lock_timeout_secs: 30,
            bind_addr: "127.0.0.1:8000".to_string(),
        }
    }
}

/// [llm] 段：后端选择、模型、超时与重试
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// openai / mock
    pub provider: String,
    /// 编排循环使用的模型
    pub model: String,
    /// 查询规范化（结构化检索条件）使用的模型
    pub normalizer_model: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub request_timeout_secs: u64,
    pub retry: RetryConfig,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            normalizer_model: "gpt-4o-mini".to_string(),
            base_url: None,
            api_key: None,
            request_timeout_secs: 60,
            retry: RetryConfig::default(),
        }
    }
}

/// [orchestrator] 段：工具调用轮数上限、并发执行、整轮截止时间
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorSection {
    pub max_tool_iterations: usize,
    /// 同一轮内的多个工具调用是否并发执行
    pub parallel_tools: bool,
    pub turn_timeout_secs: Option<u64>,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            max_tool_iterations: 4,
            parallel_tools: true,
            turn_timeout_secs: None,
        }
    }
}

/// [tools] 段：单次工具超时、目录检索与词典检索参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    pub tool_timeout_secs: u64,
    pub catalog: CatalogSection,
    pub glossary: GlossarySection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
            catalog: CatalogSection::default(),
            glossary: GlossarySection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CatalogSection {
    pub collection: String,
    pub default_top_k: usize,
    pub max_top_k: usize,
    /// 只检索有货商品（metadata.in_stock == true）
    pub only_in_stock: bool,
}

impl Default for CatalogSection {
    fn default() -> Self {
        Self {
            collection: "products_rogue_v1".to_string(),
            default_top_k: 5,
            max_top_k: 20,
            only_in_stock: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GlossarySection {
    pub collection: String,
    /// 相似度严格大于该值才视为命中
    pub threshold: f32,
    pub top_k: usize,
}

impl Default for GlossarySection {
    fn default() -> Self {
        Self {
            collection: "style_glossary".to_string(),
            threshold: 0.5,
            top_k: 3,
        }
    }
}

/// [vector] 段：Milvus REST 地址与嵌入模型
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VectorSection {
    pub milvus_url: String,
    pub token: Option<String>,
    pub embedding_model: String,
    pub embedding_base_url: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for VectorSection {
    fn default() -> Self {
        Self {
            milvus_url: "http://127.0.0.1:19530".to_string(),
            token: None,
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_base_url: None,
            request_timeout_secs: 20,
        }
    }
}

/// [profile] 段：默认用户画像（仅用于调整风格、尺码提示与语气）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProfileSection {
    pub age: Option<u32>,
    pub gender: Option<String>,
}

/// 从 config 目录加载配置，环境变量 TAILORD__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 TAILORD__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("TAILORD")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.orchestrator.max_tool_iterations, 4);
        assert_eq!(cfg.app.max_history, 60);
        assert!((cfg.tools.glossary.threshold - 0.5).abs() < f32::EPSILON);
        assert!(cfg.tools.catalog.only_in_stock);
        assert_eq!(cfg.llm.retry.max_retries, 2);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[orchestrator]\nmax_tool_iterations = 2\nparallel_tools = false\n\n[tools.catalog]\nonly_in_stock = false\n\n[tools.glossary]\nthreshold = 0.7\n\n[llm]\nprovider = \"mock\""
        )
        .unwrap();
        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.orchestrator.max_tool_iterations, 2);
        assert!(!cfg.orchestrator.parallel_tools);
        assert!((cfg.tools.glossary.threshold - 0.7).abs() < 1e-6);
        assert_eq!(cfg.llm.provider, "mock");
        assert_eq!(cfg.tools.catalog.default_top_k, 5);
        assert!(!cfg.tools.catalog.only_in_stock);
    }
}
