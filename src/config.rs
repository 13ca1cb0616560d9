use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// 程序配置
///
/// 显式传入编排器和各个服务，不使用全局状态，
/// 因此同一进程内可以并行运行预算不同的多条题目链。
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 学生邮箱（提交答案时携带）
    pub email: String,
    /// 共享密钥（校验入站请求，并随答案提交）
    pub secret: String,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    // --- 浏览器配置 ---
    /// 是否使用无头模式
    pub headless: bool,
    /// 已打开浏览器的调试端口，设置后连接该浏览器而不是启动新的
    pub browser_debug_port: Option<u16>,
    /// 浏览器可执行文件路径
    pub browser_executable: Option<PathBuf>,
    /// 页面加载后等待 JS 渲染的时间（毫秒）
    pub render_wait_ms: u64,
    // --- 题目链配置 ---
    /// 整条链的总时限（秒）
    pub quiz_timeout_secs: u64,
    /// 单步时限（秒）
    pub step_timeout_secs: u64,
    /// 开始新一步所需的最少剩余时间（秒）
    pub min_step_budget_secs: u64,
    /// 同一 URL 的最大尝试次数
    pub max_retries: u32,
    /// 整条链的最大尝试次数
    pub max_attempts: u32,
    /// 抓取/提交失败后的重试等待（毫秒）
    pub retry_backoff_ms: u64,
    /// 同时运行的题目链数量
    pub max_concurrent_chains: usize,
    /// 临时文件根目录
    pub scratch_root: PathBuf,
    /// 固定的提交地址（覆盖从页面中解析的地址）
    pub submit_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            email: String::new(),
            secret: String::new(),
            llm_api_key: String::new(),
            llm_api_base_url: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            llm_model_name: "gemini-2.5-pro".to_string(),
            headless: true,
            browser_debug_port: None,
            browser_executable: None,
            render_wait_ms: 2000,
            quiz_timeout_secs: 180,
            step_timeout_secs: 90,
            min_step_budget_secs: 5,
            max_retries: 2,
            max_attempts: 12,
            retry_backoff_ms: 1000,
            max_concurrent_chains: 4,
            scratch_root: PathBuf::from("./temp"),
            submit_url: None,
        }
    }
}

impl Config {
    /// 加载配置：默认值 ← TOML 文件（`QUIZ_CONFIG`）← 环境变量（含 `.env`）
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let base = match std::env::var("QUIZ_CONFIG") {
            Ok(path) if !path.is_empty() => Self::from_toml_file(Path::new(&path))?,
            _ => Self::default(),
        };

        base.with_env_overrides()
    }

    /// 从 TOML 文件读取配置，缺省字段使用默认值
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::File {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::File { message, .. } => ConfigError::File {
                path: path.display().to_string(),
                message,
            },
            other => other,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::File {
            path: String::new(),
            message: e.to_string(),
        })
    }

    /// 用环境变量覆盖已有配置
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        env_string("EMAIL", &mut self.email);
        env_string("SECRET", &mut self.secret);
        env_string("LLM_API_KEY", &mut self.llm_api_key);
        env_string("LLM_API_BASE_URL", &mut self.llm_api_base_url);
        env_string("LLM_MODEL_NAME", &mut self.llm_model_name);
        env_parse("HEADLESS", "bool", &mut self.headless)?;
        if let Some(port) = env_value::<u16>("BROWSER_DEBUG_PORT", "u16")? {
            self.browser_debug_port = Some(port);
        }
        if let Ok(path) = std::env::var("BROWSER_EXECUTABLE") {
            self.browser_executable = Some(PathBuf::from(path));
        }
        env_parse("RENDER_WAIT_MS", "u64", &mut self.render_wait_ms)?;
        env_parse("QUIZ_TIMEOUT", "u64", &mut self.quiz_timeout_secs)?;
        env_parse("STEP_TIMEOUT", "u64", &mut self.step_timeout_secs)?;
        env_parse("MIN_STEP_BUDGET", "u64", &mut self.min_step_budget_secs)?;
        env_parse("MAX_RETRIES", "u32", &mut self.max_retries)?;
        env_parse("MAX_ATTEMPTS", "u32", &mut self.max_attempts)?;
        env_parse("RETRY_BACKOFF_MS", "u64", &mut self.retry_backoff_ms)?;
        env_parse("MAX_CONCURRENT_CHAINS", "usize", &mut self.max_concurrent_chains)?;
        if let Ok(dir) = std::env::var("TEMP_DIR") {
            self.scratch_root = PathBuf::from(dir);
        }
        if let Ok(url) = std::env::var("SUBMIT_URL") {
            self.submit_url = Some(url);
        }
        Ok(self)
    }

    /// 校验必填项
    pub fn validate_required(&self) -> Result<(), ConfigError> {
        let missing: Vec<&str> = [
            ("EMAIL", &self.email),
            ("SECRET", &self.secret),
            ("LLM_API_KEY", &self.llm_api_key),
        ]
        .iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(name, _)| *name)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Missing(missing.join(", ")))
        }
    }

    pub fn quiz_timeout(&self) -> Duration {
        Duration::from_secs(self.quiz_timeout_secs)
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }

    pub fn min_step_budget(&self) -> Duration {
        Duration::from_secs(self.min_step_budget_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn render_wait(&self) -> Duration {
        Duration::from_millis(self.render_wait_ms)
    }
}

fn env_string(var_name: &str, target: &mut String) {
    if let Ok(value) = std::env::var(var_name) {
        *target = value;
    }
}

fn env_value<T: FromStr>(
    var_name: &str,
    expected_type: &'static str,
) -> Result<Option<T>, ConfigError> {
    match std::env::var(var_name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::EnvVarParseFailed {
                var_name: var_name.to_string(),
                value,
                expected_type,
            }),
        Err(_) => Ok(None),
    }
}

fn env_parse<T: FromStr>(
    var_name: &str,
    expected_type: &'static str,
    target: &mut T,
) -> Result<(), ConfigError> {
    if let Some(value) = env_value(var_name, expected_type)? {
        *target = value;
    }
    Ok(())
}
