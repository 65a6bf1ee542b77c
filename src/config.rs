//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` relative to the current working directory,
//! then applies `MEDAGENT_WORK_DIR`, `MEDAGENT_LOG_LEVEL` and `MEDAGENT_BIND`
//! env overrides. The LLM API key is only ever read from the environment.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::error::AppError;

/// Web channel configuration.
#[derive(Debug, Clone)]
pub struct WebConfig {
    /// Socket address the axum listener binds to.
    pub bind: String,
    /// Upper bound for a full multi-agent run, in seconds.
    pub request_timeout_seconds: u64,
    /// Recent sessions remembered per browser.
    pub recent_sessions_cap: usize,
}

/// Google Generative Language (Gemini) provider configuration.
/// Populated from `[llm.gemini]` in the TOML.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// API root, without the `/models/...` suffix.
    pub api_base_url: String,
    pub model: String,
    pub temperature: f32,
    /// Output token cap sent with each request; `None` leaves it to the model.
    pub max_output_tokens: Option<u32>,
    /// Per-request HTTP timeout in seconds.
    pub timeout_seconds: u64,
}

/// LLM subsystem configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Which provider is active (`"gemini"` or `"dummy"`).
    pub provider: String,
    pub gemini: GeminiConfig,
}

/// Agent prompt and memory configuration.
#[derive(Debug, Clone)]
pub struct AgentsConfig {
    /// Directory holding the `*.md` prompt templates.
    pub prompts_dir: PathBuf,
    /// Max short-term memory entries kept per agent.
    pub memory_cap: usize,
    /// How many of the most recent memory entries go into a prompt.
    pub memory_prompt_window: usize,
    /// Characters of a reply kept in its memory summary line.
    pub summary_chars: usize,
    /// Max orchestrator conversation-history entries.
    pub history_cap: usize,
}

/// Where session logs and PDF reports are written.
#[derive(Debug, Clone)]
pub struct LogsConfig {
    pub dir: PathBuf,
    pub reports_dir: PathBuf,
}

/// Fully-resolved application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub app_name: String,
    /// Base directory for relative paths (already expanded, no `~`).
    pub work_dir: PathBuf,
    pub log_level: String,
    pub web: WebConfig,
    pub llm: LlmConfig,
    /// From `GOOGLE_API_KEY` (or `GEMINI_API_KEY`). Never sourced from TOML.
    pub llm_api_key: Option<String>,
    pub agents: AgentsConfig,
    pub logs: LogsConfig,
}

/// Raw TOML shape: `serde` target before resolution.
#[derive(Deserialize)]
struct RawConfig {
    app: RawApp,
    #[serde(default)]
    web: RawWeb,
    #[serde(default)]
    llm: RawLlm,
    #[serde(default)]
    agents: RawAgents,
    #[serde(default)]
    logs: RawLogs,
}

#[derive(Deserialize)]
struct RawApp {
    #[serde(default = "default_app_name")]
    name: String,
    #[serde(default = "default_work_dir")]
    work_dir: String,
    #[serde(default = "default_log_level")]
    log_level: String,
}

#[derive(Deserialize)]
struct RawWeb {
    #[serde(default = "default_bind")]
    bind: String,
    #[serde(default = "default_request_timeout_seconds")]
    request_timeout_seconds: u64,
    #[serde(default = "default_recent_sessions_cap")]
    recent_sessions_cap: usize,
}

impl Default for RawWeb {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            request_timeout_seconds: default_request_timeout_seconds(),
            recent_sessions_cap: default_recent_sessions_cap(),
        }
    }
}

#[derive(Deserialize)]
struct RawLlm {
    /// Maps to `default = "..."` in `[llm]`.
    #[serde(rename = "default", default = "default_llm_provider")]
    provider: String,
    #[serde(default)]
    gemini: RawGeminiConfig,
}

impl Default for RawLlm {
    fn default() -> Self {
        Self { provider: default_llm_provider(), gemini: RawGeminiConfig::default() }
    }
}

#[derive(Deserialize)]
struct RawGeminiConfig {
    #[serde(default = "default_gemini_api_base_url")]
    api_base_url: String,
    #[serde(default = "default_gemini_model")]
    model: String,
    #[serde(default = "default_gemini_temperature")]
    temperature: f32,
    #[serde(default)]
    max_output_tokens: Option<u32>,
    #[serde(default = "default_gemini_timeout_seconds")]
    timeout_seconds: u64,
}

impl Default for RawGeminiConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_gemini_api_base_url(),
            model: default_gemini_model(),
            temperature: default_gemini_temperature(),
            max_output_tokens: None,
            timeout_seconds: default_gemini_timeout_seconds(),
        }
    }
}

#[derive(Deserialize)]
struct RawAgents {
    #[serde(default = "default_prompts_dir")]
    prompts_dir: String,
    #[serde(default = "default_memory_cap")]
    memory_cap: usize,
    #[serde(default = "default_memory_prompt_window")]
    memory_prompt_window: usize,
    #[serde(default = "default_summary_chars")]
    summary_chars: usize,
    #[serde(default = "default_history_cap")]
    history_cap: usize,
}

impl Default for RawAgents {
    fn default() -> Self {
        Self {
            prompts_dir: default_prompts_dir(),
            memory_cap: default_memory_cap(),
            memory_prompt_window: default_memory_prompt_window(),
            summary_chars: default_summary_chars(),
            history_cap: default_history_cap(),
        }
    }
}

#[derive(Deserialize)]
struct RawLogs {
    #[serde(default = "default_logs_dir")]
    dir: String,
    #[serde(default = "default_reports_dir")]
    reports_dir: String,
}

impl Default for RawLogs {
    fn default() -> Self {
        Self { dir: default_logs_dir(), reports_dir: default_reports_dir() }
    }
}

fn default_app_name() -> String { "MedAgent".to_string() }
fn default_work_dir() -> String { ".".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_bind() -> String { "127.0.0.1:8501".to_string() }
fn default_request_timeout_seconds() -> u64 { 600 }
fn default_recent_sessions_cap() -> usize { 20 }
fn default_llm_provider() -> String { "gemini".to_string() }
fn default_gemini_api_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}
fn default_gemini_model() -> String { "gemini-2.5-flash".to_string() }
fn default_gemini_temperature() -> f32 { 0.4 }
fn default_gemini_timeout_seconds() -> u64 { 120 }
fn default_prompts_dir() -> String { "config/prompts".to_string() }
fn default_memory_cap() -> usize { 50 }
fn default_memory_prompt_window() -> usize { 6 }
fn default_summary_chars() -> usize { 240 }
fn default_history_cap() -> usize { 100 }
fn default_logs_dir() -> String { "diagnosis_logs".to_string() }
fn default_reports_dir() -> String { "reports".to_string() }

/// Env-sourced values, gathered once so tests can pass them explicitly.
#[derive(Debug, Default, Clone)]
pub struct EnvOverrides {
    pub work_dir: Option<String>,
    pub log_level: Option<String>,
    pub bind: Option<String>,
    pub api_key: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self {
            work_dir: env::var("MEDAGENT_WORK_DIR").ok(),
            log_level: env::var("MEDAGENT_LOG_LEVEL").ok(),
            bind: env::var("MEDAGENT_BIND").ok(),
            api_key: first_non_blank([
                env::var("GOOGLE_API_KEY").ok(),
                env::var("GEMINI_API_KEY").ok(),
            ]),
        }
    }
}

/// First value that is set and not just whitespace. An empty
/// `GOOGLE_API_KEY=` line must not hide `GEMINI_API_KEY`.
fn first_non_blank<const N: usize>(values: [Option<String>; N]) -> Option<String> {
    values.into_iter().flatten().find(|v| !v.trim().is_empty())
}

/// Load config from `config/default.toml`, then apply env-var overrides.
pub fn load() -> Result<Config, AppError> {
    load_from(Path::new("config/default.toml"), EnvOverrides::from_env())
}

/// Internal loader: accepts an explicit path and overrides.
/// Tests pass overrides directly instead of mutating env vars.
pub fn load_from(path: &Path, overrides: EnvOverrides) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;
    parse(&raw, overrides)
        .map_err(|e| AppError::Config(format!("{e} (in {})", path.display())))
}

fn parse(raw: &str, overrides: EnvOverrides) -> Result<Config, AppError> {
    let parsed: RawConfig =
        toml::from_str(raw).map_err(|e| AppError::Config(format!("parse error: {e}")))?;

    let work_dir_str = overrides.work_dir.unwrap_or(parsed.app.work_dir);
    let work_dir = expand_home(&work_dir_str);
    let log_level = overrides.log_level.unwrap_or(parsed.app.log_level);

    if parsed.agents.memory_cap == 0 {
        return Err(AppError::Config("agents.memory_cap must be at least 1".into()));
    }
    if parsed.web.recent_sessions_cap == 0 {
        return Err(AppError::Config("web.recent_sessions_cap must be at least 1".into()));
    }

    Ok(Config {
        app_name: parsed.app.name,
        log_level,
        web: WebConfig {
            bind: overrides.bind.unwrap_or(parsed.web.bind),
            request_timeout_seconds: parsed.web.request_timeout_seconds,
            recent_sessions_cap: parsed.web.recent_sessions_cap,
        },
        llm: LlmConfig {
            provider: parsed.llm.provider,
            gemini: GeminiConfig {
                api_base_url: parsed.llm.gemini.api_base_url,
                model: parsed.llm.gemini.model,
                temperature: parsed.llm.gemini.temperature,
                max_output_tokens: parsed.llm.gemini.max_output_tokens,
                timeout_seconds: parsed.llm.gemini.timeout_seconds,
            },
        },
        llm_api_key: overrides.api_key,
        agents: AgentsConfig {
            prompts_dir: resolve(&work_dir, &parsed.agents.prompts_dir),
            memory_cap: parsed.agents.memory_cap,
            memory_prompt_window: parsed.agents.memory_prompt_window,
            summary_chars: parsed.agents.summary_chars,
            history_cap: parsed.agents.history_cap,
        },
        logs: LogsConfig {
            dir: resolve(&work_dir, &parsed.logs.dir),
            reports_dir: resolve(&work_dir, &parsed.logs.reports_dir),
        },
        work_dir,
    })
}

/// Resolve `path` against `work_dir` unless it is absolute or `~`-prefixed.
fn resolve(work_dir: &Path, path: &str) -> PathBuf {
    let expanded = expand_home(path);
    if expanded.is_absolute() {
        expanded
    } else {
        work_dir.join(expanded)
    }
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

impl Config {
    /// Config rooted at `work_dir` with the dummy provider and no API key.
    /// Used by tests and offline demos; never touches the network.
    pub fn offline(work_dir: &Path) -> Self {
        Self {
            app_name: default_app_name(),
            work_dir: work_dir.to_path_buf(),
            log_level: default_log_level(),
            web: WebConfig {
                bind: "127.0.0.1:0".into(),
                request_timeout_seconds: 30,
                recent_sessions_cap: default_recent_sessions_cap(),
            },
            llm: LlmConfig {
                provider: "dummy".into(),
                gemini: GeminiConfig {
                    api_base_url: "http://localhost:0/v1beta".into(),
                    model: "test-model".into(),
                    temperature: 0.0,
                    max_output_tokens: None,
                    timeout_seconds: 1,
                },
            },
            llm_api_key: None,
            agents: AgentsConfig {
                prompts_dir: work_dir.join("prompts"),
                memory_cap: default_memory_cap(),
                memory_prompt_window: default_memory_prompt_window(),
                summary_chars: default_summary_chars(),
                history_cap: default_history_cap(),
            },
            logs: LogsConfig {
                dir: work_dir.join(default_logs_dir()),
                reports_dir: work_dir.join(default_reports_dir()),
            },
        }
    }
}
