mod agents;
mod llm;
mod mcp;
mod safety;
mod server;
mod sessions;
mod telegram;
mod tools;

pub use agents::*;
pub use llm::*;
pub use mcp::*;
pub use safety::*;
pub use server::*;
pub use sessions::*;
pub use telegram::*;
pub use tools::*;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// The root configuration object (C12), layered defaults -> file -> env
/// overrides at load time by the gateway binary.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub interaction: InteractionConfig,
    #[serde(default)]
    pub mcp_servers: McpServersConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    /// Extra paths whose contents are made available as ambient context.
    #[serde(default)]
    pub context_paths: Vec<String>,
    #[serde(default = "d_data_directory")]
    pub data_directory: String,
}

fn d_data_directory() -> String {
    "./data".into()
}

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues. Empty vec
    /// means the config is clean; callers should still treat `Error`-level
    /// issues as fatal at startup.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.port".into(),
                message: "port must be greater than 0".into(),
            });
        }
        if self.server.host.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.host".into(),
                message: "host must not be empty".into(),
            });
        }

        if self.llm.providers.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "llm.providers".into(),
                message: "no LLM providers configured".into(),
            });
        }

        for (name, provider) in &self.llm.providers {
            if let Some(base_url) = &provider.base_url {
                if !base_url.is_empty()
                    && !base_url.starts_with("http://")
                    && !base_url.starts_with("https://")
                {
                    errors.push(ConfigError {
                        severity: ConfigSeverity::Error,
                        field: format!("llm.providers.{name}.base_url"),
                        message: format!(
                            "base_url must start with http:// or https:// (got \"{base_url}\")"
                        ),
                    });
                }
            }
            if !provider.disabled
                && provider.api_key.as_ref().is_none_and(|v| v.is_empty())
                && provider.auth_token.as_ref().is_none_and(|v| v.is_empty())
                && provider.api_key.is_none()
                && provider.auth_token.is_none()
            {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Warning,
                    field: format!("llm.providers.{name}"),
                    message: "no apiKey or authToken configured; credentials must come from the environment or keychain".into(),
                });
            }
        }

        if self.server.cors.allowed_origins.len() == 1 && self.server.cors.allowed_origins[0] == "*"
        {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "server.cors.allowed_origins".into(),
                message: "wildcard \"*\" allows all origins (not recommended for production)"
                    .into(),
            });
        }

        if let Some(rl) = &self.server.rate_limit {
            if rl.requests_per_second == 0 {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "server.rate_limit.requests_per_second".into(),
                    message: "requests_per_second must be greater than 0".into(),
                });
            }
            if rl.burst_size == 0 {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "server.rate_limit.burst_size".into(),
                    message: "burst_size must be greater than 0".into(),
                });
            }
        }

        for (i, pattern) in self.tools.exec_security.denied_patterns.iter().enumerate() {
            if let Err(e) = regex::Regex::new(pattern) {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("tools.exec_security.denied_patterns[{i}]"),
                    message: format!("invalid regex \"{pattern}\": {e}"),
                });
            }
        }

        if self.interaction.max_clarify_questions > 4 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "interaction.max_clarify_questions".into(),
                message: "must be <= 4".into(),
            });
        }

        let mut seen_mcp_ids: HashSet<&str> = HashSet::new();
        for (id, server) in &self.mcp_servers.servers {
            if id.contains(':') {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("mcpServers.{id}"),
                    message: "server id must not contain ':' (used as tool name delimiter)".into(),
                });
            }
            if server.transport == McpTransportKind::Stdio && server.command.is_none() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("mcpServers.{id}.command"),
                    message: "stdio transport requires a command".into(),
                });
            }
            if !seen_mcp_ids.insert(id.as_str()) {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("mcpServers.{id}"),
                    message: "duplicate MCP server id".into(),
                });
            }
            for key in server.env.keys() {
                if matches!(key.as_str(), "LD_PRELOAD" | "LD_LIBRARY_PATH" | "DYLD_INSERT_LIBRARIES")
                {
                    errors.push(ConfigError {
                        severity: ConfigSeverity::Error,
                        field: format!("mcpServers.{id}.env.{key}"),
                        message: format!("overriding {key} is not permitted for security"),
                    });
                }
            }
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        let mut providers = std::collections::HashMap::new();
        providers.insert(
            "openai".to_string(),
            ProviderConfig {
                kind: ProviderKind::OpenaiCompat,
                api_key: Some("sk-test".into()),
                auth_token: None,
                base_url: Some("https://api.openai.com/v1".into()),
                disabled: false,
                selected_models: None,
                hide_model_selector: false,
                is_legacy: false,
            },
        );
        Config {
            llm: LlmConfig {
                providers,
                ..LlmConfig::default()
            },
            ..Config::default()
        }
    }

    fn find_issue<'a>(issues: &'a [ConfigError], field_prefix: &str) -> Option<&'a ConfigError> {
        issues.iter().find(|e| e.field.starts_with(field_prefix))
    }

    #[test]
    fn valid_config_passes() {
        let issues = valid_config().validate();
        let errors: Vec<_> = issues
            .iter()
            .filter(|e| e.severity == ConfigSeverity::Error)
            .collect();
        assert!(errors.is_empty(), "expected no errors, got: {errors:?}");
    }

    #[test]
    fn server_port_zero_is_error() {
        let mut cfg = valid_config();
        cfg.server.port = 0;
        let issues = cfg.validate();
        let issue = find_issue(&issues, "server.port").expect("expected server.port error");
        assert_eq!(issue.severity, ConfigSeverity::Error);
    }

    #[test]
    fn no_providers_is_warning() {
        let mut cfg = valid_config();
        cfg.llm.providers.clear();
        let issues = cfg.validate();
        let issue = find_issue(&issues, "llm.providers").expect("expected warning");
        assert_eq!(issue.severity, ConfigSeverity::Warning);
    }

    #[test]
    fn provider_bad_url_scheme_is_error() {
        let mut cfg = valid_config();
        cfg.llm.providers.get_mut("openai").unwrap().base_url = Some("ftp://x".into());
        let issues = cfg.validate();
        assert!(find_issue(&issues, "llm.providers.openai.base_url").is_some());
    }

    #[test]
    fn provider_missing_credentials_is_warning() {
        let mut cfg = valid_config();
        let p = cfg.llm.providers.get_mut("openai").unwrap();
        p.api_key = None;
        p.auth_token = None;
        let issues = cfg.validate();
        let issue = find_issue(&issues, "llm.providers.openai").expect("expected warning");
        assert_eq!(issue.severity, ConfigSeverity::Warning);
    }

    #[test]
    fn cors_wildcard_is_warning() {
        let mut cfg = valid_config();
        cfg.server.cors.allowed_origins = vec!["*".into()];
        let issues = cfg.validate();
        let issue =
            find_issue(&issues, "server.cors.allowed_origins").expect("expected CORS warning");
        assert_eq!(issue.severity, ConfigSeverity::Warning);
    }

    #[test]
    fn invalid_denied_pattern_is_error() {
        let mut cfg = valid_config();
        cfg.tools.exec_security.denied_patterns = vec![r"[invalid".into()];
        let issues = cfg.validate();
        assert!(find_issue(&issues, "tools.exec_security.denied_patterns[0]").is_some());
    }

    #[test]
    fn max_clarify_questions_over_four_is_error() {
        let mut cfg = valid_config();
        cfg.interaction.max_clarify_questions = 5;
        let issues = cfg.validate();
        assert!(find_issue(&issues, "interaction.max_clarify_questions").is_some());
    }

    #[test]
    fn config_error_display_format() {
        let err = ConfigError {
            severity: ConfigSeverity::Error,
            field: "server.port".into(),
            message: "port must be greater than 0".into(),
        };
        assert_eq!(format!("{err}"), "[ERROR] server.port: port must be greater than 0");
    }
}
