use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

const DEFAULT_OPENROUTER_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_RULES_DIR: &str = "rules";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required environment variable {name} is missing or empty")]
    MissingVar { name: &'static str },
}

#[derive(Debug, Clone)]
pub struct GitLabSettings {
    pub base_url: String,
    pub token: String,
}

/// Both halves optional: absent Jira credentials degrade the ticket tool to
/// a fixed textual answer instead of failing startup.
#[derive(Debug, Clone, Default)]
pub struct JiraSettings {
    pub host: Option<String>,
    pub token: Option<String>,
}

/// Settings the orchestrator process needs before a session may start.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

/// Settings the tool-host process reads when it is spawned.
#[derive(Debug, Clone)]
pub struct HostSettings {
    pub gitlab: GitLabSettings,
    pub jira: JiraSettings,
    pub rules_dir: PathBuf,
}

impl OrchestratorSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_key = require(&lookup, "OPENROUTER_API_KEY")?;
        let model = require(&lookup, "OPENROUTER_MODEL")?;
        let base_url = lookup("OPENROUTER_URL")
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_OPENROUTER_URL.to_string());

        // The code-host credential is used by the spawned tool host, which
        // inherits the environment; verifying it here keeps a misconfigured
        // run from failing halfway through a review.
        require(&lookup, "GITLAB_URL")?;
        require(&lookup, "GITLAB_TOKEN")?;

        Ok(Self {
            api_key,
            model,
            base_url,
        })
    }
}

impl HostSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let gitlab = GitLabSettings {
            base_url: require(&lookup, "GITLAB_URL")?,
            token: require(&lookup, "GITLAB_TOKEN")?,
        };

        let jira = JiraSettings {
            host: optional(&lookup, "JIRA_HOST"),
            token: optional(&lookup, "JIRA_TOKEN"),
        };
        if jira.host.is_none() || jira.token.is_none() {
            info!("Jira credentials not fully configured; ticket lookup will degrade to text");
        }

        let rules_dir = optional(&lookup, "REVIEW_RULES_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_RULES_DIR));

        Ok(Self {
            gitlab,
            jira,
            rules_dir,
        })
    }
}

fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn require(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    lookup(name)
        .filter(|value| !value.trim().is_empty())
        .ok_or(ConfigError::MissingVar { name })
}

fn optional(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn orchestrator_requires_model_and_code_host_credentials() {
        let missing = OrchestratorSettings::from_lookup(lookup_from(&[
            ("OPENROUTER_API_KEY", "sk-test"),
            ("OPENROUTER_MODEL", "qwen/qwen-2.5"),
            ("GITLAB_URL", "https://gitlab.example.com"),
        ]));
        assert!(matches!(
            missing,
            Err(ConfigError::MissingVar {
                name: "GITLAB_TOKEN"
            })
        ));
    }

    #[test]
    fn orchestrator_defaults_openrouter_endpoint() {
        let settings = OrchestratorSettings::from_lookup(lookup_from(&[
            ("OPENROUTER_API_KEY", "sk-test"),
            ("OPENROUTER_MODEL", "qwen/qwen-2.5"),
            ("GITLAB_URL", "https://gitlab.example.com"),
            ("GITLAB_TOKEN", "glpat-test"),
        ]))
        .expect("settings load");
        assert_eq!(settings.base_url, DEFAULT_OPENROUTER_URL);
        assert_eq!(settings.model, "qwen/qwen-2.5");
    }

    #[test]
    fn host_treats_jira_as_optional() {
        let settings = HostSettings::from_lookup(lookup_from(&[
            ("GITLAB_URL", "https://gitlab.example.com"),
            ("GITLAB_TOKEN", "glpat-test"),
        ]))
        .expect("settings load");
        assert!(settings.jira.host.is_none());
        assert!(settings.jira.token.is_none());
        assert_eq!(settings.rules_dir, PathBuf::from(DEFAULT_RULES_DIR));
    }

    #[test]
    fn blank_values_count_as_missing() {
        let result = HostSettings::from_lookup(lookup_from(&[
            ("GITLAB_URL", "https://gitlab.example.com"),
            ("GITLAB_TOKEN", "   "),
        ]));
        assert!(matches!(
            result,
            Err(ConfigError::MissingVar {
                name: "GITLAB_TOKEN"
            })
        ));
    }
}
