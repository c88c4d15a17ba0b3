//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::survey::collaborators::{Role, SessionSnapshot, DEFAULT_HANDOFF_TIMEOUT};

/// Sequencer configuration.
#[derive(Debug, Clone)]
pub struct SurveyConfig {
    /// Storage scope (one per tab / client session).
    pub scope: String,
    /// Delay before reopening a resumed stage, so dependent UI can mount.
    pub resume_settle_delay: Duration,
    /// Longest wait for a presenter's open acknowledgment during a handoff.
    pub handoff_timeout: Duration,
    /// Capacity of the sync outcome broadcast channel.
    pub sync_event_capacity: usize,
}

impl Default for SurveyConfig {
    fn default() -> Self {
        Self {
            scope: "default".to_string(),
            resume_settle_delay: Duration::from_millis(200),
            handoff_timeout: DEFAULT_HANDOFF_TIMEOUT,
            sync_event_capacity: 64,
        }
    }
}

/// Server binary configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// `None` keeps survey state in memory for the life of the process.
    pub db_path: Option<PathBuf>,
    /// `None` disables remote saves; every remote call then fails and is
    /// tolerated.
    pub profile_url: Option<String>,
    pub profile_token: Option<SecretString>,
    pub session: SessionSnapshot,
    pub survey: SurveyConfig,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment in production).
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        let port = match non_empty("SURVEY_FLOW_PORT") {
            Some(v) => v.trim().parse().map_err(|e| ConfigError::InvalidValue {
                key: "SURVEY_FLOW_PORT".into(),
                message: format!("{e}"),
            })?,
            None => 8080,
        };

        let offline = match non_empty("SURVEY_FLOW_OFFLINE") {
            Some(v) => parse_bool("SURVEY_FLOW_OFFLINE", &v)?,
            None => false,
        };

        let role = non_empty("SURVEY_FLOW_ROLE")
            .map(|r| r.parse::<Role>().unwrap_or(Role::Standard))
            .unwrap_or(Role::Standard);

        let mut survey = SurveyConfig::default();
        if let Some(scope) = non_empty("SURVEY_FLOW_SCOPE") {
            survey.scope = scope;
        }
        if let Some(ms) = non_empty("SURVEY_FLOW_HANDOFF_MS") {
            survey.handoff_timeout = Duration::from_millis(parse_millis("SURVEY_FLOW_HANDOFF_MS", &ms)?);
        }

        let profile_url = non_empty("SURVEY_FLOW_PROFILE_URL");
        if let Some(url) = &profile_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::InvalidValue {
                    key: "SURVEY_FLOW_PROFILE_URL".into(),
                    message: format!("expected an http(s) URL, got {url}"),
                });
            }
        }

        // An explicit flag wins; otherwise a configured profile store
        // implies a signed-in user.
        let is_authenticated = match non_empty("SURVEY_FLOW_AUTHENTICATED") {
            Some(v) => parse_bool("SURVEY_FLOW_AUTHENTICATED", &v)?,
            None => profile_url.is_some(),
        };

        Ok(Self {
            port,
            db_path: non_empty("SURVEY_FLOW_DB_PATH").map(PathBuf::from),
            profile_token: non_empty("SURVEY_FLOW_PROFILE_TOKEN").map(SecretString::from),
            session: SessionSnapshot {
                is_authenticated,
                is_online: !offline,
                role,
            },
            profile_url,
            survey,
        })
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a boolean, got {other}"),
        }),
    }
}

fn parse_millis(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("{e}"),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, 8080);
        assert!(config.db_path.is_none());
        assert!(config.profile_url.is_none());
        assert!(!config.session.is_authenticated);
        assert!(config.session.is_online);
        assert_eq!(config.survey.scope, "default");
        assert_eq!(config.survey.handoff_timeout, Duration::from_millis(150));
    }

    #[test]
    fn reads_all_values() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("SURVEY_FLOW_PORT", "9090"),
            ("SURVEY_FLOW_DB_PATH", "./data/survey.db"),
            ("SURVEY_FLOW_PROFILE_URL", "https://api.example.com"),
            ("SURVEY_FLOW_PROFILE_TOKEN", "secret"),
            ("SURVEY_FLOW_ROLE", "admin"),
            ("SURVEY_FLOW_OFFLINE", "yes"),
            ("SURVEY_FLOW_SCOPE", "tab-42"),
            ("SURVEY_FLOW_HANDOFF_MS", "300"),
        ]))
        .unwrap();
        assert_eq!(config.port, 9090);
        assert_eq!(config.db_path, Some(PathBuf::from("./data/survey.db")));
        assert!(config.profile_token.is_some());
        assert!(config.session.is_authenticated);
        assert!(!config.session.is_online);
        assert_eq!(config.session.role, Role::Admin);
        assert_eq!(config.survey.scope, "tab-42");
        assert_eq!(config.survey.handoff_timeout, Duration::from_millis(300));
    }

    #[test]
    fn authenticated_flag_overrides_profile_url() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("SURVEY_FLOW_PROFILE_URL", "https://api.example.com"),
            ("SURVEY_FLOW_AUTHENTICATED", "false"),
        ]))
        .unwrap();
        assert!(config.profile_url.is_some());
        assert!(!config.session.is_authenticated);

        let config =
            ServerConfig::from_lookup(lookup(&[("SURVEY_FLOW_AUTHENTICATED", "1")])).unwrap();
        assert!(config.profile_url.is_none());
        assert!(config.session.is_authenticated);

        let err = ServerConfig::from_lookup(lookup(&[("SURVEY_FLOW_AUTHENTICATED", "sometimes")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "SURVEY_FLOW_AUTHENTICATED"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = ServerConfig::from_lookup(lookup(&[("SURVEY_FLOW_PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "SURVEY_FLOW_PORT"));

        let err =
            ServerConfig::from_lookup(lookup(&[("SURVEY_FLOW_OFFLINE", "maybe")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        let err = ServerConfig::from_lookup(lookup(&[("SURVEY_FLOW_PROFILE_URL", "ftp://x")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
