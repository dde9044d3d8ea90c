use std::time::Duration;

use thiserror::Error;

use crate::models::Operator;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("DATABASE_URL must be set to a Postgres instance (or pass --demo)")]
    MissingDatabaseUrl,

    #[error("operator id is required (pass --operator-id or set FRAUD_DESK_OPERATOR_ID)")]
    MissingOperator,

    #[error("operator id must be a positive integer, got {0}")]
    InvalidOperatorId(i64),

    #[error("max concurrent writes must be at least 1")]
    ZeroConcurrency,

    #[error("write timeout must be at least 1 second")]
    ZeroTimeout,
}

/// Where review data lives for this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    Postgres {
        database_url: String,
        max_connections: u32,
    },
    Demo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitSettings {
    pub max_concurrent_writes: usize,
    pub write_timeout: Duration,
}

impl Default for CommitSettings {
    fn default() -> Self {
        Self {
            max_concurrent_writes: 4,
            write_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub backend: Backend,
    operator: Option<Operator>,
    pub commit: CommitSettings,
}

/// Raw settings as collected from flags and environment.
#[derive(Debug, Clone, Default)]
pub struct RawConfig {
    pub demo: bool,
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub operator_id: Option<i64>,
    pub operator_name: Option<String>,
    pub max_concurrent_writes: usize,
    pub write_timeout_secs: u64,
}

impl Config {
    pub fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        if let Some(id) = raw.operator_id.filter(|id| *id <= 0) {
            return Err(ConfigError::InvalidOperatorId(id));
        }
        if raw.max_concurrent_writes == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if raw.write_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }

        let backend = if raw.demo {
            Backend::Demo
        } else {
            let database_url = raw
                .database_url
                .filter(|url| !url.trim().is_empty())
                .ok_or(ConfigError::MissingDatabaseUrl)?;
            Backend::Postgres {
                database_url,
                max_connections: raw.max_connections.max(1),
            }
        };

        let operator_name = raw.operator_name.filter(|name| !name.trim().is_empty());
        let operator = raw.operator_id.map(|id| Operator {
            id,
            name: operator_name.unwrap_or_else(|| format!("operator #{id}")),
        });

        Ok(Self {
            backend,
            operator,
            commit: CommitSettings {
                max_concurrent_writes: raw.max_concurrent_writes,
                write_timeout: Duration::from_secs(raw.write_timeout_secs),
            },
        })
    }

    /// The acting operator; required by anything that writes or shows a decision.
    pub fn operator(&self) -> Result<&Operator, ConfigError> {
        self.operator.as_ref().ok_or(ConfigError::MissingOperator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw() -> RawConfig {
        RawConfig {
            demo: false,
            database_url: Some("postgres://localhost/fraud".to_string()),
            max_connections: 5,
            operator_id: Some(7),
            operator_name: None,
            max_concurrent_writes: 4,
            write_timeout_secs: 10,
        }
    }

    #[test]
    fn postgres_requires_database_url() {
        let mut settings = raw();
        settings.database_url = None;
        assert_eq!(
            Config::from_raw(settings).unwrap_err(),
            ConfigError::MissingDatabaseUrl
        );
    }

    #[test]
    fn demo_ignores_database_url() {
        let mut settings = raw();
        settings.demo = true;
        settings.database_url = None;
        let config = Config::from_raw(settings).unwrap();
        assert_eq!(config.backend, Backend::Demo);
    }

    #[test]
    fn rejects_non_positive_operator() {
        let mut settings = raw();
        settings.operator_id = Some(0);
        assert_eq!(
            Config::from_raw(settings).unwrap_err(),
            ConfigError::InvalidOperatorId(0)
        );
    }

    #[test]
    fn rejects_zero_commit_limits() {
        let mut settings = raw();
        settings.max_concurrent_writes = 0;
        assert_eq!(
            Config::from_raw(settings).unwrap_err(),
            ConfigError::ZeroConcurrency
        );

        let mut settings = raw();
        settings.write_timeout_secs = 0;
        assert_eq!(Config::from_raw(settings).unwrap_err(), ConfigError::ZeroTimeout);
    }

    #[test]
    fn operator_name_defaults_from_id() {
        let config = Config::from_raw(raw()).unwrap();
        assert_eq!(config.operator().unwrap().name, "operator #7");
        assert_eq!(config.commit.write_timeout, Duration::from_secs(10));
    }

    #[test]
    fn operator_is_optional_until_needed() {
        let mut settings = raw();
        settings.operator_id = None;
        let config = Config::from_raw(settings).unwrap();
        assert_eq!(config.operator().unwrap_err(), ConfigError::MissingOperator);
    }
}
