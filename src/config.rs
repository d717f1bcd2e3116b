use std::env;
use std::time::Duration;

use thiserror::Error;

use crate::membership::DuplicatePolicy;
use crate::overdue::due::ReferenceZone;
use crate::overdue::DeliveryMode;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailProvider {
    Console,
    Outbox,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub mongo_uri: String,
    pub database_name: String,
    pub jwt_secret: String,
    pub bind_addr: String,
    pub frontend_origin: String,
    pub reference_zone: ReferenceZone,
    pub overdue_interval: Duration,
    pub delivery_mode: DeliveryMode,
    pub invite_duplicates: DuplicatePolicy,
    pub mail_provider: MailProvider,
    pub mail_from: String,
    pub password_cost: u32,
}

/// Reads settings through a key lookup so tests can supply their own.
struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        (self.0)(key)
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing(key))
    }

    fn or_default(&self, key: &str, default: &str) -> String {
        (self.0)(key).unwrap_or_else(|| default.to_string())
    }

    fn parsed<T, E>(&self, key: &'static str, default: &str) -> Result<T, ConfigError>
    where
        T: std::str::FromStr<Err = E>,
        E: std::fmt::Display,
    {
        let value = self.or_default(key, default);
        value.parse().map_err(|e: E| ConfigError::Invalid {
            key,
            value: value.clone(),
            reason: e.to_string(),
        })
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);

        let interval_secs: u64 = vars.parsed("OVERDUE_SCAN_SECS", "60")?;
        if interval_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "OVERDUE_SCAN_SECS",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let mail_provider = match vars.or_default("MAIL_PROVIDER", "console").as_str() {
            "console" => MailProvider::Console,
            "outbox" => MailProvider::Outbox,
            other => {
                return Err(ConfigError::Invalid {
                    key: "MAIL_PROVIDER",
                    value: other.to_string(),
                    reason: "expected console or outbox".to_string(),
                })
            }
        };

        Ok(Self {
            mongo_uri: vars.required("MONGO_URI")?,
            database_name: vars.or_default("DATABASE_NAME", "taskpilot"),
            jwt_secret: vars.required("JWT_SECRET")?,
            bind_addr: vars.or_default("BIND_ADDR", "0.0.0.0:8080"),
            frontend_origin: vars.or_default("FRONTEND_ORIGIN", "http://localhost:3000"),
            reference_zone: vars.parsed("REFERENCE_UTC_OFFSET", "+05:30")?,
            overdue_interval: Duration::from_secs(interval_secs),
            delivery_mode: vars.parsed("OVERDUE_DELIVERY", "at_least_once")?,
            invite_duplicates: vars.parsed("INVITE_DUPLICATES", "allow")?,
            mail_provider,
            mail_from: vars.or_default("MAIL_FROM", "no-reply@taskpilot.local"),
            password_cost: vars.parsed("BCRYPT_COST", &bcrypt::DEFAULT_COST.to_string())?,
        })
    }
}

#[cfg(test)]
impl Config {
    pub fn for_tests() -> Self {
        Self {
            mongo_uri: "mongodb://localhost:27017".to_string(),
            database_name: "taskpilot_test".to_string(),
            jwt_secret: "test-secret".to_string(),
            bind_addr: "127.0.0.1:0".to_string(),
            frontend_origin: "http://localhost:3000".to_string(),
            reference_zone: ReferenceZone::default(),
            overdue_interval: Duration::from_secs(60),
            delivery_mode: DeliveryMode::AtLeastOnce,
            invite_duplicates: DuplicatePolicy::Allow,
            mail_provider: MailProvider::Console,
            mail_from: "no-reply@taskpilot.local".to_string(),
            password_cost: 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rstest::rstest;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = [("MONGO_URI", "mongodb://db:27017"), ("JWT_SECRET", "s3cret")]
            .iter()
            .chain(pairs)
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_fill_everything_optional() {
        let config = load(&[]).unwrap();
        assert_eq!(config.mongo_uri, "mongodb://db:27017");
        assert_eq!(config.database_name, "taskpilot");
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.reference_zone, ReferenceZone::default());
        assert_eq!(config.overdue_interval, Duration::from_secs(60));
        assert_eq!(config.delivery_mode, DeliveryMode::AtLeastOnce);
        assert_eq!(config.invite_duplicates, DuplicatePolicy::Allow);
        assert_eq!(config.mail_provider, MailProvider::Console);
        assert_eq!(config.password_cost, bcrypt::DEFAULT_COST);
    }

    #[test]
    fn explicit_values_override_defaults() {
        let config = load(&[
            ("REFERENCE_UTC_OFFSET", "-03:00"),
            ("OVERDUE_SCAN_SECS", "5"),
            ("OVERDUE_DELIVERY", "at_most_once"),
            ("INVITE_DUPLICATES", "skip_pending"),
            ("MAIL_PROVIDER", "outbox"),
            ("BCRYPT_COST", "6"),
        ])
        .unwrap();
        assert_eq!(config.reference_zone, "-03:00".parse::<ReferenceZone>().unwrap());
        assert_eq!(config.overdue_interval, Duration::from_secs(5));
        assert_eq!(config.delivery_mode, DeliveryMode::AtMostOnce);
        assert_eq!(config.invite_duplicates, DuplicatePolicy::SkipPending);
        assert_eq!(config.mail_provider, MailProvider::Outbox);
        assert_eq!(config.password_cost, 6);
    }

    #[rstest]
    #[case("OVERDUE_SCAN_SECS", "0")]
    #[case("OVERDUE_SCAN_SECS", "soon")]
    #[case("REFERENCE_UTC_OFFSET", "IST")]
    #[case("OVERDUE_DELIVERY", "exactly_once")]
    #[case("INVITE_DUPLICATES", "reject")]
    #[case("MAIL_PROVIDER", "smtp")]
    #[case("BCRYPT_COST", "-1")]
    fn rejects_malformed_values(#[case] key: &str, #[case] value: &str) {
        match load(&[(key, value)]) {
            Err(ConfigError::Invalid { key: reported, .. }) => assert_eq!(reported, key),
            other => panic!("expected {key} to be invalid, got {other:?}"),
        }
    }

    #[rstest]
    #[case("MONGO_URI")]
    #[case("JWT_SECRET")]
    fn blank_required_values_are_missing(#[case] key: &str) {
        match load(&[(key, " ")]) {
            Err(ConfigError::Missing(reported)) => assert_eq!(reported, key),
            other => panic!("expected {key} to be missing, got {other:?}"),
        }
    }
}
