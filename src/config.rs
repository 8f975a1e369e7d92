use std::time::Duration;

use ::config::Environment;
use serde::Deserialize;

use crate::reconcile::SchedulerConfig;

/// Process configuration, read from the environment (and `.env`).
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub run_address: String,
    /// Absent means the in-memory ledger
    pub database_uri: Option<String>,
    pub accrual_system_address: String,
    pub session_secret: String,
    pub session_ttl_secs: u64,
    pub reconcile_interval_secs: u64,
    pub reconcile_max_in_flight: usize,
    pub accrual_timeout_secs: u64,
    pub database_max_connections: u32,
    pub order_submissions_per_minute: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, ::config::ConfigError> {
        Self::from_source(Environment::default().try_parsing(true))
    }

    fn from_source(
        source: impl ::config::Source + Send + Sync + 'static,
    ) -> Result<Self, ::config::ConfigError> {
        let config: Self = ::config::Config::builder()
            .set_default("run_address", "0.0.0.0:8081")?
            .set_default("accrual_system_address", "http://127.0.0.1:8080")?
            .set_default("session_ttl_secs", 86_400)?
            .set_default("reconcile_interval_secs", 10)?
            .set_default("reconcile_max_in_flight", 16)?
            .set_default("accrual_timeout_secs", 5)?
            .set_default("database_max_connections", 20)?
            .set_default("order_submissions_per_minute", 600)?
            .add_source(source)
            .build()?
            .try_deserialize()?;

        Ok(config.clamped())
    }

    fn clamped(mut self) -> Self {
        self.session_ttl_secs = self.session_ttl_secs.max(1);
        self.reconcile_interval_secs = self.reconcile_interval_secs.max(1);
        self.reconcile_max_in_flight = self.reconcile_max_in_flight.max(1);
        self.accrual_timeout_secs = self.accrual_timeout_secs.max(1);
        self.database_max_connections = self.database_max_connections.max(1);
        self.order_submissions_per_minute = self.order_submissions_per_minute.max(1);
        self.database_uri = self.database_uri.filter(|uri| !uri.trim().is_empty());
        self
    }

    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            interval: Duration::from_secs(self.reconcile_interval_secs),
            max_in_flight: self.reconcile_max_in_flight,
        }
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn accrual_timeout(&self) -> Duration {
        Duration::from_secs(self.accrual_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::config::{Map, Value};

    /// Fixed key/value source
    #[derive(Debug, Clone)]
    struct Fixed(Map<String, Value>);

    impl ::config::Source for Fixed {
        fn clone_into_box(&self) -> Box<dyn ::config::Source + Send + Sync> {
            Box::new(self.clone())
        }

        fn collect(&self) -> Result<Map<String, Value>, ::config::ConfigError> {
            Ok(self.0.clone())
        }
    }

    fn fixed(pairs: &[(&str, &str)]) -> Fixed {
        Fixed(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), Value::from(*v)))
                .collect(),
        )
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_source(fixed(&[("session_secret", "s3cret")])).unwrap();

        assert_eq!(config.run_address, "0.0.0.0:8081");
        assert_eq!(config.database_uri, None);
        assert_eq!(config.accrual_system_address, "http://127.0.0.1:8080");
        assert_eq!(config.scheduler().interval, Duration::from_secs(10));
        assert_eq!(config.scheduler().max_in_flight, 16);
        assert_eq!(config.session_ttl(), Duration::from_secs(86_400));
        assert_eq!(config.order_submissions_per_minute, 600);
    }

    #[test]
    fn test_session_secret_is_required() {
        assert!(Config::from_source(fixed(&[])).is_err());
    }

    #[test]
    fn test_overrides_and_clamping() {
        let config = Config::from_source(fixed(&[
            ("session_secret", "s3cret"),
            ("run_address", "127.0.0.1:9000"),
            ("database_uri", "  "),
            ("reconcile_max_in_flight", "0"),
            ("reconcile_interval_secs", "3"),
        ]))
        .unwrap();

        assert_eq!(config.run_address, "127.0.0.1:9000");
        assert_eq!(config.database_uri, None);
        assert_eq!(config.reconcile_max_in_flight, 1);
        assert_eq!(config.scheduler().interval, Duration::from_secs(3));
    }
}
