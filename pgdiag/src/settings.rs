use std::time::Duration;

use config::{Config, ConfigError, Environment};
use log::debug;
use pgdiag_common::{DEFAULT_DATABASE, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_USER, SslMode, Target};
use serde::Deserialize;

const ENV_PREFIX: &str = "PGDIAG";

const DEFAULT_PING_COUNT: u32 = 3;
const DEFAULT_PING_TIMEOUT_SECS: u64 = 15;
const DEFAULT_TCP_TIMEOUT_SECS: u64 = 10;
const DEFAULT_DNS_TIMEOUT_SECS: u64 = 10;
const DEFAULT_TRACEROUTE_MAX_HOPS: u32 = 10;
const DEFAULT_TRACEROUTE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_TRACEROUTE_MAX_LINES: usize = 6;
const DEFAULT_PSQL_TIMEOUT_SECS: u64 = 15;

const DEFAULT_SCHEMA: &str = "public";
const DEFAULT_TABLE_PATTERN: &str = "diapositiva";
const DEFAULT_SAMPLE_COLUMNS: [&str; 4] = ["id", "titulo", "slug", "estado"];
const DEFAULT_SAMPLE_LIMIT: u32 = 5;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 15;
const DEFAULT_PREFLIGHT_PING_TIMEOUT_SECS: u64 = 10;

/// Database instance under test
#[derive(Debug, Deserialize, Clone, Default)]
pub struct TargetSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub sslmode: Option<String>,
}

/// Network runner configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct NetworkSettings {
    pub ping_count: Option<u32>,
    pub ping_timeout_secs: Option<u64>,
    pub tcp_timeout_secs: Option<u64>,
    pub dns_timeout_secs: Option<u64>,
    pub traceroute_max_hops: Option<u32>,
    pub traceroute_timeout_secs: Option<u64>,
    pub traceroute_max_lines: Option<usize>,
    pub psql: Option<bool>,
    pub psql_timeout_secs: Option<u64>,
}

/// Database runner configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct DatabaseSettings {
    pub schema: Option<String>,
    pub table_pattern: Option<String>,
    pub sample_columns: Option<Vec<String>>,
    pub sample_limit: Option<u32>,
    pub connect_timeout_secs: Option<u64>,
    pub preflight_ping: Option<bool>,
    pub preflight_ping_timeout_secs: Option<u64>,
}

/// `target.*` only, read without type coercion.
#[derive(Debug, Deserialize, Default)]
struct VerbatimTarget {
    #[serde(default)]
    target: TargetSettings,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub target: TargetSettings,
    #[serde(default)]
    pub network: NetworkSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        for (key, _) in std::env::vars() {
            if key.starts_with(ENV_PREFIX) {
                debug!("ENV: {} is set", key);
            }
        }

        let s = Config::builder()
            .add_source(
                environment()
                    .list_separator(",")
                    .with_list_parse_key("database.sample_columns")
                    .try_parsing(true),
            )
            .build()?;
        let mut settings: Self = s.try_deserialize()?;

        // try_parsing turns "00123" into 123; target values are taken as written.
        let verbatim: VerbatimTarget = Config::builder()
            .add_source(environment())
            .build()?
            .try_deserialize()?;
        settings.target = verbatim.target;

        debug!("Parsed settings: {:?}", settings.redacted());
        Ok(settings)
    }

    /// Copy safe to log: the password is masked.
    fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.target.password.is_some() {
            copy.target.password = Some("****".to_string());
        }
        copy
    }

    pub fn to_target(&self) -> Result<Target, ConfigError> {
        let ssl_mode = match self.target.sslmode.as_deref() {
            Some(mode) => mode
                .parse::<SslMode>()
                .map_err(|e| ConfigError::Message(e.to_string()))?,
            None => SslMode::default(),
        };

        Ok(Target {
            host: self
                .target
                .host
                .clone()
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: self.target.port.unwrap_or(DEFAULT_PORT),
            database: self
                .target
                .database
                .clone()
                .unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
            user: self
                .target
                .user
                .clone()
                .unwrap_or_else(|| DEFAULT_USER.to_string()),
            password: self.target.password.clone().filter(|p| !p.is_empty()),
            ssl_mode,
        })
    }
}

impl NetworkSettings {
    pub fn ping_count(&self) -> u32 {
        self.ping_count.unwrap_or(DEFAULT_PING_COUNT).max(1)
    }

    pub fn ping_timeout(&self) -> Duration {
        secs(self.ping_timeout_secs, DEFAULT_PING_TIMEOUT_SECS)
    }

    pub fn tcp_timeout(&self) -> Duration {
        secs(self.tcp_timeout_secs, DEFAULT_TCP_TIMEOUT_SECS)
    }

    pub fn dns_timeout(&self) -> Duration {
        secs(self.dns_timeout_secs, DEFAULT_DNS_TIMEOUT_SECS)
    }

    pub fn traceroute_max_hops(&self) -> u32 {
        self.traceroute_max_hops
            .unwrap_or(DEFAULT_TRACEROUTE_MAX_HOPS)
            .max(1)
    }

    pub fn traceroute_timeout(&self) -> Duration {
        secs(self.traceroute_timeout_secs, DEFAULT_TRACEROUTE_TIMEOUT_SECS)
    }

    pub fn traceroute_max_lines(&self) -> usize {
        self.traceroute_max_lines
            .unwrap_or(DEFAULT_TRACEROUTE_MAX_LINES)
    }

    pub fn psql_enabled(&self) -> bool {
        self.psql.unwrap_or(true)
    }

    pub fn psql_timeout(&self) -> Duration {
        secs(self.psql_timeout_secs, DEFAULT_PSQL_TIMEOUT_SECS)
    }
}

impl DatabaseSettings {
    pub fn schema(&self) -> String {
        self.schema
            .clone()
            .unwrap_or_else(|| DEFAULT_SCHEMA.to_string())
    }

    pub fn table_pattern(&self) -> String {
        self.table_pattern
            .clone()
            .unwrap_or_else(|| DEFAULT_TABLE_PATTERN.to_string())
    }

    pub fn sample_columns(&self) -> Vec<String> {
        match &self.sample_columns {
            Some(columns) => columns
                .iter()
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
            None => DEFAULT_SAMPLE_COLUMNS.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn sample_limit(&self) -> u32 {
        self.sample_limit.unwrap_or(DEFAULT_SAMPLE_LIMIT)
    }

    pub fn connect_timeout(&self) -> Duration {
        secs(self.connect_timeout_secs, DEFAULT_CONNECT_TIMEOUT_SECS)
    }

    pub fn preflight_ping(&self) -> bool {
        self.preflight_ping.unwrap_or(true)
    }

    pub fn preflight_ping_timeout(&self) -> Duration {
        secs(
            self.preflight_ping_timeout_secs,
            DEFAULT_PREFLIGHT_PING_TIMEOUT_SECS,
        )
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
}

fn secs(value: Option<u64>, default: u64) -> Duration {
    Duration::from_secs(value.unwrap_or(default))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_load_settings() {
        unsafe {
            std::env::set_var("PGDIAG__TARGET__HOST", "db.internal");
            std::env::set_var("PGDIAG__TARGET__PORT", "6543");
            std::env::set_var("PGDIAG__NETWORK__PSQL", "false");
            std::env::set_var("PGDIAG__DATABASE__SAMPLE_COLUMNS", "id,slug");
        }

        let settings = Settings::new().expect("Failed to load settings");

        assert_eq!(settings.target.host.as_deref(), Some("db.internal"));
        assert_eq!(settings.target.port, Some(6543));
        assert!(!settings.network.psql_enabled());
        assert_eq!(settings.database.sample_columns(), vec!["id", "slug"]);

        unsafe {
            std::env::remove_var("PGDIAG__TARGET__HOST");
            std::env::remove_var("PGDIAG__TARGET__PORT");
            std::env::remove_var("PGDIAG__NETWORK__PSQL");
            std::env::remove_var("PGDIAG__DATABASE__SAMPLE_COLUMNS");
        }
    }

    #[test]
    #[serial]
    fn test_target_values_kept_verbatim() {
        unsafe {
            std::env::set_var("PGDIAG__TARGET__PASSWORD", "00123");
            std::env::set_var("PGDIAG__TARGET__DATABASE", "1e3");
            std::env::set_var("PGDIAG__TARGET__USER", "true");
            std::env::set_var("PGDIAG__TARGET__PORT", "6543");
            std::env::set_var("PGDIAG__NETWORK__PING_COUNT", "7");
        }

        let settings = Settings::new().expect("Failed to load settings");
        let target = settings.to_target().unwrap();

        assert_eq!(target.password.as_deref(), Some("00123"));
        assert_eq!(target.database, "1e3");
        assert_eq!(target.user, "true");
        assert_eq!(target.port, 6543);
        assert_eq!(settings.network.ping_count(), 7);

        unsafe {
            std::env::remove_var("PGDIAG__TARGET__PASSWORD");
            std::env::remove_var("PGDIAG__TARGET__DATABASE");
            std::env::remove_var("PGDIAG__TARGET__USER");
            std::env::remove_var("PGDIAG__TARGET__PORT");
            std::env::remove_var("PGDIAG__NETWORK__PING_COUNT");
        }
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();

        assert_eq!(settings.network.ping_count(), 3);
        assert_eq!(settings.network.ping_timeout(), Duration::from_secs(15));
        assert_eq!(settings.network.tcp_timeout(), Duration::from_secs(10));
        assert_eq!(settings.network.dns_timeout(), Duration::from_secs(10));
        assert_eq!(settings.network.traceroute_max_hops(), 10);
        assert_eq!(settings.network.traceroute_max_lines(), 6);
        assert!(settings.network.psql_enabled());

        assert_eq!(settings.database.schema(), "public");
        assert_eq!(settings.database.table_pattern(), "diapositiva");
        assert_eq!(
            settings.database.sample_columns(),
            vec!["id", "titulo", "slug", "estado"]
        );
        assert_eq!(settings.database.sample_limit(), 5);
        assert_eq!(
            settings.database.preflight_ping_timeout(),
            Duration::from_secs(10)
        );
    }

    #[test]
    fn test_to_target() {
        let settings = Settings {
            target: TargetSettings {
                host: Some("localhost".to_string()),
                port: None,
                database: None,
                user: Some("admin".to_string()),
                password: Some(String::new()),
                sslmode: Some("verify-full".to_string()),
            },
            ..Default::default()
        };

        let target = settings.to_target().unwrap();
        assert_eq!(target.host, "localhost");
        assert_eq!(target.port, DEFAULT_PORT);
        assert_eq!(target.database, DEFAULT_DATABASE);
        assert_eq!(target.user, "admin");
        assert_eq!(target.password, None);
        assert_eq!(target.ssl_mode, SslMode::VerifyFull);
    }

    #[test]
    fn test_to_target_rejects_plaintext() {
        let settings = Settings {
            target: TargetSettings {
                sslmode: Some("disable".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        assert!(settings.to_target().is_err());
    }
}
