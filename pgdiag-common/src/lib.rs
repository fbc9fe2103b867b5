use std::{fmt, str::FromStr};

use thiserror::Error;
use url::Url;

pub const DEFAULT_HOST: &str = "ep-noisy-band-ag59xk78-pooler.c-2.eu-central-1.aws.neon.tech";
pub const DEFAULT_PORT: u16 = 5432;
pub const DEFAULT_DATABASE: &str = "neondb";
pub const DEFAULT_USER: &str = "solo_lectura";

/// TLS modes accepted for the database connection.
///
/// Only modes that guarantee an encrypted transport exist here; `disable`,
/// `allow` and `prefer` are rejected when parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SslMode {
    #[default]
    Require,
    VerifyCa,
    VerifyFull,
}

impl SslMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SslMode::Require => "require",
            SslMode::VerifyCa => "verify-ca",
            SslMode::VerifyFull => "verify-full",
        }
    }
}

impl fmt::Display for SslMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SslModeError {
    #[error("sslmode '{0}' does not enforce an encrypted connection")]
    Unencrypted(String),
    #[error("unknown sslmode '{0}'")]
    Unknown(String),
}

impl FromStr for SslMode {
    type Err = SslModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "require" => Ok(SslMode::Require),
            "verify-ca" | "verify_ca" => Ok(SslMode::VerifyCa),
            "verify-full" | "verify_full" => Ok(SslMode::VerifyFull),
            "disable" | "allow" | "prefer" => Err(SslModeError::Unencrypted(s.to_string())),
            _ => Err(SslModeError::Unknown(s.to_string())),
        }
    }
}

/// The database instance both diagnostics point at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: Option<String>,
    pub ssl_mode: SslMode,
}

impl Default for Target {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            database: DEFAULT_DATABASE.to_string(),
            user: DEFAULT_USER.to_string(),
            password: None,
            ssl_mode: SslMode::default(),
        }
    }
}

impl Target {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// libpq connection URI without the password.
    ///
    /// The password travels out of band (`PGPASSWORD`) so it never shows up
    /// in a process listing.
    pub fn connection_url(&self) -> Result<String, url::ParseError> {
        let mut url = Url::parse(&format!("postgresql://{}", self.address()))?;
        // postgresql:// URLs always have an authority, so this cannot fail.
        let _ = url.set_username(&self.user);
        url.set_path(&format!("/{}", self.database));
        url.query_pairs_mut()
            .append_pair("sslmode", self.ssl_mode.as_str());
        Ok(url.into())
    }
}

/// Outcome class of a single diagnostic line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Pass,
    Info,
    Warn,
    Fail,
}

impl Status {
    pub fn icon(&self) -> &'static str {
        match self {
            Status::Pass => "✅",
            Status::Info => "ℹ️ ",
            Status::Warn => "⚠️ ",
            Status::Fail => "❌",
        }
    }
}

/// One printed diagnostic result with optional indented detail lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub status: Status,
    pub message: String,
    pub details: Vec<String>,
}

impl Finding {
    pub fn new(status: Status, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            details: Vec::new(),
        }
    }

    pub fn pass(message: impl Into<String>) -> Self {
        Self::new(Status::Pass, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(Status::Info, message)
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self::new(Status::Warn, message)
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self::new(Status::Fail, message)
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.details.push(detail.into());
        self
    }

    pub fn with_details<I, S>(mut self, details: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.details.extend(details.into_iter().map(Into::into));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sslmode_rejects_unencrypted() {
        assert_eq!("require".parse::<SslMode>(), Ok(SslMode::Require));
        assert_eq!("Verify-Full".parse::<SslMode>(), Ok(SslMode::VerifyFull));
        assert_eq!(
            "prefer".parse::<SslMode>(),
            Err(SslModeError::Unencrypted("prefer".to_string()))
        );
        assert!(matches!(
            "bogus".parse::<SslMode>(),
            Err(SslModeError::Unknown(_))
        ));
    }

    #[test]
    fn test_connection_url_omits_password() {
        let target = Target {
            host: "db.example.com".to_string(),
            port: 6543,
            database: "app".to_string(),
            user: "reader".to_string(),
            password: Some("s3cret".to_string()),
            ssl_mode: SslMode::Require,
        };

        let url = target.connection_url().unwrap();
        assert_eq!(url, "postgresql://reader@db.example.com:6543/app?sslmode=require");
        assert!(!url.contains("s3cret"));
    }

    #[test]
    fn test_default_target() {
        let target = Target::default();
        assert_eq!(target.port, 5432);
        assert_eq!(target.address(), format!("{}:5432", DEFAULT_HOST));
        assert!(target.password.is_none());
    }

    #[test]
    fn test_finding_builder() {
        let finding = Finding::fail("boom").with_detail("a").with_details(["b", "c"]);
        assert_eq!(finding.status, Status::Fail);
        assert_eq!(finding.details, vec!["a", "b", "c"]);
    }
}
