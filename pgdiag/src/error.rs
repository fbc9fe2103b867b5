use sqlx::Error as SqlxError;
use thiserror::Error as ThisError;

/// SQLSTATE classes that mean the session could not be established or used.
const CONNECTION_CLASSES: [&str; 6] = ["08", "28", "3D", "53", "57", "58"];

#[derive(Debug, ThisError)]
pub enum ProbeError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("PostgreSQL error [{code}]: {message}")]
    Postgres { code: String, message: String },

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl ProbeError {
    /// SQLSTATE of a server-side error, when there is one.
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            ProbeError::Postgres { code, .. } => Some(code),
            _ => None,
        }
    }
}

impl From<SqlxError> for ProbeError {
    fn from(e: SqlxError) -> Self {
        match &e {
            SqlxError::Database(db) => {
                let code = db.code().map(|c| c.into_owned()).unwrap_or_default();
                let message = db.message().to_string();
                if is_connection_sqlstate(&code) {
                    ProbeError::Connection(format!("{} (SQLSTATE {})", message, code))
                } else {
                    ProbeError::Postgres { code, message }
                }
            }
            SqlxError::Io(_)
            | SqlxError::Tls(_)
            | SqlxError::Protocol(_)
            | SqlxError::Configuration(_)
            | SqlxError::PoolTimedOut
            | SqlxError::PoolClosed => ProbeError::Connection(e.to_string()),
            _ => ProbeError::Unexpected(e.to_string()),
        }
    }
}

pub fn is_connection_sqlstate(code: &str) -> bool {
    code.get(..2)
        .is_some_and(|class| CONNECTION_CLASSES.contains(&class))
}

/// Human name of the SQLSTATE class (first two characters of the code).
pub fn sqlstate_class(code: &str) -> Option<&'static str> {
    let name = match code.get(..2)? {
        "08" => "connection exception",
        "0A" => "feature not supported",
        "22" => "data exception",
        "23" => "integrity constraint violation",
        "25" => "invalid transaction state",
        "28" => "invalid authorization specification",
        "3D" => "invalid catalog name",
        "3F" => "invalid schema name",
        "40" => "transaction rollback",
        "42" => "syntax error or access rule violation",
        "53" => "insufficient resources",
        "54" => "program limit exceeded",
        "55" => "object not in prerequisite state",
        "57" => "operator intervention",
        "58" => "system error",
        "XX" => "internal error",
        _ => return None,
    };
    Some(name)
}
