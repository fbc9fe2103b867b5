//! Direct database probe.
//!
//! Opens a single connection (no pool), confirms liveness, looks up tables
//! whose name contains a pattern and samples the first match. Every step
//! is recorded in a [`DatabaseReport`] so a failure halfway still shows
//! what succeeded before it.

use std::time::Duration;

use log::{debug, info, warn};
use pgdiag_common::{Finding, SslMode, Target};
use sqlx::{
    Connection, Row,
    postgres::{PgConnectOptions, PgConnection, PgSslMode},
};

use crate::error::{ProbeError, sqlstate_class};
use crate::probes::{CommandRunner, Probe};

const LIVENESS_SQL: &str = "SELECT 1 AS test";
const TABLES_SQL: &str = "SELECT table_name::text \
     FROM information_schema.tables \
     WHERE table_schema = $1 AND table_name LIKE $2 \
     ORDER BY table_name";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSample {
    pub table: String,
    pub row_count: i64,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

/// What the probe managed to observe, step by step.
#[derive(Debug, Default)]
pub struct DatabaseReport {
    pub connected: bool,
    pub liveness: Option<i32>,
    pub tables: Option<Vec<String>>,
    pub sample: Option<TableSample>,
    pub closed: bool,
    pub error: Option<ProbeError>,
}

impl DatabaseReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none() && self.closed
    }
}

pub struct PostgresProbe {
    target: Target,
    schema: String,
    table_pattern: String,
    sample_columns: Vec<String>,
    sample_limit: u32,
    connect_timeout: Duration,
}

impl PostgresProbe {
    pub fn new(target: Target, connect_timeout: Duration) -> Self {
        Self {
            target,
            schema: "public".to_string(),
            table_pattern: String::new(),
            sample_columns: Vec::new(),
            sample_limit: 5,
            connect_timeout,
        }
    }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    pub fn table_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.table_pattern = pattern.into();
        self
    }

    pub fn sample(mut self, columns: Vec<String>, limit: u32) -> Self {
        self.sample_columns = columns;
        self.sample_limit = limit;
        self
    }

    fn connect_options(&self) -> Result<PgConnectOptions, ProbeError> {
        let ssl_mode = match self.target.ssl_mode {
            SslMode::Require => PgSslMode::Require,
            SslMode::VerifyCa => PgSslMode::VerifyCa,
            SslMode::VerifyFull => PgSslMode::VerifyFull,
        };

        let url = self
            .target
            .connection_url()
            .map_err(|e| ProbeError::Connection(format!("invalid connection URL: {}", e)))?;
        // Parsing applies PGPASSWORD, then the ~/.pgpass entry for this
        // host, port, database and user.
        let options = url
            .parse::<PgConnectOptions>()?
            .ssl_mode(ssl_mode)
            .application_name("pgdiag");

        Ok(match &self.target.password {
            Some(password) => options.password(password),
            None => options,
        })
    }

    async fn connect(&self) -> Result<PgConnection, ProbeError> {
        let options = self.connect_options()?;
        debug!("Connecting to {} as {}", self.target.address(), self.target.user);
        match tokio::time::timeout(self.connect_timeout, PgConnection::connect_with(&options)).await
        {
            Ok(result) => Ok(result?),
            Err(_) => Err(ProbeError::Connection(format!(
                "timed out after {}s",
                self.connect_timeout.as_secs()
            ))),
        }
    }

    pub async fn collect(&self) -> DatabaseReport {
        let mut report = DatabaseReport::default();
        if let Err(e) = self.collect_into(&mut report).await {
            warn!("Database probe stopped: {}", e);
            report.error = Some(e);
        }
        report
    }

    async fn collect_into(&self, report: &mut DatabaseReport) -> Result<(), ProbeError> {
        let conn = self.connect().await?;
        report.connected = true;
        info!("Connected to {}", self.target.address());
        self.walk(conn, report).await
    }

    /// Steps after connecting. The connection is closed whatever they return.
    async fn walk(
        &self,
        mut conn: PgConnection,
        report: &mut DatabaseReport,
    ) -> Result<(), ProbeError> {
        let inspected = self.inspect(&mut conn, report).await;
        let closed = conn.close().await;
        if let Err(e) = &closed {
            warn!("Closing the connection failed: {}", e);
        }
        report.closed = closed.is_ok();
        inspected?;
        closed?;
        Ok(())
    }

    async fn inspect(
        &self,
        conn: &mut PgConnection,
        report: &mut DatabaseReport,
    ) -> Result<(), ProbeError> {
        let liveness: i32 = sqlx::query_scalar(LIVENESS_SQL)
            .fetch_one(&mut *conn)
            .await?;
        report.liveness = Some(liveness);

        let tables: Vec<String> = sqlx::query_scalar(TABLES_SQL)
            .bind(&self.schema)
            .bind(like_pattern(&self.table_pattern))
            .fetch_all(&mut *conn)
            .await?;
        info!("Tables matching '{}': {:?}", self.table_pattern, tables);
        let first = tables.first().cloned();
        report.tables = Some(tables);

        let Some(table) = first else {
            return Ok(());
        };

        let relation = format!("{}.{}", quote_ident(&self.schema), quote_ident(&table));
        let count_sql = format!("SELECT COUNT(*) FROM {}", relation);
        let row_count: i64 = sqlx::query_scalar(&count_sql)
            .fetch_one(&mut *conn)
            .await?;

        let sample_sql = sample_query(&relation, &self.sample_columns);
        debug!("Sampling with: {}", sample_sql);
        let rows = sqlx::query(&sample_sql)
            .bind(i64::from(self.sample_limit))
            .fetch_all(&mut *conn)
            .await?;

        let width = self.sample_columns.len().max(1);
        let rows = rows
            .iter()
            .map(|row| {
                (0..width)
                    .map(|i| row.try_get::<Option<String>, _>(i))
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;

        report.sample = Some(TableSample {
            table,
            row_count,
            columns: self.sample_columns.clone(),
            rows,
        });
        Ok(())
    }
}

/// `%pattern%` with LIKE wildcards in the pattern escaped.
pub fn like_pattern(pattern: &str) -> String {
    let escaped = pattern
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Sample query over `relation`; with no columns, whole rows come back as JSON.
pub fn sample_query(relation: &str, columns: &[String]) -> String {
    if columns.is_empty() {
        return format!("SELECT row_to_json(t)::text FROM {} AS t LIMIT $1", relation);
    }
    let projection = columns
        .iter()
        .map(|c| format!("{}::text", quote_ident(c)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("SELECT {} FROM {} LIMIT $1", projection, relation)
}

/// Turn a report into printable findings, in the order the steps ran.
pub fn render(report: &DatabaseReport, pattern: &str) -> Vec<Finding> {
    let mut findings = Vec::new();

    if report.connected {
        findings.push(Finding::pass("Connection established"));
    }
    if let Some(value) = report.liveness {
        findings.push(Finding::pass(format!("Liveness query succeeded: {}", value)));
    }
    if let Some(tables) = &report.tables {
        findings.push(Finding::info(format!(
            "Tables matching '{}': {:?}",
            pattern, tables
        )));
    }
    if let Some(sample) = &report.sample {
        findings.push(Finding::info(format!(
            "Total rows in {}: {}",
            sample.table, sample.row_count
        )));
        findings.push(
            Finding::info(format!("First {} rows:", sample.rows.len()))
                .with_details(sample.rows.iter().map(|row| format_row(&sample.columns, row))),
        );
    }
    if let Some(error) = &report.error {
        let mut finding = Finding::fail(error.to_string());
        if let Some(class) = error.sqlstate().and_then(sqlstate_class) {
            finding = finding.with_detail(format!("SQLSTATE class: {}", class));
        }
        findings.push(finding);
    }
    if report.closed {
        findings.push(Finding::pass("Connection closed"));
    }

    findings
}

fn format_row(columns: &[String], row: &[Option<String>]) -> String {
    let value = |v: &Option<String>| v.clone().unwrap_or_else(|| "NULL".to_string());
    if columns.is_empty() {
        return format!("- {}", row.first().map(value).unwrap_or_default());
    }
    let fields = columns
        .iter()
        .zip(row)
        .map(|(column, v)| format!("{}: {}", column, value(v)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("- {}", fields)
}

impl Probe for PostgresProbe {
    fn title(&self) -> String {
        "🔍 Testing database connection...".to_string()
    }

    async fn run<R: CommandRunner>(&self, _runner: &R) -> Vec<Finding> {
        let report = self.collect().await;
        render(&report, &self.table_pattern)
    }
}
