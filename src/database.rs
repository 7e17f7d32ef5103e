use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use anyhow::anyhow;
use base64::{engine::general_purpose, Engine as _};
use rusqlite::{types::ValueRef, Connection, OpenFlags, Row};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use tracing::debug;

use crate::{error::Error, permission::Permission};

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DatabaseSettings {
    pub(crate) path: PathBuf,
    /// Overrides the instance-wide `execute-sql` rule for this database.
    #[serde(default)]
    pub(crate) allow_sql: Option<Permission>,
}

/// The named databases charts and filters may query.
#[derive(Debug, Default)]
pub(crate) struct Databases {
    entries: HashMap<String, Database>,
}

impl Databases {
    pub(crate) fn new(settings: HashMap<String, DatabaseSettings>, max_rows: usize) -> Self {
        let entries = settings
            .into_iter()
            .map(|(name, s)| {
                let db = Database {
                    name: name.clone(),
                    path: s.path,
                    allow_sql: s.allow_sql,
                    max_rows,
                };
                (name, db)
            })
            .collect();
        Self { entries }
    }

    pub(crate) fn get(&self, name: &str) -> Result<&Database, Error> {
        self.entries
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("Database does not exist: {name}")))
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }
}

/// A SQLite file opened read-only for the duration of each query.
#[derive(Debug, Clone)]
pub(crate) struct Database {
    name: String,
    path: PathBuf,
    allow_sql: Option<Permission>,
    max_rows: usize,
}

/// Rows returned by a chart query.
#[derive(Debug, Serialize)]
pub(crate) struct QueryResult {
    pub(crate) columns: Vec<String>,
    pub(crate) rows: Vec<Map<String, Value>>,
    /// Whether rows beyond the configured limit were left out.
    pub(crate) truncated: bool,
}

impl Database {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn allow_sql(&self) -> Option<&Permission> {
        self.allow_sql.as_ref()
    }

    fn connect(path: &Path) -> rusqlite::Result<Connection> {
        Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
    }

    /// Runs `sql`, binding every named parameter from `params`.
    ///
    /// Parameters missing from `params` are bound to the empty string.
    pub(crate) async fn execute(
        &self,
        sql: &str,
        params: Vec<(String, String)>,
    ) -> Result<QueryResult, Error> {
        debug!("Running chart query on {}", self.name);
        let path = self.path.clone();
        let sql = sql.to_string();
        let max_rows = self.max_rows;
        spawn_blocking(move || select(&path, &sql, &params, max_rows)).await
    }

    /// Runs `sql` and returns the first column of every row as text.
    pub(crate) async fn first_column(&self, sql: &str) -> Result<Vec<String>, Error> {
        let path = self.path.clone();
        let sql = sql.to_string();
        spawn_blocking(move || {
            let conn = Database::connect(&path)?;
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query([])?;
            let mut values = Vec::new();
            while let Some(row) = rows.next()? {
                values.push(column_text(row.get_ref(0)?));
            }
            Ok(values)
        })
        .await
    }
}

async fn spawn_blocking<T, F>(f: F) -> Result<T, Error>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, Error> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Internal(anyhow!("query task failed: {e}")))?
}

fn select(
    path: &Path,
    sql: &str,
    params: &[(String, String)],
    max_rows: usize,
) -> Result<QueryResult, Error> {
    let conn = Database::connect(path)?;
    let mut stmt = conn.prepare(sql)?;
    for idx in 1..=stmt.parameter_count() {
        let Some(name) = stmt.parameter_name(idx) else {
            continue;
        };
        let key = name.trim_start_matches([':', '@', '$']);
        let value = params
            .iter()
            .find(|(k, _)| k == key)
            .map_or("", |(_, v)| v.as_str());
        stmt.raw_bind_parameter(idx, value)?;
    }
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    let mut rows = stmt.raw_query();
    let mut result = Vec::new();
    let mut truncated = false;
    while let Some(row) = rows.next()? {
        if result.len() == max_rows {
            truncated = true;
            break;
        }
        result.push(to_object(&columns, row)?);
    }
    Ok(QueryResult {
        columns,
        rows: result,
        truncated,
    })
}

fn to_object(columns: &[String], row: &Row<'_>) -> rusqlite::Result<Map<String, Value>> {
    let mut object = Map::with_capacity(columns.len());
    for (idx, column) in columns.iter().enumerate() {
        object.insert(column.clone(), to_json(row.get_ref(idx)?));
    }
    Ok(object)
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => serde_json::json!({
            "$base64": true,
            "encoded": general_purpose::STANDARD.encode(b),
        }),
    }
}

fn column_text(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) | ValueRef::Blob(t) => String::from_utf8_lossy(t).into_owned(),
    }
}

#[cfg(test)]
pub(crate) fn create_jobs_db(dir: &Path) -> PathBuf {
    let path = dir.join("jobs.db");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE offers_view (id INTEGER PRIMARY KEY, date TEXT, source TEXT, salary REAL, logo BLOB);
         INSERT INTO offers_view (date, source, salary, logo) VALUES
            ('2021-01-01', 'APEC', 42000.5, x'0102'),
            ('2021-01-02', 'Indeed', NULL, NULL),
            ('2021-02-01', 'Indeed', 39000, NULL),
            ('2021-03-01', NULL, NULL, NULL);",
    )
    .unwrap();
    path
}
