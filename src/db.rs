use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};
use thiserror::Error;

use crate::config::AppConfig;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Duplicate(String),

    /// A foreign key blocked the write or delete.
    #[error("{0}")]
    Constraint(String),

    #[error("database error: {0}")]
    Database(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

impl From<sqlx::Error> for RepoError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::RowNotFound = err {
            return RepoError::NotFound("record not found".into());
        }
        if let Some(db_err) = err.as_database_error() {
            match db_err.code().as_deref() {
                Some(UNIQUE_VIOLATION) => {
                    let what = match db_err.constraint() {
                        Some(c) if c.contains("email") => "email already exists".to_string(),
                        Some(c) => format!("unique constraint {c} violated"),
                        None => "duplicate record".to_string(),
                    };
                    return RepoError::Duplicate(what);
                }
                Some(FOREIGN_KEY_VIOLATION) => {
                    return RepoError::Constraint(format!(
                        "record is still referenced ({})",
                        db_err.constraint().unwrap_or("foreign key")
                    ));
                }
                _ => {}
            }
        }
        RepoError::Database(err.to_string())
    }
}

/// Postgres-backed implementation of every repository trait.
#[derive(Clone)]
pub struct PgStore {
    pub(crate) pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub async fn connect(config: &AppConfig) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await
        .context("connect to database")
}

/// Builds an `ILIKE` pattern that matches `needle` as a literal substring.
pub(crate) fn contains_pattern(needle: &str) -> String {
    let mut out = String::with_capacity(needle.len() + 2);
    out.push('%');
    for ch in needle.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('%');
    out
}
