// SPDX-License-Identifier: EUPL-1.2

//! Error types for CSP Reports.

/// Application-level errors.
///
/// Malformed reports never produce one of these; they degrade to invalid
/// records instead. Everything here is either operator input, startup
/// configuration or a failing collaborator.
#[derive(Debug, thiserror::Error)]
pub enum ReportsError {
    #[error("'{0}' is not a valid date.")]
    InvalidDate(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Unknown {kind} identifier: {name}")]
    UnknownHook { kind: &'static str, name: String },

    #[error("Mail delivery failed: {0}")]
    Mail(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type Result<T, E = ReportsError> = std::result::Result<T, E>;
