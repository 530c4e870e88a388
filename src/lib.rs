// SPDX-License-Identifier: EUPL-1.2

//! CSP Reports: collects Content-Security-Policy violation reports.
//!
//! Browsers POST violation reports to the `report-uri` endpoint. Each report
//! runs through the [`pipeline`]: optional filtering, admin mail, logging,
//! persistence of a [normalized](normalize) record and custom handlers.
//! Stored reports are swept by [`retention`] and rolled up by [`summary`].

pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod fields;
pub mod handlers;
pub mod hooks;
pub mod mail;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod retention;
pub mod summary;

pub use db::{AppState, ReportRepository};
pub use error::{ReportsError, Result};
pub use models::{IncomingReport, StoredReport, ViolationReport};
