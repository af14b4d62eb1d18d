//! callctl-core: database access, constraint probing and webhook mapping
//!
//! Shared by the `callctl` binary and the webhook server:
//! - `config`: env files, settings, optional TOML config
//! - `db`: the `TableStore` trait with REST, Postgres and in-memory backends
//! - `prober`: trial-insert discovery of accepted CHECK/enum values
//! - `webhook`: calling-platform event payloads mapped onto `calls` rows
//! - `vapi`: read-only calling-platform REST client

pub mod config;
pub mod db;
pub mod models;
pub mod prober;
pub mod vapi;
pub mod webhook;

pub use config::{CallctlConfig, ConfigError, KeyRole, Secret, Settings};
pub use db::{connect, Backend, Filter, Order, Query, StoreError, TableStore};
pub use models::{Call, Column, Row, Table, ValidationError};
pub use prober::{probe, ProbeReport, TableTrial, Trial};
pub use vapi::{VapiClient, VapiError};
pub use webhook::{apply_event, apply_patch, Applied, CallPatch, CallTarget, WebhookEnvelope};
