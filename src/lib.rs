//! Synchronises a user's star-balloon charge and gift history from the remote
//! point service into a locally cached, deduplicated snapshot with rollups.

pub mod api_client;
pub mod config;
pub mod csv_export;
pub mod domain;
pub mod error;
pub mod extract;
pub mod infra;
pub mod routes;
pub mod usecases;
