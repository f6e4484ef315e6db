//! Attachment lifecycle for persisted records: uploads to a storage provider,
//! deletions, path resolution and the HTTP surface that drives them.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod providers;
pub mod repositories;
pub mod routes;
pub mod services;
