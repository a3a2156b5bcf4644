// Library root: re-exports all modules so integration tests and the
// `mockdraft` binary share the crate's public API.

pub mod app;
pub mod config;
pub mod db;
pub mod draft;
pub mod error;
pub mod prediction;
pub mod service;
pub mod store;
