//! Fee Service - school fee structure versioning, conflict detection and
//! per-student fee computation.

pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod startup;

pub use error::FeeError;
pub use services::FeeEngine;
