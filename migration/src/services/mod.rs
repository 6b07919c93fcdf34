//! Infrastructure services
//!
//! - **client**: REST transport stack, session, paging and content API clients
//! - **content**: content model shared by the clients and the pipeline
//! - **files**: storage boundary for downloaded content files
//! - **config**: configuration model and live reader
//! - **errors**: migration-level error taxonomy

pub mod client;
pub mod config;
pub mod content;
pub mod errors;
pub mod files;
