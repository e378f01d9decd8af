#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::pedantic
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::similar_names
)]
#![forbid(unsafe_code)]

mod config;
pub use config::{CONFIG, DynAppConfig};

pub mod api;
pub mod catalog;
pub mod implementations;
pub mod serve;
pub mod service;
pub mod spec;

pub use axum;
pub use sqlx;
pub use tokio;
pub use tokio_util::sync::CancellationToken;
pub use tracing;

#[cfg(test)]
mod tests;
