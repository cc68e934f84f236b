pub mod activity;
pub mod bridge;
pub mod cli;
pub mod engine;
pub mod error;
pub mod export;
pub mod fan_in;
pub mod gpx;
pub mod store;
pub mod translate;
pub mod types;
pub mod utils;

pub use bridge::HealthBridge;
pub use engine::QueryEngine;
pub use error::{HealthError, Rejection, Result, StoreError};
pub use store::{Capabilities, HealthStore};
