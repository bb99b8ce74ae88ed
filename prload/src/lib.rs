#![doc = include_str!("../README.md")]

pub mod client;
pub mod dispatch;
pub mod profile;
pub mod recorder;
pub mod scheduler;
pub mod seed;
pub mod thresholds;

#[cfg(test)]
mod testing;

pub use client::{ApiClient, ApiResponse, ClientError, TargetApi};
pub use load_test::{LoadTest, RunReport};

pub mod prelude {
    pub use crate::client::{ApiClient, TargetApi};
    pub use crate::load_test::{LoadTest, RunReport};
    pub use prload_core::{Population, RunConfig, RunStatistics, Stage, Thresholds};
}
