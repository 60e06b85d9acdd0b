//! Scheduled drift monitoring of registered models
//!
//! This module provides:
//! - The `MonitorService` owning baselines, recent buffers and model state
//! - Per-model lifecycle (start, reconfigure, stop) with cancellation
//! - The periodic loop driving drift checks, alert expiry and health scoring

mod scheduler;
mod service;
mod state;


pub use service::{MonitorConfig, MonitorEvent, MonitorService};
pub use state::{ModelConfig, MonitorAck};
