//! Metric collection from model serving endpoints
//!
//! This module provides the `MetricSource` abstraction, an in-process push
//! source, and the loop that polls every source for each monitored model and
//! feeds the results into the monitoring service.

mod r#loop;
mod push;


pub use push::PushSource;
pub use r#loop::{CollectionConfig, CollectionLoop, CollectionLoopBuilder};

use crate::models::MetricPoint;
use anyhow::Result;

pub use async_trait::async_trait;

/// Trait for metric source implementations
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Collect the points available for a model since the last call
    async fn collect(&self, model_id: &str) -> Result<Vec<MetricPoint>>;

    /// Drop anything held for models outside `monitored`
    fn retain_models(&self, _monitored: &[String]) {}
}
