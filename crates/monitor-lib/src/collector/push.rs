//! In-process source that producers push points into

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

use super::MetricSource;
use crate::models::MetricPoint;

/// Default number of points queued per model
const DEFAULT_CAPACITY: usize = 10_000;

/// Queue of pushed points, drained per model on collection
pub struct PushSource {
    name: String,
    capacity: usize,
    queues: Mutex<HashMap<String, VecDeque<MetricPoint>>>,
}

impl PushSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capacity: DEFAULT_CAPACITY,
            queues: Mutex::new(HashMap::new()),
        }
    }

    /// Set the per-model queue capacity; the oldest points are dropped beyond it
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Queue one point
    pub fn push(&self, point: MetricPoint) {
        let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        let queue = queues.entry(point.model_id.clone()).or_default();
        queue.push_back(point);

        if queue.len() > self.capacity {
            let overflow = queue.len() - self.capacity;
            queue.drain(..overflow);
            warn!(
                source = %self.name,
                dropped = overflow,
                "Push queue full, dropping oldest points"
            );
        }
    }

    /// Queue several points
    pub fn push_batch(&self, points: impl IntoIterator<Item = MetricPoint>) {
        for point in points {
            self.push(point);
        }
    }

    /// Drop every queued point of a model, returning how many went
    pub fn discard(&self, model_id: &str) -> usize {
        self.queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(model_id)
            .map(|q| q.len())
            .unwrap_or(0)
    }

    /// Number of models with a queue
    pub fn queued_models(&self) -> usize {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Number of queued points for a model
    pub fn pending(&self, model_id: &str) -> usize {
        self.queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(model_id)
            .map(|q| q.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl MetricSource for PushSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn collect(&self, model_id: &str) -> Result<Vec<MetricPoint>> {
        let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(queues
            .remove(model_id)
            .map(|q| q.into_iter().collect())
            .unwrap_or_default())
    }

    fn retain_models(&self, monitored: &[String]) {
        let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        let before = queues.len();
        queues.retain(|model_id, _| monitored.contains(model_id));

        let evicted = before - queues.len();
        if evicted > 0 {
            debug!(source = %self.name, evicted = evicted, "Dropped queues of unmonitored models");
        }
    }
}
