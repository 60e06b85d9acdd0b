//! Subcommand implementations

pub mod drift;
pub mod models;

/// URL path of a per-model API resource
pub(crate) fn model_path(model_id: &str, resource: &str) -> String {
    format!("api/v1/models/{}/{}", model_id, resource)
}
