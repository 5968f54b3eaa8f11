//! Reads the operating point a Knative service currently runs

use crate::models::CurrentDeployment;
use crate::quantity::{QuantityError, ResourceType};
use crate::resources::{KnativeService, TARGET_ANNOTATION};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReadError {
    #[error("revision template has no containers")]
    NoContainer,
    #[error("concurrency target annotation '{0}' is not a positive number")]
    MalformedConcurrency(String),
    #[error("{resource} limit '{value}' is malformed: {source}")]
    MalformedQuantity {
        resource: ResourceType,
        value: String,
        source: QuantityError,
    },
}

/// Snapshot the deployed concurrency target and resource limit.
///
/// A missing annotation or limit is reported as `None`; present but
/// malformed values fail the read.
pub fn read_current_deployment(
    service: &KnativeService,
    resource_type: ResourceType,
) -> Result<CurrentDeployment, ReadError> {
    let container = service.primary_container().ok_or(ReadError::NoContainer)?;

    let concurrency_target = match service
        .template_annotations()
        .and_then(|annotations| annotations.get(TARGET_ANNOTATION))
    {
        Some(raw) => Some(parse_target(raw)?),
        None => None,
    };

    let limit = container
        .resources
        .as_ref()
        .and_then(|r| r.limits.as_ref())
        .and_then(|limits| limits.get(resource_type.resource_name()));

    let resource_level = match limit {
        Some(quantity) => Some(resource_type.canonical_value(&quantity.0).map_err(|source| {
            ReadError::MalformedQuantity {
                resource: resource_type,
                value: quantity.0.clone(),
                source,
            }
        })?),
        None => None,
    };

    Ok(CurrentDeployment {
        revision_id: service.latest_ready_revision().map(str::to_string),
        concurrency_target,
        resource_level,
        ownership_token: service.metadata.resource_version.clone(),
    })
}

fn parse_target(raw: &str) -> Result<f64, ReadError> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| ReadError::MalformedConcurrency(raw.to_string()))?;
    if !value.is_finite() || value <= 0.0 {
        return Err(ReadError::MalformedConcurrency(raw.to_string()));
    }
    Ok(value)
}
