//! Profile catalog loading
//!
//! A service's candidate operating points live in a ConfigMap named after the
//! service. Two reserved keys carry catalog metadata; every other entry maps a
//! resource level to the concurrency target measured for it.

use crate::models::ResourceProfile;
use crate::optimizer::{self, ChosenProfile, SelectionError};
use crate::quantity::ResourceType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::warn;

/// Reserved key naming the resource dimension the levels are expressed in
pub const RESOURCE_TYPE_KEY: &str = "resources-intensive-type";

/// Reserved key carrying the fixed requirement for the other dimension
pub const REQUIRED_RESOURCES_KEY: &str = "required-resources";

/// Errors that make a whole catalog unusable
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CatalogError {
    #[error("catalog is missing reserved key '{0}'")]
    MissingMetadata(&'static str),
    #[error("catalog key '{key}' has invalid value '{value}': {reason}")]
    InvalidMetadata {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Fixed catalog metadata
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CatalogMetadata {
    pub resource_type: ResourceType,
    /// Requirement for `resource_type.complement()`, in its canonical units
    pub complementary_requirement: f64,
}

/// A catalog row that could not be turned into a profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedRow {
    pub key: String,
    pub value: String,
    pub reason: String,
}

/// Typed view of a service's profile ConfigMap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileCatalog {
    pub metadata: CatalogMetadata,
    /// Valid candidates ordered by ascending resource level
    pub candidates: Vec<ResourceProfile>,
    pub rejected: Vec<RejectedRow>,
}

impl ProfileCatalog {
    /// Build a catalog from raw ConfigMap data.
    ///
    /// Malformed rows are collected in `rejected` and do not fail the catalog;
    /// missing or malformed metadata does.
    pub fn from_config_map_data(data: &BTreeMap<String, String>) -> Result<Self, CatalogError> {
        let raw_type = data
            .get(RESOURCE_TYPE_KEY)
            .ok_or(CatalogError::MissingMetadata(RESOURCE_TYPE_KEY))?;
        let resource_type: ResourceType =
            raw_type
                .parse()
                .map_err(|reason| CatalogError::InvalidMetadata {
                    key: RESOURCE_TYPE_KEY,
                    value: raw_type.clone(),
                    reason,
                })?;

        let raw_required = data
            .get(REQUIRED_RESOURCES_KEY)
            .ok_or(CatalogError::MissingMetadata(REQUIRED_RESOURCES_KEY))?;
        let complementary_requirement = parse_level(raw_required, resource_type.complement())
            .map_err(|reason| CatalogError::InvalidMetadata {
                key: REQUIRED_RESOURCES_KEY,
                value: raw_required.clone(),
                reason,
            })?;

        let mut candidates = Vec::new();
        let mut rejected = Vec::new();

        for (key, value) in data {
            if key == RESOURCE_TYPE_KEY || key == REQUIRED_RESOURCES_KEY {
                continue;
            }
            match parse_row(key, value, resource_type) {
                Ok(profile) => candidates.push(profile),
                Err(reason) => {
                    warn!(key = %key, value = %value, reason = %reason, "Skipping malformed catalog row");
                    rejected.push(RejectedRow {
                        key: key.clone(),
                        value: value.clone(),
                        reason,
                    });
                }
            }
        }

        candidates.sort_by(|a, b| {
            a.resource_level
                .total_cmp(&b.resource_level)
                .then(b.concurrency_target.total_cmp(&a.concurrency_target))
        });

        Ok(Self {
            metadata: CatalogMetadata {
                resource_type,
                complementary_requirement,
            },
            candidates,
            rejected,
        })
    }

    pub fn resource_type(&self) -> ResourceType {
        self.metadata.resource_type
    }

    /// Pick the cheapest candidate for the given traffic volume
    pub fn select(&self, traffic_volume: f64) -> Result<ChosenProfile, SelectionError> {
        optimizer::select_profile(&self.candidates, traffic_volume)
    }
}

fn parse_row(key: &str, value: &str, resource_type: ResourceType) -> Result<ResourceProfile, String> {
    let resource_level = parse_level(key, resource_type)?;
    let concurrency_target = parse_positive(value)
        .map_err(|reason| format!("concurrency target: {}", reason))?;
    Ok(ResourceProfile::new(resource_level, concurrency_target))
}

/// Plain decimals are canonical units; anything else (suffixes, exponents,
/// signs) is parsed as a quantity
fn parse_level(raw: &str, resource_type: ResourceType) -> Result<f64, String> {
    let trimmed = raw.trim();
    let value = if is_plain_decimal(trimmed) {
        trimmed
            .parse::<f64>()
            .map_err(|_| format!("'{}' is not a number", raw))?
    } else {
        resource_type
            .canonical_value(trimmed)
            .map_err(|e| e.to_string())?
    };
    ensure_positive(raw, value)
}

fn is_plain_decimal(s: &str) -> bool {
    s.bytes().any(|b| b.is_ascii_digit())
        && s.bytes().all(|b| b.is_ascii_digit() || b == b'.')
        && s.bytes().filter(|&b| b == b'.').count() <= 1
}

fn parse_positive(raw: &str) -> Result<f64, String> {
    let value = raw
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("'{}' is not a number", raw))?;
    ensure_positive(raw, value)
}

fn ensure_positive(raw: &str, value: f64) -> Result<f64, String> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(format!("'{}' must be a finite number greater than zero", raw))
    }
}
