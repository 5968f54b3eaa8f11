//! Cost optimizer
//!
//! For a declared traffic volume each candidate needs
//! `ceil(traffic / concurrency_target)` pods, costing `pods * resource_level`.
//! The cheapest candidate wins. Equal costs are broken by the lower resource
//! level, then the lower pod count, then catalog order, so the result never
//! depends on how the candidates happened to be iterated.

use crate::models::ResourceProfile;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use thiserror::Error;

/// Relative tolerance under which two costs are treated as equal
const COST_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SelectionError {
    #[error("traffic volume must be a finite number greater than zero, got {0}")]
    InvalidTraffic(f64),
    #[error("no eligible profile in catalog")]
    NoEligibleProfile,
}

/// A profile evaluated against a traffic volume
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChosenProfile {
    pub profile: ResourceProfile,
    pub pod_count: u64,
    pub total_cost: f64,
}

/// Evaluate one candidate; `None` when the candidate is invalid
pub fn evaluate(profile: &ResourceProfile, traffic_volume: f64) -> Option<ChosenProfile> {
    if !profile.is_valid() {
        return None;
    }
    let pod_count = (traffic_volume / profile.concurrency_target).ceil() as u64;
    Some(ChosenProfile {
        profile: *profile,
        pod_count,
        total_cost: pod_count as f64 * profile.resource_level,
    })
}

/// Evaluate every valid candidate, keeping catalog order
pub fn evaluate_all(
    candidates: &[ResourceProfile],
    traffic_volume: f64,
) -> Result<Vec<ChosenProfile>, SelectionError> {
    validate_traffic(traffic_volume)?;
    Ok(candidates
        .iter()
        .filter_map(|p| evaluate(p, traffic_volume))
        .collect())
}

/// Select the minimal-cost profile for `traffic_volume`
pub fn select_profile(
    candidates: &[ResourceProfile],
    traffic_volume: f64,
) -> Result<ChosenProfile, SelectionError> {
    evaluate_all(candidates, traffic_volume)?
        .into_iter()
        .fold(None, |best: Option<ChosenProfile>, candidate| match best {
            Some(current) if compare(&candidate, &current) != Ordering::Less => Some(current),
            _ => Some(candidate),
        })
        .ok_or(SelectionError::NoEligibleProfile)
}

fn validate_traffic(traffic_volume: f64) -> Result<(), SelectionError> {
    if traffic_volume.is_finite() && traffic_volume > 0.0 {
        Ok(())
    } else {
        Err(SelectionError::InvalidTraffic(traffic_volume))
    }
}

fn compare(a: &ChosenProfile, b: &ChosenProfile) -> Ordering {
    let scale = a.total_cost.abs().max(b.total_cost.abs()).max(1.0);
    let cost = if (a.total_cost - b.total_cost).abs() <= COST_EPSILON * scale {
        Ordering::Equal
    } else {
        a.total_cost.total_cmp(&b.total_cost)
    };

    cost.then(a.profile.resource_level.total_cmp(&b.profile.resource_level))
        .then(a.pod_count.cmp(&b.pod_count))
}
