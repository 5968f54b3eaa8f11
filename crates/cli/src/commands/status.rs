//! Rollover status of scaling requests

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use kube::api::ListParams;
use kube::{Api, Client, ResourceExt};
use scaler_lib::quantity::format_concurrency;
use scaler_lib::resources::{RolloverPhase, TrafficStat};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{color_phase, format_cost, print_json, print_table, OutputFormat};

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "Namespace")]
    namespace: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Service")]
    service: String,
    #[tabled(rename = "Traffic")]
    traffic: String,
    #[tabled(rename = "Phase")]
    phase: String,
    #[tabled(rename = "Profile")]
    profile: String,
    #[tabled(rename = "Pods")]
    pods: String,
    #[tabled(rename = "Active")]
    active: String,
    #[tabled(rename = "Rollover")]
    rollover: String,
    #[tabled(rename = "Since")]
    since: String,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct StatusSummary {
    namespace: String,
    name: String,
    service: String,
    traffic: String,
    phase: RolloverPhase,
    resource_level: Option<String>,
    concurrency_target: Option<f64>,
    pod_count: Option<u64>,
    total_cost: Option<f64>,
    active_revision: Option<String>,
    previous_revision: Option<String>,
    target_revision: Option<String>,
    phase_started_at: Option<DateTime<Utc>>,
    message: Option<String>,
}

impl StatusSummary {
    fn from_resource(stat: &TrafficStat) -> Self {
        let status = stat.current_status();
        let chosen = status.chosen_profile.as_ref();
        Self {
            namespace: stat.namespace().unwrap_or_default(),
            name: stat.name_any(),
            service: stat.spec.service_name.clone(),
            traffic: stat.spec.scaling_input_traffic.clone(),
            phase: status.phase,
            resource_level: chosen.map(|c| c.resource_type.format(c.resource_level)),
            concurrency_target: chosen.map(|c| c.concurrency_target),
            pod_count: chosen.map(|c| c.pod_count),
            total_cost: chosen.map(|c| c.total_cost),
            active_revision: status.active_revision.clone(),
            previous_revision: status.previous_revision.clone(),
            target_revision: status.target_revision.clone(),
            phase_started_at: status.phase_started_at,
            message: status.message.clone(),
        }
    }

    fn row(&self) -> StatusRow {
        let profile = match (&self.resource_level, self.concurrency_target) {
            (Some(level), Some(target)) => format!("{} @ {}", level, format_concurrency(target)),
            _ => "-".to_string(),
        };
        let pods = match (self.pod_count, self.total_cost) {
            (Some(pods), Some(cost)) => format!("{} (cost {})", pods, format_cost(cost)),
            _ => "-".to_string(),
        };
        let rollover = match (&self.previous_revision, &self.target_revision) {
            (Some(previous), Some(target)) => format!("{} -> {}", previous, target),
            (None, Some(target)) => format!("-> {}", target),
            _ => self.message.clone().unwrap_or_else(|| "-".to_string()),
        };

        StatusRow {
            namespace: self.namespace.clone(),
            name: self.name.clone(),
            service: self.service.clone(),
            traffic: self.traffic.clone(),
            phase: color_phase(self.phase),
            profile,
            pods,
            active: self.active_revision.clone().unwrap_or_else(|| "-".to_string()),
            rollover,
            since: self
                .phase_started_at
                .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

/// List TrafficStats with their chosen profile and rollover progress
pub async fn show_status(
    client: Client,
    namespace: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let api: Api<TrafficStat> = match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    };
    let list = api
        .list(&ListParams::default())
        .await
        .context("Failed to list TrafficStats")?;

    let mut summaries: Vec<StatusSummary> =
        list.items.iter().map(StatusSummary::from_resource).collect();
    summaries.sort_by(|a, b| (&a.namespace, &a.name).cmp(&(&b.namespace, &b.name)));

    match format {
        OutputFormat::Json => print_json(&summaries)?,
        OutputFormat::Table => {
            let rows: Vec<StatusRow> = summaries.iter().map(StatusSummary::row).collect();
            print_table(&rows);
        }
    }
    Ok(())
}
