//! Profile planning: what the controller would choose for a traffic volume

use anyhow::{bail, Context, Result};
use colored::Colorize;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::{Api, Client};
use scaler_lib::catalog::RejectedRow;
use scaler_lib::optimizer::{evaluate_all, ChosenProfile};
use scaler_lib::quantity::{format_concurrency, ResourceType};
use scaler_lib::ProfileCatalog;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tabled::Tabled;

use crate::output::{format_cost, print_info, print_json, print_table, print_warning, OutputFormat};

#[derive(Tabled)]
struct CandidateRow {
    #[tabled(rename = "Level")]
    level: String,
    #[tabled(rename = "Concurrency")]
    concurrency: String,
    #[tabled(rename = "Pods")]
    pods: u64,
    #[tabled(rename = "Cost")]
    cost: String,
    #[tabled(rename = "Chosen")]
    chosen: String,
}

#[derive(Debug, Serialize)]
struct PlanEntry {
    resource_level: f64,
    concurrency_target: f64,
    pod_count: u64,
    total_cost: f64,
    chosen: bool,
}

#[derive(Debug, Serialize)]
struct PlanReport<'a> {
    service: &'a str,
    traffic_volume: f64,
    resource_type: ResourceType,
    required_resources: String,
    candidates: Vec<PlanEntry>,
    rejected: &'a [RejectedRow],
}

/// Load a catalog from a JSON file holding either the ConfigMap data map or
/// a whole ConfigMap with a `data` field
pub fn catalog_from_file(path: &Path) -> Result<ProfileCatalog> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read catalog file {}", path.display()))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse catalog file {}", path.display()))?;
    let data = catalog_data(value)?;
    ProfileCatalog::from_config_map_data(&data).context("Invalid catalog")
}

/// Load the catalog ConfigMap named after the service
pub async fn catalog_from_cluster(
    client: Client,
    namespace: &str,
    service: &str,
) -> Result<ProfileCatalog> {
    let config_map = Api::<ConfigMap>::namespaced(client, namespace)
        .get(service)
        .await
        .with_context(|| format!("Failed to fetch catalog ConfigMap {}/{}", namespace, service))?;
    let data = config_map.data.unwrap_or_default();
    ProfileCatalog::from_config_map_data(&data).context("Invalid catalog")
}

fn catalog_data(value: Value) -> Result<BTreeMap<String, String>> {
    let entries = match value {
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Object(data)) => data,
            Some(_) => bail!("catalog 'data' must be an object"),
            None => map,
        },
        _ => bail!("catalog must be a JSON object"),
    };

    entries
        .into_iter()
        .map(|(key, value)| match value {
            Value::String(s) => Ok((key, s)),
            Value::Number(n) => Ok((key, n.to_string())),
            other => bail!("catalog entry '{}' has unsupported value {}", key, other),
        })
        .collect()
}

/// Evaluate every candidate and mark the one the controller would pick
pub fn show_plan(
    service: &str,
    traffic_volume: f64,
    catalog: &ProfileCatalog,
    format: OutputFormat,
) -> Result<()> {
    let evaluated = evaluate_all(&catalog.candidates, traffic_volume)?;
    let chosen = catalog.select(traffic_volume).ok();
    let entries = mark_chosen(&evaluated, chosen.as_ref());
    let resource_type = catalog.resource_type();

    match format {
        OutputFormat::Json => {
            let report = PlanReport {
                service,
                traffic_volume,
                resource_type,
                required_resources: resource_type
                    .complement()
                    .format(catalog.metadata.complementary_requirement),
                candidates: entries,
                rejected: &catalog.rejected,
            };
            print_json(&report)?;
        }
        OutputFormat::Table => {
            println!(
                "{} {} at traffic {} ({} catalog, {} {})",
                "Plan for".bold(),
                service.cyan(),
                format_concurrency(traffic_volume),
                resource_type,
                resource_type.complement(),
                resource_type
                    .complement()
                    .format(catalog.metadata.complementary_requirement),
            );

            let rows: Vec<CandidateRow> = entries
                .iter()
                .map(|entry| CandidateRow {
                    level: resource_type.format(entry.resource_level),
                    concurrency: format_concurrency(entry.concurrency_target),
                    pods: entry.pod_count,
                    cost: format_cost(entry.total_cost),
                    chosen: if entry.chosen {
                        "✓".green().bold().to_string()
                    } else {
                        String::new()
                    },
                })
                .collect();
            print_table(&rows);

            for row in &catalog.rejected {
                print_warning(&format!(
                    "Skipped '{}: {}' ({})",
                    row.key, row.value, row.reason
                ));
            }
            if let Some(chosen) = &chosen {
                print_info(&format!(
                    "{} pods at {} with concurrency target {}",
                    chosen.pod_count,
                    resource_type.format(chosen.profile.resource_level),
                    format_concurrency(chosen.profile.concurrency_target),
                ));
            }
        }
    }

    if chosen.is_none() {
        bail!("no eligible profile in catalog for {}", service);
    }
    Ok(())
}

fn mark_chosen(evaluated: &[ChosenProfile], chosen: Option<&ChosenProfile>) -> Vec<PlanEntry> {
    let mut marked = false;
    evaluated
        .iter()
        .map(|candidate| {
            let is_chosen = !marked && chosen == Some(candidate);
            marked |= is_chosen;
            PlanEntry {
                resource_level: candidate.profile.resource_level,
                concurrency_target: candidate.profile.concurrency_target,
                pod_count: candidate.pod_count,
                total_cost: candidate.total_cost,
                chosen: is_chosen,
            }
        })
        .collect()
}
