//! CRD manifest output

use anyhow::Result;
use kube::CustomResourceExt;
use scaler_lib::resources::TrafficStat;

use crate::output::print_json;

/// Print the TrafficStat CRD as JSON, ready for `kubectl apply -f -`
pub fn print_crd() -> Result<()> {
    print_json(&TrafficStat::crd())
}
