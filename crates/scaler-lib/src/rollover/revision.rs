//! Revision naming
//!
//! Knative names revisions `<service>-<NNNNN>`, counting up per service.

use tracing::warn;

const FIRST_REVISION_WIDTH: usize = 5;

/// Name the revision that follows `previous`.
///
/// Increments the numeric suffix and keeps its zero padding. Without a
/// usable previous name this is the first revision of the service.
pub fn next_revision_name(service: &str, previous: Option<&str>) -> String {
    let parsed = previous.and_then(|name| {
        let (prefix, suffix) = name.rsplit_once('-')?;
        if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let number = suffix.parse::<u64>().ok()?.checked_add(1)?;
        Some((prefix, number, suffix.len()))
    });

    match parsed {
        Some((prefix, number, width)) => {
            format!("{}-{:0width$}", prefix, number, width = width)
        }
        None => format!("{}-{:0width$}", service, 1, width = FIRST_REVISION_WIDTH),
    }
}

/// Identity of the revision created by a publish.
///
/// The name reported by the update response wins when it is present and
/// differs from `previous`; otherwise the name is derived.
pub fn resolve_new_revision(service: &str, previous: Option<&str>, reported: Option<&str>) -> String {
    let derived = next_revision_name(service, previous);

    match reported {
        Some(reported) if Some(reported) != previous => {
            if reported != derived {
                warn!(
                    service = %service,
                    reported = %reported,
                    derived = %derived,
                    "Reported revision differs from derived name, using reported"
                );
            }
            reported.to_string()
        }
        _ => derived,
    }
}
