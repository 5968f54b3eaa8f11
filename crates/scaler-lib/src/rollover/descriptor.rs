//! Builds the service descriptor that publishes a new profile

use crate::catalog::CatalogMetadata;
use crate::deployment::ReadError;
use crate::optimizer::ChosenProfile;
use crate::quantity::format_concurrency;
use crate::resources::{KnativeService, ROLLOVER_OWNER_ANNOTATION, TARGET_ANNOTATION};
use k8s_openapi::api::core::v1::ResourceRequirements;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// Copy of `service` running `chosen`.
///
/// Identity, labels, annotations, owner references, the traffic block and the
/// container template carry over. The resource version is kept so the write
/// fails if the service changed since it was read. An explicit template name
/// is dropped so that Knative generates the next revision name.
pub fn build_update(
    service: &KnativeService,
    chosen: &ChosenProfile,
    metadata: &CatalogMetadata,
) -> Result<KnativeService, ReadError> {
    let mut spec = service.spec.clone();

    let template_meta = &mut spec.template.metadata;
    template_meta.name = None;
    template_meta
        .annotations
        .get_or_insert_with(Default::default)
        .insert(
            TARGET_ANNOTATION.to_string(),
            format_concurrency(chosen.profile.concurrency_target),
        );

    let container = spec
        .template
        .spec
        .pod
        .containers
        .first_mut()
        .ok_or(ReadError::NoContainer)?;

    let primary = metadata.resource_type;
    let complement = primary.complement();
    let entries = [
        (primary.resource_name(), primary.format(chosen.profile.resource_level)),
        (
            complement.resource_name(),
            complement.format(metadata.complementary_requirement),
        ),
    ];

    let resources = container
        .resources
        .get_or_insert_with(ResourceRequirements::default);
    for (name, value) in entries {
        resources
            .requests
            .get_or_insert_with(Default::default)
            .insert(name.to_string(), Quantity(value.clone()));
        resources
            .limits
            .get_or_insert_with(Default::default)
            .insert(name.to_string(), Quantity(value));
    }

    Ok(KnativeService {
        metadata: ObjectMeta {
            name: service.metadata.name.clone(),
            namespace: service.metadata.namespace.clone(),
            labels: service.metadata.labels.clone(),
            annotations: service.metadata.annotations.clone(),
            owner_references: service.metadata.owner_references.clone(),
            resource_version: service.metadata.resource_version.clone(),
            ..Default::default()
        },
        spec,
        status: None,
    })
}

/// Record `owner` as the TrafficStat driving the rollover of `service`
pub fn stamp_owner(service: &mut KnativeService, owner: &str) {
    service
        .metadata
        .annotations
        .get_or_insert_with(Default::default)
        .insert(ROLLOVER_OWNER_ANNOTATION.to_string(), owner.to_string());
}
