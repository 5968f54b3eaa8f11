//! Kubernetes resource types used by the scaler

pub mod knative;
mod traffic_stat;

pub use knative::{
    KnativeCondition, KnativeRevision, KnativeRevisionSpec, KnativeRevisionStatus, KnativeService,
    KnativeServiceSpec, KnativeServiceStatus, RevisionSpec, RevisionTemplateSpec,
    READY_CONDITION, ROLLOVER_OWNER_ANNOTATION, TARGET_ANNOTATION,
};
pub use traffic_stat::{
    ChosenProfileStatus, RequestError, RolloverPhase, TrafficStat, TrafficStatSpec,
    TrafficStatStatus, API_GROUP,
};
