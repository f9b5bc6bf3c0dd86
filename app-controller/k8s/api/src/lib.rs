#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod labels;
pub mod networking;

pub use self::{
    labels::{Labels, Selector},
    networking::{DestinationRule, VirtualService},
};
pub use k8s_openapi::{
    api::{
        self,
        apps::v1::{Deployment, DeploymentSpec, DeploymentStrategy},
        core::v1::{Namespace, PodTemplateSpec, Service, ServicePort, ServiceSpec},
    },
    apimachinery::pkg::apis::meta::v1::LabelSelector,
};
pub use kube::{
    api::{
        Api, DeleteParams, ListParams, ObjectMeta, PostParams, PropagationPolicy, ResourceExt,
    },
    Client, Error, Resource,
};

/// Label on a `Namespace` that enables sidecar injection.
pub const MESH_INJECTION_LABEL: &str = "istio-injection";

/// Value of [`MESH_INJECTION_LABEL`] when injection is enabled.
pub const MESH_INJECTION_ENABLED: &str = "enabled";

/// Returns true if the namespace carries the sidecar injection label.
pub fn is_mesh_enabled(ns: &Namespace) -> bool {
    ns.labels()
        .get(MESH_INJECTION_LABEL)
        .map(|v| v == MESH_INJECTION_ENABLED)
        .unwrap_or(false)
}
