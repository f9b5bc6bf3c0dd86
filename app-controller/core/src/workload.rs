//! Builders for the `Service` and `Deployment`s backing an application.

use crate::labels::{service_labels, WorkloadLabels, APP};
use istio_app_controller_k8s_api::{
    labels::Map, Deployment, DeploymentSpec, DeploymentStrategy, LabelSelector, ObjectMeta,
    PodTemplateSpec, Service, ServicePort, ServiceSpec,
};
use serde::{Deserialize, Serialize};

/// Replicas used when a request does not ask for a positive count.
pub const DEFAULT_REPLICAS: i32 = 2;

const MIN_READY_SECONDS: i32 = 10;
const REVISION_HISTORY_LIMIT: i32 = 5;
const PROGRESS_DEADLINE_SECONDS: i32 = 600;

/// A request to create an application with its first version.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewApplication {
    #[serde(default)]
    pub version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    #[serde(default)]
    pub ports: Vec<ServicePort>,

    #[serde(default)]
    pub pod_template: PodTemplateSpec,
}

/// A request to deploy a new version alongside an application's current one.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanaryDeployment {
    #[serde(default)]
    pub version: String,

    /// Overrides the parent deployment's replica count when positive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    #[serde(default)]
    pub pod_template: PodTemplateSpec,
}

/// Returns the requested replica count if it is positive.
pub fn requested_replicas(replicas: Option<i32>) -> Option<i32> {
    replicas.filter(|r| *r > 0)
}

pub fn deployment_name(app: &str, version: &str) -> String {
    format!("{}-{}", app, version)
}

/// The `ClusterIP` service fronting every version of `app`.
pub fn app_service(app: &str, namespace: &str, ports: Vec<ServicePort>) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(app.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(service_labels(app)),
            ..ObjectMeta::default()
        },
        spec: Some(ServiceSpec {
            ports: Some(ports),
            selector: Some(Some((APP.to_string(), app.to_string())).into_iter().collect()),
            type_: Some("ClusterIP".to_string()),
            ..ServiceSpec::default()
        }),
        ..Service::default()
    }
}

/// The deployment for an application's first version.
pub fn app_deployment(
    namespace: &str,
    labels: &WorkloadLabels,
    replicas: i32,
    template: PodTemplateSpec,
) -> Deployment {
    let spec = DeploymentSpec {
        replicas: Some(replicas),
        strategy: Some(DeploymentStrategy {
            type_: Some("RollingUpdate".to_string()),
            ..DeploymentStrategy::default()
        }),
        min_ready_seconds: Some(MIN_READY_SECONDS),
        revision_history_limit: Some(REVISION_HISTORY_LIMIT),
        progress_deadline_seconds: Some(PROGRESS_DEADLINE_SECONDS),
        ..DeploymentSpec::default()
    };
    version_deployment(namespace, labels, spec, template)
}

/// A deployment for a new version of `parent`'s application. Rollout
/// settings are inherited from the parent.
pub fn canary_deployment(
    parent: &Deployment,
    labels: &WorkloadLabels,
    replicas: i32,
    template: PodTemplateSpec,
) -> Deployment {
    let spec = parent
        .spec
        .as_ref()
        .map(|p| DeploymentSpec {
            strategy: p.strategy.clone(),
            min_ready_seconds: p.min_ready_seconds,
            revision_history_limit: p.revision_history_limit,
            progress_deadline_seconds: p.progress_deadline_seconds,
            ..DeploymentSpec::default()
        })
        .unwrap_or_default();
    let namespace = parent.metadata.namespace.as_deref().unwrap_or_default();
    version_deployment(
        namespace,
        labels,
        DeploymentSpec {
            replicas: Some(replicas),
            ..spec
        },
        template,
    )
}

fn version_deployment(
    namespace: &str,
    labels: &WorkloadLabels,
    spec: DeploymentSpec,
    mut template: PodTemplateSpec,
) -> Deployment {
    let meta = template.metadata.get_or_insert_with(ObjectMeta::default);
    labels.stamp(meta.labels.get_or_insert_with(Map::new));

    Deployment {
        metadata: ObjectMeta {
            name: Some(deployment_name(&labels.app, &labels.version)),
            namespace: Some(namespace.to_string()),
            labels: Some(labels.to_map()),
            ..ObjectMeta::default()
        },
        spec: Some(DeploymentSpec {
            selector: LabelSelector {
                match_labels: Some(labels.match_labels()),
                ..LabelSelector::default()
            },
            template,
            ..spec
        }),
        ..Deployment::default()
    }
}

/// Reads the workload labels from a deployment's pod template.
pub fn parent_labels(deploy: &Deployment) -> Option<WorkloadLabels> {
    let labels = deploy
        .spec
        .as_ref()?
        .template
        .metadata
        .as_ref()?
        .labels
        .as_ref()?;
    WorkloadLabels::from_map(labels)
}

/// Rewrites the deployment's own labels and selector so that they carry the
/// app and version of its pod template. Returns true if anything changed.
pub fn repair_parent(deploy: &mut Deployment, labels: &WorkloadLabels) -> bool {
    let mut changed = false;

    let meta = deploy.metadata.labels.get_or_insert_with(Map::new);
    if !labels.agrees_with(meta) {
        meta.extend(labels.match_labels());
        changed = true;
    }

    if let Some(spec) = deploy.spec.as_mut() {
        let selector = spec.selector.match_labels.get_or_insert_with(Map::new);
        if !labels.agrees_with(selector) {
            selector.extend(labels.match_labels());
            changed = true;
        }
    }

    changed
}
