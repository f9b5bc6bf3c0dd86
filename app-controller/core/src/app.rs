use crate::fqdn::Fqdn;
use istio_app_controller_k8s_api::{labels::Map, VirtualService};
use serde::Serialize;

/// The version reported for an application whose service is not bound to a
/// destination rule.
pub const DEFAULT_VERSION: &str = "default";

/// A service and the Istio resources bound to it.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct App {
    pub name: String,
    pub namespace: String,

    /// Whether the application's namespace has sidecar injection enabled.
    pub mesh_enabled: bool,

    /// The name of the destination rule that declares this application's
    /// versions, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_rule: Option<String>,

    /// Either the rule's subsets, in order, or a single synthetic `default`
    /// destination selecting the service's pods.
    pub destinations: Vec<Destination>,

    /// Virtual services routing traffic for this application.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<VirtualService>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Destination {
    pub version: String,
    pub selector: Map,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppList {
    /// The number of services in scope.
    pub total_items: usize,
    pub apps: Vec<App>,

    /// Non-critical errors encountered while building the list. Apps in the
    /// list may be missing destinations or routes when this is non-empty.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

// === impl App ===

impl App {
    pub fn fqdn(&self) -> Fqdn {
        Fqdn::new(&self.name, &self.namespace)
    }

    pub fn versions(&self) -> impl Iterator<Item = &str> + '_ {
        self.destinations.iter().map(|d| d.version.as_str())
    }

    /// Returns true if the application's traffic is split across more than
    /// one version.
    pub fn is_split(&self) -> bool {
        self.destinations.len() > 1
    }
}

// === impl Destination ===

impl Destination {
    pub fn new(version: impl ToString, selector: Map) -> Self {
        Self {
            version: version.to_string(),
            selector,
        }
    }
}
