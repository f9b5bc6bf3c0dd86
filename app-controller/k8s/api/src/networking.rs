//! Istio `networking.istio.io` resources.
//!
//! Only the fields that the controller reads or edits are modeled. Everything
//! else (traffic policies, matches, retries, TCP/TLS routes, ...) is captured
//! in an `extra` map so that a read-modify-write cycle never drops fields
//! owned by other writers.

use crate::labels::Map;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Fields that are carried through unmodified.
pub type Extra = BTreeMap<String, serde_json::Value>;

/// DestinationRule declares the named subsets of a host, each selecting the
/// pods of one application version.
#[derive(
    Clone, Debug, Default, PartialEq, kube::CustomResource, Deserialize, Serialize, JsonSchema,
)]
#[kube(
    group = "networking.istio.io",
    version = "v1alpha3",
    kind = "DestinationRule",
    derive = "Default",
    derive = "PartialEq",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct DestinationRuleSpec {
    /// The service this rule applies to, either a short name resolved in the
    /// rule's namespace or a fully-qualified name.
    #[serde(default)]
    pub host: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subsets: Vec<Subset>,

    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct Subset {
    pub name: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: Map,

    #[serde(flatten)]
    pub extra: Extra,
}

/// VirtualService holds the HTTP route table for a set of hosts.
#[derive(
    Clone, Debug, Default, PartialEq, kube::CustomResource, Deserialize, Serialize, JsonSchema,
)]
#[kube(
    group = "networking.istio.io",
    version = "v1alpha3",
    kind = "VirtualService",
    derive = "Default",
    derive = "PartialEq",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServiceSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gateways: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub http: Vec<HttpRoute>,

    #[serde(flatten)]
    pub extra: Extra,
}

/// A single entry of the HTTP route table.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct HttpRoute {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub route: Vec<DestinationWeight>,

    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct DestinationWeight {
    pub destination: Destination,

    /// Percentage of traffic sent to this destination. When every weight in a
    /// route is unset the traffic is split evenly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<i32>,

    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct Destination {
    pub host: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subset: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<PortSelector>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct PortSelector {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<u32>,
}

// === impl HttpRoute ===

impl HttpRoute {
    /// Returns true if the entry has an action other than forwarding to its
    /// destinations, e.g. a redirect or a direct response.
    pub fn has_other_action(&self) -> bool {
        ["redirect", "directResponse", "delegate"]
            .iter()
            .any(|k| self.extra.contains_key(*k))
    }
}

// === impl DestinationWeight ===

impl DestinationWeight {
    pub fn new(host: impl ToString, subset: impl ToString, weight: Option<i32>) -> Self {
        Self {
            destination: Destination {
                host: host.to_string(),
                subset: Some(subset.to_string()),
                port: None,
            },
            weight,
            extra: Extra::default(),
        }
    }

    pub fn subset(&self) -> Option<&str> {
        self.destination.subset.as_deref()
    }
}
