//! Edits to a `VirtualService`'s HTTP route table.
//!
//! Destination hosts are resolved relative to the virtual service's own
//! namespace, so `reviews` in a route table in `bookinfo` and
//! `reviews.bookinfo.svc.cluster.local` anywhere else name the same host.

use crate::fqdn::Fqdn;
use istio_app_controller_k8s_api::{
    networking::{DestinationWeight, HttpRoute, VirtualServiceSpec},
    ObjectMeta, VirtualService,
};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Which of a virtual service's hosts are compared against an application's
/// FQDN when looking up the virtual services that carry its traffic.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchScope {
    /// The virtual service's declared `hosts`.
    #[default]
    Host,

    /// The destination hosts of its HTTP routes, as used by virtual services
    /// bound to an ingress gateway.
    Gateway,

    /// Either of the above.
    All,
}

#[derive(Debug, thiserror::Error)]
#[error("invalid match scope {0:?}; expected one of host, gateway or all")]
pub struct InvalidMatchScope(String);

/// Returns true if `vs` routes traffic for `fqdn` under `scope`.
pub fn matches(vs: &VirtualService, fqdn: &Fqdn, scope: MatchScope) -> bool {
    let by_host = || host_fqdns(vs).any(|h| h == *fqdn);
    let by_destination = || destination_fqdns(vs).any(|h| h == *fqdn);
    match scope {
        MatchScope::Host => by_host(),
        MatchScope::Gateway => by_destination(),
        MatchScope::All => by_host() || by_destination(),
    }
}

/// Resolves each of the virtual service's declared hosts.
pub fn host_fqdns(vs: &VirtualService) -> impl Iterator<Item = Fqdn> + '_ {
    let ns = namespace(vs);
    vs.spec.hosts.iter().map(move |h| Fqdn::new(h, ns))
}

/// Resolves the destination host of every route in the HTTP route table.
pub fn destination_fqdns(vs: &VirtualService) -> impl Iterator<Item = Fqdn> + '_ {
    let ns = namespace(vs);
    vs.spec
        .http
        .iter()
        .flat_map(|entry| entry.route.iter())
        .map(move |dw| Fqdn::new(&dw.destination.host, ns))
}

/// Returns true if any route in the table targets `subset`.
pub fn references(vs: &VirtualService, subset: &str) -> bool {
    vs.spec
        .http
        .iter()
        .flat_map(|entry| entry.route.iter())
        .any(|dw| dw.subset() == Some(subset))
}

/// Removes every destination targeting `subset` from the route table,
/// preserving the order of the remaining destinations.
///
/// An entry left without destinations is dropped unless it has another action
/// (e.g. a redirect). When the remaining destinations of an entry all carry
/// explicit weights, they are rescaled to sum to 100. Returns true if the
/// table changed.
pub fn remove_route_by_subset(vs: &mut VirtualService, subset: &str) -> bool {
    let mut changed = false;
    vs.spec.http.retain_mut(|entry| {
        let before = entry.route.len();
        entry.route.retain(|dw| dw.subset() != Some(subset));
        if entry.route.len() == before {
            return true;
        }
        changed = true;
        if entry.route.is_empty() {
            return entry.has_other_action();
        }
        rebalance(&mut entry.route);
        true
    });
    changed
}

/// Points every destination resolving to `fqdn(host, namespace)` at `subset`.
/// Other destinations are left untouched. Returns true if any destination
/// changed.
pub fn override_subset(vs: &mut VirtualService, host: &str, namespace: &str, subset: &str) -> bool {
    let target = Fqdn::new(host, namespace);
    let vs_ns = vs.metadata.namespace.clone().unwrap_or_default();
    let mut changed = false;
    for dw in vs.spec.http.iter_mut().flat_map(|entry| entry.route.iter_mut()) {
        if Fqdn::new(&dw.destination.host, &vs_ns) == target
            && dw.destination.subset.as_deref() != Some(subset)
        {
            dw.destination.subset = Some(subset.to_string());
            changed = true;
        }
    }
    changed
}

/// Replaces the entire HTTP route table with a single route sending all
/// traffic to `subset` of `host`.
///
/// Matches, rewrites and any other per-route settings in the replaced table
/// are discarded.
pub fn take_over(vs: &mut VirtualService, host: &str, subset: &str) {
    vs.spec.http = vec![single_route(host, subset)];
}

/// An HTTP route sending 100% of traffic to `subset` of `host`.
pub fn single_route(host: &str, subset: &str) -> HttpRoute {
    HttpRoute {
        route: vec![DestinationWeight::new(host, subset, Some(100))],
        ..HttpRoute::default()
    }
}

/// A virtual service for `host` routing all of its traffic to `subset`.
pub fn new_virtual_service(name: &str, namespace: &str, host: &str, subset: &str) -> VirtualService {
    VirtualService {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..ObjectMeta::default()
        },
        spec: VirtualServiceSpec {
            hosts: vec![host.to_string()],
            http: vec![single_route(host, subset)],
            ..VirtualServiceSpec::default()
        },
    }
}

fn namespace(vs: &VirtualService) -> &str {
    vs.metadata.namespace.as_deref().unwrap_or_default()
}

fn rebalance(route: &mut [DestinationWeight]) {
    let weights = match route.iter().map(|dw| dw.weight).collect::<Option<Vec<_>>>() {
        Some(weights) => weights,
        None => return,
    };
    let total = weights.iter().map(|w| i64::from(*w)).sum::<i64>();
    if total == 100 {
        return;
    }
    if total <= 0 {
        // Nothing left to scale; fall back to an even split.
        for dw in route.iter_mut() {
            dw.weight = None;
        }
        return;
    }

    let mut assigned = 0;
    for (dw, w) in route.iter_mut().zip(weights) {
        let scaled = (i64::from(w) * 100 / total) as i32;
        dw.weight = Some(scaled);
        assigned += scaled;
    }
    if let Some(first) = route.first_mut() {
        first.weight = first.weight.map(|w| w + 100 - assigned);
    }
}

// === impl MatchScope ===

impl FromStr for MatchScope {
    type Err = InvalidMatchScope;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "" | "host" => Ok(Self::Host),
            "gateway" => Ok(Self::Gateway),
            "all" => Ok(Self::All),
            _ => Err(InvalidMatchScope(s.to_string())),
        }
    }
}

impl fmt::Display for MatchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => "host".fmt(f),
            Self::Gateway => "gateway".fmt(f),
            Self::All => "all".fmt(f),
        }
    }
}
