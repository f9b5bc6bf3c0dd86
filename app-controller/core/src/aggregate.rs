//! Joins services with the Istio resources that share their FQDN.

use crate::{
    app::{App, AppList, Destination, DEFAULT_VERSION},
    fqdn::Fqdn,
    route,
};
use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use istio_app_controller_k8s_api::{
    is_mesh_enabled, DestinationRule, Namespace, ResourceExt, Service, VirtualService,
};

/// The resources visible to one aggregation pass.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    pub services: Vec<Service>,
    pub destination_rules: Vec<DestinationRule>,
    pub virtual_services: Vec<VirtualService>,
    pub namespaces: Vec<Namespace>,
}

/// Destination rules and virtual services indexed by the FQDNs they refer
/// to.
///
/// Built once per pass so that each service is joined by lookup rather than
/// by scanning every rule and route.
#[derive(Debug, Default)]
pub struct Index<'a> {
    rules: HashMap<Fqdn, Vec<&'a DestinationRule>>,
    routes: HashMap<Fqdn, Vec<&'a VirtualService>>,
    meshed: HashSet<&'a str>,
}

/// More than one destination rule resolves to an application's FQDN, so its
/// versions are ambiguous.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("conflicting destination rules for {fqdn}: {}", .names.join(", "))]
pub struct ConflictError {
    pub fqdn: Fqdn,

    /// The conflicting rules, as `namespace/name`.
    pub names: Vec<String>,
}

// === impl Snapshot ===

impl Snapshot {
    pub fn index(&self) -> Index<'_> {
        Index::new(
            &self.destination_rules,
            &self.virtual_services,
            &self.namespaces,
        )
    }

    /// Aggregates every service in the snapshot.
    pub fn apps(&self) -> AppList {
        self.index().list(&self.services)
    }
}

// === impl Index ===

impl<'a> Index<'a> {
    pub fn new(
        destination_rules: &'a [DestinationRule],
        virtual_services: &'a [VirtualService],
        namespaces: &'a [Namespace],
    ) -> Self {
        let mut rules = HashMap::<Fqdn, Vec<_>>::new();
        for rule in destination_rules {
            let ns = rule.metadata.namespace.as_deref().unwrap_or_default();
            rules
                .entry(Fqdn::new(&rule.spec.host, ns))
                .or_default()
                .push(rule);
        }

        let mut routes = HashMap::<Fqdn, Vec<_>>::new();
        for vs in virtual_services {
            // A virtual service is indexed once under each distinct FQDN it
            // names, whether as a declared host or as a route destination.
            let mut seen = HashSet::new();
            for fqdn in route::host_fqdns(vs).chain(route::destination_fqdns(vs)) {
                if seen.insert(fqdn.clone()) {
                    routes.entry(fqdn).or_default().push(vs);
                }
            }
        }

        let meshed = namespaces
            .iter()
            .filter(|ns| is_mesh_enabled(ns))
            .filter_map(|ns| ns.metadata.name.as_deref())
            .collect();

        Self {
            rules,
            routes,
            meshed,
        }
    }

    /// Builds the application backed by `svc`.
    pub fn app(&self, svc: &Service) -> Result<App, ConflictError> {
        let name = svc.name_any();
        let namespace = svc.namespace().unwrap_or_default();
        let fqdn = Fqdn::new(&name, &namespace);

        let (destination_rule, destinations) = match self.rules.get(&fqdn).map(Vec::as_slice) {
            None | Some([]) => {
                let selector = svc
                    .spec
                    .as_ref()
                    .and_then(|spec| spec.selector.clone())
                    .unwrap_or_default();
                (None, vec![Destination::new(DEFAULT_VERSION, selector)])
            }
            Some([rule]) => {
                let destinations = rule
                    .spec
                    .subsets
                    .iter()
                    .map(|s| Destination::new(&s.name, s.labels.clone()))
                    .collect();
                (Some(rule.name_any()), destinations)
            }
            Some(rules) => {
                let names = rules
                    .iter()
                    .map(|r| format!("{}/{}", r.namespace().unwrap_or_default(), r.name_any()))
                    .collect();
                return Err(ConflictError { fqdn, names });
            }
        };

        let routes = self
            .routes
            .get(&fqdn)
            .map(|vss| vss.iter().map(|vs| (*vs).clone()).collect())
            .unwrap_or_default();

        Ok(App {
            mesh_enabled: self.meshed.contains(namespace.as_str()),
            name,
            namespace,
            destination_rule,
            destinations,
            routes,
        })
    }

    /// Builds an application for each service. Services whose destination
    /// rules conflict are left out of the list and reported in its errors.
    pub fn list(&self, services: &[Service]) -> AppList {
        let mut list = AppList {
            total_items: services.len(),
            ..AppList::default()
        };
        for svc in services {
            match self.app(svc) {
                Ok(app) => list.apps.push(app),
                Err(error) => {
                    tracing::debug!(%error, "Skipping application");
                    list.errors.push(error.to_string());
                }
            }
        }
        list
    }
}
