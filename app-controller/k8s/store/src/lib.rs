//! Read/write access to the resources that make up an application.
//!
//! Workflows are written against the [`Store`] and [`NamespaceStore`] traits
//! so that they can run against the Kubernetes API ([`KubeStore`]) or an
//! in-memory fake that records every call ([`MemoryStore`]).

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod client;
mod error;
mod memory;

pub use self::{
    client::KubeStore,
    error::Error,
    memory::{Call, MemoryStore, Op},
};
use istio_app_controller_k8s_api::{
    Deployment, DestinationRule, Namespace, Resource, Selector, Service, VirtualService,
};
use k8s_openapi::NamespaceResourceScope;
use serde::{de::DeserializeOwned, Serialize};
use std::fmt;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A namespaced resource kind that can be stored.
pub trait Object:
    Resource<Scope = NamespaceResourceScope, DynamicType = ()>
    + Clone
    + fmt::Debug
    + DeserializeOwned
    + Serialize
    + Send
    + Sync
    + 'static
{
}

impl<K> Object for K where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + fmt::Debug
        + DeserializeOwned
        + Serialize
        + Send
        + Sync
        + 'static
{
}

/// The namespaces a list call spans.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum NamespaceScope {
    All,
    Named(String),
}

/// Access to one namespaced resource kind, keyed by namespace and name.
///
/// Writes are not coordinated across calls: each create, update or delete
/// commits on its own.
#[async_trait::async_trait]
pub trait Store<K: Object>: Send + Sync {
    /// Fails with [`Error::NotFound`] when the resource is absent.
    async fn get(&self, namespace: &str, name: &str) -> Result<K>;

    async fn list(&self, scope: &NamespaceScope, selector: &Selector) -> Result<Vec<K>>;

    async fn create(&self, obj: &K) -> Result<K>;

    /// Replaces the resource. When `obj` carries a `resourceVersion` that is
    /// no longer current the update fails with [`Error::Conflict`].
    async fn update(&self, obj: &K) -> Result<K>;

    /// Deletes the resource. Deployments are deleted in the background with
    /// no grace period.
    async fn delete(&self, namespace: &str, name: &str) -> Result<()>;
}

/// Read access to namespaces, used to detect sidecar injection.
#[async_trait::async_trait]
pub trait NamespaceStore: Send + Sync {
    async fn namespace(&self, name: &str) -> Result<Namespace>;

    async fn namespaces(&self) -> Result<Vec<Namespace>>;
}

/// Every store an application workflow touches.
pub trait ClusterStore:
    Store<Service>
    + Store<Deployment>
    + Store<DestinationRule>
    + Store<VirtualService>
    + NamespaceStore
{
}

impl<S> ClusterStore for S where
    S: Store<Service>
        + Store<Deployment>
        + Store<DestinationRule>
        + Store<VirtualService>
        + NamespaceStore
{
}

// === impl NamespaceScope ===

impl NamespaceScope {
    pub fn contains(&self, namespace: &str) -> bool {
        match self {
            Self::All => true,
            Self::Named(ns) => ns == namespace,
        }
    }
}

impl From<Option<String>> for NamespaceScope {
    fn from(ns: Option<String>) -> Self {
        ns.map(Self::Named).unwrap_or(Self::All)
    }
}

impl fmt::Display for NamespaceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => "*".fmt(f),
            Self::Named(ns) => ns.fmt(f),
        }
    }
}

fn kind<K: Object>() -> String {
    K::kind(&()).to_string()
}
