use crate::{kind, Error, NamespaceScope, NamespaceStore, Object, Result, Store};
use istio_app_controller_k8s_api::{Labels, Namespace, ResourceExt, Selector};
use parking_lot::Mutex;
use std::{collections::BTreeMap, fmt, sync::Arc};

/// An in-memory store.
///
/// Every trait call is appended to a call log so that tests can assert on
/// the order of writes. Updates enforce `resourceVersion` like the API server
/// does, and failures may be injected per operation and kind.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Op {
    Get,
    List,
    Create,
    Update,
    Delete,
}

/// A recorded store call. List calls have an empty name and, when they span
/// all namespaces, an empty namespace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Call {
    pub op: Op,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

#[derive(Default)]
struct State {
    objects: BTreeMap<Key, serde_json::Value>,
    namespaces: BTreeMap<String, Namespace>,
    calls: Vec<Call>,
    failures: Vec<Failure>,
    resource_version: u64,
}

type Key = (String, String, String);

struct Failure {
    op: Op,
    kind: String,
    name: Option<String>,
}

// === impl MemoryStore ===

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a resource without recording a call.
    pub fn insert<K: Object>(&self, mut obj: K) {
        let mut state = self.state.lock();
        let rv = state.next_resource_version();
        obj.meta_mut().resource_version = Some(rv);
        let key = key::<K>(
            obj.namespace().unwrap_or_default().as_str(),
            &obj.name_any(),
        );
        match serde_json::to_value(&obj) {
            Ok(value) => {
                state.objects.insert(key, value);
            }
            Err(error) => tracing::error!(%error, "Failed to encode resource"),
        }
    }

    pub fn insert_namespace(&self, ns: Namespace) {
        self.state.lock().namespaces.insert(ns.name_any(), ns);
    }

    /// Reads a resource without recording a call.
    pub fn peek<K: Object>(&self, namespace: &str, name: &str) -> Option<K> {
        let state = self.state.lock();
        let value = state.objects.get(&key::<K>(namespace, name))?;
        serde_json::from_value(value.clone()).ok()
    }

    /// Reads every resource of a kind without recording a call.
    pub fn peek_all<K: Object>(&self) -> Vec<K> {
        let kind = kind::<K>();
        let state = self.state.lock();
        state
            .objects
            .iter()
            .filter(|((k, _, _), _)| *k == kind)
            .filter_map(|(_, v)| serde_json::from_value(v.clone()).ok())
            .collect()
    }

    /// Fails every subsequent `op` on resources of kind `K`.
    pub fn fail<K: Object>(&self, op: Op) {
        self.state.lock().failures.push(Failure {
            op,
            kind: kind::<K>(),
            name: None,
        });
    }

    /// Fails every subsequent `op` on the named resource of kind `K`.
    pub fn fail_named<K: Object>(&self, op: Op, name: &str) {
        self.state.lock().failures.push(Failure {
            op,
            kind: kind::<K>(),
            name: Some(name.to_string()),
        });
    }

    /// Fails every subsequent namespace list.
    pub fn fail_namespaces(&self) {
        self.state.lock().failures.push(Failure {
            op: Op::List,
            kind: "Namespace".to_string(),
            name: None,
        });
    }

    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    /// Returns every call made so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    /// Returns every create, update and delete call made so far, in order.
    pub fn writes(&self) -> Vec<Call> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.op.is_write())
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }
}

fn key<K: Object>(namespace: &str, name: &str) -> Key {
    (kind::<K>(), namespace.to_string(), name.to_string())
}

fn decode<K: Object>(value: &serde_json::Value) -> Result<K> {
    serde_json::from_value(value.clone()).map_err(|source| Error::Decode {
        kind: kind::<K>(),
        source,
    })
}

fn encode<K: Object>(obj: &K) -> Result<serde_json::Value> {
    serde_json::to_value(obj).map_err(|source| Error::Decode {
        kind: kind::<K>(),
        source,
    })
}

fn metadata<K: Object>(obj: &K) -> Result<(String, String)> {
    let namespace = obj
        .namespace()
        .ok_or_else(|| Error::missing::<K>("namespace"))?;
    let name = obj
        .meta()
        .name
        .clone()
        .ok_or_else(|| Error::missing::<K>("name"))?;
    Ok((namespace, name))
}

#[async_trait::async_trait]
impl<K: Object> Store<K> for MemoryStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<K> {
        let mut state = self.state.lock();
        state.record(Op::Get, kind::<K>(), namespace, name)?;
        let value = state
            .objects
            .get(&key::<K>(namespace, name))
            .ok_or_else(|| Error::not_found::<K>(namespace, name))?;
        decode(value)
    }

    async fn list(&self, scope: &NamespaceScope, selector: &Selector) -> Result<Vec<K>> {
        let kind = kind::<K>();
        let mut state = self.state.lock();
        let ns = match scope {
            NamespaceScope::All => "",
            NamespaceScope::Named(ns) => ns.as_str(),
        };
        state.record(Op::List, kind.clone(), ns, "")?;

        let mut items = Vec::new();
        for ((k, namespace, _), value) in state.objects.iter() {
            if *k != kind || !scope.contains(namespace) {
                continue;
            }
            let obj = decode::<K>(value)?;
            if selector.matches(&Labels::from(obj.meta().labels.clone())) {
                items.push(obj);
            }
        }
        Ok(items)
    }

    async fn create(&self, obj: &K) -> Result<K> {
        let (namespace, name) = metadata(obj)?;
        let mut state = self.state.lock();
        state.record(Op::Create, kind::<K>(), &namespace, &name)?;

        let key = key::<K>(&namespace, &name);
        if state.objects.contains_key(&key) {
            return Err(Error::already_exists::<K>(&namespace, &name));
        }
        let mut obj = obj.clone();
        obj.meta_mut().resource_version = Some(state.next_resource_version());
        state.objects.insert(key, encode(&obj)?);
        Ok(obj)
    }

    async fn update(&self, obj: &K) -> Result<K> {
        let (namespace, name) = metadata(obj)?;
        let mut state = self.state.lock();
        state.record(Op::Update, kind::<K>(), &namespace, &name)?;

        let key = key::<K>(&namespace, &name);
        let current = state
            .objects
            .get(&key)
            .ok_or_else(|| Error::not_found::<K>(&namespace, &name))?;
        if let Some(rv) = obj.resource_version() {
            let current = current
                .pointer("/metadata/resourceVersion")
                .and_then(|v| v.as_str());
            if current != Some(rv.as_str()) {
                return Err(Error::conflict::<K>(&namespace, &name));
            }
        }
        let mut obj = obj.clone();
        obj.meta_mut().resource_version = Some(state.next_resource_version());
        state.objects.insert(key, encode(&obj)?);
        Ok(obj)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.record(Op::Delete, kind::<K>(), namespace, name)?;
        state
            .objects
            .remove(&key::<K>(namespace, name))
            .map(|_| ())
            .ok_or_else(|| Error::not_found::<K>(namespace, name))
    }
}

#[async_trait::async_trait]
impl NamespaceStore for MemoryStore {
    async fn namespace(&self, name: &str) -> Result<Namespace> {
        let mut state = self.state.lock();
        state.record(Op::Get, "Namespace".to_string(), "", name)?;
        state
            .namespaces
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound {
                kind: "Namespace".to_string(),
                namespace: String::new(),
                name: name.to_string(),
            })
    }

    async fn namespaces(&self) -> Result<Vec<Namespace>> {
        let mut state = self.state.lock();
        state.record(Op::List, "Namespace".to_string(), "", "")?;
        Ok(state.namespaces.values().cloned().collect())
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemoryStore")
            .field("objects", &state.objects.len())
            .field("calls", &state.calls.len())
            .finish()
    }
}

// === impl State ===

impl State {
    fn next_resource_version(&mut self) -> String {
        self.resource_version += 1;
        self.resource_version.to_string()
    }

    /// Logs the call and fails it if a matching failure was injected.
    fn record(&mut self, op: Op, kind: String, namespace: &str, name: &str) -> Result<()> {
        let failed = self
            .failures
            .iter()
            .any(|f| f.op == op && f.kind == kind && f.name.as_deref().map_or(true, |n| n == name));
        let call = Call {
            op,
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
        };
        if failed {
            let error = Error::Unavailable(call.to_string());
            self.calls.push(call);
            return Err(error);
        }
        self.calls.push(call);
        Ok(())
    }
}

// === impl Op ===

impl Op {
    pub fn is_write(&self) -> bool {
        matches!(self, Self::Create | Self::Update | Self::Delete)
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => "get".fmt(f),
            Self::List => "list".fmt(f),
            Self::Create => "create".fmt(f),
            Self::Update => "update".fmt(f),
            Self::Delete => "delete".fmt(f),
        }
    }
}

// === impl Call ===

impl Call {
    pub fn new(op: Op, kind: &str, namespace: &str, name: &str) -> Self {
        Self {
            op,
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}/{}", self.op, self.kind, self.namespace, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use istio_app_controller_k8s_api::{Deployment, ObjectMeta, Service};
    use maplit::btreemap;
    use pretty_assertions::assert_eq;

    fn service(ns: &str, name: &str, app: &str) -> Service {
        Service {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(ns.to_string()),
                labels: Some(btreemap! { "app".to_string() => app.to_string() }),
                ..ObjectMeta::default()
            },
            ..Service::default()
        }
    }

    #[tokio::test]
    async fn get_create_delete() {
        let store = MemoryStore::new();
        let err = Store::<Service>::get(&store, "bookinfo", "reviews")
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let created = store.create(&service("bookinfo", "reviews", "reviews")).await.unwrap();
        assert!(created.resource_version().is_some());
        assert!(matches!(
            store.create(&service("bookinfo", "reviews", "reviews")).await,
            Err(Error::AlreadyExists { .. })
        ));

        let got: Service = store.get("bookinfo", "reviews").await.unwrap();
        assert_eq!(got, created);

        Store::<Service>::delete(&store, "bookinfo", "reviews")
            .await
            .unwrap();
        assert!(store.peek::<Service>("bookinfo", "reviews").is_none());
        assert!(Store::<Service>::delete(&store, "bookinfo", "reviews")
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn stale_updates_conflict() {
        let store = MemoryStore::new();
        store.insert(service("bookinfo", "reviews", "reviews"));

        let first: Service = store.get("bookinfo", "reviews").await.unwrap();
        let second = first.clone();

        store.update(&first).await.unwrap();
        assert!(matches!(
            store.update(&second).await,
            Err(Error::Conflict { .. })
        ));
    }

    #[tokio::test]
    async fn list_filters_scope_and_labels() {
        let store = MemoryStore::new();
        store.insert(service("bookinfo", "reviews", "reviews"));
        store.insert(service("bookinfo", "ratings", "ratings"));
        store.insert(service("other", "reviews", "reviews"));

        let selector = Some(("app", "reviews")).into_iter().collect::<Selector>();
        let all: Vec<Service> = store.list(&NamespaceScope::All, &selector).await.unwrap();
        assert_eq!(all.len(), 2);

        let named: Vec<Service> = store
            .list(&NamespaceScope::Named("bookinfo".to_string()), &Selector::default())
            .await
            .unwrap();
        let names = named.iter().map(|s| s.name_any()).collect::<Vec<_>>();
        assert_eq!(names, vec!["ratings", "reviews"]);

        let deployments: Vec<Deployment> = store
            .list(&NamespaceScope::All, &Selector::default())
            .await
            .unwrap();
        assert!(deployments.is_empty());
    }

    #[tokio::test]
    async fn records_calls_and_injects_failures() {
        let store = MemoryStore::new();
        store.insert(service("bookinfo", "reviews", "reviews"));
        store.fail_named::<Service>(Op::Delete, "reviews");

        let _: Service = store.get("bookinfo", "reviews").await.unwrap();
        let err = Store::<Service>::delete(&store, "bookinfo", "reviews")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unavailable(_)));
        assert!(store.peek::<Service>("bookinfo", "reviews").is_some());

        assert_eq!(
            store.calls(),
            vec![
                Call::new(Op::Get, "Service", "bookinfo", "reviews"),
                Call::new(Op::Delete, "Service", "bookinfo", "reviews"),
            ]
        );
        assert_eq!(
            store.writes(),
            vec![Call::new(Op::Delete, "Service", "bookinfo", "reviews")]
        );
    }
}
