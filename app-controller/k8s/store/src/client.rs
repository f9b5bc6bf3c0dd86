use crate::{kind, Error, NamespaceScope, NamespaceStore, Object, Result, Store};
use istio_app_controller_k8s_api::{
    Api, Client, DeleteParams, ListParams, Namespace, PostParams, ResourceExt, Selector,
};

/// A store backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    field_manager: Option<String>,
}

// === impl KubeStore ===

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            field_manager: None,
        }
    }

    /// Sets the field manager recorded on every create and update.
    pub fn with_field_manager(mut self, field_manager: impl ToString) -> Self {
        self.field_manager = Some(field_manager.to_string());
        self
    }

    fn api<K: Object>(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn post_params(&self) -> PostParams {
        PostParams {
            field_manager: self.field_manager.clone(),
            ..PostParams::default()
        }
    }
}

fn delete_params<K: Object>() -> DeleteParams {
    // Replica sets and pods are left to the garbage collector.
    if K::kind(&()) == "Deployment" {
        return DeleteParams::background().grace_period(0);
    }
    DeleteParams::default()
}

fn metadata<K: Object>(obj: &K) -> Result<(String, String)> {
    let namespace = obj.namespace().ok_or_else(|| Error::missing::<K>("namespace"))?;
    let name = obj
        .meta()
        .name
        .clone()
        .ok_or_else(|| Error::missing::<K>("name"))?;
    Ok((namespace, name))
}

#[async_trait::async_trait]
impl<K: Object> Store<K> for KubeStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<K> {
        self.api(namespace)
            .get(name)
            .await
            .map_err(|e| Error::from_api::<K>(e, namespace, name))
    }

    async fn list(&self, scope: &NamespaceScope, selector: &Selector) -> Result<Vec<K>> {
        let api = match scope {
            NamespaceScope::All => Api::all(self.client.clone()),
            NamespaceScope::Named(ns) => self.api(ns),
        };
        let mut params = ListParams::default();
        if !selector.is_empty() {
            params = params.labels(&selector.to_string());
        }
        tracing::trace!(kind = %kind::<K>(), %scope, %selector, "Listing");
        let list = api.list(&params).await?;
        Ok(list.items)
    }

    async fn create(&self, obj: &K) -> Result<K> {
        let (namespace, name) = metadata(obj)?;
        tracing::debug!(kind = %kind::<K>(), %namespace, %name, "Creating");
        self.api(&namespace)
            .create(&self.post_params(), obj)
            .await
            .map_err(|e| Error::from_api::<K>(e, &namespace, &name))
    }

    async fn update(&self, obj: &K) -> Result<K> {
        let (namespace, name) = metadata(obj)?;
        tracing::debug!(
            kind = %kind::<K>(),
            %namespace,
            %name,
            resource_version = ?obj.resource_version(),
            "Replacing",
        );
        self.api(&namespace)
            .replace(&name, &self.post_params(), obj)
            .await
            .map_err(|e| Error::from_api::<K>(e, &namespace, &name))
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        tracing::debug!(kind = %kind::<K>(), %namespace, %name, "Deleting");
        self.api::<K>(namespace)
            .delete(name, &delete_params::<K>())
            .await
            .map_err(|e| Error::from_api::<K>(e, namespace, name))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl NamespaceStore for KubeStore {
    async fn namespace(&self, name: &str) -> Result<Namespace> {
        Api::<Namespace>::all(self.client.clone())
            .get(name)
            .await
            .map_err(|error| match error {
                kube::Error::Api(rsp) if rsp.code == 404 => Error::NotFound {
                    kind: "Namespace".to_string(),
                    namespace: String::new(),
                    name: name.to_string(),
                },
                error => Error::Kube(error),
            })
    }

    async fn namespaces(&self) -> Result<Vec<Namespace>> {
        let list = Api::<Namespace>::all(self.client.clone())
            .list(&ListParams::default())
            .await?;
        Ok(list.items)
    }
}
