use crate::{Action, Controller, Report, Result};
use istio_app_controller_k8s_api::ResourceExt;
use istio_app_controller_k8s_store::{self as store, ClusterStore, Object, Store};

/// Writes that record their outcome in a workflow's report.
impl<S: ClusterStore> Controller<S> {
    /// Creates `obj`, recording the outcome. A failure aborts the workflow.
    pub(crate) async fn create<K: Object>(&self, report: &mut Report, obj: &K) -> Result<K>
    where
        S: Store<K>,
    {
        let (namespace, name) = (obj.namespace().unwrap_or_default(), obj.name_any());
        match Store::<K>::create(&self.store, obj).await {
            Ok(created) => {
                tracing::debug!(kind = %K::kind(&()), %namespace, %name, "Created");
                report.done::<K>(Action::Create, &namespace, &name);
                Ok(created)
            }
            Err(error) => {
                report.failed::<K>(Action::Create, &namespace, &name, &error);
                Err(std::mem::take(report).abort(error))
            }
        }
    }

    /// Updates `obj`, recording the outcome. A failure aborts the workflow.
    pub(crate) async fn update<K: Object>(&self, report: &mut Report, obj: &K) -> Result<K>
    where
        S: Store<K>,
    {
        let (namespace, name) = (obj.namespace().unwrap_or_default(), obj.name_any());
        match Store::<K>::update(&self.store, obj).await {
            Ok(updated) => {
                tracing::debug!(kind = %K::kind(&()), %namespace, %name, "Updated");
                report.done::<K>(Action::Update, &namespace, &name);
                Ok(updated)
            }
            Err(error) => {
                report.failed::<K>(Action::Update, &namespace, &name, &error);
                Err(std::mem::take(report).abort(error))
            }
        }
    }

    /// Updates `obj`, recording the outcome. Failures are logged and the
    /// workflow continues.
    pub(crate) async fn update_best_effort<K: Object>(&self, report: &mut Report, obj: &K) -> bool
    where
        S: Store<K>,
    {
        let (namespace, name) = (obj.namespace().unwrap_or_default(), obj.name_any());
        match Store::<K>::update(&self.store, obj).await {
            Ok(_) => {
                tracing::debug!(kind = %K::kind(&()), %namespace, %name, "Updated");
                report.done::<K>(Action::Update, &namespace, &name);
                true
            }
            Err(error) => {
                tracing::warn!(kind = %K::kind(&()), %namespace, %name, %error, "Failed to update");
                report.failed::<K>(Action::Update, &namespace, &name, &error);
                false
            }
        }
    }

    /// Deletes the named resource, recording the outcome. Failures are logged
    /// and the workflow continues.
    pub(crate) async fn delete_best_effort<K: Object>(
        &self,
        report: &mut Report,
        namespace: &str,
        name: &str,
    ) where
        S: Store<K>,
    {
        match Store::<K>::delete(&self.store, namespace, name).await {
            Ok(()) => {
                tracing::debug!(kind = %K::kind(&()), %namespace, %name, "Deleted");
                report.done::<K>(Action::Delete, namespace, name);
            }
            Err(store::Error::NotFound { .. }) => {
                report.skipped::<K>(Action::Delete, namespace, name, "not found");
            }
            Err(error) => {
                tracing::warn!(kind = %K::kind(&()), %namespace, %name, %error, "Failed to delete");
                report.failed::<K>(Action::Delete, namespace, name, &error);
            }
        }
    }
}
