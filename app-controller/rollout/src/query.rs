use crate::{require, Controller, Error, Result};
use istio_app_controller_core::{labels::app_selector, App, AppList, Index, Snapshot};
use istio_app_controller_k8s_api::{
    Deployment, DestinationRule, ResourceExt, Selector, Service, VirtualService,
};
use istio_app_controller_k8s_store::{self as store, ClusterStore, NamespaceScope, Store};

impl<S: ClusterStore> Controller<S> {
    /// Lists the applications in `scope`.
    ///
    /// Only a failure to list services fails the call. When namespaces,
    /// destination rules or virtual services cannot be listed the
    /// applications are built without them and the failure is recorded in
    /// [`AppList::errors`].
    pub async fn list_apps(&self, scope: &NamespaceScope) -> Result<AppList> {
        let (snapshot, errors) = self.snapshot(scope, false).await?;
        let mut list = snapshot.apps();
        list.errors = errors.into_iter().chain(list.errors).collect();
        tracing::debug!(
            %scope,
            apps = list.apps.len(),
            errors = list.errors.len(),
            "Listed applications"
        );
        Ok(list)
    }

    /// Resolves exactly one application named `name` in `scope`.
    pub async fn get_app(&self, scope: &NamespaceScope, name: &str) -> Result<App> {
        require("application name", name)?;
        let (snapshot, _) = self.snapshot(scope, true).await?;
        let index = snapshot.index();
        find_app(&index, &snapshot.services, scope, name)
    }

    /// Lists every deployment of an application, across all of its versions.
    pub async fn app_deployments(&self, namespace: &str, name: &str) -> Result<Vec<Deployment>> {
        require("application name", name)?;
        let scope = NamespaceScope::Named(namespace.to_string());
        let deployments =
            Store::<Deployment>::list(&self.store, &scope, &app_selector(name)).await?;
        Ok(deployments)
    }

    /// Reads everything needed to aggregate applications in `scope`.
    ///
    /// Virtual services are read from all namespaces so that routes defined
    /// alongside an ingress gateway are attached to the applications they
    /// target. Unless `strict`, failures other than listing services are
    /// returned as messages rather than errors.
    pub(crate) async fn snapshot(
        &self,
        scope: &NamespaceScope,
        strict: bool,
    ) -> Result<(Snapshot, Vec<String>)> {
        let all = Selector::default();
        let (services, destination_rules, virtual_services, namespaces) = futures::join!(
            Store::<Service>::list(&self.store, scope, &all),
            Store::<DestinationRule>::list(&self.store, scope, &all),
            Store::<VirtualService>::list(&self.store, &NamespaceScope::All, &all),
            self.store.namespaces(),
        );

        let mut errors = Vec::new();
        let snapshot = Snapshot {
            destination_rules: tolerate(destination_rules, "destination rules", strict, &mut errors)?,
            virtual_services: tolerate(virtual_services, "virtual services", strict, &mut errors)?,
            namespaces: tolerate(namespaces, "namespaces", strict, &mut errors)?,
            services: services?,
        };
        Ok((snapshot, errors))
    }
}

fn tolerate<T>(
    res: store::Result<Vec<T>>,
    what: &str,
    strict: bool,
    errors: &mut Vec<String>,
) -> Result<Vec<T>> {
    match res {
        Ok(items) => Ok(items),
        Err(error) if !strict => {
            tracing::warn!(%error, "Failed to list {}", what);
            errors.push(format!("failed to list {}: {}", what, error));
            Ok(Vec::new())
        }
        Err(error) => Err(error.into()),
    }
}

/// Builds the only application backed by a service named `name`.
pub(crate) fn find_app(
    index: &Index<'_>,
    services: &[Service],
    scope: &NamespaceScope,
    name: &str,
) -> Result<App> {
    let mut apps = services
        .iter()
        .filter(|svc| svc.name_any() == name)
        .map(|svc| index.app(svc))
        .collect::<Result<Vec<_>, _>>()?;
    if apps.len() != 1 {
        return Err(Error::AmbiguousResult {
            name: name.to_string(),
            scope: scope.to_string(),
            found: apps.len(),
        });
    }
    Ok(apps.remove(0))
}
