use crate::{require, Action, Controller, DrainConfig, Error, Report, Result};
use istio_app_controller_core::{route, subset, Fqdn, MatchScope, WorkloadLabels};
use istio_app_controller_k8s_api::{
    Deployment, DestinationRule, ResourceExt, Selector, VirtualService,
};
use istio_app_controller_k8s_store::{self as store, ClusterStore, NamespaceScope, Store};
use tokio::time;
use tracing::instrument;

impl<S: ClusterStore> Controller<S> {
    /// Sends all of an application's traffic to one version.
    ///
    /// Every virtual service matching the application under `scope` has its
    /// whole HTTP route table replaced by a single route to the version. When
    /// none match, a virtual service named after the application is created.
    /// The first failed update ends the workflow; virtual services already
    /// updated keep their new routes.
    #[instrument(skip_all, fields(%namespace, app = %app_name, %version, %scope))]
    pub async fn take_over_traffic(
        &self,
        namespace: &str,
        app_name: &str,
        version: &str,
        scope: MatchScope,
    ) -> Result<Report> {
        require("namespace", namespace)?;
        require("application name", app_name)?;
        require("version", version)?;

        let labels = WorkloadLabels::new(app_name, version);
        let deployments = self.version_deployments(namespace, &labels).await?;
        if deployments.is_empty() {
            return Err(Error::DeploymentNotFound {
                app: app_name.to_string(),
                version: version.to_string(),
                found: 0,
            });
        }

        let fqdn = Fqdn::new(app_name, namespace);
        let virtual_services = self.matching_virtual_services(&fqdn, scope).await?;
        let mut report = Report::default();

        if virtual_services.is_empty() {
            let vs = route::new_virtual_service(app_name, namespace, app_name, version);
            self.create(&mut report, &vs).await?;
            tracing::info!("Created virtual service");
            return Ok(report);
        }

        for mut vs in virtual_services {
            // A short host would resolve in the virtual service's namespace.
            let host = if vs.namespace().as_deref() == Some(namespace) {
                app_name.to_string()
            } else {
                fqdn.to_string()
            };
            route::take_over(&mut vs, &host, version);
            self.update(&mut report, &vs).await?;
        }

        tracing::info!(virtual_services = report.completed(), "Took over traffic");
        Ok(report)
    }

    /// Takes a version out of service and deletes its deployment.
    ///
    /// Routes to the version are removed from every virtual service matching
    /// the application under `scope`, and its subset is removed from the
    /// application's destination rule. These edits are best-effort: failures
    /// are logged and reported, and the workflow continues. The workflow then
    /// waits for the routes to drain before deleting the version's one
    /// deployment.
    #[instrument(skip_all, fields(%namespace, app = %app_name, %version, %scope))]
    pub async fn retire_version(
        &self,
        namespace: &str,
        app_name: &str,
        version: &str,
        scope: MatchScope,
    ) -> Result<Report> {
        require("namespace", namespace)?;
        require("application name", app_name)?;
        require("version", version)?;

        let fqdn = Fqdn::new(app_name, namespace);
        let mut report = Report::default();

        match self.matching_virtual_services(&fqdn, scope).await {
            Ok(virtual_services) => {
                for mut vs in virtual_services {
                    if route::remove_route_by_subset(&mut vs, version) {
                        self.update_best_effort(&mut report, &vs).await;
                    }
                }
            }
            Err(error) => {
                tracing::warn!(%error, "Failed to list virtual services");
                report.failed::<VirtualService>(Action::Update, "", "*", &error);
            }
        }

        match Store::<DestinationRule>::get(&self.store, namespace, app_name).await {
            Ok(mut rule) => {
                if subset::remove_subset(&mut rule, version) {
                    self.update_best_effort(&mut report, &rule).await;
                }
            }
            Err(store::Error::NotFound { .. }) => {
                tracing::debug!("No destination rule");
            }
            Err(error) => {
                tracing::warn!(%error, "Failed to get destination rule");
                report.failed::<DestinationRule>(Action::Update, namespace, app_name, &error);
            }
        }

        self.drain(&fqdn, scope, version).await;

        let labels = WorkloadLabels::new(app_name, version);
        let mut deployments = match self.version_deployments(namespace, &labels).await {
            Ok(deployments) => deployments,
            Err(error) => return Err(report.abort(error)),
        };
        if deployments.len() != 1 {
            let error = Error::DeploymentNotFound {
                app: app_name.to_string(),
                version: version.to_string(),
                found: deployments.len(),
            };
            return Err(report.abort(error));
        }

        let name = deployments.remove(0).name_any();
        if let Err(error) = Store::<Deployment>::delete(&self.store, namespace, &name).await {
            report.failed::<Deployment>(Action::Delete, namespace, &name, &error);
            return Err(report.abort(error));
        }
        report.done::<Deployment>(Action::Delete, namespace, &name);

        tracing::info!(deployment = %name, failures = report.failures().count(), "Retired version");
        Ok(report)
    }

    /// Waits until no matching virtual service routes to `version`, then
    /// allows the data plane a grace period to converge.
    ///
    /// Gives up waiting after the configured timeout; the caller proceeds
    /// either way.
    async fn drain(&self, fqdn: &Fqdn, scope: MatchScope, version: &str) {
        let DrainConfig {
            poll_interval,
            timeout,
            grace,
        } = self.config.drain.clone();

        let drained = async {
            loop {
                match self.routing_to(fqdn, scope, version).await {
                    Ok(0) => return,
                    Ok(n) => tracing::debug!(virtual_services = n, "Waiting for routes to drain"),
                    Err(error) => tracing::warn!(%error, "Failed to check routes"),
                }
                time::sleep(poll_interval).await;
            }
        };
        if time::timeout(timeout, drained).await.is_err() {
            tracing::warn!(?timeout, "Routes to retired version did not drain");
        }

        tracing::debug!(?grace, "Waiting for routes to propagate");
        time::sleep(grace).await;
    }

    /// Counts the matching virtual services that still route to `version`.
    async fn routing_to(
        &self,
        fqdn: &Fqdn,
        scope: MatchScope,
        version: &str,
    ) -> store::Result<usize> {
        let virtual_services = self.matching_virtual_services(fqdn, scope).await?;
        Ok(virtual_services
            .iter()
            .filter(|vs| route::references(vs, version))
            .count())
    }

    /// Lists the virtual services, in any namespace, that route traffic for
    /// `fqdn` under `scope`.
    async fn matching_virtual_services(
        &self,
        fqdn: &Fqdn,
        scope: MatchScope,
    ) -> store::Result<Vec<VirtualService>> {
        let all = Store::<VirtualService>::list(
            &self.store,
            &NamespaceScope::All,
            &Selector::default(),
        )
        .await?;
        Ok(all
            .into_iter()
            .filter(|vs| route::matches(vs, fqdn, scope))
            .collect())
    }

    async fn version_deployments(
        &self,
        namespace: &str,
        labels: &WorkloadLabels,
    ) -> store::Result<Vec<Deployment>> {
        let scope = NamespaceScope::Named(namespace.to_string());
        Store::<Deployment>::list(&self.store, &scope, &labels.selector()).await
    }
}
