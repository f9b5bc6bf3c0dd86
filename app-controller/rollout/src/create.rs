use crate::{require, Action, Controller, Report, Result};
use istio_app_controller_core::{
    labels::app_selector,
    subset,
    workload::{self, requested_replicas},
    NewApplication, WorkloadLabels,
};
use istio_app_controller_k8s_api::{
    Deployment, DestinationRule, ResourceExt, Service, VirtualService,
};
use istio_app_controller_k8s_store::{ClusterStore, NamespaceScope, Store};
use tracing::instrument;

impl<S: ClusterStore> Controller<S> {
    /// Creates an application's service, the deployment for its first
    /// version and a destination rule declaring that version.
    ///
    /// Writes are issued in that order. A failed write ends the workflow;
    /// earlier writes are kept.
    #[instrument(skip_all, fields(%namespace, %name))]
    pub async fn create_app(
        &self,
        namespace: &str,
        name: &str,
        req: NewApplication,
    ) -> Result<Report> {
        require("namespace", namespace)?;
        require("application name", name)?;
        require("version", &req.version)?;

        let NewApplication {
            version,
            replicas,
            ports,
            pod_template,
        } = req;
        let mut report = Report::default();

        let svc = workload::app_service(name, namespace, ports);
        self.create(&mut report, &svc).await?;

        let replicas = requested_replicas(replicas).unwrap_or(self.config.default_replicas);
        let labels = WorkloadLabels::new(name, &version);
        let deploy = workload::app_deployment(namespace, &labels, replicas, pod_template);
        self.create(&mut report, &deploy).await?;

        let rule = subset::new_rule(name, namespace, name, [version.as_str()]);
        self.create(&mut report, &rule).await?;

        tracing::info!(%version, replicas, "Created application");
        Ok(report)
    }

    /// Deletes an application's virtual service, destination rule,
    /// deployments and service, in that order.
    ///
    /// Every step is attempted. Resources that are already gone are skipped
    /// and failures are recorded in the report.
    #[instrument(skip_all, fields(%namespace, %name))]
    pub async fn delete_app(&self, namespace: &str, name: &str) -> Result<Report> {
        require("namespace", namespace)?;
        require("application name", name)?;

        let mut report = Report::default();

        self.delete_best_effort::<VirtualService>(&mut report, namespace, name)
            .await;
        self.delete_best_effort::<DestinationRule>(&mut report, namespace, name)
            .await;

        let scope = NamespaceScope::Named(namespace.to_string());
        match Store::<Deployment>::list(&self.store, &scope, &app_selector(name)).await {
            Ok(deployments) => {
                for deploy in deployments {
                    self.delete_best_effort::<Deployment>(&mut report, namespace, &deploy.name_any())
                        .await;
                }
            }
            Err(error) => {
                tracing::warn!(%error, "Failed to list deployments");
                report.failed::<Deployment>(Action::Delete, namespace, "*", &error);
            }
        }

        self.delete_best_effort::<Service>(&mut report, namespace, name)
            .await;

        tracing::info!(
            completed = report.completed(),
            failed = report.failures().count(),
            "Deleted application"
        );
        Ok(report)
    }
}
