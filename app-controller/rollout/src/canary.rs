use crate::{require, Action, Controller, Error, Report, Result};
use istio_app_controller_core::{
    labels::app_selector,
    subset,
    workload::{self, requested_replicas},
    CanaryDeployment, WorkloadLabels,
};
use istio_app_controller_k8s_api::{Deployment, DestinationRule, ResourceExt};
use istio_app_controller_k8s_store::{self as store, ClusterStore, NamespaceScope, Store};
use tracing::instrument;

impl<S: ClusterStore> Controller<S> {
    /// Deploys a new version of an application next to its current one and
    /// declares a subset for it.
    ///
    /// The application must not already be split across versions and must
    /// have exactly one deployment, whose pod template carries its app and
    /// version labels. Traffic is not shifted: routes are left as they are
    /// until [`Controller::take_over_traffic`] is called.
    #[instrument(skip_all, fields(%namespace, app = %app_name, version = %req.version))]
    pub async fn create_canary(
        &self,
        namespace: &str,
        app_name: &str,
        req: CanaryDeployment,
    ) -> Result<Report> {
        require("namespace", namespace)?;
        require("application name", app_name)?;
        require("version", &req.version)?;

        let scope = NamespaceScope::Named(namespace.to_string());
        let app = self.get_app(&scope, app_name).await?;
        if app.is_split() {
            return Err(Error::AlreadyCanarying {
                app: app_name.to_string(),
                subsets: app.versions().map(str::to_string).collect(),
            });
        }

        let mut parents =
            Store::<Deployment>::list(&self.store, &scope, &app_selector(app_name)).await?;
        if parents.len() != 1 {
            return Err(Error::MultipleOrNoParent {
                app: app_name.to_string(),
                found: parents.len(),
            });
        }
        let mut parent = parents.remove(0);
        let parent_labels = workload::parent_labels(&parent)
            .ok_or_else(|| Error::MissingLabels(parent.name_any()))?;
        if parent_labels.version == req.version {
            return Err(Error::Validation(format!(
                "version {} is already deployed by {}",
                req.version,
                parent.name_any()
            )));
        }

        let mut report = Report::default();

        if workload::repair_parent(&mut parent, &parent_labels) {
            tracing::info!(deployment = %parent.name_any(), "Repairing parent labels");
            parent = self.update(&mut report, &parent).await?;
        }

        let CanaryDeployment {
            version,
            replicas,
            pod_template,
        } = req;
        let replicas = requested_replicas(replicas)
            .or_else(|| parent.spec.as_ref().and_then(|s| s.replicas))
            .unwrap_or(self.config.default_replicas);
        let labels = WorkloadLabels::new(app_name, &version);
        let canary = workload::canary_deployment(&parent, &labels, replicas, pod_template);
        self.create(&mut report, &canary).await?;

        match Store::<DestinationRule>::get(&self.store, namespace, app_name).await {
            Ok(mut rule) => {
                if subset::add_subset(&mut rule, &version) {
                    self.update(&mut report, &rule).await?;
                } else {
                    report.skipped::<DestinationRule>(
                        Action::Update,
                        namespace,
                        app_name,
                        format!("subset {} exists", version),
                    );
                }
            }
            Err(store::Error::NotFound { .. }) => {
                let rule = subset::new_rule(
                    app_name,
                    namespace,
                    app_name,
                    [parent_labels.version.as_str(), version.as_str()],
                );
                self.create(&mut report, &rule).await?;
            }
            Err(error) => return Err(report.abort(error)),
        }

        tracing::info!(parent = %parent_labels.version, replicas, "Created canary");
        Ok(report)
    }
}
