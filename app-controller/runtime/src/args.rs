use crate::{
    rollout::{
        CanaryDeployment, Config, Controller, DrainConfig, Error, MatchScope, NamespaceScope,
        NewApplication, Report,
    },
    store::{ClusterStore, KubeStore},
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    io::Write,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::info;

#[derive(Debug, Parser)]
#[clap(
    name = "istio-app-controller",
    about = "Manages applications and their version rollouts on an Istio mesh"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "istio_app_controller=info,warn",
        env = "ISTIO_APP_CONTROLLER_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    /// Replicas for a new application when the request does not set a
    /// positive count.
    #[clap(long, default_value = "2")]
    default_replicas: i32,

    /// How often virtual services are re-read while a retired version drains.
    #[clap(long, default_value = "500")]
    drain_poll_ms: u64,

    /// Gives up waiting for a retired version's routes to drain after this
    /// long.
    #[clap(long, default_value = "30000")]
    drain_timeout_ms: u64,

    /// Time allowed for sidecars to pick up routes before a retired version's
    /// deployment is deleted.
    #[clap(long, default_value = "3000")]
    drain_grace_ms: u64,

    #[clap(long, env = "ISTIO_APP_CONTROLLER_FIELD_MANAGER")]
    field_manager: Option<String>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Lists the applications in a namespace.
    List {
        #[clap(flatten)]
        scope: Scope,
    },

    /// Shows one application.
    Get {
        #[clap(flatten)]
        scope: Scope,

        name: String,
    },

    /// Lists an application's deployments.
    Deployments {
        #[clap(long, short = 'n', default_value = "default")]
        namespace: String,

        name: String,
    },

    /// Creates an application from a request file.
    Create {
        #[clap(long, short = 'n', default_value = "default")]
        namespace: String,

        name: String,

        /// A YAML or JSON file describing the application's first version.
        #[clap(long, short = 'f')]
        file: PathBuf,
    },

    /// Starts a canary version of an application from a request file.
    Canary {
        #[clap(long, short = 'n', default_value = "default")]
        namespace: String,

        app: String,

        /// A YAML or JSON file describing the canary version.
        #[clap(long, short = 'f')]
        file: PathBuf,
    },

    /// Routes all of an application's traffic to one version.
    TakeOver {
        #[clap(flatten)]
        target: Target,
    },

    /// Removes a version's routes and deletes its deployment.
    Retire {
        #[clap(flatten)]
        target: Target,
    },

    /// Deletes an application and all of its versions.
    Delete {
        #[clap(long, short = 'n', default_value = "default")]
        namespace: String,

        name: String,
    },
}

#[derive(Debug, clap::Args)]
struct Scope {
    #[clap(long, short = 'n', default_value = "default")]
    namespace: String,

    /// Looks in every namespace.
    #[clap(long, short = 'A', conflicts_with = "namespace")]
    all_namespaces: bool,
}

#[derive(Debug, clap::Args)]
struct Target {
    #[clap(long, short = 'n', default_value = "default")]
    namespace: String,

    app: String,

    version: String,

    /// Which virtual service hosts identify the application's routes: `host`,
    /// `gateway` or `all`.
    #[clap(long, default_value = "host")]
    match_scope: MatchScope,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            client,
            default_replicas,
            drain_poll_ms,
            drain_timeout_ms,
            drain_grace_ms,
            field_manager,
            command,
        } = self;

        log_format.try_init(log_level)?;

        let config = Config {
            default_replicas,
            drain: DrainConfig {
                poll_interval: Duration::from_millis(drain_poll_ms),
                timeout: Duration::from_millis(drain_timeout_ms),
                grace: Duration::from_millis(drain_grace_ms),
            },
        };

        let client = client.try_client().await?;
        let mut store = KubeStore::new(client);
        if let Some(field_manager) = field_manager {
            store = store.with_field_manager(field_manager);
        }

        command.run(&Controller::new(store, config)).await
    }
}

// === impl Command ===

impl Command {
    async fn run<S: ClusterStore>(self, controller: &Controller<S>) -> Result<()> {
        match self {
            Self::List { scope } => {
                let list = controller.list_apps(&scope.into()).await?;
                for error in &list.errors {
                    tracing::warn!(%error, "Partial listing");
                }
                print(&list)
            }

            Self::Get { scope, name } => {
                let app = controller.get_app(&scope.into(), &name).await?;
                print(&app)
            }

            Self::Deployments { namespace, name } => {
                let deployments = controller.app_deployments(&namespace, &name).await?;
                print(&deployments)
            }

            Self::Create {
                namespace,
                name,
                file,
            } => {
                let request = read_request::<NewApplication>(&file).await?;
                finish(controller.create_app(&namespace, &name, request).await)
            }

            Self::Canary {
                namespace,
                app,
                file,
            } => {
                let request = read_request::<CanaryDeployment>(&file).await?;
                finish(controller.create_canary(&namespace, &app, request).await)
            }

            Self::TakeOver { target } => {
                let Target {
                    namespace,
                    app,
                    version,
                    match_scope,
                } = target;
                finish(
                    controller
                        .take_over_traffic(&namespace, &app, &version, match_scope)
                        .await,
                )
            }

            Self::Retire { target } => {
                let Target {
                    namespace,
                    app,
                    version,
                    match_scope,
                } = target;
                finish(
                    controller
                        .retire_version(&namespace, &app, &version, match_scope)
                        .await,
                )
            }

            Self::Delete { namespace, name } => {
                let report = controller.delete_app(&namespace, &name).await?;
                let failures = report.failures().count();
                print(&report)?;
                if failures > 0 {
                    anyhow::bail!("{} resources could not be deleted", failures);
                }
                Ok(())
            }
        }
    }
}

impl From<Scope> for NamespaceScope {
    fn from(Scope { namespace, all_namespaces }: Scope) -> Self {
        if all_namespaces {
            NamespaceScope::All
        } else {
            NamespaceScope::Named(namespace)
        }
    }
}

/// Prints a workflow's report. When the workflow failed after writing, the
/// steps it completed are printed before the error is returned.
fn finish(res: Result<Report, Error>) -> Result<()> {
    match res {
        Ok(report) => {
            info!(steps = report.steps.len(), "Completed");
            print(&report)
        }
        Err(error) => {
            if let Some(report) = error.report() {
                print(report)?;
            }
            Err(error.into())
        }
    }
}

fn print<T: Serialize>(value: &T) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}

/// Reads a request body. YAML is a superset of JSON, so either is accepted.
async fn read_request<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_yaml::from_slice(&bytes).with_context(|| format!("failed to parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("istio-app-controller").chain(args.iter().copied()))
            .expect("arguments must parse")
    }

    #[test]
    fn parses_retire_target() {
        let args = parse(&[
            "--drain-grace-ms=0",
            "retire",
            "-n",
            "bookinfo",
            "reviews",
            "v1",
            "--match-scope",
            "gateway",
        ]);
        assert_eq!(args.drain_grace_ms, 0);
        match args.command {
            Command::Retire { target } => {
                assert_eq!(target.namespace, "bookinfo");
                assert_eq!(target.app, "reviews");
                assert_eq!(target.version, "v1");
                assert_eq!(target.match_scope, MatchScope::Gateway);
            }
            command => panic!("unexpected command: {:?}", command),
        }
    }

    #[test]
    fn match_scope_defaults_to_host() {
        let args = parse(&["take-over", "reviews", "v2"]);
        match args.command {
            Command::TakeOver { target } => {
                assert_eq!(target.namespace, "default");
                assert_eq!(target.match_scope, MatchScope::Host);
            }
            command => panic!("unexpected command: {:?}", command),
        }
    }

    #[test]
    fn rejects_unknown_match_scope() {
        let res = Args::try_parse_from([
            "istio-app-controller",
            "take-over",
            "reviews",
            "v2",
            "--match-scope",
            "mesh",
        ]);
        assert!(res.is_err());
    }

    #[test]
    fn all_namespaces_scope() {
        let args = parse(&["list", "-A"]);
        match args.command {
            Command::List { scope } => {
                assert_eq!(NamespaceScope::from(scope), NamespaceScope::All);
            }
            command => panic!("unexpected command: {:?}", command),
        }

        let args = parse(&["get", "-n", "bookinfo", "reviews"]);
        match args.command {
            Command::Get { scope, name } => {
                assert_eq!(name, "reviews");
                assert_eq!(
                    NamespaceScope::from(scope),
                    NamespaceScope::Named("bookinfo".to_string())
                );
            }
            command => panic!("unexpected command: {:?}", command),
        }
    }

    #[tokio::test]
    async fn reads_yaml_requests() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("canary.yaml");
        std::fs::write(
            &path,
            "version: v2\nreplicas: 3\npodTemplate:\n  metadata:\n    labels:\n      tier: backend\n",
        )
        .unwrap();

        let request = read_request::<CanaryDeployment>(&path).await.unwrap();
        assert_eq!(request.version, "v2");
        assert_eq!(request.replicas, Some(3));
        let labels = request.pod_template.metadata.unwrap().labels.unwrap();
        assert_eq!(labels["tier"], "backend");
    }

    #[tokio::test]
    async fn reads_json_requests() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.json");
        std::fs::write(
            &path,
            r#"{"version":"v1","ports":[{"name":"http","port":9080}],"podTemplate":{}}"#,
        )
        .unwrap();

        let request = read_request::<NewApplication>(&path).await.unwrap();
        assert_eq!(request.version, "v1");
        assert_eq!(request.replicas, None);
        assert_eq!(request.ports[0].port, 9080);
    }
}
