use crate::Report;
use istio_app_controller_core::ConflictError;
use istio_app_controller_k8s_store as store;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The request was rejected before anything was written.
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: String,
        namespace: String,
        name: String,
    },

    #[error("expected exactly one application named {name} in {scope}, found {found}")]
    AmbiguousResult {
        name: String,
        scope: String,
        found: usize,
    },

    #[error("application {app} is already split across subsets {}", .subsets.join(", "))]
    AlreadyCanarying { app: String, subsets: Vec<String> },

    #[error("expected exactly one deployment labeled app={app}, found {found}")]
    MultipleOrNoParent { app: String, found: usize },

    #[error("pod template of deployment {0} needs non-empty app and version labels")]
    MissingLabels(String),

    #[error("expected exactly one deployment labeled app={app},version={version}, found {found}")]
    DeploymentNotFound {
        app: String,
        version: String,
        found: usize,
    },

    #[error(transparent)]
    ConflictingDestinationRules(#[from] ConflictError),

    #[error(transparent)]
    Store(store::Error),

    /// A fatal error after some writes had already committed. Those writes
    /// are not undone.
    #[error("{source} (after {} completed writes)", .report.completed())]
    Partial {
        report: Report,
        #[source]
        source: Box<Error>,
    },
}

impl From<store::Error> for Error {
    fn from(error: store::Error) -> Self {
        match error {
            store::Error::NotFound {
                kind,
                namespace,
                name,
            } => Self::NotFound {
                kind,
                namespace,
                name,
            },
            error => Self::Store(error),
        }
    }
}

impl Error {
    /// The report of committed writes, when the error interrupted a
    /// workflow.
    pub fn report(&self) -> Option<&Report> {
        match self {
            Self::Partial { report, .. } => Some(report),
            _ => None,
        }
    }
}
