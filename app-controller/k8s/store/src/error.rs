use crate::{kind, Object};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: String,
        namespace: String,
        name: String,
    },

    #[error("{kind} {namespace}/{name} already exists")]
    AlreadyExists {
        kind: String,
        namespace: String,
        name: String,
    },

    /// The resource changed since it was read.
    #[error("{kind} {namespace}/{name} was modified concurrently")]
    Conflict {
        kind: String,
        namespace: String,
        name: String,
    },

    #[error("{kind} is missing {field}")]
    MissingMetadata { kind: String, field: &'static str },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("failed to decode {kind}: {source}")]
    Decode {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Kube(#[from] kube::Error),
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub(crate) fn not_found<K: Object>(namespace: &str, name: &str) -> Self {
        Self::NotFound {
            kind: kind::<K>(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    pub(crate) fn already_exists<K: Object>(namespace: &str, name: &str) -> Self {
        Self::AlreadyExists {
            kind: kind::<K>(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    pub(crate) fn conflict<K: Object>(namespace: &str, name: &str) -> Self {
        Self::Conflict {
            kind: kind::<K>(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    pub(crate) fn missing<K: Object>(field: &'static str) -> Self {
        Self::MissingMetadata {
            kind: kind::<K>(),
            field,
        }
    }

    /// Classifies an API error for the named resource.
    pub(crate) fn from_api<K: Object>(error: kube::Error, namespace: &str, name: &str) -> Self {
        match &error {
            kube::Error::Api(rsp) if rsp.code == 404 => Self::not_found::<K>(namespace, name),
            kube::Error::Api(rsp) if rsp.code == 409 && rsp.reason == "AlreadyExists" => {
                Self::already_exists::<K>(namespace, name)
            }
            kube::Error::Api(rsp) if rsp.code == 409 => Self::conflict::<K>(namespace, name),
            _ => Self::Kube(error),
        }
    }
}
