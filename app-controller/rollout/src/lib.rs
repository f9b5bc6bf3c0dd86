//! Application workflows.
//!
//! Each workflow reads the current state of an application from the store,
//! computes the subset, route and workload edits it needs, and writes them
//! back one resource at a time. There is no transaction spanning those
//! writes: a workflow that fails part-way leaves earlier writes in place and
//! reports them through [`Error::Partial`].

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod canary;
mod config;
mod create;
mod error;
mod query;
mod report;
mod traffic;
mod write;


pub use self::{
    config::{Config, DrainConfig},
    error::{Error, Result},
    report::{Action, Outcome, Report, Step},
};
pub use istio_app_controller_core::{
    App, AppList, CanaryDeployment, MatchScope, NewApplication,
};
pub use istio_app_controller_k8s_store::NamespaceScope;
use istio_app_controller_k8s_store::ClusterStore;

/// Runs application workflows against a store.
#[derive(Clone, Debug)]
pub struct Controller<S> {
    store: S,
    config: Config,
}

// === impl Controller ===

impl<S: ClusterStore> Controller<S> {
    pub fn new(store: S, config: Config) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// Rejects empty names before anything is read or written.
fn require(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::Validation(format!("{} must not be empty", field)));
    }
    Ok(())
}
