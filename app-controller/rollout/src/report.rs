use crate::Error;
use istio_app_controller_k8s_store::{self as store, Object};
use serde::Serialize;
use std::fmt;

/// The writes a workflow issued, in order, and how each went.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Report {
    pub steps: Vec<Step>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub action: Action,
    pub kind: String,
    pub namespace: String,
    pub name: String,
    pub outcome: Outcome,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Update,
    Delete,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum Outcome {
    Done,

    /// Nothing needed to be written.
    Skipped { reason: String },

    Failed { error: String },
}

// === impl Report ===

impl Report {
    pub fn done<K: Object>(&mut self, action: Action, namespace: &str, name: &str) {
        self.push::<K>(action, namespace, name, Outcome::Done);
    }

    pub fn skipped<K: Object>(
        &mut self,
        action: Action,
        namespace: &str,
        name: &str,
        reason: impl ToString,
    ) {
        let reason = reason.to_string();
        self.push::<K>(action, namespace, name, Outcome::Skipped { reason });
    }

    pub fn failed<K: Object>(
        &mut self,
        action: Action,
        namespace: &str,
        name: &str,
        error: &store::Error,
    ) {
        let error = error.to_string();
        self.push::<K>(action, namespace, name, Outcome::Failed { error });
    }

    fn push<K: Object>(&mut self, action: Action, namespace: &str, name: &str, outcome: Outcome) {
        self.steps.push(Step {
            action,
            kind: K::kind(&()).to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
            outcome,
        });
    }

    /// The number of writes that committed.
    pub fn completed(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.outcome == Outcome::Done)
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &Step> + '_ {
        self.steps
            .iter()
            .filter(|s| matches!(s.outcome, Outcome::Failed { .. }))
    }

    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }

    /// Wraps a fatal error, attaching this report when earlier writes have
    /// already committed.
    pub(crate) fn abort(self, error: impl Into<Error>) -> Error {
        let error = error.into();
        if self.completed() == 0 {
            return error;
        }
        Error::Partial {
            report: self,
            source: Box::new(error),
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let action = match self.action {
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
        };
        write!(f, "{} {} {}/{}", action, self.kind, self.namespace, self.name)?;
        match &self.outcome {
            Outcome::Done => Ok(()),
            Outcome::Skipped { reason } => write!(f, " (skipped: {})", reason),
            Outcome::Failed { error } => write!(f, " (failed: {})", error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use istio_app_controller_k8s_api::{Deployment, Service};

    #[test]
    fn abort_without_writes_is_plain() {
        let mut report = Report::default();
        report.failed::<Service>(
            Action::Create,
            "bookinfo",
            "reviews",
            &store::Error::Unavailable("down".to_string()),
        );
        let err = report.abort(Error::Validation("boom".to_string()));
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn abort_after_writes_is_partial() {
        let mut report = Report::default();
        report.done::<Service>(Action::Create, "bookinfo", "reviews");
        report.failed::<Deployment>(
            Action::Create,
            "bookinfo",
            "reviews-v1",
            &store::Error::Unavailable("down".to_string()),
        );
        assert!(!report.is_clean());

        match report.abort(store::Error::Unavailable("down".to_string())) {
            Error::Partial { report, source } => {
                assert_eq!(report.completed(), 1);
                assert!(matches!(*source, Error::Store(_)));
                assert_eq!(
                    report.steps[1].to_string(),
                    "create Deployment bookinfo/reviews-v1 (failed: store unavailable: down)"
                );
            }
            err => panic!("unexpected error: {}", err),
        }
    }

    #[test]
    fn serializes_outcomes() {
        let mut report = Report::default();
        report.skipped::<Service>(Action::Delete, "bookinfo", "reviews", "not found");
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(
            json["steps"][0],
            serde_json::json!({
                "action": "delete",
                "kind": "Service",
                "namespace": "bookinfo",
                "name": "reviews",
                "outcome": { "status": "skipped", "reason": "not found" },
            })
        );
    }
}
