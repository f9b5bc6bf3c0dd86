//! Istio application model.
//!
//! An *application* is a Kubernetes `Service` together with the Istio
//! resources that shape its traffic:
//!
//! - A `DestinationRule` whose host resolves to the service declares one
//!   subset per application version.
//! - A `VirtualService` routes requests for the service (or through a
//!   gateway to it) across those subsets.
//! - One `Deployment` per version supplies the pods each subset selects.
//!
//! ```text
//! [ VirtualService ] -> [ DestinationRule subset ] -> [ Deployment pods ]
//!          \__________ host FQDN __________/
//!                          |
//!                     [ Service ]
//! ```
//!
//! None of these resources reference each other by ID; they are related only
//! by the fully-qualified name their host fields resolve to. This crate holds
//! the pure parts of the model: name resolution, aggregation of resources into
//! [`App`]s, and the edits applied to subsets, routes and workloads. All I/O
//! lives in the store and rollout crates.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod aggregate;
pub mod app;
pub mod fqdn;
pub mod labels;
pub mod route;
pub mod subset;
pub mod workload;

pub use self::{
    aggregate::{ConflictError, Index, Snapshot},
    app::{App, AppList, Destination, DEFAULT_VERSION},
    fqdn::Fqdn,
    labels::WorkloadLabels,
    route::{InvalidMatchScope, MatchScope},
    workload::{CanaryDeployment, NewApplication},
};
