#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use istio_app_controller_core as core;
pub use istio_app_controller_k8s_api as k8s;
pub use istio_app_controller_k8s_store as store;
pub use istio_app_controller_rollout as rollout;

mod args;

pub use self::args::Args;
