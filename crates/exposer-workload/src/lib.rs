//! VICE workload compilation and reconciliation
//!
//! A job compiles into up to two ConfigMaps, a single-replica Deployment
//! with stager sidecars around the analysis container, and a Service. The
//! [`Reconciler`] upserts them in dependency order.

#![deny(missing_docs)]

pub mod compiler;
pub mod config;
pub mod containers;
pub mod deployment;
pub mod error;
pub mod k8s;
pub mod layout;
pub mod reconciler;
pub mod service;

pub use compiler::{CompiledWorkload, WorkloadCompiler};
pub use config::PathListIdentifier;
pub use containers::StagerImage;
pub use deployment::StagingTopology;
pub use error::CompilationError;
pub use reconciler::{
    ApplyOutcome, ObjectKind, ReconcileReport, Reconciler, WorkloadKubeClient,
    WorkloadKubeClientImpl,
};
