//! Admission control for VICE launches
//!
//! A launch is admitted when the submitter is under their concurrent job
//! limit and over quota on no resource. Running jobs come from the cluster,
//! limits from Postgres, overages from the quota service over NATS.

#![deny(missing_docs)]

pub mod controller;
pub mod count;
pub mod error;
pub mod limits;
pub mod quota;
pub mod reservation;
pub mod rules;

pub use controller::{Admission, AdmissionController};
pub use count::{
    AnalysisStatusStore, DeploymentLister, DeploymentListerImpl, PgAnalysisStatusStore,
    RunningJobCounter, RunningJobs,
};
pub use error::AdmissionError;
pub use limits::{JobLimitStore, PgJobLimitStore};
pub use quota::{NatsQuotaClient, Overage, QuotaClient};
pub use reservation::{Reservation, ReservationTable};
pub use rules::{AdmissionDecision, ErrorCode, ErrorResponse};
