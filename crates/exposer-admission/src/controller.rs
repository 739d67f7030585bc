//! Admission decision for a single launch

use std::sync::Arc;

use exposer_common::labels::label_value;
use exposer_common::Job;
use tracing::{info, instrument};

use crate::count::RunningJobCounter;
use crate::error::AdmissionError;
use crate::limits::JobLimitStore;
use crate::quota::{normalize_username, QuotaClient};
use crate::reservation::{Reservation, ReservationTable};
use crate::rules::{evaluate, AdmissionDecision, LimitInputs};

/// Decision plus the reservation backing it
///
/// An allowed launch holds a reservation; keep the value alive until
/// provisioning finishes. Dropping it releases the slot.
#[derive(Debug)]
pub struct Admission {
    decision: AdmissionDecision,
    reservation: Option<Reservation>,
}

impl Admission {
    /// The decision
    pub fn decision(&self) -> &AdmissionDecision {
        &self.decision
    }

    /// Whether the job was admitted
    pub fn is_allowed(&self) -> bool {
        self.decision.is_allowed()
    }

    /// Split into the decision and the reservation, present when allowed
    pub fn into_parts(self) -> (AdmissionDecision, Option<Reservation>) {
        (self.decision, self.reservation)
    }
}

/// Decides whether a job may launch
#[derive(Clone)]
pub struct AdmissionController {
    counter: RunningJobCounter,
    limits: Arc<dyn JobLimitStore>,
    quota: Arc<dyn QuotaClient>,
    reservations: ReservationTable,
    user_domain: Option<String>,
}

impl AdmissionController {
    /// Create a controller
    pub fn new(
        counter: RunningJobCounter,
        limits: Arc<dyn JobLimitStore>,
        quota: Arc<dyn QuotaClient>,
    ) -> Self {
        Self {
            counter,
            limits,
            quota,
            reservations: ReservationTable::new(),
            user_domain: None,
        }
    }

    /// Domain suffix stripped from usernames sent to the quota service
    pub fn with_user_domain(mut self, domain: impl Into<String>) -> Self {
        let domain = domain.into();
        self.user_domain = (!domain.is_empty()).then_some(domain);
        self
    }

    /// Reservation table in use
    pub fn reservations(&self) -> &ReservationTable {
        &self.reservations
    }

    /// Run every admission check for a job
    ///
    /// `Err` means no decision could be made. A denial is `Ok` with
    /// [`AdmissionDecision::Denied`].
    #[instrument(skip(self, job), fields(invocation = %job.invocation_id, user = %job.submitter))]
    pub async fn admit(&self, job: &Job) -> Result<Admission, AdmissionError> {
        if !job.is_interactive() {
            return Err(AdmissionError::UnsupportedJobType {
                job_type: job.job_type.clone(),
                execution_target: job.execution_target.clone(),
            });
        }

        let user = job.submitter.as_str();
        let user_key = label_value(user);

        let running = self
            .counter
            .running(user)
            .await
            .map_err(|source| AdmissionError::CountJobs {
                user: user.to_string(),
                source,
            })?;

        let job_limit = self
            .limits
            .user_job_limit(user)
            .await
            .map_err(|source| AdmissionError::JobLimit {
                user: user.to_string(),
                source,
            })?;

        let default_job_limit = self
            .limits
            .default_job_limit()
            .await
            .map_err(|source| AdmissionError::DefaultJobLimit { source })?
            .ok_or(AdmissionError::MissingDefaultJobLimit)?;

        let quota_user = normalize_username(user, self.user_domain.as_deref());
        let overages = self
            .quota
            .user_overages(quota_user)
            .await
            .map_err(|source| AdmissionError::Overages {
                user: user.to_string(),
                source,
            })?;

        let pending = self.reservations.pending(&user_key, &running);
        let mut inputs = LimitInputs {
            user: user.to_string(),
            default_job_limit,
            job_count: running.count() + pending,
            job_limit,
            overages,
        };
        let mut decision = evaluate(&inputs);

        // The count above is a snapshot; the slot is claimed atomically.
        let mut reservation = None;
        if decision.is_allowed() {
            let limit = job_limit.unwrap_or(default_job_limit);
            match self
                .reservations
                .try_reserve(&user_key, &job.invocation_id, &running, limit)
            {
                Ok(r) => reservation = Some(r),
                Err(job_count) => {
                    inputs.job_count = job_count;
                    decision = evaluate(&inputs);
                }
            }
        }

        info!(
            running = running.count(),
            pending,
            ?job_limit,
            default_job_limit,
            decision = decision.error_code().unwrap_or("allowed"),
            "admission decided"
        );

        Ok(Admission {
            decision,
            reservation,
        })
    }
}
