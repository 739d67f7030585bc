//! Running job counts
//!
//! A user's running jobs are the Deployments carrying their username
//! label, cross-checked against the analysis status store. Anything that
//! cannot be confirmed as finished is counted.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use exposer_common::labels::{username_selector, LABEL_APP, LABEL_EXTERNAL_ID};
use exposer_common::Error;
use futures::future::join_all;
use k8s_openapi::api::apps::v1::Deployment;
use kube::api::{Api, ListParams};
use kube::Client;
use sqlx::PgPool;
use tracing::{debug, warn};

#[cfg(test)]
use mockall::automock;

/// Statuses of analyses that are shutting down and no longer count
pub const TERMINAL_STATUSES: &[&str] = &["Failed", "Completed", "Canceled"];

/// Whether an analysis in `status` counts against the limit
pub fn status_counts(status: &str) -> bool {
    !TERMINAL_STATUSES.contains(&status)
}

/// Trait abstracting the Deployment listing used for counting
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DeploymentLister: Send + Sync {
    /// Label maps of the Deployments matching a label selector
    async fn list_labels(
        &self,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<BTreeMap<String, String>>, Error>;
}

/// Real Kubernetes client implementation
pub struct DeploymentListerImpl {
    client: Client,
}

impl DeploymentListerImpl {
    /// Create a new DeploymentListerImpl wrapping the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DeploymentLister for DeploymentListerImpl {
    async fn list_labels(
        &self,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<BTreeMap<String, String>>, Error> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let list = api.list(&ListParams::default().labels(selector)).await?;
        Ok(list
            .items
            .into_iter()
            .map(|d| d.metadata.labels.unwrap_or_default())
            .collect())
    }
}

/// Trait abstracting the analysis status store
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AnalysisStatusStore: Send + Sync {
    /// Internal analysis id for a job tracker correlation id
    async fn analysis_id_by_external_id(&self, external_id: &str) -> Result<String, Error>;

    /// Current status of an analysis
    async fn analysis_status(&self, analysis_id: &str) -> Result<String, Error>;
}

const ANALYSIS_ID_BY_EXTERNAL_ID_SQL: &str = r#"
    SELECT job_id::text FROM job_steps
    WHERE external_id = $1
"#;

const ANALYSIS_STATUS_SQL: &str = r#"
    SELECT status FROM jobs
    WHERE id = $1::uuid
"#;

/// Postgres implementation
#[derive(Clone)]
pub struct PgAnalysisStatusStore {
    pool: PgPool,
}

impl PgAnalysisStatusStore {
    /// Create a store over a pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AnalysisStatusStore for PgAnalysisStatusStore {
    async fn analysis_id_by_external_id(&self, external_id: &str) -> Result<String, Error> {
        let id = sqlx::query_scalar::<_, String>(ANALYSIS_ID_BY_EXTERNAL_ID_SQL)
            .bind(external_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(id)
    }

    async fn analysis_status(&self, analysis_id: &str) -> Result<String, Error> {
        let status = sqlx::query_scalar::<_, String>(ANALYSIS_STATUS_SQL)
            .bind(analysis_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(status)
    }
}

/// Why a Deployment was or was not counted
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CountDecision {
    /// No correlation label; counted
    NoExternalId,
    /// The status store could not resolve it; counted
    LookupFailed,
    /// Finished or finishing; not counted
    Terminal(String),
    /// Any other status; counted
    Active(String),
}

impl CountDecision {
    /// Whether the Deployment counts against the limit
    pub fn counts(&self) -> bool {
        !matches!(self, Self::Terminal(_))
    }
}

/// A user's Deployments that count against their limit
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunningJobs {
    invocations: BTreeSet<String>,
    unlabeled: usize,
}

impl RunningJobs {
    /// Number of counted Deployments
    pub fn count(&self) -> usize {
        self.invocations.len() + self.unlabeled
    }

    /// Whether the Deployment for `invocation` was counted
    pub fn contains(&self, invocation: &str) -> bool {
        self.invocations.contains(invocation)
    }

    fn record(&mut self, labels: &BTreeMap<String, String>) {
        match labels.get(LABEL_APP) {
            Some(app) => {
                self.invocations.insert(app.clone());
            }
            None => self.unlabeled += 1,
        }
    }

    #[cfg(test)]
    pub(crate) fn from_invocations<'a>(invocations: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            invocations: invocations.into_iter().map(str::to_string).collect(),
            unlabeled: 0,
        }
    }
}

/// Counts a user's running VICE jobs
#[derive(Clone)]
pub struct RunningJobCounter {
    lister: Arc<dyn DeploymentLister>,
    statuses: Arc<dyn AnalysisStatusStore>,
    namespace: String,
}

impl RunningJobCounter {
    /// Create a counter for one namespace
    pub fn new(
        lister: Arc<dyn DeploymentLister>,
        statuses: Arc<dyn AnalysisStatusStore>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            lister,
            statuses,
            namespace: namespace.into(),
        }
    }

    /// Decide whether one Deployment counts, from its labels
    pub async fn classify(&self, labels: &BTreeMap<String, String>) -> CountDecision {
        let Some(external_id) = labels.get(LABEL_EXTERNAL_ID) else {
            return CountDecision::NoExternalId;
        };

        let analysis_id = match self.statuses.analysis_id_by_external_id(external_id).await {
            Ok(id) => id,
            Err(e) => {
                warn!(external_id = %external_id, error = %e, "failed to resolve analysis id");
                return CountDecision::LookupFailed;
            }
        };

        let status = match self.statuses.analysis_status(&analysis_id).await {
            Ok(status) => status,
            Err(e) => {
                warn!(analysis_id = %analysis_id, error = %e, "failed to get analysis status");
                return CountDecision::LookupFailed;
            }
        };

        if status_counts(&status) {
            CountDecision::Active(status)
        } else {
            CountDecision::Terminal(status)
        }
    }

    /// The user's Deployments that count against their limit
    ///
    /// Deployments are classified concurrently.
    pub async fn running(&self, username: &str) -> Result<RunningJobs, Error> {
        let selector = username_selector(username);
        let deployments = self.lister.list_labels(&self.namespace, &selector).await?;

        let decisions = join_all(deployments.iter().map(|labels| self.classify(labels))).await;

        let mut running = RunningJobs::default();
        for (labels, decision) in deployments.iter().zip(decisions) {
            debug!(
                app = labels.get(LABEL_APP).map(String::as_str).unwrap_or_default(),
                ?decision,
                "classified deployment"
            );
            if decision.counts() {
                running.record(labels);
            }
        }
        Ok(running)
    }
}
