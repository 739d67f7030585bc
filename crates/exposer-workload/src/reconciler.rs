//! Upsert of compiled workloads against the API server
//!
//! Objects are applied strictly in order: excludes ConfigMap, input path
//! list ConfigMap, Deployment, Service. ConfigMaps and the Deployment are
//! created when absent and fully replaced when present. The Service is
//! only created; an existing one is left alone. The first failure stops
//! the sequence and whatever was applied stays in place.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use exposer_common::kube_utils::{is_not_found, HasApiResource, ObjectMeta};
use exposer_common::{Error, FIELD_MANAGER};
use kube::api::{Api, DynamicObject, PostParams};
use kube::core::ApiResource;
use kube::Client;
use serde::Serialize;
use tracing::{debug, info, instrument};

#[cfg(test)]
use mockall::automock;

use crate::compiler::CompiledWorkload;
use crate::error::CompilationError;
use crate::k8s::{ConfigMap, Deployment, Service};

/// Kinds of object the reconciler manages
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ObjectKind {
    /// v1 ConfigMap
    ConfigMap,
    /// apps/v1 Deployment
    Deployment,
    /// v1 Service
    Service,
}

impl ObjectKind {
    /// API resource used to address this kind
    pub fn api_resource(self) -> ApiResource {
        match self {
            Self::ConfigMap => ConfigMap::api_resource(),
            Self::Deployment => Deployment::api_resource(),
            Self::Service => Service::api_resource(),
        }
    }

    /// Kind string
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConfigMap => ConfigMap::KIND,
            Self::Deployment => Deployment::KIND,
            Self::Service => Service::KIND,
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What is known about an object that already exists
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExistingObject {
    /// Resource version to carry into a replace
    pub resource_version: Option<String>,
}

/// Trait abstracting the object API calls the reconciler needs
#[cfg_attr(test, automock)]
#[async_trait]
pub trait WorkloadKubeClient: Send + Sync {
    /// Look up an object by name; `None` when it does not exist
    async fn lookup(
        &self,
        kind: ObjectKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ExistingObject>, Error>;

    /// Create an object from its serialized form
    async fn create(
        &self,
        kind: ObjectKind,
        namespace: &str,
        object: &serde_json::Value,
    ) -> Result<(), Error>;

    /// Fully replace an existing object
    async fn replace(
        &self,
        kind: ObjectKind,
        namespace: &str,
        name: &str,
        object: &serde_json::Value,
    ) -> Result<(), Error>;
}

/// Real Kubernetes client implementation
pub struct WorkloadKubeClientImpl {
    client: Client,
}

impl WorkloadKubeClientImpl {
    /// Create a new WorkloadKubeClientImpl wrapping the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, kind: ObjectKind, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &kind.api_resource())
    }

    fn post_params() -> PostParams {
        PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl WorkloadKubeClient for WorkloadKubeClientImpl {
    async fn lookup(
        &self,
        kind: ObjectKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ExistingObject>, Error> {
        match self.api(kind, namespace).get(name).await {
            Ok(obj) => Ok(Some(ExistingObject {
                resource_version: obj.metadata.resource_version,
            })),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn create(
        &self,
        kind: ObjectKind,
        namespace: &str,
        object: &serde_json::Value,
    ) -> Result<(), Error> {
        let obj: DynamicObject = serde_json::from_value(object.clone())?;
        self.api(kind, namespace)
            .create(&Self::post_params(), &obj)
            .await?;
        Ok(())
    }

    async fn replace(
        &self,
        kind: ObjectKind,
        namespace: &str,
        name: &str,
        object: &serde_json::Value,
    ) -> Result<(), Error> {
        let obj: DynamicObject = serde_json::from_value(object.clone())?;
        self.api(kind, namespace)
            .replace(name, &Self::post_params(), &obj)
            .await?;
        Ok(())
    }
}

/// Result of applying one object
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Object did not exist and was created
    Created,
    /// Object existed and was replaced
    Updated,
    /// Object existed and was left as is
    Unchanged,
}

impl ApplyOutcome {
    fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
        }
    }
}

/// One applied object
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppliedObject {
    /// Kind
    pub kind: ObjectKind,
    /// Name
    pub name: String,
    /// What happened
    pub outcome: ApplyOutcome,
}

/// Objects applied by one reconcile, in order
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Applied objects
    pub applied: Vec<AppliedObject>,
}

impl ReconcileReport {
    /// Outcome for a named object
    pub fn outcome(&self, kind: ObjectKind, name: &str) -> Option<ApplyOutcome> {
        self.applied
            .iter()
            .find(|a| a.kind == kind && a.name == name)
            .map(|a| a.outcome)
    }
}

/// Whether an existing object gets replaced
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ExistingPolicy {
    Replace,
    Keep,
}

/// Applies compiled workloads through a [`WorkloadKubeClient`]
#[derive(Clone)]
pub struct Reconciler {
    client: Arc<dyn WorkloadKubeClient>,
}

impl Reconciler {
    /// Create a reconciler
    pub fn new(client: Arc<dyn WorkloadKubeClient>) -> Self {
        Self { client }
    }

    /// Apply every object of a compiled workload
    #[instrument(skip(self, workload), fields(invocation = %workload.deployment.metadata.name))]
    pub async fn reconcile(&self, workload: &CompiledWorkload) -> Result<ReconcileReport, Error> {
        let mut report = ReconcileReport::default();

        for config_map in workload.config_maps() {
            let applied = self
                .upsert(
                    ObjectKind::ConfigMap,
                    &config_map.metadata,
                    config_map,
                    ExistingPolicy::Replace,
                )
                .await?;
            report.applied.push(applied);
        }

        let deployment = &workload.deployment;
        let applied = self
            .upsert(
                ObjectKind::Deployment,
                &deployment.metadata,
                deployment,
                ExistingPolicy::Replace,
            )
            .await?;
        report.applied.push(applied);

        let service = &workload.service;
        let applied = self
            .upsert(
                ObjectKind::Service,
                &service.metadata,
                service,
                ExistingPolicy::Keep,
            )
            .await?;
        report.applied.push(applied);

        info!(objects = report.applied.len(), "workload reconciled");
        Ok(report)
    }

    async fn upsert<T: Serialize>(
        &self,
        kind: ObjectKind,
        meta: &ObjectMeta,
        object: &T,
        policy: ExistingPolicy,
    ) -> Result<AppliedObject, Error> {
        let existing = self
            .client
            .lookup(kind, &meta.namespace, &meta.name)
            .await?;

        let outcome = match (existing, policy) {
            (None, _) => {
                let value = to_value(kind, object)?;
                self.client.create(kind, &meta.namespace, &value).await?;
                ApplyOutcome::Created
            }
            (Some(existing), ExistingPolicy::Replace) => {
                let mut value = to_value(kind, object)?;
                if let Some(rv) = existing.resource_version {
                    set_resource_version(&mut value, rv);
                }
                self.client
                    .replace(kind, &meta.namespace, &meta.name, &value)
                    .await?;
                ApplyOutcome::Updated
            }
            (Some(_), ExistingPolicy::Keep) => ApplyOutcome::Unchanged,
        };

        debug!(%kind, name = %meta.name, outcome = outcome.as_str(), "applied object");
        Ok(AppliedObject {
            kind,
            name: meta.name.clone(),
            outcome,
        })
    }
}

fn to_value<T: Serialize>(kind: ObjectKind, object: &T) -> Result<serde_json::Value, Error> {
    serde_json::to_value(object)
        .map_err(|source| CompilationError::Serialization {
            kind: kind.as_str(),
            source,
        })
        .map_err(Error::from)
}

fn set_resource_version(value: &mut serde_json::Value, resource_version: String) {
    if let Some(meta) = value
        .get_mut("metadata")
        .and_then(serde_json::Value::as_object_mut)
    {
        meta.insert(
            "resourceVersion".to_string(),
            serde_json::Value::String(resource_version),
        );
    }
}
