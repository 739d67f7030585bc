//! Job to Kubernetes object compilation

use exposer_common::labels::WorkloadLabels;
use exposer_common::{Job, DEFAULT_VICE_NAMESPACE};
use tracing::debug;

use crate::config::{excludes_config_map, input_path_list_config_map, PathListIdentifier};
use crate::containers::StagerImage;
use crate::deployment::{build_deployment, StagingTopology};
use crate::error::CompilationError;
use crate::k8s::{ConfigMap, Deployment, Service};
use crate::service::build_service;

/// Every object compiled for one job
#[derive(Clone, Debug, PartialEq)]
pub struct CompiledWorkload {
    /// Which staging containers the pod carries
    pub topology: StagingTopology,
    /// Excludes list, always present
    pub excludes: ConfigMap,
    /// Input path list, present with [`StagingTopology::WithInputStager`]
    pub input_path_list: Option<ConfigMap>,
    /// The pod owner
    pub deployment: Deployment,
    /// Network exposure
    pub service: Service,
}

impl CompiledWorkload {
    /// ConfigMaps in the order they must be applied
    pub fn config_maps(&self) -> impl Iterator<Item = &ConfigMap> {
        std::iter::once(&self.excludes).chain(self.input_path_list.iter())
    }
}

/// Compiles jobs into VICE workloads for one namespace
#[derive(Clone, Debug)]
pub struct WorkloadCompiler {
    namespace: String,
    stager: StagerImage,
    identifier: PathListIdentifier,
}

impl Default for WorkloadCompiler {
    fn default() -> Self {
        Self::new(
            DEFAULT_VICE_NAMESPACE,
            StagerImage::default(),
            PathListIdentifier::default(),
        )
    }
}

impl WorkloadCompiler {
    /// Create a compiler
    pub fn new(
        namespace: impl Into<String>,
        stager: StagerImage,
        identifier: PathListIdentifier,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            stager,
            identifier,
        }
    }

    /// Namespace compiled objects land in
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Compile a job
    ///
    /// Pure: the same job always yields the same objects.
    pub fn compile(&self, job: &Job) -> Result<CompiledWorkload, CompilationError> {
        let labels = WorkloadLabels::for_job(job);

        let deployment = build_deployment(job, &self.namespace, &labels, &self.stager)?;
        let excludes = excludes_config_map(job, &self.namespace, &labels);
        let input_path_list =
            input_path_list_config_map(job, &self.namespace, &labels, &self.identifier)?;
        let service = build_service(job, &self.namespace, &labels, &deployment);
        let topology = StagingTopology::for_job(job);

        debug!(
            invocation = %job.invocation_id,
            ?topology,
            containers = deployment.spec.template.spec.containers.len(),
            service_ports = service.spec.ports.len(),
            "compiled workload"
        );

        Ok(CompiledWorkload {
            topology,
            excludes,
            input_path_list,
            deployment,
            service,
        })
    }
}
