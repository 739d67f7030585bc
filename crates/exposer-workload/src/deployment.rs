//! Pod topology and Deployment assembly

use exposer_common::job::{Job, Step};
use exposer_common::kube_utils::HasApiResource;
use exposer_common::labels::{
    excludes_config_map_name, input_path_list_config_map_name, workload_name, WorkloadLabels,
};

use crate::containers::{analysis_container, input_stager, output_stager, StagerImage};
use crate::error::CompilationError;
use crate::k8s::{
    Container, Deployment, DeploymentSpec, LabelSelector, ObjectMeta, PodMeta, PodSpec,
    PodTemplateSpec, Volume,
};
use crate::layout::{
    CREDENTIALS_SECRET_NAME, CREDENTIALS_VOLUME_NAME, EXCLUDES_VOLUME_NAME,
    INPUT_PATH_LIST_VOLUME_NAME, WORKSPACE_VOLUME_NAME,
};

/// Pod restart policy for interactive sessions
pub const RESTART_POLICY: &str = "Always";

/// Which staging containers a pod carries
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StagingTopology {
    /// Some inputs need an explicit path list: input stager and its volume
    WithInputStager,
    /// Every input is fetched by ticket, or there are none
    OutputOnly,
}

impl StagingTopology {
    /// Topology for a job
    pub fn for_job(job: &Job) -> Self {
        Self::from_ticketless_inputs(job.has_ticketless_inputs())
    }

    /// Topology from the single condition that selects it
    pub fn from_ticketless_inputs(has_ticketless_inputs: bool) -> Self {
        if has_ticketless_inputs {
            Self::WithInputStager
        } else {
            Self::OutputOnly
        }
    }

    /// Whether the input stager and path list volume are present
    pub fn has_input_stager(self) -> bool {
        matches!(self, Self::WithInputStager)
    }

    /// Pod volumes in fixed order
    pub fn volumes(self, job: &Job) -> Vec<Volume> {
        let mut volumes = Vec::with_capacity(4);
        if self.has_input_stager() {
            volumes.push(Volume::from_config_map(
                INPUT_PATH_LIST_VOLUME_NAME,
                input_path_list_config_map_name(job),
            ));
        }
        volumes.push(Volume::from_empty_dir(WORKSPACE_VOLUME_NAME));
        volumes.push(Volume::from_secret(
            CREDENTIALS_VOLUME_NAME,
            CREDENTIALS_SECRET_NAME,
        ));
        volumes.push(Volume::from_config_map(
            EXCLUDES_VOLUME_NAME,
            excludes_config_map_name(job),
        ));
        volumes
    }

    /// Containers in fixed order: input stager, analysis, output stager
    pub fn containers(self, job: &Job, step: &Step, stager: &StagerImage) -> Vec<Container> {
        let mut containers = Vec::with_capacity(3);
        if self.has_input_stager() {
            containers.push(input_stager(job, step, stager));
        }
        containers.push(analysis_container(step));
        containers.push(output_stager(job, step, stager));
        containers
    }
}

/// The step compiled into the pod, rejecting jobs that cannot run
pub fn compiled_step(job: &Job) -> Result<&Step, CompilationError> {
    let step = job
        .first_step()
        .ok_or_else(|| CompilationError::malformed(job.invocation_id.as_str(), "job has no steps"))?;

    if step.component.container.image.name.trim().is_empty() {
        return Err(CompilationError::malformed(
            job.invocation_id.as_str(),
            "first step has no container image",
        ));
    }
    Ok(step)
}

/// Build the single-replica Deployment for a job
pub fn build_deployment(
    job: &Job,
    namespace: &str,
    labels: &WorkloadLabels,
    stager: &StagerImage,
) -> Result<Deployment, CompilationError> {
    let step = compiled_step(job)?;
    let topology = StagingTopology::for_job(job);

    Ok(Deployment {
        api_version: Deployment::API_VERSION.to_string(),
        kind: Deployment::KIND.to_string(),
        metadata: ObjectMeta::new(workload_name(job), namespace).with_labels(labels.to_map()),
        spec: DeploymentSpec {
            replicas: 1,
            selector: LabelSelector {
                match_labels: labels.selector(),
            },
            template: PodTemplateSpec {
                metadata: PodMeta {
                    labels: labels.to_map(),
                },
                spec: PodSpec {
                    restart_policy: RESTART_POLICY.to_string(),
                    containers: topology.containers(job, step, stager),
                    volumes: topology.volumes(job),
                },
            },
        },
    })
}
