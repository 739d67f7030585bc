//! Container builders for the three pod roles
//!
//! Stagers listen on a fixed port and pipe each accepted connection into
//! the data-movement tool, which moves files between the data store and
//! the shared workspace. The analysis container only sees the workspace.

use exposer_common::job::{Job, Step};

use crate::k8s::{Capabilities, Container, ContainerPort, SecurityContext, VolumeMount};
use crate::layout::{
    analysis_port_name, excludes_file_path, input_path_list_file_path, ANALYSIS_CONTAINER_NAME,
    ANALYSIS_DROPPED_CAPABILITIES, CONNECTION_CONFIG_PATH, CREDENTIALS_MOUNT_PATH,
    CREDENTIALS_VOLUME_NAME, DATA_MOVER_COMMAND, EXCLUDES_MOUNT_PATH, EXCLUDES_VOLUME_NAME,
    INPUT_PATH_LIST_MOUNT_PATH, INPUT_PATH_LIST_VOLUME_NAME, INPUT_STAGER_CONTAINER_NAME,
    INPUT_STAGER_PORT, INPUT_STAGER_PORT_NAME, OUTPUT_STAGER_CONTAINER_NAME, OUTPUT_STAGER_PORT,
    OUTPUT_STAGER_PORT_NAME, STAGER_DROPPED_CAPABILITIES, WORKSPACE_VOLUME_NAME,
};

/// Default stager image repository
pub const DEFAULT_STAGER_IMAGE: &str = "discoenv/porklock";
/// Default stager image tag
pub const DEFAULT_STAGER_TAG: &str = "latest";

/// Image the stager containers run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StagerImage {
    /// Repository
    pub name: String,
    /// Tag
    pub tag: String,
}

impl Default for StagerImage {
    fn default() -> Self {
        Self {
            name: DEFAULT_STAGER_IMAGE.to_string(),
            tag: DEFAULT_STAGER_TAG.to_string(),
        }
    }
}

impl StagerImage {
    /// `name:tag` reference
    pub fn reference(&self) -> String {
        format!("{}:{}", self.name, self.tag)
    }
}

fn security_context(uid: i64, dropped: &[&str]) -> SecurityContext {
    SecurityContext {
        run_as_user: Some(uid),
        capabilities: Some(Capabilities {
            add: None,
            drop: Some(dropped.iter().map(|c| c.to_string()).collect()),
        }),
    }
}

/// `nc -lk -p <port> -e <tool> <args> -z <connection config>`
fn stager_command(port: u16, args: Vec<String>) -> Vec<String> {
    let mut command: Vec<String> = ["nc", "-lk", "-p"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    command.push(port.to_string());
    command.push("-e".to_string());
    command.extend(DATA_MOVER_COMMAND.iter().map(|s| s.to_string()));
    command.extend(args);
    command.push("-z".to_string());
    command.push(CONNECTION_CONFIG_PATH.to_string());
    command
}

fn workspace_mount(step: &Step) -> VolumeMount {
    VolumeMount::read_write(
        WORKSPACE_VOLUME_NAME,
        step.component.container.working_directory(),
    )
}

fn credentials_mount() -> VolumeMount {
    VolumeMount::read_only(CREDENTIALS_VOLUME_NAME, CREDENTIALS_MOUNT_PATH)
}

/// Container that downloads the job's ticket-less inputs into the workspace
pub fn input_stager(job: &Job, step: &Step, image: &StagerImage) -> Container {
    let args = job.input_source_list_arguments(&input_path_list_file_path());

    Container {
        name: INPUT_STAGER_CONTAINER_NAME.to_string(),
        image: image.reference(),
        command: Some(stager_command(INPUT_STAGER_PORT, args)),
        working_dir: Some(INPUT_PATH_LIST_MOUNT_PATH.to_string()),
        ports: vec![ContainerPort::tcp(INPUT_STAGER_PORT_NAME, INPUT_STAGER_PORT)],
        volume_mounts: vec![
            credentials_mount(),
            workspace_mount(step),
            VolumeMount::read_only(INPUT_PATH_LIST_VOLUME_NAME, INPUT_PATH_LIST_MOUNT_PATH),
        ],
        security_context: Some(security_context(
            step.component.container.uid,
            STAGER_DROPPED_CAPABILITIES,
        )),
    }
}

/// Entry point followed by the step's arguments; `None` when both are empty
pub fn analysis_command(step: &Step) -> Option<Vec<String>> {
    let mut command = Vec::new();
    let entry_point = &step.component.container.entry_point;
    if !entry_point.is_empty() {
        command.push(entry_point.clone());
    }
    command.extend(step.arguments());

    if command.is_empty() {
        None
    } else {
        Some(command)
    }
}

/// Container running the user's interactive application
pub fn analysis_container(step: &Step) -> Container {
    let descriptor = &step.component.container;
    let ports = descriptor
        .ports
        .iter()
        .enumerate()
        .map(|(i, p)| ContainerPort::tcp(analysis_port_name(i), p.container_port))
        .collect();

    Container {
        name: ANALYSIS_CONTAINER_NAME.to_string(),
        image: descriptor.image.reference(),
        command: analysis_command(step),
        working_dir: Some(descriptor.working_directory().to_string()),
        ports,
        volume_mounts: vec![workspace_mount(step)],
        security_context: Some(security_context(
            descriptor.uid,
            ANALYSIS_DROPPED_CAPABILITIES,
        )),
    }
}

/// Container that uploads the workspace to the job's output directory
pub fn output_stager(job: &Job, step: &Step, image: &StagerImage) -> Container {
    let args = job.final_output_arguments(&excludes_file_path());

    Container {
        name: OUTPUT_STAGER_CONTAINER_NAME.to_string(),
        image: image.reference(),
        command: Some(stager_command(OUTPUT_STAGER_PORT, args)),
        working_dir: None,
        ports: vec![ContainerPort::tcp(
            OUTPUT_STAGER_PORT_NAME,
            OUTPUT_STAGER_PORT,
        )],
        volume_mounts: vec![
            credentials_mount(),
            workspace_mount(step),
            VolumeMount::read_only(EXCLUDES_VOLUME_NAME, EXCLUDES_MOUNT_PATH),
        ],
        security_context: Some(security_context(
            step.component.container.uid,
            STAGER_DROPPED_CAPABILITIES,
        )),
    }
}
