//! Job descriptor consumed by the exposer
//!
//! The descriptor is produced upstream (by the apps service) and is treated
//! as already validated. Only the derivations the workload compiler and
//! admission controller need live here.

use serde::{Deserialize, Serialize};

/// Execution target tag for interactive (VICE) analyses
pub const INTERACTIVE_EXECUTION_TARGET: &str = "interapps";

/// Working directory used when a step's container does not declare one
pub const DEFAULT_WORKING_DIRECTORY: &str = "/de-app-work";

/// Image tag used when a step's container image has no tag
pub const DEFAULT_IMAGE_TAG: &str = "latest";

/// A submitted analysis
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Job {
    /// Invocation id; primary key of every derived object
    #[serde(rename = "uuid")]
    pub invocation_id: String,
    /// App id
    #[serde(default)]
    pub app_id: String,
    /// App name
    #[serde(default)]
    pub app_name: String,
    /// Fully qualified username of the submitter
    #[serde(rename = "username")]
    pub submitter: String,
    /// Internal user id of the submitter
    #[serde(default)]
    pub user_id: String,
    /// Where the job runs (`interapps` for VICE)
    #[serde(default)]
    pub execution_target: String,
    /// Job type as reported to the user
    #[serde(rename = "type", default)]
    pub job_type: String,
    /// Destination for outputs
    #[serde(default)]
    pub output_dir: String,
    /// Ordered steps; only the first is compiled
    #[serde(default)]
    pub steps: Vec<Step>,
    /// Metadata attached to uploaded outputs
    #[serde(rename = "file-metadata", default)]
    pub file_metadata: Vec<FileMetadata>,
    /// Correlation id assigned by the job tracker, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
}

/// One step of a job
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Step {
    /// Tool that runs the step
    pub component: StepComponent,
    /// Parameters, inputs and outputs
    #[serde(default)]
    pub config: StepConfig,
}

/// Tool description for a step
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct StepComponent {
    /// Tool name
    #[serde(default)]
    pub name: String,
    /// Container the tool runs in
    pub container: ContainerDescriptor,
}

/// Container settings declared by a tool
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ContainerDescriptor {
    /// Image reference
    pub image: ContainerImage,
    /// Entry point override; empty means the image default
    #[serde(rename = "entrypoint", default)]
    pub entry_point: String,
    /// Working directory inside the container
    #[serde(rename = "working_directory", default)]
    pub working_dir: String,
    /// UID the container runs as
    #[serde(default)]
    pub uid: i64,
    /// Ports the tool listens on
    #[serde(rename = "container_ports", default)]
    pub ports: Vec<PortDescriptor>,
}

impl ContainerDescriptor {
    /// Working directory, falling back to [`DEFAULT_WORKING_DIRECTORY`]
    pub fn working_directory(&self) -> &str {
        if self.working_dir.is_empty() {
            DEFAULT_WORKING_DIRECTORY
        } else {
            &self.working_dir
        }
    }
}

/// Container image name and tag
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ContainerImage {
    /// Repository name
    #[serde(default)]
    pub name: String,
    /// Tag
    #[serde(default)]
    pub tag: String,
}

impl ContainerImage {
    /// `name:tag` reference
    pub fn reference(&self) -> String {
        let tag = if self.tag.is_empty() {
            DEFAULT_IMAGE_TAG
        } else {
            &self.tag
        };
        format!("{}:{}", self.name, tag)
    }
}

/// A port a tool declares
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PortDescriptor {
    /// Port inside the container
    pub container_port: u16,
    /// Host port (unused by VICE)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_port: Option<u16>,
    /// Whether to bind to the host (unused by VICE)
    #[serde(default)]
    pub bind_to_host: bool,
}

/// Parameters, inputs and outputs of a step
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct StepConfig {
    /// Command-line parameters
    #[serde(default)]
    pub params: Vec<StepParam>,
    /// Input files
    #[serde(default)]
    pub input: Vec<StepInput>,
    /// Output files
    #[serde(default)]
    pub output: Vec<StepOutput>,
}

/// A single command-line parameter
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct StepParam {
    /// Flag name, possibly empty for positional values
    #[serde(default)]
    pub name: String,
    /// Value, possibly empty for bare flags
    #[serde(default)]
    pub value: String,
    /// Position on the command line
    #[serde(default)]
    pub order: i32,
}

/// An input file reference
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct StepInput {
    /// Path in the data store
    #[serde(default)]
    pub value: String,
    /// Keep the file in the output folder after the analysis
    #[serde(default)]
    pub retain: bool,
    /// Access ticket letting the stager fetch by reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket: Option<String>,
    /// `single`, `many` or `collection`
    #[serde(default)]
    pub multiplicity: String,
}

impl StepInput {
    /// Whether the input carries a usable ticket
    pub fn has_ticket(&self) -> bool {
        self.ticket.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Last path component of the input path
    pub fn base_name(&self) -> &str {
        base_name(&self.value)
    }
}

/// An output file reference
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct StepOutput {
    /// Output file or directory name
    #[serde(default)]
    pub name: String,
    /// Keep the file after upload
    #[serde(default)]
    pub retain: bool,
    /// `single`, `many` or `collection`
    #[serde(default)]
    pub multiplicity: String,
}

/// An AVU attached to uploaded outputs
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct FileMetadata {
    /// Attribute
    pub attr: String,
    /// Value
    pub value: String,
    /// Unit
    #[serde(default)]
    pub unit: String,
}

impl Step {
    /// Command-line arguments ordered by parameter position
    ///
    /// Each parameter contributes its name (if any) followed by its value
    /// (if any).
    pub fn arguments(&self) -> Vec<String> {
        let mut params: Vec<&StepParam> = self.config.params.iter().collect();
        params.sort_by_key(|p| p.order);

        let mut args = Vec::with_capacity(params.len() * 2);
        for param in params {
            if !param.name.is_empty() {
                args.push(param.name.clone());
            }
            if !param.value.is_empty() {
                args.push(param.value.clone());
            }
        }
        args
    }
}

impl Job {
    /// Whether the job targets the interactive runtime
    pub fn is_interactive(&self) -> bool {
        self.execution_target
            .eq_ignore_ascii_case(INTERACTIVE_EXECUTION_TARGET)
    }

    /// The step that gets compiled into the workload
    pub fn first_step(&self) -> Option<&Step> {
        self.steps.first()
    }

    /// All inputs across all steps
    pub fn inputs(&self) -> impl Iterator<Item = &StepInput> {
        self.steps.iter().flat_map(|s| s.config.input.iter())
    }

    /// All outputs across all steps
    pub fn outputs(&self) -> impl Iterator<Item = &StepOutput> {
        self.steps.iter().flat_map(|s| s.config.output.iter())
    }

    /// Inputs the input stager must fetch by explicit path
    pub fn inputs_without_tickets(&self) -> Vec<&StepInput> {
        self.inputs().filter(|i| !i.has_ticket()).collect()
    }

    /// Whether any input lacks a ticket
    pub fn has_ticketless_inputs(&self) -> bool {
        self.inputs().any(|i| !i.has_ticket())
    }

    /// `-m attr,value,unit` flags for every metadata entry
    pub fn metadata_arguments(&self) -> Vec<String> {
        self.file_metadata
            .iter()
            .flat_map(|m| {
                [
                    "-m".to_string(),
                    format!("{},{},{}", m.attr, m.value, m.unit),
                ]
            })
            .collect()
    }

    /// Data-movement arguments for downloading the listed inputs
    pub fn input_source_list_arguments(&self, source_list_path: &str) -> Vec<String> {
        let mut args = vec![
            "get".to_string(),
            "--user".to_string(),
            self.submitter.clone(),
            "--source-list".to_string(),
            source_list_path.to_string(),
        ];
        args.extend(self.metadata_arguments());
        args
    }

    /// Data-movement arguments for uploading outputs
    pub fn final_output_arguments(&self, excludes_path: &str) -> Vec<String> {
        let mut args = vec![
            "put".to_string(),
            "--user".to_string(),
            self.submitter.clone(),
            "--destination".to_string(),
            self.output_dir.clone(),
        ];
        args.extend(self.metadata_arguments());
        args.push("--exclude".to_string());
        args.push(excludes_path.to_string());
        args
    }
}

/// Last non-empty `/`-separated component of a path
pub fn base_name(path: &str) -> &str {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
}
