//! Fixed names, paths and ports shared by every VICE pod

/// Analysis container name
pub const ANALYSIS_CONTAINER_NAME: &str = "analysis";
/// Input stager container name
pub const INPUT_STAGER_CONTAINER_NAME: &str = "input-files";
/// Output stager container name
pub const OUTPUT_STAGER_CONTAINER_NAME: &str = "output-files";

/// Credentials volume name
pub const CREDENTIALS_VOLUME_NAME: &str = "porklock-config";
/// Secret backing the credentials volume
pub const CREDENTIALS_SECRET_NAME: &str = "porklock-config";
/// Where the credentials volume is mounted in the stagers
pub const CREDENTIALS_MOUNT_PATH: &str = "/etc/porklock";
/// Connection config file inside the credentials volume
pub const CONNECTION_CONFIG_PATH: &str = "/etc/porklock/irods-config.properties";

/// Shared workspace volume name
pub const WORKSPACE_VOLUME_NAME: &str = "input-files";

/// Excludes volume name; also the key of the excludes ConfigMap
pub const EXCLUDES_VOLUME_NAME: &str = "excludes-file";
/// File name of the excludes list inside its volume
pub const EXCLUDES_FILE_NAME: &str = "excludes-file";
/// Where the excludes volume is mounted in the output stager
pub const EXCLUDES_MOUNT_PATH: &str = "/excludes";

/// Input path list volume name
pub const INPUT_PATH_LIST_VOLUME_NAME: &str = "input-path-list";
/// File name of the input path list inside its volume
pub const INPUT_PATH_LIST_FILE_NAME: &str = "input-path-list";
/// Where the input path list volume is mounted in the input stager
pub const INPUT_PATH_LIST_MOUNT_PATH: &str = "/input-paths";

/// Output stager port name
pub const OUTPUT_STAGER_PORT_NAME: &str = "tcp-output";
/// Output stager port
pub const OUTPUT_STAGER_PORT: u16 = 60000;
/// Input stager port name
pub const INPUT_STAGER_PORT_NAME: &str = "tcp-input";
/// Input stager port
pub const INPUT_STAGER_PORT: u16 = 60001;

/// Prefix of synthesized analysis port names
pub const ANALYSIS_PORT_PREFIX: &str = "tcp-a-";

/// Data-movement tool invocation inside the stager image
pub const DATA_MOVER_COMMAND: &[&str] = &[
    "porklock",
    "-jar",
    "/usr/src/app/porklock-standalone.jar",
];

/// Capabilities dropped from the stager containers
pub const STAGER_DROPPED_CAPABILITIES: &[&str] = &[
    "SETPCAP",
    "AUDIT_WRITE",
    "KILL",
    "SETGID",
    "SETUID",
    "NET_BIND_SERVICE",
    "SYS_CHROOT",
    "SETFCAP",
    "FSETID",
    "NET_RAW",
    "MKNOD",
];

/// Capabilities dropped from the analysis container
///
/// Same as the stager list minus `NET_BIND_SERVICE` and `NET_RAW`.
pub const ANALYSIS_DROPPED_CAPABILITIES: &[&str] = &[
    "SETPCAP",
    "AUDIT_WRITE",
    "KILL",
    "SETGID",
    "SETUID",
    "SYS_CHROOT",
    "SETFCAP",
    "FSETID",
    "MKNOD",
];

/// Path of the excludes list as seen by the output stager
pub fn excludes_file_path() -> String {
    format!("{}/{}", EXCLUDES_MOUNT_PATH, EXCLUDES_FILE_NAME)
}

/// Path of the input path list as seen by the input stager
pub fn input_path_list_file_path() -> String {
    format!("{}/{}", INPUT_PATH_LIST_MOUNT_PATH, INPUT_PATH_LIST_FILE_NAME)
}

/// Name of the `index`th analysis port
pub fn analysis_port_name(index: usize) -> String {
    format!("{}{}", ANALYSIS_PORT_PREFIX, index)
}
