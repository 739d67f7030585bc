//! Command-line and environment configuration

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use exposer_admission::quota::QUOTA_OVERAGES_SUBJECT;
use exposer_common::telemetry::LogFormat;
use exposer_workload::config::DEFAULT_PATH_LIST_IDENTIFIER;
use exposer_workload::{PathListIdentifier, StagerImage};

/// VICE app exposer: admits and provisions interactive analyses
#[derive(Parser, Debug, Clone)]
#[command(name = "app-exposer", version, about, long_about = None)]
pub struct Config {
    /// Address the HTTP server binds to
    #[arg(long, env = "EXPOSER_LISTEN", default_value = "0.0.0.0:60000")]
    pub listen: SocketAddr,

    /// Namespace VICE workloads run in
    #[arg(long, env = "VICE_NAMESPACE", default_value = exposer_common::DEFAULT_VICE_NAMESPACE)]
    pub namespace: String,

    /// Data mover image used by the stager containers
    #[arg(long, env = "PORKLOCK_IMAGE", default_value = "discoenv/porklock")]
    pub porklock_image: String,

    /// Data mover image tag
    #[arg(long, env = "PORKLOCK_TAG", default_value = "latest")]
    pub porklock_tag: String,

    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Maximum Postgres connections
    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value = "10")]
    pub database_max_connections: u32,

    /// NATS server URL
    #[arg(long, env = "NATS_URL", default_value = "nats://localhost:4222")]
    pub nats_url: String,

    /// NATS subject the quota service answers overage requests on
    #[arg(long, env = "QUOTA_OVERAGES_SUBJECT", default_value = QUOTA_OVERAGES_SUBJECT)]
    pub quota_subject: String,

    /// Seconds to wait for the quota service
    #[arg(long, env = "QUOTA_TIMEOUT_SECS", default_value = "10")]
    pub quota_timeout_secs: u64,

    /// Domain suffix stripped from usernames sent to the quota service
    #[arg(long, env = "USER_DOMAIN", default_value = "")]
    pub user_domain: String,

    /// Header line of the input path list
    #[arg(long, env = "PATH_LIST_IDENTIFIER", default_value = DEFAULT_PATH_LIST_IDENTIFIER)]
    pub path_list_identifier: String,

    /// Log output format: json or pretty
    #[arg(long, env = "LOG_FORMAT", default_value = "json")]
    pub log_format: LogFormat,
}

impl Config {
    /// Quota request timeout
    pub fn quota_timeout(&self) -> Duration {
        Duration::from_secs(self.quota_timeout_secs)
    }

    /// Stager image settings
    pub fn stager_image(&self) -> StagerImage {
        StagerImage {
            name: self.porklock_image.clone(),
            tag: self.porklock_tag.clone(),
        }
    }

    /// Input path list header
    pub fn path_list_identifier(&self) -> PathListIdentifier {
        PathListIdentifier::new(self.path_list_identifier.clone())
    }
}
