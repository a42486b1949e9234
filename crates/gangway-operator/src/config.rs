//! Command-line and environment configuration

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use gangway_common::retry::RetryConfig;
use gangway_common::telemetry::LogFormat;
use gangway_common::{
    DEFAULT_SCHEDULER_NAME, GROUP_NAME_ANNOTATION, NATIVE_JOB_GROUP, NATIVE_JOB_KIND,
};
use gangway_podgroup::{NativeJobKind, ReconcilerConfig};
use gangway_queue::QueueControllerConfig;

/// Gangway - gang-scheduling control plane for Volcano PodGroups and Queues
#[derive(Parser, Debug, Clone)]
#[command(name = "gangway", version, about, long_about = None)]
pub struct Cli {
    /// Print the PodGroup and Queue CRD manifests and exit
    #[arg(long)]
    pub crd: bool,

    /// Kubeconfig path; in-cluster or default config when unset
    #[arg(long, env = "GANGWAY_KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Only pods with this spec.schedulerName are watched
    #[arg(long, env = "GANGWAY_SCHEDULER_NAME", default_value = DEFAULT_SCHEDULER_NAME)]
    pub scheduler_name: String,

    /// API group of the job kind that cleans up its own PodGroups
    #[arg(long, env = "GANGWAY_NATIVE_JOB_GROUP", default_value = NATIVE_JOB_GROUP)]
    pub native_job_group: String,

    /// Kind of the job that cleans up its own PodGroups
    #[arg(long, env = "GANGWAY_NATIVE_JOB_KIND", default_value = NATIVE_JOB_KIND)]
    pub native_job_kind: String,

    /// Pod annotation naming the PodGroup
    #[arg(long, env = "GANGWAY_GROUP_NAME_ANNOTATION", default_value = GROUP_NAME_ANNOTATION)]
    pub group_name_annotation: String,

    /// Deadline in seconds for each cluster-API call made by the reconciler
    #[arg(
        long,
        env = "GANGWAY_API_TIMEOUT_SECS",
        default_value_t = 10,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub api_timeout_secs: u64,

    /// Attempts per PodGroup check before giving up; 0 retries until shutdown
    #[arg(long, env = "GANGWAY_MAX_RETRIES", default_value_t = 5)]
    pub max_retries: u32,

    /// Seconds between queue allocation recomputations
    #[arg(
        long,
        env = "GANGWAY_QUEUE_RESYNC_SECS",
        default_value_t = 30,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub queue_resync_secs: u64,

    /// Skip the startup check of existing PodGroups
    #[arg(long, env = "GANGWAY_SKIP_STARTUP_SWEEP")]
    pub skip_startup_sweep: bool,

    /// Log output format: text or json
    #[arg(long, env = "GANGWAY_LOG_FORMAT", default_value = "text")]
    pub log_format: LogFormat,
}

impl Cli {
    /// Settings for the PodGroup reconciler
    pub fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            api_timeout: Duration::from_secs(self.api_timeout_secs),
            group_name_annotation: self.group_name_annotation.clone(),
            native_job: NativeJobKind {
                group: self.native_job_group.clone(),
                kind: self.native_job_kind.clone(),
            },
        }
    }

    /// Settings for the Queue status controller
    pub fn queue_config(&self) -> QueueControllerConfig {
        QueueControllerConfig {
            resync: Duration::from_secs(self.queue_resync_secs),
            scheduler_name: self.scheduler_name.clone(),
            group_name_annotation: self.group_name_annotation.clone(),
        }
    }

    /// Retry budget for the startup sweep and pod deletions.
    ///
    /// `max_retries = 0` keeps retrying until the error stops being
    /// retryable or shutdown cancels it.
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::with_max_attempts(self.max_retries)
    }
}
