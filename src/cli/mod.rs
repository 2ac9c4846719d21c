use clap::Parser;
use clap::Subcommand;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[clap(version, about = "Declarative reconciler for a self-expiring Kubernetes Job")]
pub(crate) struct Cli {
    #[clap(subcommand)]
    pub(crate) command: Command,

    /// YAML file with polling and timeout settings. Defaults apply when omitted.
    #[clap(short, long, global = true)]
    pub(crate) config: Option<PathBuf>,
}

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct StateArgs {
    /// Recorded state of the managed Job.
    #[clap(short, long, default_value = "job-state.yaml")]
    pub(crate) state: PathBuf,
}

#[derive(Debug, Clone, Subcommand)]
pub(crate) enum Command {
    /// Show what `apply` would do.
    Plan {
        #[clap(flatten)]
        state: StateArgs,

        #[clap(short, long)]
        manifest: PathBuf,
    },

    /// Create, update or replace the Job so it matches the manifest.
    Apply {
        #[clap(flatten)]
        state: StateArgs,

        #[clap(short, long)]
        manifest: PathBuf,
    },

    /// Update the recorded state from the cluster.
    Refresh {
        #[clap(flatten)]
        state: StateArgs,
    },

    /// Delete the Job and forget it.
    Destroy {
        #[clap(flatten)]
        state: StateArgs,
    },

    /// Start tracking an existing Job given as `<namespace>,<name>`.
    Import {
        #[clap(flatten)]
        state: StateArgs,

        #[clap(long)]
        id: String,
    },
}
