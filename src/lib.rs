use self::cli::{Cli, Command};
use self::kubernetes_objects::job_store::KubeJobStore;
use self::reconciler::Reconciler;
use self::reconciler::state::{ResourceState, StateFileError, load_manifest};
use self::resource::JobResource;
use self::retry::Shutdown;
use clap::Parser;
use thiserror::Error;
use tracing::info;
use tracing_error::ExtractSpanTrace;
use tracing_error::SpanTrace;

pub mod cli;
pub mod config;
pub mod error;
pub mod kubernetes_objects;
pub mod reconciler;
pub mod resource;
pub mod retry;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Failed to load config.\n{0}")]
    ConfigError(#[from] config::ConfigLoadError),

    #[error("Failed to initialize kubernetes client.\n{0}")]
    KubeClientError(#[from] kube::Error),

    #[error("State file error.\n{0}")]
    StateFile(#[from] StateFileError),

    #[error("Reconciliation stopped due to following error:\n{0}")]
    Resource(#[from] resource::error::ResourceError),
}

impl ExtractSpanTrace for AppError {
    fn span_trace(&self) -> Option<&SpanTrace> {
        match self {
            AppError::Resource(e) => e.span_trace(),
            _ => None,
        }
    }
}

pub async fn app() -> Result<(), AppError> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => config::Config::new_from_file(path).await?,
        None => config::Config::default(),
    };

    info!("Config Loaded.");

    let client = kube::Client::try_default().await?;

    info!("Kubernetes Client Initialized.");

    let resource = JobResource::new(config.polling, Shutdown::new());
    let reconciler = Reconciler::new(resource, KubeJobStore::new(client), config.timeouts);

    match cli.command {
        Command::Plan { state, manifest } => {
            let recorded = ResourceState::load(&state.state).await?;
            let action = reconciler.plan(&recorded, load_manifest(&manifest).await?).await?;
            println!("Plan: {action}");
        }
        Command::Apply { state, manifest } => {
            let mut recorded = ResourceState::load(&state.state).await?;
            let desired = load_manifest(&manifest).await?;
            let result = reconciler.apply(&mut recorded, desired).await;
            recorded.save(&state.state).await?;
            println!("Applied: {}", result?);
        }
        Command::Refresh { state } => {
            let mut recorded = ResourceState::load(&state.state).await?;
            reconciler.refresh(&mut recorded).await?;
            recorded.save(&state.state).await?;
            match recorded.id {
                Some(id) => println!("Job '{id}' is tracked."),
                None => println!("No job is tracked."),
            }
        }
        Command::Destroy { state } => {
            let mut recorded = ResourceState::load(&state.state).await?;
            reconciler.destroy(&mut recorded).await?;
            recorded.save(&state.state).await?;
            println!("Destroyed.");
        }
        Command::Import { state, id } => {
            let mut recorded = ResourceState::load(&state.state).await?;
            reconciler.import(&id, &mut recorded).await?;
            recorded.save(&state.state).await?;
            println!("Imported job '{id}'.");
        }
    }

    Ok(())
}
