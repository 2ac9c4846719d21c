use std::panic;
use std::process::ExitCode;

use job_reconciler::app;
use job_reconciler::error::eprint_span_trace;
use tracing::error;
use tracing_error::ErrorLayer;
use tracing_error::SpanTrace;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::SubscriberInitExt;

/// Logs go to stderr; stdout carries the plan and apply results.
fn init_tracing() {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_default_env());

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(ErrorLayer::default())
        .init();

    panic::set_hook(Box::new(|info| {
        error!("{}", info);
        eprintln!("\n{}\n", color_spantrace::colorize(&SpanTrace::capture()));
    }));
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    if let Err(e) = app().await {
        error!("{e}");
        eprint_span_trace(&e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
