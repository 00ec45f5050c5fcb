//! triapp — provisions and exercises three local cloud emulators in one run.
//!
//! Demos, in order:
//! - Object storage (LocalStack S3): ensure bucket, write `from-app.txt`.
//! - Blob storage (Azurite): ensure container, upload `from-app.txt`.
//! - Messaging (Pub/Sub emulator): ensure topic and subscription, publish,
//!   pull one message and acknowledge it.
//!
//! Run:
//! ```bash
//! AZURE_STORAGE_CONNECTION_STRING="UseDevelopmentStorage=true" \
//! PUBSUB_EMULATOR_HOST=localhost:8085 \
//!   cargo run -p triapp
//! ```
//!
//! Configuration: See `config.rs` for all environment variables. The process
//! exits non-zero on the first unrecoverable provider error.

mod config;

use std::process::ExitCode;

use aws_s3::S3ObjectStore;
use azure_blob::AzureBlobStore;
use domain::service::{BlobStorageDemo, DemoReport, MessagingDemo, ObjectStorageDemo};
use domain::CoreError;
use gcp_pubsub::PubSubBroker;
use runtime_bridge::BlockingRuntime;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, thiserror::Error)]
enum RunError {
    #[error("runtime init: {0}")]
    Runtime(#[from] std::io::Error),
    #[error(transparent)]
    Demo(#[from] CoreError),
}

fn main() -> ExitCode {
    // Load and validate config first (fail fast before any provider call)
    let cfg = match config::Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&cfg);
    cfg.warn_if_lenient();

    match run(&cfg) {
        Ok(()) => {
            println!("All three emulators OK.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            if let RunError::Demo(core) = &e {
                if let Some(suppressed) = core.suppressed() {
                    warn!(error = %suppressed, "provisioning error suppressed before the failure");
                }
            }
            error!(error = %e, "demo run aborted");
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Run the demos one after another; each builds its own client just before use.
///
/// Same order as `domain::service::run_all`, unrolled so a later provider's
/// client is only built once the earlier demos have succeeded.
fn run(cfg: &config::Config) -> Result<(), RunError> {
    let settings = cfg.demo_settings();
    let rt = BlockingRuntime::new()?;

    let s3 = S3ObjectStore::new(&cfg.s3_settings(), rt.clone());
    let object = ObjectStorageDemo::new(&s3, settings.bucket.clone(), settings.object_policy);
    finish(&object.run()?);

    let blobs = AzureBlobStore::from_connection_string(&cfg.azure_connection_string, rt.clone())?;
    let blob = BlobStorageDemo::new(&blobs, settings.container.clone(), settings.blob_policy);
    finish(&blob.run()?);

    let broker = PubSubBroker::connect(&cfg.gcp_project, rt)?;
    info!(project = broker.project(), "messaging demo starting");
    let messaging = MessagingDemo::new(
        &broker,
        &broker,
        settings.topic.clone(),
        settings.subscription.clone(),
        settings.messaging_policy,
    );
    finish(&messaging.run()?);

    Ok(())
}

/// Print the status line for a finished demo and flag swallowed errors.
fn finish(report: &DemoReport) {
    for (name, err) in report.suppressed() {
        warn!(
            service = report.service.as_str(),
            resource = %name,
            error = %err,
            "provisioning error suppressed; assuming resource exists"
        );
    }
    info!(service = report.service.as_str(), "demo finished");
    println!("{}", report.status_line());
}

fn init_tracing(cfg: &config::Config) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    match cfg.log_format {
        config::LogFormat::Json => {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_timer(fmt::time::SystemTime)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
        config::LogFormat::Pretty => {
            registry
                .with(
                    fmt::layer()
                        .pretty()
                        .with_target(true)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
    }
}
