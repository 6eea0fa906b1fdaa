//! Command line entry point.

use std::path::PathBuf;

use anyhow::{Context, Result};
use argh::FromArgs;
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;

use crate::config::{Config, Overrides};
use crate::etcd::EtcdClient;
use crate::phase::RunReport;
use crate::{observability, report};

/// Create and delete churn against a revisioned key-value store.
///
/// Flags override the YAML configuration file and `KVCHURN__` environment variables.
#[derive(Debug, FromArgs)]
struct Args {
    /// path to the YAML configuration file
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// store address, as host:port or URL
    #[argh(option)]
    endpoints: Option<String>,

    /// disable creates
    #[argh(switch)]
    disable_create: bool,

    /// disable deletes
    #[argh(switch)]
    disable_delete: bool,

    /// disable compaction
    #[argh(switch)]
    disable_compaction: bool,

    /// disable defragmentation
    #[argh(switch)]
    disable_defrag: bool,

    /// disable cleanup
    #[argh(switch)]
    disable_cleanup: bool,

    /// number of keys to be created and deleted per tick
    #[argh(option)]
    key_count: Option<usize>,

    /// length of the random part of each key
    #[argh(option)]
    key_size: Option<usize>,

    /// number of ticks per phase
    #[argh(option)]
    frequency: Option<usize>,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            endpoints: self.endpoints.clone(),
            disable_create: self.disable_create.then_some(true),
            disable_delete: self.disable_delete.then_some(true),
            disable_compaction: self.disable_compaction.then_some(true),
            disable_defragmentation: self.disable_defrag.then_some(true),
            disable_cleanup: self.disable_cleanup.then_some(true),
            key_count: self.key_count,
            key_size: self.key_size,
            frequency: self.frequency,
        }
    }
}

/// Bootstrap the runtime and execute the run.
pub fn execute() -> Result<()> {
    let args: Args = argh::from_env();
    let config = Config::load(args.config.as_deref(), &args.overrides())?;

    // Sentry should be initialized before creating the async runtime.
    let _sentry_guard = observability::init_sentry(&config);

    // Ticks and store calls never overlap, so a single thread drives everything.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let _runtime_guard = runtime.enter();

    observability::init_tracing(&config);
    tracing::debug!(?config);

    let report = runtime.block_on(run(config))?;
    report::print_report(&report);

    Ok(())
}

async fn run(config: Config) -> Result<RunReport> {
    let client = EtcdClient::builder(config.endpoints.as_str())
        .dial_timeout(config.dial_timeout)
        .request_timeout(config.request_timeout)
        .connect()
        .await
        .context("failed to create store client")?;
    tracing::info!(endpoint = client.base_url(), "connected to store");

    let token = CancellationToken::new();
    tokio::spawn(cancel_on_signal(token.clone()));

    let report = crate::run(&config, client, &token).await?;
    if report.is_cancelled() {
        tracing::info!("run cancelled");
    }

    Ok(report)
}

async fn cancel_on_signal(token: CancellationToken) {
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(error) => {
            tracing::warn!(
                error = &error as &dyn std::error::Error,
                "failed to install SIGTERM handler"
            );
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }

    tracing::info!("shutdown requested, stopping before the next operation");
    token.cancel();
}
