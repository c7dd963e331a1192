//! dockwatch_agent: connects to the controller, reports telemetry and Docker changes,
//! and runs the commands it is sent.

use anyhow::Context;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use dockwatch_agent::args::{default_interval, parse_args, USAGE};
use dockwatch_agent::config::{ensure_config, AgentConfig, ConfigError};
use dockwatch_agent::dispatch::Dispatcher;
use dockwatch_agent::docker::DockerManager;
use dockwatch_agent::exec::ShellExecutor;
use dockwatch_agent::queue::OutboundQueue;
use dockwatch_agent::resources::ResourceManager;
use dockwatch_agent::session::{Session, SessionEnd};
use dockwatch_agent::telemetry::SysinfoSampler;
use dockwatch_agent::watcher::{spawn_watcher, Watcher};

// Operator must edit the freshly written config before the next run.
const EXIT_CONFIG_CREATED: u8 = 2;

async fn wait_for_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C"),
        _ = terminate => info!("received SIGTERM"),
        _ = shutdown.cancelled() => return,
    }
    shutdown.cancel();
}

/// Connect to Docker and the controller, send Start, and seed the watcher.
async fn start(
    config: &AgentConfig,
    shutdown: CancellationToken,
) -> anyhow::Result<(Session, Watcher)> {
    let docker = DockerManager::connect().context("cannot reach the Docker engine")?;
    let resources: Arc<dyn ResourceManager> = Arc::new(docker);
    let sampler = Arc::new(SysinfoSampler::new().await);
    let dispatcher = Dispatcher::new(resources.clone(), Arc::new(ShellExecutor));

    let queue = OutboundQueue::new();
    let mut session = Session::new(
        config,
        queue.clone(),
        dispatcher,
        resources.clone(),
        sampler,
        shutdown,
    )?;
    let seed = session
        .connect()
        .await
        .with_context(|| format!("cannot start a session with {}", session.url()))?;
    info!(
        containers = seed.containers.len(),
        images = seed.images.len(),
        "start message sent"
    );
    Ok((session, Watcher::new(queue, resources, seed)))
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = match parse_args(std::env::args(), default_interval()) {
        Ok(a) => a,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };
    if args.help {
        println!("{USAGE}");
        return ExitCode::SUCCESS;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match ensure_config(&args.config_path) {
        Ok(c) => c,
        Err(e @ ConfigError::Created(_)) => {
            eprintln!("{e}");
            return ExitCode::from(EXIT_CONFIG_CREATED);
        }
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = CancellationToken::new();
    let (mut session, watcher) = match start(&config, shutdown.clone()).await {
        Ok(parts) => parts,
        Err(e) => {
            error!("{e:#}");
            return ExitCode::FAILURE;
        }
    };

    tokio::spawn(wait_for_signal(shutdown.clone()));
    let watcher = spawn_watcher(watcher, args.interval, shutdown.clone());

    let end = session.run().await;
    shutdown.cancel();
    if let Err(e) = watcher.await {
        warn!("watcher task failed: {e}");
    }

    match end {
        Ok(SessionEnd::Shutdown) => {
            info!("shut down");
            ExitCode::SUCCESS
        }
        Ok(SessionEnd::ConnectionLost) => {
            error!("connection to controller lost");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
