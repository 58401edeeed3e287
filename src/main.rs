//! `igate` binary: wires configuration, the serial port and Ctrl-C into the
//! dispatcher loop.
//!
//! ```text
//! igate [CONFIG]            # CONFIG defaults to igate.yaml
//! igate [CONFIG] --replay CAPTURE
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, bail};
use igate::{ConfiguredSensors, Dispatcher, FrameSource, GatewayConfig, ReplaySource, SerialSource};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "igate.yaml";

struct Args {
    config: PathBuf,
    replay: Option<PathBuf>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut config = None;
    let mut replay = None;
    let mut args = std::env::args_os().skip(1);

    while let Some(arg) = args.next() {
        if arg == "--replay" {
            replay = Some(PathBuf::from(args.next().context("--replay needs a capture file")?));
        } else if config.is_none() {
            config = Some(PathBuf::from(arg));
        } else {
            bail!("unexpected argument {:?}", arg);
        }
    }

    Ok(Args { config: config.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG)), replay })
}

async fn run_gateway<F: FrameSource>(config: Arc<GatewayConfig>, source: F) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!(">>> Ctrl+C detected, exiting...");
        }
        on_signal.cancel();
    });

    let sensors = ConfiguredSensors::from_config(&config.sensors);
    Dispatcher::new(config, source, sensors, cancel).run().await?;
    Ok(())
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = GatewayConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    let config = Arc::new(config);

    match args.replay {
        Some(capture) => {
            let source = ReplaySource::open(&capture)
                .with_context(|| format!("opening capture {}", capture.display()))?
                .with_idle(config.serial.read_timeout());
            run_gateway(config, source).await
        }
        None => {
            let source = SerialSource::open(&config.serial).map_err(|e| {
                error!(">>> FAILED to open {}", config.serial.device);
                e
            })?;
            run_gateway(config, source).await
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let result = parse_args().and_then(|args| {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("building runtime")?
            .block_on(run(args))
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(">>> {:#}", e);
            ExitCode::FAILURE
        }
    }
}
