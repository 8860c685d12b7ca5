#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use rate_limiter_proxy_lib::config::{load_from_path, validate_settings, Settings};
use rate_limiter_proxy_lib::limits::{LimitsConfigLoader, LimitsEvaluator};
use rate_limiter_proxy_lib::proxy::{self, Hooks, ProxyContext};
use rate_limiter_proxy_lib::telemetry::{
    init_metrics, init_tracing_with_otel, start_observability_server,
};
use rate_limiter_proxy_lib::ForwardedIpResolver;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Rate limiting reverse proxy")]
struct Cli {
    /// Path to configuration TOML file; built-in defaults when omitted
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let settings = match &cli.config {
        Some(path) => load_from_path(path),
        None => {
            let settings = Settings::default();
            validate_settings(&settings).map(|()| settings)
        }
    };
    let settings = match settings {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("failed to load configuration: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = init_tracing_with_otel(
        &settings.logging.level,
        settings.logging.show_target,
        &settings.telemetry.otel_log_level,
    ) {
        eprintln!("failed to initialise logging: {err}");
        std::process::exit(1);
    }

    if let Err(err) = run(settings).await {
        error!(%err, "rate limiter exited with error");
        std::process::exit(1);
    }
}

async fn run(settings: Settings) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!(
        service = %settings.service_name,
        listen = %settings.listen,
        forward = %settings.forward_url(),
        config_endpoint = %settings.full_config_endpoint(),
        "configuration loaded"
    );

    let shutdown = CancellationToken::new();
    let resolver = ForwardedIpResolver::from_config(&settings.forwarded_headers)?;
    let evaluator = Arc::new(LimitsEvaluator::new(settings.evaluator_options(), Arc::new(resolver)));

    let (metrics, registry) = init_metrics()?;
    let loader = LimitsConfigLoader::from_endpoint(
        &settings.full_config_endpoint(),
        settings.timeout.config_fetch(),
    )?
    .with_metrics(metrics.clone());

    if !evaluator.load_config(&loader).await {
        warn!("starting with the built-in default limits configuration");
    }
    let refresh = evaluator.spawn_refresh(
        loader,
        settings.config_refresh_interval(),
        shutdown.child_token(),
    );

    if let Some(port) = settings.telemetry.metrics_port {
        let evaluator = evaluator.clone();
        let token = shutdown.child_token();
        tokio::spawn(async move {
            if let Err(e) = start_observability_server(port, registry, evaluator, token).await {
                error!(error = %e, "observability server failed");
            }
        });
    }

    let hooks = Hooks::new().with(metrics);
    let ctx = Arc::new(ProxyContext::new(&settings, evaluator, hooks)?);

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match proxy::shutdown_signal().await {
            Ok(()) => signal_token.cancel(),
            Err(e) => warn!(error = %e, "signal handling unavailable"),
        }
    });

    let result = proxy::run(&settings, ctx, shutdown.clone()).await;
    shutdown.cancel();
    if let Some(handle) = refresh {
        let _ = handle.await;
    }
    result?;
    Ok(())
}
