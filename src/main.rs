//! # AppInstance Controller
//!
//! A Kubernetes controller that materializes AppInstance bundles into the
//! resources that run them.
//!
//! ## Overview
//!
//! For every AppInstance the controller:
//!
//! 1. **Resolves templates** - Walks the `base` chain of AppTemplates, filling unset fields
//! 2. **Builds expected resources** - Deployment, Service, Ingresses, PVCs, ConfigMap,
//!    ExternalSecret and a longhorn RecurringJob
//! 3. **Converges** - Creates, updates, recreates or deletes each resource to match
//!
//! A spec hash gate skips unchanged instances inside the resync window, and template
//! changes invalidate every dependent instance.
//!
//! ## Features
//!
//! - **Template inheritance**: Multi-level `base` chains with cycle detection
//! - **Minimal writes**: Only drift, reported with a human-readable reason, triggers an update
//! - **Immutable fields**: Resources whose immutable fields drift are recreated
//! - **Prometheus metrics**: Exposes metrics for monitoring and observability
//! - **Health probes**: HTTP endpoints for liveness and readiness checks

use anyhow::Result;
use app_bundle_controller::config::{BuilderConfig, ControllerConfig};
use app_bundle_controller::runtime::initialization::initialize;
use app_bundle_controller::runtime::watch_loop::run_watch_loop;
use clap::Parser;

/// AppInstance controller
#[derive(Debug, Parser)]
#[command(name = "app-bundle-controller", version, about, long_about = None)]
struct Args {
    /// Port of the metrics and probe server (overrides METRICS_PORT)
    #[arg(long)]
    metrics_port: Option<u16>,

    /// Only watch AppInstances in this namespace (overrides WATCH_NAMESPACE)
    #[arg(long)]
    watch_namespace: Option<String>,

    /// Log format: json or text (overrides LOG_FORMAT)
    #[arg(long)]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = ControllerConfig::from_env();
    if let Some(port) = args.metrics_port {
        config.metrics_port = port;
    }
    if let Some(namespace) = args.watch_namespace {
        config.watch_namespace = Some(namespace);
    }
    if let Some(format) = args.log_format {
        config.log_format = format;
    }

    let init = initialize(config, BuilderConfig::from_env()).await?;
    run_watch_loop(init.client, init.reconciler, init.trigger, init.server_state).await;

    Ok(())
}
