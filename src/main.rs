//! Vault auto-unseal controller

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

use vault_autounseal::{
    config::Args,
    create_router,
    kube::KubeClient,
    logging,
    vault::{HttpVault, SECRET_SHARES, SECRET_THRESHOLD},
    Controller, Fleet, InitCoordinator, KeyStore, ReadinessReporter, UnsealExecutor,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    logging::init(&args.log_level, args.log_format);

    if let Err(e) = args.validate() {
        error!("{}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Vault auto-unseal controller");
    info!("======================================");
    info!("Namespace: {}", args.namespace);
    info!("Label selector: {}", args.label_selector);
    info!("Vault: {}://<pod-ip>:{}", args.vault_scheme, args.vault_port);
    info!("Check interval: {}s", args.check_interval);
    info!("Init policy: {} shares, threshold {}", SECRET_SHARES, SECRET_THRESHOLD);
    info!("Init election: {:?}", args.init_election);
    info!("Local keys dir: {}", args.unseal_keys_dir.display());
    info!("Readiness: {:?}", args.readiness_mode);
    info!("Listen: {}", args.listen);
    info!("======================================");

    // The orchestrator client is the only fatal dependency
    let kube = match KubeClient::from_env() {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Failed to configure Kubernetes client: {}", e);
            std::process::exit(1);
        }
    };
    let vault = Arc::new(HttpVault::new(args.vault_scheme.clone(), args.connect_timeout())?);

    let keys = KeyStore::new(kube.clone(), args.namespace.clone())
        .with_overwrite(args.overwrite_existing_secrets);
    let executor = Arc::new(UnsealExecutor::new(
        vault.clone(),
        keys.clone(),
        args.unseal_keys_dir.clone(),
    ));
    let coordinator = InitCoordinator::new(vault.clone(), keys, executor.clone());
    let fleet = Fleet::new(
        kube,
        vault,
        args.namespace.clone(),
        args.label_selector.clone(),
        args.vault_port,
    );

    let controller = Controller::new(
        fleet.clone(),
        coordinator,
        executor,
        args.init_election,
        args.check_interval(),
    );
    let app = create_router(ReadinessReporter::new(fleet, args.readiness_mode));

    let listener = tokio::net::TcpListener::bind(args.listen).await?;
    info!("Health endpoints listening on {}", args.listen);

    tokio::select! {
        _ = controller.run() => {}
        result = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()) => {
            result?;
        }
    }

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
