//! Storefront-facing HTTP surface of the relay.

pub mod api;
pub mod config;
pub mod errors;
pub mod metrics_defs;

use axum::http::HeaderValue;
use errors::GatewayError;
use lifecycle::Synchronizer;
use shared::admin_service::AdminService;
use shared::http::{bind, run_http_service};
use std::future::Future;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};

/// Serves the gateway and its admin listener until SIGINT or SIGTERM.
pub async fn run(config: config::Config, synchronizer: Synchronizer) -> Result<(), GatewayError> {
    config.validate()?;
    let cors_origin = config.cors_origin_header()?;

    let listener = bind(&config.listener.host, config.listener.port).await?;
    let admin_listener = bind(&config.admin_listener.host, config.admin_listener.port).await?;
    tracing::info!(
        listener = %listener.local_addr()?,
        admin_listener = %admin_listener.local_addr()?,
        "gateway listening"
    );

    serve(
        listener,
        admin_listener,
        cors_origin,
        synchronizer,
        shutdown_signal(),
    )
    .await
}

/// Serves until `shutdown` resolves, then drains in-flight requests and shuts the
/// synchronizer down. Readiness turns false as soon as `shutdown` resolves.
pub async fn serve<F>(
    listener: TcpListener,
    admin_listener: TcpListener,
    cors_origin: HeaderValue,
    synchronizer: Synchronizer,
    shutdown: F,
) -> Result<(), GatewayError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (stopping_tx, stopping_rx) = watch::channel(false);
    let (admin_stop_tx, admin_stop_rx) = oneshot::channel::<()>();

    let admin_service = {
        let synchronizer = synchronizer.clone();
        AdminService::<_, GatewayError>::new(move || {
            !*stopping_rx.borrow() && synchronizer.is_accepting()
        })
    };
    let admin_task = tokio::spawn(run_http_service(admin_listener, admin_service, async move {
        let _ = admin_stop_rx.await;
    }));

    let app = api::router(synchronizer.clone(), cors_origin);
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            tracing::info!("shutdown requested, draining requests");
            let _ = stopping_tx.send(true);
        })
        .await;

    synchronizer.shutdown();
    let _ = admin_stop_tx.send(());
    match admin_task.await {
        Ok(result) => result?,
        Err(e) => tracing::error!(error = %e, "admin listener task failed"),
    }

    served?;
    tracing::info!("gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "could not listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "could not listen for SIGTERM");
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
}
