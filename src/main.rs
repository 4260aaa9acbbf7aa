mod api;
mod config;
mod http_client;
mod openlogger_client;
mod services;

use crate::{
    api::Api,
    config::AppConfig,
    openlogger_client::OpenLoggerClient,
    services::wifi::DeviceContext,
};
use actix_cors::Cors;
use actix_web::{App, HttpServer, dev::ServerHandle, web::Data};
use anyhow::{Context, Result};
use env_logger::{Builder, Env, Target};
use log::{debug, error, info};
use std::io::Write;
use tokio::signal::unix::{SignalKind, signal};

type WifiApi = Api<OpenLoggerClient>;

#[actix_web::main]
async fn main() {
    if let Err(e) = run().await {
        error!("application error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    initialize();

    let mut sigterm =
        signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;

    let config = AppConfig::get();
    let gateway = OpenLoggerClient::new().context("failed to create device client")?;
    let context = DeviceContext {
        bridge: config.device.bridge,
    };

    info!(
        "configuring device at {} (bridge mode: {})",
        config.device.url, context.bridge
    );

    let api = WifiApi::new(gateway, context)
        .await
        .context("failed to create api")?;

    let (server_handle, server_task) = run_server(api.clone())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => debug!("ctrl-c received"),
        _ = sigterm.recv() => debug!("SIGTERM received"),
        result = server_task => {
            match result {
                Ok(Ok(())) => debug!("server stopped normally"),
                Ok(Err(e)) => error!("server stopped with error: {e}"),
                Err(e) => error!("server task panicked: {e}"),
            }
        },
    }

    info!("shutting down");
    api.wifi.cancel_workflows();
    server_handle.stop(true).await;
    info!("shutdown complete");

    Ok(())
}

fn initialize() {
    log_panics::init();

    let mut builder = if cfg!(debug_assertions) {
        Builder::from_env(Env::default().default_filter_or("debug"))
    } else {
        Builder::from_env(Env::default().default_filter_or("info"))
    };

    builder.format(|f, record| match record.level() {
        log::Level::Error => {
            eprintln!("{}", record.args());
            Ok(())
        }
        _ => {
            writeln!(f, "{}", record.args())
        }
    });

    builder.target(Target::Stdout).init();

    info!("module version: {}", env!("CARGO_PKG_VERSION"));
}

fn run_server(
    api: WifiApi,
) -> Result<(
    ServerHandle,
    tokio::task::JoinHandle<Result<(), std::io::Error>>,
)> {
    let ui_port = AppConfig::get().ui.port;

    let server = HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_header()
                    .allowed_methods(vec!["GET", "POST"])
                    .max_age(3600),
            )
            .app_data(Data::new(api.clone()))
            .configure(WifiApi::configure)
    })
    .bind(("0.0.0.0", ui_port))
    .context("failed to bind server")?
    .disable_signals()
    .run();

    info!("listening on port {ui_port}");

    Ok((server.handle(), tokio::spawn(server)))
}
