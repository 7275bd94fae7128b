use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use laundry_notify::api::NotificationApi;
use laundry_notify::auth::{self, ClientStorage, FileStorage};
use laundry_notify::config::{self, Config};
use laundry_notify::notification::TracingToastPresenter;
use laundry_notify::{NotificationSession, SessionEvent};

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Export spans over OTLP only when an endpoint is configured.
    use opentelemetry::KeyValue;

    use opentelemetry_sdk::{trace as sdktrace, Resource};

    let telemetry_layer = if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(opentelemetry_otlp::new_exporter().tonic())
            .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
                KeyValue::new("service.name", "laundry-notify"),
            ])))
            .install_batch(opentelemetry_sdk::runtime::Tokio)
            .context("failed to install OpenTelemetry tracer")?;
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "laundry_notify=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .with(telemetry_layer)
        .init();

    let mut cfg = config::load()?;
    let args = cli::Cli::parse();
    if let Some(api_url) = args.api_url {
        cfg.api_url = api_url;
    }
    if let Some(storage) = args.storage {
        cfg.storage_path = storage;
    }
    let storage = Arc::new(FileStorage::new(cfg.storage_path.clone()));

    let result = match args.command {
        Some(cli::Commands::Watch) | None => run_watch(cfg, storage).await,
        Some(cli::Commands::Login { token }) => {
            storage.set_item(auth::TOKEN_KEY, &token)?;
            println!("Token stored in {}", storage.path().display());
            Ok(())
        }
        Some(cli::Commands::Logout) => {
            storage.remove_item(auth::TOKEN_KEY)?;
            storage.remove_item(auth::LEGACY_AUTH_KEY)?;
            println!("Signed out");
            Ok(())
        }
        Some(cli::Commands::List { limit }) => {
            let api = api_client(&cfg, &*storage)?;
            let now = Utc::now();
            let notifications = api.list(limit).await?;
            if notifications.is_empty() {
                println!("No notifications");
            }
            for n in notifications {
                println!(
                    "{} {} {}: {} ({}) [{}]",
                    if n.is_read { " " } else { "●" },
                    n.glyph(),
                    n.title,
                    n.message,
                    n.time_ago(now),
                    n.id
                );
            }
            Ok(())
        }
        Some(cli::Commands::Unread) => {
            let api = api_client(&cfg, &*storage)?;
            println!("{}", api.unread_count().await?);
            Ok(())
        }
        Some(cli::Commands::MarkRead { ids }) => {
            let api = api_client(&cfg, &*storage)?;
            api.mark_read(&ids).await?;
            println!("Marked {} notification(s) read", ids.len());
            Ok(())
        }
        Some(cli::Commands::MarkAllRead) => {
            let api = api_client(&cfg, &*storage)?;
            api.mark_all_read().await?;
            println!("All notifications marked read");
            Ok(())
        }
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

fn api_client(cfg: &Config, storage: &dyn ClientStorage) -> anyhow::Result<NotificationApi> {
    let token = auth::get_auth_token(storage)
        .context("no auth token stored; run `laundry-notify login --token <TOKEN>` first")?;
    Ok(NotificationApi::new(cfg, Some(token))?)
}

async fn run_watch(cfg: Config, storage: Arc<FileStorage>) -> anyhow::Result<()> {
    let session = NotificationSession::new(cfg, storage, Arc::new(TracingToastPresenter))?;
    let mut events = session.events();

    session.start().await?;
    let loaded = session.notifications().await.len();
    let unread = session.unread_count().await;
    tracing::info!(loaded, unread, "watching notifications, press Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(SessionEvent::Delivered(_)) => {
                    let unread = session.unread_count().await;
                    tracing::debug!(unread, "unread count updated");
                }
                Ok(SessionEvent::ClaimsInvalidated(reason)) => {
                    tracing::info!(%reason, "permissions changed on the server");
                }
                Ok(SessionEvent::Unauthorized) => {
                    tracing::error!("auth token rejected, stopping");
                    break;
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event stream lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    session.stop().await;
    Ok(())
}
