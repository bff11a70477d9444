// Clippy configuration: enable pedantic but allow overly strict lints
#![allow(clippy::missing_errors_doc)] // Internal functions don't need # Errors docs
#![allow(clippy::missing_panics_doc)] // Internal functions don't need # Panics docs
#![allow(clippy::must_use_candidate)] // Not all getters need #[must_use]
#![allow(clippy::module_name_repetitions)] // e.g., SocketConfig in config module is fine
#![allow(clippy::doc_markdown)] // Don't require backticks around JSON, D-Bus, etc.
#![allow(clippy::cast_possible_truncation)] // Byte hints truncate on purpose
#![allow(clippy::cast_sign_loss)] // Negative byte hints wrap like the C cast
#![allow(clippy::manual_let_else)] // if-let is clearer for multi-line error handling
#![allow(clippy::option_if_let_else)] // if-let is more readable for Option handling
#![allow(clippy::needless_pass_by_value)] // PathBuf by value is fine for config loading

//! notify-bridge - native desktop notifications for dynamically-typed callers
//!
//! The host runtime hands over summary, body, icon, category, urgency,
//! timeout and a list of loosely-typed hints; the bridge classifies each
//! hint, calls the matching typed setter and asks the notification server
//! to display the result.
//!
//! Usage:
//!   notify-bridge send -s "Build" -b "3 errors" -H urgent -H progress=42
//!   notify-bridge serve      # port protocol on stdin/stdout
//!   notify-bridge listen     # port protocol on a Unix socket

mod bridge;
mod cli;
mod config;
mod errors;
mod hint;
mod native;
mod notify;
mod port;
mod term;

use bridge::{Reply, Session};
use clap::Parser;
use cli::{Cli, Commands};
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use config::BridgeConfig;
use notify::NotificationService;
use std::path::PathBuf;
use term::Term;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Get the log directory path
fn get_log_dir() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from("/tmp/notify-bridge/logs"),
        |dirs| dirs.cache_dir().join("notify-bridge").join("logs"),
    )
}

/// One-shot `send`: run the call terms built from CLI flags
fn handle_send<S: NotificationService>(session: &Session<S>, args: &[Term]) -> Result<()> {
    let result = session.notify(args);
    let reply = Reply::from_result(&result);
    println!("{}", reply.to_term());

    match result {
        Ok(()) => Ok(()),
        Err(e) => Err(color_eyre::eyre::eyre!("notify failed: {}", e)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Completions { shell } => {
            cli::print_completions(*shell);
            return Ok(());
        }
        Commands::Config => {
            print!("{}", BridgeConfig::example());
            return Ok(());
        }
        _ => {}
    }

    color_eyre::install()?;

    // stdout carries the port protocol, so logs go to a file
    let log_dir = get_log_dir();
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "notify-bridge.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let log_filter = format!("notify_bridge={}", cli.log_level);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&log_filter))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(non_blocking),
        )
        .init();

    tracing::info!("Starting notify-bridge v{}", env!("CARGO_PKG_VERSION"));

    let config = BridgeConfig::load();
    let app_name = cli.app_name.clone().unwrap_or_else(|| config.app_name.clone());

    // No call is accepted unless the service initializes
    let session = Session::<notify::DesktopService>::init(&app_name)
        .wrap_err_with(|| format!("Failed to initialize notifications as '{app_name}'"))?;
    tracing::debug!(app_name = session.app_name(), "Session ready");

    match cli.command {
        Commands::Send {
            summary,
            body,
            icon,
            category,
            urgency,
            timeout,
            hints,
        } => {
            let args = [
                Term::binary(summary),
                Term::binary(body),
                Term::binary(icon),
                Term::binary(category),
                Term::Int(urgency),
                Term::Int(timeout),
                Term::List(hints),
            ];
            handle_send(&session, &args)
        }
        Commands::Serve => {
            let (jobs, dispatcher) = port::spawn_dispatcher(session);
            let stdin = BufReader::new(tokio::io::stdin());
            port::serve(stdin, tokio::io::stdout(), jobs).await?;
            dispatcher.await?;
            Ok(())
        }
        Commands::Listen { socket } => {
            let socket_path = socket
                .or_else(|| config.socket.path.clone())
                .unwrap_or_else(cli::default_socket_path);

            let (jobs, dispatcher) = port::spawn_dispatcher(session);

            // Ctrl-C stops the listener and every open connection
            let cancel = CancellationToken::new();
            let signal_cancel = cancel.clone();
            tokio::spawn(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        tracing::info!("Interrupted, shutting down");
                        signal_cancel.cancel();
                    }
                    Err(e) => tracing::error!("Failed to listen for Ctrl-C: {}", e),
                }
            });

            let result = port::socket::listen(jobs, &socket_path, &config.socket, cancel).await;

            // Remove socket file
            if socket_path.exists() {
                let _ = std::fs::remove_file(&socket_path);
            }

            // All senders are gone, so the dispatcher drains and closes the session
            dispatcher.await?;
            result.map_err(Into::into)
        }
        Commands::Completions { .. } | Commands::Config => Ok(()),
    }
}
