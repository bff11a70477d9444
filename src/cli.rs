//! CLI argument parsing
//!
//! Uses clap for argument parsing with derive macros.

use crate::term::Term;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;
use std::path::PathBuf;

/// Get default socket path, preferring XDG_RUNTIME_DIR on Linux
pub fn default_socket_path() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime_dir).join("notify-bridge.sock");
    }
    PathBuf::from("/tmp/notify-bridge.sock")
}

/// Bridge from dynamically-typed callers to native desktop notifications
#[derive(Parser, Debug)]
#[command(name = "notify-bridge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Application name announced to the notification server (default: from config)
    #[arg(short, long, env = "NOTIFY_BRIDGE_APP_NAME", global = true)]
    pub app_name: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "RUST_LOG", default_value = "info", global = true)]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send a single notification
    Send {
        /// Summary line
        #[arg(short, long)]
        summary: String,

        /// Body text
        #[arg(short, long, default_value = "")]
        body: String,

        /// Icon name or path
        #[arg(short, long, default_value = "")]
        icon: String,

        /// Notification category (e.g. "email.arrived")
        #[arg(short, long, default_value = "")]
        category: String,

        /// Urgency: 0 low, 1 normal, 2 critical
        #[arg(short, long, default_value_t = 1, allow_negative_numbers = true)]
        urgency: i64,

        /// Expiry in milliseconds (-1 server default, 0 never)
        #[arg(short, long, default_value_t = -1, allow_negative_numbers = true)]
        timeout: i64,

        /// Hint: KEY, KEY=INT, KEY=FLOAT, KEY=byte:N or KEY=TEXT
        #[arg(short = 'H', long = "hint", value_parser = parse_hint)]
        hints: Vec<Term>,
    },

    /// Serve the line-delimited JSON port protocol on stdin/stdout
    Serve,

    /// Serve the port protocol on a Unix socket
    Listen {
        /// Socket path (default: config, then $XDG_RUNTIME_DIR/notify-bridge.sock or /tmp/notify-bridge.sock)
        #[arg(short, long, env = "NOTIFY_BRIDGE_SOCKET")]
        socket: Option<PathBuf>,
    },

    /// Print an example configuration file
    Config,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Parse a `--hint` argument into a hint list element
///
/// `KEY` becomes a bare atom; `KEY=VALUE` becomes `{KEY, VALUE}` where the
/// value is tried as integer, then float, then `byte:N`, then text.
pub fn parse_hint(arg: &str) -> Result<Term, String> {
    let Some((key, value)) = arg.split_once('=') else {
        if arg.is_empty() {
            return Err("hint key must not be empty".to_string());
        }
        return Ok(Term::atom(arg));
    };
    if key.is_empty() {
        return Err(format!("hint '{arg}' has an empty key"));
    }

    let value = if let Ok(n) = value.parse::<i64>() {
        Term::Int(n)
    } else if let Ok(x) = value.parse::<f64>() {
        Term::Float(x)
    } else if let Some(byte) = value.strip_prefix("byte:") {
        let n = byte
            .parse::<i64>()
            .map_err(|_| format!("hint '{arg}': byte value must be an integer"))?;
        Term::Tuple(vec![Term::atom("byte"), Term::Int(n)])
    } else {
        Term::binary(value)
    };

    Ok(Term::Tuple(vec![Term::atom(key), value]))
}

/// Generate shell completions and print to stdout
pub fn print_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "notify-bridge", &mut io::stdout());
}
