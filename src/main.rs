//! emu7k - 7K Center emulator
//!
//! Run with: emu7k [options] <file>...
//!
//! Replays the given 7K record logs to clients that connect and subscribe
//! on the control port. Send `STOP` on the port, or press Ctrl-C, to stop.

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};

use emu7k::error::ConfigError;
use emu7k::{Emu7kServer, FaultInjection, InputMode, ServerConfig};

/// 7K Center emulator: replays recorded sonar logs to TCP subscribers
#[derive(Parser, Debug)]
#[command(name = "emu7k", version, about)]
struct Cli {
    /// More output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Only warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Host name or address to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Control port
    #[arg(short, long, default_value_t = 7000)]
    port: u16,

    /// Minimum delay between records (msec)
    #[arg(long, default_value_t = 0)]
    min_delay: u64,

    /// Maximum delay between records (msec)
    #[arg(long, default_value_t = 3000)]
    max_delay: u64,

    /// Restart at the first file when the list is exhausted
    #[arg(long, overrides_with = "no_restart")]
    restart: bool,

    /// Stop when the list is exhausted
    #[arg(long, overrides_with = "restart")]
    no_restart: bool,

    /// Log statistics every n records
    #[arg(long, default_value_t = 0)]
    statn: u64,

    /// Pause publishing for <pause> seconds every <interval> seconds
    #[arg(long, value_name = "INTERVAL/PAUSE")]
    xdelay: Option<FaultInjection>,

    /// Input files include network frames
    #[arg(long)]
    nf: bool,

    /// Start offset into the file list (bytes)
    #[arg(long, default_value_t = 0)]
    offset: u64,

    /// Maximum clients (0 = unlimited)
    #[arg(long, default_value_t = 16)]
    max_clients: usize,

    /// Source files, replayed in order
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

impl Cli {
    fn log_directive(&self) -> &'static str {
        if self.quiet {
            return "emu7k=warn";
        }
        match self.verbose {
            0 => "emu7k=info",
            1 => "emu7k=debug",
            _ => "emu7k=trace",
        }
    }

    async fn into_config(self) -> Result<ServerConfig, ConfigError> {
        let target = format!("{}:{}", self.host, self.port);
        let bind_addr = tokio::net::lookup_host(target.as_str())
            .await
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or_else(|| ConfigError::BadAddress(target.clone()))?;

        let input_mode = if self.nf {
            InputMode::NetworkFramed
        } else {
            InputMode::RawDrf
        };

        let mut config = ServerConfig::with_addr(bind_addr)
            .sources(self.files)
            .input_mode(input_mode)
            .min_delay(Duration::from_millis(self.min_delay))
            .max_delay(Duration::from_millis(self.max_delay))
            .restart(self.restart || !self.no_restart)
            .stats_interval(self.statn)
            .start_offset(self.offset)
            .max_clients(self.max_clients);
        if let Some(fault) = self.xdelay {
            config = config.fault_injection(fault);
        }

        config.validate()?;
        Ok(config)
    }
}

/// Resolves on Ctrl-C, or SIGTERM/SIGHUP on unix
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut term = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "Cannot watch SIGTERM");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        let mut hup = match signal(SignalKind::hangup()) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "Cannot watch SIGHUP");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
            _ = hup.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(cli.log_directive().parse()?),
        )
        .init();

    let config = cli.into_config().await?;
    tracing::info!(
        addr = %config.bind_addr,
        files = config.sources.len(),
        restart = config.restart,
        input_mode = ?config.input_mode,
        "Starting 7K Center emulator"
    );

    let server = Emu7kServer::new(config)?;
    server.run_until(shutdown_signal()).await?;

    Ok(())
}
