// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! fdvpttd: half-duplex FreeDV PTT session daemon for the sBitx.
//!
//! Drives the session controller from a line-oriented control loop on
//! stdin (the graphical front end talks this protocol) and from
//! SIGINT/SIGTERM for shutdown. Commands:
//! `tx`, `rx`, `freq <khz>`, `mode <700C|700D|700E>`, `bands`, `status`,
//! `quit`.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::signal::unix::{signal as unix_signal, SignalKind};
use tracing::{error, info, warn};

use fdv_core::band::{band_channels, Freq};
use fdv_core::pipeline::{PipelineConfig, ProcessGroupSupervisor};
use fdv_core::rig::{RigClient, TcpRigLink};
use fdv_core::session::SessionController;
use fdv_core::settings::SettingsStore;
use fdv_core::{DynResult, SessionError};
use fdv_reporting::{Notifier, ReporterBridge, DEFAULT_NOTIFY_ADDR};

mod preflight;

const PKG_DESCRIPTION: &str = concat!(env!("CARGO_PKG_NAME"), " - ", env!("CARGO_PKG_DESCRIPTION"));

type Session = SessionController<ProcessGroupSupervisor, TcpRigLink, Notifier>;

#[derive(Debug, Parser)]
#[command(version = env!("CARGO_PKG_VERSION"), about = PKG_DESCRIPTION)]
struct Cli {
    /// Settings file (key=value store shared with other sBitx tools)
    #[arg(long = "config", default_value = "fdv-ptt.ini")]
    config: PathBuf,
    /// Radio command endpoint (mode/frequency/filter commands)
    #[arg(long = "cmd-addr", default_value = "127.0.0.1:8081")]
    cmd_addr: String,
    /// Radio control endpoint (transmit/receive toggle)
    #[arg(long = "ctl-addr", default_value = "127.0.0.1:4532")]
    ctl_addr: String,
    /// Reporter bridge notification endpoint
    #[arg(long = "notify-addr", default_value = DEFAULT_NOTIFY_ADDR)]
    notify_addr: String,
    /// Command to launch the reporter bridge helper; skipped when absent
    #[arg(long = "reporter-cmd", num_args = 1.., value_name = "ARGV")]
    reporter_cmd: Vec<String>,
    /// Radio control program that must already be running
    #[arg(long = "radio-program", default_value = "sbitx")]
    radio_program: String,
    /// ALSA card that must be present for the audio pipelines
    #[arg(long = "capture-card", default_value = "card5")]
    capture_card: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            let code = err
                .downcast_ref::<SessionError>()
                .map(|e| e.exit_code())
                .unwrap_or(1);
            ExitCode::from(code)
        }
    }
}

/// Initialize logging/tracing.
fn init_tracing() {
    // Uses default formatting and RUST_LOG if available.
    tracing_subscriber::fmt().with_target(false).init();
}

async fn run(cli: Cli) -> DynResult<()> {
    let version = format!("sBitx fdv_ptt {}", env!("CARGO_PKG_VERSION"));
    info!("Starting fdvpttd ({})", version);

    preflight::check(&cli.radio_program, &cli.capture_card)?;

    let settings = SettingsStore::new(&cli.config);
    settings.seed_defaults(&version)?;
    settings.set_version(&version)?;

    let link = TcpRigLink::connect(&cli.cmd_addr, &cli.ctl_addr).await?;
    let mut session = SessionController::new(
        ProcessGroupSupervisor::new(),
        RigClient::new(link),
        Notifier::new(cli.notify_addr.clone()),
        settings,
        PipelineConfig::default(),
    );
    session.initialize().await?;

    let mut bridge = if cli.reporter_cmd.is_empty() {
        info!("No reporter command given, running without the bridge");
        None
    } else {
        Some(ReporterBridge::spawn(&cli.reporter_cmd)?)
    };

    let result = control_loop(&mut session).await;
    let shutdown = session.shutdown().await;
    if let Some(bridge) = bridge.as_mut() {
        bridge.terminate();
    }
    prefer_root_cause(result, shutdown)?;
    info!("Session ended");
    Ok(())
}

/// A shutdown failure must not mask the error that forced the shutdown;
/// the root cause wins and the secondary failure is only logged.
fn prefer_root_cause(
    loop_result: DynResult<()>,
    shutdown_result: Result<(), SessionError>,
) -> DynResult<()> {
    match (loop_result, shutdown_result) {
        (Ok(()), Ok(())) => Ok(()),
        (Ok(()), Err(err)) => Err(err.into()),
        (Err(root), Ok(())) => Err(root),
        (Err(root), Err(err)) => {
            warn!("Shutdown also failed: {}", err);
            Err(root)
        }
    }
}

/// Single-task event loop: one stdin command or one signal at a time; no
/// two mode changes are ever in flight concurrently.
async fn control_loop(session: &mut Session) -> DynResult<()> {
    let mut sigterm = unix_signal(SignalKind::terminate())?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if handle_line(session, line.trim()).await? == Flow::Quit {
                            break;
                        }
                    }
                    Ok(None) => {
                        info!("Control input closed, shutting down");
                        break;
                    }
                    Err(err) => {
                        warn!("Control input error: {}", err);
                        break;
                    }
                }
            }
            _ = signal::ctrl_c() => {
                info!("Interrupt received, shutting down");
                break;
            }
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down");
                break;
            }
        }
    }
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

async fn handle_line(session: &mut Session, line: &str) -> Result<Flow, SessionError> {
    let mut parts = line.split_whitespace();
    match parts.next() {
        None => {}
        Some("tx") => session.request_transmit().await?,
        Some("rx") => session.request_receive().await?,
        Some("freq") => match parts.next().map(str::parse::<u32>) {
            Some(Ok(khz)) => session.request_frequency(Freq { khz }).await?,
            _ => warn!("Usage: freq <khz>"),
        },
        Some("mode") => match parts.next() {
            Some(mode @ ("700C" | "700D" | "700E")) => session.save_fdv_mode(mode).await,
            _ => warn!("Usage: mode <700C|700D|700E>"),
        },
        Some("bands") => {
            for (band, channels) in band_channels() {
                let list = channels
                    .iter()
                    .map(|khz| khz.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                println!("{band}: {list} kHz");
            }
        }
        Some("status") => match serde_json::to_string(&session.status()) {
            Ok(json) => println!("{json}"),
            Err(err) => warn!("Failed to render status: {}", err),
        },
        Some("quit") | Some("exit") => return Ok(Flow::Quit),
        Some(other) => {
            warn!("Unknown command '{}'", other);
            println!("Commands: tx, rx, freq <khz>, mode <700C|700D|700E>, bands, status, quit");
        }
    }
    Ok(Flow::Continue)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_loop_error_outlives_shutdown_error() {
        let root: DynResult<()> = Err("control input exploded".into());
        let shutdown = Err(SessionError::TransitionFailure("stop failed".to_string()));
        let err = prefer_root_cause(root, shutdown).unwrap_err();
        assert!(err.to_string().contains("control input exploded"));
    }

    #[test]
    fn shutdown_error_propagates_when_loop_was_clean() {
        let shutdown = Err(SessionError::TransitionFailure("stop failed".to_string()));
        let err = prefer_root_cause(Ok(()), shutdown).unwrap_err();
        assert!(err.to_string().contains("pipeline transition failed"));
    }
}
