// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Paced command client for the radio's two control endpoints.
//!
//! The command endpoint takes ASCII commands for mode, frequency, pitch and
//! passband shoulders; the control endpoint takes the one-letter `T` toggle.
//! Both connections are opened once at session start and never reopened, and
//! no responses are read on either. The radio's command interpreter drops
//! back-to-back sends, so a fixed pacing delay is enforced between commands
//! on the command endpoint.
//!
//! Wire detail: command-endpoint strings carry no trailing newline; the
//! control endpoint's toggles do.

use std::future::Future;
use std::pin::Pin;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::{self, Duration};
use tracing::{debug, info};

use crate::band::{Freq, RadioMode, FILTER_HIGH_HZ, FILTER_LOW_HZ, PITCH_HZ};
use crate::error::SessionError;
use crate::DynResult;

/// Wait enforced between successive commands on the command endpoint.
pub const COMMAND_PACING: Duration = Duration::from_millis(200);

/// Alias to reduce type complexity in RigLink.
pub type SendFuture<'a> = Pin<Box<dyn Future<Output = DynResult<()>> + Send + 'a>>;

/// Transport seam for the two rig endpoints.
pub trait RigLink: Send {
    /// Write one command on the command endpoint.
    fn send_command<'a>(&'a mut self, line: &'a str) -> SendFuture<'a>;

    /// Write one toggle on the control endpoint.
    fn send_control<'a>(&'a mut self, line: &'a str) -> SendFuture<'a>;
}

/// Real link: two persistent TCP connections. Connect failure on either is
/// fatal for the whole session; there is no reconnect.
pub struct TcpRigLink {
    command: TcpStream,
    control: TcpStream,
}

impl TcpRigLink {
    pub async fn connect(command_addr: &str, control_addr: &str) -> Result<Self, SessionError> {
        let command =
            TcpStream::connect(command_addr)
                .await
                .map_err(|source| SessionError::ConnectionFailure {
                    endpoint: "command",
                    source,
                })?;
        let control =
            TcpStream::connect(control_addr)
                .await
                .map_err(|source| SessionError::ConnectionFailure {
                    endpoint: "control",
                    source,
                })?;
        info!(
            "Rig endpoints connected (command {}, control {})",
            command_addr, control_addr
        );
        Ok(Self { command, control })
    }
}

impl RigLink for TcpRigLink {
    fn send_command<'a>(&'a mut self, line: &'a str) -> SendFuture<'a> {
        Box::pin(async move {
            self.command.write_all(line.as_bytes()).await?;
            Ok(())
        })
    }

    fn send_control<'a>(&'a mut self, line: &'a str) -> SendFuture<'a> {
        Box::pin(async move {
            self.control.write_all(line.as_bytes()).await?;
            Ok(())
        })
    }
}

/// Client enforcing the ordering and pacing rules of the rig protocol.
pub struct RigClient<L> {
    link: L,
}

impl<L: RigLink> RigClient<L> {
    pub fn new(link: L) -> Self {
        Self { link }
    }

    /// Key or unkey the radio: `T 1` to transmit, `T 0` to receive.
    /// Exactly one command, no response expected.
    pub async fn set_transceive(&mut self, transmit: bool) -> Result<(), SessionError> {
        let line = if transmit { "T 1\n" } else { "T 0\n" };
        self.link
            .send_control(line)
            .await
            .map_err(|source| SessionError::SendFailure {
                endpoint: "control",
                source,
            })?;
        debug!("Sent control toggle: {}", line.trim_end());
        Ok(())
    }

    /// Retune the radio: mode for the target frequency first, then the
    /// frequency itself, then the fixed pitch and passband shoulders.
    /// Any send failure aborts the sequence.
    pub async fn set_frequency(&mut self, freq: Freq) -> Result<(), SessionError> {
        let mode = RadioMode::for_freq(freq);
        info!("Changing frequency to {} ({})", freq, mode);
        self.send_paced(&format!("m {mode}")).await?;
        self.send_paced(&format!("f {}", freq.khz)).await?;
        self.send_paced(&format!("PITCH {PITCH_HZ}")).await?;
        self.send_paced(&format!("LOW {FILTER_LOW_HZ}")).await?;
        self.send_paced(&format!("HIGH {FILTER_HIGH_HZ}")).await?;
        Ok(())
    }

    /// Initial burst sent right after connecting, priming the radio with the
    /// digital-voice defaults and the 20 m calling channel.
    pub async fn send_startup_preset(&mut self) -> Result<(), SessionError> {
        for line in ["m DIGITAL", "LOW 900", "HIGH 2100", "PITCH 1500", "f 14236"] {
            self.send_paced(line).await?;
        }
        Ok(())
    }

    async fn send_paced(&mut self, line: &str) -> Result<(), SessionError> {
        self.link
            .send_command(line)
            .await
            .map_err(|source| SessionError::SendFailure {
                endpoint: "command",
                source,
            })?;
        debug!("Sent: {}", line);
        time::sleep(COMMAND_PACING).await;
        Ok(())
    }
}
