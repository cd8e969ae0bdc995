// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Half-duplex session state machine.
//!
//! The controller owns the current mode and at most one live pipeline, and
//! orchestrates the supervisor and the rig client on mode requests. It holds
//! no sockets or processes itself. Callers must drive it from a single task:
//! mutual exclusion between transmit and receive is enforced by the state
//! here, not by any OS-level lock.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::Serialize;
use tokio::time::Duration;
use tracing::{debug, info, warn};

use crate::band::Freq;
use crate::error::SessionError;
use crate::pipeline::{
    self, PipelineConfig, PipelineHandle, PipelineMode, PipelineSupervisor,
};
use crate::rig::{RigClient, RigLink};
use crate::settings::SettingsStore;

/// Wait before stopping a transmit pipeline so buffered audio finishes
/// playing; stopping the sink mid-buffer produces an audible click.
pub const TX_DRAIN: Duration = Duration::from_millis(1500);

pub type NotifyFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Best-effort notification sink for the reporter bridge. Notify never
/// fails from the caller's point of view; delivery problems are the
/// implementation's to log.
pub trait Reporter: Send {
    fn notify<'a>(&'a mut self, command: &'a str) -> NotifyFuture<'a>;
}

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Uninitialized,
    Idle,
    Transmitting,
    Receiving,
    ShuttingDown,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "Uninitialized"),
            Self::Idle => write!(f, "Idle"),
            Self::Transmitting => write!(f, "Transmitting"),
            Self::Receiving => write!(f, "Receiving"),
            Self::ShuttingDown => write!(f, "ShuttingDown"),
        }
    }
}

/// Snapshot of the session for status queries.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub freq_khz: Option<u32>,
    pub active_pipeline: Option<String>,
    pub fdv_mode: String,
    pub callsign: String,
}

pub struct SessionController<S, L, R> {
    state: SessionState,
    active: Option<PipelineHandle>,
    freq: Option<Freq>,
    supervisor: S,
    rig: RigClient<L>,
    reporter: R,
    settings: SettingsStore,
    pipelines: PipelineConfig,
}

impl<S, L, R> SessionController<S, L, R>
where
    S: PipelineSupervisor,
    L: RigLink,
    R: Reporter,
{
    pub fn new(
        supervisor: S,
        rig: RigClient<L>,
        reporter: R,
        settings: SettingsStore,
        pipelines: PipelineConfig,
    ) -> Self {
        Self {
            state: SessionState::Uninitialized,
            active: None,
            freq: None,
            supervisor,
            rig,
            reporter,
            settings,
            pipelines,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            state: self.state,
            freq_khz: self.freq.map(|f| f.khz),
            active_pipeline: self.active.as_ref().map(|h| h.command_line().to_string()),
            fdv_mode: self.settings.fdv_mode(),
            callsign: self.settings.callsign(),
        }
    }

    /// Prime the radio and unlock mode requests. The rig connections are
    /// already open when the controller is built; a connect failure never
    /// gets this far.
    pub async fn initialize(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Uninitialized {
            return Err(SessionError::TransitionFailure(
                "session already initialized".to_string(),
            ));
        }
        self.rig.send_startup_preset().await?;
        self.state = SessionState::Idle;
        info!("Session initialized");
        Ok(())
    }

    /// Switch to transmit. No-op when already transmitting. A live receive
    /// pipeline is stopped immediately (no drain); settings are read fresh
    /// for the new pipeline.
    pub async fn request_transmit(&mut self) -> Result<(), SessionError> {
        self.ensure_ready("transmit")?;
        if self.state == SessionState::Transmitting {
            debug!("Already transmitting, ignoring TX request");
            return Ok(());
        }
        self.stop_active(Duration::ZERO).await?;

        let input_level = self.settings.input_level();
        let fdv_mode = self.settings.fdv_mode();
        let callsign = self.settings.callsign();
        let stages = pipeline::tx_stages(&self.pipelines, input_level, &fdv_mode, &callsign);
        let handle = self
            .supervisor
            .spawn(PipelineMode::Tx, &stages)
            .map_err(|err| {
                SessionError::TransitionFailure(format!("failed to start TX pipeline: {err}"))
            })?;
        self.active = Some(handle);
        self.state = SessionState::Transmitting;

        self.rig.set_transceive(true).await?;
        info!("Switched to TX");
        self.reporter.notify("TX_ON").await;
        Ok(())
    }

    /// Switch to receive. No-op when already receiving. A live transmit
    /// pipeline gets the drain delay before being stopped.
    pub async fn request_receive(&mut self) -> Result<(), SessionError> {
        self.ensure_ready("receive")?;
        if self.state == SessionState::Receiving {
            debug!("Already receiving, ignoring RX request");
            return Ok(());
        }
        self.stop_active(TX_DRAIN).await?;

        let squelch_level = self.settings.squelch_level();
        let fdv_mode = self.settings.fdv_mode();
        let stages = pipeline::rx_stages(&self.pipelines, &fdv_mode, squelch_level);
        let handle = self
            .supervisor
            .spawn(PipelineMode::Rx, &stages)
            .map_err(|err| {
                SessionError::TransitionFailure(format!("failed to start RX pipeline: {err}"))
            })?;
        self.active = Some(handle);
        self.state = SessionState::Receiving;

        self.rig.set_transceive(false).await?;
        info!("Switched to RX");
        self.reporter.notify("TX_OFF").await;
        Ok(())
    }

    /// Retune the radio. Independent of the transmit/receive mode.
    pub async fn request_frequency(&mut self, freq: Freq) -> Result<(), SessionError> {
        self.ensure_ready("change frequency")?;
        self.rig.set_frequency(freq).await?;
        self.freq = Some(freq);
        self.reporter.notify(&format!("FREQ_CHANGE {}", freq.khz)).await;
        Ok(())
    }

    /// Persist a new FreeDV codec mode. Takes effect on the next pipeline
    /// start, not on a running one. Persistence problems are logged, not
    /// escalated.
    pub async fn save_fdv_mode(&mut self, mode: &str) {
        if let Err(err) = self.settings.set_fdv_mode(mode) {
            warn!("Failed to persist fdvmode: {}", err);
        }
        self.reporter.notify(&format!("MODE_CHANGE {mode}")).await;
    }

    /// Tear the session down. Any live pipeline is stopped on every
    /// shutdown path, signal-triggered ones included.
    pub async fn shutdown(&mut self) -> Result<(), SessionError> {
        if self.state == SessionState::ShuttingDown {
            return Ok(());
        }
        info!("Shutting down session");
        self.state = SessionState::ShuttingDown;
        self.stop_active(Duration::ZERO).await?;
        Ok(())
    }

    async fn stop_active(&mut self, drain: Duration) -> Result<(), SessionError> {
        if let Some(handle) = self.active.take() {
            pipeline::stop_pipeline(&mut self.supervisor, handle, drain).await?;
        }
        Ok(())
    }

    fn ensure_ready(&self, action: &str) -> Result<(), SessionError> {
        match self.state {
            SessionState::Uninitialized => Err(SessionError::TransitionFailure(format!(
                "cannot {action}: session not initialized"
            ))),
            SessionState::ShuttingDown => Err(SessionError::TransitionFailure(format!(
                "cannot {action}: session is shutting down"
            ))),
            _ => Ok(()),
        }
    }
}
