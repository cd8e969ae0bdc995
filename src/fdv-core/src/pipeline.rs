// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Audio pipeline supervision.
//!
//! A pipeline is the chain of capture, codec and playback subprocesses for
//! one link direction. The chain runs as a single process group so it can be
//! signaled atomically; signaling only the first stage would leave the
//! downstream stages orphaned reading from a closed pipe.
//!
//! Stages are explicit argv vectors spawned directly, never through a shell,
//! so operator-entered fields like the callsign cannot alter the command.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, Stdio};

use serde::Serialize;
use tokio::time::{self, Duration};
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::DynResult;

/// Link direction a pipeline serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineMode {
    Tx,
    Rx,
}

impl fmt::Display for PipelineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tx => write!(f, "TX"),
            Self::Rx => write!(f, "RX"),
        }
    }
}

/// Reference to a running pipeline. Created by the supervisor on spawn and
/// handed back for stop requests; the session controller treats it as opaque.
#[derive(Debug, Clone)]
pub struct PipelineHandle {
    pgid: i32,
    mode: PipelineMode,
    command_line: String,
}

impl PipelineHandle {
    pub fn new(pgid: i32, mode: PipelineMode, command_line: impl Into<String>) -> Self {
        Self {
            pgid,
            mode,
            command_line: command_line.into(),
        }
    }

    pub fn pgid(&self) -> i32 {
        self.pgid
    }

    pub fn mode(&self) -> PipelineMode {
        self.mode
    }

    pub fn command_line(&self) -> &str {
        &self.command_line
    }
}

/// Seam for pipeline process control, substitutable with a fake in tests.
pub trait PipelineSupervisor: Send {
    /// Spawn the staged pipeline as a new process group. The first stage
    /// becomes group leader before it executes so a later group signal
    /// reaches every stage.
    fn spawn(&mut self, mode: PipelineMode, stages: &[Vec<String>]) -> DynResult<PipelineHandle>;

    /// Stop the whole group. A group that already exited on its own is
    /// treated as success, and the call must return within a bounded time
    /// even when a stage refuses to die politely.
    fn signal_group(&mut self, handle: &PipelineHandle) -> DynResult<()>;
}

/// Stop a pipeline, waiting out `drain` first. Transmit stops pass 1.5 s so
/// the playback buffer empties before the sink dies; receive stops pass zero.
pub async fn stop_pipeline<S: PipelineSupervisor>(
    supervisor: &mut S,
    handle: PipelineHandle,
    drain: Duration,
) -> Result<(), SessionError> {
    if !drain.is_zero() {
        debug!("Draining {} pipeline for {:?} before stop", handle.mode(), drain);
        time::sleep(drain).await;
    }
    supervisor.signal_group(&handle).map_err(|err| {
        SessionError::TransitionFailure(format!(
            "failed to stop {} pipeline group {}: {}",
            handle.mode(),
            handle.pgid(),
            err
        ))
    })
}

/// Grace period for a SIGTERMed group to exit before SIGKILL.
const STOP_GRACE: Duration = Duration::from_millis(500);
const STOP_POLL: Duration = Duration::from_millis(50);

/// Real supervisor backed by OS process groups. There is no liveness
/// monitoring: a pipeline dying on its own goes unnoticed until the next
/// start or stop request.
#[derive(Debug, Default)]
pub struct ProcessGroupSupervisor {
    children: HashMap<i32, Vec<Child>>,
}

impl ProcessGroupSupervisor {
    pub fn new() -> Self {
        Self::default()
    }
}

/// SIGTERM the group and reap its stages. Stages that outlive the grace
/// period get SIGKILL so a stuck stage cannot stall the caller forever.
fn terminate_group(pgid: i32, mut children: Vec<Child>) -> DynResult<()> {
    let rc = unsafe { libc::killpg(pgid, libc::SIGTERM) };
    if rc != 0 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            return Err(format!("killpg({pgid}) failed: {err}").into());
        }
        debug!("Pipeline group {} already gone", pgid);
    }
    let deadline = std::time::Instant::now() + STOP_GRACE;
    loop {
        children.retain_mut(|child| !matches!(child.try_wait(), Ok(Some(_))));
        if children.is_empty() {
            return Ok(());
        }
        if std::time::Instant::now() >= deadline {
            break;
        }
        std::thread::sleep(STOP_POLL);
    }
    warn!("Pipeline group {} ignored SIGTERM, sending SIGKILL", pgid);
    unsafe { libc::killpg(pgid, libc::SIGKILL) };
    for mut child in children {
        let _ = child.wait();
    }
    Ok(())
}

impl PipelineSupervisor for ProcessGroupSupervisor {
    fn spawn(&mut self, mode: PipelineMode, stages: &[Vec<String>]) -> DynResult<PipelineHandle> {
        if stages.is_empty() {
            return Err("pipeline has no stages".into());
        }
        let mut spawned: Vec<Child> = Vec::with_capacity(stages.len());
        let mut upstream: Option<Stdio> = None;
        let mut pgid = 0;
        for (i, stage) in stages.iter().enumerate() {
            let (program, args) = stage.split_first().ok_or("empty pipeline stage")?;
            let mut cmd = Command::new(program);
            cmd.args(args);
            // 0 makes the first stage its own group leader; later stages
            // join the leader's group.
            cmd.process_group(pgid);
            if let Some(stdin) = upstream.take() {
                cmd.stdin(stdin);
            }
            if i + 1 < stages.len() {
                cmd.stdout(Stdio::piped());
            }
            let mut child = match cmd.spawn() {
                Ok(child) => child,
                Err(err) => {
                    // Tear down the stages already running; leaving them
                    // behind would keep the audio devices held.
                    if pgid != 0 {
                        if let Err(stop_err) = terminate_group(pgid, spawned) {
                            warn!("Failed to stop partial pipeline: {}", stop_err);
                        }
                    }
                    return Err(format!("failed to spawn {program}: {err}").into());
                }
            };
            if i == 0 {
                pgid = child.id() as i32;
            }
            upstream = child.stdout.take().map(Stdio::from);
            spawned.push(child);
        }
        let command_line = render_command_line(stages);
        info!("Started {} pipeline (pgid {}): {}", mode, pgid, command_line);
        self.children.insert(pgid, spawned);
        Ok(PipelineHandle::new(pgid, mode, command_line))
    }

    fn signal_group(&mut self, handle: &PipelineHandle) -> DynResult<()> {
        let children = self.children.remove(&handle.pgid()).unwrap_or_default();
        terminate_group(handle.pgid(), children)?;
        info!("Stopped {} pipeline (pgid {})", handle.mode(), handle.pgid());
        Ok(())
    }
}

/// Device and program names used to assemble the audio pipelines.
/// Defaults match the sBitx deployment this tool runs on.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineConfig {
    /// ALSA capture device feeding the encoder (operator microphone).
    pub tx_capture_device: String,
    /// ALSA playback device the encoded audio is played into (radio input).
    pub tx_playback_device: String,
    /// ALSA capture device for receive (radio output).
    pub rx_capture_device: String,
    /// ALSA playback device for decoded receive audio (operator speaker).
    pub rx_playback_device: String,
    /// FreeDV encoder binary.
    pub freedv_tx: String,
    /// FreeDV decoder binary.
    pub freedv_rx: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tx_capture_device: "plughw:CARD=5,DEV=0".to_string(),
            tx_playback_device: "plughw:CARD=2,DEV=0".to_string(),
            rx_capture_device: "plughw:CARD=1,DEV=1".to_string(),
            rx_playback_device: "plughw:CARD=5,DEV=0".to_string(),
            freedv_tx: "./freedv_tx".to_string(),
            freedv_rx: "./freedv_rx".to_string(),
        }
    }
}

/// Transmit chain: capture, gain, encode, play into the radio. The playback
/// buffer trades up to a second of latency against underruns.
pub fn tx_stages(
    cfg: &PipelineConfig,
    input_level_db: i32,
    fdv_mode: &str,
    callsign: &str,
) -> Vec<Vec<String>> {
    vec![
        argv(&[
            "arecord", "-f", "S16_LE", "-c", "1", "-r", "8000", "-D", &cfg.tx_capture_device,
        ]),
        argv(&[
            "sox",
            "-t",
            "raw",
            "-r",
            "8000",
            "-e",
            "signed",
            "-b",
            "16",
            "-c",
            "1",
            "-",
            "-t",
            "raw",
            "-",
            "vol",
            &format!("{input_level_db}dB"),
        ]),
        argv(&[&cfg.freedv_tx, fdv_mode, "--reliabletext", callsign, "-", "-"]),
        argv(&[
            "aplay",
            "-f",
            "S16_LE",
            "-D",
            &cfg.tx_playback_device,
            "--buffer-size=8192",
        ]),
    ]
}

/// Receive chain: capture from the radio, decode with squelch, play out.
pub fn rx_stages(cfg: &PipelineConfig, fdv_mode: &str, squelch_level: i32) -> Vec<Vec<String>> {
    vec![
        argv(&[
            "arecord", "-f", "S16_LE", "-c", "1", "-r", "8000", "-D", &cfg.rx_capture_device,
        ]),
        argv(&[
            &cfg.freedv_rx,
            fdv_mode,
            "--squelch",
            &squelch_level.to_string(),
            "-",
            "-",
            "-",
        ]),
        argv(&["aplay", "-f", "S16_LE", "-D", &cfg.rx_playback_device]),
    ]
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}

fn render_command_line(stages: &[Vec<String>]) -> String {
    stages
        .iter()
        .map(|stage| stage.join(" "))
        .collect::<Vec<_>>()
        .join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tx_stages_keep_operator_fields_as_single_args() {
        let cfg = PipelineConfig::default();
        // A hostile callsign stays one argv entry; nothing interprets it.
        let stages = tx_stages(&cfg, 3, "700D", "N0CALL; rm -rf /");
        assert_eq!(stages.len(), 4);
        assert_eq!(stages[1].last().unwrap(), "3dB");
        assert_eq!(stages[2][0], "./freedv_tx");
        assert_eq!(stages[2][3], "N0CALL; rm -rf /");
    }

    #[test]
    fn rx_stages_carry_squelch() {
        let cfg = PipelineConfig::default();
        let stages = rx_stages(&cfg, "700E", -5);
        assert_eq!(stages.len(), 3);
        assert_eq!(stages[1][1], "700E");
        assert_eq!(stages[1][3], "-5");
    }

    #[test]
    fn command_line_renders_as_pipe_chain() {
        let stages = vec![argv(&["a", "1"]), argv(&["b"])];
        assert_eq!(render_command_line(&stages), "a 1 | b");
    }

    #[test]
    fn signal_group_tolerates_missing_group() {
        // Probe for a pid that definitely does not exist.
        let mut candidate = unsafe { libc::getpid() } + 10_000;
        for _ in 0..1000 {
            let rc = unsafe { libc::kill(candidate, 0) };
            if rc != 0
                && std::io::Error::last_os_error().raw_os_error() == Some(libc::ESRCH)
            {
                break;
            }
            candidate += 1;
        }
        let mut supervisor = ProcessGroupSupervisor::new();
        let handle = PipelineHandle::new(candidate, PipelineMode::Rx, "gone");
        assert!(supervisor.signal_group(&handle).is_ok());
    }

    #[test]
    fn spawn_runs_stages_as_one_group() {
        let mut supervisor = ProcessGroupSupervisor::new();
        let stages = vec![argv(&["sleep", "30"]), argv(&["cat"])];
        let handle = supervisor.spawn(PipelineMode::Tx, &stages).unwrap();
        assert!(handle.pgid() > 0);
        assert_eq!(handle.mode(), PipelineMode::Tx);
        assert_eq!(handle.command_line(), "sleep 30 | cat");
        assert!(supervisor.signal_group(&handle).is_ok());
        // Idempotent: the group is gone now, which still counts as success.
        assert!(supervisor.signal_group(&handle).is_ok());
    }

    #[test]
    fn spawn_missing_program_is_an_error() {
        let mut supervisor = ProcessGroupSupervisor::new();
        let stages = vec![argv(&["definitely-not-a-real-binary-xyz"])];
        assert!(supervisor.spawn(PipelineMode::Rx, &stages).is_err());
    }

    fn process_with_arg_running(arg: &str) -> bool {
        let Ok(entries) = std::fs::read_dir("/proc") else {
            return false;
        };
        for entry in entries.flatten() {
            if let Ok(cmdline) = std::fs::read_to_string(entry.path().join("cmdline")) {
                if cmdline.split('\0').any(|a| a == arg) {
                    return true;
                }
            }
        }
        false
    }

    #[test]
    fn failed_spawn_stops_already_started_stages() {
        let mut supervisor = ProcessGroupSupervisor::new();
        // Unique sleep argument so the process table can be checked for it.
        let marker = format!("31234.{}", std::process::id());
        let stages = vec![
            argv(&["sleep", &marker]),
            argv(&["definitely-not-a-real-binary-xyz"]),
        ];
        assert!(supervisor.spawn(PipelineMode::Tx, &stages).is_err());
        assert!(
            !process_with_arg_running(&marker),
            "first stage left running after partial spawn failure"
        );
    }

    #[test]
    fn sigterm_ignoring_stage_is_killed_after_grace() {
        let mut supervisor = ProcessGroupSupervisor::new();
        let stages = vec![argv(&["sh", "-c", "trap '' TERM; sleep 30"])];
        let handle = supervisor.spawn(PipelineMode::Rx, &stages).unwrap();
        // Give the shell a moment to install the trap.
        std::thread::sleep(std::time::Duration::from_millis(200));

        let start = std::time::Instant::now();
        assert!(supervisor.signal_group(&handle).is_ok());
        assert!(start.elapsed() < std::time::Duration::from_secs(5));
    }
}
