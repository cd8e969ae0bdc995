// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Best-effort bridge to the FreeDV Reporter helper.
//!
//! The helper is a separate process that relays session events to the
//! qso.freedv.org reporter site. This crate spawns and tears down that
//! helper, and delivers fire-and-forget notifications to it over a loopback
//! socket. Nothing here can fail the session: a missing or broken helper is
//! logged and otherwise ignored.

use std::io;
use std::os::unix::process::CommandExt;
use std::process::{Child, Command};

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use fdv_core::session::{NotifyFuture, Reporter};

/// Default loopback endpoint the helper listens on.
pub const DEFAULT_NOTIFY_ADDR: &str = "127.0.0.1:50007";

/// Fire-and-forget notification sender. Each notification opens a fresh
/// connection, writes one ASCII command and closes; the absence of a
/// listener is tolerated.
#[derive(Debug, Clone)]
pub struct Notifier {
    addr: String,
}

impl Notifier {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    async fn send(&self, command: &str) {
        match TcpStream::connect(&self.addr).await {
            Ok(mut stream) => {
                if let Err(err) = stream.write_all(command.as_bytes()).await {
                    warn!("Reporter notification '{}' failed: {}", command, err);
                } else {
                    debug!("Reporter notified: {}", command);
                }
            }
            Err(err) => {
                warn!("Reporter bridge unreachable at {}: {}", self.addr, err);
            }
        }
    }
}

impl Reporter for Notifier {
    fn notify<'a>(&'a mut self, command: &'a str) -> NotifyFuture<'a> {
        Box::pin(self.send(command))
    }
}

/// The reporter helper subprocess, run in its own process group so it can be
/// torn down as a unit at shutdown.
#[derive(Debug, Default)]
pub struct ReporterBridge {
    child: Option<Child>,
}

impl ReporterBridge {
    /// Start the helper. Spawn failure is left to the caller: without the
    /// helper, session events never reach the reporter site.
    pub fn spawn(argv: &[String]) -> io::Result<Self> {
        let (program, args) = argv.split_first().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "reporter command is empty")
        })?;
        let child = Command::new(program).args(args).process_group(0).spawn()?;
        info!("Started reporter bridge '{}' (pid {})", program, child.id());
        Ok(Self { child: Some(child) })
    }

    /// SIGTERM the helper's group and reap it. A group that already exited
    /// is fine.
    pub fn terminate(&mut self) {
        if let Some(mut child) = self.child.take() {
            let pgid = child.id() as i32;
            let rc = unsafe { libc::killpg(pgid, libc::SIGTERM) };
            if rc != 0 {
                let err = io::Error::last_os_error();
                if err.raw_os_error() != Some(libc::ESRCH) {
                    warn!("Failed to signal reporter bridge group {}: {}", pgid, err);
                }
            }
            let _ = child.wait();
            info!("Reporter bridge terminated (pid {})", pgid);
        }
    }
}

impl Drop for ReporterBridge {
    fn drop(&mut self) {
        self.terminate();
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    use super::*;

    #[tokio::test]
    async fn notify_delivers_command_bytes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mut notifier = Notifier::new(addr.to_string());

        let accept = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = String::new();
            stream.read_to_string(&mut buf).await.unwrap();
            buf
        });

        notifier.notify("TX_ON").await;
        assert_eq!(accept.await.unwrap(), "TX_ON");
    }

    #[tokio::test]
    async fn notify_without_listener_is_silent() {
        // Bind then drop to get an address nothing listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut notifier = Notifier::new(addr.to_string());
        notifier.notify("FREQ_CHANGE 14236").await;
    }

    #[test]
    fn bridge_spawn_and_terminate() {
        let argv = vec!["sleep".to_string(), "30".to_string()];
        let mut bridge = ReporterBridge::spawn(&argv).unwrap();
        bridge.terminate();
        // Second terminate is a no-op.
        bridge.terminate();
    }

    #[test]
    fn bridge_rejects_empty_command() {
        assert!(ReporterBridge::spawn(&[]).is_err());
    }
}
