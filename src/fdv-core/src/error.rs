// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::fmt;

/// Fatal failure classes of a PTT session. Every external dependency
/// (radio program, audio device, the two control sockets) is mandatory;
/// there is no retry or degraded mode.
#[derive(Debug)]
pub enum SessionError {
    /// A required external program or audio device is absent at startup.
    StartupPrecondition(String),
    /// One of the two rig control sockets could not be opened.
    ConnectionFailure {
        endpoint: &'static str,
        source: std::io::Error,
    },
    /// A pipeline could not be started, or stopping one failed for a
    /// reason other than the group already being gone.
    TransitionFailure(String),
    /// A write on an established rig socket failed.
    SendFailure {
        endpoint: &'static str,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

pub type SessionResult<T> = Result<T, SessionError>;

impl SessionError {
    /// Process exit code when this error aborts the session.
    pub fn exit_code(&self) -> u8 {
        1
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StartupPrecondition(msg) => write!(f, "startup precondition failed: {msg}"),
            Self::ConnectionFailure { endpoint, source } => {
                write!(f, "failed to connect rig {endpoint} endpoint: {source}")
            }
            Self::TransitionFailure(msg) => write!(f, "pipeline transition failed: {msg}"),
            Self::SendFailure { endpoint, source } => {
                write!(f, "send on rig {endpoint} endpoint failed: {source}")
            }
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ConnectionFailure { source, .. } => Some(source),
            Self::SendFailure { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}
