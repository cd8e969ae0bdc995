// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

pub mod band;
pub mod error;
pub mod pipeline;
pub mod rig;
pub mod session;
pub mod settings;

pub type DynResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub use band::{Freq, RadioMode};
pub use error::{SessionError, SessionResult};
pub use pipeline::{
    PipelineConfig, PipelineHandle, PipelineMode, PipelineSupervisor, ProcessGroupSupervisor,
};
pub use rig::{RigClient, RigLink, TcpRigLink};
pub use session::{Reporter, SessionController, SessionState, SessionStatus};
pub use settings::SettingsStore;
