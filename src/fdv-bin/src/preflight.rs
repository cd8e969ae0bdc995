// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Startup environment checks.
//!
//! Every external dependency is mandatory: the radio control program must
//! already be running and the capture card must be registered with ALSA.
//! A missing one is a user-visible error that exits with code 1.

use std::fs;
use std::path::Path;

use fdv_core::SessionError;

/// True when a process with the given command name is running.
pub fn program_running(name: &str) -> bool {
    let Ok(entries) = fs::read_dir("/proc") else {
        return false;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let is_pid = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.bytes().all(|b| b.is_ascii_digit()));
        if !is_pid {
            continue;
        }
        if let Ok(comm) = fs::read_to_string(path.join("comm")) {
            if comm.trim_end() == name {
                return true;
            }
        }
    }
    false
}

/// True when the ALSA card is present.
pub fn audio_device_present(card: &str) -> bool {
    Path::new("/proc/asound").join(card).exists()
}

pub fn check(radio_program: &str, capture_card: &str) -> Result<(), SessionError> {
    if !program_running(radio_program) {
        return Err(SessionError::StartupPrecondition(format!(
            "{radio_program} is not running; start it and try again"
        )));
    }
    if !audio_device_present(capture_card) {
        return Err(SessionError::StartupPrecondition(format!(
            "audio device {capture_card} not found; connect the USB audio device and try again"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_process_is_found() {
        let comm = std::fs::read_to_string("/proc/self/comm").unwrap();
        assert!(program_running(comm.trim_end()));
    }

    #[test]
    fn absent_program_is_not_found() {
        assert!(!program_running("definitely-not-a-real-program-xyz"));
    }

    #[test]
    fn absent_audio_card_is_not_present() {
        assert!(!audio_device_present("card-that-does-not-exist"));
    }
}
