// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Persisted operator settings.
//!
//! Settings live in a flat `key=value` text file shared with other tools on
//! the radio, so the format is a contract: one `key=value` pair per line,
//! unrecognized keys preserved, defaults seeded when the file is absent.
//! The session reads settings fresh at the moment a pipeline starts; an
//! edit therefore applies to the next start, never to a running pipeline.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::warn;

pub const DEFAULT_FDV_MODE: &str = "700D";
pub const DEFAULT_CALLSIGN: &str = "N0CALL";
pub const DEFAULT_GRID_SQUARE: &str = "AA00ab";
pub const DEFAULT_SQUELCH_LEVEL: i32 = -5;
pub const DEFAULT_INPUT_LEVEL: i32 = 1;

/// Handle to the settings file. Cheap to clone; holds no cached state.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the file with default values when it does not exist yet.
    pub fn seed_defaults(&self, version: &str) -> io::Result<()> {
        if self.path.exists() {
            return Ok(());
        }
        let contents = format!(
            "fdvmode={DEFAULT_FDV_MODE}\n\
             callsign={DEFAULT_CALLSIGN}\n\
             grid_square={DEFAULT_GRID_SQUARE}\n\
             squelch_level={DEFAULT_SQUELCH_LEVEL}\n\
             input_level={DEFAULT_INPUT_LEVEL}\n\
             start_mode=-1\n\
             version={version}\n\
             message=--\n"
        );
        fs::write(&self.path, contents)
    }

    /// Load the value for `key`, falling back to `default` when the key or
    /// the file itself is missing.
    pub fn load(&self, key: &str, default: &str) -> String {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) => {
                warn!("Failed to read settings {}: {}", self.path.display(), err);
                return default.to_string();
            }
        };
        for line in text.lines() {
            if let Some((file_key, value)) = line.split_once('=') {
                if file_key == key {
                    return value.to_string();
                }
            }
        }
        default.to_string()
    }

    /// Save `key=value`, rewriting the existing line or appending a new one.
    /// Lines for other keys are carried over untouched.
    pub fn save(&self, key: &str, value: &str) -> io::Result<()> {
        let text = fs::read_to_string(&self.path).unwrap_or_default();
        let mut lines: Vec<String> = Vec::new();
        let mut found = false;
        for line in text.lines() {
            match line.split_once('=') {
                Some((file_key, _)) if file_key == key => {
                    lines.push(format!("{key}={value}"));
                    found = true;
                }
                _ => lines.push(line.to_string()),
            }
        }
        if !found {
            lines.push(format!("{key}={value}"));
        }
        fs::write(&self.path, lines.join("\n") + "\n")
    }

    pub fn fdv_mode(&self) -> String {
        self.load("fdvmode", DEFAULT_FDV_MODE)
    }

    pub fn callsign(&self) -> String {
        self.load("callsign", DEFAULT_CALLSIGN)
    }

    pub fn grid_square(&self) -> String {
        self.load("grid_square", DEFAULT_GRID_SQUARE)
    }

    pub fn squelch_level(&self) -> i32 {
        self.load_int("squelch_level", DEFAULT_SQUELCH_LEVEL)
    }

    pub fn input_level(&self) -> i32 {
        self.load_int("input_level", DEFAULT_INPUT_LEVEL)
    }

    pub fn set_fdv_mode(&self, mode: &str) -> io::Result<()> {
        self.save("fdvmode", mode)
    }

    pub fn set_callsign(&self, callsign: &str) -> io::Result<()> {
        self.save("callsign", callsign)
    }

    pub fn set_grid_square(&self, grid_square: &str) -> io::Result<()> {
        self.save("grid_square", grid_square)
    }

    pub fn set_squelch_level(&self, level: i32) -> io::Result<()> {
        self.save("squelch_level", &level.to_string())
    }

    pub fn set_input_level(&self, level: i32) -> io::Result<()> {
        self.save("input_level", &level.to_string())
    }

    pub fn set_version(&self, version: &str) -> io::Result<()> {
        self.save("version", version)
    }

    fn load_int(&self, key: &str, default: i32) -> i32 {
        let raw = self.load(key, &default.to_string());
        raw.parse().unwrap_or_else(|_| {
            warn!("Settings key {} holds non-numeric value '{}'", key, raw);
            default
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> SettingsStore {
        SettingsStore::new(dir.path().join("config.ini"))
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        s.save("callsign", "W2JON").unwrap();
        assert_eq!(s.load("callsign", "N0CALL"), "W2JON");
    }

    #[test]
    fn load_missing_key_returns_default() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        s.save("callsign", "W2JON").unwrap();
        assert_eq!(s.load("grid_square", "AA00ab"), "AA00ab");
    }

    #[test]
    fn load_missing_file_returns_default() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        assert_eq!(s.load("fdvmode", "700D"), "700D");
        assert_eq!(s.squelch_level(), -5);
    }

    #[test]
    fn save_rewrites_in_place_and_preserves_other_keys() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        s.save("fdvmode", "700D").unwrap();
        s.save("callsign", "W2JON").unwrap();
        s.save("fdvmode", "700E").unwrap();
        assert_eq!(s.fdv_mode(), "700E");
        assert_eq!(s.callsign(), "W2JON");
        let text = std::fs::read_to_string(s.path()).unwrap();
        assert_eq!(text.matches("fdvmode=").count(), 1);
    }

    #[test]
    fn seed_defaults_creates_file_once() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        s.seed_defaults("fdv-ptt test").unwrap();
        assert_eq!(s.fdv_mode(), "700D");
        assert_eq!(s.callsign(), "N0CALL");
        assert_eq!(s.input_level(), 1);
        assert_eq!(s.load("message", ""), "--");

        // A second seed must not clobber edits.
        s.set_callsign("W2JON").unwrap();
        s.seed_defaults("fdv-ptt test").unwrap();
        assert_eq!(s.callsign(), "W2JON");
    }

    #[test]
    fn non_numeric_level_falls_back_to_default() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        s.save("input_level", "loud").unwrap();
        assert_eq!(s.input_level(), 1);
    }
}
