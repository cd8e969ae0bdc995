// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Band plan for FreeDV operation on the sBitx.
//!
//! The radio's command interpreter takes frequencies in kHz and a mode
//! selector that is `LSB` on a handful of voice-net channels and `DIGITAL`
//! everywhere else. The passband is fixed around a 1500 Hz pitch no matter
//! where the dial sits.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Audio passband center for FreeDV operation.
pub const PITCH_HZ: u32 = 1500;
/// Low passband shoulder.
pub const FILTER_LOW_HZ: u32 = 900;
/// High passband shoulder.
pub const FILTER_HIGH_HZ: u32 = 2100;

/// Channels that run LSB instead of DIGITAL.
const LSB_CHANNELS_KHZ: [u32; 8] = [1997, 3625, 3643, 3693, 3697, 3850, 7177, 7197];

/// Operating frequency in kHz, the unit the radio's text protocol speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Freq {
    pub khz: u32,
}

impl fmt::Display for Freq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} kHz", self.khz)
    }
}

/// Radio mode selected for a given frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RadioMode {
    Lsb,
    Digital,
}

impl RadioMode {
    /// Mode for a frequency; a numeric lookup, deliberately not a match on
    /// the textual rendering of the frequency.
    pub fn for_freq(freq: Freq) -> Self {
        if LSB_CHANNELS_KHZ.contains(&freq.khz) {
            Self::Lsb
        } else {
            Self::Digital
        }
    }
}

impl fmt::Display for RadioMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lsb => write!(f, "LSB"),
            Self::Digital => write!(f, "DIGITAL"),
        }
    }
}

/// FreeDV calling channels by band, as offered by the band selector.
pub fn band_channels() -> &'static [(&'static str, &'static [u32])] {
    &[
        ("80m", &[3625, 3643, 3693, 3697, 3850]),
        ("40m", &[7177, 7197]),
        ("20m", &[14236, 14240]),
        ("17m", &[18118]),
        ("15m", &[21313]),
        ("12m", &[24933]),
        ("10m", &[28330, 28720]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lsb_channels_map_to_lsb() {
        for khz in [1997, 3625, 3643, 3693, 3697, 3850, 7177, 7197] {
            assert_eq!(RadioMode::for_freq(Freq { khz }), RadioMode::Lsb, "{khz}");
        }
    }

    #[test]
    fn other_channels_map_to_digital() {
        for khz in [14236, 14240, 18118, 21313, 24933, 28330, 28720, 7178] {
            assert_eq!(
                RadioMode::for_freq(Freq { khz }),
                RadioMode::Digital,
                "{khz}"
            );
        }
    }

    #[test]
    fn mode_renders_radio_keywords() {
        assert_eq!(RadioMode::Lsb.to_string(), "LSB");
        assert_eq!(RadioMode::Digital.to_string(), "DIGITAL");
    }
}
