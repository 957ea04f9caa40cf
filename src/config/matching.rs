// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use serde::Deserialize;

const DEFAULT_BASE_WEIGHT: u32 = 10;
const DEFAULT_GENRE_WEIGHT: u32 = 5;
const DEFAULT_TEMPO_WEIGHT: u32 = 3;
const DEFAULT_COMPLETE_WEIGHT: u32 = 2;

const DEFAULT_SLOW_BELOW_BPM: f64 = 80.0;
const DEFAULT_FAST_ABOVE_BPM: f64 = 120.0;

/// A YAML representation of the loop matching rules.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Matching {
    #[serde(default)]
    weights: MatchWeights,
    #[serde(default)]
    tempo: TempoThresholds,
}

impl Matching {
    pub fn new(weights: MatchWeights, tempo: TempoThresholds) -> Matching {
        Matching { weights, tempo }
    }

    pub fn weights(&self) -> &MatchWeights {
        &self.weights
    }

    pub fn tempo(&self) -> &TempoThresholds {
        &self.tempo
    }
}

/// Points awarded to an eligible loop set.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct MatchWeights {
    /// Awarded for meeting the required taal and time signature conditions.
    base: Option<u32>,
    /// Awarded when the genre matches.
    genre: Option<u32>,
    /// Awarded when the tempo category matches.
    tempo: Option<u32>,
    /// Awarded when the set has all three loops and fills.
    complete: Option<u32>,
}

impl MatchWeights {
    pub fn new(base: u32, genre: u32, tempo: u32, complete: u32) -> MatchWeights {
        MatchWeights {
            base: Some(base),
            genre: Some(genre),
            tempo: Some(tempo),
            complete: Some(complete),
        }
    }

    pub fn base(&self) -> u32 {
        self.base.unwrap_or(DEFAULT_BASE_WEIGHT)
    }

    pub fn genre(&self) -> u32 {
        self.genre.unwrap_or(DEFAULT_GENRE_WEIGHT)
    }

    pub fn tempo(&self) -> u32 {
        self.tempo.unwrap_or(DEFAULT_TEMPO_WEIGHT)
    }

    pub fn complete(&self) -> u32 {
        self.complete.unwrap_or(DEFAULT_COMPLETE_WEIGHT)
    }
}

/// Tempo bucket boundaries. A tempo below `slow_below_bpm` is slow, above
/// `fast_above_bpm` is fast, anything else is medium.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct TempoThresholds {
    slow_below_bpm: Option<f64>,
    fast_above_bpm: Option<f64>,
}

impl TempoThresholds {
    pub fn slow_below_bpm(&self) -> f64 {
        self.slow_below_bpm.unwrap_or(DEFAULT_SLOW_BELOW_BPM)
    }

    pub fn fast_above_bpm(&self) -> f64 {
        self.fast_above_bpm.unwrap_or(DEFAULT_FAST_ABOVE_BPM)
    }
}
