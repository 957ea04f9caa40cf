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

//! Song metadata as handed over by the song store.

use std::{fmt, path::Path};

use config::{Config, File};
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::key::{self, PitchClass};

/// The musical metadata of a song, as supplied by the song store. Immutable for
/// the duration of a playback session.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SongDescriptor {
    /// The song ID in the song store.
    id: String,
    /// The notated key, e.g. "C", "F#m", "Bb".
    #[serde(default)]
    key: String,
    /// The taal (rhythmic cycle) name.
    #[serde(default)]
    taal: String,
    /// The time signature, e.g. "4/4", "6/8".
    #[serde(default, alias = "timesignature", alias = "time_signature")]
    time_signature: String,
    /// The genre.
    #[serde(default)]
    genre: String,
    /// The tempo in beats per minute, if known.
    #[serde(default, alias = "bpm", alias = "tempo", alias = "tempobpm")]
    tempo_bpm: Option<f64>,
}

impl SongDescriptor {
    /// Creates a new song descriptor.
    pub fn new(
        id: &str,
        key: &str,
        taal: &str,
        time_signature: &str,
        genre: &str,
        tempo_bpm: Option<f64>,
    ) -> SongDescriptor {
        SongDescriptor {
            id: id.to_string(),
            key: key.to_string(),
            taal: taal.to_string(),
            time_signature: time_signature.to_string(),
            genre: genre.to_string(),
            tempo_bpm,
        }
    }

    /// Deserializes a song descriptor from a YAML or JSON file.
    pub fn deserialize(path: &Path) -> Result<SongDescriptor, ConfigError> {
        Ok(Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<SongDescriptor>()?)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn taal(&self) -> &str {
        &self.taal
    }

    pub fn time_signature(&self) -> &str {
        &self.time_signature
    }

    pub fn genre(&self) -> &str {
        &self.genre
    }

    /// Gets the tempo. Non-positive or non-finite values are treated as unknown.
    pub fn tempo_bpm(&self) -> Option<f64> {
        self.tempo_bpm.filter(|bpm| bpm.is_finite() && *bpm > 0.0)
    }

    /// Gets the key the melodic pads should use after transposition.
    pub fn effective_key(&self, transpose_semitones: i32) -> PitchClass {
        key::effective_key(&self.key, transpose_semitones)
    }
}

impl fmt::Display for SongDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (key={}, taal={}, time={}, genre={}, bpm={})",
            self.id,
            self.key,
            self.taal,
            self.time_signature,
            self.genre,
            self.tempo_bpm()
                .map(|bpm| bpm.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        )
    }
}
