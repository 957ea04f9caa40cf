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
use std::{path::Path, time::Duration};

use config::{Config, File};
use duration_string::DurationString;
use serde::Deserialize;

use super::audio::Audio;
use super::error::ConfigError;
use super::matching::Matching;

const DEFAULT_VOLUME: f32 = 0.8;
const DEFAULT_MELODIC_VOLUME: f32 = 0.6;
const DEFAULT_MIN_PLAYBACK_RATE: f32 = 0.5;
const DEFAULT_MAX_PLAYBACK_RATE: f32 = 2.0;
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// The configuration for the pad player.
#[derive(Deserialize, Clone, Debug)]
pub struct Player {
    /// Where the loop catalog lives. Either an http(s) URL or a local path.
    catalog_url: String,
    /// Prefix joined with each catalog filename to form a loop URL.
    loops_base_url: String,
    /// URL template for melodic samples, with {instrument} and {key} placeholders.
    melodic_url_template: String,
    /// The audio output configuration.
    #[serde(default)]
    audio: Audio,
    /// Output volume (0.0 to 1.0).
    volume: Option<f32>,
    /// Melodic pad volume (0.0 to 1.0).
    melodic_volume: Option<f32>,
    /// Whether switching loops queues a fill first.
    auto_fill: Option<bool>,
    /// Bounds for the playback rate multiplier.
    #[serde(default)]
    playback_rate: PlaybackRate,
    /// HTTP client settings.
    #[serde(default)]
    http: Http,
    /// Loop matching rules.
    #[serde(default)]
    matching: Matching,
}

/// Bounds for the playback rate multiplier.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct PlaybackRate {
    min: Option<f32>,
    max: Option<f32>,
}

/// HTTP client settings.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Http {
    /// Request timeout, e.g. "10s" or "500ms".
    timeout: Option<String>,
}

impl Player {
    /// Creates a new player configuration with defaults for everything but the URLs.
    pub fn new(catalog_url: &str, loops_base_url: &str, melodic_url_template: &str) -> Player {
        Player {
            catalog_url: catalog_url.to_string(),
            loops_base_url: loops_base_url.to_string(),
            melodic_url_template: melodic_url_template.to_string(),
            audio: Audio::default(),
            volume: None,
            melodic_volume: None,
            auto_fill: None,
            playback_rate: PlaybackRate::default(),
            http: Http::default(),
            matching: Matching::default(),
        }
    }

    /// Parses and validates a player configuration from a YAML file.
    pub fn deserialize(path: &Path) -> Result<Player, ConfigError> {
        let player = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Player>()?;
        player.validate()?;
        Ok(player)
    }

    /// Checks values that serde can't.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.melodic_url_template.contains("{key}") {
            return Err(ConfigError::Invalid {
                field: "melodic_url_template",
                reason: "must contain a {key} placeholder".to_string(),
            });
        }
        for (field, value) in [("volume", self.volume), ("melodic_volume", self.melodic_volume)] {
            if let Some(value) = value {
                if !(0.0..=1.0).contains(&value) {
                    return Err(ConfigError::Invalid {
                        field,
                        reason: format!("{} is outside 0.0..=1.0", value),
                    });
                }
            }
        }
        let (min, max) = self.playback_rate_bounds();
        if !(min > 0.0 && min <= max) {
            return Err(ConfigError::Invalid {
                field: "playback_rate",
                reason: format!("invalid bounds {}..={}", min, max),
            });
        }
        self.http_timeout()?;
        Ok(())
    }

    pub fn catalog_url(&self) -> &str {
        &self.catalog_url
    }

    pub fn loops_base_url(&self) -> &str {
        &self.loops_base_url
    }

    pub fn melodic_url_template(&self) -> &str {
        &self.melodic_url_template
    }

    pub fn audio(&self) -> &Audio {
        &self.audio
    }

    pub fn volume(&self) -> f32 {
        self.volume.unwrap_or(DEFAULT_VOLUME)
    }

    pub fn melodic_volume(&self) -> f32 {
        self.melodic_volume.unwrap_or(DEFAULT_MELODIC_VOLUME)
    }

    pub fn auto_fill(&self) -> bool {
        self.auto_fill.unwrap_or(true)
    }

    /// The (min, max) playback rate multiplier.
    pub fn playback_rate_bounds(&self) -> (f32, f32) {
        (
            self.playback_rate.min.unwrap_or(DEFAULT_MIN_PLAYBACK_RATE),
            self.playback_rate.max.unwrap_or(DEFAULT_MAX_PLAYBACK_RATE),
        )
    }

    pub fn http_timeout(&self) -> Result<Duration, ConfigError> {
        match &self.http.timeout {
            Some(timeout) => DurationString::from_string(timeout.clone())
                .map(Into::into)
                .map_err(|e| ConfigError::Invalid {
                    field: "http.timeout",
                    reason: e.to_string(),
                }),
            None => Ok(DEFAULT_HTTP_TIMEOUT),
        }
    }

    pub fn matching(&self) -> &Matching {
        &self.matching
    }
}
