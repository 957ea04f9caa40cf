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

//! The audio output graph the engine plays through.
//!
//! An [`AudioContext`] is locked until [`AudioContext::resume`] succeeds. Only
//! then is the output sample rate known, which is why nothing can be decoded
//! before the first user gesture.

use std::fmt;

use crate::assets::InstrumentType;
use crate::config;

pub mod buffer;
pub mod cpal;
pub mod decode;
pub mod mixer;
pub mod mock;

pub use self::cpal::list_devices;
pub use buffer::DecodedBuffer;
pub use decode::{decode_audio, DecodeError};

/// Identifies a started source within a context.
pub type SourceId = u64;

/// Gain groups in the output graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bus {
    Rhythm,
    Melodic(InstrumentType),
}

impl fmt::Display for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bus::Rhythm => write!(f, "rhythm"),
            Bus::Melodic(instrument) => write!(f, "{}", instrument),
        }
    }
}

/// How a source should be played.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceParams {
    pub bus: Bus,
    /// Loop the buffer until stopped instead of playing it once.
    pub looping: bool,
    /// Playback rate multiplier. 1.0 is the recorded speed.
    pub rate: f32,
}

#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("no audio output device available")]
    NoDevice,

    #[error("audio device error: {0}")]
    Device(String),

    #[error("audio output was blocked: {0}")]
    Blocked(String),

    #[error("audio context is not running")]
    NotRunning,

    #[error("audio context has been closed")]
    Closed,
}

pub trait AudioContext: Send {
    /// Unlocks the context and starts output. Returns the output sample rate.
    /// Calling this on a running context is a no-op.
    fn resume(&mut self) -> Result<u32, AudioError>;

    /// True once the context has been unlocked and not closed.
    fn is_running(&self) -> bool;

    /// The output sample rate, known only once the context is running.
    fn sample_rate(&self) -> Option<u32>;

    /// Sets the gain applied to everything the context outputs.
    fn set_master_gain(&mut self, gain: f32);

    /// Sets the gain of a single bus.
    fn set_bus_gain(&mut self, bus: Bus, gain: f32);

    /// Starts playing the buffer immediately.
    fn start_source(
        &mut self,
        buffer: &DecodedBuffer,
        params: SourceParams,
    ) -> Result<SourceId, AudioError>;

    /// Stops a source. Stopping an unknown or finished source does nothing.
    fn stop_source(&mut self, id: SourceId);

    /// Stops everything and releases the output. The context can't be resumed again.
    fn close(&mut self);
}

/// Gets the audio context for the configured device. The context stays locked
/// until resumed.
pub fn get_context(config: &config::Audio) -> Box<dyn AudioContext> {
    if config.is_mock() {
        return Box::new(mock::Context::new(config.device()));
    }
    Box::new(cpal::Context::new(config.device()))
}
