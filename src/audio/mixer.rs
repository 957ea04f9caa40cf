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
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{Bus, DecodedBuffer, SourceId, SourceParams};

/// A source that is currently sounding.
struct Voice {
    id: SourceId,
    buffer: DecodedBuffer,
    params: SourceParams,
    /// Fractional frame position in the buffer.
    position: f64,
}

impl Voice {
    /// Adds this voice into the output frame. Returns false once a one-shot
    /// voice has run off the end of its buffer.
    fn mix_into(&mut self, frame: &mut [f32], gain: f32) -> bool {
        let frames = self.buffer.frames();
        if frames == 0 {
            return false;
        }
        if self.position >= frames as f64 {
            if !self.params.looping {
                return false;
            }
            self.position %= frames as f64;
        }

        let source_channels = self.buffer.channel_count() as usize;
        let start = self.position as usize * source_channels;
        let samples = self.buffer.samples();
        for (channel, out) in frame.iter_mut().enumerate() {
            *out += samples[start + channel % source_channels] * gain;
        }

        self.position += self.params.rate.max(0.0) as f64;
        true
    }
}

struct MixerState {
    voices: Vec<Voice>,
    master_gain: f32,
    bus_gains: HashMap<Bus, f32>,
}

/// Mixes active sources into the output stream. Shared between the context
/// and the output callback.
#[derive(Clone)]
pub struct Mixer {
    state: Arc<Mutex<MixerState>>,
}

impl Mixer {
    pub fn new() -> Mixer {
        Mixer {
            state: Arc::new(Mutex::new(MixerState {
                voices: Vec::new(),
                master_gain: 1.0,
                bus_gains: HashMap::new(),
            })),
        }
    }

    pub fn add(&self, id: SourceId, buffer: DecodedBuffer, params: SourceParams) {
        self.state.lock().voices.push(Voice {
            id,
            buffer,
            params,
            position: 0.0,
        });
    }

    pub fn remove(&self, id: SourceId) {
        self.state.lock().voices.retain(|voice| voice.id != id);
    }

    pub fn clear(&self) {
        self.state.lock().voices.clear();
    }

    pub fn set_master_gain(&self, gain: f32) {
        self.state.lock().master_gain = gain;
    }

    pub fn set_bus_gain(&self, bus: Bus, gain: f32) {
        self.state.lock().bus_gains.insert(bus, gain);
    }

    /// Number of voices still sounding.
    pub fn active(&self) -> usize {
        self.state.lock().voices.len()
    }

    /// Renders interleaved output with the given channel count. Finished
    /// voices are dropped.
    pub fn render(&self, output: &mut [f32], channels: usize) {
        output.fill(0.0);
        if channels == 0 {
            return;
        }

        let mut state = self.state.lock();
        let MixerState {
            voices,
            master_gain,
            bus_gains,
        } = &mut *state;

        voices.retain_mut(|voice| {
            let gain = *master_gain * bus_gains.get(&voice.params.bus).copied().unwrap_or(1.0);
            for frame in output.chunks_mut(channels) {
                if !voice.mix_into(frame, gain) {
                    return false;
                }
            }
            true
        });
    }
}

impl Default for Mixer {
    fn default() -> Self {
        Self::new()
    }
}
