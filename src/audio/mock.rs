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
use tracing::debug;

use super::{AudioError, Bus, DecodedBuffer, SourceId, SourceParams};

/// Everything the mock context has been asked to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Resumed,
    MasterGain(f32),
    BusGain(Bus, f32),
    Started {
        id: SourceId,
        bus: Bus,
        looping: bool,
        frames: usize,
        rate: f32,
    },
    Stopped(SourceId),
    Closed,
}

struct State {
    sample_rate: u32,
    running: bool,
    closed: bool,
    blocked: Option<String>,
    next_id: SourceId,
    master_gain: f32,
    bus_gains: HashMap<Bus, f32>,
    /// Active sources and the bus they play on.
    active: HashMap<SourceId, (Bus, usize)>,
    max_rhythm: usize,
    calls: Vec<Call>,
}

/// A mock audio context that records calls instead of producing sound. Clones
/// share state, so tests can keep a handle while the engine owns another.
#[derive(Clone)]
pub struct Context {
    name: String,
    state: Arc<Mutex<State>>,
}

impl Context {
    pub fn new(name: &str) -> Context {
        Context {
            name: name.to_string(),
            state: Arc::new(Mutex::new(State {
                sample_rate: 44100,
                running: false,
                closed: false,
                blocked: None,
                next_id: 0,
                master_gain: 1.0,
                bus_gains: HashMap::new(),
                active: HashMap::new(),
                max_rhythm: 0,
                calls: Vec::new(),
            })),
        }
    }

    /// Runs the context at a different output rate.
    pub fn with_sample_rate(self, sample_rate: u32) -> Context {
        self.state.lock().sample_rate = sample_rate;
        self
    }

    /// Makes resume fail, as a platform does when output needs a user gesture.
    pub fn block(&self, reason: &str) {
        self.state.lock().blocked = Some(reason.to_string());
    }

    pub fn unblock(&self) {
        self.state.lock().blocked = None;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn master_gain(&self) -> f32 {
        self.state.lock().master_gain
    }

    pub fn bus_gain(&self, bus: Bus) -> Option<f32> {
        self.state.lock().bus_gains.get(&bus).copied()
    }

    /// Frame counts of the sources currently playing on the bus.
    pub fn active_on(&self, bus: Bus) -> Vec<usize> {
        let mut frames: Vec<usize> = self
            .state
            .lock()
            .active
            .values()
            .filter(|(b, _)| *b == bus)
            .map(|(_, frames)| *frames)
            .collect();
        frames.sort_unstable();
        frames
    }

    /// The most rhythm sources that were ever active at once.
    pub fn max_concurrent_rhythm(&self) -> usize {
        self.state.lock().max_rhythm
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

impl super::AudioContext for Context {
    fn resume(&mut self) -> Result<u32, AudioError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(AudioError::Closed);
        }
        if state.running {
            return Ok(state.sample_rate);
        }
        if let Some(reason) = &state.blocked {
            return Err(AudioError::Blocked(reason.clone()));
        }
        debug!(device = self.name, "Mock context resumed");
        state.running = true;
        state.calls.push(Call::Resumed);
        Ok(state.sample_rate)
    }

    fn is_running(&self) -> bool {
        let state = self.state.lock();
        state.running && !state.closed
    }

    fn sample_rate(&self) -> Option<u32> {
        let state = self.state.lock();
        state.running.then_some(state.sample_rate)
    }

    fn set_master_gain(&mut self, gain: f32) {
        let mut state = self.state.lock();
        state.master_gain = gain;
        state.calls.push(Call::MasterGain(gain));
    }

    fn set_bus_gain(&mut self, bus: Bus, gain: f32) {
        let mut state = self.state.lock();
        state.bus_gains.insert(bus, gain);
        state.calls.push(Call::BusGain(bus, gain));
    }

    fn start_source(
        &mut self,
        buffer: &DecodedBuffer,
        params: SourceParams,
    ) -> Result<SourceId, AudioError> {
        let mut state = self.state.lock();
        if !state.running || state.closed {
            return Err(AudioError::NotRunning);
        }
        state.next_id += 1;
        let id = state.next_id;
        state.active.insert(id, (params.bus, buffer.frames()));
        let rhythm = state
            .active
            .values()
            .filter(|(bus, _)| *bus == Bus::Rhythm)
            .count();
        state.max_rhythm = state.max_rhythm.max(rhythm);
        state.calls.push(Call::Started {
            id,
            bus: params.bus,
            looping: params.looping,
            frames: buffer.frames(),
            rate: params.rate,
        });
        Ok(id)
    }

    fn stop_source(&mut self, id: SourceId) {
        let mut state = self.state.lock();
        if state.active.remove(&id).is_some() {
            state.calls.push(Call::Stopped(id));
        }
    }

    fn close(&mut self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        state.running = false;
        state.active.clear();
        state.calls.push(Call::Closed);
    }
}
