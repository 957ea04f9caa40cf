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
use std::fmt;

use crossbeam_channel::{Receiver, Sender};

use crate::assets::InstrumentType;
use crate::catalog::PadName;

/// The lifecycle state of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Nothing is loaded.
    Idle,
    /// A loop set is loaded but not playing.
    Loaded,
    /// A rhythm pad is sounding.
    Playing,
    /// Playback was stopped by the user.
    Paused,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Idle => "idle",
            EngineState::Loaded => "loaded",
            EngineState::Playing => "playing",
            EngineState::Paused => "paused",
        };
        write!(f, "{}", name)
    }
}

/// Everything the engine reports to its host. Events are sent synchronously
/// with the state change that caused them.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    StateChanged(EngineState),
    /// The current loop changed.
    LoopChange(PadName),
    /// A pad started sounding.
    PadActive(PadName),
    /// A pad was queued for the next loop boundary.
    PadQueued(PadName),
    MelodicPadToggle {
        instrument: InstrumentType,
        playing: bool,
    },
    MelodicError {
        instrument: InstrumentType,
        error: String,
    },
    Error(String),
}

/// Fans events out to every live subscriber.
#[derive(Default)]
pub struct Subscribers {
    senders: Vec<Sender<EngineEvent>>,
}

impl Subscribers {
    pub fn subscribe(&mut self) -> Receiver<EngineEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.senders.push(tx);
        rx
    }

    /// Sends the event to every subscriber, forgetting the ones that hung up.
    pub fn emit(&mut self, event: EngineEvent) {
        self.senders.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dropped_subscribers_are_forgotten() {
        let mut subscribers = Subscribers::default();
        let kept = subscribers.subscribe();
        drop(subscribers.subscribe());

        subscribers.emit(EngineEvent::PadActive(PadName::Loop1));
        assert_eq!(subscribers.len(), 1);
        assert_eq!(kept.try_recv(), Ok(EngineEvent::PadActive(PadName::Loop1)));
    }
}
