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
use futures_util::future::BoxFuture;

use crate::assets::InstrumentType;
use crate::audio::SourceId;
use crate::key::PitchClass;
use crate::loader::LoaderError;

/// The state of one melodic pad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MelodicPad {
    #[default]
    Off,
    /// Waiting for the sample for the key to be fetched.
    Loading { key: PitchClass },
    Playing { key: PitchClass, source: SourceId },
}

impl MelodicPad {
    /// True if the pad is on, whether or not its sample has arrived.
    pub fn is_on(&self) -> bool {
        !matches!(self, MelodicPad::Off)
    }

    pub fn key(&self) -> Option<PitchClass> {
        match self {
            MelodicPad::Off => None,
            MelodicPad::Loading { key } | MelodicPad::Playing { key, .. } => Some(*key),
        }
    }
}

/// A melodic sample download that runs without holding the engine. Hand the
/// result back with [`super::PlaybackEngine::finish_melodic`].
pub struct MelodicFetch {
    pub instrument: InstrumentType,
    pub key: PitchClass,
    future: BoxFuture<'static, Result<Vec<u8>, LoaderError>>,
}

impl MelodicFetch {
    pub(super) fn new(
        instrument: InstrumentType,
        key: PitchClass,
        future: BoxFuture<'static, Result<Vec<u8>, LoaderError>>,
    ) -> MelodicFetch {
        MelodicFetch {
            instrument,
            key,
            future,
        }
    }

    pub async fn run(self) -> MelodicFetched {
        MelodicFetched {
            instrument: self.instrument,
            key: self.key,
            result: self.future.await,
        }
    }
}

impl std::fmt::Debug for MelodicFetch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MelodicFetch")
            .field("instrument", &self.instrument)
            .field("key", &self.key)
            .finish()
    }
}

/// The outcome of a [`MelodicFetch`].
#[derive(Debug)]
pub struct MelodicFetched {
    pub instrument: InstrumentType,
    pub key: PitchClass,
    pub result: Result<Vec<u8>, LoaderError>,
}
