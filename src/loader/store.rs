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

//! Per-session cache of fetched bytes and decoded buffers.
//!
//! A new epoch starts for every loaded loop set and drops everything cached
//! for the previous one.

use std::collections::{HashMap, HashSet};

use crate::assets::InstrumentType;
use crate::audio::DecodedBuffer;
use crate::catalog::PadName;
use crate::key::PitchClass;

/// Identifies a cached asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKey {
    Pad(PadName),
    Melodic(InstrumentType, PitchClass),
}

/// The session the cached assets belong to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Epoch {
    pub song_id: String,
    pub fingerprint: String,
}

/// Raw and decoded asset caches. Both are tied to one epoch and are only ever
/// invalidated together when a new epoch begins.
#[derive(Default)]
pub struct AssetStore {
    epoch: Option<Epoch>,
    raw: HashMap<AssetKey, Vec<u8>>,
    decoded: HashMap<AssetKey, DecodedBuffer>,
    disabled: HashSet<PadName>,
}

impl AssetStore {
    pub fn new() -> AssetStore {
        AssetStore::default()
    }

    pub fn epoch(&self) -> Option<&Epoch> {
        self.epoch.as_ref()
    }

    /// Drops everything cached for the previous epoch and starts a new one.
    pub fn begin_epoch(&mut self, song_id: &str, fingerprint: String) {
        self.raw.clear();
        self.decoded.clear();
        self.disabled.clear();
        self.epoch = Some(Epoch {
            song_id: song_id.to_string(),
            fingerprint,
        });
    }

    /// Drops everything, leaving no epoch.
    pub fn clear(&mut self) {
        self.raw.clear();
        self.decoded.clear();
        self.disabled.clear();
        self.epoch = None;
    }

    pub fn insert_raw(&mut self, key: AssetKey, bytes: Vec<u8>) {
        self.raw.insert(key, bytes);
    }

    pub fn has_raw(&self, key: AssetKey) -> bool {
        self.raw.contains_key(&key)
    }

    pub fn take_raw(&mut self, key: AssetKey) -> Option<Vec<u8>> {
        self.raw.remove(&key)
    }

    /// Keys of fetched assets that haven't been decoded yet.
    pub fn undecoded(&self) -> Vec<AssetKey> {
        self.raw.keys().copied().collect()
    }

    pub fn insert_decoded(&mut self, key: AssetKey, buffer: DecodedBuffer) {
        self.decoded.insert(key, buffer);
    }

    pub fn decoded(&self, key: AssetKey) -> Option<&DecodedBuffer> {
        self.decoded.get(&key)
    }

    /// Disables a pad for the rest of the epoch and drops anything cached for it.
    pub fn disable(&mut self, pad: PadName) {
        self.raw.remove(&AssetKey::Pad(pad));
        self.decoded.remove(&AssetKey::Pad(pad));
        self.disabled.insert(pad);
    }

    pub fn is_disabled(&self, pad: PadName) -> bool {
        self.disabled.contains(&pad)
    }

    /// Total memory held by decoded buffers, in bytes.
    pub fn memory_size(&self) -> usize {
        self.decoded.values().map(DecodedBuffer::memory_size).sum()
    }
}
