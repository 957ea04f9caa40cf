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

//! A rhythm-pad loop/fill engine. Loop sets are matched to a song's metadata,
//! downloaded and decoded, then played with fills scheduled on loop boundaries
//! alongside melodic drone pads in the song's key.

pub mod assets;
pub mod audio;
pub mod catalog;
pub mod config;
pub mod controller;
pub mod driver;
pub mod engine;
pub mod key;
pub mod loader;
pub mod matcher;
pub mod prober;
pub mod songs;
#[cfg(test)]
mod testutil;
