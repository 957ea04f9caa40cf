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

//! Musical key resolution.
//!
//! Melodic pads are recorded once per root, so a song key like `"Cm"` and
//! `"C"` share the same sample. Transposition is plain mod-12 arithmetic over
//! the chromatic scale.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// One of the twelve chromatic pitch classes, spelled with sharps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PitchClass {
    #[serde(rename = "C")]
    C,
    #[serde(rename = "C#")]
    CSharp,
    #[serde(rename = "D")]
    D,
    #[serde(rename = "D#")]
    DSharp,
    #[serde(rename = "E")]
    E,
    #[serde(rename = "F")]
    F,
    #[serde(rename = "F#")]
    FSharp,
    #[serde(rename = "G")]
    G,
    #[serde(rename = "G#")]
    GSharp,
    #[serde(rename = "A")]
    A,
    #[serde(rename = "A#")]
    ASharp,
    #[serde(rename = "B")]
    B,
}

impl PitchClass {
    /// The chromatic ordering used for transposition.
    pub const ALL: [PitchClass; 12] = [
        PitchClass::C,
        PitchClass::CSharp,
        PitchClass::D,
        PitchClass::DSharp,
        PitchClass::E,
        PitchClass::F,
        PitchClass::FSharp,
        PitchClass::G,
        PitchClass::GSharp,
        PitchClass::A,
        PitchClass::ASharp,
        PitchClass::B,
    ];

    /// Position in the chromatic scale, starting at C = 0.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Gets the pitch class at the given chromatic index (wraps around).
    pub fn from_index(index: i64) -> PitchClass {
        Self::ALL[index.rem_euclid(12) as usize]
    }

    /// Moves this pitch class by the given number of semitones.
    pub fn transpose(self, semitones: i32) -> PitchClass {
        Self::from_index(self.index() as i64 + semitones as i64)
    }

    /// The canonical sharp spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            PitchClass::C => "C",
            PitchClass::CSharp => "C#",
            PitchClass::D => "D",
            PitchClass::DSharp => "D#",
            PitchClass::E => "E",
            PitchClass::F => "F",
            PitchClass::FSharp => "F#",
            PitchClass::G => "G",
            PitchClass::GSharp => "G#",
            PitchClass::A => "A",
            PitchClass::ASharp => "A#",
            PitchClass::B => "B",
        }
    }

    /// The flat spelling of a black key, if this is one.
    pub fn enharmonic(self) -> Option<&'static str> {
        match self {
            PitchClass::CSharp => Some("Db"),
            PitchClass::DSharp => Some("Eb"),
            PitchClass::FSharp => Some("Gb"),
            PitchClass::GSharp => Some("Ab"),
            PitchClass::ASharp => Some("Bb"),
            _ => None,
        }
    }

    /// Parses a root spelling (`"C#"`, `"Db"`, `"e"`). Minor suffixes are not
    /// accepted here; see [`base_pitch_class`].
    fn parse_root(root: &str) -> Option<PitchClass> {
        let mut chars = root.chars();
        let letter = chars.next()?.to_ascii_uppercase();
        let accidental: String = chars.collect();

        let natural = match letter {
            'C' => PitchClass::C,
            'D' => PitchClass::D,
            'E' => PitchClass::E,
            'F' => PitchClass::F,
            'G' => PitchClass::G,
            'A' => PitchClass::A,
            'B' => PitchClass::B,
            _ => return None,
        };

        match accidental.as_str() {
            "" => Some(natural),
            "#" => Some(natural.transpose(1)),
            // Only the five conventional flats are recognized.
            "b" => match natural {
                PitchClass::D
                | PitchClass::E
                | PitchClass::G
                | PitchClass::A
                | PitchClass::B => Some(natural.transpose(-1)),
                _ => None,
            },
            _ => None,
        }
    }
}

impl fmt::Display for PitchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PitchClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        base_pitch_class(s).ok_or_else(|| format!("unrecognized key '{}'", s))
    }
}

/// Reduces a song key (`"C"`, `"C#m"`, `"Bbm"`) to its root pitch class.
/// Returns None if the key is not recognized.
pub fn base_pitch_class(key: &str) -> Option<PitchClass> {
    let key = key.trim();
    let root = key.strip_suffix('m').unwrap_or(key);
    PitchClass::parse_root(root)
}

/// Resolves the key the melodic pads should play in: the song's root with the
/// transpose offset applied. Unrecognized keys resolve from C.
pub fn effective_key(base_key: &str, transpose_semitones: i32) -> PitchClass {
    base_pitch_class(base_key)
        .unwrap_or(PitchClass::C)
        .transpose(transpose_semitones)
}
