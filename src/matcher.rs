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

//! Matches a song's musical metadata against the loop catalog.
//!
//! Taal and time signature are required: a loop set that fails either is never
//! selected. Genre, tempo and completeness only rank the eligible sets.

use tracing::{debug, info};

use crate::catalog::{group_loop_sets, LoopAsset, LoopSet, TempoCategory};
use crate::config::{MatchWeights, Matching, TempoThresholds};
use crate::songs::SongDescriptor;

/// Time signatures from different meter families that share a rhythmic feel.
const EQUIVALENT_TIME_SIGNATURES: &[(&str, &str)] =
    &[("6/8", "3/4"), ("9/8", "3/4"), ("12/8", "4/4")];

/// The winning loop set and its score.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub loop_set: LoopSet,
    pub score: u32,
}

/// Case-insensitive substring match in either direction, so "Keherwa" matches
/// "Keherwa Slow". Empty names never match.
pub fn taal_matches(song_taal: &str, candidate_taal: &str) -> bool {
    let song = song_taal.trim().to_lowercase();
    let candidate = candidate_taal.trim().to_lowercase();
    if song.is_empty() || candidate.is_empty() {
        return false;
    }
    song.contains(&candidate) || candidate.contains(&song)
}

/// Exact equality or membership in the equivalence table, in either order.
pub fn time_signatures_equivalent(a: &str, b: &str) -> bool {
    let (a, b) = (a.trim(), b.trim());
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a == b
        || EQUIVALENT_TIME_SIGNATURES
            .iter()
            .any(|&(x, y)| (a == x && b == y) || (a == y && b == x))
}

/// Buckets a tempo into a tempo category.
pub fn tempo_category(bpm: f64, thresholds: &TempoThresholds) -> TempoCategory {
    if bpm < thresholds.slow_below_bpm() {
        TempoCategory::Slow
    } else if bpm > thresholds.fast_above_bpm() {
        TempoCategory::Fast
    } else {
        TempoCategory::Medium
    }
}

/// Scores loop sets against songs.
#[derive(Debug, Clone, Default)]
pub struct Matcher {
    config: Matching,
}

impl Matcher {
    pub fn new(config: Matching) -> Matcher {
        Matcher { config }
    }

    fn weights(&self) -> &MatchWeights {
        self.config.weights()
    }

    /// Scores a single loop set. Returns None if the set fails a required condition.
    pub fn score(&self, song: &SongDescriptor, loop_set: &LoopSet) -> Option<u32> {
        let conditions = loop_set.conditions();
        if !taal_matches(song.taal(), &conditions.taal)
            || !time_signatures_equivalent(song.time_signature(), &conditions.time_signature)
        {
            return None;
        }

        let weights = self.weights();
        let mut score = weights.base();

        if !song.genre().trim().is_empty()
            && song.genre().trim().eq_ignore_ascii_case(conditions.genre.trim())
        {
            score += weights.genre();
        }

        if let Some(bpm) = song.tempo_bpm() {
            if tempo_category(bpm, self.config.tempo()) == conditions.tempo {
                score += weights.tempo();
            }
        }

        if loop_set.is_complete() {
            score += weights.complete();
        }

        Some(score)
    }

    /// Finds the best loop set for the song. Ties go to the set seen first in
    /// the catalog. Returns None if no set is eligible.
    pub fn find_best_match(
        &self,
        song: &SongDescriptor,
        catalog: &[LoopAsset],
    ) -> Option<MatchResult> {
        let mut best: Option<MatchResult> = None;

        for loop_set in group_loop_sets(catalog) {
            let Some(score) = self.score(song, &loop_set) else {
                continue;
            };
            debug!(song = song.id(), set = %loop_set, score, "Eligible loop set");

            if best.as_ref().map_or(true, |b| score > b.score) {
                best = Some(MatchResult { loop_set, score });
            }
        }

        match &best {
            Some(result) => info!(
                song = song.id(),
                set = %result.loop_set,
                score = result.score,
                "Selected loop set"
            ),
            None => info!(song = song.id(), "No loop set matches song"),
        }

        best
    }
}

/// Finds the best loop set using the default weights and tempo thresholds.
pub fn find_best_match(song: &SongDescriptor, catalog: &[LoopAsset]) -> Option<MatchResult> {
    Matcher::default().find_best_match(song, catalog)
}
