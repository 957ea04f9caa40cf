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

//! The loop catalog: pre-recorded loop and fill files tagged with the musical
//! conditions they were recorded for.

use std::collections::HashMap;
use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::assets::{AssetFetcher, AssetUrls, FetchError};

/// Number of loops (and fills) in a complete loop set.
pub const PADS_PER_KIND: u8 = 3;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("catalog must be a JSON array of loop assets")]
    NotAnArray,

    #[error("unable to fetch catalog: {0}")]
    Fetch(#[from] FetchError),
}

/// Whether an asset is a repeating loop or a one-shot fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AssetKind {
    Loop,
    Fill,
}

impl FromStr for AssetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "loop" => Ok(AssetKind::Loop),
            "fill" => Ok(AssetKind::Fill),
            _ => Err(format!("unknown asset type '{}'", s)),
        }
    }
}

impl TryFrom<String> for AssetKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AssetKind> for String {
    fn from(value: AssetKind) -> Self {
        match value {
            AssetKind::Loop => "loop".to_string(),
            AssetKind::Fill => "fill".to_string(),
        }
    }
}

/// Coarse tempo bucket a loop set was recorded for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TempoCategory {
    Slow,
    Medium,
    Fast,
}

impl FromStr for TempoCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "slow" => Ok(TempoCategory::Slow),
            "medium" => Ok(TempoCategory::Medium),
            "fast" => Ok(TempoCategory::Fast),
            _ => Err(format!("unknown tempo category '{}'", s)),
        }
    }
}

impl TryFrom<String> for TempoCategory {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TempoCategory> for String {
    fn from(value: TempoCategory) -> Self {
        value.to_string()
    }
}

impl fmt::Display for TempoCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TempoCategory::Slow => "slow",
            TempoCategory::Medium => "medium",
            TempoCategory::Fast => "fast",
        };
        write!(f, "{}", name)
    }
}

/// The six rhythm pads of a loop set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PadName {
    Loop1,
    Loop2,
    Loop3,
    Fill1,
    Fill2,
    Fill3,
}

impl PadName {
    pub const ALL: [PadName; 6] = [
        PadName::Loop1,
        PadName::Loop2,
        PadName::Loop3,
        PadName::Fill1,
        PadName::Fill2,
        PadName::Fill3,
    ];

    pub const LOOPS: [PadName; 3] = [PadName::Loop1, PadName::Loop2, PadName::Loop3];

    pub fn kind(self) -> AssetKind {
        match self {
            PadName::Loop1 | PadName::Loop2 | PadName::Loop3 => AssetKind::Loop,
            PadName::Fill1 | PadName::Fill2 | PadName::Fill3 => AssetKind::Fill,
        }
    }

    /// The 1-based pad number within its kind.
    pub fn number(self) -> u8 {
        match self {
            PadName::Loop1 | PadName::Fill1 => 1,
            PadName::Loop2 | PadName::Fill2 => 2,
            PadName::Loop3 | PadName::Fill3 => 3,
        }
    }

    pub fn new(kind: AssetKind, number: u8) -> Option<PadName> {
        match kind {
            AssetKind::Loop => Self::loop_for(number),
            AssetKind::Fill => Self::fill_for(number),
        }
    }

    pub fn loop_for(number: u8) -> Option<PadName> {
        match number {
            1 => Some(PadName::Loop1),
            2 => Some(PadName::Loop2),
            3 => Some(PadName::Loop3),
            _ => None,
        }
    }

    pub fn fill_for(number: u8) -> Option<PadName> {
        match number {
            1 => Some(PadName::Fill1),
            2 => Some(PadName::Fill2),
            3 => Some(PadName::Fill3),
            _ => None,
        }
    }

    pub fn is_loop(self) -> bool {
        self.kind() == AssetKind::Loop
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PadName::Loop1 => "loop1",
            PadName::Loop2 => "loop2",
            PadName::Loop3 => "loop3",
            PadName::Fill1 => "fill1",
            PadName::Fill2 => "fill2",
            PadName::Fill3 => "fill3",
        }
    }
}

impl fmt::Display for PadName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PadName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PadName::ALL
            .into_iter()
            .find(|pad| pad.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown pad '{}'", s))
    }
}

/// The conditions a loop set was recorded for. Identity of a loop set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopConditions {
    pub taal: String,
    #[serde(alias = "timesignature", alias = "time_signature")]
    pub time_signature: String,
    #[serde(alias = "tempoCategory", alias = "tempo_category")]
    pub tempo: TempoCategory,
    #[serde(default)]
    pub genre: String,
}

impl LoopConditions {
    pub fn new(taal: &str, time_signature: &str, tempo: TempoCategory, genre: &str) -> Self {
        LoopConditions {
            taal: taal.to_string(),
            time_signature: time_signature.to_string(),
            tempo,
            genre: genre.to_string(),
        }
    }
}

impl fmt::Display for LoopConditions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.taal, self.time_signature, self.tempo, self.genre
        )
    }
}

/// A single catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopAsset {
    pub filename: String,
    #[serde(rename = "type")]
    pub kind: AssetKind,
    pub number: u8,
    /// Entries without conditions can't be matched and are skipped.
    #[serde(default)]
    pub conditions: Option<LoopConditions>,
}

impl LoopAsset {
    pub fn new(filename: &str, kind: AssetKind, number: u8, conditions: LoopConditions) -> Self {
        LoopAsset {
            filename: filename.to_string(),
            kind,
            number,
            conditions: Some(conditions),
        }
    }

    /// The pad this asset plays on, if its number is in range.
    pub fn pad(&self) -> Option<PadName> {
        PadName::new(self.kind, self.number)
    }
}

/// The loop and fill assets sharing one set of conditions.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopSet {
    conditions: LoopConditions,
    assets: Vec<LoopAsset>,
}

impl LoopSet {
    pub fn new(conditions: LoopConditions, assets: Vec<LoopAsset>) -> Self {
        LoopSet { conditions, assets }
    }

    pub fn conditions(&self) -> &LoopConditions {
        &self.conditions
    }

    pub fn assets(&self) -> &[LoopAsset] {
        &self.assets
    }

    /// The asset for the given pad. The first catalog entry wins if the
    /// catalog lists a pad twice.
    pub fn asset(&self, pad: PadName) -> Option<&LoopAsset> {
        self.assets.iter().find(|asset| asset.pad() == Some(pad))
    }

    /// Iterates over the playable pads of this set, one asset per pad.
    pub fn pads(&self) -> impl Iterator<Item = (PadName, &LoopAsset)> {
        PadName::ALL
            .into_iter()
            .filter_map(|pad| self.asset(pad).map(|asset| (pad, asset)))
    }

    fn count(&self, kind: AssetKind) -> usize {
        self.assets.iter().filter(|asset| asset.kind == kind).count()
    }

    /// True if the set has exactly three loops and three fills covering every pad.
    pub fn is_complete(&self) -> bool {
        self.count(AssetKind::Loop) == PADS_PER_KIND as usize
            && self.count(AssetKind::Fill) == PADS_PER_KIND as usize
            && self.pads().count() == PadName::ALL.len()
    }

    /// Resolves the URL of every pad in the set.
    pub fn pad_urls(&self, urls: &AssetUrls) -> Vec<(PadName, String)> {
        self.pads()
            .map(|(pad, asset)| (pad, urls.loop_url(&asset.filename)))
            .collect()
    }

    /// A stable identity for the set's files: sorted URLs joined with '|'.
    pub fn fingerprint(&self, urls: &AssetUrls) -> String {
        let mut all: Vec<String> = self
            .pad_urls(urls)
            .into_iter()
            .map(|(_, url)| url)
            .collect();
        all.sort();
        all.join("|")
    }
}

impl fmt::Display for LoopSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} loops, {} fills)",
            self.conditions,
            self.count(AssetKind::Loop),
            self.count(AssetKind::Fill)
        )
    }
}

/// Parses a catalog JSON document. The document must be an array; entries that
/// don't describe a loop asset are skipped.
pub fn parse_catalog(json: &str) -> Result<Vec<LoopAsset>, CatalogError> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    let serde_json::Value::Array(entries) = value else {
        return Err(CatalogError::NotAnArray);
    };

    let total = entries.len();
    let assets: Vec<LoopAsset> = entries
        .into_iter()
        .enumerate()
        .filter_map(
            |(index, entry)| match serde_json::from_value::<LoopAsset>(entry) {
                Ok(asset) => Some(asset),
                Err(e) => {
                    warn!(index, err = %e, "Skipping malformed catalog entry");
                    None
                }
            },
        )
        .collect();

    debug!(total, parsed = assets.len(), "Parsed loop catalog");
    Ok(assets)
}

/// Fetches and parses the catalog at the given URL.
pub async fn fetch_catalog(
    fetcher: &dyn AssetFetcher,
    url: &str,
) -> Result<Vec<LoopAsset>, CatalogError> {
    let bytes = fetcher.fetch(url).await?;
    parse_catalog(&String::from_utf8_lossy(&bytes))
}

/// Groups catalog entries into loop sets by their conditions. Sets are returned
/// in the order their first entry appears in the catalog. Entries without
/// conditions or with an out-of-range pad number are skipped.
pub fn group_loop_sets(catalog: &[LoopAsset]) -> Vec<LoopSet> {
    let mut sets: Vec<LoopSet> = Vec::new();
    let mut index: HashMap<LoopConditions, usize> = HashMap::new();

    for asset in catalog {
        let Some(conditions) = &asset.conditions else {
            debug!(filename = asset.filename, "Catalog entry has no conditions");
            continue;
        };
        if asset.pad().is_none() {
            debug!(
                filename = asset.filename,
                number = asset.number,
                "Catalog entry has an invalid pad number"
            );
            continue;
        }

        match index.get(conditions) {
            Some(&i) => sets[i].assets.push(asset.clone()),
            None => {
                index.insert(conditions.clone(), sets.len());
                sets.push(LoopSet::new(conditions.clone(), vec![asset.clone()]));
            }
        }
    }

    sets
}
