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

//! Addressing and fetching of audio assets.
//!
//! Rhythm loops are addressed by catalog filename, melodic samples by
//! instrument and key through a URL template. Fetchers only move bytes; they
//! know nothing about decoding.

use std::{fmt, str::FromStr, sync::Arc, time::Duration};

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::key::PitchClass;

mod file;
mod http;
#[cfg(test)]
pub mod mock;
mod routing;

pub use file::FileFetcher;
pub use http::HttpFetcher;
pub use routing::{is_http, RoutingFetcher};

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("{0} not found")]
    NotFound(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error reading {url}: {source}")]
    Io {
        url: String,
        #[source]
        source: std::io::Error,
    },
}

/// Moves asset bytes from wherever they are published.
pub trait AssetFetcher: Send + Sync {
    /// Downloads the full contents of the asset.
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<u8>, FetchError>>;

    /// Checks whether the asset exists without downloading it.
    fn exists<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<bool, FetchError>>;
}

/// Gets a fetcher that reads http(s) URLs over HTTP and anything else from
/// the local filesystem, deciding per URL.
pub fn fetcher(timeout: Duration) -> Result<Arc<dyn AssetFetcher>, FetchError> {
    Ok(Arc::new(RoutingFetcher::new(timeout)?))
}

/// The melodic instruments that play continuous drones in the song's key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentType {
    Atmosphere,
    Tanpura,
}

impl InstrumentType {
    pub const ALL: [InstrumentType; 2] = [InstrumentType::Atmosphere, InstrumentType::Tanpura];

    /// The token used for this instrument in sample URLs.
    pub fn as_str(self) -> &'static str {
        match self {
            InstrumentType::Atmosphere => "atmosphere",
            InstrumentType::Tanpura => "tanpura",
        }
    }
}

impl fmt::Display for InstrumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for InstrumentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InstrumentType::ALL
            .into_iter()
            .find(|instrument| instrument.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown instrument '{}'", s))
    }
}

/// Builds asset URLs from the configured base and template.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetUrls {
    loops_base: String,
    melodic_template: String,
}

impl AssetUrls {
    pub fn new(loops_base: &str, melodic_template: &str) -> AssetUrls {
        AssetUrls {
            loops_base: loops_base.trim_end_matches('/').to_string(),
            melodic_template: melodic_template.to_string(),
        }
    }

    /// The URL of a catalog file. Filenames that are already URLs are used as-is.
    pub fn loop_url(&self, filename: &str) -> String {
        if filename.contains("://") || self.loops_base.is_empty() {
            return filename.to_string();
        }
        format!("{}/{}", self.loops_base, filename.trim_start_matches('/'))
    }

    /// The URL of a melodic sample for a key spelling. '#' is percent-encoded.
    pub fn melodic_url(&self, instrument: InstrumentType, key_spelling: &str) -> String {
        self.melodic_template
            .replace("{instrument}", instrument.as_str())
            .replace("{key}", &key_spelling.replace('#', "%23"))
    }

    /// The URLs to try for a melodic sample, in order: the sharp spelling, then
    /// the flat spelling for black keys.
    pub fn melodic_candidates(&self, instrument: InstrumentType, key: PitchClass) -> Vec<String> {
        let mut candidates = vec![self.melodic_url(instrument, key.as_str())];
        if let Some(flat) = key.enharmonic() {
            candidates.push(self.melodic_url(instrument, flat));
        }
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loop_urls() {
        let urls = AssetUrls::new("https://cdn.example/loops/", "{instrument}/{key}.mp3");
        assert_eq!(
            urls.loop_url("keherwa/loop1.mp3"),
            "https://cdn.example/loops/keherwa/loop1.mp3"
        );
        assert_eq!(
            urls.loop_url("https://other.example/x.mp3"),
            "https://other.example/x.mp3"
        );
    }

    #[test]
    fn test_melodic_candidates() {
        let urls = AssetUrls::new("", "https://cdn.example/{instrument}/{key}.mp3");
        assert_eq!(
            urls.melodic_candidates(InstrumentType::Tanpura, PitchClass::DSharp),
            vec![
                "https://cdn.example/tanpura/D%23.mp3".to_string(),
                "https://cdn.example/tanpura/Eb.mp3".to_string(),
            ]
        );
        assert_eq!(
            urls.melodic_candidates(InstrumentType::Atmosphere, PitchClass::E),
            vec!["https://cdn.example/atmosphere/E.mp3".to_string()]
        );
    }

    #[test]
    fn test_instrument_parse() {
        assert_eq!(
            "Tanpura".parse::<InstrumentType>(),
            Ok(InstrumentType::Tanpura)
        );
        assert!("sitar".parse::<InstrumentType>().is_err());
    }
}
