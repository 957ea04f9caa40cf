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

//! Checks which melodic pads have a sample for the current key.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{debug, warn};

use crate::assets::{AssetFetcher, AssetUrls, InstrumentType};
use crate::key::PitchClass;

/// Probes melodic sample availability without downloading the samples.
#[derive(Clone)]
pub struct AvailabilityProber {
    fetcher: Arc<dyn AssetFetcher>,
    urls: AssetUrls,
}

impl AvailabilityProber {
    pub fn new(fetcher: Arc<dyn AssetFetcher>, urls: AssetUrls) -> AvailabilityProber {
        AvailabilityProber { fetcher, urls }
    }

    /// Finds the URL of the instrument's sample for the key: the sharp
    /// spelling first, then the flat spelling. Returns None if neither exists.
    /// Probe errors count as unavailable.
    pub async fn resolve_melodic_url(
        &self,
        instrument: InstrumentType,
        key: PitchClass,
    ) -> Option<String> {
        for url in self.urls.melodic_candidates(instrument, key) {
            match self.fetcher.exists(&url).await {
                Ok(true) => return Some(url),
                Ok(false) => debug!(%instrument, %key, url, "Melodic sample not found"),
                Err(e) => warn!(%instrument, %key, url, err = %e, "Melodic probe failed"),
            }
        }
        None
    }

    /// Checks every instrument concurrently against the key. Nothing is
    /// cached; call again whenever the key changes.
    pub async fn check_availability(
        &self,
        types: &[InstrumentType],
        key: PitchClass,
    ) -> HashMap<InstrumentType, bool> {
        let results = join_all(types.iter().map(|&instrument| async move {
            (
                instrument,
                self.resolve_melodic_url(instrument, key).await.is_some(),
            )
        }))
        .await;
        results.into_iter().collect()
    }
}

impl std::fmt::Debug for AvailabilityProber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvailabilityProber")
            .field("urls", &self.urls)
            .finish()
    }
}
