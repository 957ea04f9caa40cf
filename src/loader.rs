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

//! Fetches and caches loop and melodic assets.
//!
//! Bytes are fetched when a loop set is loaded, but nothing is decoded until
//! the audio context has been unlocked by the first `play()`. A reload that
//! arrives while playing is held as pending and applied on the next `play()`.

use std::sync::Arc;

use futures_util::future::{join_all, BoxFuture};
use tracing::{debug, info, warn};

use crate::assets::{AssetFetcher, AssetUrls, FetchError, InstrumentType};
use crate::audio::{decode_audio, AudioContext, AudioError, DecodeError, DecodedBuffer};
use crate::catalog::{LoopSet, PadName};
use crate::key::PitchClass;
use crate::prober::AvailabilityProber;

mod store;

pub use store::{AssetKey, AssetStore, Epoch};

#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error("no {instrument} sample available for key {key}")]
    Unavailable {
        instrument: InstrumentType,
        key: PitchClass,
    },

    #[error("{0}")]
    Fetch(#[from] FetchError),

    #[error("{0}")]
    Decode(#[from] DecodeError),

    #[error("{0}")]
    Audio(#[from] AudioError),

    #[error("decode task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// A pad whose asset couldn't be fetched or decoded. The pad stays disabled
/// until the next loop set is loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetFailure {
    pub pad: PadName,
    pub error: String,
}

/// What a call to [`ResourceLoader::load`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// The loop set and song are already loaded.
    Unchanged,
    /// Playback is active, so the reload was recorded for the next `play()`.
    Deferred,
    /// The assets were fetched. Failed pads are disabled.
    Loaded(Vec<AssetFailure>),
}

struct PendingReload {
    song_id: String,
    loop_set: LoopSet,
    melodic_key: Option<PitchClass>,
}

pub struct ResourceLoader {
    fetcher: Arc<dyn AssetFetcher>,
    urls: AssetUrls,
    prober: AvailabilityProber,
    store: AssetStore,
    loop_set: Option<LoopSet>,
    pending: Option<PendingReload>,
}

impl ResourceLoader {
    pub fn new(fetcher: Arc<dyn AssetFetcher>, urls: AssetUrls) -> ResourceLoader {
        ResourceLoader {
            prober: AvailabilityProber::new(fetcher.clone(), urls.clone()),
            fetcher,
            urls,
            store: AssetStore::new(),
            loop_set: None,
            pending: None,
        }
    }

    pub fn prober(&self) -> &AvailabilityProber {
        &self.prober
    }

    /// The loop set the cached assets belong to.
    pub fn loop_set(&self) -> Option<&LoopSet> {
        self.loop_set.as_ref()
    }

    pub fn song_id(&self) -> Option<&str> {
        self.store.epoch().map(|epoch| epoch.song_id.as_str())
    }

    pub fn has_pending_reload(&self) -> bool {
        self.pending.is_some()
    }

    /// True if the song or the set of asset URLs differs from what is loaded.
    pub fn needs_reload(&self, song_id: &str, loop_set: &LoopSet) -> bool {
        match self.store.epoch() {
            None => true,
            Some(epoch) => {
                epoch.song_id != song_id || epoch.fingerprint != loop_set.fingerprint(&self.urls)
            }
        }
    }

    /// Loads a loop set for a song, prefetching the melodic samples for the
    /// given key. While playing, the reload is deferred instead.
    pub async fn load(
        &mut self,
        loop_set: &LoopSet,
        song_id: &str,
        melodic_key: Option<PitchClass>,
        playing: bool,
    ) -> LoadOutcome {
        if !self.needs_reload(song_id, loop_set) {
            if self.pending.take().is_some() {
                debug!(song = song_id, "Dropping pending reload, current set requested");
            }
            return LoadOutcome::Unchanged;
        }

        if playing {
            info!(song = song_id, set = %loop_set, "Deferring reload until next play");
            self.pending = Some(PendingReload {
                song_id: song_id.to_string(),
                loop_set: loop_set.clone(),
                melodic_key,
            });
            return LoadOutcome::Deferred;
        }

        self.pending = None;
        let failures = self.fetch_loop_set(loop_set, song_id).await;
        if let Some(key) = melodic_key {
            self.prefetch_melodic(&InstrumentType::ALL, key).await;
        }
        LoadOutcome::Loaded(failures)
    }

    /// Applies a deferred reload. Returns None if there was nothing pending.
    pub async fn apply_pending_reload(&mut self) -> Option<Vec<AssetFailure>> {
        let pending = self.pending.take()?;
        info!(song = pending.song_id, "Applying pending reload");
        let failures = self.fetch_loop_set(&pending.loop_set, &pending.song_id).await;
        if let Some(key) = pending.melodic_key {
            self.prefetch_melodic(&InstrumentType::ALL, key).await;
        }
        Some(failures)
    }

    async fn fetch_loop_set(&mut self, loop_set: &LoopSet, song_id: &str) -> Vec<AssetFailure> {
        self.store.begin_epoch(song_id, loop_set.fingerprint(&self.urls));
        self.loop_set = Some(loop_set.clone());

        let fetcher = &self.fetcher;
        let results = join_all(loop_set.pad_urls(&self.urls).into_iter().map(
            |(pad, url)| async move {
                let result = fetcher.fetch(&url).await;
                (pad, url, result)
            },
        ))
        .await;

        let mut failures = Vec::new();
        for (pad, url, result) in results {
            match result {
                Ok(bytes) => {
                    debug!(%pad, url, bytes = bytes.len(), "Fetched asset");
                    self.store.insert_raw(AssetKey::Pad(pad), bytes);
                }
                Err(e) => {
                    warn!(%pad, url, err = %e, "Unable to fetch asset, disabling pad");
                    self.store.disable(pad);
                    failures.push(AssetFailure {
                        pad,
                        error: e.to_string(),
                    });
                }
            }
        }

        // Pads the set has no asset for are never playable.
        for pad in PadName::ALL {
            if loop_set.asset(pad).is_none() {
                self.store.disable(pad);
            }
        }

        info!(
            song = song_id,
            set = %loop_set,
            failed = failures.len(),
            "Loaded loop set"
        );
        failures
    }

    /// Fetches melodic sample bytes for the key without decoding them.
    /// Unavailable samples are skipped.
    pub async fn prefetch_melodic(&mut self, types: &[InstrumentType], key: PitchClass) {
        let results = join_all(
            types
                .iter()
                .filter(|&&instrument| !self.is_melodic_cached(instrument, key))
                .map(|&instrument| {
                    let fetch = self.fetch_melodic(instrument, key);
                    async move { (instrument, fetch.await) }
                }),
        )
        .await;

        for (instrument, result) in results {
            match result {
                Ok(bytes) => self.store_melodic(instrument, key, bytes),
                Err(e) => debug!(%instrument, %key, err = %e, "Melodic sample not prefetched"),
            }
        }
    }

    /// Builds a fetch for a melodic sample that doesn't borrow the loader, so
    /// it can run while the engine keeps handling commands.
    pub fn fetch_melodic(
        &self,
        instrument: InstrumentType,
        key: PitchClass,
    ) -> BoxFuture<'static, Result<Vec<u8>, LoaderError>> {
        let prober = self.prober.clone();
        let fetcher = self.fetcher.clone();
        Box::pin(async move {
            let url = prober
                .resolve_melodic_url(instrument, key)
                .await
                .ok_or(LoaderError::Unavailable { instrument, key })?;
            Ok(fetcher.fetch(&url).await?)
        })
    }

    pub fn is_melodic_cached(&self, instrument: InstrumentType, key: PitchClass) -> bool {
        let asset = AssetKey::Melodic(instrument, key);
        self.store.has_raw(asset) || self.store.decoded(asset).is_some()
    }

    /// Caches fetched melodic bytes until they can be decoded.
    pub fn store_melodic(&mut self, instrument: InstrumentType, key: PitchClass, bytes: Vec<u8>) {
        self.store.insert_raw(AssetKey::Melodic(instrument, key), bytes);
    }

    /// Gets the decoded melodic sample, decoding cached bytes if needed. The
    /// context must be running.
    pub fn decode_melodic(
        &mut self,
        context: &dyn AudioContext,
        instrument: InstrumentType,
        key: PitchClass,
    ) -> Result<DecodedBuffer, LoaderError> {
        let asset = AssetKey::Melodic(instrument, key);
        if let Some(buffer) = self.store.decoded(asset) {
            return Ok(buffer.clone());
        }
        let sample_rate = context.sample_rate().ok_or(AudioError::NotRunning)?;
        let bytes = self
            .store
            .take_raw(asset)
            .ok_or(LoaderError::Unavailable { instrument, key })?;
        let buffer = decode_audio(bytes, sample_rate)?;
        self.store.insert_decoded(asset, buffer.clone());
        Ok(buffer)
    }

    /// Fetches (if needed) and decodes a melodic sample.
    pub async fn load_melodic(
        &mut self,
        context: &dyn AudioContext,
        instrument: InstrumentType,
        key: PitchClass,
    ) -> Result<DecodedBuffer, LoaderError> {
        if !self.is_melodic_cached(instrument, key) {
            let bytes = self.fetch_melodic(instrument, key).await?;
            self.store_melodic(instrument, key, bytes);
        }
        self.decode_melodic(context, instrument, key)
    }

    /// True if fetched bytes are waiting to be decoded.
    pub fn needs_decode(&self) -> bool {
        !self.store.undecoded().is_empty()
    }

    /// Unlocks the context silently, decodes the rhythm assets and then any
    /// fetched melodic samples on the blocking pool, and finally restores the
    /// output gain. Pads that fail to decode are disabled.
    pub async fn decode_all(
        &mut self,
        context: &mut dyn AudioContext,
        volume: f32,
    ) -> Result<Vec<AssetFailure>, LoaderError> {
        context.set_master_gain(0.0);
        let result = self.decode_undecoded(context).await;
        context.set_master_gain(volume);
        result
    }

    async fn decode_undecoded(
        &mut self,
        context: &mut dyn AudioContext,
    ) -> Result<Vec<AssetFailure>, LoaderError> {
        let sample_rate = context.resume()?;

        let (pads, melodic): (Vec<AssetKey>, Vec<AssetKey>) = self
            .store
            .undecoded()
            .into_iter()
            .partition(|key| matches!(key, AssetKey::Pad(_)));
        let raw: Vec<(AssetKey, Vec<u8>)> = pads
            .into_iter()
            .chain(melodic)
            .filter_map(|asset| self.store.take_raw(asset).map(|bytes| (asset, bytes)))
            .collect();

        let decoded = tokio::task::spawn_blocking(move || {
            raw.into_iter()
                .map(|(asset, bytes)| (asset, decode_audio(bytes, sample_rate)))
                .collect::<Vec<_>>()
        })
        .await?;

        let mut failures = Vec::new();
        for (asset, result) in decoded {
            match (asset, result) {
                (_, Ok(buffer)) => {
                    debug!(?asset, frames = buffer.frames(), "Decoded asset");
                    self.store.insert_decoded(asset, buffer);
                }
                (AssetKey::Pad(pad), Err(e)) => {
                    warn!(%pad, err = %e, "Unable to decode asset, disabling pad");
                    self.store.disable(pad);
                    failures.push(AssetFailure {
                        pad,
                        error: e.to_string(),
                    });
                }
                (AssetKey::Melodic(instrument, key), Err(e)) => {
                    warn!(%instrument, %key, err = %e, "Unable to decode melodic sample");
                }
            }
        }

        info!(
            sample_rate,
            memory_kb = self.store.memory_size() / 1024,
            "Decoded assets"
        );
        Ok(failures)
    }

    /// The decoded buffer for a pad, if it's playable.
    pub fn buffer(&self, pad: PadName) -> Option<&DecodedBuffer> {
        if self.store.is_disabled(pad) {
            return None;
        }
        self.store.decoded(AssetKey::Pad(pad))
    }

    pub fn is_disabled(&self, pad: PadName) -> bool {
        self.store.is_disabled(pad)
    }

    /// Pads that have been fetched and not disabled, in pad order.
    pub fn enabled_pads(&self) -> Vec<PadName> {
        PadName::ALL
            .into_iter()
            .filter(|&pad| {
                !self.store.is_disabled(pad)
                    && (self.store.has_raw(AssetKey::Pad(pad))
                        || self.store.decoded(AssetKey::Pad(pad)).is_some())
            })
            .collect()
    }

    /// Drops all cached assets and any pending reload.
    pub fn clear(&mut self) {
        self.store.clear();
        self.loop_set = None;
        self.pending = None;
    }
}

impl std::fmt::Debug for ResourceLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceLoader")
            .field("epoch", &self.store.epoch())
            .field("pending_reload", &self.pending.is_some())
            .field("memory_kb", &(self.store.memory_size() / 1024))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::mock::Fetcher;
    use crate::audio::mock::{Call, Context};
    use crate::catalog::{group_loop_sets, LoopConditions, TempoCategory};
    use crate::testutil::{full_set, wav_bytes};

    const BASE: &str = "https://cdn.example/loops";
    const TEMPLATE: &str = "https://cdn.example/{instrument}/{key}.wav";

    fn loop_set(prefix: &str) -> LoopSet {
        let conditions = LoopConditions::new("Keherwa", "4/4", TempoCategory::Medium, "Pop");
        group_loop_sets(&full_set(prefix, &conditions)).remove(0)
    }

    fn publish(fetcher: &Fetcher, prefix: &str) {
        for (i, pad) in PadName::ALL.into_iter().enumerate() {
            fetcher.insert(
                &format!("{}/{}_{}.wav", BASE, prefix, pad),
                wav_bytes(100 * (i + 1), 44100, 1),
            );
        }
    }

    fn loader(fetcher: &Fetcher) -> ResourceLoader {
        ResourceLoader::new(Arc::new(fetcher.clone()), AssetUrls::new(BASE, TEMPLATE))
    }

    #[tokio::test]
    async fn test_load_fetches_without_decoding() {
        let fetcher = Fetcher::new();
        publish(&fetcher, "a");
        let mut loader = loader(&fetcher);
        let set = loop_set("a");

        assert!(loader.needs_reload("song", &set));
        assert_eq!(
            loader.load(&set, "song", None, false).await,
            LoadOutcome::Loaded(vec![])
        );
        assert!(!loader.needs_reload("song", &set));
        assert!(loader.needs_reload("other", &set));
        assert!(loader.needs_reload("song", &loop_set("b")));

        assert_eq!(loader.enabled_pads(), PadName::ALL.to_vec());
        assert!(loader.buffer(PadName::Loop1).is_none());
        assert!(loader.needs_decode());

        assert_eq!(
            loader.load(&set, "song", None, false).await,
            LoadOutcome::Unchanged
        );
        assert_eq!(fetcher.fetched().len(), 6);
    }

    #[tokio::test]
    async fn test_fetch_failure_disables_only_that_pad() {
        let fetcher = Fetcher::new();
        publish(&fetcher, "a");
        fetcher.fail(&format!("{}/a_fill2.wav", BASE));
        let mut loader = loader(&fetcher);

        let LoadOutcome::Loaded(failures) = loader.load(&loop_set("a"), "song", None, false).await
        else {
            panic!("expected a load");
        };
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].pad, PadName::Fill2);
        assert!(loader.is_disabled(PadName::Fill2));
        assert_eq!(loader.enabled_pads().len(), 5);
    }

    #[tokio::test]
    async fn test_reload_deferred_while_playing() {
        let fetcher = Fetcher::new();
        publish(&fetcher, "a");
        publish(&fetcher, "b");
        let mut loader = loader(&fetcher);
        loader.load(&loop_set("a"), "one", None, false).await;

        assert_eq!(
            loader.load(&loop_set("b"), "two", None, true).await,
            LoadOutcome::Deferred
        );
        assert!(loader.has_pending_reload());
        assert_eq!(loader.song_id(), Some("one"));
        assert_eq!(fetcher.fetched().len(), 6);

        assert_eq!(loader.apply_pending_reload().await, Some(vec![]));
        assert_eq!(loader.song_id(), Some("two"));
        assert_eq!(fetcher.fetched().len(), 12);
        assert_eq!(loader.apply_pending_reload().await, None);
    }

    #[tokio::test]
    async fn test_pending_reload_dropped_when_current_requested() {
        let fetcher = Fetcher::new();
        publish(&fetcher, "a");
        publish(&fetcher, "b");
        let mut loader = loader(&fetcher);
        loader.load(&loop_set("a"), "one", None, false).await;
        loader.load(&loop_set("b"), "two", None, true).await;

        assert_eq!(
            loader.load(&loop_set("a"), "one", None, true).await,
            LoadOutcome::Unchanged
        );
        assert!(!loader.has_pending_reload());
    }

    #[tokio::test]
    async fn test_decode_all_is_silent_until_done() {
        let fetcher = Fetcher::new();
        publish(&fetcher, "a");
        fetcher.insert("https://cdn.example/tanpura/C.wav", wav_bytes(50, 44100, 2));
        fetcher.insert(&format!("{}/a_loop3.wav", BASE), b"garbage".to_vec());
        let mut loader = loader(&fetcher);
        loader
            .load(&loop_set("a"), "song", Some(PitchClass::C), false)
            .await;
        assert!(loader.is_melodic_cached(InstrumentType::Tanpura, PitchClass::C));
        assert!(!loader.is_melodic_cached(InstrumentType::Atmosphere, PitchClass::C));

        let mut context = Context::new("mock");
        let failures = loader.decode_all(&mut context, 0.8).await.unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].pad, PadName::Loop3);
        assert!(loader.is_disabled(PadName::Loop3));

        let calls = context.calls();
        assert_eq!(calls.first(), Some(&Call::MasterGain(0.0)));
        assert_eq!(calls.get(1), Some(&Call::Resumed));
        assert_eq!(calls.last(), Some(&Call::MasterGain(0.8)));

        assert_eq!(loader.buffer(PadName::Loop1).map(|b| b.frames()), Some(100));
        assert!(loader.buffer(PadName::Loop3).is_none());
        assert!(!loader.needs_decode());

        let tanpura = loader
            .decode_melodic(&context, InstrumentType::Tanpura, PitchClass::C)
            .unwrap();
        assert_eq!(tanpura.frames(), 50);
    }

    #[tokio::test]
    async fn test_decode_all_resamples_to_output_rate() {
        let fetcher = Fetcher::new();
        publish(&fetcher, "a");
        fetcher.insert("https://cdn.example/tanpura/C.wav", wav_bytes(441, 44100, 1));
        let mut loader = loader(&fetcher);
        loader
            .load(&loop_set("a"), "song", Some(PitchClass::C), false)
            .await;

        let mut context = Context::new("mock").with_sample_rate(48000);
        assert_eq!(loader.decode_all(&mut context, 1.0).await.unwrap(), vec![]);
        assert!(!loader.needs_decode());
        assert_eq!(loader.buffer(PadName::Loop1).map(|b| b.frames()), Some(109));
        assert_eq!(loader.buffer(PadName::Loop1).map(|b| b.sample_rate()), Some(48000));

        let tanpura = loader
            .decode_melodic(&context, InstrumentType::Tanpura, PitchClass::C)
            .unwrap();
        assert_eq!(tanpura.frames(), 480);
    }

    #[tokio::test]
    async fn test_decode_all_blocked() {
        let fetcher = Fetcher::new();
        publish(&fetcher, "a");
        let mut loader = loader(&fetcher);
        loader.load(&loop_set("a"), "song", None, false).await;

        let mut context = Context::new("mock");
        context.block("no user gesture");
        assert!(matches!(
            loader.decode_all(&mut context, 0.5).await,
            Err(LoaderError::Audio(AudioError::Blocked(_)))
        ));
        assert!(loader.needs_decode());
        assert_eq!(context.master_gain(), 0.5);

        context.unblock();
        assert_eq!(loader.decode_all(&mut context, 0.5).await.unwrap(), vec![]);
        assert!(loader.buffer(PadName::Fill1).is_some());
    }

    #[tokio::test]
    async fn test_load_melodic_uses_enharmonic() {
        let fetcher = Fetcher::new();
        fetcher.insert("https://cdn.example/atmosphere/Bb.wav", wav_bytes(30, 44100, 1));
        let mut loader = loader(&fetcher);
        let mut context = Context::new("mock");
        crate::audio::AudioContext::resume(&mut context).unwrap();

        let buffer = loader
            .load_melodic(&context, InstrumentType::Atmosphere, PitchClass::ASharp)
            .await
            .unwrap();
        assert_eq!(buffer.frames(), 30);

        assert!(matches!(
            loader
                .load_melodic(&context, InstrumentType::Tanpura, PitchClass::ASharp)
                .await,
            Err(LoaderError::Unavailable { .. })
        ));

        // Cached after the first load.
        loader
            .load_melodic(&context, InstrumentType::Atmosphere, PitchClass::ASharp)
            .await
            .unwrap();
        assert_eq!(
            fetcher.fetch_count("https://cdn.example/atmosphere/Bb.wav"),
            1
        );
    }
}
