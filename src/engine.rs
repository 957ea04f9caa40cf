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

//! The rhythm pad state machine.
//!
//! One rhythm buffer sounds at a time. Every time it runs out, the next one is
//! chosen at the loop boundary: a queued fill, then a queued loop, otherwise
//! the current loop again. Melodic pads loop independently of all of this.

use std::collections::HashMap;
use std::future::Future;

use tracing::{debug, error, info, warn};

use crate::assets::{self, AssetUrls, FetchError, InstrumentType};
use crate::audio::{self, AudioContext, AudioError, Bus, SourceId, SourceParams};
use crate::catalog::{LoopAsset, LoopSet, PadName};
use crate::config;
use crate::key::{self, PitchClass};
use crate::loader::{AssetFailure, LoadOutcome, LoaderError, ResourceLoader};
use crate::matcher::{MatchResult, Matcher};
use crate::songs::SongDescriptor;

pub mod events;
mod melodic;
pub mod timer;

#[cfg(test)]
mod tests;

pub use events::{EngineEvent, EngineState};
pub use melodic::{MelodicFetch, MelodicFetched};

use events::Subscribers;
use melodic::MelodicPad;
use timer::{effective_duration, TransitionTimer};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("nothing is loaded")]
    NothingLoaded,

    #[error("{0} is not a loop")]
    NotALoop(PadName),

    #[error("{0} is not a fill")]
    NotAFill(PadName),

    #[error("{0} is disabled")]
    PadDisabled(PadName),

    #[error("no playable loops")]
    NoPlayableLoop,

    #[error("engine has been destroyed")]
    Destroyed,

    #[error("{0}")]
    Loader(#[from] LoaderError),

    #[error("{0}")]
    Fetch(#[from] FetchError),

    #[error("{0}")]
    Config(#[from] config::ConfigError),

    #[error("{0}")]
    Audio(#[from] AudioError),
}

/// The rhythm source currently connected to the output.
#[derive(Debug, Clone, Copy)]
struct ActiveSource {
    pad: PadName,
    id: SourceId,
}

pub struct PlaybackEngine {
    context: Box<dyn AudioContext>,
    loader: ResourceLoader,
    matcher: Matcher,
    subscribers: Subscribers,
    state: EngineState,
    destroyed: bool,

    song: Option<SongDescriptor>,
    /// The song waiting on a deferred reload.
    pending_song: Option<SongDescriptor>,
    /// The root melodic pads follow: the key of the last song asked for,
    /// whether or not a loop set matched it.
    melodic_root: String,
    transpose: i32,

    current_loop: PadName,
    pending_loop: Option<PadName>,
    pending_fill: Option<PadName>,
    active: Option<ActiveSource>,
    timer: TransitionTimer,

    volume: f32,
    melodic_volumes: HashMap<InstrumentType, f32>,
    playback_rate: f32,
    playback_rate_bounds: (f32, f32),
    auto_fill: bool,
    melodic: HashMap<InstrumentType, MelodicPad>,
}

impl PlaybackEngine {
    pub fn new(
        context: Box<dyn AudioContext>,
        loader: ResourceLoader,
        config: &config::Player,
    ) -> PlaybackEngine {
        PlaybackEngine {
            context,
            loader,
            matcher: Matcher::new(config.matching().clone()),
            subscribers: Subscribers::default(),
            state: EngineState::Idle,
            destroyed: false,
            song: None,
            pending_song: None,
            melodic_root: String::new(),
            transpose: 0,
            current_loop: PadName::Loop1,
            pending_loop: None,
            pending_fill: None,
            active: None,
            timer: TransitionTimer::new(),
            volume: config.volume(),
            melodic_volumes: InstrumentType::ALL
                .into_iter()
                .map(|instrument| (instrument, config.melodic_volume()))
                .collect(),
            playback_rate: 1.0,
            playback_rate_bounds: config.playback_rate_bounds(),
            auto_fill: config.auto_fill(),
            melodic: HashMap::new(),
        }
    }

    /// Creates an engine with the fetcher and audio context the configuration names.
    pub fn from_config(config: &config::Player) -> Result<PlaybackEngine, EngineError> {
        let fetcher = assets::fetcher(config.http_timeout()?)?;
        let urls = AssetUrls::new(config.loops_base_url(), config.melodic_url_template());
        Ok(PlaybackEngine::new(
            audio::get_context(config.audio()),
            ResourceLoader::new(fetcher, urls),
            config,
        ))
    }

    /// Subscribes to engine events.
    pub fn subscribe(&mut self) -> crossbeam_channel::Receiver<EngineEvent> {
        self.subscribers.subscribe()
    }

    fn emit(&mut self, event: EngineEvent) {
        self.subscribers.emit(event);
    }

    fn set_state(&mut self, state: EngineState) {
        if self.state != state {
            debug!(from = %self.state, to = %state, "Engine state changed");
            self.state = state;
            self.emit(EngineEvent::StateChanged(state));
        }
    }

    fn set_current_loop(&mut self, pad: PadName) {
        if self.current_loop != pad {
            self.current_loop = pad;
            self.emit(EngineEvent::LoopChange(pad));
        }
    }

    fn report_failures(&mut self, failures: Vec<AssetFailure>) {
        for failure in failures {
            self.emit(EngineEvent::Error(format!("{}: {}", failure.pad, failure.error)));
        }
    }

    fn check_alive(&self) -> Result<(), EngineError> {
        if self.destroyed {
            return Err(EngineError::Destroyed);
        }
        Ok(())
    }

    /// Finds the best loop set for the song in the catalog and loads it.
    /// Returns None if nothing matches. The rhythm side is then left alone,
    /// but melodic pads still move to the song's key.
    pub async fn load_song(
        &mut self,
        song: &SongDescriptor,
        catalog: &[LoopAsset],
    ) -> Result<Option<MatchResult>, EngineError> {
        self.check_alive()?;
        let Some(result) = self.matcher.find_best_match(song, catalog) else {
            info!(song = %song, "No loop set matches song");
            self.follow_song_key(song).await;
            return Ok(None);
        };
        self.load(song, &result.loop_set).await?;
        Ok(Some(result))
    }

    /// Loads a loop set for a song. While playing, the reload is deferred to
    /// the next [`PlaybackEngine::play`].
    pub async fn load(
        &mut self,
        song: &SongDescriptor,
        loop_set: &LoopSet,
    ) -> Result<LoadOutcome, EngineError> {
        self.check_alive()?;
        let melodic_key = key::effective_key(song.key(), self.transpose);
        let playing = self.is_playing();
        let outcome = self
            .loader
            .load(loop_set, song.id(), Some(melodic_key), playing)
            .await;
        self.follow_song_key(song).await;

        match &outcome {
            LoadOutcome::Unchanged => self.pending_song = None,
            LoadOutcome::Deferred => self.pending_song = Some(song.clone()),
            LoadOutcome::Loaded(failures) => {
                self.pending_song = None;
                self.adopt_song(song.clone());
                self.report_failures(failures.clone());
                if self.state == EngineState::Idle {
                    self.set_state(EngineState::Loaded);
                }
            }
        }
        Ok(outcome)
    }

    /// Resets pad state for a newly loaded song.
    fn adopt_song(&mut self, song: SongDescriptor) {
        info!(song = %song, "Loaded song");
        self.song = Some(song);
        self.pending_loop = None;
        self.pending_fill = None;
        self.set_current_loop(PadName::Loop1);
    }

    /// Starts playback. Applies a deferred reload first, and unlocks the audio
    /// context and decodes the assets if needed. Does nothing if already playing.
    pub async fn play(&mut self) -> Result<(), EngineError> {
        self.check_alive()?;
        if self.state == EngineState::Playing {
            info!("Engine is already playing.");
            return Ok(());
        }

        if let Some(failures) = self.loader.apply_pending_reload().await {
            if let Some(song) = self.pending_song.take() {
                self.adopt_song(song);
            }
            self.report_failures(failures);
        }
        if self.loader.loop_set().is_none() {
            return Err(EngineError::NothingLoaded);
        }

        if !self.context.is_running() || self.loader.needs_decode() {
            match self.loader.decode_all(&mut *self.context, self.volume).await {
                Ok(failures) => self.report_failures(failures),
                Err(e) => {
                    error!(err = %e, "Unable to start audio output");
                    self.emit(EngineEvent::Error(e.to_string()));
                    return Err(e.into());
                }
            }
        }

        let Some(pad) = self.first_playable_loop(self.current_loop) else {
            self.emit(EngineEvent::Error(EngineError::NoPlayableLoop.to_string()));
            return Err(EngineError::NoPlayableLoop);
        };
        self.set_current_loop(pad);
        self.set_state(EngineState::Playing);
        if let Err(e) = self.start_rhythm(pad) {
            self.stop_rhythm();
            self.set_state(EngineState::Paused);
            self.emit(EngineEvent::Error(e.to_string()));
            return Err(e);
        }
        info!(pad = %pad, "Playback started");
        Ok(())
    }

    /// The preferred loop if it's playable, otherwise the first loop that is.
    fn first_playable_loop(&self, preferred: PadName) -> Option<PadName> {
        std::iter::once(preferred)
            .chain(PadName::LOOPS)
            .find(|&pad| self.loader.buffer(pad).is_some())
    }

    /// Stops the active rhythm source, then starts the pad and schedules the
    /// next boundary.
    fn start_rhythm(&mut self, pad: PadName) -> Result<(), EngineError> {
        self.stop_rhythm();

        let buffer = self
            .loader
            .buffer(pad)
            .cloned()
            .ok_or(EngineError::PadDisabled(pad))?;
        let id = self.context.start_source(
            &buffer,
            SourceParams {
                bus: Bus::Rhythm,
                looping: false,
                rate: self.playback_rate,
            },
        )?;

        let period = effective_duration(buffer.duration(), self.playback_rate);
        self.active = Some(ActiveSource { pad, id });
        self.timer.schedule(period);
        debug!(pad = %pad, period = ?period, "Rhythm pad started");
        self.emit(EngineEvent::PadActive(pad));
        Ok(())
    }

    fn stop_rhythm(&mut self) {
        self.timer.cancel();
        if let Some(active) = self.active.take() {
            self.context.stop_source(active.id);
        }
    }

    /// When the next loop boundary is due.
    pub fn next_transition(&self) -> Option<tokio::time::Instant> {
        self.timer.deadline()
    }

    /// Handles the scheduled loop boundary. Does nothing if the transition
    /// was cancelled.
    pub fn on_boundary(&mut self) {
        if !self.timer.fire() || self.state != EngineState::Playing {
            return;
        }

        let mut next = match self.pending_fill.take() {
            Some(fill) => fill,
            None => {
                if let Some(pad) = self.pending_loop.take() {
                    self.set_current_loop(pad);
                }
                self.current_loop
            }
        };

        if self.loader.buffer(next).is_none() {
            if let Some(pad) = self.pending_loop.take() {
                self.set_current_loop(pad);
            }
            match self.first_playable_loop(self.current_loop) {
                Some(pad) => {
                    warn!(skipped = %next, pad = %pad, "Pad unavailable at boundary");
                    self.set_current_loop(pad);
                    next = pad;
                }
                None => {
                    self.halt(EngineError::NoPlayableLoop.to_string());
                    return;
                }
            }
        }

        if let Err(e) = self.start_rhythm(next) {
            self.halt(e.to_string());
        }
    }

    /// Stops playback after a failure at a loop boundary.
    fn halt(&mut self, message: String) {
        error!(err = message, "Playback stopped");
        self.stop_rhythm();
        self.set_state(EngineState::Paused);
        self.emit(EngineEvent::Error(message));
    }

    /// Switches to a loop. While playing, the switch happens at the next
    /// boundary, preceded by the fill of the loop being left when auto-fill is
    /// on. Otherwise the current loop changes immediately.
    pub fn switch_to_loop(&mut self, pad: PadName) -> Result<(), EngineError> {
        self.check_alive()?;
        if !pad.is_loop() {
            return Err(EngineError::NotALoop(pad));
        }
        self.check_playable(pad)?;

        if self.state != EngineState::Playing {
            self.pending_loop = None;
            self.set_current_loop(pad);
            return Ok(());
        }

        if pad == self.current_loop {
            if self.pending_loop.take().is_some() {
                debug!(pad = %pad, "Cancelled queued loop switch");
            }
            return Ok(());
        }

        self.pending_loop = Some(pad);
        self.emit(EngineEvent::PadQueued(pad));

        let fill_sounding = self.active.is_some_and(|active| !active.pad.is_loop());
        if self.auto_fill && self.pending_fill.is_none() && !fill_sounding {
            if let Some(fill) = PadName::fill_for(self.current_loop.number()) {
                if self.loader.buffer(fill).is_some() {
                    self.pending_fill = Some(fill);
                    self.emit(EngineEvent::PadQueued(fill));
                }
            }
        }
        Ok(())
    }

    /// Queues a fill for the next loop boundary. Ignored when not playing.
    pub fn play_fill(&mut self, pad: PadName) -> Result<(), EngineError> {
        self.check_alive()?;
        if pad.is_loop() {
            return Err(EngineError::NotAFill(pad));
        }
        self.check_playable(pad)?;

        if self.state != EngineState::Playing {
            debug!(pad = %pad, "Not playing, ignoring fill");
            return Ok(());
        }
        self.pending_fill = Some(pad);
        self.emit(EngineEvent::PadQueued(pad));
        Ok(())
    }

    fn check_playable(&self, pad: PadName) -> Result<(), EngineError> {
        if self.loader.loop_set().is_none() {
            return Err(EngineError::NothingLoaded);
        }
        if self.loader.is_disabled(pad) {
            return Err(EngineError::PadDisabled(pad));
        }
        Ok(())
    }

    /// Stops the rhythm and both melodic pads.
    pub fn pause(&mut self) {
        if self.state != EngineState::Playing {
            return;
        }
        self.stop_rhythm();
        self.stop_all_melodic();
        self.pending_fill = None;
        if let Some(pad) = self.pending_loop.take() {
            self.set_current_loop(pad);
        }
        self.set_state(EngineState::Paused);
        info!("Playback paused");
    }

    /// Stops everything and releases the audio context. The engine can't be
    /// used afterwards.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.stop_rhythm();
        self.stop_all_melodic();
        self.context.close();
        self.loader.clear();
        self.song = None;
        self.pending_song = None;
        self.melodic_root.clear();
        self.pending_loop = None;
        self.pending_fill = None;
        self.set_state(EngineState::Idle);
        self.destroyed = true;
        info!("Engine destroyed");
    }

    fn stop_all_melodic(&mut self) {
        for instrument in InstrumentType::ALL {
            self.stop_melodic(instrument);
        }
    }

    /// Turns a melodic pad off. Emits a toggle event if it was on.
    fn stop_melodic(&mut self, instrument: InstrumentType) {
        let pad = self.melodic.remove(&instrument).unwrap_or_default();
        if let MelodicPad::Playing { source, .. } = pad {
            self.context.stop_source(source);
        }
        if pad.is_on() {
            self.emit(EngineEvent::MelodicPadToggle {
                instrument,
                playing: false,
            });
        }
    }

    fn melodic_error(&mut self, instrument: InstrumentType, error: String) {
        warn!(%instrument, err = error, "Melodic pad failed");
        self.stop_melodic(instrument);
        self.emit(EngineEvent::MelodicError { instrument, error });
    }

    /// Toggles a melodic pad. Turning it on may need a download; the returned
    /// fetch must be run and handed back to [`PlaybackEngine::finish_melodic`].
    pub fn request_melodic_toggle(&mut self, instrument: InstrumentType) -> Option<MelodicFetch> {
        if self.destroyed {
            return None;
        }
        if self.melodic_pad(instrument).is_on() {
            self.stop_melodic(instrument);
            return None;
        }
        self.start_melodic(instrument)
    }

    /// Toggles a melodic pad, waiting for its sample if it has to be fetched.
    pub async fn toggle_melodic_pad(&mut self, instrument: InstrumentType) {
        if let Some(fetch) = self.request_melodic_toggle(instrument) {
            let fetched = fetch.run().await;
            self.finish_melodic(fetched);
        }
    }

    fn start_melodic(&mut self, instrument: InstrumentType) -> Option<MelodicFetch> {
        if !self.context.is_running() {
            self.context.set_master_gain(self.volume);
            if let Err(e) = self.context.resume() {
                self.melodic_error(instrument, e.to_string());
                return None;
            }
        }

        let key = self.effective_key();
        if self.loader.is_melodic_cached(instrument, key) {
            self.start_melodic_source(instrument, key);
            return None;
        }

        debug!(%instrument, %key, "Fetching melodic sample");
        self.melodic.insert(instrument, MelodicPad::Loading { key });
        Some(MelodicFetch::new(
            instrument,
            key,
            self.loader.fetch_melodic(instrument, key),
        ))
    }

    /// Completes a melodic download. The sample is cached either way, but
    /// only starts if the pad is still waiting for that key.
    pub fn finish_melodic(&mut self, fetched: MelodicFetched) {
        let MelodicFetched {
            instrument,
            key,
            result,
        } = fetched;
        let waiting = self.melodic_pad(instrument) == MelodicPad::Loading { key };

        match result {
            Ok(bytes) => {
                if self.destroyed {
                    return;
                }
                self.loader.store_melodic(instrument, key, bytes);
                if waiting {
                    self.start_melodic_source(instrument, key);
                }
            }
            Err(e) => {
                if waiting {
                    self.melodic_error(instrument, e.to_string());
                }
            }
        }
    }

    fn start_melodic_source(&mut self, instrument: InstrumentType, key: PitchClass) {
        let buffer = match self.loader.decode_melodic(&*self.context, instrument, key) {
            Ok(buffer) => buffer,
            Err(e) => {
                self.melodic_error(instrument, e.to_string());
                return;
            }
        };

        let bus = Bus::Melodic(instrument);
        self.context.set_bus_gain(bus, self.melodic_volume(instrument));
        let source = match self.context.start_source(
            &buffer,
            SourceParams {
                bus,
                looping: true,
                rate: 1.0,
            },
        ) {
            Ok(source) => source,
            Err(e) => {
                self.melodic_error(instrument, e.to_string());
                return;
            }
        };

        let was_on = self.melodic_pad(instrument).is_on();
        self.melodic.insert(instrument, MelodicPad::Playing { key, source });
        info!(%instrument, %key, "Melodic pad started");
        if !was_on {
            self.emit(EngineEvent::MelodicPadToggle {
                instrument,
                playing: true,
            });
        }
    }

    /// Changes the transpose offset. Melodic pads that are on move to the new
    /// key; any downloads that needs are returned like
    /// [`PlaybackEngine::request_melodic_toggle`].
    pub fn request_transpose(&mut self, semitones: i32) -> Vec<MelodicFetch> {
        self.transpose = semitones;
        info!(transpose = semitones, key = %self.effective_key(), "Transposed");
        self.retune_melodic()
    }

    /// Changes the transpose offset, waiting for any samples the new key needs.
    pub async fn set_transpose(&mut self, semitones: i32) {
        let fetches = self.request_transpose(semitones);
        self.run_melodic_fetches(fetches).await;
    }

    /// Points melodic pads at the song's root, moving any that are sounding.
    async fn follow_song_key(&mut self, song: &SongDescriptor) {
        if self.melodic_root == song.key() {
            return;
        }
        self.melodic_root = song.key().to_string();
        let fetches = self.retune_melodic();
        self.run_melodic_fetches(fetches).await;
    }

    /// Moves melodic pads that are on to the effective key.
    fn retune_melodic(&mut self) -> Vec<MelodicFetch> {
        if self.destroyed {
            return Vec::new();
        }

        let key = self.effective_key();
        let mut fetches = Vec::new();
        for instrument in InstrumentType::ALL {
            let pad = self.melodic_pad(instrument);
            if !pad.is_on() || pad.key() == Some(key) {
                continue;
            }
            if let MelodicPad::Playing { source, .. } = pad {
                self.context.stop_source(source);
            }
            if self.loader.is_melodic_cached(instrument, key) {
                self.start_melodic_source(instrument, key);
            } else {
                self.melodic.insert(instrument, MelodicPad::Loading { key });
                fetches.push(MelodicFetch::new(
                    instrument,
                    key,
                    self.loader.fetch_melodic(instrument, key),
                ));
            }
        }
        fetches
    }

    async fn run_melodic_fetches(&mut self, fetches: Vec<MelodicFetch>) {
        for fetch in fetches {
            let fetched = fetch.run().await;
            self.finish_melodic(fetched);
        }
    }

    /// Checks which melodic pads have a sample for the current key. The check
    /// doesn't hold the engine.
    pub fn availability_check(
        &self,
    ) -> impl Future<Output = HashMap<InstrumentType, bool>> + Send + 'static {
        let prober = self.loader.prober().clone();
        let key = self.effective_key();
        async move { prober.check_availability(&InstrumentType::ALL, key).await }
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        self.context.set_master_gain(self.volume);
    }

    pub fn set_melodic_volume(&mut self, instrument: InstrumentType, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        self.melodic_volumes.insert(instrument, volume);
        self.context.set_bus_gain(Bus::Melodic(instrument), volume);
    }

    /// Sets the playback rate, clamped to the configured bounds. Takes effect
    /// from the next rhythm pad. Returns the rate that was applied.
    pub fn set_playback_rate(&mut self, rate: f32) -> f32 {
        let (min, max) = self.playback_rate_bounds;
        self.playback_rate = if rate.is_finite() {
            rate.clamp(min, max)
        } else {
            1.0_f32.clamp(min, max)
        };
        debug!(rate = self.playback_rate, "Playback rate set");
        self.playback_rate
    }

    pub fn set_auto_fill(&mut self, auto_fill: bool) {
        self.auto_fill = auto_fill;
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == EngineState::Playing
    }

    pub fn song(&self) -> Option<&SongDescriptor> {
        self.song.as_ref()
    }

    pub fn current_loop(&self) -> PadName {
        self.current_loop
    }

    pub fn pending_loop(&self) -> Option<PadName> {
        self.pending_loop
    }

    pub fn pending_fill(&self) -> Option<PadName> {
        self.pending_fill
    }

    /// The rhythm pad sounding right now.
    pub fn active_pad(&self) -> Option<PadName> {
        self.active.map(|active| active.pad)
    }

    pub fn transpose(&self) -> i32 {
        self.transpose
    }

    /// The key melodic pads play in: the song's root plus the transpose offset.
    pub fn effective_key(&self) -> PitchClass {
        key::effective_key(&self.melodic_root, self.transpose)
    }

    pub fn enabled_pads(&self) -> Vec<PadName> {
        self.loader.enabled_pads()
    }

    fn melodic_pad(&self, instrument: InstrumentType) -> MelodicPad {
        self.melodic.get(&instrument).copied().unwrap_or_default()
    }

    /// True if the melodic pad is on, including while its sample downloads.
    pub fn melodic_playing(&self, instrument: InstrumentType) -> bool {
        self.melodic_pad(instrument).is_on()
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn melodic_volume(&self, instrument: InstrumentType) -> f32 {
        self.melodic_volumes.get(&instrument).copied().unwrap_or(1.0)
    }

    pub fn playback_rate(&self) -> f32 {
        self.playback_rate
    }

    pub fn auto_fill(&self) -> bool {
        self.auto_fill
    }
}

impl std::fmt::Debug for PlaybackEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackEngine")
            .field("state", &self.state)
            .field("current_loop", &self.current_loop)
            .field("pending_loop", &self.pending_loop)
            .field("pending_fill", &self.pending_fill)
            .field("active", &self.active_pad())
            .field("loader", &self.loader)
            .finish()
    }
}
