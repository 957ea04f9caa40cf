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

//! Runs a [`PlaybackEngine`] on its own task.
//!
//! The task owns the engine outright and waits on either the next command or
//! the next loop boundary, so engine state is never shared. Melodic downloads
//! run on separate tasks and report back as commands.

use std::collections::HashMap;
use std::time::Duration;

use crossbeam_channel::Receiver;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, span, Instrument, Level};

use crate::assets::InstrumentType;
use crate::catalog::{LoopAsset, LoopSet, PadName};
use crate::engine::{
    EngineError, EngineEvent, EngineState, MelodicFetch, MelodicFetched, PlaybackEngine,
};
use crate::key::PitchClass;
use crate::loader::LoadOutcome;
use crate::matcher::MatchResult;
use crate::songs::SongDescriptor;

type Reply<T> = oneshot::Sender<T>;

enum Command {
    Load(SongDescriptor, LoopSet, Reply<Result<LoadOutcome, EngineError>>),
    LoadSong(
        SongDescriptor,
        Vec<LoopAsset>,
        Reply<Result<Option<MatchResult>, EngineError>>,
    ),
    Play(Reply<Result<(), EngineError>>),
    Pause(Reply<()>),
    SwitchToLoop(PadName, Reply<Result<(), EngineError>>),
    PlayFill(PadName, Reply<Result<(), EngineError>>),
    ToggleMelodic(InstrumentType, Reply<()>),
    SetTranspose(i32, Reply<()>),
    SetVolume(f32, Reply<()>),
    SetMelodicVolume(InstrumentType, f32, Reply<()>),
    SetPlaybackRate(f32, Reply<f32>),
    SetAutoFill(bool, Reply<()>),
    CheckAvailability(Reply<HashMap<InstrumentType, bool>>),
    Subscribe(Reply<Receiver<EngineEvent>>),
    Status(Reply<EngineStatus>),
    Destroy(Reply<()>),
    MelodicFetched(MelodicFetched),
}

/// A snapshot of the engine for display.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineStatus {
    pub state: EngineState,
    pub current_loop: PadName,
    pub pending_loop: Option<PadName>,
    pub pending_fill: Option<PadName>,
    pub active_pad: Option<PadName>,
    pub key: PitchClass,
    pub transpose: i32,
    pub playback_rate: f32,
    pub volume: f32,
    pub auto_fill: bool,
    pub enabled_pads: Vec<PadName>,
    pub melodic: Vec<(InstrumentType, bool)>,
    /// Time left until the next loop boundary.
    pub next_transition: Option<Duration>,
}

impl EngineStatus {
    fn of(engine: &PlaybackEngine) -> EngineStatus {
        EngineStatus {
            state: engine.state(),
            current_loop: engine.current_loop(),
            pending_loop: engine.pending_loop(),
            pending_fill: engine.pending_fill(),
            active_pad: engine.active_pad(),
            key: engine.effective_key(),
            transpose: engine.transpose(),
            playback_rate: engine.playback_rate(),
            volume: engine.volume(),
            auto_fill: engine.auto_fill(),
            enabled_pads: engine.enabled_pads(),
            melodic: InstrumentType::ALL
                .into_iter()
                .map(|instrument| (instrument, engine.melodic_playing(instrument)))
                .collect(),
            next_transition: engine
                .next_transition()
                .map(|deadline| deadline.saturating_duration_since(Instant::now())),
        }
    }
}

/// Talks to an engine running on its own task. Clones share the engine. The
/// engine is destroyed when the last handle is dropped.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl EngineHandle {
    /// Moves the engine onto a new task.
    pub fn spawn(engine: PlaybackEngine) -> EngineHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let driver = Driver {
            engine,
            rx,
            tx: tx.downgrade(),
        };
        tokio::spawn(driver.run().instrument(span!(Level::INFO, "engine driver")));
        EngineHandle { tx }
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(command(reply_tx))
            .map_err(|_| EngineError::Destroyed)?;
        reply_rx.await.map_err(|_| EngineError::Destroyed)
    }

    pub async fn load(
        &self,
        song: SongDescriptor,
        loop_set: LoopSet,
    ) -> Result<LoadOutcome, EngineError> {
        self.request(|reply| Command::Load(song, loop_set, reply)).await?
    }

    pub async fn load_song(
        &self,
        song: SongDescriptor,
        catalog: Vec<LoopAsset>,
    ) -> Result<Option<MatchResult>, EngineError> {
        self.request(|reply| Command::LoadSong(song, catalog, reply)).await?
    }

    pub async fn play(&self) -> Result<(), EngineError> {
        self.request(Command::Play).await?
    }

    pub async fn pause(&self) -> Result<(), EngineError> {
        self.request(Command::Pause).await
    }

    pub async fn switch_to_loop(&self, pad: PadName) -> Result<(), EngineError> {
        self.request(|reply| Command::SwitchToLoop(pad, reply)).await?
    }

    pub async fn play_fill(&self, pad: PadName) -> Result<(), EngineError> {
        self.request(|reply| Command::PlayFill(pad, reply)).await?
    }

    /// Toggles a melodic pad. Returns before its sample has been downloaded.
    pub async fn toggle_melodic_pad(&self, instrument: InstrumentType) -> Result<(), EngineError> {
        self.request(|reply| Command::ToggleMelodic(instrument, reply)).await
    }

    pub async fn set_transpose(&self, semitones: i32) -> Result<(), EngineError> {
        self.request(|reply| Command::SetTranspose(semitones, reply)).await
    }

    pub async fn set_volume(&self, volume: f32) -> Result<(), EngineError> {
        self.request(|reply| Command::SetVolume(volume, reply)).await
    }

    pub async fn set_melodic_volume(
        &self,
        instrument: InstrumentType,
        volume: f32,
    ) -> Result<(), EngineError> {
        self.request(|reply| Command::SetMelodicVolume(instrument, volume, reply)).await
    }

    /// Sets the playback rate. Returns the rate after clamping.
    pub async fn set_playback_rate(&self, rate: f32) -> Result<f32, EngineError> {
        self.request(|reply| Command::SetPlaybackRate(rate, reply)).await
    }

    pub async fn set_auto_fill(&self, auto_fill: bool) -> Result<(), EngineError> {
        self.request(|reply| Command::SetAutoFill(auto_fill, reply)).await
    }

    pub async fn check_availability(&self) -> Result<HashMap<InstrumentType, bool>, EngineError> {
        self.request(Command::CheckAvailability).await
    }

    pub async fn subscribe(&self) -> Result<Receiver<EngineEvent>, EngineError> {
        self.request(Command::Subscribe).await
    }

    pub async fn status(&self) -> Result<EngineStatus, EngineError> {
        self.request(Command::Status).await
    }

    /// Destroys the engine and stops its task.
    pub async fn destroy(&self) -> Result<(), EngineError> {
        self.request(Command::Destroy).await
    }
}

struct Driver {
    engine: PlaybackEngine,
    rx: mpsc::UnboundedReceiver<Command>,
    /// Weak so that pending downloads don't keep the driver alive.
    tx: mpsc::WeakUnboundedSender<Command>,
}

impl Driver {
    async fn run(mut self) {
        info!("Engine driver started");
        loop {
            let deadline = self.engine.next_transition();
            tokio::select! {
                command = self.rx.recv() => {
                    let Some(command) = command else {
                        debug!("All engine handles dropped");
                        break;
                    };
                    if !self.handle(command).await {
                        break;
                    }
                }
                _ = wait_for(deadline) => self.engine.on_boundary(),
            }
        }
        self.engine.destroy();
        info!("Engine driver stopped");
    }

    /// Handles a command. Returns false once the engine has been destroyed.
    async fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Load(song, loop_set, reply) => {
                let _ = reply.send(self.engine.load(&song, &loop_set).await);
            }
            Command::LoadSong(song, catalog, reply) => {
                let _ = reply.send(self.engine.load_song(&song, &catalog).await);
            }
            Command::Play(reply) => {
                let _ = reply.send(self.engine.play().await);
            }
            Command::Pause(reply) => {
                self.engine.pause();
                let _ = reply.send(());
            }
            Command::SwitchToLoop(pad, reply) => {
                let _ = reply.send(self.engine.switch_to_loop(pad));
            }
            Command::PlayFill(pad, reply) => {
                let _ = reply.send(self.engine.play_fill(pad));
            }
            Command::ToggleMelodic(instrument, reply) => {
                if let Some(fetch) = self.engine.request_melodic_toggle(instrument) {
                    self.spawn_fetch(fetch);
                }
                let _ = reply.send(());
            }
            Command::SetTranspose(semitones, reply) => {
                for fetch in self.engine.request_transpose(semitones) {
                    self.spawn_fetch(fetch);
                }
                let _ = reply.send(());
            }
            Command::SetVolume(volume, reply) => {
                self.engine.set_volume(volume);
                let _ = reply.send(());
            }
            Command::SetMelodicVolume(instrument, volume, reply) => {
                self.engine.set_melodic_volume(instrument, volume);
                let _ = reply.send(());
            }
            Command::SetPlaybackRate(rate, reply) => {
                let _ = reply.send(self.engine.set_playback_rate(rate));
            }
            Command::SetAutoFill(auto_fill, reply) => {
                self.engine.set_auto_fill(auto_fill);
                let _ = reply.send(());
            }
            Command::CheckAvailability(reply) => {
                let check = self.engine.availability_check();
                tokio::spawn(async move {
                    let _ = reply.send(check.await);
                });
            }
            Command::Subscribe(reply) => {
                let _ = reply.send(self.engine.subscribe());
            }
            Command::Status(reply) => {
                let _ = reply.send(EngineStatus::of(&self.engine));
            }
            Command::Destroy(reply) => {
                self.engine.destroy();
                let _ = reply.send(());
                return false;
            }
            Command::MelodicFetched(fetched) => self.engine.finish_melodic(fetched),
        }
        true
    }

    fn spawn_fetch(&self, fetch: MelodicFetch) {
        let Some(tx) = self.tx.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            let fetched = fetch.run().await;
            let _ = tx.send(Command::MelodicFetched(fetched));
        });
    }
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
