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
use std::io;
use std::sync::Arc;

use tokio::sync::mpsc::{self, Sender};
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info, span, Instrument, Level};

use crate::assets::InstrumentType;
use crate::catalog::PadName;
use crate::driver::EngineHandle;
use crate::engine::EngineError;

pub mod keyboard;

/// How much faster or slower each rate step makes playback.
const RATE_STEP: f32 = 0.05;

#[derive(Debug, PartialEq)]
pub enum Event {
    /// Starts playback. Does nothing if already playing.
    Play,

    /// Pauses the rhythm and melodic pads.
    Pause,

    /// Switches to a loop at the next boundary.
    Loop(PadName),

    /// Queues a fill for the next boundary.
    Fill(PadName),

    /// Toggles a melodic pad.
    Melodic(InstrumentType),

    /// Flips auto-fill on or off.
    AutoFill,

    /// Transposes the melodic pads up a semitone.
    TransposeUp,

    /// Transposes the melodic pads down a semitone.
    TransposeDown,

    /// Speeds playback up by one step.
    Faster,

    /// Slows playback down by one step.
    Slower,

    /// Logs the engine status.
    Status,

    /// Destroys the engine and stops the controller.
    Quit,
}

pub trait Driver: Send + Sync + 'static {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>>;
}

pub struct Controller {
    handle: JoinHandle<()>,
}

impl Controller {
    /// Creates a new controller that feeds the driver's events to the engine.
    pub fn new(engine: EngineHandle, driver: Arc<dyn Driver>) -> Controller {
        Controller {
            handle: tokio::spawn(
                Controller::trigger_events(engine, driver)
                    .instrument(span!(Level::INFO, "controller")),
            ),
        }
    }

    /// Join will block until the controller finishes.
    pub async fn join(&mut self) -> Result<(), JoinError> {
        (&mut self.handle).await
    }

    async fn trigger_events(engine: EngineHandle, driver: Arc<dyn Driver>) {
        let (events_tx, mut events_rx) = mpsc::channel(1);
        let join_handle = driver.monitor_events(events_tx);

        info!("Controller started.");

        while let Some(event) = events_rx.recv().await {
            info!(event = format!("{:?}", event), "Received event.");
            if event == Event::Quit {
                if let Err(e) = engine.destroy().await {
                    error!("Error destroying engine: {}", e);
                }
                break;
            }
            if let Err(e) = Controller::dispatch(&engine, event).await {
                error!("Error talking to engine: {}", e);
            }
        }

        info!("Controller closing.");
        drop(events_rx);
        if let Err(e) = join_handle.await {
            error!("Error waiting for event monitor to stop: {}", e);
        }
    }

    async fn dispatch(engine: &EngineHandle, event: Event) -> Result<(), EngineError> {
        match event {
            Event::Play => engine.play().await,
            Event::Pause => engine.pause().await,
            Event::Loop(pad) => engine.switch_to_loop(pad).await,
            Event::Fill(pad) => engine.play_fill(pad).await,
            Event::Melodic(instrument) => engine.toggle_melodic_pad(instrument).await,
            Event::AutoFill => {
                let auto_fill = !engine.status().await?.auto_fill;
                info!(auto_fill, "Auto-fill toggled.");
                engine.set_auto_fill(auto_fill).await
            }
            Event::TransposeUp | Event::TransposeDown => {
                let step = if event == Event::TransposeUp { 1 } else { -1 };
                let transpose = engine.status().await?.transpose + step;
                engine.set_transpose(transpose).await
            }
            Event::Faster | Event::Slower => {
                let step = if event == Event::Faster {
                    RATE_STEP
                } else {
                    -RATE_STEP
                };
                let rate = engine.status().await?.playback_rate + step;
                let rate = engine.set_playback_rate(rate).await?;
                info!(rate, "Playback rate changed.");
                Ok(())
            }
            Event::Status => {
                let status = engine.status().await?;
                info!(
                    state = %status.state,
                    current_loop = %status.current_loop,
                    key = %status.key,
                    transpose = status.transpose,
                    rate = status.playback_rate,
                    auto_fill = status.auto_fill,
                    "Engine status."
                );
                Ok(())
            }
            Event::Quit => Ok(()),
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use parking_lot::Mutex;
    use tokio::{sync::mpsc::Sender, task::JoinHandle};

    use super::{Controller, Driver, Event};
    use crate::assets::{mock::Fetcher, AssetUrls, InstrumentType};
    use crate::audio::{mock::Context, Bus};
    use crate::catalog::{LoopConditions, PadName, TempoCategory};
    use crate::config;
    use crate::driver::EngineHandle;
    use crate::engine::{EngineState, PlaybackEngine};
    use crate::loader::ResourceLoader;
    use crate::songs::SongDescriptor;
    use crate::testutil::{full_set, wav_bytes};

    const BASE: &str = "https://cdn.example/loops";
    const TEMPLATE: &str = "https://cdn.example/{instrument}/{key}.wav";

    /// Replays a fixed list of events, then hangs up.
    struct TestDriver {
        events: Mutex<Vec<Event>>,
    }

    impl Driver for TestDriver {
        fn monitor_events(
            &self,
            events_tx: Sender<Event>,
        ) -> JoinHandle<Result<(), std::io::Error>> {
            let events: Vec<Event> = self.events.lock().drain(..).collect();
            tokio::spawn(async move {
                for event in events {
                    if events_tx.send(event).await.is_err() {
                        break;
                    }
                }
                Ok(())
            })
        }
    }

    async fn engine() -> (EngineHandle, Context) {
        let fetcher = Fetcher::new();
        for pad in PadName::ALL {
            fetcher.insert(
                &format!("{}/a_{}.wav", BASE, pad),
                wav_bytes(4410, 44100, 1),
            );
        }
        let context = Context::new("mock");
        let loader = ResourceLoader::new(Arc::new(fetcher), AssetUrls::new(BASE, TEMPLATE));
        let config = config::Player::new("catalog.json", BASE, TEMPLATE);
        let handle = EngineHandle::spawn(PlaybackEngine::new(
            Box::new(context.clone()),
            loader,
            &config,
        ));

        let conditions = LoopConditions::new("Keherwa", "4/4", TempoCategory::Medium, "Pop");
        let song = SongDescriptor::new("song", "D", "Keherwa", "4/4", "Pop", None);
        handle
            .load_song(song, full_set("a", &conditions))
            .await
            .unwrap();
        (handle, context)
    }

    #[tokio::test(start_paused = true)]
    async fn test_controller_drives_engine() {
        let (handle, context) = engine().await;
        let driver = Arc::new(TestDriver {
            events: Mutex::new(vec![
                Event::Play,
                Event::Loop(PadName::Loop3),
                Event::AutoFill,
                Event::TransposeUp,
                Event::TransposeUp,
                Event::Slower,
                Event::Status,
            ]),
        });

        let mut controller = Controller::new(handle.clone(), driver);
        controller.join().await.unwrap();

        let status = handle.status().await.unwrap();
        assert_eq!(status.state, EngineState::Playing);
        assert!(
            status.pending_loop == Some(PadName::Loop3) || status.current_loop == PadName::Loop3
        );
        assert!(!status.auto_fill);
        assert_eq!(status.transpose, 2);
        assert!((status.playback_rate - 0.95).abs() < 1e-6);
        assert!(!context.active_on(Bus::Rhythm).is_empty());
        assert!(status.melodic.contains(&(InstrumentType::Tanpura, false)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_quit_destroys_engine() {
        let (handle, context) = engine().await;
        let driver = Arc::new(TestDriver {
            events: Mutex::new(vec![Event::Play, Event::Quit, Event::Play]),
        });

        let mut controller = Controller::new(handle.clone(), driver);
        controller.join().await.unwrap();

        assert!(context.is_closed());
        assert!(handle.status().await.is_err());
    }
}
