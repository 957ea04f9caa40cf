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
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Receiver;
use tokio::time::Instant;

use super::*;
use crate::assets::mock::Fetcher;
use crate::audio::mock::{Call, Context};
use crate::catalog::{group_loop_sets, LoopConditions, TempoCategory};
use crate::testutil::{full_set, wav_bytes};

const BASE: &str = "https://cdn.example/loops";
const TEMPLATE: &str = "https://cdn.example/{instrument}/{key}.wav";

/// One tenth of a second at the mock context's rate.
const TENTH: usize = 4410;

struct Fixture {
    engine: PlaybackEngine,
    context: Context,
    fetcher: Fetcher,
    events: Receiver<EngineEvent>,
}

/// Frame count of a pad in a set published with the given unit. Every pad
/// gets a distinct length so started sources can be told apart.
fn frames(pad: PadName, unit: usize) -> usize {
    let index = PadName::ALL.iter().position(|&p| p == pad).unwrap();
    unit * (index + 1)
}

fn publish(fetcher: &Fetcher, prefix: &str, unit: usize) {
    for pad in PadName::ALL {
        fetcher.insert(
            &format!("{}/{}_{}.wav", BASE, prefix, pad),
            wav_bytes(frames(pad, unit), 44100, 1),
        );
    }
}

fn loop_set(prefix: &str) -> LoopSet {
    let conditions = LoopConditions::new("Keherwa", "4/4", TempoCategory::Medium, "Pop");
    group_loop_sets(&full_set(prefix, &conditions)).remove(0)
}

fn song(id: &str) -> SongDescriptor {
    song_in(id, "D")
}

fn song_in(id: &str, key: &str) -> SongDescriptor {
    SongDescriptor::new(id, key, "Keherwa", "4/4", "Pop", Some(100.0))
}

fn setup() -> Fixture {
    let fetcher = Fetcher::new();
    publish(&fetcher, "a", TENTH);
    let context = Context::new("mock");
    let loader = ResourceLoader::new(Arc::new(fetcher.clone()), AssetUrls::new(BASE, TEMPLATE));
    let config = config::Player::new("catalog.json", BASE, TEMPLATE);
    let mut engine = PlaybackEngine::new(Box::new(context.clone()), loader, &config);
    let events = engine.subscribe();
    Fixture {
        engine,
        context,
        fetcher,
        events,
    }
}

async fn playing() -> Fixture {
    let mut fixture = setup();
    fixture.engine.load(&song("one"), &loop_set("a")).await.unwrap();
    fixture.engine.play().await.unwrap();
    fixture.events.try_iter().count();
    fixture
}

fn active_pads(events: &Receiver<EngineEvent>) -> Vec<PadName> {
    events
        .try_iter()
        .filter_map(|event| match event {
            EngineEvent::PadActive(pad) => Some(pad),
            _ => None,
        })
        .collect()
}

fn started_frames(context: &Context) -> Vec<usize> {
    context
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            Call::Started {
                bus: Bus::Rhythm,
                frames,
                ..
            } => Some(frames),
            _ => None,
        })
        .collect()
}

fn until_transition(engine: &PlaybackEngine) -> Duration {
    engine.next_transition().unwrap() - Instant::now()
}

fn assert_close(actual: Duration, expected: Duration) {
    assert!(
        (actual.as_secs_f64() - expected.as_secs_f64()).abs() < 1e-6,
        "expected {:?}, got {:?}",
        expected,
        actual
    );
}

#[tokio::test(start_paused = true)]
async fn test_play_requires_load() {
    let mut fixture = setup();
    assert!(matches!(
        fixture.engine.play().await,
        Err(EngineError::NothingLoaded)
    ));
    assert_eq!(fixture.engine.state(), EngineState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_decode_deferred_until_play() {
    let mut fixture = setup();
    fixture.engine.load(&song("one"), &loop_set("a")).await.unwrap();
    assert_eq!(fixture.engine.state(), EngineState::Loaded);
    assert!(fixture.context.calls().is_empty());

    fixture.engine.play().await.unwrap();
    let calls = fixture.context.calls();
    assert_eq!(calls[0], Call::MasterGain(0.0));
    assert_eq!(calls[1], Call::Resumed);
    assert!(calls.contains(&Call::MasterGain(0.8)));
    assert_eq!(started_frames(&fixture.context), vec![TENTH]);

    assert_eq!(fixture.engine.state(), EngineState::Playing);
    assert_eq!(fixture.engine.active_pad(), Some(PadName::Loop1));
    assert_close(
        until_transition(&fixture.engine),
        Duration::from_millis(100),
    );

    let events: Vec<EngineEvent> = fixture.events.try_iter().collect();
    assert!(events.contains(&EngineEvent::StateChanged(EngineState::Playing)));
    assert!(events.contains(&EngineEvent::PadActive(PadName::Loop1)));
}

#[tokio::test(start_paused = true)]
async fn test_play_is_idempotent() {
    let mut fixture = playing().await;
    fixture.engine.play().await.unwrap();
    assert_eq!(started_frames(&fixture.context).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_loop_repeats_at_boundary() {
    let mut fixture = playing().await;
    fixture.engine.on_boundary();
    fixture.engine.on_boundary();
    assert_eq!(
        active_pads(&fixture.events),
        vec![PadName::Loop1, PadName::Loop1]
    );
}

#[tokio::test(start_paused = true)]
async fn test_fill_before_loop() {
    let mut fixture = playing().await;

    fixture.engine.switch_to_loop(PadName::Loop2).unwrap();
    assert_eq!(fixture.engine.pending_loop(), Some(PadName::Loop2));
    assert_eq!(fixture.engine.pending_fill(), Some(PadName::Fill1));
    // Nothing changes until the boundary.
    assert_eq!(fixture.engine.active_pad(), Some(PadName::Loop1));

    fixture.engine.on_boundary();
    fixture.engine.on_boundary();
    assert_eq!(
        active_pads(&fixture.events),
        vec![PadName::Fill1, PadName::Loop2]
    );
    assert_eq!(fixture.engine.current_loop(), PadName::Loop2);

    fixture.engine.on_boundary();
    assert_eq!(active_pads(&fixture.events), vec![PadName::Loop2]);
}

#[tokio::test(start_paused = true)]
async fn test_fill_matches_the_loop_being_left() {
    let mut fixture = setup();
    fixture.engine.load(&song("one"), &loop_set("a")).await.unwrap();
    fixture.engine.switch_to_loop(PadName::Loop2).unwrap();
    fixture.engine.play().await.unwrap();

    fixture.engine.switch_to_loop(PadName::Loop1).unwrap();
    assert_eq!(fixture.engine.pending_fill(), Some(PadName::Fill2));
}

#[tokio::test(start_paused = true)]
async fn test_switch_without_auto_fill() {
    let mut fixture = playing().await;
    fixture.engine.set_auto_fill(false);

    fixture.engine.switch_to_loop(PadName::Loop3).unwrap();
    assert_eq!(fixture.engine.pending_fill(), None);
    fixture.engine.on_boundary();
    assert_eq!(active_pads(&fixture.events), vec![PadName::Loop3]);
    assert_eq!(fixture.engine.current_loop(), PadName::Loop3);
}

#[tokio::test(start_paused = true)]
async fn test_switch_back_cancels_pending_loop() {
    let mut fixture = playing().await;
    fixture.engine.switch_to_loop(PadName::Loop2).unwrap();
    fixture.engine.switch_to_loop(PadName::Loop1).unwrap();
    assert_eq!(fixture.engine.pending_loop(), None);

    fixture.engine.on_boundary();
    fixture.engine.on_boundary();
    assert_eq!(
        active_pads(&fixture.events),
        vec![PadName::Fill1, PadName::Loop1]
    );
}

#[tokio::test(start_paused = true)]
async fn test_play_fill_keeps_current_loop() {
    let mut fixture = playing().await;
    fixture.engine.play_fill(PadName::Fill3).unwrap();
    assert_eq!(fixture.engine.current_loop(), PadName::Loop1);

    fixture.engine.on_boundary();
    fixture.engine.on_boundary();
    assert_eq!(
        active_pads(&fixture.events),
        vec![PadName::Fill3, PadName::Loop1]
    );
}

#[tokio::test(start_paused = true)]
async fn test_play_fill_ignored_when_not_playing() {
    let mut fixture = setup();
    fixture.engine.load(&song("one"), &loop_set("a")).await.unwrap();
    fixture.engine.play_fill(PadName::Fill1).unwrap();
    assert_eq!(fixture.engine.pending_fill(), None);
}

#[tokio::test(start_paused = true)]
async fn test_pad_kinds_checked() {
    let mut fixture = playing().await;
    assert!(matches!(
        fixture.engine.switch_to_loop(PadName::Fill1),
        Err(EngineError::NotALoop(PadName::Fill1))
    ));
    assert!(matches!(
        fixture.engine.play_fill(PadName::Loop2),
        Err(EngineError::NotAFill(PadName::Loop2))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_no_double_source() {
    let mut fixture = playing().await;

    fixture.engine.switch_to_loop(PadName::Loop2).unwrap();
    fixture.engine.play_fill(PadName::Fill3).unwrap();
    fixture.engine.on_boundary();
    fixture.engine.switch_to_loop(PadName::Loop3).unwrap();
    fixture.engine.on_boundary();
    fixture.engine.play_fill(PadName::Fill2).unwrap();
    fixture.engine.on_boundary();
    fixture.engine.on_boundary();
    fixture.engine.switch_to_loop(PadName::Loop1).unwrap();
    fixture.engine.on_boundary();
    fixture.engine.on_boundary();

    assert_eq!(fixture.context.max_concurrent_rhythm(), 1);
    assert_eq!(fixture.context.active_on(Bus::Rhythm).len(), 1);
    assert!(started_frames(&fixture.context).len() > 5);
}

#[tokio::test(start_paused = true)]
async fn test_rate_scales_schedule() {
    let mut fixture = setup();
    fixture.engine.load(&song("one"), &loop_set("a")).await.unwrap();
    assert_eq!(fixture.engine.set_playback_rate(2.0), 2.0);
    fixture.engine.play().await.unwrap();
    assert_close(
        until_transition(&fixture.engine),
        Duration::from_millis(50),
    );
    assert!(fixture.context.calls().iter().any(|call| matches!(
        call,
        Call::Started { rate, .. } if *rate == 2.0
    )));

    // A rate change applies from the next boundary.
    fixture.engine.set_playback_rate(0.5);
    assert_close(
        until_transition(&fixture.engine),
        Duration::from_millis(50),
    );
    fixture.engine.on_boundary();
    assert_close(
        until_transition(&fixture.engine),
        Duration::from_millis(200),
    );

    assert_eq!(fixture.engine.set_playback_rate(10.0), 2.0);
    assert_eq!(fixture.engine.set_playback_rate(0.1), 0.5);
}

#[tokio::test(start_paused = true)]
async fn test_pause_stops_rhythm_and_melodic() {
    let mut fixture = setup();
    fixture
        .fetcher
        .insert("https://cdn.example/tanpura/D.wav", wav_bytes(1000, 44100, 2));
    fixture.engine.load(&song("one"), &loop_set("a")).await.unwrap();
    fixture.engine.play().await.unwrap();
    fixture
        .engine
        .toggle_melodic_pad(InstrumentType::Tanpura)
        .await;
    assert!(fixture.engine.melodic_playing(InstrumentType::Tanpura));
    fixture.events.try_iter().count();

    fixture.engine.pause();
    assert_eq!(fixture.engine.state(), EngineState::Paused);
    assert_eq!(fixture.engine.next_transition(), None);
    assert!(fixture.context.active_on(Bus::Rhythm).is_empty());
    assert!(fixture
        .context
        .active_on(Bus::Melodic(InstrumentType::Tanpura))
        .is_empty());
    assert!(!fixture.engine.melodic_playing(InstrumentType::Tanpura));

    let events: Vec<EngineEvent> = fixture.events.try_iter().collect();
    assert!(events.contains(&EngineEvent::MelodicPadToggle {
        instrument: InstrumentType::Tanpura,
        playing: false,
    }));
    assert!(events.contains(&EngineEvent::StateChanged(EngineState::Paused)));

    // A boundary that was already due does nothing.
    let started = started_frames(&fixture.context).len();
    fixture.engine.on_boundary();
    assert_eq!(started_frames(&fixture.context).len(), started);
}

#[tokio::test(start_paused = true)]
async fn test_pause_applies_pending_loop() {
    let mut fixture = playing().await;
    fixture.engine.switch_to_loop(PadName::Loop3).unwrap();
    fixture.engine.pause();
    assert_eq!(fixture.engine.current_loop(), PadName::Loop3);
    assert_eq!(fixture.engine.pending_fill(), None);

    fixture.engine.play().await.unwrap();
    assert_eq!(fixture.engine.active_pad(), Some(PadName::Loop3));
}

#[tokio::test(start_paused = true)]
async fn test_autoplay_blocked_is_recoverable() {
    let mut fixture = setup();
    fixture.engine.load(&song("one"), &loop_set("a")).await.unwrap();
    fixture.context.block("needs a user gesture");

    assert!(matches!(
        fixture.engine.play().await,
        Err(EngineError::Loader(LoaderError::Audio(AudioError::Blocked(_))))
    ));
    assert_ne!(fixture.engine.state(), EngineState::Playing);
    assert!(fixture
        .events
        .try_iter()
        .any(|event| matches!(event, EngineEvent::Error(_))));

    fixture.context.unblock();
    fixture.engine.play().await.unwrap();
    assert_eq!(fixture.engine.active_pad(), Some(PadName::Loop1));
}

#[tokio::test(start_paused = true)]
async fn test_decode_failure_disables_pad() {
    let mut fixture = setup();
    fixture
        .fetcher
        .insert(&format!("{}/a_fill1.wav", BASE), b"not audio".to_vec());
    fixture.engine.load(&song("one"), &loop_set("a")).await.unwrap();
    fixture.engine.play().await.unwrap();

    assert!(fixture.events.try_iter().any(|event| matches!(
        event,
        EngineEvent::Error(message) if message.starts_with("fill1")
    )));
    assert!(!fixture.engine.enabled_pads().contains(&PadName::Fill1));
    assert!(matches!(
        fixture.engine.play_fill(PadName::Fill1),
        Err(EngineError::PadDisabled(PadName::Fill1))
    ));

    // Without its fill, the switch goes straight to the loop.
    fixture.events.try_iter().count();
    fixture.engine.switch_to_loop(PadName::Loop2).unwrap();
    assert_eq!(fixture.engine.pending_fill(), None);
    fixture.engine.on_boundary();
    assert_eq!(active_pads(&fixture.events), vec![PadName::Loop2]);
}

#[tokio::test(start_paused = true)]
async fn test_missing_loop_falls_back() {
    let mut fixture = setup();
    fixture.fetcher.fail(&format!("{}/a_loop1.wav", BASE));
    fixture.engine.load(&song("one"), &loop_set("a")).await.unwrap();
    fixture.engine.play().await.unwrap();

    assert_eq!(fixture.engine.active_pad(), Some(PadName::Loop2));
    let events: Vec<EngineEvent> = fixture.events.try_iter().collect();
    assert!(events.contains(&EngineEvent::LoopChange(PadName::Loop2)));
    assert!(events
        .iter()
        .any(|event| matches!(event, EngineEvent::Error(m) if m.starts_with("loop1"))));
}

#[tokio::test(start_paused = true)]
async fn test_reload_deferred_until_play() {
    let mut fixture = playing().await;
    publish(&fixture.fetcher, "b", TENTH / 2);

    let outcome = fixture
        .engine
        .load(&song("two"), &loop_set("b"))
        .await
        .unwrap();
    assert_eq!(outcome, LoadOutcome::Deferred);
    assert_eq!(fixture.fetcher.fetched().len(), 6);
    assert_eq!(fixture.engine.song().map(|s| s.id()), Some("one"));
    assert_eq!(fixture.engine.state(), EngineState::Playing);

    // The old buffers keep playing.
    fixture.engine.on_boundary();
    assert_eq!(started_frames(&fixture.context), vec![TENTH, TENTH]);

    fixture.engine.pause();
    fixture.engine.play().await.unwrap();
    assert_eq!(fixture.fetcher.fetched().len(), 12);
    assert_eq!(fixture.engine.song().map(|s| s.id()), Some("two"));
    assert_eq!(
        started_frames(&fixture.context),
        vec![TENTH, TENTH, TENTH / 2]
    );
}

#[tokio::test(start_paused = true)]
async fn test_load_song_without_match() {
    let mut fixture = setup();
    let dadra = LoopConditions::new("Dadra", "6/8", TempoCategory::Medium, "Pop");
    let catalog = full_set("d", &dadra);

    assert_eq!(
        fixture.engine.load_song(&song("one"), &catalog).await.unwrap(),
        None
    );
    assert_eq!(fixture.engine.state(), EngineState::Idle);

    let keherwa = LoopConditions::new("Keherwa", "4/4", TempoCategory::Medium, "Pop");
    let result = fixture
        .engine
        .load_song(&song("one"), &full_set("a", &keherwa))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(result.score, 20);
    assert_eq!(fixture.engine.state(), EngineState::Loaded);
}

#[tokio::test(start_paused = true)]
async fn test_unmatched_song_still_sets_melodic_key() {
    let mut fixture = setup();
    fixture
        .fetcher
        .insert("https://cdn.example/tanpura/D.wav", wav_bytes(1000, 44100, 1));
    let dadra = LoopConditions::new("Dadra", "6/8", TempoCategory::Medium, "Pop");

    assert_eq!(
        fixture
            .engine
            .load_song(&song("one"), &full_set("d", &dadra))
            .await
            .unwrap(),
        None
    );
    assert_eq!(fixture.engine.effective_key(), PitchClass::D);
    assert!(fixture.engine.song().is_none());

    fixture
        .engine
        .toggle_melodic_pad(InstrumentType::Tanpura)
        .await;
    assert_eq!(
        fixture
            .context
            .active_on(Bus::Melodic(InstrumentType::Tanpura)),
        vec![1000]
    );
    assert_eq!(
        fixture.fetcher.fetch_count("https://cdn.example/tanpura/D.wav"),
        1
    );
    assert_eq!(fixture.fetcher.fetch_count("https://cdn.example/tanpura/C.wav"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_melodic_pads_follow_new_song() {
    let mut fixture = setup();
    publish(&fixture.fetcher, "b", TENTH / 2);
    fixture
        .fetcher
        .insert("https://cdn.example/tanpura/D.wav", wav_bytes(1000, 44100, 1));
    fixture
        .fetcher
        .insert("https://cdn.example/tanpura/E.wav", wav_bytes(2000, 44100, 1));
    let tanpura = Bus::Melodic(InstrumentType::Tanpura);

    fixture.engine.load(&song("one"), &loop_set("a")).await.unwrap();
    fixture
        .engine
        .toggle_melodic_pad(InstrumentType::Tanpura)
        .await;
    assert_eq!(fixture.context.active_on(tanpura), vec![1000]);
    fixture.events.try_iter().count();

    fixture
        .engine
        .load(&song_in("two", "E"), &loop_set("b"))
        .await
        .unwrap();
    assert_eq!(fixture.engine.effective_key(), PitchClass::E);
    assert_eq!(fixture.context.active_on(tanpura), vec![2000]);
    assert!(fixture.engine.melodic_playing(InstrumentType::Tanpura));
    // Moving keys isn't a toggle.
    assert!(!fixture
        .events
        .try_iter()
        .any(|event| matches!(event, EngineEvent::MelodicPadToggle { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_melodic_pads_move_before_deferred_reload() {
    let mut fixture = playing().await;
    publish(&fixture.fetcher, "b", TENTH / 2);
    fixture
        .fetcher
        .insert("https://cdn.example/tanpura/D.wav", wav_bytes(1000, 44100, 1));
    fixture
        .fetcher
        .insert("https://cdn.example/tanpura/E.wav", wav_bytes(2000, 44100, 1));
    let tanpura = Bus::Melodic(InstrumentType::Tanpura);
    fixture
        .engine
        .toggle_melodic_pad(InstrumentType::Tanpura)
        .await;

    let outcome = fixture
        .engine
        .load(&song_in("two", "E"), &loop_set("b"))
        .await
        .unwrap();
    assert_eq!(outcome, LoadOutcome::Deferred);
    assert_eq!(fixture.engine.song().map(|s| s.id()), Some("one"));
    assert_eq!(fixture.context.active_on(tanpura), vec![2000]);
}

#[tokio::test(start_paused = true)]
async fn test_melodic_pads_follow_transpose() {
    let mut fixture = setup();
    fixture
        .fetcher
        .insert("https://cdn.example/tanpura/D.wav", wav_bytes(1000, 44100, 1));
    fixture
        .fetcher
        .insert("https://cdn.example/tanpura/E.wav", wav_bytes(2000, 44100, 1));
    fixture.engine.load(&song("one"), &loop_set("a")).await.unwrap();
    let tanpura = Bus::Melodic(InstrumentType::Tanpura);

    // Toggling a melodic pad unlocks the context on its own.
    fixture
        .engine
        .toggle_melodic_pad(InstrumentType::Tanpura)
        .await;
    assert_eq!(fixture.context.active_on(tanpura), vec![1000]);
    assert_eq!(fixture.context.bus_gain(tanpura), Some(0.6));
    assert_eq!(fixture.engine.state(), EngineState::Loaded);

    fixture.engine.set_transpose(2).await;
    assert_eq!(fixture.engine.effective_key(), PitchClass::E);
    assert_eq!(fixture.context.active_on(tanpura), vec![2000]);
    assert!(fixture.engine.melodic_playing(InstrumentType::Tanpura));

    // Nothing is published for D#/Eb.
    fixture.events.try_iter().count();
    fixture.engine.set_transpose(1).await;
    assert!(!fixture.engine.melodic_playing(InstrumentType::Tanpura));
    assert!(fixture.context.active_on(tanpura).is_empty());
    assert!(fixture.events.try_iter().any(|event| matches!(
        event,
        EngineEvent::MelodicError {
            instrument: InstrumentType::Tanpura,
            ..
        }
    )));
}

#[tokio::test(start_paused = true)]
async fn test_melodic_toggle_leaves_rhythm_alone() {
    let mut fixture = playing().await;
    fixture
        .fetcher
        .insert("https://cdn.example/atmosphere/D.wav", wav_bytes(500, 44100, 1));
    let deadline = fixture.engine.next_transition();

    fixture
        .engine
        .toggle_melodic_pad(InstrumentType::Atmosphere)
        .await;
    fixture
        .engine
        .toggle_melodic_pad(InstrumentType::Atmosphere)
        .await;

    assert_eq!(fixture.engine.active_pad(), Some(PadName::Loop1));
    assert_eq!(fixture.engine.next_transition(), deadline);
    assert_eq!(fixture.context.active_on(Bus::Rhythm).len(), 1);
    assert_eq!(
        fixture.events.try_iter().collect::<Vec<_>>(),
        vec![
            EngineEvent::MelodicPadToggle {
                instrument: InstrumentType::Atmosphere,
                playing: true,
            },
            EngineEvent::MelodicPadToggle {
                instrument: InstrumentType::Atmosphere,
                playing: false,
            },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_melodic_unavailable() {
    let mut fixture = playing().await;
    fixture
        .engine
        .toggle_melodic_pad(InstrumentType::Atmosphere)
        .await;
    assert!(!fixture.engine.melodic_playing(InstrumentType::Atmosphere));
    assert!(fixture.events.try_iter().any(|event| matches!(
        event,
        EngineEvent::MelodicError {
            instrument: InstrumentType::Atmosphere,
            ..
        }
    )));
}

#[tokio::test(start_paused = true)]
async fn test_stale_melodic_fetch_is_cached_not_started() {
    let mut fixture = playing().await;
    fixture
        .fetcher
        .insert("https://cdn.example/atmosphere/D.wav", wav_bytes(500, 44100, 1));

    let fetch = fixture
        .engine
        .request_melodic_toggle(InstrumentType::Atmosphere)
        .unwrap();
    assert!(fixture.engine.melodic_playing(InstrumentType::Atmosphere));
    assert!(fixture
        .engine
        .request_melodic_toggle(InstrumentType::Atmosphere)
        .is_none());

    fixture.engine.finish_melodic(fetch.run().await);
    assert!(!fixture.engine.melodic_playing(InstrumentType::Atmosphere));
    assert!(fixture
        .context
        .active_on(Bus::Melodic(InstrumentType::Atmosphere))
        .is_empty());

    // The next toggle starts from the cache.
    assert!(fixture
        .engine
        .request_melodic_toggle(InstrumentType::Atmosphere)
        .is_none());
    assert_eq!(
        fixture
            .context
            .active_on(Bus::Melodic(InstrumentType::Atmosphere)),
        vec![500]
    );
    assert_eq!(
        fixture
            .fetcher
            .fetch_count("https://cdn.example/atmosphere/D.wav"),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn test_availability_follows_key() {
    let mut fixture = playing().await;
    fixture
        .fetcher
        .insert("https://cdn.example/tanpura/D.wav", wav_bytes(10, 44100, 1));

    let availability = fixture.engine.availability_check().await;
    assert_eq!(availability.get(&InstrumentType::Tanpura), Some(&true));
    assert_eq!(availability.get(&InstrumentType::Atmosphere), Some(&false));

    fixture.engine.set_transpose(1).await;
    let availability = fixture.engine.availability_check().await;
    assert_eq!(availability.get(&InstrumentType::Tanpura), Some(&false));
}

#[tokio::test(start_paused = true)]
async fn test_volume() {
    let mut fixture = playing().await;
    fixture.engine.set_volume(1.5);
    assert_eq!(fixture.engine.volume(), 1.0);
    assert_eq!(fixture.context.master_gain(), 1.0);

    fixture
        .engine
        .set_melodic_volume(InstrumentType::Atmosphere, 0.25);
    assert_eq!(
        fixture
            .context
            .bus_gain(Bus::Melodic(InstrumentType::Atmosphere)),
        Some(0.25)
    );
}

#[tokio::test(start_paused = true)]
async fn test_destroy_releases_context() {
    let mut fixture = playing().await;
    fixture.engine.destroy();

    assert!(fixture.context.is_closed());
    assert_eq!(fixture.engine.state(), EngineState::Idle);
    assert_eq!(fixture.engine.next_transition(), None);
    assert!(fixture.engine.enabled_pads().is_empty());
    assert!(matches!(
        fixture.engine.play().await,
        Err(EngineError::Destroyed)
    ));
}
