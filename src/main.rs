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
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{crate_version, Parser, Subcommand};
use padloop::assets::{self, AssetUrls, InstrumentType};
use padloop::catalog::{fetch_catalog, TempoCategory};
use padloop::config::{Matching, Player};
use padloop::controller::{keyboard, Controller};
use padloop::driver::EngineHandle;
use padloop::engine::PlaybackEngine;
use padloop::key::{self, PitchClass};
use padloop::matcher::{self, Matcher};
use padloop::prober::AvailabilityProber;
use padloop::songs::SongDescriptor;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A rhythm-pad loop and fill player."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolves the key melodic pads would play in.
    Key {
        /// The song key, e.g. C, F#m, Bb.
        key: String,
        /// Semitones to transpose by.
        #[arg(allow_negative_numbers = true, default_value_t = 0)]
        transpose: i32,
    },
    /// Finds the best loop set in a catalog for the given song metadata.
    Match {
        /// The catalog URL or path.
        #[arg(short, long)]
        catalog: String,
        /// The song's taal.
        #[arg(long)]
        taal: String,
        /// The song's time signature, e.g. 4/4.
        #[arg(long)]
        time: String,
        /// The song's genre.
        #[arg(long, default_value = "")]
        genre: String,
        /// The song's tempo in beats per minute.
        #[arg(long)]
        bpm: Option<f64>,
    },
    /// Checks which melodic pads are available in a key.
    Probe {
        /// The path to the player config.
        #[arg(short, long)]
        config: PathBuf,
        /// The song key.
        #[arg(short, long)]
        key: String,
        /// Semitones to transpose by.
        #[arg(short, long, allow_negative_numbers = true, default_value_t = 0)]
        transpose: i32,
    },
    /// Lists the available audio output devices.
    Devices {},
    /// Plays a song's matched loops, controlled from the keyboard.
    Play {
        /// The path to the player config.
        #[arg(short, long)]
        config: PathBuf,
        /// The path to the song descriptor.
        #[arg(short, long)]
        song: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Key { key, transpose } => {
            let base = key::base_pitch_class(&key);
            let effective = key::effective_key(&key, transpose);
            match base {
                Some(base) => println!("{} -> {} (transpose {:+})", base, effective, transpose),
                None => println!(
                    "Unrecognized key '{}', resolving from C -> {} (transpose {:+})",
                    key, effective, transpose
                ),
            }
        }
        Commands::Match {
            catalog,
            taal,
            time,
            genre,
            bpm,
        } => {
            let fetcher = assets::fetcher(DEFAULT_TIMEOUT)?;
            let assets = fetch_catalog(fetcher.as_ref(), &catalog).await?;
            let song = SongDescriptor::new("cli", "", &taal, &time, &genre, bpm);

            if let Some(bpm) = song.tempo_bpm() {
                let category: TempoCategory =
                    matcher::tempo_category(bpm, Matching::default().tempo());
                println!("Tempo category: {}", category);
            }

            match Matcher::default().find_best_match(&song, &assets) {
                Some(result) => {
                    println!("Best match (score {}): {}", result.score, result.loop_set);
                    for (pad, asset) in result.loop_set.pads() {
                        println!("- {}: {}", pad, asset.filename);
                    }
                }
                None => println!("No loop set matches taal '{}' in {}.", taal, time),
            }
        }
        Commands::Probe {
            config,
            key,
            transpose,
        } => {
            let player = Player::deserialize(&config)?;
            let fetcher = assets::fetcher(player.http_timeout()?)?;
            let prober = AvailabilityProber::new(
                fetcher,
                AssetUrls::new(player.loops_base_url(), player.melodic_url_template()),
            );
            let effective: PitchClass = key::effective_key(&key, transpose);

            println!("Melodic pads in {}:", effective);
            let availability = prober
                .check_availability(&InstrumentType::ALL, effective)
                .await;
            for instrument in InstrumentType::ALL {
                let available = availability.get(&instrument).copied().unwrap_or(false);
                println!(
                    "- {}: {}",
                    instrument,
                    if available { "available" } else { "missing" }
                );
            }
        }
        Commands::Devices {} => {
            let devices = padloop::audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Play { config, song } => {
            let player = Player::deserialize(&config)?;
            let song = SongDescriptor::deserialize(&song)?;
            info!(song = %song, "Loaded song");

            let fetcher = assets::fetcher(player.http_timeout()?)?;
            let catalog = fetch_catalog(fetcher.as_ref(), player.catalog_url()).await?;

            let engine = EngineHandle::spawn(PlaybackEngine::from_config(&player)?);
            let events = engine.subscribe().await?;
            thread::spawn(move || {
                for event in events.iter() {
                    info!(event = ?event, "Engine event");
                }
            });

            match engine.load_song(song, catalog).await? {
                Some(result) => println!(
                    "Loaded {} (score {}). Type play, pause, loop1-3, fill1-3, atmosphere, tanpura, autofill, up, down, faster, slower, status or quit.",
                    result.loop_set, result.score
                ),
                None => println!("No loop set matches this song. Melodic pads are still available."),
            }

            let mut controller = Controller::new(engine, Arc::new(keyboard::Driver::new()));
            controller.join().await?;
        }
    }

    Ok(())
}
