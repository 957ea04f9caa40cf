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

use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{info, span, warn, Level};

use super::Event;
use crate::assets::InstrumentType;
use crate::catalog::PadName;

const PLAY: &str = "play";
const PAUSE: &str = "pause";
const AUTO_FILL: &str = "autofill";
const UP: &str = "up";
const DOWN: &str = "down";
const FASTER: &str = "faster";
const SLOWER: &str = "slower";
const STATUS: &str = "status";
const QUIT: &str = "quit";

pub struct Driver {}

impl Driver {
    pub fn new() -> Driver {
        Driver {}
    }

    fn parse(input: &str) -> Option<Event> {
        let input = input.trim().to_lowercase();
        match input.as_str() {
            PLAY => Some(Event::Play),
            PAUSE => Some(Event::Pause),
            AUTO_FILL => Some(Event::AutoFill),
            UP => Some(Event::TransposeUp),
            DOWN => Some(Event::TransposeDown),
            FASTER => Some(Event::Faster),
            SLOWER => Some(Event::Slower),
            STATUS => Some(Event::Status),
            QUIT => Some(Event::Quit),
            other => {
                if let Ok(pad) = other.parse::<PadName>() {
                    Some(if pad.is_loop() {
                        Event::Loop(pad)
                    } else {
                        Event::Fill(pad)
                    })
                } else {
                    other.parse::<InstrumentType>().ok().map(Event::Melodic)
                }
            }
        }
    }

    /// Reads one command. Returns false once the input is exhausted or the
    /// user quits.
    fn monitor_io<R, W>(
        events_tx: &Sender<Event>,
        mut reader: R,
        mut writer: W,
    ) -> Result<bool, io::Error>
    where
        R: io::BufRead,
        W: io::Write,
    {
        write!(
            writer,
            "Command ({}, {}, loop1-3, fill1-3, atmosphere, tanpura, {}, {}, {}, {}, {}, {}, {}): ",
            PLAY, PAUSE, AUTO_FILL, UP, DOWN, FASTER, SLOWER, STATUS, QUIT,
        )?;
        writer.flush()?;
        let mut input: String = String::default();
        if reader.read_line(&mut input)? == 0 {
            events_tx
                .blocking_send(Event::Quit)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            return Ok(false);
        }

        let Some(event) = Self::parse(&input) else {
            warn!(input = input.trim(), "Unrecognized input");
            return Ok(true);
        };
        let quit = event == Event::Quit;
        events_tx
            .blocking_send(event)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(!quit)
    }
}

impl Default for Driver {
    fn default() -> Self {
        Self::new()
    }
}

impl super::Driver for Driver {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
        tokio::task::spawn_blocking(move || {
            let span = span!(Level::INFO, "keyboard driver");
            let _enter = span.enter();

            info!("Keyboard driver started.");

            while Self::monitor_io(&events_tx, io::stdin().lock(), io::stdout())? {}
            info!("Keyboard driver stopped.");
            Ok(())
        })
    }
}
