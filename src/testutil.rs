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
use std::io::Cursor;
use std::time::{Duration, SystemTime};

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::catalog::{LoopAsset, LoopConditions, PadName};

/// A complete six-asset catalog slice named `{prefix}_loop1.wav` through
/// `{prefix}_fill3.wav`.
pub fn full_set(prefix: &str, conditions: &LoopConditions) -> Vec<LoopAsset> {
    PadName::ALL
        .into_iter()
        .map(|pad| {
            LoopAsset::new(
                &format!("{}_{}.wav", prefix, pad),
                pad.kind(),
                pad.number(),
                conditions.clone(),
            )
        })
        .collect()
}

/// An in-memory 16-bit WAV file holding a quiet ramp of the given length.
pub fn wav_bytes(frames: usize, sample_rate: u32, channels: u16) -> Vec<u8> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
        for frame in 0..frames {
            for _ in 0..channels {
                writer.write_sample((frame % 1000) as i16).unwrap();
            }
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// Wait for the given async predicate to return true or fail.
pub async fn eventually_async<F, Fut>(mut predicate: F, error_msg: &str)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = SystemTime::now();
    let tick = Duration::from_millis(10);
    let timeout = Duration::from_secs(3);

    loop {
        let elapsed = start.elapsed().unwrap_or_default();
        if elapsed > timeout {
            panic!("{}", error_msg);
        }
        if predicate().await {
            return;
        }
        tokio::time::sleep(tick).await;
    }
}
