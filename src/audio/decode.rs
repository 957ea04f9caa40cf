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

use rubato::{
    SincFixedIn, SincInterpolationParameters, SincInterpolationType, VecResampler, WindowFunction,
};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::debug;

use super::DecodedBuffer;

/// Input block size for the sinc resampler.
const INPUT_BLOCK_SIZE: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("audio decode error: {0}")]
    Audio(#[from] SymphoniaError),

    #[error("no audio track found")]
    NoAudioTrack,

    #[error("decoded audio contains no samples")]
    Empty,

    #[error("unable to resample from {from} Hz to {to} Hz: {reason}")]
    Resample { from: u32, to: u32, reason: String },
}

/// Decodes an encoded audio file (WAV, MP3, FLAC, ...) held in memory and
/// resamples it to the target rate.
pub fn decode_audio(bytes: Vec<u8>, target_rate: u32) -> Result<DecodedBuffer, DecodeError> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());
    let probed = get_probe().format(
        &Hint::new(),
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecodeError::NoAudioTrack)?;
    let track_id = track.id;
    let mut decoder = get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut samples: Vec<f32> = Vec::new();
    let mut channel_count: u16 = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(0);
    let mut source_rate = track.codec_params.sample_rate.unwrap_or(0);

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                debug!(err = e, "Skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        channel_count = spec.channels.count() as u16;
        source_rate = spec.rate;

        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buffer.samples());
    }

    if samples.is_empty() || channel_count == 0 || source_rate == 0 {
        return Err(DecodeError::Empty);
    }

    if source_rate != target_rate {
        samples = resample(&samples, channel_count, source_rate, target_rate)?;
    }

    Ok(DecodedBuffer::new(samples, channel_count, target_rate))
}

/// Resamples interleaved audio with a sinc resampler. The output is trimmed of
/// the resampler's delay so it lines up with the input and holds exactly
/// `ceil(frames * target_rate / source_rate)` frames.
pub fn resample(
    samples: &[f32],
    channel_count: u16,
    source_rate: u32,
    target_rate: u32,
) -> Result<Vec<f32>, DecodeError> {
    let channels = channel_count.max(1) as usize;
    let frames = samples.len() / channels;
    let ratio = target_rate as f64 / source_rate as f64;
    let expected = (frames as f64 * ratio).ceil() as usize;
    let failed = |reason: String| DecodeError::Resample {
        from: source_rate,
        to: target_rate,
        reason,
    };

    let sinc_params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        oversampling_factor: 128,
        interpolation: SincInterpolationType::Linear,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler =
        SincFixedIn::<f32>::new(ratio, 1.0, sinc_params, INPUT_BLOCK_SIZE, channels)
            .map_err(|e| failed(e.to_string()))?;

    let planar: Vec<Vec<f32>> = (0..channels)
        .map(|channel| samples.iter().skip(channel).step_by(channels).copied().collect())
        .collect();
    let delay = resampler.output_delay();
    let wanted = delay + expected;
    let mut output: Vec<Vec<f32>> = vec![Vec::with_capacity(wanted); channels];
    let mut scratch = resampler.output_buffer_allocate(true);

    let mut pos = 0;
    while frames - pos >= resampler.input_frames_next() {
        let needed = resampler.input_frames_next();
        let chunk: Vec<Vec<f32>> = planar
            .iter()
            .map(|channel| channel[pos..pos + needed].to_vec())
            .collect();
        let (nbr_in, nbr_out) = resampler
            .process_into_buffer(&chunk, &mut scratch, None)
            .map_err(|e| failed(e.to_string()))?;
        append_planar(&mut output, &scratch, nbr_out);
        pos += nbr_in;
    }

    if pos < frames {
        let rest: Vec<Vec<f32>> = planar.iter().map(|channel| channel[pos..].to_vec()).collect();
        let (_, nbr_out) = resampler
            .process_partial_into_buffer(Some(&rest as &[Vec<f32>]), &mut scratch, None)
            .map_err(|e| failed(e.to_string()))?;
        append_planar(&mut output, &scratch, nbr_out);
    }

    // Flush the delay line.
    while output[0].len() < wanted {
        let (_, nbr_out) = resampler
            .process_partial_into_buffer(None::<&[Vec<f32>]>, &mut scratch, None)
            .map_err(|e| failed(e.to_string()))?;
        if nbr_out == 0 {
            break;
        }
        append_planar(&mut output, &scratch, nbr_out);
    }

    let mut interleaved = Vec::with_capacity(expected * channels);
    for frame in delay..wanted {
        for channel in &output {
            interleaved.push(channel.get(frame).copied().unwrap_or(0.0));
        }
    }
    debug!(
        from = source_rate,
        to = target_rate,
        frames,
        resampled = expected,
        "Resampled audio"
    );
    Ok(interleaved)
}

fn append_planar(output: &mut [Vec<f32>], planar: &[Vec<f32>], frames: usize) {
    for (out, channel) in output.iter_mut().zip(planar) {
        out.extend_from_slice(&channel[..frames.min(channel.len())]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::wav_bytes;

    #[test]
    fn test_decode_wav() {
        let buffer = decode_audio(wav_bytes(4410, 44100, 2), 44100).unwrap();
        assert_eq!(buffer.channel_count(), 2);
        assert_eq!(buffer.sample_rate(), 44100);
        assert_eq!(buffer.frames(), 4410);
    }

    #[test]
    fn test_decode_resamples() {
        let buffer = decode_audio(wav_bytes(44100, 44100, 1), 48000).unwrap();
        assert_eq!(buffer.sample_rate(), 48000);
        assert_eq!(buffer.frames(), 48000);
    }

    #[test]
    fn test_decode_garbage() {
        assert!(decode_audio(b"definitely not audio".to_vec(), 44100).is_err());
        assert!(decode_audio(Vec::new(), 44100).is_err());
    }

    #[test]
    fn test_resample_lines_up_with_input() {
        let output = resample(&[0.5; 4410], 1, 44100, 48000).unwrap();
        assert_eq!(output.len(), 4800);
        // Away from the edges a constant signal stays constant.
        assert!(output[500..4300].iter().all(|s| (s - 0.5).abs() < 0.02));
    }

    #[test]
    fn test_resample_keeps_channels_apart() {
        let stereo: Vec<f32> = (0..8000).flat_map(|_| [0.25, -0.25]).collect();
        let output = resample(&stereo, 2, 32000, 48000).unwrap();
        assert_eq!(output.len(), 12000 * 2);
        for frame in output.chunks(2).skip(1000).take(10000) {
            assert!((frame[0] - 0.25).abs() < 0.02);
            assert!((frame[1] + 0.25).abs() < 0.02);
        }
    }
}
