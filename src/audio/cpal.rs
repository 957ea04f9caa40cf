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
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{error, info, warn};

use super::mixer::Mixer;
use super::{AudioError, Bus, DecodedBuffer, SourceId, SourceParams};

/// An audio context backed by a cpal output stream. The device isn't opened
/// until the context is resumed.
pub struct Context {
    device_name: String,
    mixer: Mixer,
    sample_rate: Option<u32>,
    next_id: SourceId,
    shutdown: Arc<AtomicBool>,
    output_thread: Option<thread::JoinHandle<()>>,
    closed: bool,
}

impl Context {
    pub fn new(device_name: &str) -> Context {
        Context {
            device_name: device_name.to_string(),
            mixer: Mixer::new(),
            sample_rate: None,
            next_id: 0,
            shutdown: Arc::new(AtomicBool::new(false)),
            output_thread: None,
            closed: false,
        }
    }

    fn find_device(host: &cpal::Host, name: &str) -> Result<cpal::Device, AudioError> {
        if name == "default" {
            return host.default_output_device().ok_or(AudioError::NoDevice);
        }

        let devices = host
            .output_devices()
            .map_err(|e| AudioError::Device(e.to_string()))?;
        for device in devices {
            if device.name().map(|n| n.trim() == name).unwrap_or(false) {
                return Ok(device);
            }
        }
        Err(AudioError::Device(format!("no output device named '{}'", name)))
    }

    /// Opens the device and runs the stream until shutdown. The stream is
    /// created on the output thread since cpal streams can't move between threads.
    fn run_output(
        device_name: String,
        mixer: Mixer,
        shutdown: Arc<AtomicBool>,
        ready: mpsc::Sender<Result<u32, AudioError>>,
    ) {
        let host = cpal::default_host();
        let device = match Self::find_device(&host, &device_name) {
            Ok(device) => device,
            Err(e) => {
                let _ = ready.send(Err(e));
                return;
            }
        };
        let supported = match device.default_output_config() {
            Ok(supported) => supported,
            Err(e) => {
                let _ = ready.send(Err(AudioError::Device(e.to_string())));
                return;
            }
        };

        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.config();
        let sample_rate = config.sample_rate;

        let stream_result = match sample_format {
            cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, mixer),
            cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, mixer),
            cpal::SampleFormat::I32 => build_stream::<i32>(&device, &config, mixer),
            cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, mixer),
            other => {
                let _ = ready.send(Err(AudioError::Device(format!(
                    "unsupported sample format {:?}",
                    other
                ))));
                return;
            }
        };

        let stream = match stream_result {
            Ok(stream) => stream,
            Err(e) => {
                error!("Failed to create CPAL stream: {}", e);
                let _ = ready.send(Err(AudioError::Device(e.to_string())));
                return;
            }
        };
        if let Err(e) = stream.play() {
            error!("Failed to start CPAL stream: {}", e);
            let _ = ready.send(Err(AudioError::Blocked(e.to_string())));
            return;
        }

        info!(
            device = device_name,
            sample_rate,
            channels = config.channels,
            "CPAL output stream started"
        );
        let _ = ready.send(Ok(sample_rate));

        while !shutdown.load(Ordering::Relaxed) {
            thread::sleep(Duration::from_millis(50));
        }
        drop(stream);
        info!(device = device_name, "CPAL output stream stopped");
    }
}

/// Lists the names of the output devices on the default host.
pub fn list_devices() -> Result<Vec<String>, AudioError> {
    let host = cpal::default_host();
    let devices = host
        .output_devices()
        .map_err(|e| AudioError::Device(e.to_string()))?;

    let mut names: Vec<String> = devices
        .filter_map(|device| match device.name() {
            Ok(name) => Some(name),
            Err(e) => {
                warn!(err = %e, "Unable to read device name");
                None
            }
        })
        .collect();
    names.sort();
    Ok(names)
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mixer: Mixer,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels = config.channels as usize;
    let mut scratch: Vec<f32> = Vec::new();
    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            scratch.resize(data.len(), 0.0);
            mixer.render(&mut scratch, channels);
            for (out, &sample) in data.iter_mut().zip(scratch.iter()) {
                *out = T::from_sample(sample);
            }
        },
        |err| error!("CPAL output stream error: {}", err),
        None,
    )
}

impl super::AudioContext for Context {
    fn resume(&mut self) -> Result<u32, AudioError> {
        if self.closed {
            return Err(AudioError::Closed);
        }
        if let Some(sample_rate) = self.sample_rate {
            return Ok(sample_rate);
        }

        let (ready_tx, ready_rx) = mpsc::channel();
        let device_name = self.device_name.clone();
        let mixer = self.mixer.clone();
        let shutdown = self.shutdown.clone();
        let output_thread =
            thread::spawn(move || Self::run_output(device_name, mixer, shutdown, ready_tx));

        match ready_rx.recv() {
            Ok(Ok(sample_rate)) => {
                self.sample_rate = Some(sample_rate);
                self.output_thread = Some(output_thread);
                Ok(sample_rate)
            }
            Ok(Err(e)) => {
                let _ = output_thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = output_thread.join();
                Err(AudioError::Device("output thread exited".to_string()))
            }
        }
    }

    fn is_running(&self) -> bool {
        !self.closed && self.sample_rate.is_some()
    }

    fn sample_rate(&self) -> Option<u32> {
        self.sample_rate
    }

    fn set_master_gain(&mut self, gain: f32) {
        self.mixer.set_master_gain(gain);
    }

    fn set_bus_gain(&mut self, bus: Bus, gain: f32) {
        self.mixer.set_bus_gain(bus, gain);
    }

    fn start_source(
        &mut self,
        buffer: &DecodedBuffer,
        params: SourceParams,
    ) -> Result<SourceId, AudioError> {
        if !self.is_running() {
            return Err(AudioError::NotRunning);
        }
        self.next_id += 1;
        self.mixer.add(self.next_id, buffer.clone(), params);
        Ok(self.next_id)
    }

    fn stop_source(&mut self, id: SourceId) {
        self.mixer.remove(id);
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.mixer.clear();
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(output_thread) = self.output_thread.take() {
            if output_thread.join().is_err() {
                warn!("CPAL output thread panicked");
            }
        }
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        super::AudioContext::close(self);
    }
}
