use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Device, SampleFormat, SampleRate, Stream, StreamConfig};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use log::{info, warn};

use super::{AudioError, AudioSource, CaptureConfig, InputStream, SampleCallback};

/// Pending driver errors kept for the render thread; the oldest is evicted when full.
const ERROR_BACKLOG: usize = 16;

/// Largest mono block handed to the sample callback. Bigger driver buffers are split.
const DOWNMIX_CHUNK: usize = 1024;

/// Queues `message`, evicting the oldest pending one if the backlog is full.
fn push_latest(sender: &Sender<String>, backlog: &Receiver<String>, message: String) {
    if let Err(TrySendError::Full(message)) = sender.try_send(message) {
        let _ = backlog.try_recv();
        let _ = sender.try_send(message);
    }
}

/// Averages interleaved frames to mono without allocating after construction.
struct Downmixer {
    channels: usize,
    mono: Vec<f32>,
}

impl Downmixer {
    fn new(channels: usize) -> Self {
        Self {
            channels: channels.max(1),
            mono: Vec::with_capacity(DOWNMIX_CHUNK),
        }
    }

    fn process(&mut self, data: &[f32], on_data: &mut SampleCallback) {
        let channels = self.channels;
        if channels == 1 {
            on_data(data);
            return;
        }
        for block in data.chunks(channels * DOWNMIX_CHUNK) {
            self.mono.clear();
            self.mono.extend(
                block
                    .chunks(channels)
                    .map(|frame| frame.iter().sum::<f32>() / channels as f32),
            );
            on_data(&self.mono);
        }
    }
}

/// Microphone input through the platform's default cpal host.
pub struct CpalSource {
    device_name: Option<String>,
}

impl CpalSource {
    /// Uses the host's default input device.
    pub fn new() -> Self {
        Self { device_name: None }
    }

    /// Uses the first input device whose name contains `name`.
    pub fn with_device_name(name: impl Into<String>) -> Self {
        Self {
            device_name: Some(name.into()),
        }
    }

    pub fn list_input_devices() -> Result<Vec<String>, AudioError> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?;
        Ok(devices.filter_map(|d| d.name().ok()).collect())
    }

    fn find_device(&self) -> Result<Device, AudioError> {
        let host = cpal::default_host();
        match &self.device_name {
            None => host.default_input_device().ok_or_else(|| {
                AudioError::DeviceUnavailable("no default input device".to_string())
            }),
            Some(wanted) => host
                .input_devices()
                .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?
                .find(|d| d.name().map(|n| n.contains(wanted.as_str())).unwrap_or(false))
                .ok_or_else(|| {
                    AudioError::DeviceUnavailable(format!("no input device matching '{}'", wanted))
                }),
        }
    }

    /// Picks an f32 configuration at the requested rate, preferring the requested
    /// channel count and otherwise the fewest channels offered.
    fn choose_config(device: &Device, config: &CaptureConfig) -> Result<StreamConfig, AudioError> {
        let rate = SampleRate(config.sample_rate);
        let candidate = device
            .supported_input_configs()
            .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?
            .filter(|range| {
                range.sample_format() == SampleFormat::F32
                    && range.min_sample_rate() <= rate
                    && range.max_sample_rate() >= rate
            })
            .min_by_key(|range| {
                if range.channels() == config.channels {
                    0
                } else {
                    range.channels() as u32
                }
            })
            .ok_or_else(|| {
                AudioError::UnsupportedConfig(format!(
                    "device offers no f32 input at {} Hz",
                    config.sample_rate
                ))
            })?;

        Ok(StreamConfig {
            channels: candidate.channels(),
            sample_rate: rate,
            buffer_size: BufferSize::Fixed(config.buffer_frames),
        })
    }

    fn build_stream(
        device: &Device,
        stream_config: &StreamConfig,
        mut on_data: SampleCallback,
        errors: Sender<String>,
        backlog: Receiver<String>,
    ) -> Result<Stream, cpal::BuildStreamError> {
        let mut downmixer = Downmixer::new(stream_config.channels as usize);

        device.build_input_stream(
            stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                downmixer.process(data, &mut on_data);
            },
            move |err| push_latest(&errors, &backlog, err.to_string()),
            None,
        )
    }
}

impl Default for CpalSource {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSource for CpalSource {
    fn name(&self) -> String {
        self.device_name
            .clone()
            .unwrap_or_else(|| "default input".to_string())
    }

    fn open(
        &mut self,
        config: &CaptureConfig,
        on_data: SampleCallback,
    ) -> Result<Box<dyn InputStream>, AudioError> {
        let device = self.find_device()?;
        info!(
            "Using audio device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );

        let mut stream_config = Self::choose_config(&device, config)?;
        if stream_config.channels != config.channels {
            warn!(
                "Device has no {}-channel input, downmixing {} channels",
                config.channels, stream_config.channels
            );
        }

        let (error_sender, error_receiver) = crossbeam_channel::bounded(ERROR_BACKLOG);

        // Shared so the callback survives a failed fixed-size attempt.
        let on_data = Arc::new(Mutex::new(on_data));
        let forward = |shared: &Arc<Mutex<SampleCallback>>| -> SampleCallback {
            let shared = Arc::clone(shared);
            Box::new(move |samples: &[f32]| {
                if let Ok(mut callback) = shared.try_lock() {
                    (*callback)(samples);
                }
            })
        };

        let stream = match Self::build_stream(
            &device,
            &stream_config,
            forward(&on_data),
            error_sender.clone(),
            error_receiver.clone(),
        ) {
            Ok(stream) => stream,
            Err(e) => {
                warn!(
                    "Fixed {} frame buffer rejected ({}), using driver default",
                    config.buffer_frames, e
                );
                stream_config.buffer_size = BufferSize::Default;
                Self::build_stream(
                    &device,
                    &stream_config,
                    forward(&on_data),
                    error_sender,
                    error_receiver.clone(),
                )
                .map_err(|e| AudioError::StreamBuild(e.to_string()))?
            }
        };

        info!(
            "Input stream: {} channel(s) at {} Hz, buffer {:?}",
            stream_config.channels, stream_config.sample_rate.0, stream_config.buffer_size
        );

        Ok(Box::new(CpalStream {
            stream,
            errors: error_receiver,
        }))
    }
}

struct CpalStream {
    stream: Stream,
    errors: Receiver<String>,
}

impl InputStream for CpalStream {
    fn start(&mut self) -> Result<(), AudioError> {
        self.stream
            .play()
            .map_err(|e| AudioError::StreamControl(e.to_string()))
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.stream
            .pause()
            .map_err(|e| AudioError::StreamControl(e.to_string()))
    }

    fn poll_error(&self) -> Option<AudioError> {
        self.errors.try_recv().ok().map(AudioError::Stream)
    }
}
