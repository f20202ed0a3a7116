//! Microphone capture using cpal
//!
//! Blocking device reads run on a dedicated thread; converted frames are
//! pushed into a bounded channel owned by the recorder. Stopping sets a
//! flag and joins the thread, which drops the stream and closes the
//! channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleFormat;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame};

/// Errors that can occur during audio capture
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("no audio input device found")]
    NoInputDevice,

    #[error("no supported audio configuration found")]
    NoSupportedConfig,

    #[error("unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("audio device error: {0}")]
    Device(String),
}

/// Default input device backend.
pub struct MicrophoneBackend {
    config: AudioBackendConfig,
    is_capturing: Arc<AtomicBool>,
    thread_handle: Option<thread::JoinHandle<()>>,
    last_error: Arc<Mutex<Option<CaptureError>>>,
}

impl MicrophoneBackend {
    pub fn new(config: AudioBackendConfig) -> Self {
        Self {
            config,
            is_capturing: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
            last_error: Arc::new(Mutex::new(None)),
        }
    }
}

#[async_trait::async_trait]
impl AudioBackend for MicrophoneBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.thread_handle.is_some() {
            anyhow::bail!("capture already running");
        }

        let (frame_tx, frame_rx) = mpsc::channel(self.config.channel_capacity);

        self.is_capturing.store(true, Ordering::SeqCst);
        if let Ok(mut slot) = self.last_error.lock() {
            *slot = None;
        }

        let is_capturing = Arc::clone(&self.is_capturing);
        let last_error = Arc::clone(&self.last_error);
        let config = self.config.clone();

        self.thread_handle = Some(thread::spawn(move || {
            if let Err(e) = run_capture(&config, &is_capturing, frame_tx, &last_error) {
                error!("Audio capture error: {}", e);
                if let Ok(mut slot) = last_error.lock() {
                    *slot = Some(e);
                }
                is_capturing.store(false, Ordering::SeqCst);
            }
        }));

        Ok(frame_rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.is_capturing.store(false, Ordering::SeqCst);

        // Synchronous join: a stop blocks at most as long as one device
        // read. A stuck device read blocks indefinitely (accepted
        // limitation).
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }

        if let Some(err) = self.last_error.lock().ok().and_then(|mut s| s.take()) {
            return Err(err.into());
        }

        info!("Audio capture stopped");
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.is_capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "microphone"
    }
}

/// Run audio capture on the current thread (blocking until stopped)
fn run_capture(
    config: &AudioBackendConfig,
    is_capturing: &Arc<AtomicBool>,
    frame_tx: mpsc::Sender<AudioFrame>,
    last_error: &Arc<Mutex<Option<CaptureError>>>,
) -> Result<(), CaptureError> {
    let host = cpal::default_host();

    let device = host
        .default_input_device()
        .ok_or(CaptureError::NoInputDevice)?;

    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    info!("Using audio input device: {}", device_name);

    // Prefer a device configuration that covers the target rate; otherwise
    // fall back to the highest supported rate and decimate.
    let supported_configs = device
        .supported_input_configs()
        .map_err(|e| CaptureError::Device(e.to_string()))?;

    let mut best_config = None;
    for supported in supported_configs {
        if supported.channels() == 0 {
            continue;
        }
        if supported.min_sample_rate().0 <= config.target_sample_rate
            && supported.max_sample_rate().0 >= config.target_sample_rate
        {
            best_config =
                Some(supported.with_sample_rate(cpal::SampleRate(config.target_sample_rate)));
            break;
        } else if best_config.is_none() {
            best_config = Some(supported.with_max_sample_rate());
        }
    }
    let supported_config = best_config.ok_or(CaptureError::NoSupportedConfig)?;

    let sample_format = supported_config.sample_format();
    let stream_config: cpal::StreamConfig = supported_config.into();
    let device_rate = stream_config.sample_rate.0;
    let device_channels = stream_config.channels as usize;

    if device_rate != config.target_sample_rate {
        warn!(
            "{}Hz not supported, capturing at {}Hz",
            config.target_sample_rate, device_rate
        );
    }
    info!("Audio config: {} channels, {} Hz", device_channels, device_rate);

    let started = Instant::now();

    let stream_error = Arc::clone(last_error);
    let stream_flag = Arc::clone(is_capturing);
    let err_callback = move |err: cpal::StreamError| {
        error!("Audio stream error: {}", err);
        if let Ok(mut slot) = stream_error.lock() {
            *slot = Some(CaptureError::Device(err.to_string()));
        }
        // Abort the recording; the error surfaces when the stream is
        // stopped and joined.
        stream_flag.store(false, Ordering::SeqCst);
    };

    let stream = match sample_format {
        SampleFormat::I16 => {
            let flag = Arc::clone(is_capturing);
            let tx = frame_tx.clone();
            let cfg = config.clone();
            device
                .build_input_stream(
                    &stream_config,
                    move |data: &[i16], _| {
                        if !flag.load(Ordering::SeqCst) {
                            return;
                        }
                        forward_samples(data, device_channels, device_rate, &cfg, started, &tx);
                    },
                    err_callback,
                    None,
                )
                .map_err(|e| CaptureError::Device(e.to_string()))?
        }
        SampleFormat::F32 => {
            let flag = Arc::clone(is_capturing);
            let tx = frame_tx.clone();
            let cfg = config.clone();
            device
                .build_input_stream(
                    &stream_config,
                    move |data: &[f32], _| {
                        if !flag.load(Ordering::SeqCst) {
                            return;
                        }
                        let samples: Vec<i16> = data
                            .iter()
                            .map(|&s| (s.clamp(-1.0, 1.0) * 32767.0) as i16)
                            .collect();
                        forward_samples(&samples, device_channels, device_rate, &cfg, started, &tx);
                    },
                    err_callback,
                    None,
                )
                .map_err(|e| CaptureError::Device(e.to_string()))?
        }
        other => {
            return Err(CaptureError::UnsupportedFormat(format!("{:?}", other)));
        }
    };

    stream
        .play()
        .map_err(|e| CaptureError::Device(e.to_string()))?;
    info!("Audio capture started");

    // Keep the stream alive until capture is stopped
    while is_capturing.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(50));
    }

    drop(stream);
    Ok(())
}

/// Convert one device callback's worth of samples and push it as a frame.
fn forward_samples(
    data: &[i16],
    device_channels: usize,
    device_rate: u32,
    config: &AudioBackendConfig,
    started: Instant,
    frame_tx: &mpsc::Sender<AudioFrame>,
) {
    let (samples, channels) = if config.target_channels == 1 && device_channels > 1 {
        (downmix_to_mono(data, device_channels), 1)
    } else {
        (data.to_vec(), device_channels as u16)
    };

    let (samples, sample_rate) = decimate(samples, device_rate, config.target_sample_rate);

    let frame = AudioFrame {
        samples,
        sample_rate,
        channels,
        timestamp_ms: started.elapsed().as_millis() as u64,
    };

    if let Err(mpsc::error::TrySendError::Full(_)) = frame_tx.try_send(frame) {
        warn!("Capture channel full, dropping audio frame");
    }
}

/// Downmix interleaved samples to mono by summing channels (no division,
/// preserves volume; clamped to the i16 range).
fn downmix_to_mono(samples: &[i16], channels: usize) -> Vec<i16> {
    samples
        .chunks_exact(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            sum.clamp(i16::MIN as i32, i16::MAX as i32) as i16
        })
        .collect()
}

/// Decimate to the target rate by taking every Nth sample. Rates below
/// the target, and ratios that are not an integer multiple (e.g. 48000
/// to 44100), pass through unchanged; the returned rate is the rate the
/// samples actually have, and frames report it downstream.
fn decimate(samples: Vec<i16>, from_rate: u32, to_rate: u32) -> (Vec<i16>, u32) {
    if from_rate <= to_rate {
        return (samples, from_rate);
    }
    let ratio = (from_rate / to_rate) as usize;
    if ratio <= 1 {
        return (samples, from_rate);
    }
    let decimated: Vec<i16> = samples.iter().step_by(ratio).copied().collect();
    (decimated, from_rate / ratio as u32)
}
