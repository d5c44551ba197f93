use std::sync::Arc;
use std::thread::{self, JoinHandle};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use parking_lot::{Mutex, RwLock};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::HeapRb;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::codec::SAMPLE_RATE;
use crate::domain::{AudioBuffer, DomainError};
use crate::ports::{AudioCapture, AudioDevice};

/// Upper bound on one recording, in seconds. Sizes the ring buffer.
const MAX_RECORDING_SECS: usize = 120;

type RingProducer = ringbuf::HeapProd<i16>;
type RingConsumer = ringbuf::HeapCons<i16>;

/// Commands sent to the capture thread.
enum CaptureCommand {
    Start {
        reply: oneshot::Sender<Result<(), DomainError>>,
    },
    Stop {
        reply: oneshot::Sender<Result<Vec<i16>, DomainError>>,
    },
    Shutdown,
}

fn get_device(selected_device_id: Option<&str>) -> Result<Device, DomainError> {
    let host = cpal::default_host();

    if let Some(id) = selected_device_id {
        let devices = host.input_devices().map_err(|e| DomainError::Capture {
            message: format!("failed to enumerate devices: {e}"),
        })?;

        for device in devices {
            if let Ok(name) = device.name() {
                if name == id {
                    return Ok(device);
                }
            }
        }
        warn!(device_id = %id, "Selected device not found, falling back to default");
    }

    host.default_input_device().ok_or(DomainError::NoMicrophone)
}

/// List available input devices with unique IDs.
///
/// Standalone so the settings app can enumerate microphones without holding
/// a capture instance.
pub fn list_input_devices() -> Result<Vec<AudioDevice>, DomainError> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let devices = host.input_devices().map_err(|e| DomainError::Capture {
        message: format!("failed to enumerate devices: {e}"),
    })?;

    let mut result = Vec::new();
    let mut name_counts: std::collections::HashMap<String, usize> = std::collections::HashMap::new();

    for device in devices {
        if let Ok(name) = device.name() {
            // Disambiguate duplicate names by appending an index.
            let count = name_counts.entry(name.clone()).or_insert(0);
            let id = if *count == 0 {
                name.clone()
            } else {
                format!("{}:{}", name, count)
            };
            *count += 1;

            result.push(AudioDevice {
                id,
                name: name.clone(),
                is_default: Some(&name) == default_name.as_ref(),
            });
        }
    }

    debug!(count = result.len(), "Listed input devices");
    Ok(result)
}

/// Downmix interleaved frames to mono.
fn downmix(data: &[i16], channels: usize) -> Vec<i16> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks(channels)
        .map(|chunk| {
            let sum: i32 = chunk.iter().map(|&s| s as i32).sum();
            (sum / channels as i32) as i16
        })
        .collect()
}

/// Linear-interpolation resampler. Whisper is tolerant enough of this for
/// speech; it avoids pulling in a DSP crate for one conversion.
fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_pos = i as f64 * ratio;
        let src_idx = src_pos.floor() as usize;
        let frac = src_pos.fract();

        let sample = if src_idx + 1 < samples.len() {
            let s0 = samples[src_idx] as f64;
            let s1 = samples[src_idx + 1] as f64;
            (s0 + (s1 - s0) * frac) as i16
        } else if src_idx < samples.len() {
            samples[src_idx]
        } else {
            0
        };
        output.push(sample);
    }
    output
}

fn build_stream(
    device: &Device,
    config: &StreamConfig,
    sample_format: SampleFormat,
    mut producer: RingProducer,
) -> Result<Stream, DomainError> {
    let channels = config.channels as usize;
    let device_rate = config.sample_rate.0;

    let stream = match sample_format {
        SampleFormat::I16 => device.build_input_stream(
            config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                let mono = downmix(data, channels);
                let resampled = resample(&mono, device_rate, SAMPLE_RATE);
                let _ = producer.push_slice(&resampled);
            },
            move |err| {
                warn!(?err, "Audio stream error");
            },
            None,
        ),
        SampleFormat::F32 => device.build_input_stream(
            config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let i16_data: Vec<i16> = data
                    .iter()
                    .map(|&s| (s.clamp(-1.0, 1.0) * 32767.0) as i16)
                    .collect();
                let mono = downmix(&i16_data, channels);
                let resampled = resample(&mono, device_rate, SAMPLE_RATE);
                let _ = producer.push_slice(&resampled);
            },
            move |err| {
                warn!(?err, "Audio stream error");
            },
            None,
        ),
        other => {
            return Err(DomainError::Capture {
                message: format!("unsupported sample format: {other:?}"),
            });
        }
    }
    // Failure to open the stream on a present device is almost always the OS
    // refusing microphone access.
    .map_err(|e| DomainError::PermissionDenied(e.to_string()))?;

    Ok(stream)
}

/// Capture thread body. The cpal Stream is not Send, so it lives here.
fn capture_thread_main(
    selected_device_id: Arc<RwLock<Option<String>>>,
    mut cmd_rx: mpsc::Receiver<CaptureCommand>,
) {
    let mut stream: Option<Stream> = None;
    let mut ring_consumer: Option<RingConsumer> = None;

    while let Some(cmd) = cmd_rx.blocking_recv() {
        match cmd {
            CaptureCommand::Start { reply } => {
                let result = (|| -> Result<(), DomainError> {
                    if stream.is_some() {
                        return Err(DomainError::AlreadyRecording);
                    }

                    let device_id = selected_device_id.read().clone();
                    let device = get_device(device_id.as_deref())?;
                    let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

                    let supported =
                        device
                            .default_input_config()
                            .map_err(|e| DomainError::Capture {
                                message: format!("failed to get device config: {e}"),
                            })?;
                    let stream_config = StreamConfig {
                        channels: supported.channels(),
                        sample_rate: supported.sample_rate(),
                        buffer_size: cpal::BufferSize::Default,
                    };

                    let ring = HeapRb::<i16>::new(MAX_RECORDING_SECS * SAMPLE_RATE as usize);
                    let (producer, consumer) = ring.split();

                    let new_stream = build_stream(
                        &device,
                        &stream_config,
                        supported.sample_format(),
                        producer,
                    )?;
                    new_stream
                        .play()
                        .map_err(|e| DomainError::PermissionDenied(e.to_string()))?;

                    stream = Some(new_stream);
                    ring_consumer = Some(consumer);

                    info!(device = %device_name, "Recording started");
                    Ok(())
                })();
                let _ = reply.send(result);
            }
            CaptureCommand::Stop { reply } => {
                let result = (|| -> Result<Vec<i16>, DomainError> {
                    if stream.take().is_none() {
                        return Err(DomainError::NotRecording);
                    }

                    let mut consumer = ring_consumer.take().ok_or(DomainError::NotRecording)?;

                    let available = consumer.occupied_len();
                    let mut samples = vec![0i16; available];
                    let read = consumer.pop_slice(&mut samples);
                    samples.truncate(read);

                    info!(samples = samples.len(), "Recording stopped");
                    Ok(samples)
                })();
                let _ = reply.send(result);
            }
            CaptureCommand::Shutdown => break,
        }
    }
    debug!("Capture thread shutting down");
}

/// cpal-based microphone capture.
///
/// A dedicated thread owns the non-Send stream; commands cross via mpsc.
pub struct CpalCapture {
    selected_device_id: Arc<RwLock<Option<String>>>,
    cmd_tx: mpsc::Sender<CaptureCommand>,
    thread_handle: Mutex<Option<JoinHandle<()>>>,
}

impl CpalCapture {
    pub fn new() -> Result<Self, DomainError> {
        let selected_device_id = Arc::new(RwLock::new(None));
        let (cmd_tx, cmd_rx) = mpsc::channel(8);

        let thread_device_id = Arc::clone(&selected_device_id);
        let thread_handle = thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || capture_thread_main(thread_device_id, cmd_rx))
            .map_err(|e| DomainError::Capture {
                message: format!("failed to spawn capture thread: {e}"),
            })?;

        info!(sample_rate = SAMPLE_RATE, "CpalCapture initialized");

        Ok(Self {
            selected_device_id,
            cmd_tx,
            thread_handle: Mutex::new(Some(thread_handle)),
        })
    }
}

impl Drop for CpalCapture {
    fn drop(&mut self) {
        // try_send: this may run inside an async runtime, where blocking
        // sends panic. Only join once the shutdown command is queued; the
        // thread otherwise exits when the channel closes.
        if self.cmd_tx.try_send(CaptureCommand::Shutdown).is_ok() {
            if let Some(handle) = self.thread_handle.lock().take() {
                let _ = handle.join();
            }
        }
    }
}

#[async_trait]
impl AudioCapture for CpalCapture {
    async fn start(&self) -> Result<(), DomainError> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.cmd_tx
            .send(CaptureCommand::Start { reply: reply_tx })
            .await
            .map_err(|_| DomainError::Capture {
                message: "capture thread not running".to_string(),
            })?;

        reply_rx.await.map_err(|_| DomainError::Capture {
            message: "capture thread did not respond".to_string(),
        })?
    }

    async fn stop(&self) -> Result<AudioBuffer, DomainError> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.cmd_tx
            .send(CaptureCommand::Stop { reply: reply_tx })
            .await
            .map_err(|_| DomainError::Capture {
                message: "capture thread not running".to_string(),
            })?;

        let samples = reply_rx.await.map_err(|_| DomainError::Capture {
            message: "capture thread did not respond".to_string(),
        })??;

        let mut buffer = AudioBuffer::with_capacity(SAMPLE_RATE, samples.len());
        buffer.push_samples(&samples);
        Ok(buffer)
    }

    fn list_devices(&self) -> Result<Vec<AudioDevice>, DomainError> {
        list_input_devices()
    }

    fn select_device(&self, device_id: Option<&str>) -> Result<(), DomainError> {
        if let Some(id) = device_id {
            let devices = list_input_devices()?;
            if !devices.iter().any(|d| d.id == id) {
                return Err(DomainError::Capture {
                    message: format!("device not found: {id}"),
                });
            }
        }

        *self.selected_device_id.write() = device_id.map(String::from);
        info!(device_id = ?device_id, "Input device selected");
        Ok(())
    }
}
