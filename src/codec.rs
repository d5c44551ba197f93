//! WAV container handling for the transcription wire format.
//!
//! The recorder client and the service agree on exactly one container:
//! 16 kHz mono 16-bit PCM WAV. Anything else is rejected before the model is
//! ever invoked.

use std::io::Cursor;

use crate::domain::{AudioBuffer, DomainError};

/// Sample rate Whisper expects.
pub const SAMPLE_RATE: u32 = 16_000;

/// The single MIME type the transcribe endpoint accepts.
pub const WAV_MIME: &str = "audio/wav";

fn wav_spec() -> hound::WavSpec {
    hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

/// Encode a captured buffer into a WAV payload for upload.
pub fn encode_wav(buffer: &AudioBuffer) -> Result<Vec<u8>, DomainError> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, wav_spec())
            .map_err(|e| DomainError::Io(format!("failed to create WAV writer: {e}")))?;
        for &sample in buffer.samples() {
            writer
                .write_sample(sample)
                .map_err(|e| DomainError::Io(format!("failed to write WAV sample: {e}")))?;
        }
        writer
            .finalize()
            .map_err(|e| DomainError::Io(format!("failed to finalize WAV: {e}")))?;
    }
    Ok(cursor.into_inner())
}

/// Decode an uploaded WAV payload into PCM samples.
///
/// A payload that is not a WAV container at all is treated as corrupt audio
/// (`Transcription`); a well-formed WAV with the wrong spec is
/// `UnsupportedFormat`.
pub fn decode_wav(bytes: &[u8]) -> Result<AudioBuffer, DomainError> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| DomainError::Transcription(format!("corrupt audio payload: {e}")))?;

    let spec = reader.spec();
    if spec.channels != 1
        || spec.sample_rate != SAMPLE_RATE
        || spec.bits_per_sample != 16
        || spec.sample_format != hound::SampleFormat::Int
    {
        return Err(DomainError::UnsupportedFormat(format!(
            "expected 16kHz mono 16-bit PCM WAV, got {}Hz {}ch {}-bit",
            spec.sample_rate, spec.channels, spec.bits_per_sample
        )));
    }

    let mut buffer = AudioBuffer::with_capacity(SAMPLE_RATE, reader.len() as usize);
    for sample in reader.samples::<i16>() {
        let sample =
            sample.map_err(|e| DomainError::Transcription(format!("corrupt audio payload: {e}")))?;
        buffer.push_samples(&[sample]);
    }
    Ok(buffer)
}
