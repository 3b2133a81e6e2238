use std::io::{Cursor, Seek, Write};
use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::{RenderError, SampleBuffer};

/// Size of the canonical RIFF/WAVE header written for 16-bit PCM.
pub const HEADER_LEN: usize = 44;

/// Most 16-bit samples a RIFF data chunk can hold (its size field is 32 bits).
pub const MAX_SAMPLES: u64 = (u32::MAX as u64 - (HEADER_LEN as u64 - 8)) / 2;

/// Convert a float sample to 16-bit PCM.
///
/// The sample is clamped to [-1.0, 1.0]; negative values scale by 32768 and
/// non-negative values by 32767, truncating toward zero.
pub fn float_to_pcm16(sample: f32) -> i16 {
    let sample = sample.clamp(-1.0, 1.0);
    if sample < 0.0 {
        (sample * 32768.0) as i16
    } else {
        (sample * 32767.0) as i16
    }
}

fn wav_spec(buffer: &SampleBuffer) -> Result<WavSpec, RenderError> {
    // More than two channels would switch the header to WAVE_FORMAT_EXTENSIBLE.
    if !matches!(buffer.channels, 1 | 2) {
        return Err(RenderError::UnsupportedFormat(format!(
            "cannot encode {} channels",
            buffer.channels
        )));
    }
    Ok(WavSpec {
        channels: buffer.channels,
        sample_rate: buffer.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    })
}

fn write_samples<W: Write + Seek>(
    mut writer: WavWriter<W>,
    buffer: &SampleBuffer,
) -> Result<(), RenderError> {
    for &sample in &buffer.samples {
        writer.write_sample(float_to_pcm16(sample))?;
    }
    writer.finalize()?;
    Ok(())
}

/// Encode a buffer as a 16-bit PCM WAV file.
///
/// The result is a 44-byte header followed by interleaved little-endian
/// samples; the RIFF size is `36 + data length`.
pub fn encode(buffer: &SampleBuffer) -> Result<Vec<u8>, RenderError> {
    let spec = wav_spec(buffer)?;
    let mut cursor = Cursor::new(Vec::with_capacity(HEADER_LEN + buffer.samples.len() * 2));
    write_samples(WavWriter::new(&mut cursor, spec)?, buffer)?;
    Ok(cursor.into_inner())
}

pub fn write_wav(buffer: &SampleBuffer, path: &Path) -> Result<(), RenderError> {
    let spec = wav_spec(buffer)?;
    write_samples(WavWriter::create(path, spec)?, buffer)
}
