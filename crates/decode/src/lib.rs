use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::Context;
use sfx_timeline::{Clip, ClipAudio, ClipId};
use symphonia::core::audio::{AudioBufferRef, SampleBuffer};
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Resolve a clip path against a base directory.
/// Absolute paths are returned unchanged.
pub fn resolve_clip_path(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Express `path` relative to `base` when it lives underneath it.
/// Use this when saving paths to project files.
pub fn relative_to(base: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(base)
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Decode an audio file into a clip.
pub fn decode_clip(id: impl Into<ClipId>, name: impl Into<String>, path: &Path) -> anyhow::Result<Clip> {
    let audio = decode_file(path).with_context(|| format!("decoding {}", path.display()))?;
    Ok(Clip::new(id, name, audio))
}

pub fn decode_file(path: &Path) -> anyhow::Result<ClipAudio> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let detected = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;

    let mut format = detected.format;

    let track = format
        .default_track()
        .ok_or_else(|| anyhow::anyhow!("no default track"))?;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| anyhow::anyhow!("unknown sample rate"))?;
    let declared = track.codec_params.channels.map(|c| c.count() as u16);
    let track_id = track.id;

    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut pcm = Pcm::default();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        pcm.push(decoder.decode(&packet))?;
    }

    if pcm.skipped > 0 {
        warn!(path = %path.display(), packets = pcm.skipped, "skipped undecodable packets");
    }

    let audio = pcm.finish(declared, sample_rate)?;
    debug!(
        path = %path.display(),
        frames = audio.frames(),
        sample_rate,
        channels = audio.channels(),
        "decoded clip"
    );
    Ok(audio)
}

/// Interleaved samples gathered packet by packet.
///
/// The channel layout comes from the decoded buffers themselves, since
/// containers do not always declare it up front.
#[derive(Default)]
struct Pcm {
    samples: Vec<f32>,
    channels: Option<u16>,
    skipped: usize,
}

impl Pcm {
    /// Append one decode result. Corrupt packets are skipped; any other
    /// decoder error ends decoding.
    fn push(&mut self, decoded: Result<AudioBufferRef<'_>, SymphoniaError>) -> anyhow::Result<()> {
        let decoded = match decoded {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(err)) => {
                warn!(error = err, "skipping undecodable packet");
                self.skipped += 1;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count() as u16;
        anyhow::ensure!(channels > 0, "decoded audio has no channels");
        match self.channels {
            Some(known) if known != channels => {
                anyhow::bail!("channel count changed from {known} to {channels} mid-stream")
            }
            _ => self.channels = Some(channels),
        }

        let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        self.samples.extend_from_slice(sample_buf.samples());
        Ok(())
    }

    /// Falls back to the declared channel count when nothing was decoded.
    fn finish(mut self, declared: Option<u16>, sample_rate: u32) -> anyhow::Result<ClipAudio> {
        let channels = self
            .channels
            .or(declared)
            .filter(|&c| c > 0)
            .ok_or_else(|| anyhow::anyhow!("no audio decoded and no channel count declared"))?;

        // A truncated final packet can leave a partial frame behind.
        self.samples
            .truncate(self.samples.len() - self.samples.len() % channels as usize);
        Ok(ClipAudio::interleaved(self.samples, sample_rate, channels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use symphonia::core::audio::{AsAudioBufferRef, AudioBuffer, Channels, Signal, SignalSpec};

    fn write_wav(path: &Path, channels: u16, sample_rate: u32, frames: usize) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..frames * channels as usize {
            let value = if i % 2 == 0 { 16384i16 } else { -16384i16 };
            writer.write_sample(value).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn buffer(channels: Channels, frames: usize, value: f32) -> AudioBuffer<f32> {
        let mut buf = AudioBuffer::<f32>::new(frames as u64, SignalSpec::new(8000, channels));
        buf.render_reserved(Some(frames));
        for ch in 0..buf.spec().channels.count() {
            buf.chan_mut(ch).fill(value * (ch + 1) as f32);
        }
        buf
    }

    #[test]
    fn test_channels_come_from_decoded_audio() {
        let stereo = Channels::FRONT_LEFT | Channels::FRONT_RIGHT;
        let mut pcm = Pcm::default();
        pcm.push(Ok(buffer(stereo, 3, 0.25).as_audio_buffer_ref()))
            .unwrap();

        let audio = pcm.finish(None, 8000).unwrap();
        assert_eq!(audio.channels(), 2);
        assert_eq!(audio.frames(), 3);
        assert_eq!(&audio.samples()[..2], &[0.25, 0.5]);
    }

    #[test]
    fn test_corrupt_packets_are_skipped() {
        let mut pcm = Pcm::default();
        pcm.push(Err(SymphoniaError::DecodeError("invalid main_data offset")))
            .unwrap();
        pcm.push(Ok(buffer(Channels::FRONT_LEFT, 4, 0.5).as_audio_buffer_ref()))
            .unwrap();
        assert_eq!(pcm.skipped, 1);

        let audio = pcm.finish(Some(1), 8000).unwrap();
        assert_eq!(audio.samples(), &[0.5; 4]);
    }

    #[test]
    fn test_other_decoder_errors_abort() {
        let mut pcm = Pcm::default();
        assert!(pcm.push(Err(SymphoniaError::Unsupported("codec"))).is_err());
    }

    #[test]
    fn test_channel_count_change_is_rejected() {
        let stereo = Channels::FRONT_LEFT | Channels::FRONT_RIGHT;
        let mut pcm = Pcm::default();
        pcm.push(Ok(buffer(Channels::FRONT_LEFT, 2, 0.5).as_audio_buffer_ref()))
            .unwrap();
        assert!(pcm.push(Ok(buffer(stereo, 2, 0.5).as_audio_buffer_ref())).is_err());
    }

    #[test]
    fn test_nothing_decoded() {
        assert!(Pcm::default().finish(None, 8000).is_err());
        let audio = Pcm::default().finish(Some(2), 8000).unwrap();
        assert!(audio.is_empty());
        assert_eq!(audio.channels(), 2);
    }

    #[test]
    fn test_decode_stereo_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rain.wav");
        write_wav(&path, 2, 22050, 2205);

        let audio = decode_file(&path).unwrap();
        assert_eq!(audio.channels(), 2);
        assert_eq!(audio.sample_rate(), 22050);
        assert_eq!(audio.frames(), 2205);
        assert!((audio.samples()[0] - 0.5).abs() < 1e-3);
        assert!((audio.samples()[1] + 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_decode_clip_carries_id_and_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wind.wav");
        write_wav(&path, 1, 44100, 441);

        let clip = decode_clip("wind", "howling wind", &path).unwrap();
        assert_eq!(clip.id.as_str(), "wind");
        assert_eq!(clip.name, "howling wind");
        assert!((clip.duration_secs() - 0.01).abs() < 1e-9);
    }

    #[test]
    fn test_decode_missing_file() {
        let err = decode_clip("x", "x", Path::new("/nonexistent/clip.wav")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/clip.wav"));
    }

    #[test]
    fn test_resolve_clip_path() {
        let base = Path::new("/projects/storm");
        assert_eq!(
            resolve_clip_path(base, Path::new("clips/thunder.wav")),
            PathBuf::from("/projects/storm/clips/thunder.wav")
        );
        assert_eq!(
            resolve_clip_path(base, Path::new("/tmp/thunder.wav")),
            PathBuf::from("/tmp/thunder.wav")
        );
    }

    #[test]
    fn test_relative_to() {
        let base = Path::new("/projects/storm");
        assert_eq!(
            relative_to(base, Path::new("/projects/storm/clips/a.wav")),
            PathBuf::from("clips/a.wav")
        );
        assert_eq!(
            relative_to(base, Path::new("/elsewhere/a.wav")),
            PathBuf::from("/elsewhere/a.wav")
        );
    }
}
