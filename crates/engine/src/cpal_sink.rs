use cpal::{
    FromSample, SizedSample,
    traits::{DeviceTrait, HostTrait, StreamTrait},
};
use tracing::{debug, error};

use crate::{EngineError, OutputFormat, OutputSink, OutputStream, RenderCallback};

/// The system's default output device.
pub struct CpalSink {
    device: cpal::Device,
    config: cpal::SupportedStreamConfig,
}

impl CpalSink {
    pub fn default_output() -> Result<Self, EngineError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| EngineError::Unavailable("no output device found".to_string()))?;
        let config = device
            .default_output_config()
            .map_err(|err| EngineError::Unavailable(err.to_string()))?;

        debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = config.sample_rate().0,
            channels = config.channels(),
            "opened default output device"
        );

        Ok(Self { device, config })
    }
}

impl OutputSink for CpalSink {
    fn format(&self) -> OutputFormat {
        OutputFormat {
            sample_rate: self.config.sample_rate().0,
            channels: self.config.channels(),
        }
    }

    fn open(&self, callback: RenderCallback) -> Result<Box<dyn OutputStream>, EngineError> {
        let config: cpal::StreamConfig = self.config.clone().into();

        let stream = match self.config.sample_format() {
            cpal::SampleFormat::F32 => build_stream::<f32>(&self.device, &config, callback)?,
            cpal::SampleFormat::I16 => build_stream::<i16>(&self.device, &config, callback)?,
            cpal::SampleFormat::U16 => build_stream::<u16>(&self.device, &config, callback)?,
            sample_format => {
                return Err(EngineError::Unavailable(format!(
                    "unsupported sample format '{sample_format}'"
                )));
            }
        };

        stream
            .play()
            .map_err(|err| EngineError::Unavailable(err.to_string()))?;

        Ok(Box::new(CpalStream(stream)))
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut callback: RenderCallback,
) -> Result<cpal::Stream, EngineError>
where
    T: SizedSample + FromSample<f32>,
{
    // Grows only if the device asks for a larger buffer than before.
    let mut mixed: Vec<f32> = Vec::new();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                mixed.resize(data.len(), 0.0);
                callback(&mut mixed);
                for (sample, &value) in data.iter_mut().zip(&mixed) {
                    *sample = T::from_sample(value);
                }
            },
            |err| error!(%err, "output stream error"),
            None,
        )
        .map_err(|err| EngineError::Unavailable(err.to_string()))
}

struct CpalStream(cpal::Stream);

impl OutputStream for CpalStream {
    fn halt(&self) -> Result<(), EngineError> {
        self.0
            .pause()
            .map_err(|err| EngineError::Stream(err.to_string()))
    }
}
