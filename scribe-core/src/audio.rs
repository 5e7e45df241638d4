//! # Audio Capture Module
//!
//! Live capture using CPAL (Cross-Platform Audio Library). [`CpalSource`]
//! opens an input stream on the capture worker, keeps the first channel of
//! every callback buffer and pushes it into the session's sample sink.
//!
//! ## Behaviour
//! - Host default input device, or the first device whose name contains the
//!   configured substring (e.g. a loopback device)
//! - f32, i16 and u16 input formats, converted to f32
//! - Stream errors are logged and never end the capture

use crate::config::CaptureConfig;
use crate::source::{SampleSink, SampleSource, SourceFactory, StopFlag};
use anyhow::{anyhow, bail, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Sample, SampleFormat, SupportedStreamConfigRange};
use std::time::Duration;
use tracing::{info, warn};

/// Captures from a CPAL input device.
#[derive(Debug, Clone)]
pub struct CpalSource {
    config: CaptureConfig,
}

impl CpalSource {
    /// Creates a source for one capture.
    ///
    /// # Arguments
    /// * `config` - Device name filter, requested sample rate and stop-flag
    ///   poll interval
    ///
    /// The device is opened when the session runs the source, not here.
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }
}

/// A factory that opens a new [`CpalSource`] for every session start.
///
/// # Arguments
/// * `config` - Copied into every source the factory creates
///
/// # Returns
/// * A [`SourceFactory`] to hand to [`Session::new`](crate::session::Session::new)
pub fn cpal_factory(config: CaptureConfig) -> impl SourceFactory {
    move || -> Result<Box<dyn SampleSource>> { Ok(Box::new(CpalSource::new(config.clone()))) }
}

/// Names of all input devices on the default host.
///
/// # Returns
/// * `Ok(Vec<String>)` - Device names usable as `CaptureConfig::device`
/// * `Err` - The host could not enumerate its devices
pub fn input_device_names() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let names = host
        .input_devices()?
        .filter_map(|device| device.name().ok())
        .collect();
    Ok(names)
}

impl SampleSource for CpalSource {
    fn run(&mut self, sink: &SampleSink, stop: &StopFlag) -> Result<()> {
        let host = cpal::default_host();
        let device = select_device(&host, self.config.device.as_deref())?;

        info!("[AUDIO-THREAD] Using audio input device: {}", device.name()?);

        let configs = device.supported_input_configs()?.collect::<Vec<_>>();
        let supported_config = find_supported_config(configs, self.config.sample_rate)
            .ok_or_else(|| anyhow!("No suitable input format found"))?;

        let rate = choose_sample_rate(
            supported_config.min_sample_rate().0,
            supported_config.max_sample_rate().0,
            self.config.sample_rate,
        );
        let config = supported_config.with_sample_rate(cpal::SampleRate(rate));
        let sample_format = config.sample_format();
        let channels = config.channels() as usize;
        let config: cpal::StreamConfig = config.into();

        info!(
            "[AUDIO-THREAD] Selected {} Hz, {} channel(s), {:?}",
            rate, channels, sample_format
        );
        sink.set_sample_rate(rate);

        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, channels, sink.clone())?,
            SampleFormat::I16 => build_stream::<i16>(&device, &config, channels, sink.clone())?,
            SampleFormat::U16 => build_stream::<u16>(&device, &config, channels, sink.clone())?,
            other => bail!("Unsupported sample format {:?}", other),
        };

        stream.play()?;

        let poll = Duration::from_millis(self.config.poll_interval_ms.max(1));
        while !stop.is_set() {
            std::thread::sleep(poll);
        }

        // Properly stop the stream before dropping it
        if let Err(e) = stream.pause() {
            warn!("[AUDIO-THREAD] Error pausing stream: {}", e);
        }
        drop(stream);
        Ok(())
    }
}

fn select_device(host: &cpal::Host, wanted: Option<&str>) -> Result<cpal::Device> {
    match wanted {
        None => host
            .default_input_device()
            .ok_or_else(|| anyhow!("No input device available")),
        Some(name) => host
            .input_devices()?
            .find(|device| device.name().is_ok_and(|n| n.contains(name)))
            .ok_or_else(|| anyhow!("No input device matching {:?}", name)),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: usize,
    sink: SampleSink,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample,
    f32: cpal::FromSample<T>,
{
    let err_fn = |err: cpal::StreamError| warn!("[AUDIO-THREAD] An error occurred on the audio stream: {}", err);
    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            sink.push(&first_channel(data, channels));
        },
        err_fn,
        None,
    )?;
    Ok(stream)
}

/// Keeps the first channel of an interleaved buffer, converted to f32.
fn first_channel<T>(data: &[T], channels: usize) -> Vec<f32>
where
    T: Sample,
    f32: cpal::FromSample<T>,
{
    data.iter()
        .step_by(channels.max(1))
        .map(|&s| s.to_sample::<f32>())
        .collect()
}

/// The rate to request from a config range: the target if the range covers
/// it, otherwise the nearest bound.
fn choose_sample_rate(min: u32, max: u32, target: u32) -> u32 {
    target.clamp(min, max.max(min))
}

/// Finds the best supported input configuration for the target sample rate.
///
/// Prefers f32, then fewer channels, then the range closest to the target
/// rate. Formats other than f32, i16 and u16 are skipped.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| {
            matches!(
                c.sample_format(),
                SampleFormat::F32 | SampleFormat::I16 | SampleFormat::U16
            )
        })
        .min_by_key(|c| {
            let format_rank = if c.sample_format() == SampleFormat::F32 { 0 } else { 1 };
            let rate = choose_sample_rate(c.min_sample_rate().0, c.max_sample_rate().0, target_rate);
            let rate_diff = (i64::from(rate) - i64::from(target_rate)).abs();
            (format_rank, c.channels(), rate_diff)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpal::{SampleRate, SupportedBufferSize};

    fn range(channels: u16, min: u32, max: u32, format: SampleFormat) -> SupportedStreamConfigRange {
        SupportedStreamConfigRange::new(
            channels,
            SampleRate(min),
            SampleRate(max),
            SupportedBufferSize::Unknown,
            format,
        )
    }

    #[test]
    fn test_prefers_mono_f32() {
        let chosen = find_supported_config(
            vec![
                range(2, 8000, 96000, SampleFormat::F32),
                range(1, 8000, 96000, SampleFormat::I16),
                range(1, 8000, 96000, SampleFormat::F32),
            ],
            44100,
        )
        .unwrap();
        assert_eq!(chosen.channels(), 1);
        assert_eq!(chosen.sample_format(), SampleFormat::F32);
    }

    #[test]
    fn test_falls_back_to_integer_formats() {
        let chosen = find_supported_config(
            vec![
                range(1, 44100, 44100, SampleFormat::I8),
                range(2, 44100, 44100, SampleFormat::I16),
            ],
            44100,
        )
        .unwrap();
        assert_eq!(chosen.sample_format(), SampleFormat::I16);
        assert!(find_supported_config(vec![range(1, 44100, 44100, SampleFormat::I8)], 44100).is_none());
    }

    #[test]
    fn test_prefers_range_covering_target_rate() {
        let chosen = find_supported_config(
            vec![
                range(1, 8000, 22050, SampleFormat::F32),
                range(1, 32000, 48000, SampleFormat::F32),
            ],
            44100,
        )
        .unwrap();
        assert_eq!(chosen.max_sample_rate(), SampleRate(48000));
    }

    #[test]
    fn test_choose_sample_rate_clamps() {
        assert_eq!(choose_sample_rate(8000, 96000, 44100), 44100);
        assert_eq!(choose_sample_rate(48000, 48000, 44100), 48000);
        assert_eq!(choose_sample_rate(8000, 22050, 44100), 22050);
    }

    #[test]
    fn test_first_channel_of_interleaved_buffer() {
        let stereo = [0.1f32, 0.9, 0.2, 0.8, 0.3, 0.7];
        assert_eq!(first_channel(&stereo, 2), vec![0.1, 0.2, 0.3]);
        assert_eq!(first_channel(&stereo, 1).len(), 6);

        let ints = [i16::MAX, 0, 0, 0];
        let converted = first_channel(&ints, 2);
        assert_eq!(converted.len(), 2);
        assert!((converted[0] - 1.0).abs() < 1e-3);
        assert_eq!(converted[1], 0.0);
    }
}
