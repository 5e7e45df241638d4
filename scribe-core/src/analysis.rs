//! # Pitch Analysis Module
//!
//! Turns a raw sample buffer into per-frame pitch candidates. Every frame
//! yields one `(frequency, magnitude)` pair per spectral bin; bins that are
//! not an interpolated spectral peak are `(0.0, 0.0)`.
//!
//! ## Pipeline
//! - Centred framing with zero padding of `n_fft / 2` on both sides
//! - Hann windowing (periodic)
//! - Forward FFT using RustFFT
//! - Thresholded local-maximum picking with parabolic interpolation

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Parameters for the spectral peak tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// FFT window length in samples.
    pub n_fft: usize,
    /// Distance between consecutive frames in samples.
    pub hop_length: usize,
    /// Lowest bin centre frequency considered, in Hz.
    pub fmin: f32,
    /// Upper bound (exclusive) on bin centre frequencies, in Hz.
    pub fmax: f32,
    /// Peaks below `threshold * frame maximum` are ignored.
    pub threshold: f32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            n_fft: 2048,
            hop_length: 512,
            fmin: 150.0,
            fmax: 4000.0,
            threshold: 0.1,
        }
    }
}

impl AnalysisConfig {
    /// Whether [`SpectralPeakAnalyzer::new`] accepts these settings.
    pub fn is_valid(&self) -> bool {
        self.n_fft >= 4 && self.hop_length > 0
    }
}

/// Frequencies and magnitudes of pitch candidates, indexed by `(bin, frame)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PitchTrack {
    bins: usize,
    frames: usize,
    // Column-major: all bins of frame 0, then frame 1, ...
    frequencies: Vec<f32>,
    magnitudes: Vec<f32>,
}

impl PitchTrack {
    /// Creates an all-zero track.
    pub fn zeros(bins: usize, frames: usize) -> Self {
        Self {
            bins,
            frames,
            frequencies: vec![0.0; bins * frames],
            magnitudes: vec![0.0; bins * frames],
        }
    }

    /// Builds a track from explicit per-frame candidate lists.
    ///
    /// Shorter columns are padded with `(0.0, 0.0)` up to the longest one.
    pub fn from_columns(columns: Vec<Vec<(f32, f32)>>) -> Self {
        let bins = columns.iter().map(Vec::len).max().unwrap_or(0);
        let mut track = Self::zeros(bins, columns.len());
        for (t, column) in columns.into_iter().enumerate() {
            for (bin, (freq, mag)) in column.into_iter().enumerate() {
                track.set(bin, t, freq, mag);
            }
        }
        track
    }

    pub fn bins(&self) -> usize {
        self.bins
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }

    pub fn frequency(&self, bin: usize, frame: usize) -> f32 {
        self.frequencies[frame * self.bins + bin]
    }

    pub fn magnitude(&self, bin: usize, frame: usize) -> f32 {
        self.magnitudes[frame * self.bins + bin]
    }

    fn set(&mut self, bin: usize, frame: usize, frequency: f32, magnitude: f32) {
        let i = frame * self.bins + bin;
        self.frequencies[i] = frequency;
        self.magnitudes[i] = magnitude;
    }

    /// Returns a view of one analysis frame.
    ///
    /// # Panics
    /// * If `t >= self.frames()`
    pub fn frame(&self, t: usize) -> Frame<'_> {
        assert!(t < self.frames, "frame {t} out of range ({} frames)", self.frames);
        let range = t * self.bins..(t + 1) * self.bins;
        Frame {
            frequencies: &self.frequencies[range.clone()],
            magnitudes: &self.magnitudes[range],
        }
    }

    /// Iterates over all frames in time order.
    pub fn iter_frames(&self) -> impl Iterator<Item = Frame<'_>> {
        (0..self.frames).map(move |t| self.frame(t))
    }
}

/// One analysis window's candidates, one `(frequency, magnitude)` per bin.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    frequencies: &'a [f32],
    magnitudes: &'a [f32],
}

impl<'a> Frame<'a> {
    pub fn candidates(&self) -> impl Iterator<Item = (f32, f32)> + 'a {
        self.frequencies
            .iter()
            .copied()
            .zip(self.magnitudes.iter().copied())
    }

    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }
}

/// Produces per-frame pitch candidates from a sample buffer.
pub trait PitchAnalyzer: Send + Sync {
    fn analyze(&self, samples: &[f32], sample_rate: u32) -> PitchTrack;
}

/// Spectral peak tracker: picks thresholded local maxima of each frame's
/// magnitude spectrum and refines them with parabolic interpolation.
#[derive(Clone)]
pub struct SpectralPeakAnalyzer {
    config: AnalysisConfig,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
}

impl std::fmt::Debug for SpectralPeakAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectralPeakAnalyzer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SpectralPeakAnalyzer {
    /// # Panics
    /// * If `n_fft` is smaller than 4 or `hop_length` is zero
    pub fn new(config: AnalysisConfig) -> Self {
        assert!(config.is_valid(), "n_fft must be at least 4 and hop_length positive");
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(config.n_fft);
        let window = hann_window(config.n_fft);
        Self { config, fft, window }
    }

    /// Number of frames produced for a buffer of `len` samples.
    pub fn frame_count(&self, len: usize) -> usize {
        if len == 0 { 0 } else { 1 + len / self.config.hop_length }
    }

    /// Magnitude spectrum (`n_fft / 2 + 1` bins) of the frame starting at
    /// `start` in the centred, zero-padded signal.
    fn frame_magnitudes(&self, samples: &[f32], start: isize) -> Vec<f32> {
        let n_fft = self.config.n_fft;
        let frame: Vec<f32> = (0..n_fft as isize)
            .map(|i| {
                let idx = start + i;
                if idx < 0 {
                    0.0
                } else {
                    samples.get(idx as usize).copied().unwrap_or(0.0)
                }
            })
            .collect();

        let mut buffer: Vec<Complex<f32>> = frame
            .into_iter()
            .zip(self.window.iter())
            .map(|(sample, w)| Complex { re: sample * w, im: 0.0 })
            .collect();

        self.fft.process(&mut buffer);

        buffer
            .iter()
            .take(n_fft / 2 + 1)
            .map(|c| c.norm())
            .collect()
    }
}

impl Default for SpectralPeakAnalyzer {
    fn default() -> Self {
        Self::new(AnalysisConfig::default())
    }
}

impl PitchAnalyzer for SpectralPeakAnalyzer {
    fn analyze(&self, samples: &[f32], sample_rate: u32) -> PitchTrack {
        let n_fft = self.config.n_fft;
        let bins = n_fft / 2 + 1;
        let frames = self.frame_count(samples.len());
        let mut track = PitchTrack::zeros(bins, frames);
        let bin_hz = sample_rate as f32 / n_fft as f32;
        let pad = (n_fft / 2) as isize;

        for t in 0..frames {
            let start = (t * self.config.hop_length) as isize - pad;
            let spectrum = self.frame_magnitudes(samples, start);
            for (bin, freq, mag) in pick_peaks(&spectrum, bin_hz, &self.config) {
                track.set(bin, t, freq, mag);
            }
        }

        track
    }
}

/// Finds the interpolated peaks of one magnitude spectrum.
///
/// Returns `(bin, frequency, magnitude)` for every bin in `[fmin, fmax)` that
/// is a local maximum once values at or below `threshold * max` are zeroed.
fn pick_peaks(spectrum: &[f32], bin_hz: f32, config: &AnalysisConfig) -> Vec<(usize, f32, f32)> {
    let max = spectrum.iter().fold(0.0f32, |m, &v| v.max(m));
    let floor = config.threshold * max;
    let gated = |i: usize| if spectrum[i] > floor { spectrum[i] } else { 0.0 };

    let mut peaks = Vec::new();
    if spectrum.len() < 3 {
        return peaks;
    }
    for i in 1..spectrum.len() - 1 {
        let centre = i as f32 * bin_hz;
        if centre < config.fmin || centre >= config.fmax {
            continue;
        }
        let x = gated(i);
        if !(x > gated(i - 1) && x >= gated(i + 1)) {
            continue;
        }

        let (left, mid, right) = (spectrum[i - 1], spectrum[i], spectrum[i + 1]);
        let avg = 0.5 * (right - left);
        let curvature = 2.0 * mid - right - left;
        let shift = if curvature.abs() > f32::EPSILON { avg / curvature } else { 0.0 };

        let frequency = (i as f32 + shift) * bin_hz;
        let magnitude = mid + 0.5 * avg * shift;
        if frequency.is_finite() && magnitude.is_finite() {
            peaks.push((i, frequency, magnitude));
        }
    }
    peaks
}

/// Periodic Hann window of length `n`.
fn hann_window(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / n as f32).cos()))
        .collect()
}
