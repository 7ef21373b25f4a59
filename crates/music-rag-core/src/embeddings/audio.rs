//! Audio Feature Embeddings
//!
//! Spectral feature vectors computed in-process from WAV files. Decoding uses
//! hound, the short-time Fourier transform uses rustfft.
//!
//! ## Layout
//!
//! The vector has `3 * n_mfcc` dimensions, in three blocks of `n_mfcc`:
//!
//! 1. MFCC means over all frames
//! 2. Chroma means (12 pitch classes, C first), zero-padded
//! 3. Spectral centroid mean/std and rolloff mean/std in Hz, zero-padded
//!
//! Files that cannot be decoded embed as the zero vector so indexing and
//! search keep going.

use std::f32::consts::PI;
use std::path::Path;
use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use super::{AudioEmbedder, EmbeddingError};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Analysis sample rate; input is resampled to it
pub const DEFAULT_SAMPLE_RATE: u32 = 22_050;

/// Cepstral coefficients per frame
pub const DEFAULT_N_MFCC: usize = 40;

/// Audio analysed per file, from the start
pub const DEFAULT_MAX_DURATION_SECS: f32 = 30.0;

const N_FFT: usize = 2048;
const HOP_LENGTH: usize = 512;
const N_MELS: usize = 128;
const N_CHROMA: usize = 12;
const N_SPECTRAL: usize = 4;
const ROLLOFF_PERCENT: f32 = 0.85;
const TOP_DB: f32 = 80.0;
const AMIN: f32 = 1e-10;

/// Lowest frequency assigned a pitch class (C1)
const MIN_CHROMA_HZ: f32 = 32.70;

// ============================================================================
// EMBEDDER
// ============================================================================

/// MFCC, chroma and spectral-shape features of a WAV file
pub struct FeatureAudioEmbedder {
    sample_rate: u32,
    n_mfcc: usize,
    max_duration_secs: f32,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    /// Per mel band: (first bin, weights)
    mel_filters: Vec<(usize, Vec<f32>)>,
    /// `n_mfcc x N_MELS`, orthonormal DCT-II rows
    dct: Vec<Vec<f32>>,
    /// Pitch class per FFT bin, `None` below [`MIN_CHROMA_HZ`]
    chroma_bins: Vec<Option<usize>>,
}

impl FeatureAudioEmbedder {
    /// Default settings: 22050 Hz, 40 MFCCs, first 30 seconds
    pub fn new() -> Self {
        Self::build(DEFAULT_SAMPLE_RATE, DEFAULT_N_MFCC, DEFAULT_MAX_DURATION_SECS)
    }

    /// Custom analysis settings.
    ///
    /// `n_mfcc` must leave room for the 12 chroma values and fit the mel bank.
    pub fn with_settings(
        sample_rate: u32,
        n_mfcc: usize,
        max_duration_secs: f32,
    ) -> Result<Self, EmbeddingError> {
        if sample_rate < 1_000 {
            return Err(EmbeddingError::ModelInit(format!(
                "Sample rate too low: {}",
                sample_rate
            )));
        }
        if !(N_CHROMA..=N_MELS).contains(&n_mfcc) {
            return Err(EmbeddingError::ModelInit(format!(
                "n_mfcc must be in [{}, {}], got {}",
                N_CHROMA, N_MELS, n_mfcc
            )));
        }
        if max_duration_secs.is_nan() || max_duration_secs <= 0.0 {
            return Err(EmbeddingError::ModelInit(
                "max_duration_secs must be positive".to_string(),
            ));
        }
        Ok(Self::build(sample_rate, n_mfcc, max_duration_secs))
    }

    fn build(sample_rate: u32, n_mfcc: usize, max_duration_secs: f32) -> Self {
        let fft = FftPlanner::<f32>::new().plan_fft_forward(N_FFT);
        // Periodic Hann
        let window = (0..N_FFT)
            .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / N_FFT as f32).cos())
            .collect();
        let sr = sample_rate as f32;

        Self {
            sample_rate,
            n_mfcc,
            max_duration_secs,
            fft,
            window,
            mel_filters: mel_filterbank(sr),
            dct: dct_matrix(n_mfcc, N_MELS),
            chroma_bins: chroma_map(sr),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Compute features, surfacing decode failures.
    ///
    /// [`AudioEmbedder::embed`] maps these failures to the zero vector.
    pub fn extract(&self, path: &Path) -> Result<Vec<f32>, EmbeddingError> {
        let signal = self.load(path)?;
        let spectra = self.power_spectra(&signal);
        if spectra.is_empty() {
            return Err(EmbeddingError::InvalidInput(format!(
                "No audio frames in {}",
                path.display()
            )));
        }

        let frames = spectra.len() as f32;
        let bin_hz = self.sample_rate as f32 / N_FFT as f32;

        let mut mfcc_sum = vec![0.0_f32; self.n_mfcc];
        let mut chroma_sum = [0.0_f32; N_CHROMA];
        let mut centroids = Vec::with_capacity(spectra.len());
        let mut rolloffs = Vec::with_capacity(spectra.len());

        let mel_frames: Vec<Vec<f32>> = spectra.iter().map(|p| self.mel_power(p)).collect();
        let max_db = mel_frames
            .iter()
            .flatten()
            .map(|&p| power_to_db(p))
            .fold(f32::NEG_INFINITY, f32::max);
        let floor_db = max_db - TOP_DB;

        for (power, mel) in spectra.iter().zip(&mel_frames) {
            let log_mel: Vec<f32> = mel.iter().map(|&p| power_to_db(p).max(floor_db)).collect();
            for (sum, row) in mfcc_sum.iter_mut().zip(&self.dct) {
                *sum += row.iter().zip(&log_mel).map(|(c, x)| c * x).sum::<f32>();
            }

            let chroma = self.chroma(power);
            for (sum, value) in chroma_sum.iter_mut().zip(chroma) {
                *sum += value;
            }

            let magnitude: Vec<f32> = power.iter().map(|p| p.sqrt()).collect();
            let (centroid, rolloff) = spectral_shape(&magnitude, bin_hz);
            centroids.push(centroid);
            rolloffs.push(rolloff);
        }

        let mut embedding = Vec::with_capacity(self.dimensions());
        embedding.extend(mfcc_sum.iter().map(|s| s / frames));

        let mut block = vec![0.0_f32; self.n_mfcc];
        for (slot, sum) in block.iter_mut().zip(chroma_sum) {
            *slot = sum / frames;
        }
        embedding.extend_from_slice(&block);

        let mut block = vec![0.0_f32; self.n_mfcc];
        let (centroid_mean, centroid_std) = mean_std(&centroids);
        let (rolloff_mean, rolloff_std) = mean_std(&rolloffs);
        block[..N_SPECTRAL].copy_from_slice(&[centroid_mean, centroid_std, rolloff_mean, rolloff_std]);
        embedding.extend_from_slice(&block);

        Ok(embedding)
    }

    /// Decode to mono at the analysis rate, capped at the max duration
    fn load(&self, path: &Path) -> Result<Vec<f32>, EmbeddingError> {
        let mut reader = hound::WavReader::open(path).map_err(|e| {
            EmbeddingError::InvalidInput(format!("Cannot decode {}: {}", path.display(), e))
        })?;
        let spec = reader.spec();
        let channels = usize::from(spec.channels.max(1));
        let max_frames = (self.max_duration_secs * spec.sample_rate as f32) as usize;
        let limit = max_frames.saturating_mul(channels);

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .take(limit)
                .collect::<Result<Vec<f32>, hound::Error>>(),
            hound::SampleFormat::Int => {
                let scale = 1.0 / (1_i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
                reader
                    .samples::<i32>()
                    .take(limit)
                    .map(|s| s.map(|v| v as f32 * scale))
                    .collect::<Result<Vec<f32>, hound::Error>>()
            }
        }
        .map_err(|e| {
            EmbeddingError::InvalidInput(format!("Corrupt samples in {}: {}", path.display(), e))
        })?;

        let mono: Vec<f32> = interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect();

        if mono.is_empty() {
            return Err(EmbeddingError::InvalidInput(format!(
                "No samples in {}",
                path.display()
            )));
        }

        Ok(resample(&mono, spec.sample_rate, self.sample_rate))
    }

    /// Centered, Hann-windowed power spectra, bins `0..=N_FFT/2`
    fn power_spectra(&self, signal: &[f32]) -> Vec<Vec<f32>> {
        let pad = N_FFT / 2;
        let mut padded = vec![0.0_f32; signal.len() + 2 * pad];
        padded[pad..pad + signal.len()].copy_from_slice(signal);

        let n_frames = 1 + (padded.len() - N_FFT) / HOP_LENGTH;
        let mut buffer = vec![Complex::new(0.0_f32, 0.0); N_FFT];
        let mut spectra = Vec::with_capacity(n_frames);

        for frame in 0..n_frames {
            let start = frame * HOP_LENGTH;
            for ((slot, sample), w) in buffer
                .iter_mut()
                .zip(&padded[start..start + N_FFT])
                .zip(&self.window)
            {
                *slot = Complex::new(sample * w, 0.0);
            }
            self.fft.process(&mut buffer);
            spectra.push(buffer[..=N_FFT / 2].iter().map(|c| c.norm_sqr()).collect());
        }
        spectra
    }

    fn mel_power(&self, power: &[f32]) -> Vec<f32> {
        self.mel_filters
            .iter()
            .map(|(start, weights)| {
                weights
                    .iter()
                    .zip(&power[*start..])
                    .map(|(w, p)| w * p)
                    .sum()
            })
            .collect()
    }

    /// Pitch-class energy normalised to a per-frame max of 1
    fn chroma(&self, power: &[f32]) -> [f32; N_CHROMA] {
        let mut chroma = [0.0_f32; N_CHROMA];
        for (p, class) in power.iter().zip(&self.chroma_bins) {
            if let Some(class) = class {
                chroma[*class] += p;
            }
        }
        let max = chroma.iter().copied().fold(0.0_f32, f32::max);
        if max > 0.0 {
            for c in chroma.iter_mut() {
                *c /= max;
            }
        }
        chroma
    }
}

impl Default for FeatureAudioEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioEmbedder for FeatureAudioEmbedder {
    fn embed(&self, path: &Path) -> Result<Vec<f32>, EmbeddingError> {
        match self.extract(path) {
            Ok(embedding) => Ok(embedding),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Audio features unavailable, using zero vector");
                Ok(vec![0.0; self.dimensions()])
            }
        }
    }

    fn dimensions(&self) -> usize {
        self.n_mfcc * 3
    }
}

// ============================================================================
// DSP HELPERS
// ============================================================================

fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10_f32.powf(mel / 2595.0) - 1.0)
}

/// Triangular, area-normalised mel filters from 0 Hz to Nyquist
fn mel_filterbank(sample_rate: f32) -> Vec<(usize, Vec<f32>)> {
    let n_bins = N_FFT / 2 + 1;
    let bin_hz = sample_rate / N_FFT as f32;
    let max_mel = hz_to_mel(sample_rate / 2.0);
    let edges: Vec<f32> = (0..N_MELS + 2)
        .map(|i| mel_to_hz(max_mel * i as f32 / (N_MELS + 1) as f32))
        .collect();

    edges
        .windows(3)
        .map(|band| {
            let (lo, mid, hi) = (band[0], band[1], band[2]);
            let norm = 2.0 / (hi - lo);
            let first = ((lo / bin_hz).ceil() as usize).min(n_bins - 1);
            let weights = (first..n_bins)
                .map(|k| k as f32 * bin_hz)
                .take_while(|&f| f <= hi)
                .map(|f| {
                    let rising = (f - lo) / (mid - lo);
                    let falling = (hi - f) / (hi - mid);
                    rising.min(falling).max(0.0) * norm
                })
                .collect();
            (first, weights)
        })
        .collect()
}

fn dct_matrix(n_out: usize, n_in: usize) -> Vec<Vec<f32>> {
    let n = n_in as f32;
    (0..n_out)
        .map(|k| {
            let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
            (0..n_in)
                .map(|i| scale * (PI * k as f32 * (2.0 * i as f32 + 1.0) / (2.0 * n)).cos())
                .collect()
        })
        .collect()
}

fn chroma_map(sample_rate: f32) -> Vec<Option<usize>> {
    let bin_hz = sample_rate / N_FFT as f32;
    (0..=N_FFT / 2)
        .map(|k| {
            let hz = k as f32 * bin_hz;
            if hz < MIN_CHROMA_HZ {
                return None;
            }
            // MIDI 69 is A4; class 0 is C
            let midi = (69.0 + 12.0 * (hz / 440.0).log2()).round() as i64;
            Some(midi.rem_euclid(N_CHROMA as i64) as usize)
        })
        .collect()
}

fn power_to_db(power: f32) -> f32 {
    10.0 * power.max(AMIN).log10()
}

/// Spectral centroid and rolloff frequency of one magnitude frame
fn spectral_shape(magnitude: &[f32], bin_hz: f32) -> (f32, f32) {
    let total: f32 = magnitude.iter().sum();
    if total <= 0.0 {
        return (0.0, 0.0);
    }
    let centroid = magnitude
        .iter()
        .enumerate()
        .map(|(k, m)| k as f32 * bin_hz * m)
        .sum::<f32>()
        / total;

    let threshold = ROLLOFF_PERCENT * total;
    let mut cumulative = 0.0;
    let mut rolloff_bin = magnitude.len() - 1;
    for (k, m) in magnitude.iter().enumerate() {
        cumulative += m;
        if cumulative >= threshold {
            rolloff_bin = k;
            break;
        }
    }
    (centroid, rolloff_bin as f32 * bin_hz)
}

fn mean_std(values: &[f32]) -> (f32, f32) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f32;
    let mean = values.iter().sum::<f32>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
    (mean, variance.sqrt())
}

/// Linear-interpolation resampling
fn resample(signal: &[f32], from: u32, to: u32) -> Vec<f32> {
    if from == to || signal.len() < 2 {
        return signal.to_vec();
    }
    let ratio = from as f64 / to as f64;
    let out_len = ((signal.len() as f64) / ratio).floor().max(1.0) as usize;
    (0..out_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let idx = pos.floor() as usize;
            let frac = (pos - idx as f64) as f32;
            let a = signal[idx.min(signal.len() - 1)];
            let b = signal[(idx + 1).min(signal.len() - 1)];
            a + (b - a) * frac
        })
        .collect()
}
