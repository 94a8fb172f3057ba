use apodize::hanning_iter;
use rustfft::{num_complex::Complex, FftPlanner};

use super::AnalysisError;

pub const N_FFT: usize = 2048;
pub const HOP_LENGTH: usize = 512;

/// Magnitude STFT. `frames[t][k]` is bin `k` of frame `t`, with
/// `n_fft / 2 + 1` bins per frame.
#[derive(Debug, Clone)]
pub struct Spectrogram {
    pub frames: Vec<Vec<f32>>,
    pub sample_rate: u32,
    pub n_fft: usize,
    pub hop_length: usize,
}

impl Spectrogram {
    pub fn bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    pub fn bin_frequency(&self, k: usize) -> f32 {
        k as f32 * self.sample_rate as f32 / self.n_fft as f32
    }

    /// Frames per second.
    pub fn frame_rate(&self) -> f64 {
        self.sample_rate as f64 / self.hop_length as f64
    }
}

/// Hann-windowed STFT. Frames are centred, so frame `t` covers the samples
/// around `t * hop`; the signal is zero padded by `n_fft / 2` at both ends.
pub fn stft(
    samples: &[f32],
    sample_rate: u32,
    n_fft: usize,
    hop: usize,
) -> Result<Spectrogram, AnalysisError> {
    if samples.is_empty() {
        return Err(AnalysisError::NoAudioData);
    }
    if n_fft == 0 || hop == 0 {
        return Err(AnalysisError::Analysis("invalid STFT parameters".into()));
    }

    let pad = n_fft / 2;
    let mut padded = vec![0.0f32; samples.len() + 2 * pad];
    padded[pad..pad + samples.len()].copy_from_slice(samples);

    let n_frames = 1 + samples.len() / hop;
    let bins = n_fft / 2 + 1;

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(n_fft);
    let mut scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];
    let mut buffer = vec![Complex::new(0.0f32, 0.0); n_fft];
    let window: Vec<f32> = hanning_iter(n_fft).map(|w| w as f32).collect();

    let mut frames = Vec::with_capacity(n_frames);
    for t in 0..n_frames {
        let start = t * hop;
        for (i, slot) in buffer.iter_mut().enumerate() {
            let s = padded.get(start + i).copied().unwrap_or(0.0);
            *slot = Complex::new(s * window[i], 0.0);
        }
        fft.process_with_scratch(&mut buffer, &mut scratch);
        frames.push(buffer.iter().take(bins).map(|c| c.norm()).collect());
    }

    Ok(Spectrogram {
        frames,
        sample_rate,
        n_fft,
        hop_length: hop,
    })
}
