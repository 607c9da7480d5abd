//! Short-time Fourier transform with centered, zero-padded frames.

use ndarray::Array2;
use rustfft::{num_complex::Complex, FftPlanner};

pub const N_FFT: usize = 2048;
pub const HOP_LENGTH: usize = 512;

/// Periodic Hann window (the STFT variant, not the symmetric filter-design one).
pub fn hann_window(size: usize) -> Vec<f64> {
    let factor = 2.0 * std::f64::consts::PI / size as f64;
    (0..size)
        .map(|i| 0.5 - 0.5 * (i as f64 * factor).cos())
        .collect()
}

/// Center frequency in Hz of each of the `n_fft / 2 + 1` bins.
pub fn fft_frequencies(sample_rate: u32, n_fft: usize) -> Vec<f64> {
    (0..=n_fft / 2)
        .map(|i| i as f64 * f64::from(sample_rate) / n_fft as f64)
        .collect()
}

/// Number of frames produced for `len` samples with centering enabled.
pub fn frame_count(len: usize, hop_length: usize) -> usize {
    1 + len / hop_length
}

/// Magnitude spectrogram, shape `[n_fft / 2 + 1, frames]`.
///
/// The signal is padded with `n_fft / 2` zeros on both sides so frame `t` is
/// centered on sample `t * hop_length`.
pub fn stft_magnitude(samples: &[f32], n_fft: usize, hop_length: usize) -> Array2<f64> {
    let pad = n_fft / 2;
    let mut padded = vec![0.0f64; samples.len() + 2 * pad];
    for (dst, &s) in padded[pad..pad + samples.len()].iter_mut().zip(samples) {
        *dst = f64::from(s);
    }

    let window = hann_window(n_fft);
    let n_bins = n_fft / 2 + 1;
    let n_frames = frame_count(samples.len(), hop_length);

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(n_fft);
    let mut scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];
    let mut buf = vec![Complex::new(0.0, 0.0); n_fft];

    let mut out = Array2::<f64>::zeros((n_bins, n_frames));
    for t in 0..n_frames {
        let start = t * hop_length;
        for (i, slot) in buf.iter_mut().enumerate() {
            *slot = Complex::new(padded[start + i] * window[i], 0.0);
        }
        fft.process_with_scratch(&mut buf, &mut scratch);
        for (k, c) in buf[..n_bins].iter().enumerate() {
            out[[k, t]] = c.norm();
        }
    }
    out
}
