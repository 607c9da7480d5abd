//! Slaney mel filterbank, decibel conversion and MFCCs.

use ndarray::Array2;

use crate::features::stft::fft_frequencies;

pub const N_MELS: usize = 128;
pub const AMIN: f64 = 1e-10;
pub const TOP_DB: f64 = 80.0;

const F_SP: f64 = 200.0 / 3.0;
const MIN_LOG_HZ: f64 = 1000.0;
const MIN_LOG_MEL: f64 = 15.0;
const LOGSTEP: f64 = 0.06875177742094912; // ln(6.4) / 27

/// Hz to mel, linear below 1 kHz and logarithmic above.
pub fn hz_to_mel(freq: f64) -> f64 {
    if freq < MIN_LOG_HZ {
        freq / F_SP
    } else {
        MIN_LOG_MEL + (freq / MIN_LOG_HZ).ln() / LOGSTEP
    }
}

pub fn mel_to_hz(mel: f64) -> f64 {
    if mel < MIN_LOG_MEL {
        mel * F_SP
    } else {
        MIN_LOG_HZ * ((mel - MIN_LOG_MEL) * LOGSTEP).exp()
    }
}

/// Triangular filters on the Slaney mel scale, each normalized to unit area.
///
/// Shape `[n_mels, n_fft / 2 + 1]`.
pub fn mel_filterbank(
    sample_rate: u32,
    n_fft: usize,
    n_mels: usize,
    f_min: f64,
    f_max: f64,
) -> Array2<f64> {
    let fft_freqs = fft_frequencies(sample_rate, n_fft);

    let mel_min = hz_to_mel(f_min);
    let mel_max = hz_to_mel(f_max);
    let n_points = n_mels + 2;
    let mel_f: Vec<f64> = (0..n_points)
        .map(|i| mel_to_hz(mel_min + (mel_max - mel_min) * i as f64 / (n_points - 1) as f64))
        .collect();

    let mut weights = Array2::<f64>::zeros((n_mels, fft_freqs.len()));
    for i in 0..n_mels {
        let lower_width = mel_f[i + 1] - mel_f[i];
        let upper_width = mel_f[i + 2] - mel_f[i + 1];
        let enorm = 2.0 / (mel_f[i + 2] - mel_f[i]);
        for (j, &f) in fft_freqs.iter().enumerate() {
            let lower = (f - mel_f[i]) / lower_width;
            let upper = (mel_f[i + 2] - f) / upper_width;
            weights[[i, j]] = lower.min(upper).max(0.0) * enorm;
        }
    }
    weights
}

/// `10 * log10(max(S, amin))` relative to a reference of 1, floored at
/// `max - TOP_DB` over the whole matrix.
pub fn power_to_db(s: &Array2<f64>) -> Array2<f64> {
    let mut db = s.mapv(|v| 10.0 * v.max(AMIN).log10());
    let max = db.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let floor = max - TOP_DB;
    db.mapv_inplace(|v| v.max(floor));
    db
}

/// Orthonormal DCT-II basis, shape `[n_out, n]`.
pub fn dct_basis(n_out: usize, n: usize) -> Array2<f64> {
    let nf = n as f64;
    let mut basis = Array2::<f64>::zeros((n_out, n));
    for k in 0..n_out {
        let scale = if k == 0 {
            (1.0 / nf).sqrt()
        } else {
            (2.0 / nf).sqrt()
        };
        for i in 0..n {
            basis[[k, i]] =
                scale * (std::f64::consts::PI * k as f64 * (2 * i + 1) as f64 / (2.0 * nf)).cos();
        }
    }
    basis
}

/// MFCCs from a power spectrogram, shape `[n_mfcc, frames]`.
pub fn mfcc(power: &Array2<f64>, sample_rate: u32, n_fft: usize, n_mfcc: usize) -> Array2<f64> {
    let fb = mel_filterbank(sample_rate, n_fft, N_MELS, 0.0, f64::from(sample_rate) / 2.0);
    let mel = fb.dot(power);
    let log_mel = power_to_db(&mel);
    dct_basis(n_mfcc, N_MELS).dot(&log_mel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn mel_scale_roundtrip() {
        for freq in [100.0, 500.0, 1000.0, 2000.0, 4000.0, 8000.0] {
            let back = mel_to_hz(hz_to_mel(freq));
            assert!((freq - back).abs() < 1e-6, "failed for {freq}");
        }
        assert!((hz_to_mel(1000.0) - 15.0).abs() < 1e-12);
    }

    #[test]
    fn filterbank_shape_and_nonnegative() {
        let fb = mel_filterbank(22_050, 2048, N_MELS, 0.0, 11_025.0);
        assert_eq!(fb.dim(), (128, 1025));
        assert!(fb.iter().all(|&w| w >= 0.0));
        for row in fb.rows() {
            assert!(row.iter().any(|&w| w > 0.0));
        }
    }

    #[test]
    fn power_to_db_clamps_to_top_db() {
        let s = array![[1.0, 1e-12], [100.0, 0.0]];
        let db = power_to_db(&s);
        assert!((db[[0, 0]] - 0.0).abs() < 1e-12);
        assert!((db[[1, 0]] - 20.0).abs() < 1e-12);
        assert!((db[[0, 1]] - (20.0 - TOP_DB)).abs() < 1e-12);
        assert!((db[[1, 1]] - (20.0 - TOP_DB)).abs() < 1e-12);
    }

    #[test]
    fn dct_basis_is_orthonormal() {
        let b = dct_basis(16, 16);
        let gram = b.dot(&b.t());
        for i in 0..16 {
            for j in 0..16 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((gram[[i, j]] - expected).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn constant_log_mel_has_only_dc_coefficient() {
        // A flat input puts all of its energy in coefficient 0.
        let b = dct_basis(13, N_MELS);
        let x = ndarray::Array2::<f64>::from_elem((N_MELS, 1), -20.0);
        let c = b.dot(&x);
        assert!((c[[0, 0]] - (-20.0 * (N_MELS as f64).sqrt())).abs() < 1e-9);
        for k in 1..13 {
            assert!(c[[k, 0]].abs() < 1e-9);
        }
    }
}
