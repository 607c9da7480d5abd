//! Octave-band spectral contrast.

use ndarray::Array2;

use crate::features::mel::power_to_db;
use crate::features::stft::fft_frequencies;
use crate::features::FeatureError;

pub const N_BANDS: usize = 6;
pub const FMIN: f64 = 200.0;
pub const QUANTILE: f64 = 0.02;

/// Band edges `[0, fmin, 2 fmin, ..., 2^n_bands fmin]`.
fn octave_edges(fmin: f64, n_bands: usize) -> Vec<f64> {
    let mut edges = Vec::with_capacity(n_bands + 2);
    edges.push(0.0);
    edges.extend((0..=n_bands).map(|i| fmin * 2f64.powi(i as i32)));
    edges
}

/// Bins covered by band `k`, as a sorted list of row indices.
///
/// Each band borrows the bin just below its lower edge; the last band runs
/// to Nyquist. Every band except the last then drops its top bin, but the
/// quantile is computed from the full count.
fn band_rows(freqs: &[f64], lo: f64, hi: f64, k: usize, n_bands: usize) -> Option<(Vec<usize>, usize)> {
    let inside: Vec<usize> = (0..freqs.len())
        .filter(|&i| freqs[i] >= lo && freqs[i] <= hi)
        .collect();
    let first = *inside.first()?;
    let last = *inside.last()?;

    let start = if k > 0 { first.saturating_sub(1) } else { first };
    let end = if k == n_bands { freqs.len() - 1 } else { last };
    let count = end - start + 1;

    let rows: Vec<usize> = if k < n_bands {
        (start..end).collect()
    } else {
        (start..=end).collect()
    };
    Some((rows, count))
}

/// Spectral contrast, shape `[n_bands + 1, frames]`, in decibels.
pub fn spectral_contrast(
    magnitude: &Array2<f64>,
    sample_rate: u32,
    n_fft: usize,
) -> Result<Array2<f64>, FeatureError> {
    let nyquist = f64::from(sample_rate) / 2.0;
    let edges = octave_edges(FMIN, N_BANDS);
    if edges[..edges.len() - 1].iter().any(|&e| e >= nyquist) {
        return Err(FeatureError::BandExceedsNyquist { sample_rate });
    }

    let freqs = fft_frequencies(sample_rate, n_fft);
    let n_frames = magnitude.ncols();
    let mut peak = Array2::<f64>::zeros((N_BANDS + 1, n_frames));
    let mut valley = Array2::<f64>::zeros((N_BANDS + 1, n_frames));

    let mut column = Vec::new();
    for (k, pair) in edges.windows(2).enumerate() {
        let (rows, count) = band_rows(&freqs, pair[0], pair[1], k, N_BANDS)
            .filter(|(rows, _)| !rows.is_empty())
            .ok_or(FeatureError::EmptyBand { band: k })?;

        let q = ((QUANTILE * count as f64).round_ties_even() as usize).clamp(1, rows.len());

        for t in 0..n_frames {
            column.clear();
            column.extend(rows.iter().map(|&r| magnitude[[r, t]]));
            column.sort_by(|a, b| a.total_cmp(b));
            valley[[k, t]] = column[..q].iter().sum::<f64>() / q as f64;
            peak[[k, t]] = column[column.len() - q..].iter().sum::<f64>() / q as f64;
        }
    }

    Ok(power_to_db(&peak) - power_to_db(&valley))
}
