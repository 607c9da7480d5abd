//! Chroma from a power spectrogram, including pitch-tuning estimation.

use ndarray::Array2;

use crate::features::stft::fft_frequencies;

pub const N_CHROMA: usize = 12;

const PIP_FMIN: f64 = 150.0;
const PIP_FMAX: f64 = 4000.0;
const PIP_THRESHOLD: f64 = 0.1;
const TUNING_RESOLUTION: f64 = 0.01;
const CENTER_OCTAVE: f64 = 5.0;
const OCTAVE_WIDTH: f64 = 2.0;

/// Octaves above A0 (27.5 Hz), with the reference A shifted by `tuning` bins.
pub fn hz_to_octs(freq: f64, tuning: f64, bins_per_octave: usize) -> f64 {
    let a440 = 440.0 * 2f64.powf(tuning / bins_per_octave as f64);
    (freq / (a440 / 16.0)).log2()
}

/// Chroma filterbank, shape `[n_chroma, n_fft / 2 + 1]`, rows starting at C.
pub fn chroma_filterbank(sample_rate: u32, n_fft: usize, n_chroma: usize, tuning: f64) -> Array2<f64> {
    let nc = n_chroma as f64;

    // Fractional chroma bin of every FFT bin; DC gets a value 1.5 octaves below bin 1.
    let mut frqbins = Vec::with_capacity(n_fft);
    for k in 1..n_fft {
        let f = k as f64 * f64::from(sample_rate) / n_fft as f64;
        frqbins.push(nc * hz_to_octs(f, tuning, n_chroma));
    }
    frqbins.insert(0, frqbins[0] - 1.5 * nc);

    let mut binwidth: Vec<f64> = frqbins.windows(2).map(|w| (w[1] - w[0]).max(1.0)).collect();
    binwidth.push(1.0);

    let n_bins = n_fft / 2 + 1;
    let half = (nc / 2.0).round();
    let mut wts = Array2::<f64>::zeros((n_chroma, n_bins));
    for j in 0..n_bins {
        for c in 0..n_chroma {
            let d = (frqbins[j] - c as f64 + half + 10.0 * nc).rem_euclid(nc) - half;
            wts[[c, j]] = (-0.5 * (2.0 * d / binwidth[j]).powi(2)).exp();
        }

        let norm = wts.column(j).iter().map(|w| w * w).sum::<f64>().sqrt();
        if norm > f64::MIN_POSITIVE {
            wts.column_mut(j).mapv_inplace(|w| w / norm);
        }

        let octave_weight =
            (-0.5 * ((frqbins[j] / nc - CENTER_OCTAVE) / OCTAVE_WIDTH).powi(2)).exp();
        wts.column_mut(j).mapv_inplace(|w| w * octave_weight);
    }

    // Rows are built starting at A; rotate so row 0 is C.
    let shift = 3 * (n_chroma / 12);
    let mut rolled = Array2::<f64>::zeros((n_chroma, n_bins));
    for c in 0..n_chroma {
        rolled.row_mut(c).assign(&wts.row((c + shift) % n_chroma));
    }
    rolled
}

/// Offset in `[-1, 1]` from a 3-point parabola fit around each interior bin.
fn parabolic_shift(column: &[f64], i: usize) -> f64 {
    if i == 0 || i + 1 >= column.len() {
        return 0.0;
    }
    let a = column[i + 1] + column[i - 1] - 2.0 * column[i];
    let b = (column[i + 1] - column[i - 1]) / 2.0;
    if b.abs() >= a.abs() {
        0.0
    } else {
        -b / a
    }
}

fn gradient(column: &[f64], i: usize) -> f64 {
    let n = column.len();
    if n < 2 {
        0.0
    } else if i == 0 {
        column[1] - column[0]
    } else if i == n - 1 {
        column[n - 1] - column[n - 2]
    } else {
        (column[i + 1] - column[i - 1]) / 2.0
    }
}

/// Interpolated peak frequencies and magnitudes per frame.
///
/// Returns `(pitches, mags)`, both shaped like `spec`; zero where no peak was
/// picked.
pub fn piptrack(spec: &Array2<f64>, sample_rate: u32, n_fft: usize) -> (Array2<f64>, Array2<f64>) {
    let fft_freqs = fft_frequencies(sample_rate, n_fft);
    let fmax = PIP_FMAX.min(f64::from(sample_rate) / 2.0);
    let (n_bins, n_frames) = spec.dim();

    let mut pitches = Array2::<f64>::zeros((n_bins, n_frames));
    let mut mags = Array2::<f64>::zeros((n_bins, n_frames));

    let mut column = vec![0.0; n_bins];
    let mut gated = vec![0.0; n_bins];
    for t in 0..n_frames {
        for (k, v) in column.iter_mut().enumerate() {
            *v = spec[[k, t]].abs();
        }
        let ref_value = PIP_THRESHOLD * column.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        for (g, &v) in gated.iter_mut().zip(&column) {
            *g = if v > ref_value { v } else { 0.0 };
        }

        for k in 0..n_bins {
            let f = fft_freqs[k];
            if !(PIP_FMIN <= f && f < fmax) {
                continue;
            }
            // Strictly above the previous bin, at least the next one (edges compare to themselves).
            let prev = gated[k.saturating_sub(1)];
            let next = gated[(k + 1).min(n_bins - 1)];
            if !(gated[k] > prev && gated[k] >= next) {
                continue;
            }
            let shift = parabolic_shift(&column, k);
            pitches[[k, t]] = (k as f64 + shift) * f64::from(sample_rate) / n_fft as f64;
            mags[[k, t]] = column[k] + 0.5 * gradient(&column, k) * shift;
        }
    }
    (pitches, mags)
}

/// Deviation of `freqs` from A440 equal temperament, in fractions of a bin.
///
/// Residuals are histogrammed at `resolution`; the left edge of the fullest
/// bucket wins. Returns 0 when there are no positive frequencies.
pub fn pitch_tuning(freqs: &[f64], resolution: f64, bins_per_octave: usize) -> f64 {
    let residuals: Vec<f64> = freqs
        .iter()
        .filter(|&&f| f > 0.0)
        .map(|&f| {
            let r = (bins_per_octave as f64 * hz_to_octs(f, 0.0, bins_per_octave)).rem_euclid(1.0);
            if r >= 0.5 {
                r - 1.0
            } else {
                r
            }
        })
        .collect();
    if residuals.is_empty() {
        return 0.0;
    }

    let n_buckets = (1.0 / resolution).ceil() as usize;
    let edge = |i: usize| i as f64 / n_buckets as f64 - 0.5;

    let mut counts = vec![0usize; n_buckets];
    for r in residuals {
        if !(-0.5..=0.5).contains(&r) {
            continue;
        }
        let mut idx = (((r + 0.5) * n_buckets as f64) as usize).min(n_buckets - 1);
        if r < edge(idx) && idx > 0 {
            idx -= 1;
        } else if idx + 1 < n_buckets && r >= edge(idx + 1) {
            idx += 1;
        }
        counts[idx] += 1;
    }

    let mut best = 0;
    for (i, &c) in counts.iter().enumerate() {
        if c > counts[best] {
            best = i;
        }
    }
    edge(best)
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}

/// Tuning offset, in chroma bins, estimated from the strong spectral peaks.
pub fn estimate_tuning(power: &Array2<f64>, sample_rate: u32, n_fft: usize) -> f64 {
    let (pitches, mags) = piptrack(power, sample_rate, n_fft);

    let mut picked: Vec<f64> = pitches
        .iter()
        .zip(mags.iter())
        .filter(|(&p, _)| p > 0.0)
        .map(|(_, &m)| m)
        .collect();
    let threshold = if picked.is_empty() {
        0.0
    } else {
        median(&mut picked)
    };

    let freqs: Vec<f64> = pitches
        .iter()
        .zip(mags.iter())
        .filter(|(&p, &m)| p > 0.0 && m >= threshold)
        .map(|(&p, _)| p)
        .collect();
    pitch_tuning(&freqs, TUNING_RESOLUTION, N_CHROMA)
}

/// Chromagram, shape `[12, frames]`, each frame scaled so its largest bin is 1.
pub fn chroma_stft(power: &Array2<f64>, sample_rate: u32, n_fft: usize) -> Array2<f64> {
    let tuning = estimate_tuning(power, sample_rate, n_fft);
    tracing::trace!(tuning, "estimated chroma tuning");

    let fb = chroma_filterbank(sample_rate, n_fft, N_CHROMA, tuning);
    let mut raw = fb.dot(power);
    for mut frame in raw.columns_mut() {
        let peak = frame.iter().fold(0.0f64, |m, v| m.max(v.abs()));
        if peak > f64::MIN_POSITIVE {
            frame.mapv_inplace(|v| v / peak);
        }
    }
    raw
}
