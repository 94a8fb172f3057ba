//! Tempo from an onset envelope. Two estimators run side by side: dynamic
//! programming beat tracking, and a windowed autocorrelation tempogram.

const MIN_BPM: f64 = 30.0;
const MAX_BPM: f64 = 300.0;
/// Centre of the log-normal tempo prior.
const START_BPM: f64 = 120.0;
/// Width of the prior, in octaves.
const PRIOR_STD: f64 = 1.0;

pub const TIGHTNESS: f64 = 100.0;
pub const TEMPOGRAM_WINDOW: usize = 384;

fn prior(bpm: f64) -> f64 {
    let x = (bpm / START_BPM).log2() / PRIOR_STD;
    (-0.5 * x * x).exp()
}

pub fn round_bpm(bpm: f64) -> f64 {
    (bpm * 10.0).round() / 10.0
}

/// Mean-removed autocorrelation, normalised by overlap length.
fn autocorrelation(x: &[f64], max_lag: usize) -> Vec<f64> {
    let n = x.len();
    if n == 0 {
        return Vec::new();
    }
    let mean = x.iter().sum::<f64>() / n as f64;
    let centred: Vec<f64> = x.iter().map(|v| v - mean).collect();
    (0..=max_lag.min(n - 1))
        .map(|lag| {
            let sum: f64 = centred[..n - lag]
                .iter()
                .zip(&centred[lag..])
                .map(|(a, b)| a * b)
                .sum();
            sum / (n - lag) as f64
        })
        .collect()
}

fn lag_range(fps: f64) -> (usize, usize) {
    let min_lag = ((60.0 * fps / MAX_BPM).ceil() as usize).max(1);
    let max_lag = (60.0 * fps / MIN_BPM).floor() as usize;
    (min_lag, max_lag)
}

/// Prior-weighted autocorrelation peak, refined to a fractional lag.
fn best_tempo(ac: &[f64], fps: f64) -> Option<f64> {
    let (min_lag, max_lag) = lag_range(fps);
    let max_lag = max_lag.min(ac.len().saturating_sub(2));
    if min_lag > max_lag {
        return None;
    }

    let mut best: Option<(usize, f64)> = None;
    for lag in min_lag..=max_lag {
        if ac[lag] <= 0.0 {
            continue;
        }
        let score = ac[lag] * prior(60.0 * fps / lag as f64);
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((lag, score));
        }
    }
    let (lag, _) = best?;

    let (y0, y1, y2) = (ac[lag - 1], ac[lag], ac[lag + 1]);
    let denom = y0 - 2.0 * y1 + y2;
    let offset = if denom < 0.0 {
        (0.5 * (y0 - y2) / denom).clamp(-0.5, 0.5)
    } else {
        0.0
    };
    Some(60.0 * fps / (lag as f64 + offset))
}

fn smooth(x: &[f64]) -> Vec<f64> {
    (0..x.len())
        .map(|i| {
            let prev = if i > 0 { x[i - 1] } else { x[i] };
            let next = x.get(i + 1).copied().unwrap_or(x[i]);
            0.25 * prev + 0.5 * x[i] + 0.25 * next
        })
        .collect()
}

pub fn global_tempo(envelope: &[f64], fps: f64) -> Option<f64> {
    let (_, max_lag) = lag_range(fps);
    best_tempo(&autocorrelation(&smooth(envelope), max_lag + 1), fps)
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

/// Ellis-style beat placement: each beat rewards onset strength and
/// penalises deviation from `bpm`. Returns beat frame indices.
pub fn track_beats(envelope: &[f64], fps: f64, bpm: f64, tightness: f64) -> Vec<usize> {
    let n = envelope.len();
    if n < 2 || bpm <= 0.0 {
        return Vec::new();
    }

    let mean = envelope.iter().sum::<f64>() / n as f64;
    let var = envelope.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    let std = var.sqrt();
    if std <= f64::EPSILON {
        return Vec::new();
    }

    let period = 60.0 * fps / bpm;
    let half = period.round().max(1.0) as isize;
    let kernel: Vec<f64> = (-half..=half)
        .map(|k| (-0.5 * (k as f64 * 32.0 / period).powi(2)).exp())
        .collect();

    let local: Vec<f64> = (0..n as isize)
        .map(|i| {
            kernel
                .iter()
                .enumerate()
                .filter_map(|(j, w)| {
                    let idx = i + j as isize - half;
                    (0..n as isize)
                        .contains(&idx)
                        .then(|| w * envelope[idx as usize] / std)
                })
                .sum::<f64>()
        })
        .collect();

    let local_max = local.iter().copied().fold(0.0, f64::max);
    let lo = (period / 2.0).round().max(1.0) as usize;
    let hi = (2.0 * period).round() as usize;

    let mut cum = vec![0.0f64; n];
    let mut backlink: Vec<Option<usize>> = vec![None; n];
    let mut started = false;

    for i in 0..n {
        let mut best: Option<(usize, f64)> = None;
        if i >= lo {
            for j in i.saturating_sub(hi)..=(i - lo) {
                let gap = (i - j) as f64 / period;
                let score = cum[j] - tightness * gap.ln().powi(2);
                if best.map_or(true, |(_, s)| score > s) {
                    best = Some((j, score));
                }
            }
        }

        cum[i] = local[i] + best.map_or(0.0, |(_, s)| s);
        if !started && local[i] < 0.01 * local_max {
            backlink[i] = None;
        } else {
            backlink[i] = best.map(|(j, _)| j);
            started = true;
        }
    }

    let Some(last) = last_beat(&cum) else {
        return Vec::new();
    };

    let mut beats = vec![last];
    let mut cursor = last;
    while let Some(prev) = backlink[cursor] {
        beats.push(prev);
        cursor = prev;
    }
    beats.reverse();

    trim_beats(&beats, &local)
}

fn last_beat(cum: &[f64]) -> Option<usize> {
    let n = cum.len();
    let maxima: Vec<usize> = (0..n)
        .filter(|&i| {
            let left = i == 0 || cum[i] > cum[i - 1];
            let right = i + 1 == n || cum[i] >= cum[i + 1];
            left && right
        })
        .collect();
    let mut values: Vec<f64> = maxima.iter().map(|&i| cum[i]).collect();
    let threshold = 0.5 * median(&mut values)?;
    maxima.into_iter().rev().find(|&i| cum[i] >= threshold)
}

/// Drops weak beats at either end.
fn trim_beats(beats: &[usize], local: &[f64]) -> Vec<usize> {
    if beats.is_empty() {
        return Vec::new();
    }
    let rms = (beats.iter().map(|&b| local[b].powi(2)).sum::<f64>() / beats.len() as f64).sqrt();
    let threshold = 0.5 * rms;
    let start = beats.iter().position(|&b| local[b] >= threshold);
    let end = beats.iter().rposition(|&b| local[b] >= threshold);
    match (start, end) {
        (Some(s), Some(e)) => beats[s..=e].to_vec(),
        _ => Vec::new(),
    }
}

/// Tempo from the mean inter-beat interval, ignoring intervals far from the
/// median.
pub fn bpm_from_beats(beats: &[usize], fps: f64) -> Option<f64> {
    let mut intervals: Vec<f64> = beats.windows(2).map(|w| (w[1] - w[0]) as f64).collect();
    let med = median(&mut intervals.clone())?;
    intervals.retain(|&iv| iv >= 0.5 * med && iv <= 1.5 * med);
    if intervals.is_empty() {
        return None;
    }
    let mean = intervals.iter().sum::<f64>() / intervals.len() as f64;
    (mean > 0.0).then(|| 60.0 * fps / mean)
}

/// Median over half-overlapping windows of the per-window best tempo.
pub fn tempogram_tempo(envelope: &[f64], fps: f64) -> Option<f64> {
    let (_, max_lag) = lag_range(fps);
    let win = TEMPOGRAM_WINDOW;
    let hop = win / 2;

    let mut tempos: Vec<f64> = if envelope.len() <= win {
        best_tempo(&autocorrelation(envelope, max_lag + 1), fps)
            .into_iter()
            .collect()
    } else {
        (0..=envelope.len() - win)
            .step_by(hop)
            .filter_map(|start| {
                let slice = &envelope[start..start + win];
                best_tempo(&autocorrelation(slice, max_lag + 1), fps)
            })
            .collect()
    };
    median(&mut tempos)
}

/// The beat tracker's estimate is what gets reported. The tempogram only
/// serves as a cross-check.
pub fn reconcile(beat_bpm: f64, tempogram_bpm: Option<f64>, agreement_bpm: f64) -> f64 {
    if let Some(tg) = tempogram_bpm {
        if (beat_bpm - tg).abs() > agreement_bpm {
            tracing::debug!(
                "tempo estimates disagree: beats {:.1}, tempogram {:.1}",
                beat_bpm,
                tg
            );
        }
    }
    round_bpm(beat_bpm)
}

/// Tempo in BPM, rounded to one decimal. `None` when the envelope carries no
/// periodicity the beat tracker can lock onto.
pub fn estimate(envelope: &[f32], fps: f64, agreement_bpm: f64) -> Option<f64> {
    let env: Vec<f64> = envelope.iter().map(|&v| v as f64).collect();
    if env.iter().all(|&v| v <= 0.0) {
        tracing::debug!("flat onset envelope, no tempo");
        return None;
    }

    let global = global_tempo(&env, fps)?;
    let beats = track_beats(&env, fps, global, TIGHTNESS);
    let beat_bpm = bpm_from_beats(&beats, fps)?;
    let tempogram = tempogram_tempo(&env, fps);
    tracing::debug!(
        "global {:.1}, {} beats -> {:.1}, tempogram {:?}",
        global,
        beats.len(),
        beat_bpm,
        tempogram
    );
    Some(reconcile(beat_bpm, tempogram, agreement_bpm))
}
