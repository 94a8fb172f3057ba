use super::spectrum::Spectrogram;

/// C1 and C8, the range of bins folded into pitch classes.
const FMIN_HZ: f32 = 32.703;
const FMAX_HZ: f32 = 4186.01;

/// Pitch class of a frequency, C = 0.
fn pitch_class(freq: f32) -> usize {
    let midi = 69.0 + 12.0 * (freq / 440.0).log2();
    (midi.round() as i64).rem_euclid(12) as usize
}

/// Average chroma vector of the whole spectrogram. Each frame's energy is
/// folded into 12 pitch classes and scaled so its largest class is 1;
/// silent frames contribute zeros.
pub fn mean_chroma(spec: &Spectrogram) -> [f64; 12] {
    let mapping: Vec<(usize, usize)> = (1..spec.bins())
        .filter_map(|k| {
            let f = spec.bin_frequency(k);
            (FMIN_HZ..=FMAX_HZ).contains(&f).then(|| (k, pitch_class(f)))
        })
        .collect();

    let mut total = [0.0f64; 12];
    if spec.frames.is_empty() {
        return total;
    }

    for frame in &spec.frames {
        let mut chroma = [0.0f64; 12];
        for &(k, pc) in &mapping {
            let m = frame[k] as f64;
            chroma[pc] += m * m;
        }
        let peak = chroma.iter().copied().fold(0.0, f64::max);
        if peak > 0.0 {
            for (t, c) in total.iter_mut().zip(chroma) {
                *t += c / peak;
            }
        }
    }

    let n = spec.frames.len() as f64;
    total.map(|t| t / n)
}
