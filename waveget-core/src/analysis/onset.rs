use super::spectrum::Spectrogram;

/// Dynamic range kept below the loudest bin, in dB.
const TOP_DB: f32 = 80.0;

/// Half-wave rectified log-spectral flux, averaged over bins. One value per
/// STFT frame; the first is always zero.
pub fn onset_strength(spec: &Spectrogram) -> Vec<f32> {
    if spec.frames.is_empty() {
        return Vec::new();
    }

    let mut log_frames: Vec<Vec<f32>> = spec
        .frames
        .iter()
        .map(|f| f.iter().map(|m| 20.0 * m.max(1e-10).log10()).collect())
        .collect();

    let peak = log_frames
        .iter()
        .flat_map(|f| f.iter().copied())
        .fold(f32::NEG_INFINITY, f32::max);
    let floor = peak - TOP_DB;
    for frame in &mut log_frames {
        for v in frame.iter_mut() {
            *v = v.max(floor);
        }
    }

    let mut envelope = Vec::with_capacity(log_frames.len());
    envelope.push(0.0);
    for pair in log_frames.windows(2) {
        let (prev, cur) = (&pair[0], &pair[1]);
        let flux: f32 = cur
            .iter()
            .zip(prev)
            .map(|(c, p)| (c - p).max(0.0))
            .sum::<f32>()
            / cur.len().max(1) as f32;
        envelope.push(flux);
    }
    envelope
}
