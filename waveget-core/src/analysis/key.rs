use super::{Key, Mode, PitchClass};

/// Krumhansl–Schmuckler probe-tone profiles, tonic first.
pub const MAJOR_PROFILE: [f64; 12] = [
    6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88,
];
pub const MINOR_PROFILE: [f64; 12] = [
    6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17,
];

pub const DEFAULT_THRESHOLD: f64 = 0.6;

/// Profile for `tonic`, scaled to sum to 1, with the tonic weight at the
/// tonic's pitch class.
pub fn profile(tonic: PitchClass, mode: Mode) -> [f64; 12] {
    let base = match mode {
        Mode::Major => &MAJOR_PROFILE,
        Mode::Minor => &MINOR_PROFILE,
    };
    let sum: f64 = base.iter().sum();
    let mut rotated = [0.0; 12];
    for (i, w) in base.iter().enumerate() {
        rotated[(i + tonic.index()) % 12] = w / sum;
    }
    rotated
}

/// All 24 candidates in scan order: C major, C minor, C# major, ...
pub fn candidates() -> impl Iterator<Item = (PitchClass, Mode)> {
    PitchClass::ALL
        .into_iter()
        .flat_map(|pc| [(pc, Mode::Major), (pc, Mode::Minor)])
}

/// Pearson correlation. Zero variance on either side gives 0.
pub fn pearson(x: &[f64; 12], y: &[f64; 12]) -> f64 {
    let mx = x.iter().sum::<f64>() / 12.0;
    let my = y.iter().sum::<f64>() / 12.0;
    let (mut cov, mut vx, mut vy) = (0.0, 0.0, 0.0);
    for (a, b) in x.iter().zip(y) {
        let (dx, dy) = (a - mx, b - my);
        cov += dx * dy;
        vx += dx * dx;
        vy += dy * dy;
    }
    if vx <= f64::EPSILON || vy <= f64::EPSILON {
        return 0.0;
    }
    cov / (vx.sqrt() * vy.sqrt())
}

/// Best-matching key and its correlation. Ties keep the earlier candidate.
pub fn best_match(chroma: &[f64; 12]) -> (PitchClass, Mode, f64) {
    let mut best = (PitchClass::C, Mode::Major, f64::NEG_INFINITY);
    for (tonic, mode) in candidates() {
        let r = pearson(chroma, &profile(tonic, mode));
        if r > best.2 {
            best = (tonic, mode, r);
        }
    }
    best
}

pub fn detect(chroma: &[f64; 12], threshold: f64) -> Key {
    let (tonic, mode, r) = best_match(chroma);
    tracing::debug!("best key {} {:?} (r = {:.3})", tonic.name(), mode, r);
    if r < threshold {
        Key::Unknown
    } else {
        Key::Known { tonic, mode }
    }
}
