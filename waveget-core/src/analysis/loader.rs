use std::fs::File;
use std::path::Path;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};

use super::AnalysisError;

/// Peak level below which a signal counts as silence, about -80 dBFS.
pub const SILENCE_PEAK: f32 = 1e-4;

/// Mono PCM in `[-1, 1]`.
#[derive(Debug, Clone)]
pub struct MonoSignal {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl MonoSignal {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |m, s| m.max(s.abs()))
    }

    pub fn is_silent(&self) -> bool {
        self.peak() < SILENCE_PEAK
    }
}

/// Decodes the default track of `path`, averages channels, keeps at most
/// `max_secs` seconds and resamples to `target_rate`.
pub fn load_mono(path: &Path, target_rate: u32, max_secs: f64) -> Result<MonoSignal, AnalysisError> {
    let file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => AnalysisError::FileNotFound(path.to_path_buf()),
        _ => AnalysisError::Decode(e.to_string()),
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|s| s.to_str()) {
        hint.with_extension(ext);
    }

    let probed = get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| AnalysisError::Decode(format!("unsupported format: {}", e)))?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .filter(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .or_else(|| {
            format
                .tracks()
                .iter()
                .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        })
        .ok_or_else(|| AnalysisError::Decode("no audio track".into()))?;
    let track_id = track.id;
    let params = track.codec_params.clone();

    let source_rate = params
        .sample_rate
        .ok_or_else(|| AnalysisError::Decode("unknown sample rate".into()))?;

    let mut decoder = get_codecs()
        .make(&params, &DecoderOptions::default())
        .map_err(|e| AnalysisError::Decode(e.to_string()))?;

    let max_frames = if max_secs > 0.0 {
        (max_secs * source_rate as f64) as usize
    } else {
        usize::MAX
    };

    let mut mono: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    while mono.len() < max_frames {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => {
                tracing::debug!("stopped reading {}: {}", path.display(), e);
                break;
            }
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(buf) => buf,
            Err(SymphError::DecodeError(e)) => {
                tracing::warn!("skipping undecodable packet in {}: {}", path.display(), e);
                continue;
            }
            Err(e) => return Err(AnalysisError::Decode(e.to_string())),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count().max(1);
        let needs_new = sample_buf
            .as_ref()
            .map(|b| b.capacity() < decoded.capacity() * channels)
            .unwrap_or(true);
        if needs_new {
            sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
        }
        let Some(buf) = sample_buf.as_mut() else {
            continue;
        };
        buf.copy_interleaved_ref(decoded);

        for frame in buf.samples().chunks_exact(channels) {
            let sum: f32 = frame.iter().sum();
            mono.push(sum / channels as f32);
        }
    }

    mono.truncate(max_frames);
    if mono.is_empty() {
        return Err(AnalysisError::NoAudioData);
    }

    let samples = if source_rate != target_rate {
        tracing::debug!("resampling {} Hz -> {} Hz", source_rate, target_rate);
        resample(mono, source_rate, target_rate)?
    } else {
        mono
    };

    if samples.is_empty() {
        return Err(AnalysisError::NoAudioData);
    }

    Ok(MonoSignal {
        samples,
        sample_rate: target_rate,
    })
}

fn resample(samples: Vec<f32>, from: u32, to: u32) -> Result<Vec<f32>, AnalysisError> {
    let params = SincInterpolationParameters {
        sinc_len: 128,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 128,
        window: WindowFunction::BlackmanHarris2,
    };
    let ratio = to as f64 / from as f64;
    let frames = samples.len();

    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, frames, 1)
        .map_err(|e| AnalysisError::Decode(format!("resampler: {}", e)))?;
    let mut out = resampler
        .process(&[samples], None)
        .map_err(|e| AnalysisError::Decode(format!("resampling failed: {}", e)))?;

    Ok(out.pop().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::super::test_audio::*;
    use super::*;

    #[test]
    fn empty_wav_has_no_audio() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.wav");
        write_wav(&path, RATE, &[]);
        assert!(matches!(
            load_mono(&path, RATE, 60.0),
            Err(AnalysisError::NoAudioData)
        ));
    }

    #[test]
    fn truncates_to_max_duration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("long.wav");
        write_wav(&path, RATE, &sine(220.0, 3.0, RATE));

        let signal = load_mono(&path, RATE, 1.0).unwrap();
        assert_eq!(signal.samples.len(), RATE as usize);
        assert_eq!(signal.sample_rate, RATE);
        assert_eq!(signal.duration_secs(), 1.0);
        assert!(!signal.is_silent());
    }

    #[test]
    fn stereo_is_averaged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut w = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..1000 {
            w.write_sample(16_000i16).unwrap();
            w.write_sample(-16_000i16).unwrap();
        }
        w.finalize().unwrap();

        let signal = load_mono(&path, RATE, 60.0).unwrap();
        assert_eq!(signal.samples.len(), 1000);
        assert!(signal.samples.iter().all(|s| s.abs() < 1e-3));
        // Opposite channels cancel out.
        assert!(signal.is_silent());
    }

    #[test]
    fn resamples_to_target_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("44k.wav");
        write_wav(&path, 44_100, &sine(440.0, 1.0, 44_100));

        let signal = load_mono(&path, RATE, 60.0).unwrap();
        assert_eq!(signal.sample_rate, RATE);
        let expected = RATE as f64;
        assert!((signal.samples.len() as f64 - expected).abs() < expected * 0.02);
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.wav");
        std::fs::write(&path, b"definitely not a riff header").unwrap();
        assert!(matches!(
            load_mono(&path, RATE, 60.0),
            Err(AnalysisError::Decode(_))
        ));
    }
}
