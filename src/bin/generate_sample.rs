use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use radiospectra::{join_many, Header, HeaderValue, SpectrogramFactory};
use serde_json::json;

const CHANNELS: usize = 100;
const SAMPLES: usize = 900;
const CADENCE_S: f64 = 1.0;

const BURST_PEAK: f64 = 60.0;
const BURST_WIDTH_S: f64 = 4.0;

/// Burst light curve at one channel: a Gaussian pulse centred on `arrival`.
fn burst_profile(t: f64, arrival: f64) -> f64 {
    let z = (t - arrival) / BURST_WIDTH_S;
    BURST_PEAK * (-0.5 * z * z).exp()
}

/// Reproducible receiver noise: a SplitMix64 stream shaped into normal
/// deviates with the polar Box-Muller method, two per accepted draw.
struct ReceiverNoise {
    state: u64,
    spare: Option<f64>,
}

impl ReceiverNoise {
    fn seeded(seed: u64) -> Self {
        ReceiverNoise { state: seed, spare: None }
    }

    /// Uniform in `[-1, 1)`.
    fn signed_unit(&mut self) -> f64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^= z >> 31;
        (z >> 11) as f64 / (1u64 << 52) as f64 - 1.0
    }

    fn sample(&mut self, sigma: f64) -> f64 {
        if let Some(z) = self.spare.take() {
            return sigma * z;
        }
        loop {
            let (u, v) = (self.signed_unit(), self.signed_unit());
            let r2 = u * u + v * v;
            if r2 > 0.0 && r2 < 1.0 {
                let scale = (-2.0 * r2.ln() / r2).sqrt();
                self.spare = Some(v * scale);
                return sigma * u * scale;
            }
        }
    }
}

/// Station channels, highest frequency first as CALLISTO receivers sweep.
fn frequencies() -> Vec<f64> {
    (0..CHANNELS)
        .map(|i| 870.0 - i as f64 * (870.0 - 45.0) / (CHANNELS - 1) as f64)
        .collect()
}

/// Noisy background plus a type III burst drifting from high to low frequency.
fn digits(freqs: &[f64], burst_at_s: Option<f64>, noise: &mut ReceiverNoise) -> Vec<Vec<f64>> {
    freqs
        .iter()
        .map(|&f| {
            // Emission arrives later at lower frequencies.
            let arrival = burst_at_s.map(|t0| t0 + (870.0 - f) / 40.0);
            (0..SAMPLES)
                .map(|j| {
                    let t = j as f64 * CADENCE_S;
                    let burst = arrival.map_or(0.0, |a| burst_profile(t, a));
                    (110.0 + burst + noise.sample(2.0)).round()
                })
                .collect()
        })
        .collect()
}

fn header(start: NaiveDateTime) -> Header {
    let end = start + Duration::seconds(((SAMPLES - 1) as f64 * CADENCE_S) as i64);
    let cards: [(&str, HeaderValue); 11] = [
        ("INSTRUME", "BIR".into()),
        ("CONTENT", format!("{} Radio flux density, e-CALLISTO (BIR)", start.format("%Y/%m/%d")).into()),
        ("ORIGIN", "Birr Castle, Ireland".into()),
        ("DATE-OBS", start.format("%Y/%m/%d").to_string().into()),
        ("TIME-OBS", start.format("%H:%M:%S%.3f").to_string().into()),
        ("DATE-END", end.format("%Y/%m/%d").to_string().into()),
        ("TIME-END", end.format("%H:%M:%S").to_string().into()),
        ("OBS_LAT", 53.0947.into()),
        ("OBS_LAC", "N".into()),
        ("OBS_LON", 7.9232.into()),
        ("OBS_LOC", "W".into()),
    ];
    cards.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

fn write_pair(
    path: &Path,
    start: NaiveDateTime,
    burst_at_s: Option<f64>,
    noise: &mut ReceiverNoise,
) -> Result<()> {
    let freqs = frequencies();
    let time: Vec<f64> = (0..SAMPLES).map(|j| j as f64 * CADENCE_S).collect();
    let doc = json!({
        "header": header(start),
        "data": digits(&freqs, burst_at_s, noise),
        "columns": { "TIME": time, "FREQUENCY": freqs },
    });
    let file = std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer(std::io::BufWriter::new(file), &doc)
        .with_context(|| format!("writing {}", path.display()))?;
    log::info!("wrote {}", path.display());
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    let out_dir = PathBuf::from(std::env::args().nth(1).unwrap_or_else(|| ".".to_string()));
    std::fs::create_dir_all(&out_dir).with_context(|| format!("creating {}", out_dir.display()))?;

    let mut noise = ReceiverNoise::seeded(42);
    let first_start = NaiveDate::from_ymd_opt(2011, 9, 22)
        .and_then(|d| d.and_hms_opt(10, 30, 0))
        .context("invalid sample start")?;
    let second_start = first_start + Duration::seconds((SAMPLES as f64 * CADENCE_S) as i64);

    let files = [
        (out_dir.join("BIR_20110922_103000_01.json"), first_start, Some(600.0)),
        (out_dir.join("BIR_20110922_104500_01.json"), second_start, None),
    ];
    for (path, start, burst) in &files {
        write_pair(path, *start, *burst, &mut noise)?;
    }

    // Read the files back through the normal ingest path as a check.
    let factory = SpectrogramFactory::new();
    let spectrograms = factory.spectrograms(files.iter().map(|(path, _, _)| path.as_path()))?;
    let joined = join_many(&spectrograms)?;
    println!(
        "Wrote {} spectrograms to {}; joined: {joined} ({} x {})",
        spectrograms.len(),
        out_dir.display(),
        joined.shape().0,
        joined.shape().1
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_noise_is_reproducible_and_roughly_normal() {
        let mut a = ReceiverNoise::seeded(42);
        let mut b = ReceiverNoise::seeded(42);
        let draws: Vec<f64> = (0..20_000).map(|_| a.sample(2.0)).collect();
        assert!(draws.iter().all(|&x| x == b.sample(2.0)));

        let n = draws.len() as f64;
        let mean = draws.iter().sum::<f64>() / n;
        let var = draws.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
        assert!(mean.abs() < 0.1, "mean {mean}");
        assert_relative_eq!(var.sqrt(), 2.0, epsilon = 0.1);
    }

    #[test]
    fn test_burst_peaks_at_arrival() {
        assert_relative_eq!(burst_profile(600.0, 600.0), BURST_PEAK);
        assert!(burst_profile(600.0 + 3.0 * BURST_WIDTH_S, 600.0) < 1.0);
    }
}
