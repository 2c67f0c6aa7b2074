use chrono::{DateTime, Duration, Utc};
use ndarray::{concatenate, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use super::error::{Result, SpectrogramError};
use super::model::Spectrogram;

/// Tuning knobs for [`join_many_with`].
///
/// The defaults give the plain sort-and-concatenate join: no gap limit, no
/// gap filling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinOptions {
    /// Largest allowed gap between consecutive inputs, in seconds.
    pub max_gap_seconds: Option<f64>,
    /// Repeat the last column of the earlier input across gaps, at its cadence.
    pub fill_gaps: bool,
    /// Largest difference between matching frequency channels, in MHz.
    pub frequency_tolerance_mhz: f64,
}

impl Default for JoinOptions {
    fn default() -> Self {
        JoinOptions {
            max_gap_seconds: None,
            fill_gaps: false,
            frequency_tolerance_mhz: 1e-6,
        }
    }
}

impl JoinOptions {
    pub fn max_gap(&self) -> Option<Duration> {
        self.max_gap_seconds
            .map(|s| Duration::nanoseconds((s * 1e9).round() as i64))
    }
}

/// Join spectrograms of one instrument into a single continuous record.
///
/// Inputs are sorted by start time and their columns concatenated. Overlapping
/// or duplicate timestamps are all kept.
pub fn join_many(spectrograms: &[Spectrogram]) -> Result<Spectrogram> {
    join_many_with(spectrograms, &JoinOptions::default())
}

pub fn join_many_with(spectrograms: &[Spectrogram], options: &JoinOptions) -> Result<Spectrogram> {
    let Some(first) = spectrograms.first() else {
        return Err(SpectrogramError::EmptyJoin);
    };
    for other in &spectrograms[1..] {
        check_compatible(first, other, options.frequency_tolerance_mhz)?;
    }
    if spectrograms.len() == 1 {
        return Ok(first.clone());
    }

    let mut sorted: Vec<&Spectrogram> = spectrograms.iter().collect();
    sorted.sort_by_key(|s| s.meta().start_time);

    let mut blocks: Vec<Array2<f64>> = Vec::new();
    let mut times: Vec<DateTime<Utc>> = Vec::new();
    // Input whose last sample is the latest seen so far; gaps are measured from it.
    let mut frontier: Option<&Spectrogram> = None;
    for &spec in &sorted {
        if let Some(covered) = frontier {
            check_gap(covered, spec, options)?;
            if options.fill_gaps {
                if let Some((block, filled)) = gap_fill(covered, spec) {
                    log::warn!(
                        "filled {} missing samples between {covered} and {spec}",
                        filled.len()
                    );
                    blocks.push(block);
                    times.extend(filled);
                }
            }
        }
        blocks.push(spec.data().to_owned());
        times.extend_from_slice(spec.times());
        if frontier.map_or(true, |covered| spec.times().last() > covered.times().last()) {
            frontier = Some(spec);
        }
    }

    let views: Vec<ArrayView2<f64>> = blocks.iter().map(Array2::view).collect();
    let mut data = concatenate(Axis(1), &views)
        .map_err(|e| SpectrogramError::malformed("join", e.to_string()))?;

    // Overlapping inputs interleave; order columns by time, keeping ties in input order.
    if times.windows(2).any(|w| w[1] < w[0]) {
        let mut order: Vec<usize> = (0..times.len()).collect();
        order.sort_by_key(|&i| times[i]);
        data = data.select(Axis(1), &order);
        times = order.iter().map(|&i| times[i]).collect();
    }

    let mut meta = sorted[0].meta().clone();
    meta.start_time = sorted.iter().map(|s| s.meta().start_time).min().unwrap_or(meta.start_time);
    meta.end_time = sorted.iter().map(|s| s.meta().end_time).max().unwrap_or(meta.end_time);

    log::info!(
        "joined {} spectrograms of {} into {} columns",
        spectrograms.len(),
        meta.instrument,
        times.len()
    );
    Spectrogram::new(data, times, sorted[0].frequencies().to_vec(), meta)
        .map_err(|e| e.with_input("join"))
}

fn check_compatible(first: &Spectrogram, other: &Spectrogram, tolerance: f64) -> Result<()> {
    let same_axis = first.frequencies().len() == other.frequencies().len()
        && first
            .frequencies()
            .iter()
            .zip(other.frequencies())
            .all(|(a, b)| (a - b).abs() <= tolerance);
    let field = if !same_axis {
        "frequency_axis"
    } else if first.unit() != other.unit() {
        "unit"
    } else if first.observatory() != other.observatory() {
        "observatory"
    } else if first.instrument() != other.instrument() {
        "instrument"
    } else {
        return Ok(());
    };
    Err(SpectrogramError::Incompatible {
        field,
        first: first.to_string(),
        second: other.to_string(),
    })
}

/// Distance from the last sample of `prev` to the first sample of `next`.
/// Negative when the two overlap.
fn gap_between(prev: &Spectrogram, next: &Spectrogram) -> Duration {
    match (prev.times().last(), next.times().first()) {
        (Some(&last), Some(&first)) => first - last,
        _ => Duration::zero(),
    }
}

fn check_gap(prev: &Spectrogram, next: &Spectrogram, options: &JoinOptions) -> Result<()> {
    let Some(max) = options.max_gap() else {
        return Ok(());
    };
    let gap = gap_between(prev, next);
    if gap > max {
        return Err(SpectrogramError::GapTooLarge {
            gap_seconds: seconds(gap),
            max_seconds: seconds(max),
            before: prev.to_string(),
            after: next.to_string(),
        });
    }
    Ok(())
}

/// Columns repeating the last sample of `prev` at its cadence, up to but not
/// including the first sample of `next`. `None` when there is nothing to fill.
fn gap_fill(prev: &Spectrogram, next: &Spectrogram) -> Option<(Array2<f64>, Vec<DateTime<Utc>>)> {
    let step = prev.sample_rate_hint().filter(|d| *d > Duration::zero())?;
    let gap = gap_between(prev, next);
    let missing = (seconds(gap) / seconds(step)).round() as i64 - 1;
    if missing < 1 {
        return None;
    }
    let last = *prev.times().last()?;
    let column = prev.data().column(prev.shape().1 - 1);
    let block = Array2::from_shape_fn((column.len(), missing as usize), |(r, _)| column[r]);
    let times = (1..=missing).map(|k| last + step * k as i32).collect();
    Some((block, times))
}

fn seconds(d: Duration) -> f64 {
    d.num_nanoseconds()
        .map(|ns| ns as f64 / 1e9)
        .unwrap_or_else(|| d.num_milliseconds() as f64 / 1e3)
}
