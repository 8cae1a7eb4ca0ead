//! Peak extraction on canonical spectra.
//!
//! The y column is normalised to its maximum, smoothed with a bilateral
//! filter and searched for maxima by 0-dimensional persistence: every local
//! maximum starts a component of the superlevel set, and a component dies
//! when it merges into a higher one. Peaks are ranked by persistence, with
//! the global maximum (which never dies) taking the sentinel rank 0.

use std::cmp::Ordering;

use serde::Serialize;

use crate::config::PeakConfig;
use crate::data::table::CanonicalTable;
use crate::error::{ProcessingError, Result};

/// One ranked candidate from the detector.
#[derive(Debug, Clone, PartialEq)]
pub struct Peak {
    pub index: usize,
    /// Max-normalised, un-smoothed height.
    pub height: f64,
    pub persistence: f64,
    pub rank: usize,
}

/// x positions of the reported peaks, in detector (sample index) order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PeakSet {
    pub positions: Vec<f64>,
}

impl PeakSet {
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }
}

/// Peaks of a converted spectrum.
///
/// Numeric failures (e.g. an all-zero trace) are logged and reported as an
/// empty set: finding nothing is a valid result.
pub fn find_peaks(table: &CanonicalTable, config: &PeakConfig) -> PeakSet {
    let x = table.x();
    let y = table.y();
    match ranked_peaks(&y, config) {
        Ok(peaks) => {
            let positions: Vec<f64> = peaks
                .iter()
                .filter(|p| {
                    p.rank != 0 && p.rank <= config.max_rank && p.height >= config.min_height
                })
                .filter_map(|p| x.get(p.index).copied())
                .collect();
            log::debug!("{} of {} peak candidates kept", positions.len(), peaks.len());
            PeakSet { positions }
        }
        Err(e) => {
            log::warn!("peak extraction skipped: {e}");
            PeakSet::default()
        }
    }
}

/// All persistence-ranked candidates, ordered by sample index.
pub fn ranked_peaks(y: &[f64], config: &PeakConfig) -> Result<Vec<Peak>> {
    if y.len() < 3 {
        return Ok(Vec::new());
    }
    let max = y.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == 0.0 || !max.is_finite() {
        return Err(ProcessingError::NumericDegenerateInput(format!(
            "cannot normalise by maximum {max}"
        )));
    }
    let normalized: Vec<f64> = y.iter().map(|v| v / max).collect();
    let smoothed = bilateral(&normalized, config);

    let mut candidates: Vec<(usize, f64)> = persistence(&smoothed)
        .into_iter()
        .filter(|&(i, _)| dominates(&smoothed, i, config.lookahead))
        .collect();
    candidates.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

    let mut peaks: Vec<Peak> = candidates
        .into_iter()
        .enumerate()
        .map(|(rank, (index, persistence))| Peak {
            index,
            height: normalized[index],
            persistence,
            rank,
        })
        .collect();
    peaks.sort_by_key(|p| p.index);
    Ok(peaks)
}

// ---------------------------------------------------------------------------
// Denoising
// ---------------------------------------------------------------------------

/// Edge-preserving 1-D bilateral filter.
pub fn bilateral(signal: &[f64], config: &PeakConfig) -> Vec<f64> {
    let half = config.denoise_window / 2;
    let spatial = 2.0 * config.sigma_spatial * config.sigma_spatial;
    let range = 2.0 * config.sigma_range * config.sigma_range;

    (0..signal.len())
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half).min(signal.len() - 1);
            let (sum, norm) = (lo..=hi).fold((0.0, 0.0), |(sum, norm), j| {
                let d = j as f64 - i as f64;
                let dv = signal[j] - signal[i];
                let w = (-(d * d) / spatial - (dv * dv) / range).exp();
                (sum + w * signal[j], norm + w)
            });
            sum / norm
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// `(birth index, persistence)` of every superlevel-set component.
fn persistence(signal: &[f64]) -> Vec<(usize, f64)> {
    const UNSEEN: usize = usize::MAX;
    let n = signal.len();
    let higher = |a: usize, b: usize| match signal[a].total_cmp(&signal[b]) {
        Ordering::Equal => a < b,
        o => o == Ordering::Greater,
    };

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| signal[b].total_cmp(&signal[a]).then(a.cmp(&b)));

    let mut parent = vec![UNSEEN; n];
    let mut result = Vec::new();

    for &i in &order {
        let left = (i > 0 && parent[i - 1] != UNSEEN).then(|| find(&mut parent, i - 1));
        let right = (i + 1 < n && parent[i + 1] != UNSEEN).then(|| find(&mut parent, i + 1));
        let root = match (left, right) {
            (None, None) => i,
            (Some(root), None) | (None, Some(root)) => root,
            (Some(a), Some(b)) if a == b => a,
            (Some(a), Some(b)) => {
                let (keep, die) = if higher(a, b) { (a, b) } else { (b, a) };
                result.push((die, signal[die] - signal[i]));
                parent[die] = keep;
                keep
            }
        };
        parent[i] = root;
    }

    // The surviving component outlives every other one.
    if let Some(&top) = order.first() {
        result.push((top, f64::INFINITY));
    }
    result
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    let mut root = i;
    while parent[root] != root {
        root = parent[root];
    }
    while parent[i] != root {
        let next = parent[i];
        parent[i] = root;
        i = next;
    }
    root
}

/// `i` is at least as high as every sample within `lookahead` of it.
fn dominates(signal: &[f64], i: usize, lookahead: usize) -> bool {
    let lo = i.saturating_sub(lookahead);
    let hi = (i + lookahead).min(signal.len() - 1);
    (lo..=hi).all(|j| signal[j] <= signal[i])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gaussian(x: f64, mu: f64, sigma: f64, amplitude: f64) -> f64 {
        amplitude * (-(x - mu).powi(2) / (2.0 * sigma.powi(2))).exp()
    }

    fn spectrum(bands: &[(f64, f64, f64)]) -> CanonicalTable {
        let x: Vec<f64> = (0..200).map(|i| 4000.0 - i as f64 * 2.0).collect();
        let y: Vec<f64> = (0..200)
            .map(|i| {
                bands
                    .iter()
                    .map(|&(mu, sigma, amp)| gaussian(i as f64, mu, sigma, amp))
                    .sum::<f64>()
                    + 0.001
            })
            .collect();
        CanonicalTable::from_pairs(&x, &y).unwrap()
    }

    #[test]
    fn flat_trace_has_no_peaks() {
        let table = CanonicalTable::from_pairs(&[1.0, 2.0, 3.0, 4.0, 5.0], &[2.0; 5]).unwrap();
        assert!(find_peaks(&table, &PeakConfig::default()).is_empty());
    }

    #[test]
    fn two_point_series_has_no_peaks() {
        let table = CanonicalTable::from_pairs(&[100.0, 101.0], &[0.01, 0.02]).unwrap();
        assert!(find_peaks(&table, &PeakConfig::default()).is_empty());
    }

    #[test]
    fn all_zero_trace_is_empty_not_error() {
        let table = CanonicalTable::from_pairs(&[1.0, 2.0, 3.0, 4.0], &[0.0; 4]).unwrap();
        assert!(find_peaks(&table, &PeakConfig::default()).is_empty());
        assert!(matches!(
            ranked_peaks(&[0.0; 4], &PeakConfig::default()),
            Err(ProcessingError::NumericDegenerateInput(_))
        ));
    }

    #[test]
    fn global_maximum_takes_sentinel_rank() {
        let table = spectrum(&[(40.0, 5.0, 1.0), (100.0, 5.0, 0.6), (160.0, 5.0, 0.3)]);
        let peaks = ranked_peaks(&table.y(), &PeakConfig::default()).unwrap();
        let ranks: Vec<(usize, usize)> = peaks
            .iter()
            .filter(|p| p.height >= 0.01)
            .map(|p| (p.index, p.rank))
            .collect();
        assert_eq!(ranks, vec![(40, 0), (100, 1), (160, 2)]);
    }

    #[test]
    fn reported_positions_are_x_values_in_index_order() {
        let table = spectrum(&[(40.0, 5.0, 1.0), (100.0, 5.0, 0.6), (160.0, 5.0, 0.3)]);
        let peaks = find_peaks(&table, &PeakConfig::default());
        assert_eq!(peaks.positions, vec![3800.0, 3680.0]);
    }

    #[test]
    fn noise_floor_drops_tiny_bands() {
        let table = spectrum(&[(40.0, 5.0, 1.0), (100.0, 5.0, 0.6), (160.0, 5.0, 0.003)]);
        let peaks = find_peaks(&table, &PeakConfig::default());
        assert_eq!(peaks.positions, vec![3800.0]);
    }

    #[test]
    fn rank_cap_limits_the_count() {
        let table = spectrum(&[(40.0, 5.0, 1.0), (100.0, 5.0, 0.6), (160.0, 5.0, 0.3)]);
        let config = PeakConfig {
            max_rank: 1,
            ..PeakConfig::default()
        };
        assert_eq!(find_peaks(&table, &config).positions, vec![3800.0]);
    }

    #[test]
    fn bilateral_keeps_constant_signal() {
        let smoothed = bilateral(&[0.5; 6], &PeakConfig::default());
        assert!(smoothed.iter().all(|v| (v - 0.5).abs() < 1e-12));
    }
}
