//! Optical constants from a terahertz time-domain reference/sample pulse pair.
//!
//! Both traces are optical delay (ps) against field amplitude. The sample
//! thickness is expressed in light-picoseconds (the distance light covers in
//! vacuum in one picosecond), which makes the propagation constant
//! [`SPEED_C`] a plain degrees-per-cycle factor: a phase lag of `Δφ` degrees
//! at frequency `f` THz through thickness `d` gives `n = 1 + Δφ / (SPEED_C·f·d)`.

use rustfft::num_complex::Complex64;
use rustfft::FftPlanner;
use serde::Serialize;

use crate::data::table::CanonicalTable;
use crate::error::{ProcessingError, Result};

/// Radians per degree; phases are handled in degrees.
pub const DEGREE: f64 = 0.0174533;
/// Band (THz) used to estimate the zero-order phase offset.
pub const FIT_FREQ_INTERVAL: (f64, f64) = (0.1, 0.5);
/// Band (THz) where unwrapped phases are trusted and results are reported.
pub const COMMON_RANGE_FREQ_INTERVAL: (f64, f64) = (0.2, 1.0);
/// Degrees of phase per cycle per light-picosecond of path.
pub const SPEED_C: f64 = 360.0;
/// Traces are zero-padded to this many samples before the transform.
pub const PAD_LENGTH: usize = 10_000;

pub const CSV_HEADER: [&str; 5] = [
    "frequency",
    "refractive_index",
    "absorption_index",
    "reference_amplitude",
    "sample_amplitude",
];

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThzPoint {
    pub frequency: f64,
    pub refractive_index: f64,
    pub absorption_index: f64,
    pub reference_amplitude: f64,
    pub sample_amplitude: f64,
}

/// Optical constants over the reportable band, by increasing frequency.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThzResult {
    pub points: Vec<ThzPoint>,
}

impl ThzResult {
    pub fn frequencies(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.frequency).collect()
    }

    pub fn refractive_index(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.refractive_index).collect()
    }

    pub fn absorption_index(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.absorption_index).collect()
    }

    /// Five-column canonical table with a header line.
    pub fn to_table(&self) -> Result<CanonicalTable> {
        let rows = self
            .points
            .iter()
            .map(|p| {
                vec![
                    p.frequency,
                    p.refractive_index,
                    p.absorption_index,
                    p.reference_amplitude,
                    p.sample_amplitude,
                ]
            })
            .collect();
        CanonicalTable::new(rows)?.with_header(&CSV_HEADER)
    }
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

/// Extract refractive and absorption index curves.
///
/// The sampling interval comes from the first two delays of the reference
/// trace; the sample trace is assumed to share it.
pub fn analyze(
    reference: &CanonicalTable,
    sample: &CanonicalTable,
    thickness: f64,
) -> Result<ThzResult> {
    if !(thickness.is_finite() && thickness > 0.0) {
        return Err(ProcessingError::analysis(format!("invalid sample thickness {thickness}")));
    }

    let ref_time = reference.x();
    if ref_time.len() < 2 {
        return Err(ProcessingError::analysis("reference trace needs at least two samples"));
    }
    let dt = ref_time[1] - ref_time[0];
    if !(dt.is_finite() && dt > 0.0) {
        return Err(ProcessingError::analysis(format!("invalid sampling interval {dt}")));
    }

    let ref_spectrum = spectrum(reference, "reference")?;
    let sam_spectrum = spectrum(sample, "sample")?;

    let bins = PAD_LENGTH / 2;
    let frequencies: Vec<f64> = (0..bins).map(|k| k as f64 / (PAD_LENGTH as f64 * dt)).collect();

    let ref_phase = degrees(&unwrap(&phases(&ref_spectrum[..bins])));
    let sam_phase = degrees(&unwrap(&phases(&sam_spectrum[..bins])));

    let (_, ref_intercept) = band_fit(&frequencies, &ref_phase, FIT_FREQ_INTERVAL)?;
    let (_, sam_intercept) = band_fit(&frequencies, &sam_phase, FIT_FREQ_INTERVAL)?;
    let offset = ref_intercept - sam_intercept;
    log::debug!("zero-order phase offset {offset:.3} deg");

    let (lo, hi) = COMMON_RANGE_FREQ_INTERVAL;
    let mut points = Vec::new();
    for k in 0..bins {
        let f = frequencies[k];
        if f < lo || f > hi {
            continue;
        }
        let path = SPEED_C * f * thickness;
        let n = 1.0 + (ref_phase[k] - (sam_phase[k] + offset)) / path;

        let ref_amp = ref_spectrum[k].norm();
        let sam_amp = sam_spectrum[k].norm();
        let transmission = sam_amp / ref_amp;
        let kappa = -(transmission * (n + 1.0).powi(2) / (4.0 * n)).ln() / DEGREE / path;

        if ![n, kappa, ref_amp, sam_amp].iter().all(|v| v.is_finite()) {
            return Err(ProcessingError::analysis(format!(
                "non-finite optical constants at {f:.4} THz"
            )));
        }
        points.push(ThzPoint {
            frequency: f,
            refractive_index: n,
            absorption_index: kappa,
            reference_amplitude: ref_amp,
            sample_amplitude: sam_amp,
        });
    }

    if points.is_empty() {
        return Err(ProcessingError::analysis(
            "no frequency bins fall inside the reportable band",
        ));
    }
    log::debug!("THz analysis produced {} points", points.len());
    Ok(ThzResult { points })
}

/// Baseline-corrected, zero-padded transform of one trace.
fn spectrum(trace: &CanonicalTable, label: &str) -> Result<Vec<Complex64>> {
    let time = trace.x();
    let signal = trace.y();
    if signal.len() < 2 {
        return Err(ProcessingError::analysis(format!("{label} trace needs at least two samples")));
    }
    if signal.len() > PAD_LENGTH {
        return Err(ProcessingError::analysis(format!(
            "{label} trace has {} samples, more than the {PAD_LENGTH} padded length",
            signal.len()
        )));
    }

    let corrected = remove_baseline(&time, &signal)
        .ok_or_else(|| {
            ProcessingError::analysis(format!("{label} trace has a zero-length delay axis"))
        })?;

    let mut buffer: Vec<Complex64> = corrected.iter().map(|&v| Complex64::new(v, 0.0)).collect();
    buffer.resize(PAD_LENGTH, Complex64::new(0.0, 0.0));
    let mut planner = FftPlanner::<f64>::new();
    planner.plan_fft_forward(PAD_LENGTH).process(&mut buffer);
    Ok(buffer)
}

/// Subtract the trace's signed area divided by `|min t| + |max t|`.
pub fn remove_baseline(time: &[f64], signal: &[f64]) -> Option<Vec<f64>> {
    let (min, max) = time
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &t| (lo.min(t), hi.max(t)));
    let span = min.abs() + max.abs();
    if span == 0.0 || !span.is_finite() {
        return None;
    }
    let offset = trapezoid(time, signal) / span;
    Some(signal.iter().map(|v| v - offset).collect())
}

pub fn trapezoid(x: &[f64], y: &[f64]) -> f64 {
    x.windows(2)
        .zip(y.windows(2))
        .map(|(x, y)| (x[1] - x[0]) * (y[0] + y[1]) / 2.0)
        .sum()
}

fn phases(spectrum: &[Complex64]) -> Vec<f64> {
    spectrum.iter().map(|c| c.arg()).collect()
}

fn degrees(radians: &[f64]) -> Vec<f64> {
    radians.iter().map(|r| r / DEGREE).collect()
}

/// Remove 2π jumps between consecutive phases.
pub fn unwrap(phase: &[f64]) -> Vec<f64> {
    use std::f64::consts::PI;

    let mut out = Vec::with_capacity(phase.len());
    let mut correction = 0.0;
    for (i, &p) in phase.iter().enumerate() {
        if i > 0 {
            let d = p - phase[i - 1];
            let mut wrapped = (d + PI).rem_euclid(2.0 * PI) - PI;
            if wrapped == -PI && d > 0.0 {
                wrapped = PI;
            }
            if d.abs() >= PI {
                correction += wrapped - d;
            }
        }
        out.push(p + correction);
    }
    out
}

/// Least-squares `(slope, intercept)` of `y` against `x` over a band of `x`.
fn band_fit(x: &[f64], y: &[f64], band: (f64, f64)) -> Result<(f64, f64)> {
    let (xs, ys): (Vec<f64>, Vec<f64>) = x
        .iter()
        .zip(y)
        .filter(|(&x, _)| x >= band.0 && x <= band.1)
        .map(|(&x, &y)| (x, y))
        .unzip();
    linear_fit(&xs, &ys).ok_or_else(|| {
        ProcessingError::analysis(format!(
            "too few frequency bins in the {}-{} THz fit band",
            band.0, band.1
        ))
    })
}

pub fn linear_fit(x: &[f64], y: &[f64]) -> Option<(f64, f64)> {
    if x.len() < 2 || x.len() != y.len() {
        return None;
    }
    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;
    let (sxy, sxx) = x.iter().zip(y).fold((0.0, 0.0), |(sxy, sxx), (&x, &y)| {
        (sxy + (x - mean_x) * (y - mean_y), sxx + (x - mean_x).powi(2))
    });
    if sxx == 0.0 {
        return None;
    }
    let slope = sxy / sxx;
    Some((slope, mean_y - slope * mean_x))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f64 = 0.05;
    const SAMPLES: usize = 1000;

    /// Single-cycle pulse centred at `t0` ps.
    fn pulse(t0: f64, amplitude: f64) -> CanonicalTable {
        let t: Vec<f64> = (0..SAMPLES).map(|i| i as f64 * DT).collect();
        let e: Vec<f64> = t
            .iter()
            .map(|&t| {
                let s = t - t0;
                -amplitude * s * (-(s * s) / (2.0 * 0.15 * 0.15)).exp()
            })
            .collect();
        CanonicalTable::from_pairs(&t, &e).unwrap()
    }

    #[test]
    fn delayed_transmitted_pulse_gives_its_index() {
        // n = 2 through one light-picosecond: one picosecond of extra delay
        // and Fresnel losses of 4n / (n + 1)^2 = 8/9, no absorption.
        let reference = pulse(10.0, 1.0);
        let sample = pulse(11.0, 8.0 / 9.0);
        let result = analyze(&reference, &sample, 1.0).unwrap();
        assert!(!result.points.is_empty());
        for p in &result.points {
            assert!((p.refractive_index - 2.0).abs() < 1e-3, "{p:?}");
            assert!(p.absorption_index.abs() < 1e-3, "{p:?}");
        }
    }

    #[test]
    fn frequencies_stay_in_band_and_increase() {
        let result = analyze(&pulse(10.0, 1.0), &pulse(10.5, 0.7), 0.8).unwrap();
        let f = result.frequencies();
        let (lo, hi) = COMMON_RANGE_FREQ_INTERVAL;
        assert!(f.iter().all(|&f| f >= lo && f <= hi));
        assert!(f.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn common_scaling_leaves_constants_unchanged() {
        let once = analyze(&pulse(10.0, 1.0), &pulse(10.7, 0.6), 1.2).unwrap();
        let twice = analyze(&pulse(10.0, 2.0), &pulse(10.7, 1.2), 1.2).unwrap();
        for (a, b) in once.points.iter().zip(&twice.points) {
            assert!((a.refractive_index - b.refractive_index).abs() < 1e-9);
            assert!((a.absorption_index - b.absorption_index).abs() < 1e-9);
        }
    }

    #[test]
    fn all_zero_reference_fails() {
        let t: Vec<f64> = (0..SAMPLES).map(|i| i as f64 * DT).collect();
        let flat = CanonicalTable::from_pairs(&t, &vec![0.0; SAMPLES]).unwrap();
        let err = analyze(&flat, &pulse(10.0, 1.0), 1.0).unwrap_err();
        assert!(matches!(err, ProcessingError::Analysis(_)));
    }

    #[test]
    fn bad_thickness_fails() {
        assert!(analyze(&pulse(10.0, 1.0), &pulse(10.0, 1.0), 0.0).is_err());
        assert!(analyze(&pulse(10.0, 1.0), &pulse(10.0, 1.0), f64::NAN).is_err());
    }

    #[test]
    fn single_sample_trace_fails() {
        let one = CanonicalTable::from_pairs(&[0.0], &[1.0]).unwrap();
        assert!(analyze(&one, &pulse(10.0, 1.0), 1.0).is_err());
    }

    #[test]
    fn five_column_table_has_header() {
        let result = analyze(&pulse(10.0, 1.0), &pulse(10.5, 0.8), 1.0).unwrap();
        let csv = result.to_table().unwrap().to_csv().unwrap();
        assert!(csv.starts_with(
            "frequency,refractive_index,absorption_index,reference_amplitude,sample_amplitude\n"
        ));
        assert_eq!(csv.lines().count(), result.points.len() + 1);
    }

    #[test]
    fn unwrap_removes_jumps() {
        let wrapped = [3.0, -3.0, -2.9];
        let unwrapped = unwrap(&wrapped);
        let step = 2.0 * std::f64::consts::PI;
        assert!((unwrapped[1] - (-3.0 + step)).abs() < 1e-12);
        assert!((unwrapped[2] - (-2.9 + step)).abs() < 1e-12);
    }

    #[test]
    fn baseline_removes_constant_offset() {
        let t = [0.0, 1.0, 2.0, 3.0, 4.0];
        let corrected = remove_baseline(&t, &[2.0; 5]).unwrap();
        assert!(corrected.iter().all(|v| v.abs() < 1e-12));
    }
}
