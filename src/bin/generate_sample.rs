use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;

/// Write a small directory-backed spectra store with synthetic instrument files.
#[derive(Parser, Debug)]
struct Args {
    /// Store directory to create
    #[arg(default_value = "sample_store")]
    output: PathBuf,
}

fn gaussian(x: f64, mu: f64, sigma: f64, amplitude: f64) -> f64 {
    amplitude * (-(x - mu).powi(2) / (2.0 * sigma.powi(2))).exp()
}

fn generate_spectrum(
    axis: &[f64],
    peaks: &[(f64, f64, f64)],
    noise_level: f64,
    rng: &mut SimpleRng,
) -> Vec<f64> {
    axis.iter()
        .map(|&x| {
            let signal: f64 = peaks
                .iter()
                .map(|&(mu, sigma, amp)| gaussian(x, mu, sigma, amp))
                .sum();
            signal + rng.gauss(0.0, noise_level)
        })
        .collect()
}

/// Single-cycle THz pulse: derivative of a Gaussian centred at `t0`.
fn thz_pulse(time: &[f64], t0: f64, width: f64, amplitude: f64, rng: &mut SimpleRng) -> Vec<f64> {
    time.iter()
        .map(|&t| {
            let s = t - t0;
            -amplitude * s / width * (-(s * s) / (2.0 * width * width)).exp() + rng.gauss(0.0, 1e-4)
        })
        .collect()
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

fn comma_radix(v: f64) -> String {
    format!("{v:.6}").replace('.', ",")
}

fn write(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    std::fs::write(path, contents).with_context(|| format!("writing {}", path.display()))
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let root = args.output;
    let mut rng = SimpleRng::new(42);

    // FTIR: OPUS data point table, 4000 → 400 cm-1, step 2
    let wavenumbers: Vec<f64> = (0..1801).map(|i| 4000.0 - i as f64 * 2.0).collect();
    let absorbance = generate_spectrum(
        &wavenumbers,
        &[(3400.0, 80.0, 0.8), (2900.0, 40.0, 0.5), (1650.0, 30.0, 0.6), (1050.0, 25.0, 0.9)],
        0.002,
        &mut rng,
    );
    let mut dpt = String::new();
    for (x, y) in wavenumbers.iter().zip(&absorbance) {
        writeln!(dpt, "{x:.1},{y:.6}")?;
    }
    write(&root.join("files/quartz.0.dpt"), &dpt)?;

    // Raman: tab separated, 100 → 1800 cm-1
    let shifts: Vec<f64> = (0..850).map(|i| 100.0 + i as f64 * 2.0).collect();
    let counts = generate_spectrum(
        &shifts,
        &[(465.0, 6.0, 1200.0), (1085.0, 5.0, 3000.0), (712.0, 4.0, 400.0)],
        15.0,
        &mut rng,
    );
    let mut raman = String::new();
    for (x, y) in shifts.iter().zip(&counts) {
        writeln!(raman, "{x:.2}\t{:.2}", y + 200.0)?;
    }
    write(&root.join("files/calcite.txt"), &raman)?;

    // XRF: Tracer single-column counts over 0–40 keV
    let channels: Vec<f64> = (0..2048).map(|i| i as f64 * 40.0 / 2047.0).collect();
    let xrf = generate_spectrum(
        &channels,
        &[(6.40, 0.08, 900.0), (7.06, 0.08, 150.0), (8.05, 0.09, 400.0), (21.2, 0.15, 80.0)],
        3.0,
        &mut rng,
    );
    let mut dat = String::from("0.0 40.0\n");
    for y in &xrf {
        writeln!(dat, "{}", (y + 20.0).max(0.0).round() as u64)?;
    }
    write(&root.join("files/tracer.dat"), &dat)?;

    // THz: reference pulse and a pellet of n ≈ 1.8, 1.5 light-ps thick
    let time: Vec<f64> = (0..1000).map(|i| i as f64 * 0.05).collect();
    let n: f64 = 1.8;
    let thickness = 1.5;
    let fresnel = 4.0 * n / (n + 1.0).powi(2);
    let reference = thz_pulse(&time, 10.0, 0.15, 1.0, &mut rng);
    let sample = thz_pulse(&time, 10.0 + (n - 1.0) * thickness, 0.15, fresnel * 0.9, &mut rng);
    for (name, trace) in [("files/reference.txt", &reference), ("files/pellet.txt", &sample)] {
        let mut text = String::new();
        for (t, e) in time.iter().zip(trace.iter()) {
            writeln!(text, "{}\t{}", comma_radix(*t), comma_radix(*e))?;
        }
        write(&root.join(name), &text)?;
    }

    let records = [
        json!({"id": 1, "file_url": "/files/quartz.0.dpt", "filename": "quartz.0.dpt",
               "format": "dpt", "category": "ftir", "parent_id": 100,
               "metadata": {"operator": "Alice"}}),
        json!({"id": 2, "file_url": "/files/calcite.txt", "filename": "calcite.txt",
               "format": "txt", "category": "raman", "parent_id": 101,
               "metadata": "{\"laser\": \"785nm\"}"}),
        json!({"id": 3, "file_url": "/files/tracer.dat", "filename": "tracer.dat",
               "format": "dat", "category": "xrf", "parent_id": 102}),
        json!({"id": 4, "file_url": "/files/reference.txt", "filename": "reference.txt",
               "format": "txt", "category": "thz", "parent_id": 103}),
        json!({"id": 5, "file_url": "/files/pellet.txt", "filename": "pellet.txt",
               "format": "txt", "category": "thz", "parent_id": 103,
               "sample_thickness": thickness}),
    ];
    for record in &records {
        let id = record["id"].as_u64().context("record without id")?;
        write(
            &root.join(format!("records/{id}.json")),
            &serde_json::to_string_pretty(record)?,
        )?;
    }
    write(&root.join("references.json"), &json!({"103": 4}).to_string())?;

    println!(
        "Wrote {} records to {}; try `spectral-processor process 5 --store {}`",
        records.len(),
        root.display(),
        root.display()
    );
    Ok(())
}
