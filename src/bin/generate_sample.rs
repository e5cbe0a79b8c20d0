use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

/// Write a synthetic kinetics series as headerless `wavenumber,absorbance`
/// exports, the way OMNIC leaves them after `spa-series acquire`.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Opts {
    /// Destination directory, created when missing
    #[arg(long, default_value = "raw")]
    output: PathBuf,

    /// Number of spectra in the series
    #[arg(long, default_value_t = 20)]
    count: u32,

    #[arg(long, default_value_t = 42)]
    seed: u64,
}

fn gaussian(x: f64, mu: f64, sigma: f64, amplitude: f64) -> f64 {
    amplitude * (-(x - mu).powi(2) / (2.0 * sigma.powi(2))).exp()
}

/// One spectrum `run` steps into a cure: the epoxide band at 915 cm⁻¹ fades,
/// the hydroxyl band at 3400 cm⁻¹ grows, and the baseline drifts upward.
fn generate_spectrum(wavenumbers: &[f64], run: u32, count: u32, rng: &mut SimpleRng) -> Vec<f64> {
    let progress = 1.0 - (-(run as f64) / (count.max(1) as f64 / 3.0)).exp();
    let drift = 0.002 * run as f64;
    let peaks = [
        (915.0, 8.0, 0.35 * (1.0 - progress)),
        (1510.0, 6.0, 0.45),
        (1735.0, 12.0, 0.20 + 0.15 * progress),
        (2925.0, 25.0, 0.25),
        (3400.0, 120.0, 0.05 + 0.30 * progress),
    ];

    wavenumbers
        .iter()
        .map(|&wn| {
            let signal: f64 = peaks
                .iter()
                .map(|&(mu, sigma, amp)| gaussian(wn, mu, sigma, amp))
                .sum();
            let background = 0.05 + drift + 1.5e-5 * (wn - 400.0) + 4e-9 * (wn - 2200.0).powi(2);
            signal + background + rng.gauss(0.0, 0.002)
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

fn main() -> Result<()> {
    let opts = Opts::parse();
    let mut rng = SimpleRng::new(opts.seed);

    // Wavenumbers: 4000 → 400, step 2
    let wavenumbers: Vec<f64> = (0..=1800).map(|i| 4000.0 - i as f64 * 2.0).collect();

    fs::create_dir_all(&opts.output)
        .with_context(|| format!("creating {}", opts.output.display()))?;

    for run in 0..opts.count {
        let absorbance = generate_spectrum(&wavenumbers, run, opts.count, &mut rng);
        let path = opts.output.join(format!("{run:04}.csv"));
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&path)
            .with_context(|| format!("creating {}", path.display()))?;
        for (w, a) in wavenumbers.iter().zip(&absorbance) {
            writer.write_record([format!("{w:.4}"), format!("{a:.6}")])?;
        }
        writer.flush()?;
    }

    println!(
        "Wrote {} spectra ({} wavenumbers each) to {}",
        opts.count,
        wavenumbers.len(),
        opts.output.display()
    );
    Ok(())
}
