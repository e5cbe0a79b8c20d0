use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use rprompt::prompt_reply;

use crate::acquisition::instrument::DEFAULT_PROG_ID;
use crate::acquisition::macro_file::DEFAULT_EXPERIMENT;
use crate::acquisition::scheduler::SeriesConfig;
use crate::baseline::Fitter;
use crate::data::combine::FileOrder;
use crate::data::select::ColumnSelector;
use crate::plot::PlotOptions;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Timed FTIR spectrum series with OMNIC, and the tools to process them",
    long_about = None,
    arg_required_else_help = true,
    after_help = "Examples:\n  spa-series acquire --interval 60 --count 30 --workdir C:\\data\\cure\n  spa-series combine --input raw --output-dir out\n  spa-series select out/referenced_raw.csv --range 1800 800 --columns 1 5 10\n  spa-series baseline out/selected_800-1800.csv --algorithm snip --max-half-window 60\n  spa-series pipeline --config recipe.json\n"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Collect a series of spectra at a fixed interval through OMNIC
    Acquire(AcquireArgs),
    /// Combine raw two-column exports into one raw and one referenced table
    Combine(CombineArgs),
    /// Keep a wavenumber window and a subset of columns
    Select(SelectArgs),
    /// Fit and subtract a baseline from every column of a table
    Baseline(BaselineArgs),
    /// Plot every column of a table as a PNG
    Plot(PlotArgs),
    /// combine → select → baseline → plot in one go
    Pipeline(PipelineArgs),
}

// ---------------------------------------------------------------------------
// acquire
// ---------------------------------------------------------------------------

#[derive(Args, Debug)]
pub struct AcquireArgs {
    /// Seconds between the starts of two collections (asked for when omitted)
    #[arg(long)]
    pub interval: Option<f64>,

    /// Number of spectra to collect (asked for when omitted)
    #[arg(long)]
    pub count: Option<u32>,

    /// Directory for the macro and the collected files
    #[arg(long, default_value = ".")]
    pub workdir: PathBuf,

    /// OMNIC experiment file loaded before each collection
    #[arg(long, default_value = DEFAULT_EXPERIMENT)]
    pub experiment: String,

    /// Author written into the macro header
    #[arg(long, default_value = env!("CARGO_PKG_NAME"))]
    pub author: String,

    /// COM ProgID of the OMNIC automation object
    #[arg(long, default_value = DEFAULT_PROG_ID)]
    pub prog_id: String,

    /// Seconds between checks for processing.spa
    #[arg(long, default_value_t = 2.0)]
    pub poll: f64,

    /// Seconds the output size must stay unchanged before renaming
    #[arg(long, default_value_t = 1.0)]
    pub settle: f64,

    /// Write synthetic spectra instead of driving OMNIC
    #[arg(long)]
    pub simulate: bool,

    /// Write a JSON run report to this file
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Hide the spinner and countdown
    #[arg(short, long)]
    pub quiet: bool,
}

impl AcquireArgs {
    /// Flags plus prompted answers for the interval and count.
    pub fn series_config(&self) -> anyhow::Result<SeriesConfig> {
        let interval = match self.interval {
            Some(seconds) => seconds,
            None => prompt_number("Time interval between collections (seconds): ")?,
        };
        let count = match self.count {
            Some(count) => count,
            None => prompt_number("Number of collections: ")?,
        };
        if count == 0 {
            bail!("Number of collections must be greater than 0");
        }

        Ok(SeriesConfig {
            workdir: self.workdir.clone(),
            poll_interval: positive_seconds(self.poll, "poll interval")?,
            settle: positive_seconds(self.settle, "settle time")?,
            experiment_file: self.experiment.clone(),
            author: self.author.clone(),
            show_progress: !self.quiet,
            ..SeriesConfig::new(positive_seconds(interval, "interval")?, count)
        })
    }
}

fn prompt_number<T: std::str::FromStr>(prompt: &str) -> anyhow::Result<T> {
    let reply = prompt_reply(prompt).context("reading from the console")?;
    reply
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid input '{}', please enter a valid number", reply.trim()))
}

/// Seconds as a strictly positive, finite duration.
pub fn positive_seconds(seconds: f64, what: &str) -> anyhow::Result<Duration> {
    if !(seconds.is_finite() && seconds > 0.0) {
        bail!("The {what} must be a positive number of seconds, got {seconds}");
    }
    Duration::try_from_secs_f64(seconds).with_context(|| format!("{what} of {seconds} s"))
}

// ---------------------------------------------------------------------------
// Processing commands
// ---------------------------------------------------------------------------

#[derive(Args, Debug)]
pub struct CombineArgs {
    /// Directory with the headerless two-column exports
    #[arg(long, default_value = "raw")]
    pub input: PathBuf,

    #[arg(long, default_value = ".")]
    pub output_dir: PathBuf,

    #[arg(long, value_enum, default_value_t = FileOrder::Natural)]
    pub order: FileOrder,

    /// Leave the first column unsubtracted in the referenced table
    #[arg(long)]
    pub keep_reference: bool,
}

#[derive(Args, Debug)]
pub struct SelectArgs {
    /// Table to select from (.csv or .parquet)
    pub table: PathBuf,

    /// Inclusive wavenumber window, bounds in any order
    #[arg(long, num_args = 2, value_names = ["LO", "HI"], allow_negative_numbers = true)]
    pub range: Option<Vec<f64>>,

    /// Columns to keep: a position (1 = first value column), a header name,
    /// or name:<header> for numeric-looking headers
    #[arg(long, num_args = 1..)]
    pub columns: Vec<ColumnSelector>,

    #[arg(long, default_value = ".")]
    pub output_dir: PathBuf,
}

impl SelectArgs {
    pub fn range(&self) -> Option<(f64, f64)> {
        pair(&self.range)
    }
}

#[derive(Args, Debug)]
pub struct BaselineArgs {
    /// Table to correct (.csv or .parquet)
    pub table: PathBuf,

    /// modpoly, asls, mor or snip
    #[arg(short, long, default_value = "asls")]
    pub algorithm: String,

    /// Polynomial order (modpoly)
    #[arg(long)]
    pub poly_order: Option<usize>,

    /// Smoothness penalty (asls)
    #[arg(long)]
    pub lam: Option<f64>,

    /// Asymmetry weight for points above the baseline (asls)
    #[arg(long)]
    pub p: Option<f64>,

    /// Structuring element half width in points (mor)
    #[arg(long)]
    pub half_window: Option<usize>,

    /// Largest clipping half window in points (snip)
    #[arg(long)]
    pub max_half_window: Option<usize>,

    /// Moving-average half window, 0 disables smoothing (snip)
    #[arg(long)]
    pub smooth_half_window: Option<usize>,

    /// Clip with increasing instead of decreasing windows (snip)
    #[arg(long)]
    pub increasing: bool,

    /// Output table; defaults to <table>_<algorithm>.<ext>
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl BaselineArgs {
    /// The named fitter with the parameter flags that apply to it.
    pub fn fitter(&self) -> crate::error::Result<Fitter> {
        let mut fitter = Fitter::from_name(&self.algorithm)?;
        let given = [
            ("--poly-order", self.poly_order.is_some()),
            ("--lam", self.lam.is_some()),
            ("--p", self.p.is_some()),
            ("--half-window", self.half_window.is_some()),
            ("--max-half-window", self.max_half_window.is_some()),
            ("--smooth-half-window", self.smooth_half_window.is_some()),
            ("--increasing", self.increasing),
        ];

        let applies: &[&str] = match &mut fitter {
            Fitter::ModPoly(f) => {
                if let Some(order) = self.poly_order {
                    f.poly_order = order;
                }
                &["--poly-order"]
            }
            Fitter::Asls(f) => {
                if let Some(lam) = self.lam {
                    f.lam = lam;
                }
                if let Some(p) = self.p {
                    f.p = p;
                }
                &["--lam", "--p"]
            }
            Fitter::Mor(f) => {
                if let Some(w) = self.half_window {
                    f.half_window = w;
                }
                &["--half-window"]
            }
            Fitter::Snip(f) => {
                if let Some(w) = self.max_half_window {
                    f.max_half_window = w;
                }
                if let Some(w) = self.smooth_half_window {
                    f.smooth_half_window = w;
                }
                if self.increasing {
                    f.decreasing = false;
                }
                &["--max-half-window", "--smooth-half-window", "--increasing"]
            }
        };

        for (flag, set) in given {
            if set && !applies.contains(&flag) {
                log::warn!("{flag} does not apply to {fitter}, ignored");
            }
        }
        Ok(fitter)
    }
}

#[derive(Args, Debug)]
pub struct PlotArgs {
    /// Table to plot (.csv or .parquet)
    pub table: PathBuf,

    #[arg(long, num_args = 2, value_names = ["LO", "HI"], allow_negative_numbers = true)]
    pub x_range: Option<Vec<f64>>,

    #[arg(long, num_args = 2, value_names = ["LO", "HI"], allow_negative_numbers = true)]
    pub y_range: Option<Vec<f64>>,

    /// Draw wavenumbers increasing to the right
    #[arg(long)]
    pub no_reverse: bool,

    #[arg(long)]
    pub title: Option<String>,

    /// Minutes per step of the number in each column name
    #[arg(long, default_value_t = 1.0)]
    pub label_scale: f64,

    #[arg(long, default_value_t = 1500)]
    pub width: u32,

    #[arg(long, default_value_t = 1200)]
    pub height: u32,

    #[arg(long, default_value = ".")]
    pub output_dir: PathBuf,
}

impl PlotArgs {
    pub fn options(&self) -> PlotOptions {
        PlotOptions {
            x_range: pair(&self.x_range),
            y_range: pair(&self.y_range),
            reverse_x: !self.no_reverse,
            title: self.title.clone(),
            label_scale: self.label_scale,
            width: self.width,
            height: self.height,
        }
    }
}

#[derive(Args, Debug)]
pub struct PipelineArgs {
    /// JSON recipe; built-in defaults when omitted
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// `--flag LO HI` as a tuple; clap guarantees two values.
fn pair(values: &Option<Vec<f64>>) -> Option<(f64, f64)> {
    match values.as_deref() {
        Some([lo, hi]) => Some((*lo, *hi)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;
    use crate::error::ProcessingError;

    fn parse(args: &[&str]) -> Command {
        let mut argv = vec!["spa-series"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap().command
    }

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn acquire_flags_build_a_config() {
        let Command::Acquire(args) = parse(&[
            "acquire", "--interval", "90", "--count", "12", "--poll", "0.5", "--quiet",
        ]) else {
            panic!("expected acquire");
        };
        let config = args.series_config().unwrap();
        assert_eq!(config.interval, Duration::from_secs(90));
        assert_eq!(config.count, 12);
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert_eq!(config.settle, Duration::from_secs(1));
        assert_eq!(config.experiment_file, DEFAULT_EXPERIMENT);
        assert!(!config.show_progress);
    }

    #[test]
    fn zero_count_and_bad_interval_are_rejected() {
        let Command::Acquire(args) = parse(&["acquire", "--interval", "10", "--count", "0"]) else {
            panic!("expected acquire");
        };
        assert!(args.series_config().is_err());

        assert!(positive_seconds(0.0, "interval").is_err());
        assert!(positive_seconds(-5.0, "interval").is_err());
        assert!(positive_seconds(f64::NAN, "interval").is_err());
        assert_eq!(positive_seconds(2.5, "interval").unwrap(), Duration::from_millis(2500));
    }

    #[test]
    fn select_parses_range_and_selectors() {
        let Command::Select(args) = parse(&[
            "select", "t.csv", "--range", "1800", "800", "--columns", "1", "name:0003", "late",
        ]) else {
            panic!("expected select");
        };
        assert_eq!(args.range(), Some((1800.0, 800.0)));
        assert_eq!(
            args.columns,
            vec![
                ColumnSelector::Position(1),
                ColumnSelector::Name("0003".into()),
                ColumnSelector::Name("late".into()),
            ]
        );
    }

    #[test]
    fn baseline_flags_override_defaults() {
        let Command::Baseline(args) = parse(&[
            "baseline", "t.csv", "--algorithm", "SNIP", "--max-half-window", "12", "--increasing",
            "--lam", "5",
        ]) else {
            panic!("expected baseline");
        };
        match args.fitter().unwrap() {
            Fitter::Snip(snip) => {
                assert_eq!(snip.max_half_window, 12);
                assert!(!snip.decreasing);
                assert_eq!(snip.smooth_half_window, 3);
            }
            other => panic!("unexpected fitter {other:?}"),
        }
    }

    #[test]
    fn unknown_algorithm_fails() {
        let Command::Baseline(args) = parse(&["baseline", "t.csv", "-a", "rubberband"]) else {
            panic!("expected baseline");
        };
        assert!(matches!(
            args.fitter(),
            Err(ProcessingError::UnknownAlgorithm(name)) if name == "rubberband"
        ));
    }

    #[test]
    fn plot_options_from_flags() {
        let Command::Plot(args) = parse(&[
            "plot", "t.csv", "--x-range", "1800", "1000", "--no-reverse", "--label-scale", "2",
        ]) else {
            panic!("expected plot");
        };
        let options = args.options();
        assert_eq!(options.x_range, Some((1800.0, 1000.0)));
        assert_eq!(options.y_range, None);
        assert!(!options.reverse_x);
        assert_eq!(options.label_scale, 2.0);
        assert_eq!((options.width, options.height), (1500, 1200));
    }
}
