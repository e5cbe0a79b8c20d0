mod acquisition;
mod baseline;
mod cli;
mod color;
mod data;
mod error;
mod plot;
mod recipe;

use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, ensure, Context, Result};
use clap::Parser;

use acquisition::clock::SystemClock;
use acquisition::instrument::{OmnicApp, Simulator};
use acquisition::scheduler::{SeriesReport, SeriesRunner};
use baseline::{subtract_baseline, Baseline};
use cli::{AcquireArgs, BaselineArgs, Cli, Command, CombineArgs, PipelineArgs, PlotArgs, SelectArgs};
use data::combine::{combine_directory, CombineOptions};
use data::loader::load_table;
use data::select::select_and_save;
use data::writer::save_table;
use recipe::{suffixed, Recipe};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match Cli::parse().command {
        Command::Acquire(args) => acquire(&args),
        Command::Combine(args) => combine(&args),
        Command::Select(args) => select(&args),
        Command::Baseline(args) => correct(&args),
        Command::Plot(args) => plot(&args),
        Command::Pipeline(args) => pipeline(&args),
    }
}

// ---------------------------------------------------------------------------
// Acquisition
// ---------------------------------------------------------------------------

fn acquire(args: &AcquireArgs) -> Result<()> {
    ensure!(
        args.workdir.is_dir(),
        "working directory {} does not exist",
        args.workdir.display()
    );
    let config = args.series_config()?;

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
        .context("installing the Ctrl-C handler")?;

    let report: SeriesReport = if args.simulate {
        log::info!("Simulating the spectrometer in {}", args.workdir.display());
        SeriesRunner::new(config, Simulator::new(&args.workdir), SystemClock)
            .with_cancel_flag(cancel)
            .run()?
    } else {
        let app = OmnicApp {
            prog_id: args.prog_id.clone(),
            ..OmnicApp::default()
        };
        SeriesRunner::new(config, app, SystemClock)
            .with_cancel_flag(cancel)
            .run()?
    };

    if let Some(path) = &args.report {
        report.save(path)?;
    }
    if let Some(reason) = &report.aborted {
        bail!(
            "acquisition stopped after {} of {} collections: {reason}",
            report.cycles.len(),
            report.requested
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Processing
// ---------------------------------------------------------------------------

fn combine(args: &CombineArgs) -> Result<()> {
    fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("creating {}", args.output_dir.display()))?;
    let options = CombineOptions {
        order: args.order,
        keep_reference: args.keep_reference,
    };
    let tables = combine_directory(&args.input, options)
        .with_context(|| format!("combining {}", args.input.display()))?;
    tables.save(&args.output_dir)?;
    Ok(())
}

fn select(args: &SelectArgs) -> Result<()> {
    fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("creating {}", args.output_dir.display()))?;
    let table = load_table(&args.table)
        .with_context(|| format!("loading {}", args.table.display()))?;
    let (selected, path) = select_and_save(&table, args.range(), &args.columns, &args.output_dir)?;
    log::info!("Selected {selected} into {}", path.display());
    Ok(())
}

fn correct(args: &BaselineArgs) -> Result<()> {
    // Resolve the fitter before touching the data.
    let fitter = args.fitter()?;
    let table = load_table(&args.table)
        .with_context(|| format!("loading {}", args.table.display()))?;
    let corrected = subtract_baseline(&table, &fitter)
        .with_context(|| format!("{fitter} baseline on {}", args.table.display()))?;
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| suffixed(&args.table, fitter.name()));
    save_table(&corrected, &output)?;
    Ok(())
}

fn plot(args: &PlotArgs) -> Result<()> {
    fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("creating {}", args.output_dir.display()))?;
    let table = load_table(&args.table)
        .with_context(|| format!("loading {}", args.table.display()))?;
    plot::plot_table(&table, &args.options(), &args.output_dir)?;
    Ok(())
}

fn pipeline(args: &PipelineArgs) -> Result<()> {
    let recipe = match &args.config {
        Some(path) => Recipe::load(path)?,
        None => Recipe::default(),
    };
    let outputs = recipe.run().context("running the processing pipeline")?;

    log::info!("Pipeline finished");
    log::info!("  combined:  {}", outputs.combined_raw.display());
    log::info!("  reference: {}", outputs.referenced_raw.display());
    log::info!("  selected:  {}", outputs.selected.display());
    if let Some(path) = &outputs.corrected {
        log::info!("  baseline:  {}", path.display());
    }
    if let Some(path) = &outputs.figure {
        log::info!("  figure:    {}", path.display());
    }
    Ok(())
}
