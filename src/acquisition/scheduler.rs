use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use super::clock::{hms, Clock};
use super::instrument::Instrument;
use super::macro_file::{MacroScript, DEFAULT_EXPERIMENT, MACRO_FILE, SPA_OUTPUT};
use super::rename::{rename_output, set_aside_stale, Artifact, RenameOutcome};

/// Longest single sleep, so an interrupt is noticed promptly.
const TICK: Duration = Duration::from_millis(250);

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SeriesConfig {
    /// Target time between the starts of two collections.
    pub interval: Duration,
    pub count: u32,
    /// Where the macro is written and OMNIC exports its files.
    pub workdir: PathBuf,
    /// Time between two checks for `processing.spa`.
    pub poll_interval: Duration,
    /// The detected file must keep its size for this long before renaming.
    pub settle: Duration,
    pub experiment_file: String,
    pub author: String,
    pub show_progress: bool,
}

impl SeriesConfig {
    pub fn new(interval: Duration, count: u32) -> Self {
        SeriesConfig {
            interval,
            count,
            workdir: PathBuf::from("."),
            poll_interval: Duration::from_secs(2),
            settle: Duration::from_secs(1),
            experiment_file: DEFAULT_EXPERIMENT.to_string(),
            author: env!("CARGO_PKG_NAME").to_string(),
            show_progress: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Scheduling state
// ---------------------------------------------------------------------------

/// Cadence state carried from one cycle to the next.
#[derive(Debug, Clone)]
pub struct ScheduleContext {
    interval: Duration,
    next_start: Instant,
}

/// How a finished cycle relates to the interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleTiming {
    /// Time left until the next scheduled start.
    Slack(Duration),
    /// The cycle took this long, at least a whole interval; the interval has
    /// been stretched to it.
    Overrun(Duration),
}

impl ScheduleContext {
    pub fn new(interval: Duration, first_start: Instant) -> Self {
        ScheduleContext {
            interval,
            next_start: first_start,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn next_start(&self) -> Instant {
        self.next_start
    }

    /// Estimated time for `cycles_left` more collections.
    pub fn remaining(&self, cycles_left: u32) -> Duration {
        self.interval * cycles_left
    }

    /// Close the cycle that started at `next_start` and schedule the next one
    /// one interval later.
    pub fn finish_cycle(&mut self, now: Instant) -> CycleTiming {
        let duration = now.saturating_duration_since(self.next_start);
        let timing = if duration < self.interval {
            CycleTiming::Slack(self.interval - duration)
        } else {
            self.interval = duration;
            CycleTiming::Overrun(duration)
        };
        self.next_start += self.interval;
        timing
    }
}

// ---------------------------------------------------------------------------
// Run report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct CycleRecord {
    pub index: u32,
    pub started_at: DateTime<Local>,
    pub duration_s: f64,
    pub instrument_error: Option<String>,
    pub spa: RenameOutcome,
    pub csv: RenameOutcome,
}

/// Summary of one acquisition run, written as JSON on request.
#[derive(Debug, Clone, Serialize)]
pub struct SeriesReport {
    pub started_at: DateTime<Local>,
    pub workdir: PathBuf,
    pub requested: u32,
    pub interval_s: f64,
    pub final_interval_s: f64,
    pub interrupted: bool,
    /// Why the run stopped early, when it could not go on.
    pub aborted: Option<String>,
    pub cycles: Vec<CycleRecord>,
}

impl SeriesReport {
    fn new(config: &SeriesConfig) -> Self {
        SeriesReport {
            started_at: Local::now(),
            workdir: config.workdir.clone(),
            requested: config.count,
            interval_s: config.interval.as_secs_f64(),
            final_interval_s: config.interval.as_secs_f64(),
            interrupted: false,
            aborted: None,
            cycles: Vec::new(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = fs::File::create(path)
            .with_context(|| format!("creating report {}", path.display()))?;
        serde_json::to_writer_pretty(file, self).context("writing run report")?;
        log::info!("Run report written to {}", path.display());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Runs `count` collections at a fixed cadence, one after another.
pub struct SeriesRunner<I, C> {
    config: SeriesConfig,
    instrument: I,
    clock: C,
    cancel: Arc<AtomicBool>,
}

impl<I: Instrument, C: Clock> SeriesRunner<I, C> {
    pub fn new(config: SeriesConfig, instrument: I, clock: C) -> Self {
        SeriesRunner {
            config,
            instrument,
            clock,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share an interrupt flag (set from a Ctrl-C handler).
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub fn run(&mut self) -> Result<SeriesReport> {
        let count = self.config.count;
        if count == 0 {
            bail!("Number of collections must be greater than 0");
        }
        self.check_targets()?;
        self.announce();

        let macro_path = self.config.workdir.join(MACRO_FILE);
        let mut context = ScheduleContext::new(self.config.interval, self.clock.now());
        let mut report = SeriesReport::new(&self.config);

        for index in 0..count {
            if !self.sleep_until(context.next_start()) {
                return Ok(self.interrupted(report, &context));
            }
            log::info!("Collection {}/{count}", index + 1);
            let started_at = Local::now();
            let cycle_start = self.clock.now();

            for artifact in Artifact::ALL {
                if let Err(e) = set_aside_stale(&self.config.workdir, artifact, index) {
                    let reason = format!("leftover {} is in the way: {e}", artifact.source_name());
                    return Ok(self.aborted(report, &context, reason));
                }
            }

            let written = MacroScript::new(format!("{index:04}"))
                .with_experiment(&self.config.experiment_file)
                .with_author(&self.config.author)
                .write_to(&macro_path);
            if let Err(e) = written {
                return Ok(self.aborted(report, &context, format!("{e:#}")));
            }

            let instrument_error = match self.instrument.run_macro(&macro_path) {
                Ok(()) => None,
                Err(e) => {
                    log::error!("Running macro failed: {e}; still waiting for output");
                    Some(e.to_string())
                }
            };

            let spa_path = self.config.workdir.join(SPA_OUTPUT);
            if !self.wait_for_output(&spa_path) {
                return Ok(self.interrupted(report, &context));
            }
            log::info!("Output file {SPA_OUTPUT} detected, the collection has finished");
            if !self.wait_until_settled(&spa_path) {
                return Ok(self.interrupted(report, &context));
            }

            let spa = rename_output(&self.config.workdir, Artifact::Spa, index);
            let csv = rename_output(&self.config.workdir, Artifact::Csv, index);
            report.cycles.push(CycleRecord {
                index,
                started_at,
                duration_s: self.clock.now().duration_since(cycle_start).as_secs_f64(),
                instrument_error,
                spa,
                csv,
            });

            if index + 1 < count {
                let (h, m, s) = hms(context.remaining(count - index - 1));
                log::info!("Estimated remaining time: {h} hours {m} minutes {s} seconds");

                match context.finish_cycle(self.clock.now()) {
                    CycleTiming::Slack(slack) => {
                        // Stop one second early; the scheduled start decides
                        // when the next cycle begins.
                        let whole = slack.as_secs();
                        if whole >= 1 && !self.countdown(whole - 1) {
                            return Ok(self.interrupted(report, &context));
                        }
                    }
                    CycleTiming::Overrun(duration) => {
                        log::warn!("Single collection time is longer than the set interval");
                        log::warn!(
                            "Time interval now is {} seconds",
                            duration.as_secs_f64().round()
                        );
                    }
                }
            }
        }

        report.final_interval_s = context.interval().as_secs_f64();
        log::info!("Completed all {count} collections!");
        Ok(report)
    }

    fn announce(&self) {
        let (h, m, s) = hms(self.config.interval);
        let total = self.config.interval * (self.config.count - 1);
        let (th, tm, ts) = hms(total);
        log::info!("Starting spectrum collection");
        if h > 0 {
            log::info!("Interval: {h} hours {m} minutes {s} seconds");
        } else {
            log::info!("Interval: {m} minutes {s} seconds");
        }
        log::info!("Total collection number: {}", self.config.count);
        log::info!("Estimated total time: {th} hours {tm} minutes {ts} seconds");
    }

    /// Refuse to start when a numbered output of this run already exists.
    fn check_targets(&self) -> Result<()> {
        let taken: Vec<String> = (0..self.config.count)
            .flat_map(|index| Artifact::ALL.map(|artifact| artifact.indexed_name(index)))
            .filter(|name| self.config.workdir.join(name).exists())
            .collect();
        if !taken.is_empty() {
            bail!(
                "{} already holds {} of this run's output files ({}); \
                 move them or pick another working directory",
                self.config.workdir.display(),
                taken.len(),
                taken.iter().take(4).cloned().collect::<Vec<_>>().join(", ")
            );
        }
        Ok(())
    }

    fn aborted(
        &self,
        mut report: SeriesReport,
        context: &ScheduleContext,
        reason: String,
    ) -> SeriesReport {
        log::error!("Acquisition stopped: {reason}");
        report.aborted = Some(reason);
        report.final_interval_s = context.interval().as_secs_f64();
        report
    }

    fn interrupted(&self, mut report: SeriesReport, context: &ScheduleContext) -> SeriesReport {
        log::warn!("Execution interrupted by user");
        report.interrupted = true;
        report.final_interval_s = context.interval().as_secs_f64();
        report
    }

    fn progress(&self, bar: ProgressBar) -> ProgressBar {
        if self.config.show_progress {
            bar
        } else {
            ProgressBar::hidden()
        }
    }

    /// Sleep in ticks until `deadline`; false when interrupted.
    fn sleep_until(&self, deadline: Instant) -> bool {
        loop {
            if self.cancelled() {
                return false;
            }
            let now = self.clock.now();
            if now >= deadline {
                return true;
            }
            self.clock.sleep((deadline - now).min(TICK));
        }
    }

    /// Poll for `path` with no timeout; false when interrupted.
    fn wait_for_output(&self, path: &Path) -> bool {
        let spinner = self.progress(ProgressBar::new_spinner());
        let step = self.config.poll_interval / 4;
        loop {
            for dots in 0..4 {
                if self.cancelled() {
                    spinner.finish_and_clear();
                    return false;
                }
                spinner.set_message(format!("Collecting the spectrum{}", ".".repeat(dots)));
                spinner.tick();
                self.clock.sleep(step);
            }
            if path.exists() {
                spinner.finish_and_clear();
                return true;
            }
        }
    }

    /// Wait until the size of `path` stops changing across one settle period.
    fn wait_until_settled(&self, path: &Path) -> bool {
        let mut last = file_len(path);
        loop {
            if self.cancelled() {
                return false;
            }
            self.clock.sleep(self.config.settle);
            let current = file_len(path);
            if current == last {
                return true;
            }
            log::debug!("{} still growing", path.display());
            last = current;
        }
    }

    /// Show `mm:ss` from `total_seconds` down to zero, one second per step.
    fn countdown(&self, total_seconds: u64) -> bool {
        let bar = self.progress(ProgressBar::new(total_seconds + 1));
        bar.set_style(
            ProgressStyle::with_template("Waiting {msg} for next collection... {wide_bar}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        for remaining in (0..=total_seconds).rev() {
            if self.cancelled() {
                bar.finish_and_clear();
                return false;
            }
            bar.set_message(format!("{:02}:{:02}", remaining / 60, remaining % 60));
            self.clock.sleep(Duration::from_secs(1));
            bar.inc(1);
        }
        bar.finish_and_clear();
        true
    }
}

fn file_len(path: &Path) -> Option<u64> {
    fs::metadata(path).ok().map(|m| m.len())
}
