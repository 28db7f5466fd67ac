//! Driver loop: runs a simulation for a fixed number of ticks or until
//! stopped, reporting population sizes as it goes.

use crate::render::render;
use crate::simulation::{PopulationFlow, Simulation};
use eco_core::{Result, SimulationConfig};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{event, info, instrument, Level};

/// Where and how often to write rendered frames
#[derive(Debug, Clone)]
pub struct FrameOptions {
    pub dir: PathBuf,
    pub zoom: u32,
    /// Write a frame every this many ticks (0 is treated as 1)
    pub every: u64,
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Ticks to run; `None` runs until stopped
    pub steps: Option<u32>,
    pub frames: Option<FrameOptions>,
    /// Log population metrics every this many ticks
    pub metrics_interval: u64,
}

impl RunOptions {
    pub fn from_config(config: &SimulationConfig) -> Self {
        Self {
            steps: (!config.run_forever).then_some(config.num_steps),
            frames: None,
            metrics_interval: 100,
        }
    }
}

/// Per-population outcome of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PopulationSummary {
    pub name: String,
    pub final_count: u32,
    pub totals: PopulationFlow,
}

/// Outcome of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub seed: u64,
    pub ticks: u64,
    /// The run was halted by the stop flag before reaching its step count
    pub stopped_early: bool,
    pub populations: Vec<PopulationSummary>,
}

pub struct Runner {
    simulation: Simulation,
    options: RunOptions,
    stop: Arc<AtomicBool>,
}

impl Runner {
    pub fn new(simulation: Simulation, options: RunOptions) -> Self {
        Self {
            simulation,
            options,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Build the world for `config` and run it as configured.
    pub fn from_config(config: &SimulationConfig) -> Result<Self> {
        Ok(Self::new(Simulation::new(config)?, RunOptions::from_config(config)))
    }

    pub fn with_frames(mut self, frames: FrameOptions) -> Self {
        self.options.frames = Some(frames);
        self
    }

    /// Flag checked between ticks; setting it ends the run after the current tick.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    /// Run to completion, writing one census line per tick to `census`.
    #[instrument(skip_all, fields(seed = self.simulation.seed(), steps = ?self.options.steps))]
    pub fn run<W: Write>(&mut self, census: &mut W) -> Result<RunSummary> {
        let names: Vec<String> = self
            .simulation
            .world()
            .populations()
            .iter()
            .map(|p| p.name.clone())
            .collect();
        let mut totals = vec![PopulationFlow::default(); names.len()];
        let mut extinct: Vec<bool> = self.simulation.world().counts().iter().map(|&c| c == 0).collect();
        let mut stopped_early = false;

        if let Some(frames) = &self.options.frames {
            std::fs::create_dir_all(&frames.dir)?;
        }

        info!(
            seed = self.simulation.seed(),
            width = self.simulation.world().width(),
            height = self.simulation.world().height(),
            populations = names.len(),
            "Starting simulation"
        );

        let mut last_frame = None;
        loop {
            let tick = self.simulation.tick();
            let counts = self.simulation.world().counts();
            writeln!(census, "{}", census_line(tick, self.options.steps, &names, &counts))?;

            if let Some(frames) = &self.options.frames {
                if tick % frames.every.max(1) == 0 {
                    self.write_frame(frames, tick)?;
                    last_frame = Some(tick);
                }
            }

            if self.options.steps.is_some_and(|steps| tick >= steps as u64) {
                break;
            }
            if self.stop.load(Ordering::Relaxed) {
                info!(tick, "Stop requested, ending run between ticks");
                stopped_early = true;
                break;
            }

            let report = self.simulation.step();
            for (total, flow) in totals.iter_mut().zip(&report.flows) {
                total.accumulate(flow);
            }

            let counts = self.simulation.world().counts();
            for (p, &count) in counts.iter().enumerate() {
                if count == 0 && !extinct[p] {
                    info!(
                        event = "population_extinct",
                        population = %names[p],
                        tick = self.simulation.tick(),
                        "Population died out"
                    );
                }
                extinct[p] = count == 0;
            }

            let interval = self.options.metrics_interval;
            if interval > 0 && self.simulation.tick() % interval == 0 {
                self.emit_population_metrics(&names, &counts, &totals);
            }
        }

        if let Some(frames) = &self.options.frames {
            let tick = self.simulation.tick();
            if last_frame != Some(tick) {
                self.write_frame(frames, tick)?;
            }
        }

        let summary = RunSummary {
            seed: self.simulation.seed(),
            ticks: self.simulation.tick(),
            stopped_early,
            populations: names
                .into_iter()
                .zip(self.simulation.world().counts())
                .zip(totals)
                .map(|((name, final_count), totals)| PopulationSummary {
                    name,
                    final_count,
                    totals,
                })
                .collect(),
        };
        self.emit_run_summary(&summary);
        Ok(summary)
    }

    fn write_frame(&self, frames: &FrameOptions, tick: u64) -> Result<()> {
        let path = frames.dir.join(format!("frame_{:06}.png", tick));
        render(self.simulation.world(), frames.zoom).save_png(&path)?;
        tracing::debug!(tick, path = %path.display(), "Wrote frame");
        Ok(())
    }

    fn emit_population_metrics(&self, names: &[String], counts: &[u32], totals: &[PopulationFlow]) {
        let tick = self.simulation.tick();
        for ((name, &count), flow) in names.iter().zip(counts).zip(totals) {
            info!(
                event = "population_metrics",
                tick,
                population = %name,
                count,
                births_total = flow.births,
                moves_total = flow.moves,
                eaten_total = flow.eaten,
                starved_total = flow.starved,
                "Population metrics snapshot"
            );

            event!(
                Level::DEBUG,
                gauge_name = "population_size",
                gauge_value = count,
                population = %name,
                tick,
                "Population gauge"
            );
        }
    }

    fn emit_run_summary(&self, summary: &RunSummary) {
        info!(
            event = "run_summary",
            seed = summary.seed,
            ticks = summary.ticks,
            stopped_early = summary.stopped_early,
            "Simulation complete"
        );
        for population in &summary.populations {
            info!(
                event = "population_summary",
                population = %population.name,
                final_count = population.final_count,
                births = population.totals.births,
                eaten = population.totals.eaten,
                starved = population.totals.starved,
                "Population outcome"
            );
        }
    }
}

/// Format one census line:
/// `Time 3/100: Population sizes: { "rabbit": 10 | "fox": 2 }`.
/// Runs without a step limit omit the `/100`.
pub fn census_line(tick: u64, steps: Option<u32>, names: &[String], counts: &[u32]) -> String {
    let mut line = match steps {
        Some(steps) => format!("Time {}/{}: Population sizes: {{ ", tick, steps),
        None => format!("Time {}: Population sizes: {{ ", tick),
    };
    for (i, (name, count)) in names.iter().zip(counts).enumerate() {
        if i > 0 {
            line.push_str(" | ");
        }
        line.push_str(&format!("\"{}\": {}", name, count));
    }
    line.push_str(" }");
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(steps: u32) -> SimulationConfig {
        let mut config = SimulationConfig::foxes_and_rabbits(30, 20);
        config.num_steps = steps;
        config.random_seed = Some(7);
        config
    }

    #[test]
    fn test_census_line_format() {
        let names = vec!["rabbit".to_string(), "fox".to_string()];
        assert_eq!(
            census_line(3, Some(100), &names, &[10, 2]),
            "Time 3/100: Population sizes: { \"rabbit\": 10 | \"fox\": 2 }"
        );
        assert_eq!(
            census_line(3, None, &names[..1], &[10]),
            "Time 3: Population sizes: { \"rabbit\": 10 }"
        );
    }

    #[test]
    fn test_run_fixed_steps() {
        let mut runner = Runner::from_config(&config(25)).unwrap();
        let mut out = Vec::new();
        let summary = runner.run(&mut out).unwrap();

        assert_eq!(summary.ticks, 25);
        assert!(!summary.stopped_early);
        assert_eq!(summary.seed, 7);
        assert_eq!(
            summary.populations.iter().map(|p| p.final_count).collect::<Vec<_>>(),
            runner.simulation().world().counts()
        );

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 26);
        assert!(lines[0].starts_with("Time 0/25: Population sizes: { \"rabbit\": 60 | \"fox\": 6 }"));
        assert!(lines[25].starts_with("Time 25/25:"));
    }

    #[test]
    fn test_zero_steps_reports_initial_state_only() {
        let mut runner = Runner::from_config(&config(0)).unwrap();
        let mut out = Vec::new();
        let summary = runner.run(&mut out).unwrap();
        assert_eq!(summary.ticks, 0);
        assert_eq!(String::from_utf8(out).unwrap().lines().count(), 1);
    }

    #[test]
    fn test_stop_flag_halts_forever_run() {
        let mut config = config(0);
        config.run_forever = true;
        let mut runner = Runner::from_config(&config).unwrap();
        runner.stop_handle().store(true, Ordering::Relaxed);

        let mut out = Vec::new();
        let summary = runner.run(&mut out).unwrap();
        assert!(summary.stopped_early);
        assert_eq!(summary.ticks, 0);
        assert!(String::from_utf8(out).unwrap().starts_with("Time 0: "));
    }

    #[test]
    fn test_totals_match_tally_changes() {
        let mut runner = Runner::from_config(&config(40)).unwrap();
        let initial = runner.simulation().world().counts();
        let summary = runner.run(&mut std::io::sink()).unwrap();
        for (start, population) in initial.iter().zip(&summary.populations) {
            let t = &population.totals;
            assert_eq!(
                *start as i64 + t.births as i64 - t.eaten as i64 - t.starved as i64,
                population.final_count as i64
            );
        }
    }

    #[test]
    fn test_frames_written() {
        let dir = tempfile::tempdir().unwrap();
        let frames = FrameOptions {
            dir: dir.path().join("frames"),
            zoom: 2,
            every: 4,
        };
        let mut runner = Runner::from_config(&config(10)).unwrap().with_frames(frames);
        runner.run(&mut std::io::sink()).unwrap();

        let mut written: Vec<String> = std::fs::read_dir(dir.path().join("frames"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        written.sort();
        assert_eq!(
            written,
            vec!["frame_000000.png", "frame_000004.png", "frame_000008.png", "frame_000010.png"]
        );
    }
}
