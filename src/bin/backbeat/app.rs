//! Backbeat - application builder and runner

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use color_eyre::eyre::{Result as EyreResult, WrapErr};
use rtrb::Consumer;
use tracing::{info, warn};

use backbeat::context::Trigger;
use backbeat::decision::{DecisionTable, GrooveModel};
use backbeat::io::{LogPort, OutputPort};
use backbeat::timing::Clock;
use backbeat::{EngineConfig, EngineEvent, PerformanceEngine};

use super::drummer::Drummer;

#[cfg(feature = "midir")]
use backbeat::io::midir_port::{MidirInput, MidirOutput};

#[cfg(feature = "midir")]
type LiveInput = MidirInput;
#[cfg(not(feature = "midir"))]
type LiveInput = ();

/// Main application builder
pub struct Backbeat {
    config: EngineConfig,
    bars: u64,
    output: Option<String>,
    input: Option<String>,
}

impl Backbeat {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            bars: 8,
            output: None,
            input: None,
        }
    }

    /// Set the tempo in beats per minute
    pub fn bpm(mut self, bpm: f64) -> Self {
        self.config = self.config.bpm(bpm);
        self
    }

    /// How long to play before stopping
    pub fn bars(mut self, bars: u64) -> Self {
        self.bars = bars;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config = self.config.seed(seed);
        self
    }

    /// Send notes to the first MIDI output whose name contains `pattern`
    pub fn output(mut self, pattern: impl Into<String>) -> Self {
        self.output = Some(pattern.into());
        self
    }

    /// Listen to the first MIDI input whose name contains `pattern`
    pub fn input(mut self, pattern: impl Into<String>) -> Self {
        self.input = Some(pattern.into());
        self
    }

    /// Run the application (blocks until the last bar has played)
    pub fn run(self) -> EyreResult<()> {
        let table =
            DecisionTable::build(&GrooveModel::default()).wrap_err("failed to bake groove model")?;

        let port = self.output_port()?;
        let engine = Arc::new(
            PerformanceEngine::new(self.config.clone(), Arc::new(table), port)
                .wrap_err("invalid engine configuration")?,
        );
        let mut tally = Tally::new(engine.subscribe(4096));

        info!(bpm = self.config.bpm, bars = self.bars, "starting");
        engine.run_clock().wrap_err("failed to start engine")?;

        let live = self.open_input(&engine)?;
        if live.is_some() {
            self.wait_out(&engine, &mut tally);
        } else {
            self.play_drummer(&engine, &mut tally);
        }
        drop(live);

        engine.stop();
        tally.drain();
        info!(
            notes = tally.notes,
            rests = tally.rests,
            failures = tally.failures,
            ticks = tally.ticks,
            "finished"
        );

        let stats = engine.scheduler().stats();
        if stats.dropped > 0 {
            warn!(dropped = stats.dropped, "some note-offs never reached the port");
        }
        Ok(())
    }

    fn output_port(&self) -> EyreResult<Arc<dyn OutputPort>> {
        match &self.output {
            None => Ok(Arc::new(LogPort)),
            #[cfg(feature = "midir")]
            Some(pattern) => {
                let port = MidirOutput::open(pattern)
                    .wrap_err_with(|| format!("failed to open MIDI output {pattern:?}"))?;
                Ok(Arc::new(port))
            }
            #[cfg(not(feature = "midir"))]
            Some(_) => Err(color_eyre::eyre::eyre!("MIDI output needs the `midir` feature")),
        }
    }

    #[cfg(feature = "midir")]
    fn open_input(&self, engine: &Arc<PerformanceEngine>) -> EyreResult<Option<LiveInput>> {
        let Some(pattern) = &self.input else {
            return Ok(None);
        };

        let target = Arc::clone(engine);
        let input = MidirInput::open(pattern, self.config.drum_map, move |trigger| {
            let _ = target.on_trigger(trigger);
        })
        .wrap_err_with(|| format!("failed to open MIDI input {pattern:?}"))?;
        Ok(Some(input))
    }

    #[cfg(not(feature = "midir"))]
    fn open_input(&self, _engine: &Arc<PerformanceEngine>) -> EyreResult<Option<LiveInput>> {
        match self.input {
            None => Ok(None),
            Some(_) => Err(color_eyre::eyre::eyre!("MIDI input needs the `midir` feature")),
        }
    }

    fn total_steps(&self) -> usize {
        let steps_per_bar = self
            .config
            .time_signature
            .steps_per_bar(self.config.subdivisions_per_beat);
        (self.bars * steps_per_bar as u64) as usize
    }

    /// Feed the simulated drummer in time with the engine's clock
    fn play_drummer(&self, engine: &PerformanceEngine, tally: &mut Tally) {
        let mut drummer = Drummer::new(self.config.seed);
        let subdivisions = self.config.subdivisions_per_beat;

        for tick in engine
            .clock()
            .schedule_from(Instant::now())
            .take(self.total_steps())
        {
            sleep_until(tick.timestamp);

            let step = tick.step(subdivisions) - 1;
            for (kind, velocity) in drummer.hits(tick.bar_index, step) {
                let trigger = Trigger::new(kind, velocity, Instant::now());
                if let Err(e) = engine.on_trigger(trigger) {
                    warn!(error = %e, "trigger response failed");
                }
            }
            tally.drain();
        }
    }

    /// When the configured number of bars, counted from `origin`, is over
    fn end_of_run(&self, clock: &Clock, origin: Instant) -> Option<Instant> {
        clock
            .schedule_from(origin)
            .nth(self.total_steps())
            .map(|tick| tick.timestamp)
    }

    /// Let a live drummer play for the configured number of bars
    fn wait_out(&self, engine: &PerformanceEngine, tally: &mut Tally) {
        if let Some(end) = self.end_of_run(engine.clock(), Instant::now()) {
            while Instant::now() < end {
                sleep_until(end.min(Instant::now() + Duration::from_millis(250)));
                tally.drain();
            }
        }
    }
}

impl Default for Backbeat {
    fn default() -> Self {
        Self::new()
    }
}

fn sleep_until(deadline: Instant) {
    let now = Instant::now();
    if deadline > now {
        thread::sleep(deadline - now);
    }
}

/// Running count of what the engine reported
struct Tally {
    rx: Consumer<EngineEvent>,
    notes: usize,
    rests: usize,
    failures: usize,
    ticks: usize,
}

impl Tally {
    fn new(rx: Consumer<EngineEvent>) -> Self {
        Self {
            rx,
            notes: 0,
            rests: 0,
            failures: 0,
            ticks: 0,
        }
    }

    fn drain(&mut self) {
        while let Ok(event) = self.rx.pop() {
            match event {
                EngineEvent::NotePlayed { .. } => self.notes += 1,
                EngineEvent::Rest { .. } => self.rests += 1,
                EngineEvent::TransportFailed(_) => self.failures += 1,
                EngineEvent::Tick(_) => self.ticks += 1,
                EngineEvent::StateChanged(state) => info!(?state, "engine state"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backbeat::timing::TimeSignature;

    #[test]
    fn test_end_of_run_covers_every_bar() {
        let app = Backbeat::new().bpm(120.0).bars(1);
        let clock = Clock::new(120.0, 4, TimeSignature::default()).unwrap();
        let origin = Instant::now();

        // One 4/4 bar of sixteenths at 120 BPM is 16 steps of 125 ms
        assert_eq!(app.total_steps(), 16);
        assert_eq!(
            app.end_of_run(&clock, origin),
            Some(origin + Duration::from_secs(2))
        );
    }
}
