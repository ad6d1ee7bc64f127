/*
Performance Engine
==================

Wires the clock, the context tracker, the decision source and the scheduler
together:

  Trigger ──▶ tracker.on_trigger ──┐
                                   ├──▶ decide ──▶ fire_note_on
  Tick ────────────────────────────┘            └─▶ schedule_note_off(t + duration)

A decision reads one consistent snapshot of the rolling window, draws one
outcome from the decision source and, if the outcome plays, sends the note-on
right away and hands the note-off to the scheduler. Which inputs lead to a
decision is set by `DecisionPolicy`.

Lifecycle:

  Idle ──start──▶ Running ──stop──▶ Draining ──(flush done)──▶ Idle

Inputs are ignored outside Running. An input holds the state read lock for
the whole decision, so `stop` only leaves Running once every decision in
flight has sent its note-on and queued its note-off. While Draining the clock
thread is joined and every pending note-off is sent before the engine reports
Idle. Concurrent `stop` calls all return after Idle.
*/

pub mod events;
pub mod queue;
pub mod scheduler;

use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rtrb::Consumer;
use tracing::{debug, info, trace, warn};

use crate::config::{DecisionPolicy, EngineConfig};
use crate::context::{ContextTracker, DrumKind, Trigger};
use crate::decision::harmony::scale_velocity;
use crate::decision::DecisionSource;
use crate::error::{EngineError, TransportError, ValidationError};
use crate::io::input::InputEvent;
use crate::io::midi::Note;
use crate::io::port::OutputPort;
use crate::timing::{Clock, Tick};

pub use events::{EngineEvent, EventBus};
pub use queue::{NoteOffQueue, ScheduledEvent};
pub use scheduler::{EventScheduler, ManualTime, SchedulerStats, SystemTime, TimeSource};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EngineState {
    #[default]
    Idle,
    Running,
    Draining,
}

/// Real-time accompanist: listens to drums, answers with notes
pub struct PerformanceEngine {
    config: EngineConfig,
    clock: Arc<Clock>,
    tracker: ContextTracker,
    decisions: Arc<dyn DecisionSource>,
    scheduler: EventScheduler,
    rng: Mutex<StdRng>,
    state: RwLock<EngineState>,
    /// Held for the whole of `stop`
    stopping: Mutex<()>,
    events: EventBus,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl PerformanceEngine {
    pub fn new(
        config: EngineConfig,
        decisions: Arc<dyn DecisionSource>,
        port: Arc<dyn OutputPort>,
    ) -> Result<Self, EngineError> {
        Self::with_time_source(config, decisions, port, Arc::new(SystemTime))
    }

    /// Engine whose note-off deadlines are measured against `time`
    pub fn with_time_source(
        config: EngineConfig,
        decisions: Arc<dyn DecisionSource>,
        port: Arc<dyn OutputPort>,
        time: Arc<dyn TimeSource>,
    ) -> Result<Self, EngineError> {
        config.validate()?;

        let clock = Clock::new(
            config.bpm,
            config.subdivisions_per_beat,
            config.time_signature,
        )?;
        let tracker = ContextTracker::new(
            config.thresholds,
            config.window_capacity,
            config.rolling_window_span(),
        );
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            clock: Arc::new(clock),
            tracker,
            decisions,
            scheduler: EventScheduler::with_time_source(port, time),
            rng: Mutex::new(rng),
            state: RwLock::new(EngineState::Idle),
            stopping: Mutex::new(()),
            events: EventBus::new(),
            timer: Mutex::new(None),
            config,
        })
    }

    /// Begin accepting input. Does nothing unless Idle.
    pub fn start(&self) -> Result<(), EngineError> {
        let mut state = self.write_state();
        if *state != EngineState::Idle {
            return Ok(());
        }

        self.scheduler.start()?;
        self.tracker.reset();
        *state = EngineState::Running;
        drop(state);

        info!(
            bpm = self.clock.tempo(),
            policy = ?self.config.decision_policy,
            "engine running"
        );
        self.events.publish(EngineEvent::StateChanged(EngineState::Running));
        Ok(())
    }

    /// Stop the clock, send every pending note-off, return to Idle.
    ///
    /// Waits for decisions in flight. A second caller blocks until the
    /// first has reached Idle.
    pub fn stop(&self) {
        let _stopping = self.stopping.lock().unwrap_or_else(PoisonError::into_inner);
        {
            let mut state = self.write_state();
            if *state != EngineState::Running {
                return;
            }
            *state = EngineState::Draining;
        }
        self.events.publish(EngineEvent::StateChanged(EngineState::Draining));

        self.clock.stop();
        let timer = self.lock_timer().take();
        if let Some(handle) = timer {
            if handle.thread().id() == thread::current().id() {
                debug!("stop called from the clock thread, not joining");
            } else if handle.join().is_err() {
                warn!("clock thread panicked");
            }
        }

        let pending = self.scheduler.pending();
        self.scheduler.stop();

        *self.write_state() = EngineState::Idle;
        info!(flushed = pending, "engine stopped");
        self.events.publish(EngineEvent::StateChanged(EngineState::Idle));
    }

    pub fn state(&self) -> EngineState {
        *self.read_state()
    }

    pub fn is_running(&self) -> bool {
        self.state() == EngineState::Running
    }

    /// Record a drum hit and, depending on policy, answer it.
    ///
    /// Returns the note that was started, if any.
    pub fn on_trigger(&self, trigger: Trigger) -> Result<Option<Note>, TransportError> {
        let state = self.read_state();
        if *state != EngineState::Running {
            return Ok(None);
        }

        self.tracker.on_trigger(trigger);
        trace!(kind = ?trigger.kind, velocity = trigger.velocity, "trigger");

        let decides = match self.config.decision_policy {
            DecisionPolicy::EveryTick => false,
            DecisionPolicy::KickImmediate => trigger.kind == DrumKind::Kick,
            DecisionPolicy::TriggerOnly => true,
        };
        if !decides {
            return Ok(None);
        }

        self.tracker.take_pending();
        let played = self.decide(trigger.timestamp);
        drop(state);
        played
    }

    /// Advance one clock step and, depending on policy, decide.
    ///
    /// Returns the note that was started, if any.
    pub fn on_tick(&self, tick: Tick) -> Result<Option<Note>, TransportError> {
        let state = self.read_state();
        if *state != EngineState::Running {
            return Ok(None);
        }
        self.events.publish(EngineEvent::Tick(tick));

        if !self.config.decision_policy.decides_on_tick() {
            return Ok(None);
        }

        let fresh = self.tracker.take_pending();
        if self.config.rest_when_silent && fresh == 0 {
            let context = self.tracker.context_at(tick.timestamp);
            self.events.publish(EngineEvent::Rest { context });
            return Ok(None);
        }

        let played = self.decide(tick.timestamp);
        drop(state);
        played
    }

    pub fn handle(&self, input: InputEvent) -> Result<Option<Note>, TransportError> {
        match input {
            InputEvent::Trigger(trigger) => self.on_trigger(trigger),
            InputEvent::Tick(tick) => self.on_tick(tick),
        }
    }

    /// Drive `on_tick` from the engine's own clock on a background thread.
    ///
    /// Starts the engine if it is Idle. The thread ends and is joined on `stop`.
    pub fn run_clock(self: &Arc<Self>) -> Result<(), EngineError> {
        self.start()?;

        let mut timer = self.lock_timer();
        if timer.is_some() {
            return Ok(());
        }

        self.clock.start();
        let engine = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name("backbeat-clock".into())
            .spawn(move || {
                for tick in engine.clock.ticks() {
                    // Failures are already logged and published by decide
                    let _ = engine.on_tick(tick);
                }
                debug!("clock thread finished");
            });

        match spawned {
            Ok(handle) => {
                *timer = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.clock.stop();
                Err(EngineError::Thread {
                    name: "clock",
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Change tempo; an invalid value keeps the current one
    pub fn set_tempo(&self, bpm: f64) -> Result<(), ValidationError> {
        self.clock.set_tempo(bpm)
    }

    /// Receive engine events on a queue holding up to `capacity` of them
    pub fn subscribe(&self, capacity: usize) -> Consumer<EngineEvent> {
        self.events.subscribe(capacity)
    }

    pub fn clock(&self) -> &Arc<Clock> {
        &self.clock
    }

    pub fn tracker(&self) -> &ContextTracker {
        &self.tracker
    }

    pub fn scheduler(&self) -> &EventScheduler {
        &self.scheduler
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn decide(&self, now: Instant) -> Result<Option<Note>, TransportError> {
        let snapshot = self.tracker.snapshot_at(now);
        let context = snapshot.context;

        let (outcome, pitch) = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            let outcome = self.decisions.sample(context, &mut *rng);
            let pitch = outcome
                .play
                .then(|| outcome.pitch.resolve(outcome.channel, &mut *rng));
            (outcome, pitch)
        };

        let Some(pitch) = pitch else {
            trace!(%context, "rest");
            self.events.publish(EngineEvent::Rest { context });
            return Ok(None);
        };

        let base_velocity = snapshot
            .mean_velocity
            .map(|mean| mean.round().clamp(1.0, 127.0) as u8)
            .unwrap_or(self.config.default_velocity);
        let note = Note::new(
            outcome.channel,
            pitch,
            scale_velocity(base_velocity, context.energy),
        );

        if let Err(e) = self.scheduler.fire_note_on(note) {
            warn!(channel = note.channel, pitch = note.pitch, error = %e, "note on failed");
            self.events.publish(EngineEvent::TransportFailed(e.clone()));
            return Err(e);
        }
        self.scheduler
            .schedule_note_off(note, now + self.config.note_duration());

        debug!(%context, channel = note.channel, pitch = note.pitch, velocity = note.velocity, "play");
        self.events.publish(EngineEvent::NotePlayed { context, note });
        Ok(Some(note))
    }

    // Never taken twice on one thread: a waiting writer blocks new readers
    fn read_state(&self) -> RwLockReadGuard<'_, EngineState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, EngineState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_timer(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.timer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for PerformanceEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Density, Energy};
    use crate::decision::{DecisionTable, Outcome, SourceModel};
    use crate::io::port::MemoryPort;
    use std::time::Duration;

    fn engine_with(
        model: SourceModel,
        config: EngineConfig,
    ) -> (PerformanceEngine, Arc<MemoryPort>, Arc<ManualTime>) {
        let table = DecisionTable::build(&model).unwrap();
        let port = Arc::new(MemoryPort::new());
        let time = Arc::new(ManualTime::new());
        let engine =
            PerformanceEngine::with_time_source(config, Arc::new(table), port.clone(), time.clone())
                .unwrap();
        (engine, port, time)
    }

    fn tick_at(timestamp: Instant) -> Tick {
        Tick {
            timestamp,
            bar_index: 0,
            beat_index: 0,
            subdivision: 0,
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let table = DecisionTable::build(&SourceModel::constant(Outcome::REST)).unwrap();
        let result = PerformanceEngine::new(
            EngineConfig::default().bpm(0.0),
            Arc::new(table),
            Arc::new(MemoryPort::new()),
        );
        assert!(matches!(result, Err(EngineError::Validation(_))));
    }

    #[test]
    fn test_lifecycle_events() {
        let (engine, _port, _time) =
            engine_with(SourceModel::constant(Outcome::REST), EngineConfig::default());
        let mut rx = engine.subscribe(16);

        assert_eq!(engine.state(), EngineState::Idle);
        engine.start().unwrap();
        assert_eq!(engine.state(), EngineState::Running);
        engine.stop();
        assert_eq!(engine.state(), EngineState::Idle);

        let states: Vec<EngineEvent> = std::iter::from_fn(|| rx.pop().ok()).collect();
        assert_eq!(
            states,
            vec![
                EngineEvent::StateChanged(EngineState::Running),
                EngineEvent::StateChanged(EngineState::Draining),
                EngineEvent::StateChanged(EngineState::Idle),
            ]
        );
    }

    #[test]
    fn test_inputs_ignored_when_idle() {
        let (engine, port, time) =
            engine_with(SourceModel::constant(Outcome::note(60, 1)), EngineConfig::default());

        let played = engine.on_tick(tick_at(time.now())).unwrap();
        assert_eq!(played, None);
        engine
            .on_trigger(Trigger::new(DrumKind::Kick, 100, time.now()))
            .unwrap();

        assert!(port.is_empty());
        assert_eq!(engine.tracker().snapshot_at(time.now()).count, 0);
    }

    #[test]
    fn test_tick_plays_and_schedules_release() {
        let config = EngineConfig::default().note_duration_ms(250.0);
        let (engine, port, time) = engine_with(SourceModel::constant(Outcome::note(64, 1)), config);
        engine.start().unwrap();

        let note = engine.on_tick(tick_at(time.now())).unwrap().unwrap();
        assert_eq!((note.channel, note.pitch), (1, 64));
        assert_eq!(port.note_ons().len(), 1);
        assert_eq!(engine.scheduler().pending(), 1);

        time.advance(Duration::from_millis(250));
        engine.scheduler().poke();
        assert!(port.wait_for(2, Duration::from_secs(5)));
        assert_eq!(port.events()[1], note.note_off());
        engine.stop();
    }

    #[test]
    fn test_empty_window_uses_default_velocity() {
        let config = EngineConfig::default().default_velocity(100);
        let (engine, _port, time) = engine_with(SourceModel::constant(Outcome::note(64, 1)), config);
        engine.start().unwrap();

        // Empty window is Sparse/Chill, which pulls velocity back 10%
        let note = engine.on_tick(tick_at(time.now())).unwrap().unwrap();
        assert_eq!(note.velocity, 90);
        engine.stop();
    }

    #[test]
    fn test_every_tick_policy_only_records_triggers() {
        let (engine, port, time) =
            engine_with(SourceModel::constant(Outcome::note(60, 1)), EngineConfig::default());
        engine.start().unwrap();

        let played = engine
            .on_trigger(Trigger::new(DrumKind::Kick, 100, time.now()))
            .unwrap();
        assert_eq!(played, None);
        assert!(port.is_empty());
        assert_eq!(engine.tracker().snapshot_at(time.now()).count, 1);
        engine.stop();
    }

    #[test]
    fn test_kick_immediate_policy() {
        let config = EngineConfig::default().decision_policy(DecisionPolicy::KickImmediate);
        let (engine, port, time) = engine_with(SourceModel::constant(Outcome::note(60, 1)), config);
        engine.start().unwrap();

        engine
            .on_trigger(Trigger::new(DrumKind::Snare, 100, time.now()))
            .unwrap();
        assert!(port.is_empty());

        let played = engine
            .on_trigger(Trigger::new(DrumKind::Kick, 100, time.now()))
            .unwrap();
        assert!(played.is_some());
        assert_eq!(port.note_ons().len(), 1);
        engine.stop();
    }

    #[test]
    fn test_trigger_only_policy_ignores_ticks() {
        let config = EngineConfig::default().decision_policy(DecisionPolicy::TriggerOnly);
        let (engine, port, time) = engine_with(SourceModel::constant(Outcome::note(60, 1)), config);
        engine.start().unwrap();

        assert_eq!(engine.on_tick(tick_at(time.now())).unwrap(), None);
        assert!(port.is_empty());

        engine
            .on_trigger(Trigger::new(DrumKind::Rim, 70, time.now()))
            .unwrap();
        assert_eq!(port.note_ons().len(), 1);
        engine.stop();
    }

    #[test]
    fn test_rest_when_silent() {
        let config = EngineConfig::default().rest_when_silent(true);
        let (engine, port, time) = engine_with(SourceModel::constant(Outcome::note(60, 1)), config);
        engine.start().unwrap();

        assert_eq!(engine.on_tick(tick_at(time.now())).unwrap(), None);
        assert!(port.is_empty());

        engine
            .on_trigger(Trigger::new(DrumKind::Kick, 100, time.now()))
            .unwrap();
        assert!(engine.on_tick(tick_at(time.now())).unwrap().is_some());
        // The trigger was consumed by the previous decision
        assert_eq!(engine.on_tick(tick_at(time.now())).unwrap(), None);
        engine.stop();
    }

    #[test]
    fn test_decision_uses_context_of_window() {
        let busy_high = crate::context::Context::new(Density::Busy, Energy::High);
        let model = SourceModel::constant(Outcome::REST).with(busy_high, vec![(Outcome::note(72, 2), 1.0)]);
        let config = EngineConfig::default().density_thresholds(1, 2).energy_thresholds(40.0, 80.0);
        let (engine, port, time) = engine_with(model, config);
        engine.start().unwrap();

        let now = time.now();
        for _ in 0..3 {
            engine
                .on_trigger(Trigger::new(DrumKind::Snare, 110, now))
                .unwrap();
        }
        let note = engine.on_tick(tick_at(now)).unwrap().unwrap();

        assert_eq!((note.channel, note.pitch), (2, 72));
        // Mean 110 at High energy, scaled by 1.2 and clamped
        assert_eq!(note.velocity, 127);
        assert_eq!(port.note_ons().len(), 1);
        engine.stop();
    }

    #[test]
    fn test_rest_publishes_event() {
        let (engine, port, time) =
            engine_with(SourceModel::constant(Outcome::REST), EngineConfig::default());
        let mut rx = engine.subscribe(16);
        engine.start().unwrap();

        engine.on_tick(tick_at(time.now())).unwrap();
        assert!(port.is_empty());

        let events: Vec<EngineEvent> = std::iter::from_fn(|| rx.pop().ok()).collect();
        assert!(events.contains(&EngineEvent::Rest {
            context: crate::context::Context::LOWEST
        }));
        engine.stop();
    }

    #[test]
    fn test_set_tempo_validation() {
        let (engine, _port, _time) =
            engine_with(SourceModel::constant(Outcome::REST), EngineConfig::default());
        engine.set_tempo(90.0).unwrap();
        assert_eq!(engine.clock().tempo(), 90.0);

        assert!(engine.set_tempo(5000.0).is_err());
        assert_eq!(engine.clock().tempo(), 90.0);
    }

    struct SlowReleasePort(MemoryPort);

    impl OutputPort for SlowReleasePort {
        fn send(&self, event: crate::io::MidiEvent) -> Result<(), TransportError> {
            if !event.is_note_on() {
                thread::sleep(Duration::from_millis(20));
            }
            self.0.send(event)
        }
    }

    #[test]
    fn test_concurrent_stop_waits_for_idle() {
        let table = DecisionTable::build(&SourceModel::constant(Outcome::note(60, 1))).unwrap();
        let port = Arc::new(SlowReleasePort(MemoryPort::new()));
        let time = Arc::new(ManualTime::new());
        let config = EngineConfig::default().note_duration_ms(60_000.0);
        let engine = Arc::new(
            PerformanceEngine::with_time_source(config, Arc::new(table), port.clone(), time.clone())
                .unwrap(),
        );
        engine.start().unwrap();
        for _ in 0..3 {
            engine.on_tick(tick_at(time.now())).unwrap();
        }

        let first = {
            let engine = Arc::clone(&engine);
            thread::spawn(move || engine.stop())
        };
        let deadline = Instant::now() + Duration::from_secs(5);
        while engine.state() == EngineState::Running && Instant::now() < deadline {
            thread::yield_now();
        }

        engine.stop();
        assert_eq!(engine.state(), EngineState::Idle);
        assert_eq!(port.0.note_offs().len(), 3);
        first.join().unwrap();
    }

    #[test]
    fn test_run_clock_drives_ticks() {
        let config = EngineConfig::default().bpm(600.0).note_duration_ms(5.0);
        let table = DecisionTable::build(&SourceModel::constant(Outcome::note(60, 1))).unwrap();
        let port = Arc::new(MemoryPort::new());
        let engine = Arc::new(PerformanceEngine::new(config, Arc::new(table), port.clone()).unwrap());

        engine.run_clock().unwrap();
        assert!(port.wait_for(4, Duration::from_secs(5)));
        engine.stop();

        assert_eq!(engine.state(), EngineState::Idle);
        assert!(!engine.clock().is_running());
        assert_eq!(port.note_ons().len(), port.note_offs().len());
    }
}
