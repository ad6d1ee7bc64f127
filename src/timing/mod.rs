// Purpose: tempo, bar/beat position and the tick stream that drives decisions

pub mod clock;
pub mod signature;

pub use clock::{Clock, Tick, TickSchedule, Ticks, MAX_BPM, MIN_BPM};
pub use signature::TimeSignature;
