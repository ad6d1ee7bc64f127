pub mod config; // Engine configuration and builder
pub mod context; // Rolling trigger window and (density, energy) context
pub mod decision; // Baked decision table and models
pub mod engine; // Scheduler and performance engine
pub mod error;
pub mod io; // MIDI events, ports and drum input
pub mod timing; // Tempo clock and bar position

pub use config::{DecisionPolicy, EngineConfig};
pub use engine::{EngineEvent, EngineState, PerformanceEngine};
pub use error::{EngineError, ModelError, TransportError, ValidationError};
