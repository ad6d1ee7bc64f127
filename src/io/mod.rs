// Purpose - external interfaces, MIDI encoding

pub mod input;
pub mod midi;
#[cfg(feature = "midir")]
pub mod midir_port;
pub mod port;

pub use input::{DrumMap, InputEvent};
pub use midi::{MidiEvent, Note};
pub use port::{LogPort, MemoryPort, OutputPort, SentEvent};
