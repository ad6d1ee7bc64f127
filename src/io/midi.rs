/// A note as the engine thinks about it
/// Channels are 1-based (1-16) everywhere outside the wire encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Note {
    pub channel: u8,
    pub pitch: u8,
    pub velocity: u8,
}

impl Note {
    pub fn new(channel: u8, pitch: u8, velocity: u8) -> Self {
        Self {
            channel,
            pitch,
            velocity,
        }
    }

    pub fn note_on(&self) -> MidiEvent {
        MidiEvent::NoteOn {
            channel: self.channel,
            pitch: self.pitch,
            velocity: self.velocity,
        }
    }

    pub fn note_off(&self) -> MidiEvent {
        MidiEvent::NoteOff {
            channel: self.channel,
            pitch: self.pitch,
        }
    }
}

/// Events crossing the output boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MidiEvent {
    NoteOn { channel: u8, pitch: u8, velocity: u8 },
    NoteOff { channel: u8, pitch: u8 },
}

const NOTE_OFF_STATUS: u8 = 0x80;
const NOTE_ON_STATUS: u8 = 0x90;

impl MidiEvent {
    pub fn channel(&self) -> u8 {
        match *self {
            MidiEvent::NoteOn { channel, .. } | MidiEvent::NoteOff { channel, .. } => channel,
        }
    }

    pub fn pitch(&self) -> u8 {
        match *self {
            MidiEvent::NoteOn { pitch, .. } | MidiEvent::NoteOff { pitch, .. } => pitch,
        }
    }

    pub fn is_note_on(&self) -> bool {
        matches!(self, MidiEvent::NoteOn { .. })
    }

    /// Encode as a 3-byte channel voice message
    pub fn to_bytes(&self) -> [u8; 3] {
        match *self {
            MidiEvent::NoteOn {
                channel,
                pitch,
                velocity,
            } => [
                NOTE_ON_STATUS | wire_channel(channel),
                pitch & 0x7F,
                velocity & 0x7F,
            ],
            MidiEvent::NoteOff { channel, pitch } => {
                [NOTE_OFF_STATUS | wire_channel(channel), pitch & 0x7F, 0]
            }
        }
    }

    /// Decode a note message; anything else is ignored
    /// Note-on with velocity 0 is a note-off, per the MIDI running-status convention
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        let (&status, rest) = data.split_first()?;
        let channel = (status & 0x0F) + 1;

        match (status & 0xF0, rest) {
            (NOTE_ON_STATUS, [pitch, 0, ..]) | (NOTE_OFF_STATUS, [pitch, _, ..]) => {
                Some(MidiEvent::NoteOff {
                    channel,
                    pitch: *pitch,
                })
            }
            (NOTE_ON_STATUS, [pitch, velocity, ..]) => Some(MidiEvent::NoteOn {
                channel,
                pitch: *pitch,
                velocity: *velocity,
            }),
            _ => None,
        }
    }
}

fn wire_channel(channel: u8) -> u8 {
    channel.saturating_sub(1) & 0x0F
}
