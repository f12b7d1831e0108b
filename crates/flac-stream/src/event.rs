use flac_stream_types::{EventKind, Format, Tags};

/// Event delivered to a session's consumer callback, in production order.
///
/// A `Format` always precedes the `Data` it describes; `End` is always last.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Format(Format),
    Metadata(Tags),
    /// Interleaved little-endian PCM for one decoded frame.
    Data(Vec<u8>),
    /// The decoder consumed all fed input and waits for more.
    Done,
    End,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Format(_) => EventKind::Format,
            Event::Metadata(_) => EventKind::Metadata,
            Event::Data(_) => EventKind::Data,
            Event::Done => EventKind::Done,
            Event::End => EventKind::End,
        }
    }
}
