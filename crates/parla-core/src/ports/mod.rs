//! Port traits — the seams between the streaming core and its collaborators.
//!
//! Audio device access, file formats, and UI delivery all live on the far
//! side of these traits. The core only ever sees 48 kHz PCM16LE mono bytes
//! coming out of an [`AudioSource`] and going into an [`AudioSink`], plus a
//! callback for transcription events.

pub mod audio;
pub mod events;

pub use audio::{AudioSink, AudioSource};
pub use events::{TranscriptionEvent, TranscriptionHandler};
