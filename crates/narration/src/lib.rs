//! Spoken summaries of comparison results.

pub mod sequencer;
pub mod speech;

pub use sequencer::{NarrationSequencer, Utterance};
pub use speech::{CommandSpeechSink, SpeechError, SpeechSink};
