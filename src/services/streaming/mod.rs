//! Streaming support for model responses
//!
//! Consumes chunked HTTP bodies from either `data: {...}` event streams or
//! newline-delimited JSON streams, extracts text deltas as they arrive and
//! reassembles the full reply.
//!
//! The pieces, leaf to root:
//! - [`ChunkBuffer`] turns arbitrary reads into complete lines
//! - [`EventLineParser`] classifies each line into a [`StreamEvent`]
//! - [`extract_delta`] finds the text inside a decoded event
//! - [`StreamSession`] drives one request and owns its state

pub mod chunk_buffer;
pub mod delta;
pub mod event_parser;
pub mod profile;
pub mod session;

pub use chunk_buffer::ChunkBuffer;
pub use delta::extract_delta;
pub use event_parser::{EventLineParser, StreamEvent};
pub use profile::{PathSegment, ProviderKind, ProviderProfile};
pub use session::{CompletionCallback, DeltaCallback, SessionState, StreamSession};
