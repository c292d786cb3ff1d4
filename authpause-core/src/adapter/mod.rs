//! Translate tool outcomes into the shapes host frameworks expect.
//!
//! - [`stream`]: a prefixed error string for streaming responses
//! - [`graph`]: a state update plus routing target for graph runtimes
//!
//! The polling resumer for out-of-process graphs lives in
//! [`crate::resumer`].

pub mod graph;
pub mod stream;

pub use graph::{GraphAdapter, GraphCommand, GraphStep, DEFAULT_STATE_KEY};
pub use stream::{parse_stream_error, stream_error_text, GENERIC_ERROR_MESSAGE};
