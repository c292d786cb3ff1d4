//! Tool-call streaming over server-sent events.
//!
//! A request names one tool call. The response streams its progress as
//! [`StreamPart`]s; interrupts arrive on the `error` part with the
//! `AUTH0_AI_INTERRUPTION:` prefix so the client can resume the call.

pub mod handler;
pub mod parts;

pub use parts::StreamPart;
