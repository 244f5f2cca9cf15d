//! Emission of fully built HTTP responses into the hosting server environment.
//!
//! A [`ResponseEmitter`] (or the buffered [`StreamEmitter`]) turns a single
//! [`OutgoingResponse`] into calls against a [`HostEnvironment`]: header lines
//! first, the status line last, then the body. An [`EmitterChain`] composes
//! several emitters and stops at the first one that reports it handled the
//! response.

pub mod chain;
pub mod config;
pub mod emitter;
pub mod host;
pub mod message;
pub mod stream;

mod errors;

pub use chain::*;
pub use config::*;
pub use emitter::*;
pub use errors::*;
pub use host::*;
pub use message::*;
pub use stream::*;
