//! Output conversion and delivery: pixel-format writing, padding, Y4M
//! framing, and the backend abstraction that persists frames.

pub mod backend;
pub mod writer;

pub use backend::{CodecBackend, OutputBackend, RawFileBackend};
pub use writer::{OutputConfig, OutputWriter};
