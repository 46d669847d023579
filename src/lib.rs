//! Composite-video chroma decoder pipeline for digitized PAL/NTSC TBC
//! field streams.
//!
//! Reconstructs interlaced progressive component-video frames (Y, U, V
//! planes in IRE doubles) from a chronologically-ordered sequence of
//! single-field 16-bit sample buffers, via one of several interchangeable
//! decoder kernels (mono, PAL 2-D, Transform PAL 2-D/3-D, NTSC comb
//! 1-D/2-D/3-D). Output can be converted to RGB48, YUV444P16 or GRAY16
//! and optionally wrapped in a Y4M stream. A sibling EIA-608 closed
//! caption decoder is also provided.

pub mod decoders;
pub mod eia608;
pub mod error;
pub mod field;
pub mod fft;
pub mod fir;
pub mod frame;
pub mod orchestrator;
pub mod output;
pub mod params;

pub use error::{Error, Result};
pub use field::{FieldDescriptor, SourceField, VideoFieldRepresentation};
pub use frame::ComponentFrame;
pub use params::{DecoderType, OutputFormat, TriggerConfig, VideoParameters, VideoSystem};
