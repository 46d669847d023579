use thiserror::Error;

/// All error types surfaced by the decode pipeline.
///
/// Variants are grouped by the taxonomy a caller cares about (config,
/// input, resource, decode, I/O) but kept as one enum. Cancellation is
/// deliberately *not* a variant here: it is a distinct, non-error
/// outcome (see [`crate::orchestrator::DecodeOutcome`]).
#[derive(Debug, Error)]
pub enum Error {
    // -- ConfigError --
    /// An unrecognized parameter name was passed to the trigger.
    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),
    /// A parameter's value failed validation.
    #[error("Invalid value for parameter `{name}`: {value}")]
    InvalidParameterValue { name: &'static str, value: String },
    /// `output_path` was not supplied.
    #[error("No output path specified")]
    MissingOutputPath,
    /// `decoder_type` did not name a known kernel.
    #[error("Unknown decoder type: {0}")]
    UnknownDecoderType(String),
    /// `output_format` is not a format this writer supports.
    #[error("Unsupported output format: {0}")]
    UnsupportedOutputFormat(String),
    /// The requested start frame is out of bounds for the source.
    #[error("Start frame {start} is out of bounds, only {available} frames available")]
    StartFrameOutOfBounds { start: u64, available: u64 },

    // -- InputError --
    /// A requested field was absent from the source.
    #[error("Missing field {0}")]
    MissingField(u64),
    /// The source has no video parameters.
    #[error("Source has no video parameters")]
    MissingVideoParameters,
    /// A Y/C-split field was routed to a kernel that requires composite input.
    #[error("Y/C-split input cannot be decoded by a Transform-PAL kernel")]
    YcSplitIntoTransformPal,
    /// A field carried no sample data.
    #[error("Field {0} has empty sample data")]
    EmptyFieldData(u64),

    // -- ResourceError --
    /// FFT plan construction failed.
    #[error("Failed to allocate an FFT plan")]
    FftPlanAllocation,
    /// The output file could not be opened.
    #[error("Failed to open output file: {0}")]
    OutputFileOpen(std::io::Error),
    /// The output backend failed to initialize.
    #[error("Output backend initialization failed: {0}")]
    BackendInit(String),

    // -- DecodeError --
    /// A worker's kernel failed while decoding a specific frame.
    #[error("Decode of frame {frame} failed: {reason}")]
    Decode { frame: usize, reason: String },

    // -- IoError --
    /// A generic I/O failure (backend writes, file reads).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type used throughout this crate.
pub type Result<T> = ::std::result::Result<T, Error>;
