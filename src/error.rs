//! # Error Types
//!
//! All fallible operations in `etude` return [`EtudeError`].
//!
//! ## Error Classes
//! - `InputFormat` - the notation bytes could not be parsed
//! - `InvalidMeasureRange` - a requested excerpt range is out of bounds
//! - `Config` - the YAML configuration is malformed or out of range
//! - `MatrixTooWide` - a line would need more time steps than the configured cap
//! - `Storage` / `ServiceUnavailable` - the score library or slice host failed
//! - `Io` - filesystem errors from the CLI and the directory library
//!
//! A transform that produces no usable variant is *not* an error; see
//! [`crate::transform::Rejection`].
//!
//! ## Usage
//! ```rust
//! use etude::EtudeError;
//!
//! let err = EtudeError::InvalidMeasureRange("Start measure cannot be greater than end measure".into());
//! assert_eq!(
//!     err.to_string(),
//!     "Invalid measure range: Start measure cannot be greater than end measure"
//! );
//! ```

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtudeError {
    /// Malformed or unsupported notation input.
    ///
    /// ```
    /// # use etude::EtudeError;
    /// let err = EtudeError::InputFormat("missing <part-list>".to_string());
    /// assert_eq!(err.to_string(), "Invalid notation input: missing <part-list>");
    /// ```
    #[error("Invalid notation input: {0}")]
    InputFormat(String),

    #[error("Invalid measure range: {0}")]
    InvalidMeasureRange(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A line's quantized width exceeds the configured cap.
    #[error("Matrix too wide: {width} time steps (maximum {max})")]
    MatrixTooWide { width: usize, max: usize },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
