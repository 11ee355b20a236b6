use thiserror::Error;

use crate::metadata::token::Token;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! out_of_bounds_error {
    () => {
        crate::Error::OutOfBounds
    };
}

/// Failures while turning raw method body bytes into instructions.
///
/// Both variants are local to a single method body. Depending on the
/// [`crate::assembly::DecodeMode`] the decoder either skips the offending byte
/// and continues, or stops decoding that body.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The stream ended inside an instruction.
    ///
    /// Raised when the `0xFE` escape byte is the final byte of the buffer, or when
    /// the operand of the instruction starting at `offset` would extend past the end.
    #[error("Truncated instruction stream at offset 0x{offset:04X}")]
    TruncatedStream {
        /// Offset of the instruction that could not be completed
        offset: usize,
    },

    /// The byte at `offset` does not name an opcode in either table.
    #[error("Unknown opcode {} at offset 0x{offset:04X}", opcode_text(.byte, .extended))]
    UnknownOpcode {
        /// Offset of the unknown opcode
        offset: usize,
        /// The unknown byte (second byte for extended opcodes)
        byte: u8,
        /// `true` if the byte followed the `0xFE` escape
        extended: bool,
    },
}

fn opcode_text(byte: &u8, extended: &bool) -> String {
    if *extended {
        format!("FE {byte:02X}")
    } else {
        format!("{byte:02X}")
    }
}

/// Failures while resolving what an instruction or call site refers to.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    /// A branch or switch target lies outside `[0, body_len)` or overflowed.
    #[error("Branch at 0x{source_offset:04X} targets 0x{target:X}, outside of the method body")]
    TargetOutOfRange {
        /// Offset of the branching instruction
        source_offset: usize,
        /// The computed (invalid) target
        target: i64,
    },

    /// A metadata token could not be mapped to a method.
    #[error("Could not resolve token {token}: {reason}")]
    TokenUnresolvable {
        /// The token that failed to resolve
        token: Token,
        /// Why resolution failed
        reason: String,
    },
}

/// A protected region that does not fit the exception handling model.
///
/// Reported per region; the remaining regions are still mapped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegionError {
    /// The region at `index` of the input list is inconsistent.
    #[error("Malformed protected region #{index}: {reason}")]
    Malformed {
        /// Position of the region in the input list
        index: usize,
        /// What is wrong with it
        reason: String,
    },
}

/// Failures while acquiring a module through the introspection service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// No source in the resolution order knows this module.
    #[error("Module '{locator}' not found")]
    NotFound {
        /// The locator that was requested
        locator: String,
    },

    /// The module was found but could not be loaded.
    #[error("Failed to load module '{locator}': {reason}")]
    Failed {
        /// The locator that was requested
        locator: String,
        /// Underlying failure
        reason: String,
    },
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The four domain families ([`DecodeError`], [`ResolutionError`], [`RegionError`] and
/// [`LoadError`]) are recoverable by design and are usually reported as diagnostics on the
/// analysis result rather than returned. They convert into this type for callers that want a
/// single error type.
///
/// # Examples
///
/// ```rust
/// use cilgraph::{assembly::{decode_stream, DecodeMode}, Error};
///
/// match decode_stream(&[0x20, 0x01], DecodeMode::Strict) {
///     Ok(body) => println!("{} instructions", body.instructions.len()),
///     Err(Error::Decode(e)) => eprintln!("decode failed: {e}"),
///     Err(e) => eprintln!("other error: {e}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The input is damaged and could not be parsed.
    ///
    /// Includes the source location where the malformation was detected.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// Instruction decoding failed.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Branch target or token resolution failed.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// Exception region table is inconsistent.
    #[error(transparent)]
    Region(#[from] RegionError),

    /// A module could not be loaded.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// A module manifest could not be (de)serialized.
    #[error("{0}")]
    ManifestError(#[from] serde_json::Error),
}
