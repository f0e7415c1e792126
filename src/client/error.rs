use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur during client operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The requested registers lie outside the negotiated read window.
    #[error(
        "request ({first_register:#04x}, {count}) outside of read window ({window_first:#04x}, {window_count})"
    )]
    OutOfRange {
        /// First register of the request.
        first_register: u8,
        /// Number of registers requested.
        count: usize,
        /// First register of the active window.
        window_first: u8,
        /// Register count of the active window.
        window_count: usize,
    },

    /// Operation attempted with zero registers.
    #[error("operation attempted with zero registers")]
    ZeroLength,

    /// More registers than a single bus transaction can carry.
    #[error("{count} registers requested, at most {max} fit in one transaction")]
    TooManyRegisters {
        /// Number of registers requested.
        count: usize,
        /// Transaction capacity.
        max: usize,
    },

    /// The register range runs past register 0xFF.
    #[error("register range ({first_register:#04x}, {count}) runs past 0xff")]
    RegisterOverflow {
        /// First register of the range.
        first_register: u8,
        /// Number of registers in the range.
        count: usize,
    },

    /// The client was disarmed (or never armed) while the caller was blocked.
    #[error("wait cancelled: client is not armed")]
    Cancelled,

    /// The configured wait timeout elapsed.
    #[error("wait timed out")]
    TimedOut,

    /// Internal cache bookkeeping disagrees with itself.
    #[error("cache state inconsistent: {0}")]
    Inconsistent(&'static str),
}

impl ClientError {
    /// Returns true for the two ways a blocking wait can end early.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, ClientError::Cancelled | ClientError::TimedOut)
    }
}
