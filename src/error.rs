/// Reasons a datagram, or an in-progress product, is rejected.
///
/// None of these are fatal to a running pipeline. Decode errors drop the offending
/// datagram, ordering errors drop the whole in-progress product, and the soft kinds
/// (see [Error::is_soft]) are reported while decoding carries on.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid frame sync byte {0:#04x}")]
    InvalidSync(u8),

    #[error("frame checksum mismatch; expected={expected} computed={computed}")]
    ChecksumMismatch { expected: u16, computed: u16 },

    #[error("truncated packet; need {needed} bytes, got {actual}")]
    TruncatedPacket { needed: usize, actual: usize },

    #[error("unsupported SBN command {0}")]
    UnsupportedCommand(u8),

    #[error("unsupported NOAAPort channel {0}")]
    UnsupportedChannel(u8),

    #[error("unsupported {header} version {version}")]
    UnsupportedVersion { header: &'static str, version: u8 },

    #[error("product specific header length mismatch; header={declared} computed={computed}")]
    SpecificHeaderMismatch { declared: usize, computed: usize },

    /// The CCB length exceeded the data block. The product name was recovered by
    /// scanning for printable text instead.
    #[error("invalid CCB length {length} for {available} byte block; recovered name {name:?}")]
    CcbInvalid {
        length: usize,
        available: usize,
        name: String,
    },

    #[error("continuation block {block} of product {sequence} with no product in progress")]
    OrphanFragment { sequence: u32, block: u16 },

    #[error("fragment out of order; got product {sequence} block {block}, expected product {expected_sequence} block {expected_block}")]
    FragmentOrderingViolation {
        sequence: u32,
        block: u16,
        expected_sequence: u32,
        expected_block: u16,
    },

    /// A new product started before the previous one completed.
    #[error("product {sequence} overwritten after {received} of {declared} fragments")]
    ProductOverwritten {
        sequence: u32,
        received: usize,
        declared: u16,
    },

    #[error("inflate failed: {0}")]
    Inflate(String),

    #[error("{0} thread panicked")]
    ThreadPanic(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True when processing continued past this error, i.e., it is a warning rather
    /// than the reason something was dropped.
    #[must_use]
    pub fn is_soft(&self) -> bool {
        matches!(self, Error::CcbInvalid { .. } | Error::ProductOverwritten { .. })
    }

    pub(crate) fn truncated(needed: usize, actual: usize) -> Self {
        Error::TruncatedPacket { needed, actual }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
