//! SBN (Satellite Broadcast Network) datagram header decoding.
//!
//! Every datagram starts with a [FrameHeader] followed by a [ProductDefinitionHeader].
//! The leading datagram of a product additionally carries a [ProductSpecificHeader],
//! and its data block starts with a [Ccb]. All multi-byte fields are big-endian.
mod ccb;
mod definition;
mod frame;
mod specific;

pub use ccb::*;
pub use definition::*;
pub use frame::*;
pub use specific::*;

/// Maximum size of a single SBN datagram.
pub const MAX_DATAGRAM_LEN: usize = 10_000;
/// Smallest datagram that can hold all three headers.
pub const MIN_DATAGRAM_LEN: usize = 80;

/// Classify a product by its frame datastream and product category.
///
/// Datastream 4 also carries non-imagery products; anything there with a category
/// other than 3 (imagery) is text.
#[must_use]
pub fn product_class(frame: &FrameHeader, category: u8) -> BroadcastClass {
    if frame.datastream == 4 && category != 3 {
        BroadcastClass::Text
    } else {
        frame.class
    }
}
