//! Communications Control Block (CCB) decoding and product name recovery.
//!
//! The CCB leads the data block of a product's first datagram. Its first two bytes
//! give its own length as a 14-bit count of 16-bit words. A text product normally
//! has its WMO heading immediately after the CCB, which is used as the product name.
//! When the heading is missing, or the CCB length is bogus, the name falls back to
//! the longest run of printable bytes found at the expected location.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Product name used when no printable text could be found.
pub const UNIDENTIFIABLE_PRODUCT: &str = "Unidentifiable product";
/// Maximum number of bytes scanned when recovering a product name.
pub const MAX_NAME_SCAN: usize = 256;
/// Length of a WMO heading, e.g., `SXUS70 KWBC 161200`.
pub const WMO_HEADING_LEN: usize = 18;

/// Structured CCB fields, only available for a CCB with a valid length.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CcbFields {
    pub mode: u8,
    pub submode: u8,
    pub user1: u8,
    // TODO: user2 mirrors user1 until a feed capture shows where the second user byte lives
    pub user2: u8,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Ccb {
    /// CCB length in bytes. Forced to zero when the length field is invalid.
    pub length: usize,
    /// Length decoded from the length field, before validation.
    pub declared_length: usize,
    /// Number of data block bytes available to the CCB.
    pub available: usize,
    pub fields: Option<CcbFields>,
    pub product_name: String,
}

impl Ccb {
    /// Decode the CCB from the start of a leading datagram's data block.
    ///
    /// Never fails. A CCB whose length exceeds `block` is treated as malformed: its
    /// length becomes zero and the product name is recovered by scanning from the
    /// start of the block. Use [Ccb::invalid] to get the associated warning.
    #[must_use]
    pub fn decode(block: &[u8]) -> Self {
        let declared_length = if block.len() < 2 {
            usize::MAX
        } else {
            2 * (u16::from_be_bytes([block[0] & 0x3f, block[1]]) as usize)
        };

        if declared_length > block.len() {
            return Ccb {
                length: 0,
                declared_length: if block.len() < 2 { 0 } else { declared_length },
                available: block.len(),
                fields: None,
                product_name: scan_product_name(block),
            };
        }

        let byte = |idx: usize| block.get(idx).copied().unwrap_or_default();
        let user1 = byte(12);
        let fields = CcbFields {
            mode: byte(10),
            submode: byte(11),
            user1,
            user2: user1,
        };

        let trailer = &block[declared_length..];
        let product_name = match trailer.get(..WMO_HEADING_LEN) {
            Some(heading) if is_wmo_heading(heading) => ascii_string(heading),
            _ => scan_product_name(trailer),
        };

        Ccb {
            length: declared_length,
            declared_length,
            available: block.len(),
            fields: Some(fields),
            product_name,
        }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.fields.is_some()
    }

    /// The soft [Error::CcbInvalid] warning if the CCB length was invalid.
    #[must_use]
    pub fn invalid(&self) -> Option<Error> {
        if self.is_valid() {
            return None;
        }
        Some(Error::CcbInvalid {
            length: self.declared_length,
            available: self.available,
            name: self.product_name.clone(),
        })
    }
}

/// True for bytes the name scan accepts, i.e., anything from space through DEL.
#[must_use]
pub fn is_printable(b: u8) -> bool {
    (32..=127).contains(&b)
}

/// Collect the run of printable bytes at the start of `dat`, up to
/// [MAX_NAME_SCAN] bytes, or [UNIDENTIFIABLE_PRODUCT] if there are none.
#[must_use]
pub fn scan_product_name(dat: &[u8]) -> String {
    let len = dat
        .iter()
        .take(MAX_NAME_SCAN)
        .take_while(|b| is_printable(**b))
        .count();
    if len == 0 {
        UNIDENTIFIABLE_PRODUCT.to_string()
    } else {
        ascii_string(&dat[..len])
    }
}

/// Match the fixed WMO heading grammar: four letters, two digits, space, four letters,
/// space, six digits.
#[must_use]
pub fn is_wmo_heading(dat: &[u8]) -> bool {
    if dat.len() < WMO_HEADING_LEN {
        return false;
    }
    let letters = |r: std::ops::Range<usize>| dat[r].iter().all(u8::is_ascii_alphabetic);
    let digits = |r: std::ops::Range<usize>| dat[r].iter().all(u8::is_ascii_digit);

    letters(0..4) && digits(4..6) && dat[6] == b' ' && letters(7..11) && dat[11] == b' ' && digits(12..18)
}

fn ascii_string(dat: &[u8]) -> String {
    dat.iter().map(|b| char::from(*b)).collect()
}
