use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Product definition header transfer type bit flags.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransferType(pub u8);

impl TransferType {
    pub const START: u8 = 0x01;
    pub const IN_PROGRESS: u8 = 0x02;
    /// No more fragments follow
    pub const END: u8 = 0x04;
    pub const ERROR: u8 = 0x08;
    pub const COMPRESSED: u8 = 0x10;
    pub const ABORT: u8 = 0x20;
    pub const OPTIONS: u8 = 0x40;

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub fn is_start(&self) -> bool {
        self.0 & Self::START != 0
    }

    #[must_use]
    pub fn is_end(&self) -> bool {
        self.0 & Self::END != 0
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.0 & Self::ERROR != 0
    }

    #[must_use]
    pub fn is_compressed(&self) -> bool {
        self.0 & Self::COMPRESSED != 0
    }

    #[must_use]
    pub fn is_abort(&self) -> bool {
        self.0 & Self::ABORT != 0
    }
}

/// Product definition header. Follows the frame header in every datagram.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProductDefinitionHeader {
    pub version: u8,
    /// Header length in bytes
    pub length: usize,
    pub transfer_type: TransferType,
    /// Length of the product specific header that follows this header. Only non-zero
    /// for the leading datagram of a product.
    pub specific_header_length: usize,
    /// Fragment index within the product
    pub block_number: u16,
    pub block_offset: u16,
    /// Number of data block bytes in this datagram
    pub block_size: u16,
    pub records_per_block: u8,
    pub blocks_per_record: u8,
    /// Product sequence number
    pub sequence: u32,
}

impl ProductDefinitionHeader {
    pub const LEN: usize = 16;

    /// Decode from the start of `dat`.
    ///
    /// # Errors
    /// [Error::TruncatedPacket] if there are not enough bytes, or
    /// [Error::SpecificHeaderMismatch] if the total header length field is smaller
    /// than this header's own length.
    pub fn decode(dat: &[u8]) -> Result<Self> {
        if dat.len() < Self::LEN {
            return Err(Error::truncated(Self::LEN, dat.len()));
        }
        let length = (dat[0] & 0xf) as usize * 4;
        let total = u16::from_be_bytes([dat[2], dat[3]]) as usize;
        let specific_header_length =
            total
                .checked_sub(length)
                .ok_or(Error::SpecificHeaderMismatch {
                    declared: total,
                    computed: length,
                })?;

        Ok(ProductDefinitionHeader {
            version: dat[0] >> 4,
            length,
            transfer_type: TransferType(dat[1]),
            specific_header_length,
            block_number: u16::from_be_bytes([dat[4], dat[5]]),
            block_offset: u16::from_be_bytes([dat[6], dat[7]]),
            block_size: u16::from_be_bytes([dat[8], dat[9]]),
            records_per_block: dat[10],
            blocks_per_record: dat[11],
            sequence: u32::from_be_bytes([dat[12], dat[13], dat[14], dat[15]]),
        })
    }

    /// True if this is the leading datagram of a product.
    #[must_use]
    pub fn is_leading(&self) -> bool {
        self.specific_header_length != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_leading_header() {
        #[rustfmt::skip]
        let dat: &[u8] = &[
            0x14,       // version 1, length 16
            0x11,       // start | compressed
            0x00, 0x34, // 52 total, so 36 bytes of specific header
            0x00, 0x00, // block 0
            0x00, 0x0a, // block offset 10
            0x0f, 0xa0, // block size 4000
            0x01,       // records per block
            0x02,       // blocks per record
            0x00, 0x00, 0x00, 0x2a, // sequence 42
        ];
        let header = ProductDefinitionHeader::decode(dat).unwrap();

        assert_eq!(header.version, 1);
        assert_eq!(header.length, 16);
        assert!(header.transfer_type.is_start());
        assert!(header.transfer_type.is_compressed());
        assert!(!header.transfer_type.is_end());
        assert_eq!(header.specific_header_length, 36);
        assert!(header.is_leading());
        assert_eq!(header.block_number, 0);
        assert_eq!(header.block_offset, 10);
        assert_eq!(header.block_size, 4000);
        assert_eq!(header.records_per_block, 1);
        assert_eq!(header.blocks_per_record, 2);
        assert_eq!(header.sequence, 42);
    }

    #[test]
    fn decode_continuation_header() {
        #[rustfmt::skip]
        let dat: &[u8] = &[
            0x14, 0x06, 0x00, 0x10,
            0x00, 0x03, 0x00, 0x00,
            0x00, 0x02, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x2a,
        ];
        let header = ProductDefinitionHeader::decode(dat).unwrap();

        assert_eq!(header.specific_header_length, 0);
        assert!(!header.is_leading());
        assert!(header.transfer_type.is_end());
        assert_eq!(header.block_number, 3);
        assert_eq!(header.block_size, 2);
    }

    #[test]
    fn decode_header_total_length_too_small() {
        let dat: &[u8] = &[0x14, 0x02, 0x00, 0x08, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        assert!(matches!(
            ProductDefinitionHeader::decode(dat),
            Err(Error::SpecificHeaderMismatch { declared: 8, computed: 16 })
        ));
    }

    #[test]
    fn decode_header_is_err_when_data_too_short() {
        assert!(matches!(
            ProductDefinitionHeader::decode(&[0x14; 10]),
            Err(Error::TruncatedPacket { needed: 16, actual: 10 })
        ));
    }
}
