use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Product specific header, present only in the leading datagram of a product.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct ProductSpecificHeader {
    pub option_field_number: u8,
    pub option_field_type: u8,
    /// Should equal the product definition header's specific header length.
    pub option_field_length: u16,
    pub version: u8,
    pub flag: u8,
    pub data_length: u16,
    pub bytes_per_record: u16,
    pub product_type: u8,
    pub category: u8,
    pub code: u16,
    /// Total number of fragments in the product. Zero means a single fragment.
    pub fragments: u16,
    pub next_header_offset: u16,
    pub source: u8,
    /// Original sequence number
    pub sequence: u32,
    /// Receive time, seconds since the Unix epoch
    pub receive_time: u32,
    /// Transmit time, seconds since the Unix epoch
    pub transmit_time: u32,
    pub run_id: u16,
    pub original_run_id: u16,
}

impl ProductSpecificHeader {
    pub const LEN: usize = 36;

    /// Decode from the start of `dat`.
    ///
    /// # Errors
    /// [Error::TruncatedPacket] if there are less than [Self::LEN] bytes.
    pub fn decode(dat: &[u8]) -> Result<Self> {
        if dat.len() < Self::LEN {
            return Err(Error::truncated(Self::LEN, dat.len()));
        }
        let be16 = |idx: usize| u16::from_be_bytes([dat[idx], dat[idx + 1]]);
        let be32 =
            |idx: usize| u32::from_be_bytes([dat[idx], dat[idx + 1], dat[idx + 2], dat[idx + 3]]);

        Ok(ProductSpecificHeader {
            option_field_number: dat[0],
            option_field_type: dat[1],
            option_field_length: be16(2),
            version: dat[4],
            flag: dat[5],
            data_length: be16(6),
            bytes_per_record: be16(8),
            product_type: dat[10],
            category: dat[11],
            code: be16(12),
            fragments: be16(14),
            next_header_offset: be16(16),
            source: dat[19],
            sequence: be32(20),
            receive_time: be32(24),
            transmit_time: be32(28),
            run_id: be16(32),
            original_run_id: be16(34),
        })
    }

    #[must_use]
    pub fn received(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(i64::from(self.receive_time), 0).single()
    }

    #[must_use]
    pub fn transmitted(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(i64::from(self.transmit_time), 0).single()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_specific_header() {
        #[rustfmt::skip]
        let dat: &[u8] = &[
            0x01, 0x02,             // option field number, type
            0x00, 0x24,             // option field length 36
            0x01, 0x00,             // version, flag
            0x00, 0x10,             // data length
            0x00, 0x20,             // bytes per record
            0x01, 0x03,             // type, category 3
            0x00, 0x63,             // code 99
            0x00, 0x05,             // 5 fragments
            0x00, 0x00,             // next header offset
            0x00, 0x04,             // reserved, source 4
            0x00, 0x00, 0x30, 0x39, // sequence 12345
            0x5f, 0x5e, 0x10, 0x00, // receive time
            0x5f, 0x5e, 0x10, 0x01, // transmit time
            0x00, 0x0b,             // run id
            0x00, 0x0c,             // original run id
        ];
        let header = ProductSpecificHeader::decode(dat).unwrap();

        assert_eq!(header.option_field_number, 1);
        assert_eq!(header.option_field_type, 2);
        assert_eq!(header.option_field_length, 36);
        assert_eq!(header.version, 1);
        assert_eq!(header.data_length, 16);
        assert_eq!(header.bytes_per_record, 32);
        assert_eq!(header.product_type, 1);
        assert_eq!(header.category, 3);
        assert_eq!(header.code, 99);
        assert_eq!(header.fragments, 5);
        assert_eq!(header.source, 4);
        assert_eq!(header.sequence, 12345);
        assert_eq!(header.receive_time, 0x5f5e_1000);
        assert_eq!(header.run_id, 11);
        assert_eq!(header.original_run_id, 12);

        let received = header.received().unwrap();
        let transmitted = header.transmitted().unwrap();
        assert_eq!(received.timestamp(), 0x5f5e_1000);
        assert_eq!((transmitted - received).num_seconds(), 1);
    }

    #[test]
    fn decode_specific_header_is_err_when_data_too_short() {
        assert!(matches!(
            ProductSpecificHeader::decode(&[0u8; 35]),
            Err(Error::TruncatedPacket { needed: 36, actual: 35 })
        ));
    }
}
