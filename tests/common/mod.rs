#![allow(dead_code)]
//! Synthetic SBN datagrams.

pub const PRODUCT_DATA: u8 = 3;
pub const TIMING_SYNC: u8 = 5;
pub const TEST: u8 = 10;

/// Length of the CCB put in front of leading datagram payloads by [leading].
pub const CCB_LEN: usize = 24;

#[derive(Debug, Clone)]
pub struct Specific {
    pub fragments: u16,
    pub category: u8,
    pub option_field_length: u16,
}

impl Default for Specific {
    fn default() -> Self {
        Specific {
            fragments: 1,
            category: 1,
            option_field_length: 36,
        }
    }
}

/// Field values of a single datagram. [Sbn::build] fills in the lengths and the
/// frame checksum.
#[derive(Debug, Clone)]
pub struct Sbn {
    pub command: u8,
    pub datastream: u8,
    pub frame_version: u8,
    pub frame_sequence: u32,
    pub pdh_version: u8,
    pub transfer_type: u8,
    pub block_number: u16,
    pub block_offset: u16,
    pub sequence: u32,
    pub specific: Option<Specific>,
    pub block: Vec<u8>,
}

impl Default for Sbn {
    fn default() -> Self {
        Sbn {
            command: PRODUCT_DATA,
            datastream: 5,
            frame_version: 1,
            frame_sequence: 1,
            pdh_version: 1,
            transfer_type: 0x02,
            block_number: 0,
            block_offset: 0,
            sequence: 1,
            specific: None,
            block: Vec::new(),
        }
    }
}

impl Sbn {
    pub fn build(&self) -> Vec<u8> {
        let mut dat = vec![0u8; 16];
        dat[0] = 0xff;
        dat[2] = (self.frame_version << 4) | 4;
        dat[4] = self.command;
        dat[5] = self.datastream;
        dat[8..12].copy_from_slice(&self.frame_sequence.to_be_bytes());
        dat[12..14].copy_from_slice(&1u16.to_be_bytes());
        let checksum = dat[..14]
            .iter()
            .fold(0u16, |sum, b| sum.wrapping_add(u16::from(*b)));
        dat[14..16].copy_from_slice(&checksum.to_be_bytes());

        let total: u16 = if self.specific.is_some() { 16 + 36 } else { 16 };
        let mut pdh = vec![0u8; 16];
        pdh[0] = (self.pdh_version << 4) | 4;
        pdh[1] = self.transfer_type;
        pdh[2..4].copy_from_slice(&total.to_be_bytes());
        pdh[4..6].copy_from_slice(&self.block_number.to_be_bytes());
        pdh[6..8].copy_from_slice(&self.block_offset.to_be_bytes());
        pdh[8..10].copy_from_slice(&(self.block.len() as u16).to_be_bytes());
        pdh[10] = 1;
        pdh[11] = 1;
        pdh[12..16].copy_from_slice(&self.sequence.to_be_bytes());
        dat.extend_from_slice(&pdh);

        if let Some(specific) = &self.specific {
            let mut psh = vec![0u8; 36];
            psh[2..4].copy_from_slice(&specific.option_field_length.to_be_bytes());
            psh[4] = 1;
            psh[11] = specific.category;
            psh[14..16].copy_from_slice(&specific.fragments.to_be_bytes());
            psh[20..24].copy_from_slice(&self.sequence.to_be_bytes());
            dat.extend_from_slice(&psh);
        }

        dat.extend_from_slice(&self.block);
        dat
    }
}

/// A valid CCB of `len` bytes, which must be even.
pub fn ccb(len: usize) -> Vec<u8> {
    let words = len / 2;
    let mut dat = vec![0u8; len];
    dat[0] = 0x40 | ((words >> 8) & 0x3f) as u8;
    dat[1] = (words & 0xff) as u8;
    dat
}

/// Leading datagram for product `sequence` whose first fragment is `payload`.
pub fn leading(frame_sequence: u32, sequence: u32, fragments: u16, payload: &[u8]) -> Vec<u8> {
    let mut block = ccb(CCB_LEN);
    block.extend_from_slice(payload);
    Sbn {
        frame_sequence,
        transfer_type: 0x01,
        sequence,
        specific: Some(Specific {
            fragments,
            ..Default::default()
        }),
        block,
        ..Default::default()
    }
    .build()
}

/// Continuation datagram carrying fragment `index` of product `sequence`.
pub fn continuation(frame_sequence: u32, sequence: u32, index: u16, payload: &[u8]) -> Vec<u8> {
    Sbn {
        frame_sequence,
        sequence,
        block_number: index,
        block: payload.to_vec(),
        ..Default::default()
    }
    .build()
}

/// Test message; frame header only.
pub fn test_message(frame_sequence: u32) -> Vec<u8> {
    let mut dat = Sbn {
        command: TEST,
        frame_sequence,
        ..Default::default()
    }
    .build();
    dat.truncate(16);
    dat
}

/// All datagrams of a product with `count` fragments, fragment `i` being `F{i}`.
pub fn product(first_frame: u32, sequence: u32, count: u16) -> Vec<Vec<u8>> {
    (0..count)
        .map(|i| {
            let payload = format!("F{i}");
            if i == 0 {
                leading(first_frame, sequence, count, payload.as_bytes())
            } else {
                continuation(first_frame + u32::from(i), sequence, i, payload.as_bytes())
            }
        })
        .collect()
}
