use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// SBN command carried in the frame header.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Product format data transfer
    ProductData,
    /// Synchronize timing
    TimingSync,
    /// Test message
    Test,
}

impl Command {
    /// Map a raw command code, or `None` if the code is not supported.
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            3 => Some(Command::ProductData),
            5 => Some(Command::TimingSync),
            10 => Some(Command::Test),
            _ => None,
        }
    }

    #[must_use]
    pub fn code(&self) -> u8 {
        match self {
            Command::ProductData => 3,
            Command::TimingSync => 5,
            Command::Test => 10,
        }
    }
}

/// The two broadcast classes a datastream belongs to.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastClass {
    /// NWSTG text and bulk data; datastreams 5, 6 and 7.
    Text,
    /// GOES imagery; datastreams 1, 2 and 4.
    Imagery,
}

impl BroadcastClass {
    /// Classify a datastream (channel) id, or `None` for an unknown channel.
    #[must_use]
    pub fn from_datastream(datastream: u8) -> Option<Self> {
        match datastream {
            5..=7 => Some(BroadcastClass::Text),
            1 | 2 | 4 => Some(BroadcastClass::Imagery),
            _ => None,
        }
    }
}

/// SBN frame level header, the first header of every datagram.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: u8,
    /// Header length in bytes
    pub length: usize,
    pub datastream: u8,
    pub class: BroadcastClass,
    pub command: Command,
    /// Feed-wide sequence number, increasing by one per datagram
    pub sequence: u32,
    pub run: u16,
    pub checksum: u16,
}

impl FrameHeader {
    /// Minimum number of bytes required to decode
    pub const LEN: usize = 16;
    /// Value of the first byte of every frame
    pub const SYNC: u8 = 0xff;

    /// Decode and validate a frame header from the start of `dat`.
    ///
    /// Validation happens in order: length, sync byte, checksum, command, and finally
    /// datastream.
    ///
    /// # Errors
    /// [Error::TruncatedPacket], [Error::InvalidSync], [Error::ChecksumMismatch],
    /// [Error::UnsupportedCommand] or [Error::UnsupportedChannel].
    pub fn decode(dat: &[u8]) -> Result<Self> {
        if dat.len() < Self::LEN {
            return Err(Error::truncated(Self::LEN, dat.len()));
        }
        if dat[0] != Self::SYNC {
            return Err(Error::InvalidSync(dat[0]));
        }

        let expected = u16::from_be_bytes([dat[14], dat[15]]);
        let computed = checksum(&dat[..14]);
        if computed != expected {
            return Err(Error::ChecksumMismatch { expected, computed });
        }

        let command = Command::from_code(dat[4]).ok_or(Error::UnsupportedCommand(dat[4]))?;
        let class = BroadcastClass::from_datastream(dat[5]).ok_or(Error::UnsupportedChannel(dat[5]))?;

        Ok(FrameHeader {
            version: dat[2] >> 4,
            length: (dat[2] & 0xf) as usize * 4,
            datastream: dat[5],
            class,
            command,
            sequence: u32::from_be_bytes([dat[8], dat[9], dat[10], dat[11]]),
            run: u16::from_be_bytes([dat[12], dat[13]]),
            checksum: computed,
        })
    }
}

/// Unsigned byte sum, as used by the frame header checksum.
#[must_use]
pub fn checksum(dat: &[u8]) -> u16 {
    dat.iter().fold(0u16, |sum, b| sum.wrapping_add(u16::from(*b)))
}
