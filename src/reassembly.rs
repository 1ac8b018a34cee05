//! Product reassembly from SBN datagrams.
//!
//! [ReassemblyEngine] decodes each datagram's headers and collects the payloads of
//! consecutive datagrams into a [ProductContainer]. At most one product is in
//! progress at a time. A product is handed off as soon as its last fragment
//! arrives; anything out of order discards it.
use std::fmt::Display;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::product::{Fragment, ProductContainer};
use crate::sbn::{
    product_class, Ccb, Command, FrameHeader, ProductDefinitionHeader, ProductSpecificHeader,
};

/// A discontinuity in the feed-wide frame sequence numbers.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceGap {
    pub last: u32,
    pub current: u32,
    /// Number of datagrams skipped. Zero if the sequence went backwards.
    pub missed: u64,
}

impl Display for SequenceGap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "gap in SBN sequence number {} to {} [skipped {}]",
            self.last, self.current, self.missed
        )
    }
}

/// Tracks the frame level sequence number across the whole feed and counts missed
/// datagrams.
#[derive(Debug, Clone, Default)]
pub struct FeedSequenceTracker {
    last: Option<u32>,
    missed: u64,
}

impl FeedSequenceTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `sequence` and return the gap if it does not directly follow the
    /// previous sequence number.
    ///
    /// The missed count only grows when the sequence moves forward, so a restarted or
    /// reordered feed never decreases it.
    pub fn observe(&mut self, sequence: u32) -> Option<SequenceGap> {
        let last = self.last.replace(sequence)?;
        if sequence == last.wrapping_add(1) {
            return None;
        }
        let missed = if sequence > last {
            u64::from(sequence - last - 1)
        } else {
            0
        };
        self.missed += missed;
        Some(SequenceGap {
            last,
            current: sequence,
            missed,
        })
    }

    /// Total number of datagrams missed so far.
    #[must_use]
    pub fn missed(&self) -> u64 {
        self.missed
    }

    #[must_use]
    pub fn last(&self) -> Option<u32> {
        self.last
    }
}

/// Diagnostic produced while processing a datagram.
#[derive(Debug)]
pub enum Event {
    /// Informational only; the datagram was still processed.
    SequenceGap(SequenceGap),
    /// The datagram, or the product in progress, was dropped, unless the error
    /// [is soft](Error::is_soft).
    Error(Error),
}

impl Event {
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Event::Error(_))
    }
}

/// Result of processing a single datagram.
#[derive(Debug, Default)]
pub struct Outcome {
    /// The product completed by this datagram, if any.
    pub product: Option<ProductContainer>,
    pub events: Vec<Event>,
}

impl Outcome {
    pub fn errors(&self) -> impl Iterator<Item = &Error> {
        self.events.iter().filter_map(|e| match e {
            Event::Error(err) => Some(err),
            Event::SequenceGap(_) => None,
        })
    }
}

/// Running counts kept by a [ReassemblyEngine].
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub datagrams: u64,
    /// Datagrams dropped for any reason
    pub dropped: u64,
    /// Valid datagrams that carry nothing to assemble, e.g., test messages.
    pub ignored: u64,
    pub missed_datagrams: u64,
    pub products_started: u64,
    pub products_completed: u64,
    /// Products lost to ordering violations or overwritten before completion
    pub products_discarded: u64,
    pub ccb_invalid: u64,
}

#[derive(Debug, Default)]
enum State {
    #[default]
    Idle,
    Assembling(ProductContainer),
}

/// Reassembles products from SBN datagrams.
///
/// # Example
/// ```
/// use noaaport::ReassemblyEngine;
///
/// let mut engine = ReassemblyEngine::new();
/// let outcome = engine.process(&[0u8; 16]);
/// assert!(outcome.product.is_none());
/// assert_eq!(engine.stats().dropped, 1);
/// ```
#[derive(Debug, Default)]
pub struct ReassemblyEngine {
    state: State,
    tracker: FeedSequenceTracker,
    stats: EngineStats,
}

impl ReassemblyEngine {
    /// Frame and product definition header version supported
    pub const VERSION: u8 = 1;

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Process a single datagram, returning the product it completes, if any, along
    /// with any diagnostics.
    pub fn process(&mut self, datagram: &[u8]) -> Outcome {
        let mut outcome = Outcome::default();
        self.stats.datagrams += 1;

        match self.assemble(datagram, &mut outcome.events) {
            Ok(product) => outcome.product = product,
            Err(err) => {
                if let Error::FragmentOrderingViolation { .. } = err {
                    warn!("discarding product: {err}");
                } else {
                    debug!("dropping datagram: {err}");
                }
                self.stats.dropped += 1;
                outcome.events.push(Event::Error(err));
            }
        }
        self.stats.missed_datagrams = self.tracker.missed();

        outcome
    }

    #[must_use]
    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    #[must_use]
    pub fn tracker(&self) -> &FeedSequenceTracker {
        &self.tracker
    }

    #[must_use]
    pub fn is_assembling(&self) -> bool {
        matches!(self.state, State::Assembling(_))
    }

    /// Sequence number of the product in progress.
    #[must_use]
    pub fn in_progress(&self) -> Option<u32> {
        match &self.state {
            State::Assembling(product) => Some(product.sequence()),
            State::Idle => None,
        }
    }

    fn assemble(
        &mut self,
        dat: &[u8],
        events: &mut Vec<Event>,
    ) -> Result<Option<ProductContainer>> {
        let frame = FrameHeader::decode(dat)?;
        if let Some(gap) = self.tracker.observe(frame.sequence) {
            info!("{gap}");
            events.push(Event::SequenceGap(gap));
        }
        if frame.version != Self::VERSION {
            return Err(Error::UnsupportedVersion {
                header: "frame",
                version: frame.version,
            });
        }
        if frame.command == Command::Test {
            trace!(sequence = frame.sequence, "test message");
            self.stats.ignored += 1;
            return Ok(None);
        }

        let mut offset = frame.length;
        let pdh = ProductDefinitionHeader::decode(region(dat, offset, ProductDefinitionHeader::LEN)?)?;
        if pdh.version != Self::VERSION {
            return Err(Error::UnsupportedVersion {
                header: "product definition",
                version: pdh.version,
            });
        }
        offset += pdh.length;

        if pdh.transfer_type.is_error() {
            warn!(sequence = pdh.sequence, block = pdh.block_number, "product error flagged");
        }
        if pdh.transfer_type.is_abort() {
            warn!(sequence = pdh.sequence, block = pdh.block_number, "product abort flagged");
        }
        if !pdh.is_leading() && pdh.transfer_type.is_empty() {
            trace!(sequence = pdh.sequence, "empty transfer");
            self.stats.ignored += 1;
            return Ok(None);
        }

        // Leading datagrams carry the product specific header and a CCB at the start of
        // the data block.
        let mut leading: Option<(ProductSpecificHeader, Ccb)> = None;
        let mut ccb_length = 0;
        if pdh.is_leading() {
            if frame.command == Command::TimingSync {
                debug!(sequence = pdh.sequence, "timing block");
                self.stats.ignored += 1;
                return Ok(None);
            }
            let psh = ProductSpecificHeader::decode(region(dat, offset, pdh.specific_header_length)?)?;
            if psh.option_field_length as usize != pdh.specific_header_length {
                return Err(Error::SpecificHeaderMismatch {
                    declared: psh.option_field_length as usize,
                    computed: pdh.specific_header_length,
                });
            }
            offset += pdh.specific_header_length;
            let ccb = Ccb::decode(region(dat, offset, pdh.block_size as usize)?);
            ccb_length = ccb.length;
            leading = Some((psh, ccb));
        } else {
            region(dat, offset, pdh.block_size as usize)?;
            if !self.is_assembling() {
                return Err(Error::OrphanFragment {
                    sequence: pdh.sequence,
                    block: pdh.block_number,
                });
            }
        }

        let compressed = pdh.transfer_type.is_compressed();
        let block_size = pdh.block_size as usize;
        let (start, len) = if pdh.block_number == 0 && compressed {
            let skip = pdh.block_offset as usize;
            let len = block_size
                .checked_sub(skip)
                .ok_or(Error::truncated(offset + skip, offset + block_size))?;
            (offset + skip, len)
        } else {
            (offset + ccb_length, block_size - ccb_length)
        };
        let fragment = Fragment {
            sequence: pdh.sequence,
            index: pdh.block_number,
            data: region(dat, start, len)?.to_vec(),
            compressed,
        };

        if let Some((psh, ccb)) = leading {
            self.start_product(&frame, &pdh, psh, ccb, events);
        }

        let State::Assembling(product) = &mut self.state else {
            return Err(Error::OrphanFragment {
                sequence: pdh.sequence,
                block: pdh.block_number,
            });
        };
        match product.push(fragment).map(|()| product.is_complete()) {
            Err(err) => {
                self.state = State::Idle;
                self.stats.products_discarded += 1;
                Err(err)
            }
            Ok(false) => Ok(None),
            Ok(true) => match std::mem::take(&mut self.state) {
                State::Assembling(product) => {
                    debug!("completed {product}");
                    self.stats.products_completed += 1;
                    Ok(Some(product))
                }
                State::Idle => Ok(None),
            },
        }
    }

    fn start_product(
        &mut self,
        frame: &FrameHeader,
        pdh: &ProductDefinitionHeader,
        psh: ProductSpecificHeader,
        ccb: Ccb,
        events: &mut Vec<Event>,
    ) {
        if let Some(warning) = ccb.invalid() {
            debug!("{warning}");
            self.stats.ccb_invalid += 1;
            events.push(Event::Error(warning));
        }
        if let State::Assembling(old) = std::mem::take(&mut self.state) {
            let err = Error::ProductOverwritten {
                sequence: old.sequence(),
                received: old.fragments().len(),
                declared: old.declared_fragments(),
            };
            warn!("discarding product: {err}");
            self.stats.products_discarded += 1;
            events.push(Event::Error(err));
        }

        let class = product_class(frame, psh.category);
        let product = ProductContainer::new(pdh.sequence, psh, ccb.product_name, class);
        trace!("new product {product}");
        self.stats.products_started += 1;
        self.state = State::Assembling(product);
    }
}

/// `len` bytes of `dat` starting at `start`.
fn region(dat: &[u8], start: usize, len: usize) -> Result<&[u8]> {
    let end = start + len;
    dat.get(start..end)
        .ok_or(Error::truncated(end, dat.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_counts_gap() {
        let mut tracker = FeedSequenceTracker::new();
        assert!(tracker.observe(100).is_none(), "first sequence is never a gap");
        assert!(tracker.observe(101).is_none());

        let gap = tracker.observe(104).unwrap();
        assert_eq!(
            gap,
            SequenceGap {
                last: 101,
                current: 104,
                missed: 2
            }
        );
        assert_eq!(tracker.missed(), 2);
        assert_eq!(tracker.last(), Some(104));
    }

    #[test]
    fn tracker_never_decreases() {
        let mut tracker = FeedSequenceTracker::new();
        tracker.observe(10);
        tracker.observe(20);
        assert_eq!(tracker.missed(), 9);

        let gap = tracker.observe(5).unwrap();
        assert_eq!(gap.missed, 0);
        assert_eq!(tracker.missed(), 9);

        assert!(tracker.observe(6).is_none());
        assert_eq!(tracker.missed(), 9);
    }

    #[test]
    fn tracker_wraps() {
        let mut tracker = FeedSequenceTracker::new();
        tracker.observe(u32::MAX);
        assert!(tracker.observe(0).is_none());
        assert_eq!(tracker.missed(), 0);
    }

    #[test]
    fn region_bounds() {
        let dat = [0u8; 10];
        assert_eq!(region(&dat, 2, 8).unwrap().len(), 8);
        assert!(matches!(
            region(&dat, 2, 9),
            Err(Error::TruncatedPacket {
                needed: 11,
                actual: 10
            })
        ));
    }

    #[test]
    fn process_garbage_is_dropped() {
        let mut engine = ReassemblyEngine::new();
        let outcome = engine.process(&[0x00; 100]);

        assert!(outcome.product.is_none());
        assert!(matches!(
            outcome.errors().next(),
            Some(Error::InvalidSync(0))
        ));
        assert_eq!(engine.stats().datagrams, 1);
        assert_eq!(engine.stats().dropped, 1);
        assert!(!engine.is_assembling());
    }
}
