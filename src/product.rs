use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::sbn::{BroadcastClass, ProductSpecificHeader};

/// One datagram's payload contribution to a product.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// Product sequence number
    pub sequence: u32,
    /// Fragment index within the product, starting at 0
    pub index: u16,
    pub data: Vec<u8>,
    /// Data is zlib compressed
    pub compressed: bool,
}

/// The fragments of a single product, in order.
///
/// A container only accepts fragments for its own product sequence number, and
/// fragment indexes must start at 0 and increase by exactly 1 with each fragment.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ProductContainer {
    sequence: u32,
    declared_fragments: u16,
    fragments: Vec<Fragment>,
    name: String,
    class: BroadcastClass,
    header: ProductSpecificHeader,
}

impl Display for ProductContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Product{{sequence={}, name={:?}, fragments={}/{}, class={:?}}}",
            self.sequence,
            self.name,
            self.fragments.len(),
            self.declared_fragments,
            self.class,
        )
    }
}

impl ProductContainer {
    /// Create an empty container for the product with sequence number `sequence`
    /// described by `header`.
    #[must_use]
    pub fn new(
        sequence: u32,
        header: ProductSpecificHeader,
        name: String,
        class: BroadcastClass,
    ) -> Self {
        ProductContainer {
            sequence,
            declared_fragments: header.fragments,
            fragments: Vec::with_capacity(header.fragments.max(1) as usize),
            name,
            class,
            header,
        }
    }

    /// Add the next fragment.
    ///
    /// # Errors
    /// [Error::FragmentOrderingViolation] if `fragment` belongs to another product or
    /// its index does not immediately follow the last fragment's index. The container
    /// is left unchanged.
    pub fn push(&mut self, fragment: Fragment) -> Result<()> {
        let expected_block = self.next_index();
        if fragment.sequence != self.sequence || Some(fragment.index) != expected_block {
            return Err(Error::FragmentOrderingViolation {
                sequence: fragment.sequence,
                block: fragment.index,
                expected_sequence: self.sequence,
                expected_block: expected_block.unwrap_or(u16::MAX),
            });
        }
        self.fragments.push(fragment);
        Ok(())
    }

    /// Index the next fragment must have, or `None` if no more can be added.
    #[must_use]
    pub fn next_index(&self) -> Option<u16> {
        match self.fragments.last() {
            Some(last) => last.index.checked_add(1),
            None => Some(0),
        }
    }

    /// A product is complete when it declares no fragment count (single fragment) or
    /// the last fragment received is the last declared.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        match self.fragments.last() {
            Some(last) => {
                self.declared_fragments == 0
                    || u32::from(last.index) + 1 == u32::from(self.declared_fragments)
            }
            None => false,
        }
    }

    #[must_use]
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Number of fragments declared by the product specific header. Zero for a
    /// single-fragment product.
    #[must_use]
    pub fn declared_fragments(&self) -> u16 {
        self.declared_fragments
    }

    /// Fragments received so far, in order.
    #[must_use]
    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    #[must_use]
    pub fn into_fragments(self) -> Vec<Fragment> {
        self.fragments
    }

    /// WMO heading or recovered product name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn class(&self) -> BroadcastClass {
        self.class
    }

    #[must_use]
    pub fn header(&self) -> &ProductSpecificHeader {
        &self.header
    }

    /// True if any fragment is compressed.
    #[must_use]
    pub fn is_compressed(&self) -> bool {
        self.fragments.iter().any(|f| f.compressed)
    }

    /// Total payload bytes received, before any decompression.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fragments.iter().map(|f| f.data.len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}
