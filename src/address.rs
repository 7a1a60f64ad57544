use crate::constants::*;

/// Bit widths of a two-level virtual address: `| top | second | offset |`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressLayout {
    pub top_bits: u32,
    pub second_bits: u32,
    pub offset_bits: u32,
}

impl AddressLayout {
    pub const fn new(top_bits: u32, second_bits: u32, offset_bits: u32) -> Self {
        AddressLayout {
            top_bits,
            second_bits,
            offset_bits,
        }
    }

    #[inline]
    pub fn top_mask(&self) -> u64 {
        (1 << self.top_bits) - 1
    }

    #[inline]
    pub fn second_mask(&self) -> u64 {
        (1 << self.second_bits) - 1
    }

    #[inline]
    pub fn offset_mask(&self) -> u64 {
        (1 << self.offset_bits) - 1
    }

    #[inline]
    pub fn second_shift(&self) -> u32 {
        self.offset_bits
    }

    #[inline]
    pub fn top_shift(&self) -> u32 {
        self.second_bits + self.offset_bits
    }

    /// Bytes covered by one second-level entry
    #[inline]
    pub fn page_size(&self) -> u64 {
        1 << self.offset_bits
    }

    /// Width of the addresses this layout decomposes without aliasing
    #[inline]
    pub fn address_bits(&self) -> u32 {
        self.top_bits + self.second_bits + self.offset_bits
    }

    /// Distinct pages reachable through the table
    #[inline]
    pub fn addressable_pages(&self) -> u64 {
        1 << (self.top_bits + self.second_bits)
    }

    /// Split a raw address into its table indices and page offset
    pub fn decompose(&self, va: u64) -> VirtualAddress {
        let top = ((va >> self.top_shift()) & self.top_mask()) as usize;
        let second = ((va >> self.second_shift()) & self.second_mask()) as usize;
        let offset = va & self.offset_mask();

        VirtualAddress {
            va,
            top,
            second,
            offset,
        }
    }

    /// PA = (frame << offset_bits) | offset
    #[inline]
    pub fn compose(&self, frame: usize, offset: u64) -> u64 {
        ((frame as u64) << self.offset_bits) | (offset & self.offset_mask())
    }
}

impl Default for AddressLayout {
    fn default() -> Self {
        AddressLayout::new(TOP_BITS, SECOND_BITS, OFFSET_BITS)
    }
}

/// Represents the decomposed components of a virtual address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualAddress {
    pub va: u64,
    pub top: usize,
    pub second: usize,
    pub offset: u64,
}

impl std::fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "VA({:#010x}) = (top={}, second={}, offset={})",
            self.va, self.top, self.second, self.offset
        )
    }
}

/// Run of consecutive virtual pages touched by a `(address, size)` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    pub start: u64,
    pub count: u64,
}

impl PageRange {
    /// Pages from the one holding `address` through `ceil(size / page_size)` pages on.
    ///
    /// A zero size yields an empty range.
    pub fn new(address: u64, size: u64, page_size: u64) -> Self {
        PageRange {
            start: address / page_size,
            count: size.div_ceil(page_size),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Last page in the range, if any
    pub fn end(&self) -> Option<u64> {
        self.count.checked_sub(1).map(|n| self.start + n)
    }

    pub fn pages(&self) -> std::ops::Range<u64> {
        self.start..self.start + self.count
    }
}
