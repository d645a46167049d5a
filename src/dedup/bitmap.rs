//! Sparse bitset over the full IPv4 address space.
//!
//! 2^32 bits split into 2^16 pages of 2^16 bits (8 KiB each). A page is
//! allocated the first time an address inside it is set; lookups never
//! allocate.

use std::net::Ipv4Addr;

const PAGE_BITS: usize = 1 << 16;
const PAGE_WORDS: usize = PAGE_BITS / 64;
const PAGE_COUNT: usize = 1 << 16;

/// Lazily paged bitmap keyed by IPv4 address.
pub struct PagedBitmap {
    pages: Vec<Option<Box<[u64]>>>,
    allocated: usize,
}

impl PagedBitmap {
    pub fn new() -> Self {
        let mut pages = Vec::with_capacity(PAGE_COUNT);
        pages.resize_with(PAGE_COUNT, || None);
        Self {
            pages,
            allocated: 0,
        }
    }

    fn locate(addr: Ipv4Addr) -> (usize, usize, u64) {
        let v = u32::from(addr) as usize;
        let page = v >> 16;
        let bit = v & (PAGE_BITS - 1);
        (page, bit / 64, 1u64 << (bit % 64))
    }

    /// Whether `addr` has been set.
    pub fn check(&self, addr: Ipv4Addr) -> bool {
        let (page, word, mask) = Self::locate(addr);
        match &self.pages[page] {
            Some(words) => words[word] & mask != 0,
            None => false,
        }
    }

    /// Set the bit for `addr`, materialising its page if needed.
    pub fn set(&mut self, addr: Ipv4Addr) {
        let (page, word, mask) = Self::locate(addr);
        let slot = &mut self.pages[page];
        if slot.is_none() {
            *slot = Some(vec![0u64; PAGE_WORDS].into_boxed_slice());
            self.allocated += 1;
        }
        if let Some(words) = slot {
            words[word] |= mask;
        }
    }

    /// Number of pages currently materialised.
    pub fn allocated_pages(&self) -> usize {
        self.allocated
    }
}

impl Default for PagedBitmap {
    fn default() -> Self {
        Self::new()
    }
}
