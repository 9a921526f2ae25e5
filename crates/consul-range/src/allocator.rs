//! IPv4 range allocation.
//!
//! The lease manager only talks to the [`AddressAllocator`] trait; the
//! [`BitmapAllocator`] keeps one bit per address of an inclusive range.
//! Addresses are never released.

use std::fmt;
use std::net::Ipv4Addr;
use thiserror::Error;

const WORD_BITS: u64 = 64;

/// Errors returned by an [`AddressAllocator`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocatorError {
    /// The range bounds are inverted or empty
    #[error("invalid range {start} - {end}: start must be lower than end")]
    InvalidRange {
        /// First address of the range
        start: Ipv4Addr,
        /// Last address of the range
        end: Ipv4Addr,
    },

    /// Every address in the range is taken
    #[error("no free address left in range")]
    Exhausted,

    /// The requested address lies outside the range
    #[error("address {0} is outside the allocator range")]
    OutOfRange(Ipv4Addr),

    /// The requested address is already taken
    #[error("address {0} is already allocated")]
    Unavailable(Ipv4Addr),
}

/// Tracks which addresses of a fixed range are taken.
pub trait AddressAllocator: Send + fmt::Debug {
    /// Take any free address.
    fn allocate_any(&mut self) -> Result<Ipv4Addr, AllocatorError>;

    /// Take exactly `address`, failing if it is outside the range or already taken.
    fn allocate_exact(&mut self, address: Ipv4Addr) -> Result<Ipv4Addr, AllocatorError>;

    /// Number of addresses in the range.
    fn capacity(&self) -> u64;

    /// Number of addresses currently taken.
    fn allocated(&self) -> u64;
}

/// Bitmap allocator over `[start, end]`.
///
/// `allocate_any` always returns the lowest free address, so allocation
/// order is deterministic for a given history.
pub struct BitmapAllocator {
    start: u32,
    end: u32,
    words: Vec<u64>,
    allocated: u64,
    // Every word before this index is full
    first_open_word: usize,
}

impl BitmapAllocator {
    /// Create an allocator for the inclusive range `[start, end]`.
    pub fn new(start: Ipv4Addr, end: Ipv4Addr) -> Result<Self, AllocatorError> {
        let (first, last) = (u32::from(start), u32::from(end));
        if first >= last {
            return Err(AllocatorError::InvalidRange { start, end });
        }

        let capacity = u64::from(last - first) + 1;
        let word_count = capacity.div_ceil(WORD_BITS);
        let mut words = vec![0u64; usize::try_from(word_count).unwrap_or(usize::MAX)];

        // Bits past the end of the range are permanently set
        let tail = capacity % WORD_BITS;
        if tail != 0 {
            if let Some(last_word) = words.last_mut() {
                *last_word = !0u64 << tail;
            }
        }

        Ok(Self {
            start: first,
            end: last,
            words,
            allocated: 0,
            first_open_word: 0,
        })
    }

    /// First address of the range.
    pub fn start(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.start)
    }

    /// Last address of the range.
    pub fn end(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.end)
    }

    /// Whether `address` is inside the range and taken.
    pub fn is_allocated(&self, address: Ipv4Addr) -> bool {
        self.offset(address)
            .is_some_and(|offset| self.words[word_index(offset)] & bit_mask(offset) != 0)
    }

    fn offset(&self, address: Ipv4Addr) -> Option<u64> {
        let value = u32::from(address);
        (self.start..=self.end)
            .contains(&value)
            .then(|| u64::from(value - self.start))
    }

    fn address_at(&self, offset: u64) -> Ipv4Addr {
        // offset < capacity, so this stays within u32
        Ipv4Addr::from(self.start + offset as u32)
    }

    fn mark(&mut self, offset: u64) {
        self.words[word_index(offset)] |= bit_mask(offset);
        self.allocated += 1;
    }
}

fn word_index(offset: u64) -> usize {
    (offset / WORD_BITS) as usize
}

fn bit_mask(offset: u64) -> u64 {
    1u64 << (offset % WORD_BITS)
}

impl AddressAllocator for BitmapAllocator {
    fn allocate_any(&mut self) -> Result<Ipv4Addr, AllocatorError> {
        let open = self.words[self.first_open_word..]
            .iter()
            .position(|word| *word != u64::MAX)
            .map(|relative| self.first_open_word + relative);

        let Some(index) = open else {
            self.first_open_word = self.words.len();
            return Err(AllocatorError::Exhausted);
        };
        self.first_open_word = index;

        let bit = u64::from((!self.words[index]).trailing_zeros());
        let offset = index as u64 * WORD_BITS + bit;
        self.mark(offset);
        Ok(self.address_at(offset))
    }

    fn allocate_exact(&mut self, address: Ipv4Addr) -> Result<Ipv4Addr, AllocatorError> {
        let offset = self
            .offset(address)
            .ok_or(AllocatorError::OutOfRange(address))?;

        if self.words[word_index(offset)] & bit_mask(offset) != 0 {
            return Err(AllocatorError::Unavailable(address));
        }

        self.mark(offset);
        Ok(address)
    }

    fn capacity(&self) -> u64 {
        u64::from(self.end - self.start) + 1
    }

    fn allocated(&self) -> u64 {
        self.allocated
    }
}

impl fmt::Debug for BitmapAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BitmapAllocator")
            .field("start", &self.start())
            .field("end", &self.end())
            .field("allocated", &self.allocated)
            .finish_non_exhaustive()
    }
}
