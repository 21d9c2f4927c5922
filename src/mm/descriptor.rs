//! In-place block descriptor.
//!
//! Every block in a region starts with an 8-byte header:
//!
//! ```text
//!  31                                                   0
//! +------------------------------------------------------+
//! | next: byte offset of the successor (0 = last block)  |
//! +-------+----------------------------------------------+
//! | flags |  payload size (bits 0..=27)                  |
//! +-------+----------------------------------------------+
//! ```
//!
//! The head descriptor always lives at offset 0, so 0 can never name a
//! successor and serves as the terminator.

use core::fmt;

/// Size of the descriptor header in bytes.
pub const HEADER_SIZE: usize = core::mem::size_of::<Descriptor>();

/// Payload sizes are kept in multiples of this, so headers stay aligned.
pub const GRANULE: usize = core::mem::align_of::<Descriptor>();

/// A split remainder's payload must be larger than this.
pub const MIN_PAYLOAD: usize = 8;

/// Low bits of `size_and_flags` holding the payload size.
pub const SIZE_MASK: u32 = 0x0FFF_FFFF;

/// Largest payload a single descriptor can describe.
pub const MAX_PAYLOAD: usize = SIZE_MASK as usize;

bitflags::bitflags! {
    /// Status bits kept in the top nibble of `size_and_flags`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DescFlags: u32 {
        /// The block is handed out to a caller.
        const USED = 1 << 31;
    }
}

/// Block header, embedded at the start of the block it describes.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    next: u32,
    size_and_flags: u32,
}

impl Descriptor {
    /// A free descriptor with `size` payload bytes followed by `next`.
    pub const fn free(size: usize, next: Option<usize>) -> Self {
        Self {
            next: match next {
                Some(offset) => offset as u32,
                None => 0,
            },
            size_and_flags: size as u32 & SIZE_MASK,
        }
    }

    /// Offset of the successor, or `None` for the last block of the region.
    pub const fn next(&self) -> Option<usize> {
        match self.next {
            0 => None,
            offset => Some(offset as usize),
        }
    }

    pub fn set_next(&mut self, next: Option<usize>) {
        self.next = next.map_or(0, |offset| offset as u32);
    }

    /// Payload size in bytes, header excluded.
    pub const fn size(&self) -> usize {
        (self.size_and_flags & SIZE_MASK) as usize
    }

    pub fn set_size(&mut self, size: usize) {
        debug_assert!(size <= MAX_PAYLOAD);
        self.size_and_flags = (self.size_and_flags & !SIZE_MASK) | (size as u32 & SIZE_MASK);
    }

    /// Status bits. Unknown bits are kept so [`Descriptor::has_unknown_flags`]
    /// can report them.
    pub const fn flags(&self) -> DescFlags {
        DescFlags::from_bits_retain(self.size_and_flags & !SIZE_MASK)
    }

    pub fn has_unknown_flags(&self) -> bool {
        !DescFlags::all().contains(self.flags())
    }

    pub fn is_free(&self) -> bool {
        !self.flags().contains(DescFlags::USED)
    }

    pub fn mark_used(&mut self) {
        self.size_and_flags |= DescFlags::USED.bits();
    }

    pub fn mark_free(&mut self) {
        self.size_and_flags &= !DescFlags::USED.bits();
    }

    /// Number of bytes the whole block spans, header included.
    pub const fn span(&self) -> usize {
        HEADER_SIZE + self.size()
    }
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("next", &self.next())
            .field("size", &self.size())
            .field("flags", &self.flags())
            .finish()
    }
}

/// Rounds a request up to the allocation granule. Zero-sized requests get one
/// granule so every allocation has a distinct address.
pub const fn round_request(size: usize) -> Option<usize> {
    if size == 0 {
        return Some(GRANULE);
    }
    match size.checked_add(GRANULE - 1) {
        Some(padded) => Some(padded & !(GRANULE - 1)),
        None => None,
    }
}
