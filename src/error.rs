//! Unified error types for the RstinyOS bring-up layer.
//!
//! The memory manager reports typed errors ([`MmError`], [`ConfigError`]) so
//! callers can react to exhaustion without string matching. Kernel-level
//! sequencing glues subsystems together with [`TinyResult`], an alias for
//! `anyhow::Result<T>`.
//!
//! ## Usage Examples
//!
//! ```ignore
//! let ptr = mm::alloc(config::board::DMA, 512)?;
//!
//! unsafe { mm::init(config::board::MEMORY_REGIONS) }
//!     .context("Failed to initialize memory regions")?;
//! ```

use core::fmt;

use crate::mm::RegionId;

/// Result type alias using anyhow::Error.
///
/// This provides flexible error handling with context and error chaining.
pub type TinyResult<T> = anyhow::Result<T>;

/// Malformed region table. Detected once, before any region is initialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// More entries than the region table can hold.
    TooManyRegions { count: usize, max: usize },
    /// Region with no bytes at all.
    ZeroCapacity { index: usize },
    /// Region cannot hold one descriptor plus a minimal payload.
    TooSmall { index: usize, size: usize },
    /// Region payload does not fit in the packed size field.
    TooLarge { index: usize, size: usize },
    /// Region base is not aligned to the descriptor header.
    Misaligned { index: usize, base: usize },
    /// Region wraps around the end of the address space.
    AddressOverflow { index: usize },
    /// Two regions share at least one byte.
    Overlap { first: usize, second: usize },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::TooManyRegions { count, max } => {
                write!(f, "{count} regions configured, at most {max} supported")
            }
            Self::ZeroCapacity { index } => write!(f, "region {index} has zero capacity"),
            Self::TooSmall { index, size } => {
                write!(f, "region {index} is too small ({size} bytes)")
            }
            Self::TooLarge { index, size } => {
                write!(f, "region {index} is too large ({size} bytes)")
            }
            Self::Misaligned { index, base } => {
                write!(f, "region {index} base {base:#x} is misaligned")
            }
            Self::AddressOverflow { index } => {
                write!(f, "region {index} overflows the address space")
            }
            Self::Overlap { first, second } => {
                write!(f, "regions {first} and {second} overlap")
            }
        }
    }
}

impl core::error::Error for ConfigError {}

/// Errors reported by the region allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmError {
    /// The region table is malformed.
    Config(ConfigError),
    /// No free descriptor in the region can hold the request.
    OutOfMemory {
        region: RegionId,
        requested: usize,
        largest_free: usize,
    },
    /// The selected region slot is not configured.
    NoSuchRegion(RegionId),
    /// The pointer does not start a payload handed out by this allocator.
    InvalidFree(usize),
    /// The payload at this address is already free.
    DoubleFree(usize),
    /// A descriptor chain violates its structural invariants.
    Corrupted {
        region: RegionId,
        offset: usize,
        reason: &'static str,
    },
    /// The global memory manager has not been initialized yet.
    NotInitialized,
    /// `mm::init` was called a second time.
    AlreadyInitialized,
}

impl From<ConfigError> for MmError {
    fn from(err: ConfigError) -> Self {
        MmError::Config(err)
    }
}

impl fmt::Display for MmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(err) => write!(f, "bad region configuration: {err}"),
            Self::OutOfMemory {
                region,
                requested,
                largest_free,
            } => write!(
                f,
                "out of memory in region {region}: requested {requested} bytes, largest free block {largest_free}"
            ),
            Self::NoSuchRegion(region) => write!(f, "region {region} is not configured"),
            Self::InvalidFree(addr) => write!(f, "free of foreign pointer {addr:#x}"),
            Self::DoubleFree(addr) => write!(f, "double free of {addr:#x}"),
            Self::Corrupted {
                region,
                offset,
                reason,
            } => write!(
                f,
                "region {region} corrupted at offset {offset:#x}: {reason}"
            ),
            Self::NotInitialized => write!(f, "memory manager not initialized"),
            Self::AlreadyInitialized => write!(f, "memory manager already initialized"),
        }
    }
}

impl core::error::Error for MmError {}
