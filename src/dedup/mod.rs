//! Responder deduplication.
//!
//! One store is chosen at start-up and kept for the whole scan:
//! - [`DedupMethod::Full`]: exact, one bit per IPv4 address ([`PagedBitmap`]).
//!   Marked only after a unique success.
//! - [`DedupMethod::Window`]: bounded LRU over (address, port) ([`WindowCache`]).
//!   Inserted on lookup.
//! - [`DedupMethod::None`]: every responder is new.
//!
//! The store is touched only from the receive thread and has no locking.

pub mod bitmap;
pub mod window;

use std::net::Ipv4Addr;
use std::num::NonZeroUsize;

pub use bitmap::PagedBitmap;
pub use window::WindowCache;

use crate::config::DedupMethod;

/// Identifies a replying endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResponderKey {
    pub addr: Ipv4Addr,
    pub port: u16,
}

impl ResponderKey {
    pub fn new(addr: Ipv4Addr, port: u16) -> Self {
        Self { addr, port }
    }
}

/// Errors from dedup store construction.
#[derive(Debug, thiserror::Error)]
pub enum DedupError {
    #[error("window dedup requires a capacity of at least 1")]
    ZeroWindow,
}

/// "Have I seen this responder before" store.
pub enum DedupStore {
    Full(PagedBitmap),
    Window(WindowCache),
    Disabled,
}

impl DedupStore {
    pub fn new(method: DedupMethod, window_size: usize) -> Result<Self, DedupError> {
        Ok(match method {
            DedupMethod::Full => Self::Full(PagedBitmap::new()),
            DedupMethod::Window => {
                let cap = NonZeroUsize::new(window_size).ok_or(DedupError::ZeroWindow)?;
                Self::Window(WindowCache::new(cap))
            }
            DedupMethod::None => Self::Disabled,
        })
    }

    pub fn method(&self) -> DedupMethod {
        match self {
            Self::Full(_) => DedupMethod::Full,
            Self::Window(_) => DedupMethod::Window,
            Self::Disabled => DedupMethod::None,
        }
    }

    /// Membership check, called exactly once per validated packet.
    ///
    /// Window mode records the key as a side effect; full mode does not
    /// (see [`DedupStore::mark_success`]).
    pub fn is_repeat(&mut self, key: ResponderKey) -> bool {
        match self {
            Self::Full(bm) => bm.check(key.addr),
            Self::Window(w) => w.get_or_insert(key),
            Self::Disabled => false,
        }
    }

    /// Record a unique success. Only the full bitmap needs this.
    pub fn mark_success(&mut self, key: ResponderKey) {
        if let Self::Full(bm) = self {
            bm.set(key.addr);
        }
    }
}
