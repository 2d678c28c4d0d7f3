//! Per-signer nonce tracking for tap replay protection
//!
//! A chip's counter only moves forward, so each signer key carries a
//! high-water mark. With a window of `W`, nonces up to `W` below the mark
//! are still admitted once each (IPsec-style sliding bitmap) to tolerate
//! taps that reach the verifier out of order.
//!
//! This module provides:
//! - NonceStore trait for replay tracking
//! - ReplayWindow, the sliding bitmap for one signer
//! - InMemoryNonceStore for a single session

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::domain::PublicKey;

/// Largest supported replay window
pub const MAX_REPLAY_WINDOW: u32 = 64;

/// A nonce was rejected as already seen or too old
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayRejection {
    pub nonce: u32,
    pub high_water: u32,
}

/// Sliding anti-replay window for a single signer.
///
/// Bit `i` of `seen` marks nonce `high_water - i` as accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayWindow {
    high_water: u32,
    seen: u128,
}

impl ReplayWindow {
    /// Window after accepting the first nonce from a signer
    pub fn starting_at(nonce: u32) -> Self {
        Self {
            high_water: nonce,
            seen: 1,
        }
    }

    pub fn high_water(&self) -> u32 {
        self.high_water
    }

    /// Check `nonce` against the window without mutating it
    pub fn check(&self, nonce: u32, window: u32) -> Result<(), ReplayRejection> {
        if nonce > self.high_water {
            return Ok(());
        }

        let diff = self.high_water - nonce;
        let reject = ReplayRejection {
            nonce,
            high_water: self.high_water,
        };
        if diff == 0 || diff > window.min(MAX_REPLAY_WINDOW) {
            return Err(reject);
        }
        if self.seen & (1u128 << diff) != 0 {
            return Err(reject);
        }
        Ok(())
    }

    /// Check and, on success, mark `nonce` as accepted
    pub fn accept(&mut self, nonce: u32, window: u32) -> Result<(), ReplayRejection> {
        self.check(nonce, window)?;

        if nonce > self.high_water {
            let shift = nonce - self.high_water;
            self.seen = if shift >= u128::BITS {
                0
            } else {
                self.seen << shift
            };
            self.seen |= 1;
            self.high_water = nonce;
        } else {
            self.seen |= 1u128 << (self.high_water - nonce);
        }
        Ok(())
    }
}

/// Replay tracker trait.
///
/// `check_and_record` must be atomic per signer: two concurrent calls with
/// the same nonce may not both succeed.
#[cfg_attr(test, mockall::automock)]
pub trait NonceStore: Send + Sync {
    /// Highest nonce accepted so far for `signer`
    fn high_water(&self, signer: &PublicKey) -> Option<u32>;

    /// Would `nonce` be accepted? Does not change state.
    fn check(&self, signer: &PublicKey, nonce: u32) -> Result<(), ReplayRejection>;

    /// Accept `nonce` and advance the signer's window
    fn check_and_record(&self, signer: &PublicKey, nonce: u32) -> Result<(), ReplayRejection>;

    /// Forget all signers
    fn clear(&self);
}

/// In-memory nonce store for one session
pub struct InMemoryNonceStore {
    window: u32,
    marks: RwLock<HashMap<PublicKey, ReplayWindow>>,
}

impl InMemoryNonceStore {
    /// Strictly increasing nonces only
    pub fn new() -> Self {
        Self::with_window(0)
    }

    /// Admit nonces up to `window` below the high-water mark once each
    pub fn with_window(window: u32) -> Self {
        Self {
            window: window.min(MAX_REPLAY_WINDOW),
            marks: RwLock::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> u32 {
        self.window
    }

    pub fn len(&self) -> usize {
        self.marks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryNonceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl NonceStore for InMemoryNonceStore {
    fn high_water(&self, signer: &PublicKey) -> Option<u32> {
        let marks = self.marks.read().unwrap_or_else(PoisonError::into_inner);
        marks.get(signer).map(ReplayWindow::high_water)
    }

    fn check(&self, signer: &PublicKey, nonce: u32) -> Result<(), ReplayRejection> {
        let marks = self.marks.read().unwrap_or_else(PoisonError::into_inner);
        match marks.get(signer) {
            Some(window) => window.check(nonce, self.window),
            None => Ok(()),
        }
    }

    fn check_and_record(&self, signer: &PublicKey, nonce: u32) -> Result<(), ReplayRejection> {
        let mut marks = self.marks.write().unwrap_or_else(PoisonError::into_inner);
        match marks.get_mut(signer) {
            Some(window) => window.accept(nonce, self.window),
            None => {
                marks.insert(signer.clone(), ReplayWindow::starting_at(nonce));
                Ok(())
            }
        }
    }

    fn clear(&self) {
        self.marks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

// ============================================================================
// Tests
// ============================================================================
