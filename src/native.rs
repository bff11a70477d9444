//! Transient NUL-terminated strings handed to the notification service
//!
//! Every string is copied out of the caller's term into memory reserved
//! through a [`StringAllocator`], so exhaustion surfaces as
//! [`BridgeError::NoMemory`] instead of aborting. Release happens on drop.

use crate::errors::{BridgeError, Result};
use crate::term::Term;
use std::borrow::Cow;
use std::ffi::{CStr, CString};

/// Source of memory for transient strings
pub trait StringAllocator {
    /// Reserve exactly `additional` bytes in `buf`
    fn reserve(&self, buf: &mut Vec<u8>, additional: usize) -> Result<()>;

    /// Called once when a string allocated through `reserve` is dropped
    fn release(&self) {}
}

/// Process heap, with fallible reservation
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapAllocator;

impl StringAllocator for HeapAllocator {
    fn reserve(&self, buf: &mut Vec<u8>, additional: usize) -> Result<()> {
        buf.try_reserve_exact(additional)
            .map_err(|_| BridgeError::NoMemory)
    }
}

/// Owned NUL-terminated copy of a caller string
pub struct NativeString<'a> {
    inner: CString,
    alloc: &'a dyn StringAllocator,
}

impl<'a> NativeString<'a> {
    /// Copy an iolist term. Bytes after an embedded NUL are dropped, the
    /// same way a C reader of the buffer would see it.
    pub fn from_term(term: &Term, alloc: &'a dyn StringAllocator) -> Result<Self> {
        let size = term
            .iolist_size()
            .ok_or(BridgeError::BadArgument("expected iolist or binary"))?;

        let mut buf = Vec::new();
        alloc.reserve(&mut buf, size + 1)?;
        term.copy_iolist(&mut buf);
        if let Some(nul) = buf.iter().position(|&b| b == 0) {
            buf.truncate(nul);
        }

        // Capacity already covers the terminator, so this cannot reallocate
        let inner = match CString::new(buf) {
            Ok(inner) => inner,
            Err(_) => {
                alloc.release();
                return Err(BridgeError::BadArgument("embedded NUL in string"));
            }
        };
        Ok(Self { inner, alloc })
    }

    pub fn as_c_str(&self) -> &CStr {
        &self.inner
    }

    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        self.inner.to_string_lossy()
    }
}

impl Drop for NativeString<'_> {
    fn drop(&mut self) {
        self.alloc.release();
    }
}

impl std::fmt::Debug for NativeString<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("NativeString").field(&self.inner).finish()
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Allocator that counts reservations and releases, optionally failing
    /// the n-th reservation attempt (0-based).
    #[derive(Debug, Default)]
    pub struct CountingAllocator {
        attempts: AtomicUsize,
        allocated: AtomicUsize,
        released: AtomicUsize,
        fail_on: Option<usize>,
    }

    impl CountingAllocator {
        pub fn failing_on(attempt: usize) -> Self {
            Self {
                fail_on: Some(attempt),
                ..Self::default()
            }
        }

        pub fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }

        pub fn allocated(&self) -> usize {
            self.allocated.load(Ordering::SeqCst)
        }

        pub fn released(&self) -> usize {
            self.released.load(Ordering::SeqCst)
        }
    }

    impl StringAllocator for CountingAllocator {
        fn reserve(&self, buf: &mut Vec<u8>, additional: usize) -> Result<()> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.fail_on == Some(attempt) {
                return Err(BridgeError::NoMemory);
            }
            HeapAllocator.reserve(buf, additional)?;
            self.allocated.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn release(&self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }
}
