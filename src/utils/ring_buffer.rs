//! # Ring Buffer
//!
//! Fixed-capacity circular byte store used as the hand-off between the socket
//! receive loop (sole writer) and a connection's message pump (sole reader).
//!
//! ## Semantics
//! - `write` copies *all* bytes, suspending while the buffer is full
//! - `read` copies up to `buf.len()` bytes, suspending while the buffer is empty,
//!   and returns how many were copied
//! - `len` is derived from the two cursors with wraparound arithmetic
//! - one slot is always kept free, so `read == write` means empty and never full
//!
//! Cursors are atomics so `len` can be observed without the store lock. Cursor
//! updates never straddle an `.await`, which makes `read` safe to cancel from a
//! `tokio::select!`.
//!
//! ## Usage
//! ```rust
//! use survival_net::utils::ring_buffer::RingBuffer;
//!
//! # tokio_test_block_on(async {
//! let ring = RingBuffer::new(16).unwrap();
//! ring.write(b"hello").await.unwrap();
//! let mut out = [0u8; 8];
//! let n = ring.read(&mut out).await.unwrap();
//! assert_eq!(&out[..n], b"hello");
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use tokio::sync::Notify;
use tracing::trace;

use crate::error::{constants, ProtocolError, Result};

/// Default ring capacity per connection (32 KiB)
pub const DEFAULT_RING_CAPACITY: usize = 32 * 1024;

#[derive(Debug)]
pub struct RingBuffer {
    store: Mutex<Box<[u8]>>,
    /// Backing slots: capacity + 1 reserved slack slot
    slots: usize,
    read: AtomicUsize,
    write: AtomicUsize,
    closed: AtomicBool,
    data_ready: Notify,
    space_ready: Notify,
}

impl RingBuffer {
    /// Create a ring able to hold `capacity` bytes at once.
    ///
    /// # Errors
    /// `ConfigError` if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(ProtocolError::ConfigError(
                "Ring buffer capacity must be greater than 0".to_string(),
            ));
        }
        let slots = capacity + 1;
        Ok(Self {
            store: Mutex::new(vec![0u8; slots].into_boxed_slice()),
            slots,
            read: AtomicUsize::new(0),
            write: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            data_ready: Notify::new(),
            space_ready: Notify::new(),
        })
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots - 1
    }

    /// Bytes currently buffered.
    #[inline]
    pub fn len(&self) -> usize {
        let r = self.read.load(Ordering::Acquire);
        let w = self.write.load(Ordering::Acquire);
        (w + self.slots - r) % self.slots
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes that can be written without waiting.
    #[inline]
    pub fn free(&self) -> usize {
        self.capacity() - self.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stop the hand-off.
    ///
    /// Readers drain whatever is still buffered and then get `Ok(0)`. A writer
    /// waiting for space is released with `ConnectionClosed`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.data_ready.notify_one();
        self.space_ready.notify_one();
    }

    /// Copy all of `bytes` into the ring, waiting for the reader to free space
    /// as often as needed. Inputs larger than the capacity are written in pieces.
    ///
    /// # Errors
    /// `ConnectionClosed` if the ring is closed before everything was written.
    pub async fn write(&self, mut bytes: &[u8]) -> Result<()> {
        while !bytes.is_empty() {
            if self.is_closed() {
                return Err(ProtocolError::ConnectionClosed);
            }

            let free = self.free();
            if free == 0 {
                trace!(pending = bytes.len(), "ring full, waiting for reader");
                self.space_ready.notified().await;
                continue;
            }

            let n = free.min(bytes.len());
            self.copy_in(&bytes[..n])?;
            bytes = &bytes[n..];
            self.data_ready.notify_one();
        }
        Ok(())
    }

    /// Write `bytes` only if all of them fit right now.
    ///
    /// Returns `Ok(false)` without copying anything when there is not enough
    /// free space.
    pub fn try_write(&self, bytes: &[u8]) -> Result<bool> {
        if self.is_closed() {
            return Err(ProtocolError::ConnectionClosed);
        }
        if bytes.len() > self.free() {
            return Ok(false);
        }
        if !bytes.is_empty() {
            self.copy_in(bytes)?;
            self.data_ready.notify_one();
        }
        Ok(true)
    }

    /// Copy up to `buf.len()` buffered bytes into `buf`, waiting until at
    /// least one byte is available.
    ///
    /// Returns `Ok(0)` only for an empty `buf` or once the ring is closed and drained.
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            let available = self.len();
            if available > 0 {
                let n = available.min(buf.len());
                self.copy_out(&mut buf[..n])?;
                self.space_ready.notify_one();
                return Ok(n);
            }
            if self.is_closed() {
                return Ok(0);
            }
            self.data_ready.notified().await;
        }
    }

    fn copy_in(&self, src: &[u8]) -> Result<()> {
        let mut store = self
            .store
            .lock()
            .map_err(|_| ProtocolError::Custom(constants::ERR_LOCK_POISONED.into()))?;

        let w = self.write.load(Ordering::Acquire);
        let first = src.len().min(self.slots - w);
        store[w..w + first].copy_from_slice(&src[..first]);
        let rest = src.len() - first;
        if rest > 0 {
            store[..rest].copy_from_slice(&src[first..]);
        }

        self.write
            .store((w + src.len()) % self.slots, Ordering::Release);
        Ok(())
    }

    fn copy_out(&self, dst: &mut [u8]) -> Result<()> {
        let store = self
            .store
            .lock()
            .map_err(|_| ProtocolError::Custom(constants::ERR_LOCK_POISONED.into()))?;

        let r = self.read.load(Ordering::Acquire);
        let n = dst.len();
        let first = n.min(self.slots - r);
        dst[..first].copy_from_slice(&store[r..r + first]);
        let rest = n - first;
        if rest > 0 {
            dst[first..].copy_from_slice(&store[..rest]);
        }

        self.read.store((r + n) % self.slots, Ordering::Release);
        Ok(())
    }
}
