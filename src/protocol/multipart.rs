//! Splitting oversized payloads into [`Multipart`] fragments and putting them
//! back together on the receiving side.
//!
//! A group is complete exactly when fragments `0..num_parts` have all been
//! seen; arrival order does not matter and duplicates overwrite their slot.
//!
//! Reassembly memory follows the bytes actually received. A group may declare
//! at most `max_parts` fragments and hold at most one packed packet's worth of
//! content, and all pending groups of a connection share a byte budget.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::core::frame::FRAME_LEN;
use crate::core::packet::MAX_CONTENT_LENGTH;
use crate::error::{ProtocolError, Result};
use crate::protocol::payloads::{Multipart, MULTIPART_HEADER_LEN};

/// Bytes a fragment adds around its content: frame header plus multipart fields.
pub const FRAGMENT_OVERHEAD: usize = FRAME_LEN + MULTIPART_HEADER_LEN;

/// Default time an incomplete group is kept before it is dropped
pub const DEFAULT_REASSEMBLY_TIMEOUT: Duration = Duration::from_secs(10);

/// Default number of incomplete groups tracked per connection
pub const DEFAULT_MAX_PENDING_GROUPS: usize = 64;

/// Default cap on the `num_parts` a fragment may declare
pub const DEFAULT_MAX_FRAGMENTS_PER_GROUP: u16 = 1024;

/// Default cap on fragment content buffered per connection (1 MiB)
pub const DEFAULT_MAX_PENDING_BYTES: usize = 1024 * 1024;

/// Largest reassembled payload: one packed packet.
pub const MAX_GROUP_BYTES: usize = FRAME_LEN + MAX_CONTENT_LENGTH;

/// Cut `packed` into `ceil(len / max_chunk)` fragments sharing `group_id`.
///
/// An empty input still yields a single empty fragment so the receiver sees a
/// complete group.
///
/// # Errors
/// `InvalidFragment` if `max_chunk` is zero or the payload needs more than
/// `u16::MAX` fragments.
pub fn split_payload(packed: &[u8], max_chunk: usize, group_id: u32) -> Result<Vec<Multipart>> {
    if max_chunk == 0 {
        return Err(ProtocolError::InvalidFragment(
            "fragment chunk size must be greater than 0".into(),
        ));
    }

    let count = packed.len().div_ceil(max_chunk).max(1);
    let num_parts = u16::try_from(count).map_err(|_| {
        ProtocolError::InvalidFragment(format!(
            "{} bytes need {count} fragments of {max_chunk}",
            packed.len()
        ))
    })?;

    if packed.is_empty() {
        return Ok(vec![Multipart {
            id: 0,
            group_id,
            num_parts,
            content: Vec::new(),
        }]);
    }

    Ok(packed
        .chunks(max_chunk)
        .enumerate()
        .map(|(id, chunk)| Multipart {
            id: id as u16,
            group_id,
            num_parts,
            content: chunk.to_vec(),
        })
        .collect())
}

#[derive(Debug)]
struct PendingGroup {
    num_parts: u16,
    parts: BTreeMap<u16, Vec<u8>>,
    bytes: usize,
    created: Instant,
}

impl PendingGroup {
    fn new(num_parts: u16, now: Instant) -> Self {
        Self {
            num_parts,
            parts: BTreeMap::new(),
            bytes: 0,
            created: now,
        }
    }

    /// Content bytes held after storing `len` bytes at `id`.
    fn bytes_after(&self, id: u16, len: usize) -> usize {
        let replaced = self.parts.get(&id).map_or(0, Vec::len);
        self.bytes - replaced + len
    }

    fn store(&mut self, id: u16, content: Vec<u8>) {
        self.bytes = self.bytes_after(id, content.len());
        self.parts.insert(id, content);
    }

    fn is_complete(&self) -> bool {
        self.parts.len() == self.num_parts as usize
    }

    fn concat(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.bytes);
        for part in self.parts.into_values() {
            out.extend_from_slice(&part);
        }
        out
    }
}

/// Per-connection reassembly state. Owned by the connection's pump.
#[derive(Debug)]
pub struct Reassembler {
    groups: HashMap<u32, PendingGroup>,
    ttl: Duration,
    max_groups: usize,
    max_parts: u16,
    max_pending_bytes: usize,
    pending_bytes: usize,
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new(DEFAULT_REASSEMBLY_TIMEOUT, DEFAULT_MAX_PENDING_GROUPS)
    }
}

impl Reassembler {
    pub fn new(ttl: Duration, max_groups: usize) -> Self {
        Self {
            groups: HashMap::new(),
            ttl,
            max_groups: max_groups.max(1),
            max_parts: DEFAULT_MAX_FRAGMENTS_PER_GROUP,
            max_pending_bytes: DEFAULT_MAX_PENDING_BYTES,
            pending_bytes: 0,
        }
    }

    /// Override the per-group fragment cap and the per-connection byte budget.
    pub fn with_limits(mut self, max_parts: u16, max_pending_bytes: usize) -> Self {
        self.max_parts = max_parts.max(1);
        self.max_pending_bytes = max_pending_bytes.max(1);
        self
    }

    /// Number of groups still waiting for fragments.
    pub fn pending_groups(&self) -> usize {
        self.groups.len()
    }

    /// Fragment content currently buffered across all pending groups.
    pub fn pending_bytes(&self) -> usize {
        self.pending_bytes
    }

    /// Store one fragment. Returns the concatenated content once its group is
    /// complete; the group is forgotten at that point.
    ///
    /// # Errors
    /// - `InvalidFragment` for `num_parts == 0`, `id >= num_parts`, more parts
    ///   than the configured cap, or a group that outgrows one packed packet
    ///   or the byte budget; an oversized group is discarded
    /// - `ReassemblyMismatch` if `num_parts` disagrees with earlier fragments of
    ///   the same group; the whole group is discarded
    pub fn insert(&mut self, fragment: Multipart, now: Instant) -> Result<Option<Vec<u8>>> {
        let Multipart {
            id,
            group_id,
            num_parts,
            content,
        } = fragment;

        if num_parts == 0 {
            return Err(ProtocolError::InvalidFragment(format!(
                "group {group_id} declares zero parts"
            )));
        }
        if id >= num_parts {
            return Err(ProtocolError::InvalidFragment(format!(
                "fragment {id} out of range for group {group_id} of {num_parts}"
            )));
        }
        if num_parts > self.max_parts {
            return Err(ProtocolError::InvalidFragment(format!(
                "group {group_id} declares {num_parts} parts (limit {})",
                self.max_parts
            )));
        }

        let held = match self.groups.get(&group_id) {
            Some(existing) if existing.num_parts != num_parts => {
                let expected = existing.num_parts;
                self.remove_group(group_id);
                return Err(ProtocolError::ReassemblyMismatch {
                    group_id,
                    expected,
                    got: num_parts,
                });
            }
            Some(existing) => existing.bytes,
            None => {
                if self.groups.len() >= self.max_groups {
                    self.evict_oldest(group_id);
                }
                0
            }
        };

        let group_bytes = self
            .groups
            .get(&group_id)
            .map_or(content.len(), |g| g.bytes_after(id, content.len()));
        if group_bytes > MAX_GROUP_BYTES || group_bytes > self.max_pending_bytes {
            self.remove_group(group_id);
            return Err(ProtocolError::InvalidFragment(format!(
                "group {group_id} would hold {group_bytes} bytes"
            )));
        }
        while self.pending_bytes - held + group_bytes > self.max_pending_bytes {
            if !self.evict_oldest(group_id) {
                break;
            }
        }

        let group = self
            .groups
            .entry(group_id)
            .or_insert_with(|| PendingGroup::new(num_parts, now));
        group.store(id, content);
        self.pending_bytes = self.pending_bytes - held + group_bytes;

        if !group.is_complete() {
            return Ok(None);
        }

        match self.remove_group(group_id) {
            Some(group) => {
                debug!(group_id, num_parts, "multipart group complete");
                Ok(Some(group.concat()))
            }
            None => Ok(None),
        }
    }

    /// Drop every group first seen more than the retention timeout before `now`.
    /// Returns how many groups were dropped.
    pub fn expire(&mut self, now: Instant) -> usize {
        let ttl = self.ttl;
        let before = self.groups.len();
        let mut freed = 0;
        self.groups.retain(|_, group| {
            let keep = now.saturating_duration_since(group.created) < ttl;
            if !keep {
                freed += group.bytes;
            }
            keep
        });
        self.pending_bytes -= freed;
        let dropped = before - self.groups.len();
        if dropped > 0 {
            debug!(dropped, "expired stale multipart groups");
        }
        dropped
    }

    fn remove_group(&mut self, group_id: u32) -> Option<PendingGroup> {
        let group = self.groups.remove(&group_id)?;
        self.pending_bytes -= group.bytes;
        Some(group)
    }

    /// Evict the oldest group other than `keep`. `false` if there was none.
    fn evict_oldest(&mut self, keep: u32) -> bool {
        let oldest = self
            .groups
            .iter()
            .filter(|(id, _)| **id != keep)
            .min_by_key(|(_, group)| group.created)
            .map(|(id, _)| *id);
        match oldest {
            Some(group_id) => {
                warn!(group_id, "reassembly limits reached, evicting oldest group");
                self.remove_group(group_id);
                true
            }
            None => false,
        }
    }
}
