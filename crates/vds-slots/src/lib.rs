#![forbid(unsafe_code)]

//! Dual-source slot vocabulary.
//!
//! Two buffer pools (sink and scratch) each number their slots from 0. The orchestrator exposes
//! a single producer slot space of `NUM_BUFFER_SLOTS` entries to its client; sink slots map onto
//! it from the bottom and scratch slots from the top, so the two ranges never collide.
//!
//! The table records which source last populated each producer slot. A dequeue from the other
//! source on the same slot means the cached handle is stale.
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_debug_implementations)]

use std::fmt;

use vds_core::{BufferHandle, VdsError, NUM_BUFFER_SLOTS};

// -------------------------------------------------------------------------------------------------
// Sources and slot mapping
// -------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    Sink,
    Scratch,
}

impl Source {
    pub const ALL: [Source; 2] = [Source::Sink, Source::Scratch];

    pub fn name(self) -> &'static str {
        match self {
            Source::Sink => "SINK",
            Source::Scratch => "SCRATCH",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Index into the shared producer slot space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProducerSlot(pub usize);

impl ProducerSlot {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ProducerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Maps a source's native slot into the producer slot space.
///
/// Identity for the sink; `N - 1 - slot` for scratch. Returns `None` for slots a pool should
/// never hand out (`slot >= N`).
pub fn source_to_producer(source: Source, native_slot: usize) -> Option<ProducerSlot> {
    if native_slot >= NUM_BUFFER_SLOTS {
        return None;
    }
    Some(match source {
        Source::Sink => ProducerSlot(native_slot),
        Source::Scratch => ProducerSlot(NUM_BUFFER_SLOTS - 1 - native_slot),
    })
}

/// Inverse of [`source_to_producer`]. The mapping is its own inverse; both names exist so call
/// sites read in the direction they convert.
pub fn producer_to_source(source: Source, slot: ProducerSlot) -> Option<usize> {
    source_to_producer(source, slot.0).map(ProducerSlot::index)
}

// -------------------------------------------------------------------------------------------------
// Producer slot table
// -------------------------------------------------------------------------------------------------

/// Ownership record for one producer slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SlotEntry {
    #[default]
    Empty,
    Owned {
        source: Source,
        /// Bumped every time the slot is (re)claimed.
        generation: u64,
        /// `None` after a release-all, until the buffer is requested again.
        handle: Option<BufferHandle>,
    },
}

impl SlotEntry {
    pub fn owner(&self) -> Option<Source> {
        match self {
            SlotEntry::Empty => None,
            SlotEntry::Owned { source, .. } => Some(*source),
        }
    }

    pub fn handle(&self) -> Option<&BufferHandle> {
        match self {
            SlotEntry::Empty => None,
            SlotEntry::Owned { handle, .. } => handle.as_ref(),
        }
    }

    pub fn generation(&self) -> Option<u64> {
        match self {
            SlotEntry::Empty => None,
            SlotEntry::Owned { generation, .. } => Some(*generation),
        }
    }
}

/// Last-known buffer handle per producer slot, tagged with the source that populated it.
#[derive(Debug, Clone)]
pub struct ProducerSlotTable {
    entries: [SlotEntry; NUM_BUFFER_SLOTS],
    next_generation: u64,
}

impl Default for ProducerSlotTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProducerSlotTable {
    pub fn new() -> Self {
        Self {
            entries: std::array::from_fn(|_| SlotEntry::Empty),
            next_generation: 1,
        }
    }

    pub fn entry(&self, slot: ProducerSlot) -> Result<&SlotEntry, VdsError> {
        self.entries
            .get(slot.0)
            .ok_or(VdsError::InvalidSlot(slot.0))
    }

    pub fn handle(&self, slot: ProducerSlot) -> Option<&BufferHandle> {
        self.entries.get(slot.0).and_then(SlotEntry::handle)
    }

    /// Records that `source` just handed out `slot`.
    ///
    /// Returns `true` when the cached handle cannot be used: the slot was empty, owned by the
    /// other source, or its handle was dropped by a release-all. In that case the entry is
    /// re-tagged with a fresh generation and no handle.
    pub fn claim(&mut self, slot: ProducerSlot, source: Source) -> Result<bool, VdsError> {
        let generation = self.next_generation;
        let entry = self
            .entries
            .get_mut(slot.0)
            .ok_or(VdsError::InvalidSlot(slot.0))?;

        let usable = matches!(
            entry,
            SlotEntry::Owned { source: owner, handle: Some(_), .. } if *owner == source
        );
        if usable {
            return Ok(false);
        }

        *entry = SlotEntry::Owned {
            source,
            generation,
            handle: None,
        };
        self.next_generation += 1;
        Ok(true)
    }

    /// Stores a freshly requested handle. The slot must already be claimed by `source`.
    pub fn store(
        &mut self,
        slot: ProducerSlot,
        source: Source,
        buffer: BufferHandle,
    ) -> Result<(), VdsError> {
        let entry = self
            .entries
            .get_mut(slot.0)
            .ok_or(VdsError::InvalidSlot(slot.0))?;
        match entry {
            SlotEntry::Owned {
                source: owner,
                handle,
                ..
            } if *owner == source => {
                *handle = Some(buffer);
                Ok(())
            }
            _ => Err(VdsError::other(format!(
                "slot {slot} is not claimed by {source}"
            ))),
        }
    }

    /// Drops every cached handle owned by `source`. Ownership tags are kept.
    ///
    /// Returns how many handles were dropped.
    pub fn release_all(&mut self, source: Source) -> usize {
        let mut dropped = 0;
        for entry in self.entries.iter_mut() {
            if let SlotEntry::Owned {
                source: owner,
                handle,
                ..
            } = entry
            {
                if *owner == source && handle.take().is_some() {
                    dropped += 1;
                }
            }
        }
        dropped
    }

    /// Producer slots currently holding a handle from `source`.
    pub fn slots_owned_by(&self, source: Source) -> impl Iterator<Item = ProducerSlot> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter(move |(_, e)| e.owner() == Some(source) && e.handle().is_some())
            .map(|(i, _)| ProducerSlot(i))
    }
}
