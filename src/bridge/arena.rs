//! Stable handles for bridges crossing the engine callback boundary.
//!
//! The engine identifies a source by an opaque integer it hands back
//! with every command. Instead of pinning bridge objects in place, the
//! host keeps them in a [`BridgeArena`] and passes the engine a
//! [`BridgeHandle`]: a slot index paired with a generation counter, so a
//! handle kept around after Free can never reach a recycled slot.

use super::SourceBridge;
use super::command::SourceCommand;

/// Opaque identifier for one bridge in an arena.
///
/// Representable as a single `u64` for the trip across the callback
/// boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BridgeHandle {
    index: u32,
    generation: u32,
}

impl BridgeHandle {
    pub fn to_raw(self) -> u64 {
        (u64::from(self.generation) << 32) | u64::from(self.index)
    }

    pub fn from_raw(raw: u64) -> Self {
        Self {
            index: raw as u32,
            generation: (raw >> 32) as u32,
        }
    }
}

struct Slot {
    bridge: Option<SourceBridge>,
    generation: u32,
}

/// Owner of every live bridge the engine can address.
#[derive(Default)]
pub struct BridgeArena {
    slots: Vec<Slot>,
    free_slots: Vec<u32>,
}

impl BridgeArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a bridge and return the handle the engine will use.
    pub fn allocate(&mut self, bridge: SourceBridge) -> BridgeHandle {
        if let Some(index) = self.free_slots.pop() {
            let slot = &mut self.slots[index as usize];
            slot.bridge = Some(bridge);
            return BridgeHandle {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            bridge: Some(bridge),
            generation: 0,
        });
        BridgeHandle {
            index,
            generation: 0,
        }
    }

    /// Look up a live bridge, or `None` for a freed or stale handle.
    pub fn get_mut(&mut self, handle: BridgeHandle) -> Option<&mut SourceBridge> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.bridge.as_mut()
    }

    /// Drop a bridge, releasing its backing stream and any staging
    /// state. Freeing an already-freed or stale handle is a no-op.
    pub fn free(&mut self, handle: BridgeHandle) -> bool {
        let Some(slot) = self.slots.get_mut(handle.index as usize) else {
            return false;
        };
        if slot.generation != handle.generation || slot.bridge.is_none() {
            return false;
        }
        slot.bridge = None;
        // Retire this generation so stale copies of the handle miss
        slot.generation = slot.generation.wrapping_add(1);
        self.free_slots.push(handle.index);
        true
    }

    /// Route one engine command to the addressed bridge.
    ///
    /// Free is handled here: it releases the slot itself, and repeating
    /// it on a dead handle fails with the protocol sentinel instead of
    /// touching freed state.
    pub async fn dispatch(
        &mut self,
        handle: BridgeHandle,
        cmd: SourceCommand,
        data: &mut [u8],
    ) -> i64 {
        if cmd == SourceCommand::Free {
            return if self.free(handle) { 0 } else { -1 };
        }
        match self.get_mut(handle) {
            Some(bridge) => bridge.dispatch(cmd, data).await,
            None => -1,
        }
    }

    /// Number of live bridges.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.bridge.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryStream;

    fn bridge(content: &[u8]) -> SourceBridge {
        SourceBridge::new(MemoryStream::from_vec(content.to_vec()))
    }

    #[tokio::test]
    async fn handles_address_their_own_bridge() {
        let mut arena = BridgeArena::new();
        let a = arena.allocate(bridge(b"aaaa"));
        let b = arena.allocate(bridge(b"bb"));

        let mut buf = [0u8; 8];
        assert_eq!(arena.dispatch(a, SourceCommand::Open, &mut []).await, 0);
        assert_eq!(arena.dispatch(a, SourceCommand::Read, &mut buf).await, 4);
        assert_eq!(arena.dispatch(b, SourceCommand::Open, &mut []).await, 0);
        assert_eq!(arena.dispatch(b, SourceCommand::Read, &mut buf).await, 2);
    }

    #[tokio::test]
    async fn free_is_idempotent() {
        let mut arena = BridgeArena::new();
        let handle = arena.allocate(bridge(b"data"));

        assert_eq!(arena.dispatch(handle, SourceCommand::Free, &mut []).await, 0);
        assert!(arena.is_empty());

        // Double free: failure sentinel, never a crash
        assert_eq!(arena.dispatch(handle, SourceCommand::Free, &mut []).await, -1);
        assert!(!arena.free(handle));
    }

    #[tokio::test]
    async fn stale_handles_miss_recycled_slots() {
        let mut arena = BridgeArena::new();
        let old = arena.allocate(bridge(b"old"));
        arena.free(old);

        let new = arena.allocate(bridge(b"new"));
        assert_eq!(new.index, old.index);
        assert_ne!(new.generation, old.generation);

        assert!(arena.get_mut(old).is_none());
        assert_eq!(arena.dispatch(old, SourceCommand::Open, &mut []).await, -1);
        assert!(arena.get_mut(new).is_some());
    }

    #[test]
    fn raw_round_trip() {
        let handle = BridgeHandle {
            index: 7,
            generation: 3,
        };
        assert_eq!(BridgeHandle::from_raw(handle.to_raw()), handle);
    }
}
