//! Arena-backed circular update lists and the shared pending slot.
//!
//! Every list is circular and identified by its tail: `next(tail)` is the
//! oldest update. The arena and the pending tail live behind one
//! `Rc<RefCell<..>>` so that the committed and candidate snapshots of a queue
//! see the same pending updates. No borrow is held across calls into caller
//! code, which is what makes re-entrant [`SharedQueue::enqueue`] safe during
//! processing.
//!
//! The base lists of the two snapshots are either the same ring (same tail)
//! or share no node at all. A ring that stops being reachable from either
//! snapshot is released to the free list and its slots are reused.

use std::cell::RefCell;
use std::rc::Rc;

use crate::expiration::ExpirationTime;

use super::update::{StateModel, Update};

/// Index of an update node in its queue's arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct UpdateId(usize);

/// Identity of an enqueued update.
///
/// Copies made by rebasing or copy-on-write keep the serial of the update
/// they were made from. Serials are never reused.
pub(crate) type Serial = u64;

struct Node<M: StateModel> {
    update: Update<M>,
    serial: Serial,
    next: UpdateId,
}

/// One entry of a residual list being rebuilt after a pass.
pub(crate) enum Residual<M: StateModel> {
    /// A skipped update, still in its node.
    Kept(UpdateId),
    /// A copy of an applied update that follows a skipped one.
    Rebased(Update<M>, Serial),
}

struct Arena<M: StateModel> {
    nodes: Vec<Node<M>>,
    free: Vec<UpdateId>,
    next_serial: Serial,
    /// Tail of the pending list, if any updates are waiting to be merged.
    pending: Option<UpdateId>,
}

impl<M: StateModel> Arena<M> {
    /// Allocate a node linked to itself, reusing a released slot if any.
    fn alloc(&mut self, update: Update<M>, serial: Serial) -> UpdateId {
        if let Some(id) = self.free.pop() {
            self.nodes[id.0] = Node {
                update,
                serial,
                next: id,
            };
            return id;
        }
        let id = UpdateId(self.nodes.len());
        self.nodes.push(Node {
            update,
            serial,
            next: id,
        });
        id
    }

    fn fresh_serial(&mut self) -> Serial {
        let serial = self.next_serial;
        self.next_serial += 1;
        serial
    }

    /// Drop the update held by `id` and make the slot reusable.
    fn release(&mut self, id: UpdateId) {
        let node = &mut self.nodes[id.0];
        node.update = Update::force_rerender(ExpirationTime::NO_WORK);
        node.next = id;
        self.free.push(id);
    }

    #[inline]
    fn next(&self, id: UpdateId) -> UpdateId {
        self.nodes[id.0].next
    }

    #[inline]
    fn set_next(&mut self, id: UpdateId, next: UpdateId) {
        self.nodes[id.0].next = next;
    }

    /// Insert `id` (a self-linked node) after `tail`, returning the new tail.
    fn append(&mut self, tail: Option<UpdateId>, id: UpdateId) -> UpdateId {
        if let Some(tail) = tail {
            let first = self.next(tail);
            self.set_next(id, first);
            self.set_next(tail, id);
        }
        id
    }

    /// Close `ids` into a ring in the given order, returning its tail.
    fn link(&mut self, ids: &[UpdateId]) -> Option<UpdateId> {
        let (&first, &last) = (ids.first()?, ids.last()?);
        for pair in ids.windows(2) {
            self.set_next(pair[0], pair[1]);
        }
        self.set_next(last, first);
        Some(last)
    }

    fn ring(&self, tail: UpdateId) -> Vec<UpdateId> {
        let mut ids = Vec::new();
        let mut cursor = self.next(tail);
        loop {
            ids.push(cursor);
            if cursor == tail {
                break;
            }
            cursor = self.next(cursor);
        }
        ids
    }

    fn copy(&mut self, id: UpdateId) -> UpdateId {
        let node = &self.nodes[id.0];
        let (update, serial) = (node.update.clone(), node.serial);
        self.alloc(update, serial)
    }
}

/// Handle to a queue's shared pending slot and node arena.
///
/// Cloning the handle aliases the same slot.
pub struct SharedQueue<M: StateModel> {
    inner: Rc<RefCell<Arena<M>>>,
}

impl<M: StateModel> Clone for SharedQueue<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<M: StateModel> Default for SharedQueue<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: StateModel> SharedQueue<M> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Arena {
                nodes: Vec::new(),
                free: Vec::new(),
                next_serial: 0,
                pending: None,
            })),
        }
    }

    /// Append `update` to the pending list in O(1).
    ///
    /// May be called at any time, including from inside a payload function
    /// that the processor is currently evaluating.
    pub fn enqueue(&self, update: Update<M>) {
        let mut arena = self.inner.borrow_mut();
        let serial = arena.fresh_serial();
        let id = arena.alloc(update, serial);
        let pending = arena.pending;
        let tail = arena.append(pending, id);
        arena.pending = Some(tail);
    }

    pub fn has_pending(&self) -> bool {
        self.inner.borrow().pending.is_some()
    }

    /// Updates waiting to be merged, oldest first.
    pub fn pending_updates(&self) -> Vec<Update<M>> {
        let pending = self.inner.borrow().pending;
        self.collect(pending)
    }

    /// Most urgent priority waiting in the pending list, or `NO_WORK`.
    pub fn pending_priority(&self) -> ExpirationTime {
        let arena = self.inner.borrow();
        let Some(tail) = arena.pending else {
            return ExpirationTime::NO_WORK;
        };
        arena
            .ring(tail)
            .into_iter()
            .map(|id| arena.nodes[id.0].update.priority)
            .max()
            .unwrap_or(ExpirationTime::NO_WORK)
    }

    /// Whether both handles alias the same slot.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of node slots in the arena, live or released.
    pub fn allocated(&self) -> usize {
        self.inner.borrow().nodes.len()
    }

    /// Number of node slots holding an update.
    pub fn live(&self) -> usize {
        let arena = self.inner.borrow();
        arena.nodes.len() - arena.free.len()
    }

    /// Updates of the list ending at `tail`, oldest first.
    pub(crate) fn collect(&self, tail: Option<UpdateId>) -> Vec<Update<M>> {
        let Some(tail) = tail else {
            return Vec::new();
        };
        let arena = self.inner.borrow();
        arena
            .ring(tail)
            .into_iter()
            .map(|id| arena.nodes[id.0].update.clone())
            .collect()
    }

    pub(crate) fn take_pending(&self) -> Option<UpdateId> {
        self.inner.borrow_mut().pending.take()
    }

    pub(crate) fn entry(&self, id: UpdateId) -> (Update<M>, Serial) {
        let arena = self.inner.borrow();
        let node = &arena.nodes[id.0];
        (node.update.clone(), node.serial)
    }

    pub(crate) fn next(&self, id: UpdateId) -> UpdateId {
        self.inner.borrow().next(id)
    }

    /// Join the circular list ending at `pending` after the one ending at
    /// `base`, preserving the order of both. Returns the joined tail.
    pub(crate) fn splice(&self, base: Option<UpdateId>, pending: UpdateId) -> UpdateId {
        let mut arena = self.inner.borrow_mut();
        if let Some(base) = base {
            let base_first = arena.next(base);
            let pending_first = arena.next(pending);
            arena.set_next(base, pending_first);
            arena.set_next(pending, base_first);
        }
        pending
    }

    /// Append one new update to the list ending at `tail`.
    pub(crate) fn append(&self, tail: Option<UpdateId>, update: Update<M>) -> UpdateId {
        let mut arena = self.inner.borrow_mut();
        let serial = arena.fresh_serial();
        let id = arena.alloc(update, serial);
        arena.append(tail, id)
    }

    /// Copy the list ending at `tail` into fresh nodes.
    pub(crate) fn copy_ring(&self, tail: UpdateId) -> UpdateId {
        let mut arena = self.inner.borrow_mut();
        let copies: Vec<UpdateId> = arena
            .ring(tail)
            .into_iter()
            .map(|id| arena.copy(id))
            .collect();
        // A ring always has at least its tail.
        arena.link(&copies).unwrap_or(tail)
    }

    /// Replace the ring ending at `old` with `residual`, returning the new tail.
    ///
    /// With `in_place`, the old ring belongs to the caller alone: kept nodes
    /// are relinked and every other node of it is released. Otherwise the
    /// old ring is left intact and kept updates are copied.
    pub(crate) fn rebuild(
        &self,
        old: UpdateId,
        residual: Vec<Residual<M>>,
        in_place: bool,
    ) -> Option<UpdateId> {
        let mut arena = self.inner.borrow_mut();
        if in_place {
            // Kept nodes appear in ring order.
            let mut kept = residual
                .iter()
                .filter_map(|entry| match entry {
                    Residual::Kept(id) => Some(*id),
                    Residual::Rebased(..) => None,
                })
                .peekable();
            for id in arena.ring(old) {
                if kept.peek() == Some(&id) {
                    kept.next();
                } else {
                    arena.release(id);
                }
            }
        }

        let ids: Vec<UpdateId> = residual
            .into_iter()
            .map(|entry| match entry {
                Residual::Kept(id) if in_place => id,
                Residual::Kept(id) => arena.copy(id),
                Residual::Rebased(update, serial) => arena.alloc(update, serial),
            })
            .collect();
        arena.link(&ids)
    }

    /// Release every node of the ring ending at `tail`.
    pub(crate) fn release_ring(&self, tail: UpdateId) {
        let mut arena = self.inner.borrow_mut();
        for id in arena.ring(tail) {
            arena.release(id);
        }
    }

    /// Build a new circular list from `updates`, returning its tail.
    #[cfg(test)]
    pub(crate) fn push_ring(&self, updates: Vec<Update<M>>) -> Option<UpdateId> {
        let mut tail = None;
        for update in updates {
            tail = Some(self.append(tail, update));
        }
        tail
    }
}
