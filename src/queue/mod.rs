//! Pending request queue.
//!
//! Requests live in an arena and are addressed by generation-checked [`RequestHandle`]s.
//! Requests waiting for the external specializer are threaded onto an index-linked doubly
//! linked list, newest first. Insertion at the head and removal by handle are both O(1).
//!
//! A request submitted after specialization is stored *detached*: it occupies an arena slot
//! (so the caller still owns it through a handle) but is never linked into the list.
//! [`RequestQueue::release`] handles both kinds, and a stale handle is rejected instead of
//! freeing a slot twice.
//!
//! # Examples
//!
//! ```rust
//! use specreq::{queue::RequestQueue, Request, SpecializedSlot};
//!
//! fn id(value: u32) -> u32 {
//!     value
//! }
//!
//! let slot = SpecializedSlot::<fn(u32) -> u32>::new();
//! let mut queue = RequestQueue::new();
//! let first = queue.push_front(Request::new(1, id as fn(u32) -> u32, vec![], &slot))?;
//! let second = queue.push_front(Request::new(2, id as fn(u32) -> u32, vec![], &slot))?;
//!
//! assert_eq!(queue.head(), Some(second));
//! assert!(queue.release(first).is_some());
//! assert!(queue.release(first).is_none());
//! assert_eq!(queue.len(), 1);
//! # Ok::<(), specreq::Error>(())
//! ```

use std::fmt;

use crate::{Request, Result};

/// Owning reference to a request stored in a [`RequestQueue`].
///
/// Handles are invalidated by [`RequestQueue::release`]; the slot may be reused afterwards,
/// but a handle to the released request never matches the new occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestHandle {
    index: usize,
    generation: u32,
}

impl RequestHandle {
    /// Arena slot of the request.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }
}

impl fmt::Display for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

struct Node {
    request: Request,
    next: Option<usize>,
    prev: Option<usize>,
    linked: bool,
}

struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Arena of requests with an intrusive pending list.
#[derive(Default)]
pub struct RequestQueue {
    slots: Vec<Slot>,
    free: Vec<usize>,
    retired: usize,
    head: Option<usize>,
    linked: usize,
}

impl RequestQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Link `request` in at the head of the pending list.
    ///
    /// # Errors
    /// Returns [`crate::Error::AllocationFailed`] if the arena cannot grow; the queue is left
    /// unchanged.
    pub fn push_front(&mut self, request: Request) -> Result<RequestHandle> {
        let old_head = self.head;
        let handle = self.store(Node {
            request,
            next: old_head,
            prev: None,
            linked: true,
        })?;

        if let Some(node) = old_head.and_then(|index| self.node_mut(index)) {
            node.prev = Some(handle.index);
        }
        self.head = Some(handle.index);
        self.linked += 1;
        Ok(handle)
    }

    /// Store `request` without linking it into the pending list.
    ///
    /// # Errors
    /// Returns [`crate::Error::AllocationFailed`] if the arena cannot grow.
    pub fn insert_detached(&mut self, request: Request) -> Result<RequestHandle> {
        self.store(Node {
            request,
            next: None,
            prev: None,
            linked: false,
        })
    }

    /// Unlink the request from wherever it sits and hand it back.
    ///
    /// Returns `None` if `handle` is stale, in which case nothing changes.
    pub fn release(&mut self, handle: RequestHandle) -> Option<Request> {
        let slot = self.slots.get_mut(handle.index)?;
        if slot.generation != handle.generation {
            return None;
        }
        let node = slot.node.take()?;
        // A slot whose generation is exhausted is never reused.
        match slot.generation.checked_add(1) {
            Some(generation) => {
                slot.generation = generation;
                self.free.push(handle.index);
            }
            None => self.retired += 1,
        }

        if node.linked {
            match node.prev {
                Some(prev) => {
                    if let Some(prev) = self.node_mut(prev) {
                        prev.next = node.next;
                    }
                }
                None if self.head == Some(handle.index) => self.head = node.next,
                None => {}
            }
            if let Some(next) = node.next.and_then(|next| self.node_mut(next)) {
                next.prev = node.prev;
            }
            self.linked -= 1;
        }

        Some(node.request)
    }

    /// The request behind `handle`, if it is still live.
    #[must_use]
    pub fn get(&self, handle: RequestHandle) -> Option<&Request> {
        self.live(handle).map(|node| &node.request)
    }

    /// Returns `true` if `handle` is live and linked into the pending list.
    #[must_use]
    pub fn is_linked(&self, handle: RequestHandle) -> bool {
        self.live(handle).is_some_and(|node| node.linked)
    }

    /// Handle of the most recently queued request.
    #[must_use]
    pub fn head(&self) -> Option<RequestHandle> {
        self.head.and_then(|index| self.handle_at(index))
    }

    /// Iterate the pending list from the head.
    #[must_use]
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            queue: self,
            cursor: self.head,
            remaining: self.linked,
        }
    }

    /// Number of requests in the pending list.
    #[must_use]
    pub fn len(&self) -> usize {
        self.linked
    }

    /// Returns `true` if the pending list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Number of requests still owned through a handle, linked or not.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.slots.len() - self.free.len() - self.retired
    }

    /// Walk the pending list and verify its structure.
    ///
    /// Checks that the list is acyclic, that every `prev` link mirrors the `next` link that
    /// reaches it, that every linked request is reachable from the head, and that the head is
    /// empty exactly when no request is linked.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] describing the first violation found.
    pub fn validate(&self) -> Result<()> {
        let mut visited = 0usize;
        let mut prev = None;
        let mut cursor = self.head;

        while let Some(index) = cursor {
            if visited > self.slots.len() {
                return Err(malformed_error!("Pending list contains a cycle"));
            }
            let Some(node) = self.node(index) else {
                return Err(malformed_error!("Pending list links to free slot {}", index));
            };
            if !node.linked {
                return Err(malformed_error!("Detached request {} is linked", index));
            }
            if node.prev != prev {
                return Err(malformed_error!(
                    "Request {} has prev {:?}, expected {:?}",
                    index,
                    node.prev,
                    prev
                ));
            }
            visited += 1;
            prev = Some(index);
            cursor = node.next;
        }

        let linked = self
            .slots
            .iter()
            .filter(|slot| slot.node.as_ref().is_some_and(|node| node.linked))
            .count();
        if visited != linked || linked != self.linked {
            return Err(malformed_error!(
                "{} requests reachable from head, {} linked, {} counted",
                visited,
                linked,
                self.linked
            ));
        }

        Ok(())
    }

    fn store(&mut self, node: Node) -> Result<RequestHandle> {
        if let Some(index) = self.free.pop() {
            if let Some(slot) = self.slots.get_mut(index) {
                slot.node = Some(node);
                return Ok(RequestHandle {
                    index,
                    generation: slot.generation,
                });
            }
        }

        self.slots.try_reserve(1)?;
        // Released slots must always fit back into the free list without reallocating.
        self.free.try_reserve(self.slots.len() + 1)?;
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        Ok(RequestHandle {
            index: self.slots.len() - 1,
            generation: 0,
        })
    }

    fn live(&self, handle: RequestHandle) -> Option<&Node> {
        let slot = self.slots.get(handle.index)?;
        if slot.generation == handle.generation {
            slot.node.as_ref()
        } else {
            None
        }
    }

    fn node(&self, index: usize) -> Option<&Node> {
        self.slots.get(index).and_then(|slot| slot.node.as_ref())
    }

    fn node_mut(&mut self, index: usize) -> Option<&mut Node> {
        self.slots.get_mut(index).and_then(|slot| slot.node.as_mut())
    }

    fn handle_at(&self, index: usize) -> Option<RequestHandle> {
        let slot = self.slots.get(index)?;
        slot.node.as_ref().map(|_| RequestHandle {
            index,
            generation: slot.generation,
        })
    }
}

impl fmt::Debug for RequestQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestQueue")
            .field("pending", &self.linked)
            .field("live", &self.live_count())
            .finish()
    }
}

/// Iterator over the pending list, newest first.
pub struct Iter<'a> {
    queue: &'a RequestQueue,
    cursor: Option<usize>,
    remaining: usize,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (RequestHandle, &'a Request);

    fn next(&mut self) -> Option<Self::Item> {
        // Bounded by the linked count so a corrupted list cannot loop forever.
        if self.remaining == 0 {
            return None;
        }
        let index = self.cursor?;
        let handle = self.queue.handle_at(index)?;
        let node = self.queue.node(index)?;

        self.remaining -= 1;
        self.cursor = node.next;
        Some((handle, &node.request))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}

impl<'a> IntoIterator for &'a RequestQueue {
    type Item = (RequestHandle, &'a Request);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
