//! Context token table.
//!
//! Native callbacks receive a single pointer-sized "user data" value. The
//! bridge hands out [`ContextToken`]s as that value and resolves them back
//! to their owner through a fixed-capacity slot table, so a callback never
//! follows a raw pointer into Rust memory.
//!
//! A token packs a slot index and a generation. Unregistering clears the
//! slot generation with one atomic store, after which every lookup with the
//! old token fails, and then waits for lookups already in progress on that
//! slot to finish. Slot reuse bumps the generation, so a stale token can
//! never resolve to a new owner.

use std::cell::Cell;
use std::ffi::c_void;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use crate::error::{Error, Reason, Result};

const INDEX_BITS: u32 = usize::BITS / 2;
const INDEX_MASK: usize = (1 << INDEX_BITS) - 1;
const GENERATION_MAX: usize = usize::MAX >> INDEX_BITS;

/// Opaque callback user data.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextToken(usize);

impl ContextToken {
    const fn new(index: usize, generation: usize) -> Self {
        Self((generation << INDEX_BITS) | index)
    }

    pub const fn index(self) -> usize {
        self.0 & INDEX_MASK
    }

    pub const fn generation(self) -> usize {
        self.0 >> INDEX_BITS
    }

    pub const fn as_raw(self) -> usize {
        self.0
    }

    pub const fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    /// The value handed to native code.
    pub fn as_user_data(self) -> *mut c_void {
        self.0 as *mut c_void
    }

    pub fn from_user_data(user_data: *mut c_void) -> Self {
        Self(user_data as usize)
    }
}

impl fmt::Debug for ContextToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContextToken({}@{})", self.index(), self.generation())
    }
}

const fn next_generation(generation: usize) -> usize {
    if generation >= GENERATION_MAX {
        1
    } else {
        generation + 1
    }
}

// Tokens currently being dispatched on this thread, innermost last.
// Fixed depth so entering a dispatch never allocates; deeper dispatches
// are refused.
const MAX_NESTING: usize = 8;

thread_local! {
    static DISPATCH_STACK: Cell<([usize; MAX_NESTING], usize)> =
        const { Cell::new(([0; MAX_NESTING], 0)) };
}

struct DispatchScope;

impl DispatchScope {
    /// `None` when the stack is full. An unrecorded dispatch could not
    /// tell a reentrant `unregister` apart from a foreign one.
    fn enter(token: ContextToken) -> Option<Self> {
        DISPATCH_STACK.with(|cell| {
            let (mut stack, depth) = cell.get();
            if depth >= MAX_NESTING {
                return None;
            }
            stack[depth] = token.as_raw();
            cell.set((stack, depth + 1));
            Some(Self)
        })
    }

    fn contains(token: ContextToken) -> bool {
        DISPATCH_STACK.with(|cell| {
            let (stack, depth) = cell.get();
            stack[..depth].contains(&token.as_raw())
        })
    }
}

impl Drop for DispatchScope {
    fn drop(&mut self) {
        DISPATCH_STACK.with(|cell| {
            let (stack, depth) = cell.get();
            cell.set((stack, depth.saturating_sub(1)));
        });
    }
}

struct Slot<T> {
    /// Generation of the live token, 0 while vacant.
    generation: AtomicUsize,
    /// Last generation handed out from this slot.
    issued: AtomicUsize,
    owner: RwLock<Option<Weak<T>>>,
    /// Set when the token was unregistered from inside its own dispatch.
    reclaim: AtomicBool,
}

impl<T> Slot<T> {
    fn new() -> Self {
        Self {
            generation: AtomicUsize::new(0),
            issued: AtomicUsize::new(0),
            owner: RwLock::new(None),
            reclaim: AtomicBool::new(false),
        }
    }
}

/// Fixed-capacity map from token to weak owner.
pub struct ContextTable<T> {
    slots: Box<[Slot<T>]>,
    free: Mutex<Vec<usize>>,
}

impl<T> ContextTable<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.min(INDEX_MASK);
        let slots = (0..capacity).map(|_| Slot::new()).collect();
        Self {
            slots,
            free: Mutex::new((0..capacity).rev().collect()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of registered tokens.
    pub fn live_count(&self) -> usize {
        self.capacity() - self.free.lock().len()
    }

    /// Register an owner and return its token.
    pub fn register(&self, owner: &Arc<T>) -> Result<ContextToken> {
        let index = self
            .free
            .lock()
            .pop()
            .ok_or(Error::Fatal(Reason::TokenTableFull))?;
        let slot = &self.slots[index];

        let generation = next_generation(slot.issued.load(Ordering::Relaxed));
        slot.issued.store(generation, Ordering::Relaxed);
        slot.reclaim.store(false, Ordering::Relaxed);
        *slot.owner.write() = Some(Arc::downgrade(owner));
        slot.generation.store(generation, Ordering::Release);

        Ok(ContextToken::new(index, generation))
    }

    fn slot(&self, token: ContextToken) -> Option<&Slot<T>> {
        if token.generation() == 0 {
            return None;
        }
        let slot = self.slots.get(token.index())?;
        (slot.generation.load(Ordering::Acquire) == token.generation()).then_some(slot)
    }

    /// Look up the owner of a live token.
    pub fn resolve(&self, token: ContextToken) -> Option<Weak<T>> {
        let slot = self.slot(token)?;
        let owner = slot.owner.read();
        if slot.generation.load(Ordering::Acquire) != token.generation() {
            return None;
        }
        owner.clone()
    }

    /// Run `f` against the owner of `token`.
    ///
    /// Never blocks: if the slot is being torn down, or dispatches on this
    /// thread are already nested too deeply, the call is treated as a miss. While `f` runs, [`unregister`](Self::unregister) for the same
    /// token on another thread waits for it to return.
    pub fn dispatch<R>(&self, token: ContextToken, f: impl FnOnce(&T) -> R) -> Option<R> {
        let slot = self.slot(token)?;
        let result = {
            let guard = slot.owner.try_read()?;
            if slot.generation.load(Ordering::Acquire) != token.generation() {
                return None;
            }
            let owner = guard.as_ref()?.upgrade()?;
            let _scope = DispatchScope::enter(token)?;
            f(&owner)
        };
        if slot.reclaim.swap(false, Ordering::AcqRel) {
            self.release(token.index());
        }
        Some(result)
    }

    /// Invalidate a token.
    ///
    /// Returns `false` if the token was not live. On return, no lookup can
    /// resolve the token any more and no dispatch of it is running on
    /// another thread. Called from inside the token's own dispatch, the slot
    /// is reclaimed when that dispatch returns.
    pub fn unregister(&self, token: ContextToken) -> bool {
        if token.generation() == 0 {
            return false;
        }
        let Some(slot) = self.slots.get(token.index()) else {
            return false;
        };
        if slot
            .generation
            .compare_exchange(token.generation(), 0, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        if DispatchScope::contains(token) {
            slot.reclaim.store(true, Ordering::Release);
        } else {
            self.release(token.index());
        }
        true
    }

    fn release(&self, index: usize) {
        // Waits for in-flight dispatches holding the read lock.
        *self.slots[index].owner.write() = None;
        self.free.lock().push(index);
    }
}

impl<T> fmt::Debug for ContextTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextTable")
            .field("capacity", &self.capacity())
            .finish_non_exhaustive()
    }
}
