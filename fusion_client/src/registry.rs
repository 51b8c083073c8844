//! Correlation registry: matches native completions to waiting callers.
//!
//! Each in-flight operation is identified by a `u64` token. The top 16 bits
//! name the registry that issued it and the low 48 bits are a per-registry
//! sequence, so an `extern "C"` callback can find the right registry through
//! a process-wide directory without any registry being a global itself.
//!
//! A registry id can be handed out again once its registry is gone, but the
//! sequence behind an id is never reset, so a token is never issued twice.
//! Contexts still waiting for a late callback when their registry is dropped
//! are parked in a process-wide orphan table until that callback arrives.
//!
//! A pending entry holds the sending half of a oneshot channel, so the
//! native thread that resolves it never touches the caller's task directly.

use crate::error::{FusionError, Result};
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use tokio::sync::oneshot;

const SEQUENCE_BITS: u32 = 48;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;

/// One registry id. Outlives the registries that held it.
struct DirectorySlot {
    registry: Weak<OperationRegistry>,
    sequence: Arc<AtomicU64>,
    /// Set once the last holder has finished dropping and parked its orphans.
    retired: bool,
}

static DIRECTORY: Lazy<DashMap<u16, DirectorySlot>> = Lazy::new(DashMap::new);
static ORPHANS: Lazy<DashMap<u64, OperationContext>> = Lazy::new(DashMap::new);
static NEXT_REGISTRY_ID: AtomicU16 = AtomicU16::new(1);

/// Auxiliary state a decoder needs to interpret a result.
pub type OperationContext = Arc<dyn Any + Send + Sync>;

struct PendingEntry {
    /// `oneshot::Sender<Result<T>>`, erased. `None` once the caller has
    /// walked away but the context still has to reach the late callback.
    sender: Option<Box<dyn Any + Send + Sync>>,
    context: Option<OperationContext>,
}

/// Concurrent token → pending operation map.
pub struct OperationRegistry {
    id: u16,
    sequence: Arc<AtomicU64>,
    pending: DashMap<u64, PendingEntry>,
}

impl OperationRegistry {
    /// Create a registry and publish it in the process-wide directory.
    ///
    /// Fails only when every one of the 65535 registry ids is in use.
    pub fn new() -> Result<Arc<Self>> {
        for _ in 0..u16::MAX {
            let id = NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed);
            if id == 0 {
                continue;
            }
            if let Some(registry) = Self::claim(id) {
                return Ok(registry);
            }
        }
        Err(FusionError::new(
            crate::ErrorCode::RuntimeError,
            "no free operation registry ids",
        ))
    }

    /// Take `id` if no live registry holds it. A reused id keeps counting
    /// from where its previous holder stopped.
    fn claim(id: u16) -> Option<Arc<Self>> {
        match DIRECTORY.entry(id) {
            MapEntry::Occupied(mut slot) => {
                if slot.get().registry.strong_count() > 0 || !slot.get().retired {
                    return None;
                }
                let sequence = Arc::clone(&slot.get().sequence);
                let registry = Arc::new(Self::with_id(id, Arc::clone(&sequence)));
                slot.insert(DirectorySlot {
                    registry: Arc::downgrade(&registry),
                    sequence,
                    retired: false,
                });
                Some(registry)
            }
            MapEntry::Vacant(slot) => {
                let sequence = Arc::new(AtomicU64::new(1));
                let registry = Arc::new(Self::with_id(id, Arc::clone(&sequence)));
                slot.insert(DirectorySlot {
                    registry: Arc::downgrade(&registry),
                    sequence,
                    retired: false,
                });
                Some(registry)
            }
        }
    }

    fn with_id(id: u16, sequence: Arc<AtomicU64>) -> Self {
        log::debug!("Created operation registry {id}");
        Self {
            id,
            sequence,
            pending: DashMap::new(),
        }
    }

    /// Find the registry that issued `token`, if it is still alive.
    ///
    /// `None` means the registry has finished dropping; any context its
    /// operation left behind is then available through
    /// [`OperationRegistry::take_orphan`].
    pub fn resolve(token: u64) -> Option<Arc<Self>> {
        let id = (token >> SEQUENCE_BITS) as u16;
        loop {
            {
                let slot = DIRECTORY.get(&id)?;
                if let Some(registry) = slot.registry.upgrade() {
                    return Some(registry);
                }
                if slot.retired {
                    return None;
                }
            }
            // The registry is mid-drop and still parking its orphans.
            std::thread::yield_now();
        }
    }

    /// Remove and return the context a dropped registry left for `token`.
    pub(crate) fn take_orphan(token: u64) -> Option<OperationContext> {
        ORPHANS.remove(&token).map(|(_, context)| context)
    }

    /// Number of operations still registered.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// `true` if nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Register an operation that produces a `T`.
    pub fn create<T: Send + 'static>(self: &Arc<Self>) -> (u64, PendingOperation<T>) {
        self.register(None)
    }

    /// Register an operation along with state its decoder will look up
    /// through [`OperationRegistry::get_context`].
    pub fn create_with_context<T, C>(self: &Arc<Self>, context: Arc<C>) -> (u64, PendingOperation<T>)
    where
        T: Send + 'static,
        C: Any + Send + Sync,
    {
        self.register(Some(context))
    }

    pub(crate) fn register<T: Send + 'static>(
        self: &Arc<Self>,
        context: Option<OperationContext>,
    ) -> (u64, PendingOperation<T>) {
        let (tx, rx) = oneshot::channel::<Result<T>>();
        let entry = PendingEntry {
            sender: Some(Box::new(tx)),
            context,
        };
        loop {
            let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) & SEQUENCE_MASK;
            if sequence == 0 {
                continue;
            }
            let token = (u64::from(self.id) << SEQUENCE_BITS) | sequence;
            match self.pending.entry(token) {
                MapEntry::Vacant(slot) => {
                    slot.insert(entry);
                    let pending = PendingOperation {
                        token,
                        receiver: rx,
                        registry: Arc::clone(self),
                        settled: false,
                    };
                    return (token, pending);
                }
                MapEntry::Occupied(_) => {
                    // Only possible after the sequence wraps; try the next one.
                    log::warn!("Token {token:#x} still in flight, skipping");
                }
            }
        }
    }

    /// Look up the context stored with `token` without removing anything.
    /// Falls back to the orphan table for tokens issued by an earlier
    /// holder of this registry's id.
    pub fn get_context<C: Any + Send + Sync>(&self, token: u64) -> Option<Arc<C>> {
        let context = match self.pending.get(&token) {
            Some(entry) => entry.context.clone()?,
            None => ORPHANS.get(&token).map(|orphan| Arc::clone(orphan.value()))?,
        };
        context.downcast::<C>().ok()
    }

    /// Remove an operation whose dispatch failed. The native side never saw
    /// the token, so nothing will ever complete it.
    pub fn abort(&self, token: u64) -> bool {
        let removed = self.pending.remove(&token).is_some();
        if removed {
            log::debug!("Aborted token {token:#x}");
        }
        removed
    }

    /// The caller stopped waiting. Entries without context are dropped at
    /// once; entries with context stay (without a receiver) so the late
    /// callback can still reach it, and are removed when it arrives.
    fn detach(&self, token: u64) {
        let keep = match self.pending.get_mut(&token) {
            Some(mut entry) => {
                entry.sender = None;
                entry.context.is_some()
            }
            None => return,
        };
        if !keep {
            self.pending.remove(&token);
        }
        log::debug!("Caller detached from token {token:#x}");
    }

    fn take_sender<T: Send + 'static>(&self, token: u64) -> Option<oneshot::Sender<Result<T>>> {
        let Some((_, entry)) = self.pending.remove(&token) else {
            Self::take_orphan(token);
            return None;
        };
        let sender = entry.sender?;
        match sender.downcast::<oneshot::Sender<Result<T>>>() {
            Ok(sender) => Some(*sender),
            Err(_) => {
                log::error!(
                    "Token {token:#x} completed as {} but was registered with another type; dropping",
                    std::any::type_name::<T>()
                );
                None
            }
        }
    }

    /// Resolve `token` with a value. Returns the value back if nobody
    /// received it (absent token, detached caller, or type mismatch).
    pub fn complete_result<T: Send + 'static>(&self, token: u64, value: T) -> std::result::Result<(), T> {
        let Some(sender) = self.take_sender::<T>(token) else {
            return Err(value);
        };
        match sender.send(Ok(value)) {
            Ok(()) => Ok(()),
            Err(Ok(value)) => Err(value),
            Err(Err(_)) => Ok(()),
        }
    }

    /// Resolve `token` with a failure. Returns `false` if nobody received it.
    pub fn complete_error<T: Send + 'static>(&self, token: u64, error: FusionError) -> bool {
        match self.take_sender::<T>(token) {
            Some(sender) => sender.send(Err(error)).is_ok(),
            None => {
                log::debug!("Dropping error for token {token:#x}: {error}");
                false
            }
        }
    }

    /// Resolve a `()` operation, successfully or not.
    pub fn complete_void(&self, token: u64, error: Option<FusionError>) -> bool {
        match error {
            None => self.complete_result(token, ()).is_ok(),
            Some(error) => self.complete_error::<()>(token, error),
        }
    }
}

impl Drop for OperationRegistry {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            log::warn!("Registry {} dropped with {} operations in flight", self.id, self.pending.len());
        }
        for (token, entry) in std::mem::take(&mut self.pending) {
            if let Some(context) = entry.context {
                ORPHANS.insert(token, context);
            }
        }
        if let Some(mut slot) = DIRECTORY.get_mut(&self.id) {
            if slot.registry.strong_count() == 0 {
                slot.retired = true;
            }
        }
    }
}

/// The caller's half of a registered operation. Await it for the result;
/// drop it to walk away (the eventual callback becomes a no-op).
pub struct PendingOperation<T> {
    token: u64,
    receiver: oneshot::Receiver<Result<T>>,
    registry: Arc<OperationRegistry>,
    settled: bool,
}

impl<T> PendingOperation<T> {
    /// The correlation token to hand to the native side.
    pub fn token(&self) -> u64 {
        self.token
    }
}

impl<T> Future for PendingOperation<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let token = self.token;
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(outcome) => {
                self.settled = true;
                Poll::Ready(outcome.unwrap_or_else(|_| Err(FusionError::abandoned(token))))
            }
        }
    }
}

impl<T> Drop for PendingOperation<T> {
    fn drop(&mut self) {
        if !self.settled {
            self.registry.detach(self.token);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorCode;
    use std::collections::HashSet;

    #[test]
    fn concurrent_creates_yield_distinct_tokens() {
        let registry = OperationRegistry::new().unwrap();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    (0..1000)
                        .map(|_| {
                            let (token, pending) = registry.create::<u64>();
                            std::mem::forget(pending);
                            token
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let mut all = HashSet::new();
        for handle in handles {
            for token in handle.join().unwrap() {
                assert!(all.insert(token), "duplicate token {token:#x}");
            }
        }
        assert_eq!(all.len(), 8000);
        assert_eq!(registry.len(), 8000);
    }

    #[test]
    fn tokens_resolve_to_their_registry() {
        let first = OperationRegistry::new().unwrap();
        let second = OperationRegistry::new().unwrap();
        let (a, _pa) = first.create::<()>();
        let (b, _pb) = second.create::<()>();
        assert!(Arc::ptr_eq(&OperationRegistry::resolve(a).unwrap(), &first));
        assert!(Arc::ptr_eq(&OperationRegistry::resolve(b).unwrap(), &second));
        assert!(a < first.create::<()>().0, "tokens increase");
    }

    #[tokio::test]
    async fn second_completion_is_a_no_op() {
        let registry = OperationRegistry::new().unwrap();
        let (token, pending) = registry.create::<u64>();
        assert!(registry.complete_result(token, 7u64).is_ok());
        assert_eq!(registry.complete_result(token, 8u64), Err(8));
        assert!(!registry.complete_error::<u64>(token, FusionError::decode("late")));
        assert_eq!(pending.await.unwrap(), 7);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn aborted_token_ignores_callbacks() {
        let registry = OperationRegistry::new().unwrap();
        let (token, pending) = registry.create::<u64>();
        assert!(registry.abort(token));
        assert!(!registry.abort(token));
        assert_eq!(registry.complete_result(token, 1u64), Err(1));
        assert!(!registry.complete_void(token, None));
        let error = pending.await.unwrap_err();
        assert_eq!(error.code(), ErrorCode::Abandoned);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn mismatched_completion_type_is_dropped() {
        let registry = OperationRegistry::new().unwrap();
        let (token, pending) = registry.create::<u64>();
        assert_eq!(registry.complete_result(token, "text".to_string()), Err("text".to_string()));
        assert_eq!(pending.await.unwrap_err().code(), ErrorCode::Abandoned);
    }

    #[test]
    fn context_is_visible_until_completion() {
        let registry = OperationRegistry::new().unwrap();
        let (token, _pending) = registry.create_with_context::<u64, String>(Arc::new("schema".to_string()));
        assert_eq!(registry.get_context::<String>(token).as_deref().map(String::as_str), Some("schema"));
        assert!(registry.get_context::<u32>(token).is_none());
        assert!(registry.complete_result(token, 1u64).is_ok());
        assert!(registry.get_context::<String>(token).is_none());
    }

    #[test]
    fn dropped_caller_leaves_context_for_the_late_callback() {
        let registry = OperationRegistry::new().unwrap();

        let (plain, pending) = registry.create::<u64>();
        drop(pending);
        assert!(registry.is_empty());
        assert_eq!(registry.complete_result(plain, 3u64), Err(3));

        let (token, pending) = registry.create_with_context::<u64, u32>(Arc::new(5));
        drop(pending);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get_context::<u32>(token).as_deref(), Some(&5));
        assert_eq!(registry.complete_result(token, 9u64), Err(9));
        assert!(registry.is_empty());
    }

    #[test]
    fn reused_id_never_reissues_a_token() {
        let first = OperationRegistry::new().unwrap();
        let id = first.id;
        let (old_token, pending) = first.create::<u64>();
        drop(pending);
        assert!(OperationRegistry::claim(id).is_none(), "id still held");
        drop(first);

        let second = OperationRegistry::claim(id).unwrap();
        let (new_token, _pending) = second.create::<u64>();
        assert_eq!(new_token >> SEQUENCE_BITS, old_token >> SEQUENCE_BITS);
        assert!(new_token > old_token);
        assert!(Arc::ptr_eq(&OperationRegistry::resolve(old_token).unwrap(), &second));
        assert_eq!(second.complete_result(old_token, 1u64), Err(1));
        assert_eq!(second.len(), 1);
    }

    #[test]
    fn dropped_registry_parks_waiting_contexts() {
        let registry = OperationRegistry::new().unwrap();
        let (token, pending) = registry.create_with_context::<u64, u32>(Arc::new(11));
        drop(pending);
        drop(registry);

        assert!(OperationRegistry::resolve(token).is_none());
        let context = OperationRegistry::take_orphan(token).unwrap();
        assert_eq!(context.downcast::<u32>().ok().as_deref(), Some(&11));
        assert!(OperationRegistry::take_orphan(token).is_none());
    }
}
