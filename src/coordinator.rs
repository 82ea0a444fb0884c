// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Single-flight operation slots
//!
//! Each [`Slot`] holds at most one occupant. Starting an operation in a slot
//! cancels the previous occupant before the new one is constructed, and an
//! operation commits its result only while it is still the occupant. Both
//! steps happen inside the slot table's critical section, so a superseded
//! operation can never publish after its successor has started.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

/// Logical lanes of work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Upload,
    Ask,
}

impl Slot {
    pub const ALL: [Slot; 2] = [Slot::Upload, Slot::Ask];

    pub fn as_str(&self) -> &'static str {
        match self {
            Slot::Upload => "upload",
            Slot::Ask => "ask",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationId(u64);

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op-{}", self.0)
    }
}

struct Occupant {
    id: OperationId,
    token: CancellationToken,
}

#[derive(Default)]
struct SlotTable {
    next_id: u64,
    slots: HashMap<Slot, Occupant>,
}

impl SlotTable {
    fn is_occupant(&self, slot: Slot, id: OperationId) -> bool {
        self.slots.get(&slot).is_some_and(|o| o.id == id)
    }

    fn evict(&mut self, slot: Slot) -> bool {
        match self.slots.remove(&slot) {
            Some(occupant) => {
                occupant.token.cancel();
                tracing::debug!(
                    target: "contract_chat.coordinator",
                    %slot,
                    id = %occupant.id,
                    "cancelled occupant"
                );
                true
            }
            None => false,
        }
    }
}

/// How a settled operation ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion<R> {
    /// The operation was still current and its result was committed
    Finished(R),
    /// The operation was cancelled or superseded; its result was dropped
    Discarded,
}

impl<R> Completion<R> {
    pub fn is_discarded(&self) -> bool {
        matches!(self, Completion::Discarded)
    }

    pub fn finished(self) -> Option<R> {
        match self {
            Completion::Finished(value) => Some(value),
            Completion::Discarded => None,
        }
    }
}

/// Owns the slot table
#[derive(Clone, Default)]
pub struct OperationCoordinator {
    table: Arc<Mutex<SlotTable>>,
}

impl OperationCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SlotTable> {
        match self.table.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("Slot table lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Replace the occupant of `slot` with a new operation.
    ///
    /// The previous occupant's token is cancelled first. `factory` then runs
    /// inside the same critical section with the new operation's token; any
    /// synchronous work it does before returning its future is therefore
    /// ordered after the eviction and before any later `run_exclusive`.
    pub fn run_exclusive<'a, T, F, Fut>(&self, slot: Slot, factory: F) -> OperationHandle<'a, T>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = T> + Send + 'a,
    {
        let mut table = self.lock();
        table.evict(slot);

        table.next_id += 1;
        let id = OperationId(table.next_id);
        let token = CancellationToken::new();
        table.slots.insert(
            slot,
            Occupant {
                id,
                token: token.clone(),
            },
        );
        tracing::debug!(target: "contract_chat.coordinator", %slot, %id, "installed occupant");

        let future = factory(token.clone());
        drop(table);

        OperationHandle {
            lease: SlotLease {
                coordinator: self.clone(),
                slot,
                id,
                on_abandon: None,
            },
            token,
            future: Box::pin(future),
        }
    }

    /// Cancel the occupant of `slot`. Idempotent; returns whether there was one.
    pub fn cancel(&self, slot: Slot) -> bool {
        self.cancel_with(&[slot], |cancelled| cancelled > 0)
    }

    /// Cancel the occupants of `slots`, then run `cleanup` (with the number
    /// of occupants cancelled) inside the same critical section.
    pub fn cancel_with<R>(&self, slots: &[Slot], cleanup: impl FnOnce(usize) -> R) -> R {
        let mut table = self.lock();
        let cancelled = slots.iter().filter(|slot| table.evict(**slot)).count();
        cleanup(cancelled)
    }

    pub fn is_busy(&self, slot: Slot) -> bool {
        self.lock().slots.contains_key(&slot)
    }

    /// Id of the current occupant of `slot`
    pub fn current(&self, slot: Slot) -> Option<OperationId> {
        self.lock().slots.get(&slot).map(|o| o.id)
    }
}

type AbandonHook = Box<dyn FnOnce() + Send + 'static>;

/// Clears the slot on drop, but only while this operation still occupies it.
///
/// A lease dropped before `settle` finished runs its abandon hook after the
/// slot is released, outside the table lock.
struct SlotLease {
    coordinator: OperationCoordinator,
    slot: Slot,
    id: OperationId,
    on_abandon: Option<AbandonHook>,
}

impl Drop for SlotLease {
    fn drop(&mut self) {
        {
            let mut table = self.coordinator.lock();
            if table.is_occupant(self.slot, self.id) {
                if let Some(occupant) = table.slots.remove(&self.slot) {
                    occupant.token.cancel();
                }
            }
        }
        if let Some(hook) = self.on_abandon.take() {
            tracing::debug!(
                target: "contract_chat.coordinator",
                slot = %self.slot,
                id = %self.id,
                "operation abandoned before settling"
            );
            hook();
        }
    }
}

/// An operation installed in a slot
pub struct OperationHandle<'a, T> {
    lease: SlotLease,
    token: CancellationToken,
    future: Pin<Box<dyn Future<Output = T> + Send + 'a>>,
}

impl<'a, T> OperationHandle<'a, T> {
    pub fn id(&self) -> OperationId {
        self.lease.id
    }

    pub fn slot(&self) -> Slot {
        self.lease.slot
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Run `hook` if this handle is dropped before `settle` completes, e.g.
    /// when the task driving it is aborted. The slot is already released when
    /// the hook runs, so it may lock the caller's own state.
    pub fn on_abandon(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.lease.on_abandon = Some(Box::new(hook));
        self
    }

    /// Still the occupant and not cancelled
    pub fn is_current(&self) -> bool {
        !self.token.is_cancelled()
            && self
                .lease
                .coordinator
                .lock()
                .is_occupant(self.lease.slot, self.lease.id)
    }

    /// Drive the operation to completion, then commit its result.
    ///
    /// `commit` runs inside the coordinator's critical section and only when
    /// this operation is still the occupant and was not cancelled. The slot is
    /// cleared afterwards. It must not call back into the coordinator.
    pub async fn settle<R>(self, commit: impl FnOnce(T) -> R) -> Completion<R> {
        let OperationHandle {
            mut lease,
            token,
            future,
        } = self;

        let value = future.await;

        let mut table = lease.coordinator.lock();
        let current = table.is_occupant(lease.slot, lease.id);
        let completion = if current && !token.is_cancelled() {
            Completion::Finished(commit(value))
        } else {
            tracing::debug!(
                target: "contract_chat.coordinator",
                slot = %lease.slot,
                id = %lease.id,
                "discarding result of superseded operation"
            );
            Completion::Discarded
        };
        if current {
            table.slots.remove(&lease.slot);
        }
        drop(table);
        lease.on_abandon = None;

        completion
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn test_settle_commits_and_clears() {
        let coordinator = OperationCoordinator::new();
        let handle = coordinator.run_exclusive(Slot::Ask, |_| async { 42 });
        assert!(coordinator.is_busy(Slot::Ask));

        let completion = handle.settle(|v| v + 1).await;

        assert_eq!(completion, Completion::Finished(43));
        assert!(!coordinator.is_busy(Slot::Ask));
    }

    #[tokio::test]
    async fn test_new_occupant_cancels_previous_before_factory() {
        let coordinator = OperationCoordinator::new();
        let first = coordinator.run_exclusive(Slot::Ask, |_| async { "x" });
        let first_token = first.token().clone();

        let saw_cancelled = Arc::new(AtomicBool::new(false));
        let seen = saw_cancelled.clone();
        let second = coordinator.run_exclusive(Slot::Ask, move |_| {
            seen.store(first_token.is_cancelled(), Ordering::SeqCst);
            async { "y" }
        });

        assert!(saw_cancelled.load(Ordering::SeqCst));
        assert!(!first.is_current());
        assert!(second.is_current());

        let mut committed = Vec::new();
        assert!(first.settle(|v| committed.push(v)).await.is_discarded());
        assert!(coordinator.is_busy(Slot::Ask));
        second.settle(|v| committed.push(v)).await;

        assert_eq!(committed, vec!["y"]);
        assert!(!coordinator.is_busy(Slot::Ask));
    }

    #[tokio::test]
    async fn test_abandon_hook_runs_after_slot_released() {
        let coordinator = OperationCoordinator::new();
        let released = Arc::new(AtomicBool::new(false));

        let observer = coordinator.clone();
        let seen = released.clone();
        let handle = coordinator
            .run_exclusive(Slot::Ask, |_| std::future::pending::<()>())
            .on_abandon(move || seen.store(!observer.is_busy(Slot::Ask), Ordering::SeqCst));
        let token = handle.token().clone();

        let task = tokio::spawn(handle.settle(|_| ()));
        tokio::task::yield_now().await;
        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        assert!(released.load(Ordering::SeqCst));
        assert!(token.is_cancelled());
        assert!(!coordinator.is_busy(Slot::Ask));
    }

    #[tokio::test]
    async fn test_abandon_hook_skipped_when_settled() {
        let coordinator = OperationCoordinator::new();
        let fired = Arc::new(AtomicBool::new(false));

        let seen = fired.clone();
        let handle = coordinator
            .run_exclusive(Slot::Upload, |_| async { 7 })
            .on_abandon(move || seen.store(true, Ordering::SeqCst));
        assert_eq!(handle.settle(|v| v).await, Completion::Finished(7));

        let superseded = coordinator
            .run_exclusive(Slot::Upload, |_| async { 1 })
            .on_abandon({
                let seen = fired.clone();
                move || seen.store(true, Ordering::SeqCst)
            });
        let _successor = coordinator.run_exclusive(Slot::Upload, |_| async { 2 });
        assert!(superseded.settle(|v| v).await.is_discarded());

        assert!(!fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_superseded_drop_keeps_successor() {
        let coordinator = OperationCoordinator::new();
        let first = coordinator.run_exclusive(Slot::Upload, |_| async {});
        let second = coordinator.run_exclusive(Slot::Upload, |_| async {});

        drop(first);

        assert_eq!(coordinator.current(Slot::Upload), Some(second.id()));
        drop(second);
        assert!(!coordinator.is_busy(Slot::Upload));
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent_and_discards() {
        let coordinator = OperationCoordinator::new();
        let handle = coordinator.run_exclusive(Slot::Ask, |token| async move {
            token.cancelled().await;
            "late"
        });

        assert!(coordinator.cancel(Slot::Ask));
        assert!(!coordinator.cancel(Slot::Ask));
        assert!(!coordinator.is_busy(Slot::Ask));

        let completion = handle.settle(|v| v).await;
        assert!(completion.is_discarded());
    }

    #[tokio::test]
    async fn test_slots_are_independent() {
        let coordinator = OperationCoordinator::new();
        let upload = coordinator.run_exclusive(Slot::Upload, |_| async {});
        let _ask = coordinator.run_exclusive(Slot::Ask, |_| async {});

        assert!(upload.is_current());
        let cancelled = coordinator.cancel_with(&Slot::ALL, |n| n);
        assert_eq!(cancelled, 2);
        assert!(!upload.is_current());
    }
}
