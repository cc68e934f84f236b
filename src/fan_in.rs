//! Counted fan-in for one aggregate node.
//!
//! A node is created once its child count is known. Each child owns a slot
//! index and completes it exactly once; the node finalizes when the atomic
//! remaining-count reaches zero, yielding the children in slot order.
//!
//! ```text
//! Pending -> AwaitingChildren(n) -> Finalized
//! ```
//!
//! `n = 0` is finalized at construction.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::oneshot;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanInError {
    #[error("every completer was dropped with {remaining} children outstanding")]
    Abandoned { remaining: usize },
}

struct Node<T> {
    slots: Mutex<Vec<Option<T>>>,
    remaining: Arc<AtomicUsize>,
    finalized: Mutex<Option<oneshot::Sender<Vec<T>>>>,
}

/// Waiting half, held by the parent.
pub struct FanIn<T> {
    rx: oneshot::Receiver<Vec<T>>,
    remaining: Arc<AtomicUsize>,
}

/// Completing half, cloned into each child.
pub struct Completer<T> {
    node: Arc<Node<T>>,
}

impl<T> Clone for Completer<T> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
        }
    }
}

fn lock<U>(m: &Mutex<U>) -> MutexGuard<'_, U> {
    m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl<T: Send + 'static> FanIn<T> {
    pub fn new(children: usize) -> (Self, Completer<T>) {
        let (tx, rx) = oneshot::channel();
        let remaining = Arc::new(AtomicUsize::new(children));
        let node = Arc::new(Node {
            slots: Mutex::new(std::iter::repeat_with(|| None).take(children).collect()),
            remaining: Arc::clone(&remaining),
            finalized: Mutex::new(Some(tx)),
        });

        if children == 0 {
            finalize(&node);
        }

        (Self { rx, remaining }, Completer { node })
    }

    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    /// Resolve once every slot has been completed.
    pub async fn wait(self) -> Result<Vec<T>, FanInError> {
        let Self { rx, remaining } = self;
        rx.await.map_err(|_| FanInError::Abandoned {
            remaining: remaining.load(Ordering::Acquire),
        })
    }
}

impl<T> Completer<T> {
    /// Fill `slot`. Returns `false`, leaving the node untouched, when the
    /// slot is out of range or was already completed.
    pub fn complete(&self, slot: usize, value: T) -> bool {
        {
            let mut slots = lock(&self.node.slots);
            match slots.get_mut(slot) {
                None => {
                    tracing::warn!(slot, len = slots.len(), "fan-in completion for unknown slot");
                    return false;
                }
                Some(Some(_)) => {
                    tracing::warn!(slot, "duplicate fan-in completion ignored");
                    return false;
                }
                Some(cell) => *cell = Some(value),
            }
        }

        if self.node.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            finalize(&self.node);
        }
        true
    }
}

fn finalize<T>(node: &Node<T>) {
    let Some(tx) = lock(&node.finalized).take() else {
        return;
    };
    let children: Vec<T> = lock(&node.slots).drain(..).flatten().collect();
    // The parent may have gone away; nothing left to tell.
    let _ = tx.send(children);
}
