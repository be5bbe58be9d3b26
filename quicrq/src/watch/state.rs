use std::{
    future::Future,
    ops::{Deref, DerefMut},
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard},
    task::{Context, Poll, Waker},
};

struct Inner<T> {
    value: T,

    // Bumped on every mutation so pending [Changed] futures know to wake.
    epoch: u64,

    // Wakers parked until the next mutation or half-drop.
    wakers: Vec<Waker>,

    // Number of handle groups (halves) that have been fully dropped.
    dropped: usize,
}

impl<T> Inner<T> {
    fn wake(&mut self) {
        self.epoch += 1;
        for waker in self.wakers.drain(..) {
            waker.wake();
        }
    }
}

struct Shared<T> {
    lock: Mutex<Inner<T>>,
}

// Tracks the liveness of one half; the last clone of a half marks it dropped.
struct Half<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Drop for Half<T> {
    fn drop(&mut self) {
        let mut inner = self.shared.lock.lock().unwrap();
        inner.dropped += 1;

        // Anybody waiting needs to learn that no more changes can arrive.
        let wakers = std::mem::take(&mut inner.wakers);
        drop(inner);

        for waker in wakers {
            waker.wake();
        }
    }
}

/// Shared mutable state, split into two handles so each side can tell when
/// the other goes away.
///
/// Any clone of a handle can read the current value via [State::lock] and
/// wait for the next change via [StateRef::modified]. Mutation goes through
/// [State::lock_mut] or [StateRef::into_mut], which notify all waiters on
/// drop. Once every clone of the *other* half is dropped, mutation is
/// refused (`None`) and [StateRef::modified] returns `None`, since no
/// further changes can be observed.
pub struct State<T> {
    shared: Arc<Shared<T>>,
    half: Arc<Half<T>>,
}

impl<T> State<T> {
    pub fn new(value: T) -> Self {
        let shared = Arc::new(Shared {
            lock: Mutex::new(Inner {
                value,
                epoch: 0,
                wakers: Vec::new(),
                dropped: 0,
            }),
        });

        Self {
            half: Arc::new(Half {
                shared: shared.clone(),
            }),
            shared,
        }
    }

    /// Create the second half, sharing the same underlying value.
    pub fn split(self) -> (Self, Self) {
        let other = Self {
            shared: self.shared.clone(),
            half: Arc::new(Half {
                shared: self.shared.clone(),
            }),
        };

        (self, other)
    }

    /// Acquire a read guard on the state.
    pub fn lock(&self) -> StateRef<'_, T> {
        StateRef {
            guard: self.shared.lock.lock().unwrap(),
            shared: &self.shared,
        }
    }

    /// Acquire a write guard, or `None` if the other half was dropped.
    pub fn lock_mut(&self) -> Option<StateMut<'_, T>> {
        let guard = self.shared.lock.lock().unwrap();
        if guard.dropped > 0 {
            return None;
        }

        Some(StateMut { guard })
    }
}

impl<T> Clone for State<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            half: self.half.clone(),
        }
    }
}

impl<T: Default> Default for State<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// A read guard over the state.
pub struct StateRef<'a, T> {
    guard: MutexGuard<'a, Inner<T>>,
    shared: &'a Arc<Shared<T>>,
}

impl<'a, T> StateRef<'a, T> {
    /// A future that resolves after the next mutation, or `None` if no
    /// further mutations can happen (the other half was dropped).
    ///
    /// The epoch is captured while the guard is held, so a change between
    /// dropping the guard and awaiting the future is not missed.
    pub fn modified(&self) -> Option<Changed<T>> {
        if self.guard.dropped > 0 {
            return None;
        }

        Some(Changed {
            shared: self.shared.clone(),
            epoch: self.guard.epoch,
        })
    }

    /// Upgrade to a write guard, or `None` if the other half was dropped.
    pub fn into_mut(self) -> Option<StateMut<'a, T>> {
        if self.guard.dropped > 0 {
            return None;
        }

        Some(StateMut { guard: self.guard })
    }
}

impl<T> Deref for StateRef<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.guard.value
    }
}

/// A write guard over the state; waiters are woken when it drops.
pub struct StateMut<'a, T> {
    guard: MutexGuard<'a, Inner<T>>,
}

impl<T> Deref for StateMut<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.guard.value
    }
}

impl<T> DerefMut for StateMut<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard.value
    }
}

impl<T> Drop for StateMut<'_, T> {
    fn drop(&mut self) {
        self.guard.wake();
    }
}

/// Resolves once the state has been mutated past the captured epoch.
pub struct Changed<T> {
    shared: Arc<Shared<T>>,
    epoch: u64,
}

impl<T> Future for Changed<T> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut inner = self.shared.lock.lock().unwrap();
        if inner.epoch != self.epoch || inner.dropped > 0 {
            return Poll::Ready(());
        }

        if !inner.wakers.iter().any(|w| w.will_wake(cx.waker())) {
            inner.wakers.push(cx.waker().clone());
        }

        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn notify_on_change() {
        let (writer, reader) = State::new(0u32).split();

        let changed = reader.lock().modified().unwrap();
        *writer.lock_mut().unwrap() = 7;
        changed.await;

        assert_eq!(*reader.lock(), 7);
    }

    #[tokio::test]
    async fn closed_when_half_dropped() {
        let (writer, reader) = State::new(0u32).split();

        let changed = reader.lock().modified().unwrap();
        drop(writer);
        changed.await;

        assert!(reader.lock().modified().is_none());
        assert!(reader.lock_mut().is_none());
    }

    #[test]
    fn clones_keep_half_alive() {
        let (writer, reader) = State::new(0u32).split();
        let writer2 = writer.clone();
        drop(writer);

        assert!(reader.lock_mut().is_some());
        drop(writer2);
        assert!(reader.lock_mut().is_none());
    }
}
