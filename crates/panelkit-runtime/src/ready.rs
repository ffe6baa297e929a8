#![forbid(unsafe_code)]

//! One-shot, multi-waiter completion signal.
//!
//! [`ReadySignal<T>`] fires at most once. Waiters can attach either as
//! callbacks ([`ReadySignal::when_ready`]) or as futures
//! ([`ReadySignal::until_ready`]). Every waiter is resolved exactly once,
//! whether it registered before or after the signal fired; late waiters see
//! the stored value immediately.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use tracing::{debug, warn};

type ReadyCallback<T> = Box<dyn FnOnce(&T)>;

struct ReadyInner<T> {
    value: Option<T>,
    callbacks: Vec<ReadyCallback<T>>,
    wakers: Vec<Waker>,
}

/// A one-shot broadcast that stores its value for late subscribers.
pub struct ReadySignal<T> {
    inner: Rc<RefCell<ReadyInner<T>>>,
}

impl<T> Clone for ReadySignal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for ReadySignal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("ReadySignal")
            .field("ready", &inner.value.is_some())
            .field("pending_callbacks", &inner.callbacks.len())
            .field("pending_futures", &inner.wakers.len())
            .finish()
    }
}

impl<T: Clone + 'static> Default for ReadySignal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static> ReadySignal<T> {
    /// A signal that has not fired yet.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(ReadyInner {
                value: None,
                callbacks: Vec::new(),
                wakers: Vec::new(),
            })),
        }
    }

    /// A signal that is already resolved with `value`.
    #[must_use]
    pub fn resolved(value: T) -> Self {
        let signal = Self::new();
        signal.fire(value);
        signal
    }

    /// Whether [`fire`](Self::fire) has been called.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.inner.borrow().value.is_some()
    }

    /// The stored value, if fired.
    #[must_use]
    pub fn value(&self) -> Option<T> {
        self.inner.borrow().value.clone()
    }

    /// Resolve the signal. Only the first call has any effect.
    ///
    /// Pending callbacks run synchronously in registration order; pending
    /// futures are woken. Returns `false` if the signal had already fired.
    pub fn fire(&self, value: T) -> bool {
        let (callbacks, wakers) = {
            let mut inner = self.inner.borrow_mut();
            if inner.value.is_some() {
                warn!(target: "panelkit.runtime", "ready signal fired twice; ignoring");
                return false;
            }
            inner.value = Some(value.clone());
            (
                std::mem::take(&mut inner.callbacks),
                std::mem::take(&mut inner.wakers),
            )
        };

        debug!(
            target: "panelkit.runtime",
            callbacks = callbacks.len(),
            futures = wakers.len(),
            "ready signal fired"
        );
        for callback in callbacks {
            callback(&value);
        }
        for waker in wakers {
            waker.wake();
        }
        true
    }

    /// Run `callback` once the signal fires (immediately if it already has).
    pub fn when_ready(&self, callback: impl FnOnce(&T) + 'static) {
        let value = {
            let mut inner = self.inner.borrow_mut();
            let Some(value) = inner.value.clone() else {
                inner.callbacks.push(Box::new(callback));
                return;
            };
            value
        };
        callback(&value);
    }

    /// A future that resolves with the signal's value.
    #[must_use]
    pub fn until_ready(&self) -> UntilReady<T> {
        UntilReady {
            signal: self.clone(),
        }
    }
}

/// Future returned by [`ReadySignal::until_ready`].
#[must_use = "futures do nothing unless polled"]
pub struct UntilReady<T> {
    signal: ReadySignal<T>,
}

impl<T: Clone + 'static> Future for UntilReady<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let mut inner = self.signal.inner.borrow_mut();
        match inner.value.clone() {
            Some(value) => Poll::Ready(value),
            None => {
                if !inner.wakers.iter().any(|w| w.will_wake(cx.waker())) {
                    inner.wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}
