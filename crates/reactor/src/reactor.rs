use std::{
    cell::RefCell,
    future::Future,
    mem,
    pin::Pin,
    rc::Rc,
    task::{Context, Poll, Waker},
};

use slab::Slab;

/// An opaque host handle that signals readiness exactly once.
pub trait Pollable {
    /// Non-blocking readiness check.
    fn ready(&self) -> bool;

    /// Block until at least one handle in `list` is ready, returning the
    /// indices of the ready handles.
    fn poll_list(list: &[&Self]) -> Vec<u32>;
}

enum Registration<P> {
    /// A future is waiting; the waker is set on first poll.
    Waiting(P, Option<Waker>),
    /// A one-shot callback runs on the dispatch pass that sees readiness.
    Callback(P, Box<dyn FnOnce()>),
    /// Readiness observed, not yet consumed by the owning future.
    Ready,
}

/// Registers pollables and dispatches readiness. Cheap to clone; all clones
/// share one registration table.
pub struct Reactor<P> {
    inner: Rc<RefCell<Slab<Registration<P>>>>,
}

impl<P> Clone for Reactor<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<P> Default for Reactor<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> Reactor<P> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Slab::new())),
        }
    }
}

impl<P: Pollable> Reactor<P> {
    /// Wait for `pollable` to signal ready. Ownership of the pollable moves
    /// into the reactor; dropping the returned future before completion
    /// unregisters it, so a cancelled wait cannot leave a permanently
    /// pending registration behind.
    pub fn wait_for(&self, pollable: P) -> WaitFor<P> {
        let key = self
            .inner
            .borrow_mut()
            .insert(Registration::Waiting(pollable, None));
        WaitFor {
            reactor: self.clone(),
            key,
            done: false,
        }
    }

    /// Run `callback` once `pollable` signals ready.
    pub fn on_ready(&self, pollable: P, callback: impl FnOnce() + 'static) {
        self.inner
            .borrow_mut()
            .insert(Registration::Callback(pollable, Box::new(callback)));
    }

    /// Dispatch every registration whose pollable is already ready, without
    /// blocking. Returns the number of registrations dispatched.
    pub fn tick(&self) -> usize {
        let ready: Vec<usize> = {
            let inner = self.inner.borrow();
            inner
                .iter()
                .filter_map(|(key, registration)| match registration {
                    Registration::Waiting(p, _) | Registration::Callback(p, _) if p.ready() => {
                        Some(key)
                    }
                    _ => None,
                })
                .collect()
        };
        self.dispatch(&ready)
    }

    /// Hand control to the host until at least one registration is ready,
    /// then dispatch.
    ///
    /// # Panics
    ///
    /// Panics if nothing is registered: such a wait could never complete.
    pub fn block_until(&self) {
        let ready: Vec<usize> = {
            let inner = self.inner.borrow();
            let mut keys = Vec::with_capacity(inner.len());
            let mut targets = Vec::with_capacity(inner.len());
            for (key, registration) in inner.iter() {
                match registration {
                    Registration::Waiting(p, _) | Registration::Callback(p, _) => {
                        keys.push(key);
                        targets.push(p);
                    }
                    Registration::Ready => {}
                }
            }
            assert!(!targets.is_empty(), "reactor has no registrations to wait on");
            P::poll_list(&targets)
                .into_iter()
                .map(|idx| keys[idx as usize])
                .collect()
        };
        self.dispatch(&ready);
    }

    // Wakers and callbacks run after the table borrow is released: a timer
    // callback may register a new wait from inside the dispatch.
    fn dispatch(&self, keys: &[usize]) -> usize {
        let mut wakers = Vec::new();
        let mut callbacks = Vec::new();
        let mut dispatched = 0;
        {
            let mut inner = self.inner.borrow_mut();
            for &key in keys {
                let Some(registration) = inner.get_mut(key) else {
                    continue;
                };
                match mem::replace(registration, Registration::Ready) {
                    Registration::Waiting(_, waker) => {
                        dispatched += 1;
                        if let Some(waker) = waker {
                            wakers.push(waker);
                        }
                    }
                    Registration::Callback(_, callback) => {
                        dispatched += 1;
                        inner.remove(key);
                        callbacks.push(callback);
                    }
                    Registration::Ready => {}
                }
            }
        }
        for waker in wakers {
            waker.wake();
        }
        for callback in callbacks {
            callback();
        }
        dispatched
    }
}

/// Future returned by [`Reactor::wait_for`].
#[must_use = "futures do nothing unless polled"]
pub struct WaitFor<P> {
    reactor: Reactor<P>,
    key: usize,
    done: bool,
}

impl<P: Pollable> Future for WaitFor<P> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        let mut inner = this.reactor.inner.borrow_mut();
        match inner.get_mut(this.key) {
            Some(Registration::Ready) => {
                inner.remove(this.key);
                this.done = true;
                Poll::Ready(())
            }
            Some(Registration::Waiting(_, waker)) => {
                *waker = Some(cx.waker().clone());
                Poll::Pending
            }
            _ => unreachable!("wait registration in unexpected state"),
        }
    }
}

impl<P> Drop for WaitFor<P> {
    fn drop(&mut self) {
        if !self.done {
            let mut inner = self.reactor.inner.borrow_mut();
            if inner.contains(self.key) {
                inner.remove(self.key);
            }
        }
    }
}
