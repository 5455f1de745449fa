use std::{
    future::Future,
    pin::pin,
    task::{Context, Poll},
};

use futures::task::noop_waker;

use crate::reactor::{Pollable, Reactor};

/// Run a future to completion on the current thread.
///
/// The future is constructed from the reactor so that it can register
/// waits; whenever it cannot make progress the host's blocking poll runs,
/// which also drives any callbacks registered with
/// [`Reactor::on_ready`](crate::Reactor::on_ready).
pub fn block_on<P, Fut>(f: impl FnOnce(Reactor<P>) -> Fut) -> Fut::Output
where
    P: Pollable,
    Fut: Future,
{
    let reactor = Reactor::new();
    let fut = f(reactor.clone());
    let mut fut = pin!(fut);

    let waker = noop_waker();
    let mut cx = Context::from_waker(&waker);
    loop {
        match fut.as_mut().poll(&mut cx) {
            Poll::Ready(out) => return out,
            Poll::Pending => reactor.block_until(),
        }
    }
}
