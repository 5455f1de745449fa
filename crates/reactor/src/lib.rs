//! Single-threaded reactor over host pollables.
//!
//! A pollable is an opaque host handle that signals readiness exactly once.
//! The reactor turns pollables into futures ([`Reactor::wait_for`]) or
//! one-shot callbacks ([`Reactor::on_ready`]), and [`block_on`] drives a
//! future to completion by handing control to the host's blocking poll
//! whenever nothing can make progress.
//!
// based on:
// - https://blog.yoshuawuyts.com/building-an-async-runtime-for-wasi/
// - https://github.com/yoshuawuyts/wasm-http-tools/tree/main/crates/wasi-async-runtime

mod block_on;
mod reactor;
#[cfg(target_os = "wasi")]
mod wasi;

pub use block_on::block_on;
pub use reactor::{Pollable, Reactor, WaitFor};
