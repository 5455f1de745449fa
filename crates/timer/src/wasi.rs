use guestio_reactor::Reactor;

use crate::TimerHost;

/// Timer host backed by `wasi:clocks/monotonic-clock`, routing elapsed
/// waits through a reactor.
pub struct WasiTimerHost {
    reactor: Reactor<::wasi::io::poll::Pollable>,
}

impl WasiTimerHost {
    #[must_use]
    pub fn new(reactor: Reactor<::wasi::io::poll::Pollable>) -> Self {
        Self { reactor }
    }
}

impl TimerHost for WasiTimerHost {
    fn now(&self) -> u64 {
        ::wasi::clocks::monotonic_clock::now() / 1_000_000
    }

    fn arm(&self, duration_ms: u64, on_elapsed: Box<dyn FnOnce()>) -> bool {
        let pollable =
            ::wasi::clocks::monotonic_clock::subscribe_duration(duration_ms * 1_000_000);
        self.reactor.on_ready(pollable, on_elapsed);
        true
    }
}
