//! Timer multiplexer for poll-based hosts.
//!
//! Any number of logical timer queues share a single schedule, and the
//! schedule keeps at most one host wait armed per pending deadline tick,
//! with exactly one for the globally soonest tick. Firing a tick resolves
//! every queue due at or before the current time and re-arms for the next
//! soonest tick, so the number of live host registrations stays independent
//! of the number of queues.

use std::{
    cell::{Cell, RefCell},
    collections::{BTreeMap, HashMap},
    rc::Rc,
};

#[cfg(target_os = "wasi")]
mod wasi;
#[cfg(target_os = "wasi")]
pub use self::wasi::WasiTimerHost;

/// Due tick of a queue that is not currently scheduled.
const NOT_SCHEDULED: u64 = u64::MAX;

/// Clock and wait-arming primitive consumed by [`Timers`].
pub trait TimerHost {
    /// Current monotonic time in milliseconds.
    fn now(&self) -> u64;

    /// Register a host wait that invokes `on_elapsed` once `duration_ms`
    /// has fully elapsed. Returns false if the host rejects the
    /// registration.
    fn arm(&self, duration_ms: u64, on_elapsed: Box<dyn FnOnce()>) -> bool;
}

/// One logical countdown source. Created once through
/// [`Timers::create_queue`] and never destroyed; rescheduling moves it
/// between deadline buckets.
pub struct TimerQueue {
    index: usize,
    due: Cell<u64>,
    on_fire: Box<dyn Fn()>,
}

struct Bucket {
    /// A host wait is armed for exactly this tick.
    armed: bool,
    queues: HashMap<usize, Rc<TimerQueue>>,
}

/// The timer scheduling service. Cheap to clone; clones share one schedule.
pub struct Timers<H> {
    inner: Rc<Inner<H>>,
}

struct Inner<H> {
    host: H,
    /// Due tick -> queues due at that tick. Sorted, so the soonest pending
    /// tick is the first key.
    schedule: RefCell<BTreeMap<u64, Bucket>>,
    next_index: Cell<usize>,
}

impl<H> Clone for Timers<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<H: TimerHost + 'static> Timers<H> {
    pub fn new(host: H) -> Self {
        Self {
            inner: Rc::new(Inner {
                host,
                schedule: RefCell::new(BTreeMap::new()),
                next_index: Cell::new(0),
            }),
        }
    }

    /// Create a queue that runs `on_fire` whenever its deadline elapses.
    pub fn create_queue(&self, on_fire: impl Fn() + 'static) -> Rc<TimerQueue> {
        let index = self.inner.next_index.get();
        self.inner.next_index.set(index + 1);
        Rc::new(TimerQueue {
            index,
            due: Cell::new(NOT_SCHEDULED),
            on_fire: Box::new(on_fire),
        })
    }

    /// Schedule `queue` to fire no earlier than `delay_ms` from now,
    /// replacing any previous deadline. Returns false only if the host
    /// rejected the wait registration.
    pub fn schedule(&self, queue: &Rc<TimerQueue>, delay_ms: u64) -> bool {
        let now = self.inner.host.now();
        // Clamp below the sentinel so an enormous delay cannot wrap or
        // masquerade as "not scheduled".
        let due = now.saturating_add(delay_ms).min(NOT_SCHEDULED - 1);

        let mut schedule = self.inner.schedule.borrow_mut();

        // If the queue is already scheduled, pull it out of its current
        // bucket. A host wait armed for that tick is left in place; it
        // fires later and finds nothing due.
        let old = queue.due.get();
        if old != NOT_SCHEDULED
            && let Some(bucket) = schedule.get_mut(&old)
        {
            bucket.queues.remove(&queue.index);
            if bucket.queues.is_empty() {
                schedule.remove(&old);
            }
        }

        queue.due.set(due);

        if let Some(bucket) = schedule.get_mut(&due) {
            // Other queues already fire at this tick; share their wait.
            bucket.queues.insert(queue.index, Rc::clone(queue));
            return true;
        }

        // First queue due at this tick. Arm a host wait only if no earlier
        // tick is pending; an earlier wait cascades to this bucket when it
        // fires.
        let is_soonest = schedule.keys().next().is_none_or(|&first| due < first);
        let mut queues = HashMap::new();
        queues.insert(queue.index, Rc::clone(queue));
        schedule.insert(due, Bucket {
            armed: false,
            queues,
        });
        drop(schedule);

        if !is_soonest {
            return true;
        }
        if self.arm_wait(delay_ms, due) {
            if let Some(bucket) = self.inner.schedule.borrow_mut().get_mut(&due) {
                bucket.armed = true;
            }
            true
        } else {
            false
        }
    }

    /// Entry point for an elapsed host wait armed for tick `due`.
    ///
    /// Every bucket due at or before now is removed from the schedule and
    /// each contained queue's deadline is reset before any callback runs,
    /// so a callback can reschedule its own queue without colliding with
    /// the entry being torn down.
    ///
    /// # Panics
    ///
    /// Panics if invoked before `due` has elapsed: the host wait contract
    /// guarantees readiness only after the full duration, so an early
    /// notification means the clock cannot be trusted.
    pub fn fire(&self, due: u64) {
        let now = self.inner.host.now();
        assert!(
            now >= due,
            "host wait for tick {due} became ready early (now {now})"
        );

        let ready = {
            let mut schedule = self.inner.schedule.borrow_mut();
            let pending = schedule.split_off(&(now + 1));
            let ready = std::mem::replace(&mut *schedule, pending);
            for bucket in ready.values() {
                for queue in bucket.queues.values() {
                    queue.due.set(NOT_SCHEDULED);
                }
            }
            ready
        };

        if ready.is_empty() {
            // A wait left over from a tick that was rescheduled away.
            log::debug!("timer wake for tick {due} found nothing due");
        }

        for bucket in ready.values() {
            for queue in bucket.queues.values() {
                (queue.on_fire)();
            }
        }

        // Arm for the next soonest tick unless a wait is already out for it.
        let next = {
            let mut schedule = self.inner.schedule.borrow_mut();
            match schedule.iter_mut().next() {
                Some((&tick, bucket)) if !bucket.armed => {
                    bucket.armed = true;
                    Some(tick)
                }
                _ => None,
            }
        };
        if let Some(tick) = next
            && !self.arm_wait(tick - now, tick)
        {
            log::warn!("host rejected timer wait for tick {tick}");
            if let Some(bucket) = self.inner.schedule.borrow_mut().get_mut(&tick) {
                bucket.armed = false;
            }
        }
    }

    fn arm_wait(&self, duration_ms: u64, due: u64) -> bool {
        let service = self.clone();
        self.inner
            .host
            .arm(duration_ms, Box::new(move || service.fire(due)))
    }
}
