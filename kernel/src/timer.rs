//! The timer service: a min-heap of pending deadlines driven by the LAPIC
//! timer interrupt. Two kinds of entries share the same heap:
//!
//!   - ordinary timers registered via [`TimerManager::add_timer`], which
//!     become a [`crate::message::Message::TimerTimeout`] delivered to one
//!     task's queue once their deadline passes;
//!   - the scheduler's own preemption sentinel, which never stops
//!     re-arming itself — every time it fires, `tick()` reports
//!     `preempt_now = true` and immediately reinserts itself
//!     `TASK_TIMER_PERIOD` ticks later.
//!
//! Grounded on the original `timer.cpp`/`timer.hpp`: a max-heap of
//! `{deadline, value}` pairs ordered so the *soonest* deadline sits at the
//! top (their `operator<` is inverted for exactly this reason), plus a
//! `UINT64_MAX`-deadline guard entry so the heap is never empty.

use alloc::collections::BinaryHeap;
use alloc::vec::Vec;
use core::cmp::Ordering;

use crate::message::Message;

/// LAPIC timer interrupt frequency, in Hz.
pub const TIMER_FREQ: u32 = 100;
/// Preemption quantum, in ticks (20 ms at 100 Hz).
pub const TASK_TIMER_PERIOD: u64 = 2;
/// Sentinel value identifying the scheduler's self-rescheduling entry.
pub const TASK_TIMER_VALUE: i32 = i32::MIN;
/// The task ID the preemption sentinel is nominally addressed to; it is
/// never actually delivered as a message, so the value is unused beyond
/// satisfying the `Timer` struct's shape.
const TASK_TIMER_TASK_ID: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Timer {
    deadline: u64,
    value: i32,
    task_id: u64,
}

impl Timer {
    const fn new(deadline: u64, value: i32, task_id: u64) -> Self {
        Self { deadline, value, task_id }
    }

    const fn is_preempt_sentinel(&self) -> bool {
        self.value == TASK_TIMER_VALUE
    }
}

/// Reverse order by deadline: `BinaryHeap` is a max-heap, and we want the
/// *smallest* deadline at the top, so comparisons are flipped.
impl Ord for Timer {
    fn cmp(&self, other: &Self) -> Ordering {
        other.deadline.cmp(&self.deadline)
    }
}

impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Result of servicing one LAPIC timer tick.
pub struct TickResult {
    /// Set when the preemption sentinel fired this tick — the caller
    /// (the timer interrupt handler) must invoke the scheduler.
    pub preempt_now: bool,
    /// Ordinary timers that came due this tick, paired with the task
    /// their `TimerTimeout` message is addressed to.
    pub expired: Vec<(u64, Message)>,
}

/// The min-heap of pending deadlines, plus the current tick count.
pub struct TimerManager {
    tick: u64,
    heap: BinaryHeap<Timer>,
}

impl TimerManager {
    /// Guard deadline that never legitimately fires; keeps the heap
    /// non-empty so `tick()` never has to special-case an empty heap.
    const GUARD_DEADLINE: u64 = u64::MAX;

    pub fn new() -> Self {
        let mut heap = BinaryHeap::new();
        heap.push(Timer::new(Self::GUARD_DEADLINE, 0, 0));
        heap.push(Timer::new(TASK_TIMER_PERIOD, TASK_TIMER_VALUE, TASK_TIMER_TASK_ID));
        Self { tick: 0, heap }
    }

    /// Current tick count since boot.
    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    /// Registers a one-shot timer that fires `ticks_from_now` ticks in the
    /// future, delivering `value` to `task_id` as a `TimerTimeout`.
    pub fn add_timer(&mut self, ticks_from_now: u64, value: i32, task_id: u64) {
        self.heap.push(Timer::new(self.tick + ticks_from_now, value, task_id));
    }

    /// Advances the clock by one tick, popping and processing every entry
    /// whose deadline has passed. Called from the LAPIC timer ISR.
    pub fn tick(&mut self) -> TickResult {
        self.tick += 1;

        let mut result = TickResult { preempt_now: false, expired: Vec::new() };

        loop {
            let due = match self.heap.peek() {
                Some(top) if top.deadline <= self.tick => *top,
                _ => break,
            };
            self.heap.pop();

            if due.is_preempt_sentinel() {
                result.preempt_now = true;
                self.heap.push(Timer::new(
                    self.tick + TASK_TIMER_PERIOD,
                    TASK_TIMER_VALUE,
                    TASK_TIMER_TASK_ID,
                ));
            } else {
                result.expired.push((
                    due.task_id,
                    Message::TimerTimeout { timeout: due.deadline, value: due.value },
                ));
            }
        }

        result
    }
}

impl Default for TimerManager {
    fn default() -> Self {
        Self::new()
    }
}

// ── Global singleton ─────────────────────────────────────────────

use spin::Once;

use crate::sync::spinlock::SpinLock;

static TIMER_MANAGER: Once<SpinLock<TimerManager>> = Once::new();

/// Arms the LAPIC periodic timer at [`TIMER_FREQ`] and brings up the global
/// `TimerManager`. Must run after `khal::apic::init` and after the heap is
/// available (the manager's heap allocates).
///
/// Calibrates against the ACPI PM timer when the RSDP and FADT are
/// available; falls back to a fixed divide-by-16 count tuned for common
/// QEMU/KVM LAPIC frequencies if ACPI discovery fails, rather than leaving
/// the timer unarmed.
pub fn init(rsdp_addr: Option<u64>, hhdm_offset: u64) {
    let initial_count = calibrate(rsdp_addr, hhdm_offset).unwrap_or(FALLBACK_INITIAL_COUNT);
    khal::apic::enable_timer(
        khal::apic::TIMER_VECTOR,
        initial_count,
        khal::apic::TimerDivide::By16,
    );
    TIMER_MANAGER.call_once(|| SpinLock::new(TimerManager::new()));
}

/// Fallback LAPIC initial count (divide-by-16) when ACPI calibration is
/// unavailable; chosen to land roughly in the 100 Hz neighborhood on
/// common virtualized LAPIC clocks.
const FALLBACK_INITIAL_COUNT: u32 = 1_000_000;

/// Measures the LAPIC timer's real tick rate against the ACPI PM timer and
/// returns the initial count that yields `TIMER_FREQ` interrupts/sec at a
/// divide-by-16 LAPIC configuration.
fn calibrate(rsdp_addr: Option<u64>, hhdm_offset: u64) -> Option<u32> {
    let rsdp_addr = rsdp_addr?;
    let pm = unsafe { khal::pmtimer::PmTimer::discover(rsdp_addr, hhdm_offset)? };

    const CALIBRATION_MICROS: u32 = 10_000;
    khal::apic::enable_timer(khal::apic::TIMER_VECTOR, u32::MAX, khal::apic::TimerDivide::By16);
    pm.wait_micros(CALIBRATION_MICROS);
    let elapsed = u32::MAX - khal::apic::current_count();
    khal::apic::disable_timer();

    let lapic_hz = (elapsed as u64 * 1_000_000 / CALIBRATION_MICROS as u64) as u32;
    Some(lapic_hz / TIMER_FREQ)
}

/// Advances the clock by one tick and returns what came due. Called from
/// the LAPIC timer interrupt handler; panics if `init` was never called.
pub fn tick() -> TickResult {
    TIMER_MANAGER
        .get()
        .expect("timer::tick called before timer::init")
        .lock()
        .tick()
}

/// Registers a one-shot timer. See [`TimerManager::add_timer`].
pub fn add_timer(ticks_from_now: u64, value: i32, task_id: u64) {
    TIMER_MANAGER
        .get()
        .expect("timer::add_timer called before timer::init")
        .lock()
        .add_timer(ticks_from_now, value, task_id);
}

/// Current tick count since boot.
pub fn current_tick() -> u64 {
    TIMER_MANAGER
        .get()
        .expect("timer::current_tick called before timer::init")
        .lock()
        .current_tick()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_and_sentinel_never_fire_prematurely() {
        let mut mgr = TimerManager::new();
        for _ in 0..(TASK_TIMER_PERIOD - 1) {
            let r = mgr.tick();
            assert!(!r.preempt_now);
            assert!(r.expired.is_empty());
        }
    }

    #[test]
    fn sentinel_reschedules_itself_periodically() {
        let mut mgr = TimerManager::new();
        let mut fires = 0;
        for _ in 0..(TASK_TIMER_PERIOD * 5) {
            if mgr.tick().preempt_now {
                fires += 1;
            }
        }
        assert_eq!(fires, 5);
    }

    #[test]
    fn ordinary_timer_fires_once_at_deadline() {
        let mut mgr = TimerManager::new();
        mgr.add_timer(10, 42, 7);
        for _ in 0..9 {
            assert!(mgr.tick().expired.is_empty());
        }
        let r = mgr.tick();
        assert_eq!(r.expired.len(), 1);
        assert_eq!(r.expired[0].0, 7);
        match r.expired[0].1 {
            Message::TimerTimeout { value, .. } => assert_eq!(value, 42),
            _ => panic!("wrong message kind"),
        }
    }

    #[test]
    fn timers_fire_in_deadline_order() {
        let mut mgr = TimerManager::new();
        mgr.add_timer(20, 2, 2);
        mgr.add_timer(10, 1, 1);
        mgr.add_timer(10, 3, 3);

        let mut order = Vec::new();
        for _ in 0..20 {
            let r = mgr.tick();
            for (task_id, _) in r.expired {
                order.push(task_id);
            }
        }
        assert_eq!(order[0].min(order[1]), 1.min(3));
        assert_eq!(order[2], 2);
    }

    #[test]
    fn multiple_due_timers_in_one_tick_all_fire() {
        let mut mgr = TimerManager::new();
        mgr.add_timer(5, 1, 100);
        mgr.add_timer(5, 2, 200);
        for _ in 0..4 {
            mgr.tick();
        }
        let r = mgr.tick();
        assert_eq!(r.expired.len(), 2);
    }
}
