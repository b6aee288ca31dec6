//! The multilevel, preemptive task scheduler. Grounded on the teacher's
//! `Process`/`Scheduler`/`do_schedule` in what is now `task/context.rs`,
//! generalized from round-robin-of-two to `kMaxLevel + 1` priority
//! levels, each a FIFO, with per-task message queues feeding `Sleep`/
//! `Wakeup` instead of a single ready queue.
//!
//! The context switch itself is unchanged from the teacher: a `call`
//! into `context_switch_asm` that swaps six callee-saved registers and
//! the return address between two kernel stacks. When this is invoked
//! from inside a `x86-interrupt` handler, the compiler-generated
//! prologue/epilogue around that handler already preserves every other
//! register and the interrupted `rip`/`rflags`/`cs`/`ss` via the CPU's
//! own interrupt frame and the final `iretq` — so a plain `call`-based
//! switch correctly implements preemption without this code needing to
//! touch the interrupt frame directly.

use alloc::boxed::Box;
use alloc::collections::{BTreeMap, VecDeque};

use spin::Once;

use crate::message::Message;
use crate::sync::spinlock::SpinLock;
use crate::task::context::{self, KernelStack};

/// Number of scheduling levels; level 0 always holds the idle task.
pub const MAX_LEVEL: usize = 3;
pub const NUM_LEVELS: usize = MAX_LEVEL + 1;
pub const DEFAULT_LEVEL: i32 = 1;

/// The kernel main task: owns the framebuffer/layer manager/active layer
/// singletons and is the sole consumer of window-system messages.
pub const KERNEL_MAIN_TASK_ID: u64 = 1;
/// The dedicated idle task, always runnable at level 0.
pub const IDLE_TASK_ID: u64 = 0;

struct Task {
    id: u64,
    stack: Box<KernelStack>,
    kernel_rsp: u64,
    level: i32,
    running: bool,
    messages: VecDeque<Message>,
    entry_func: usize,
    entry_data: u64,
    /// Bookkeeping only (see `context.rs`): recorded for spec fidelity,
    /// not restored on every switch since this kernel has one address
    /// space and never leaves ring 0.
    cr3: u64,
}

pub struct TaskManager {
    tasks: BTreeMap<u64, Task>,
    running: [VecDeque<u64>; NUM_LEVELS],
    current_level: i32,
    level_changed: bool,
    current_task: Option<u64>,
    next_id: u64,
}

impl TaskManager {
    fn new() -> Self {
        Self {
            tasks: BTreeMap::new(),
            running: [
                VecDeque::new(),
                VecDeque::new(),
                VecDeque::new(),
                VecDeque::new(),
            ],
            current_level: 0,
            level_changed: false,
            current_task: None,
            next_id: 0,
        }
    }

    fn new_task(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.tasks.insert(
            id,
            Task {
                id,
                stack: KernelStack::new_boxed(),
                kernel_rsp: 0,
                level: DEFAULT_LEVEL,
                running: false,
                messages: VecDeque::new(),
                entry_func: 0,
                entry_data: 0,
                cr3: 0,
            },
        );
        id
    }

    fn init_context(&mut self, id: u64, func: extern "C" fn(u64, u64) -> !, data: u64) {
        let task = self.tasks.get_mut(&id).expect("init_context: no such task");
        task.entry_func = func as usize;
        task.entry_data = data;
        task.cr3 = crate::arch::x86_64::cpu::read_cr3();
        task.kernel_rsp = context::prepare_initial_stack(&task.stack, entry_trampoline);
    }

    fn wakeup(&mut self, id: u64, level: i32) {
        let Some(task) = self.tasks.get_mut(&id) else { return };
        if task.running {
            if level >= 0 && level != task.level {
                self.change_level_running(id, level);
            }
            return;
        }
        let level = if level < 0 { task.level } else { level };
        task.level = level;
        task.running = true;
        self.running[level as usize].push_back(id);
        if level > self.current_level {
            self.level_changed = true;
        }
    }

    /// Puts a task to sleep. If it is the currently-executing task,
    /// rotates it off the front of its level's queue and context
    /// switches to the new front — never returning to the caller until
    /// this task is woken again.
    fn sleep_or_switch(lock: &SpinLock<TaskManager>, id: u64) {
        let switch = {
            let mut mgr = lock.lock();
            let Some(task) = mgr.tasks.get_mut(&id) else { return };
            if !task.running {
                return;
            }
            task.running = false;

            let is_front_of_current = mgr.current_task == Some(id)
                && mgr.running[mgr.current_level as usize].front() == Some(&id);

            if is_front_of_current {
                mgr.rotate_current_run_queue(true);
                Some(mgr.prepare_switch())
            } else {
                let level = mgr.tasks.get(&id).map(|t| t.level).unwrap_or(DEFAULT_LEVEL) as usize;
                if let Some(pos) = mgr.running[level].iter().position(|&t| t == id) {
                    mgr.running[level].remove(pos);
                }
                None
            }
        };

        if let Some((old_rsp_ptr, new_rsp, same)) = switch {
            if !same {
                unsafe { context::context_switch_asm(old_rsp_ptr, new_rsp) };
            }
        }
    }

    /// `RotateCurrentRunQueue`: pops the front of the current level,
    /// pushes it back unless sleeping, and recomputes `current_level`
    /// when it goes empty or a higher level became runnable.
    fn rotate_current_run_queue(&mut self, sleep: bool) -> Option<u64> {
        let level = self.current_level as usize;
        let popped = self.running[level].pop_front();
        if let Some(id) = popped {
            if !sleep {
                self.running[level].push_back(id);
            }
        }
        if self.running[level].is_empty() {
            self.level_changed = true;
        }
        if self.level_changed {
            self.level_changed = false;
            self.current_level = self.highest_nonempty_level();
        }
        popped
    }

    fn highest_nonempty_level(&self) -> i32 {
        for level in (0..NUM_LEVELS).rev() {
            if !self.running[level].is_empty() {
                return level as i32;
            }
        }
        0
    }

    fn change_level_running(&mut self, id: u64, new_level: i32) {
        let Some(task) = self.tasks.get(&id) else { return };
        let old_level = task.level as usize;
        let is_front = self.current_task == Some(id)
            && self.current_level == task.level
            && self.running[old_level].front() == Some(&id);

        if is_front {
            self.running[old_level].pop_front();
            self.running[new_level as usize].push_front(id);
            self.current_level = new_level;
            if new_level < old_level as i32 {
                self.level_changed = true;
            }
        } else if let Some(pos) = self.running[old_level].iter().position(|&t| t == id) {
            self.running[old_level].remove(pos);
            self.running[new_level as usize].push_front(id);
            if new_level > self.current_level {
                self.level_changed = true;
            }
        }
        if let Some(task) = self.tasks.get_mut(&id) {
            task.level = new_level;
        }
    }

    /// Extracts the raw pointers needed for `context_switch_asm`,
    /// pointing `current_task` at the new front. Must be called with
    /// the lock held; the lock must be released before the switch.
    fn prepare_switch(&mut self) -> (*mut u64, u64, bool) {
        let old_id = self.current_task;
        let new_id = *self.running[self.current_level as usize]
            .front()
            .expect("level 0 (idle) must never be empty");
        self.current_task = Some(new_id);

        let new_rsp = self.tasks.get(&new_id).map(|t| t.kernel_rsp).unwrap_or(0);
        let same = old_id == Some(new_id);
        let old_rsp_ptr = match old_id {
            Some(old_id) if !same => {
                &mut self.tasks.get_mut(&old_id).unwrap().kernel_rsp as *mut u64
            }
            _ => {
                static mut DEAD_RSP: u64 = 0;
                &raw mut DEAD_RSP
            }
        };
        (old_rsp_ptr, new_rsp, same)
    }

    fn send_message(&mut self, id: u64, msg: Message) {
        if let Some(task) = self.tasks.get_mut(&id) {
            task.messages.push_back(msg);
        }
        self.wakeup(id, -1);
    }

    fn pop_message(&mut self, id: u64) -> Option<Message> {
        self.tasks.get_mut(&id).and_then(|t| t.messages.pop_front())
    }
}

static TASK_MANAGER: Once<SpinLock<TaskManager>> = Once::new();

fn manager() -> &'static SpinLock<TaskManager> {
    TASK_MANAGER.call_once(|| SpinLock::new(TaskManager::new()))
}

/// Creates a new, not-yet-runnable task. Returns its id.
pub fn new_task() -> u64 {
    manager().lock().new_task()
}

/// Prepares `id`'s initial register state so that once woken, it starts
/// executing `func(id, data)`.
pub fn init_context(id: u64, func: extern "C" fn(u64, u64) -> !, data: u64) {
    manager().lock().init_context(id, func, data);
}

/// Marks `id` runnable at `level` (or its current level if `level < 0`).
pub fn wakeup(id: u64, level: i32) {
    manager().lock().wakeup(id, level);
}

/// Puts `id` to sleep; if it is the running task, switches away and
/// does not return until `id` runs again.
pub fn sleep(id: u64) {
    TaskManager::sleep_or_switch(manager(), id);
}

pub fn change_level_running(id: u64, level: i32) {
    manager().lock().change_level_running(id, level);
}

/// Appends `msg` to `id`'s queue and wakes it. Safe to call from
/// interrupt context.
pub fn send_message(id: u64, msg: Message) {
    manager().lock().send_message(id, msg);
}

/// Blocks the calling task until a message arrives, observing the
/// `{check queue, Sleep}` discipline under a continuous interrupt-off
/// window so a message delivered between the check and the switch is
/// never lost.
pub fn receive_message(id: u64) -> Message {
    loop {
        unsafe { core::arch::asm!("cli", options(nomem, nostack)) };
        if let Some(msg) = manager().lock().pop_message(id) {
            unsafe { core::arch::asm!("sti", options(nomem, nostack)) };
            return msg;
        }
        sleep(id);
        unsafe { core::arch::asm!("sti", options(nomem, nostack)) };
    }
}

/// Called from the LAPIC timer ISR trailer when `timer::tick` reports
/// `preempt_now`. Rotates the current level's run queue and, if the new
/// front differs from the old, context switches to it.
pub fn preempt() {
    let switch = {
        let mut mgr = manager().lock();
        mgr.rotate_current_run_queue(false);
        mgr.prepare_switch()
    };
    let (old_rsp_ptr, new_rsp, same) = switch;
    if !same {
        unsafe { context::context_switch_asm(old_rsp_ptr, new_rsp) };
    }
}

/// The currently-executing task's id, if scheduling has begun.
pub fn current_task_id() -> Option<u64> {
    manager().lock().current_task
}

/// First switch-in target for a brand-new task: looks up its own id and
/// entry point/data via the global manager, then calls it. Tasks are
/// not expected to return; if one does, it is parked forever rather
/// than left to run off the end of its stack.
extern "C" fn entry_trampoline() -> ! {
    let (id, func_ptr, data) = {
        let mgr = manager().lock();
        let id = mgr.current_task.expect("entry_trampoline: no current task");
        let task = mgr.tasks.get(&id).expect("entry_trampoline: current task missing");
        (id, task.entry_func, task.entry_data)
    };
    let f: extern "C" fn(u64, u64) -> ! = unsafe { core::mem::transmute(func_ptr) };
    f(id, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wakeup_inserts_at_requested_level() {
        let mgr_lock = SpinLock::new(TaskManager::new());
        let mut mgr = mgr_lock.lock();
        let id = mgr.new_task();
        mgr.wakeup(id, 2);
        assert!(mgr.running[2].contains(&id));
        assert!(mgr.tasks.get(&id).unwrap().running);
    }

    #[test]
    fn wakeup_twice_is_idempotent_for_running_task() {
        let mgr_lock = SpinLock::new(TaskManager::new());
        let mut mgr = mgr_lock.lock();
        let id = mgr.new_task();
        mgr.wakeup(id, 1);
        mgr.wakeup(id, 1);
        assert_eq!(mgr.running[1].iter().filter(|&&t| t == id).count(), 1);
    }

    #[test]
    fn higher_level_wakeup_requests_rotation() {
        let mgr_lock = SpinLock::new(TaskManager::new());
        let mut mgr = mgr_lock.lock();
        mgr.current_level = 0;
        let id = mgr.new_task();
        mgr.wakeup(id, 2);
        assert!(mgr.level_changed);
    }
}
