//! The idle task. Always runnable at level 0 so `TaskManager` never
//! finds an empty run queue; does nothing but halt until the next
//! interrupt.

use crate::arch::x86_64::cpu;
use crate::task::scheduler;

extern "C" fn idle_main(_task_id: u64, _data: u64) -> ! {
    loop {
        unsafe { core::arch::asm!("sti", options(nomem, nostack)) };
        cpu::halt();
    }
}

/// Creates and wakes the idle task at level 0.
pub fn spawn() -> u64 {
    let id = scheduler::new_task();
    scheduler::init_context(id, idle_main, 0);
    scheduler::wakeup(id, 0);
    id
}
