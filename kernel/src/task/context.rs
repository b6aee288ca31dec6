//! Per-task kernel stack and the callee-saved register context swapped
//! by `context_switch_asm`. Adapted from the teacher's `Process`/
//! `context_switch_asm` pair in the same file that used to host the
//! whole scheduler — split out so the stack/context plumbing stands on
//! its own, independent of scheduling policy.
//!
//! Only the six callee-saved GPRs plus the return address actually cross
//! a `context_switch_asm` call (everything else is caller-saved and the
//! compiler already spills what it needs). `InitContext`'s `cr3`/
//! `rflags`/`cs`/`ss`/`rdi`/`rsi` are recorded on the `Task` itself
//! (see `scheduler.rs`) for spec fidelity and because the first
//! switch-in needs `rdi`/`rsi` to reach the task's entry point — they
//! are not restored on every subsequent switch, since this kernel never
//! changes address space, ring, or flags between tasks.

use alloc::boxed::Box;

/// Size of each task's kernel-mode stack.
pub const KERNEL_STACK_SIZE: usize = 4096 * 8;

/// An aligned kernel stack.
#[repr(C, align(16))]
pub struct KernelStack {
    data: [u8; KERNEL_STACK_SIZE],
}

impl KernelStack {
    pub fn new_boxed() -> Box<Self> {
        unsafe {
            let layout = core::alloc::Layout::new::<KernelStack>();
            let ptr = alloc::alloc::alloc_zeroed(layout) as *mut KernelStack;
            if ptr.is_null() {
                alloc::alloc::handle_alloc_error(layout);
            }
            Box::from_raw(ptr)
        }
    }

    /// Top of the stack (stacks grow downward).
    pub fn top(&self) -> u64 {
        self.data.as_ptr() as u64 + KERNEL_STACK_SIZE as u64
    }
}

core::arch::global_asm!(
    ".global context_switch_asm",
    "context_switch_asm:",
    // rdi = &mut old_task.kernel_rsp
    // rsi = new_task.kernel_rsp
    "push rbp",
    "push rbx",
    "push r12",
    "push r13",
    "push r14",
    "push r15",
    "mov [rdi], rsp",
    "mov rsp, rsi",
    "pop r15",
    "pop r14",
    "pop r13",
    "pop r12",
    "pop rbx",
    "pop rbp",
    "ret",
);

unsafe extern "C" {
    /// Saves callee-saved registers on the old stack, writes the old RSP
    /// to `*old_rsp_ptr`, loads `new_rsp`, restores registers, and `ret`s
    /// into whatever RIP the new stack has at its top.
    pub fn context_switch_asm(old_rsp_ptr: *mut u64, new_rsp: u64);
}

/// Lays out `stack` as if `context_switch_asm` had just saved a task
/// whose only history is "about to run `entry_trampoline`" — so the
/// first switch-in `ret`s straight into it.
pub fn prepare_initial_stack(stack: &KernelStack, entry_trampoline: extern "C" fn() -> !) -> u64 {
    let top = stack.top();
    let sp = top - 7 * 8;
    unsafe {
        let ptr = sp as *mut u64;
        ptr.add(0).write(0); // r15
        ptr.add(1).write(0); // r14
        ptr.add(2).write(0); // r13
        ptr.add(3).write(0); // r12
        ptr.add(4).write(0); // rbx
        ptr.add(5).write(0); // rbp
        ptr.add(6).write(entry_trampoline as u64); // rip (ret target)
    }
    sp
}
