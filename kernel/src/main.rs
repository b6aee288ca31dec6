// =============================================================================
// MinimalOS NextGen — Kernel Entry Point
// =============================================================================
//
// Boot sequence, in order:
//   1. GDT/TSS/IDT                  (traps::init_idt)
//   2. Physical memory map + HHDM   (memory::address, memory::pmm)
//   3. Kernel heap                  (memory::heap)
//   4. Paging bookkeeping           (memory::paging)
//   5. Legacy PIC remap + mask all  (khal::pic::disable)
//   6. Local APIC + LAPIC timer     (khal::apic, timer)
//   7. Screen + compositor          (gui)
//   8. PS/2 keyboard + mouse        (drivers::input)
//   9. Scheduler: idle + main tasks (task::scheduler, task::idle)
//  10. sti, fall into the idle loop
// =============================================================================

#![no_std]
#![no_main]

extern crate alloc;

mod arch;
mod drivers;
mod error;
mod gui;
mod memory;
mod message;
mod sync;
mod task;
mod timer;
mod traps;
mod util;

use limine::BaseRevision;

use arch::x86_64::boot;
use gui::framebuffer::FrameBuffer;
use gui::pixel::PixelFormat;

/// Base revision supported by this kernel.
#[used]
#[link_section = ".limine_requests"]
static BASE_REVISION: BaseRevision = BaseRevision::new();

/// The kernel's own task id (id 1, assigned first after the idle task).
const KERNEL_MAIN_TASK_ID: u64 = task::scheduler::KERNEL_MAIN_TASK_ID;

/// Kernel entry point called by the Limine bootloader.
///
/// # Safety
///
/// Called exactly once, by the bootloader, on the boot CPU, with no prior
/// Rust state initialized.
#[no_mangle]
unsafe extern "C" fn _start() -> ! {
    assert!(BASE_REVISION.is_supported(), "unsupported Limine base revision");

    let hhdm_offset = boot::get_hhdm_offset();
    unsafe {
        memory::address::init_hhdm(hhdm_offset);
    }

    traps::init_idt();
    klog::info!("[021] GDT/TSS/IDT initialised");

    let memory_map = boot::get_memory_map();
    memory::pmm::init(memory_map);
    klog::info!("[030] Physical frame allocator initialised");

    memory::heap::init();
    klog::info!("[032] Kernel heap initialised");

    memory::paging::init(hhdm_offset);

    // Remap the legacy PIC out of the exception range and mask every line;
    // keyboard/mouse bring-up below unmasks only the two lines it owns.
    khal::pic::disable();

    khal::apic::init(hhdm_offset);
    klog::info!("[023] Local APIC initialised");

    let rsdp_addr = boot::get_rsdp_address();
    timer::init(rsdp_addr, hhdm_offset);
    klog::info!("[024] LAPIC timer armed, TimerManager online");

    let fb_info = boot::get_framebuffer_info().expect("Limine did not provide a framebuffer");
    let bytes_per_pixel = (fb_info.bpp as usize) / 8;
    let stride_pixels = (fb_info.pitch as usize / bytes_per_pixel) as i32;
    // Limine's GOP framebuffers are laid out blue-green-red-padding in
    // practice; there is no per-channel mask in FramebufferInfo to check.
    let format = PixelFormat::Bgrx8;
    let screen = FrameBuffer::from_screen(
        fb_info.address,
        fb_info.width as i32,
        fb_info.height as i32,
        stride_pixels,
        format,
    );
    gui::init(screen, format);
    klog::info!("[050] Compositor online ({}x{})", fb_info.width, fb_info.height);

    drivers::input::init();
    klog::info!("[039] PS/2 keyboard and mouse online");

    let idle_id = task::idle::spawn();
    debug_assert_eq!(idle_id, task::scheduler::IDLE_TASK_ID);

    let kernel_id = task::scheduler::new_task();
    debug_assert_eq!(kernel_id, KERNEL_MAIN_TASK_ID);
    task::scheduler::init_context(kernel_id, kernel_main_task, 0);
    task::scheduler::wakeup(kernel_id, task::scheduler::DEFAULT_LEVEL);

    // The console's layer is allocated here, during single-threaded boot,
    // rather than by the console task itself — `LayerManager` is part of
    // the framebuffer/back-buffer state task 1 alone is meant to touch.
    let console_layer = gui::desktop().lock().layers.new_layer();
    gui::desktop().lock().active.bind_task(console_layer, CONSOLE_TASK_ID);

    let console_id = task::scheduler::new_task();
    debug_assert_eq!(console_id, CONSOLE_TASK_ID);
    task::scheduler::init_context(console_id, console_task, console_layer as u64);
    task::scheduler::wakeup(console_id, task::scheduler::DEFAULT_LEVEL);

    unsafe {
        core::arch::asm!("sti");
    }

    // The boot CPU has no task of its own once the scheduler takes over;
    // park it here until the first timer tick preempts into task 1.
    loop {
        arch::x86_64::cpu::halt();
    }
}

/// The second task spawned after idle, right after the kernel main task.
const CONSOLE_TASK_ID: u64 = 2;

/// Body of task 1: the sole owner of the `FrameBuffer`/`LayerManager`
/// pair. Pumps `Layer::{Move,MoveRelative,Draw,DrawArea}` and
/// `LayerFinish` messages posted by every other task that owns a window.
extern "C" fn kernel_main_task(task_id: u64, _data: u64) -> ! {
    loop {
        let msg = task::scheduler::receive_message(task_id);
        match msg {
            message::Message::Layer { .. } => gui::desktop().lock().handle_layer_message(msg),
            message::Message::LayerFinish => {}
            _ => {}
        }
    }
}

/// Body of the console task: owns a `ConsoleWindow` and the layer passed
/// in via `data` (allocated by boot before the scheduler started). Prints
/// a startup banner, then idles on its own message queue — a real build
/// would dispatch `KeyPush` here to echo typed input.
extern "C" fn console_task(task_id: u64, data: u64) -> ! {
    let layer_id = data as u32;
    let mut console = gui::console_window::ConsoleWindow::new(
        layer_id,
        gui::pixel::PixelColor::WHITE,
        gui::pixel::PixelColor::BLACK,
        gui::pixel::PixelFormat::Bgrx8,
    )
    .expect("console window allocation failed");

    gui::desktop()
        .lock()
        .layers
        .layer_mut(layer_id)
        .expect("console layer missing")
        .set_window(console.shared_window());
    gui::desktop().lock().layers.up_down(layer_id, 0);

    console.put_string("MinimalOS NextGen booted.\n").ok();

    loop {
        let _ = task::scheduler::receive_message(task_id);
    }
}
