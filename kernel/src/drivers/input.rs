//! Boot-time glue for the PS/2 keyboard and mouse: brings the decoders
//! online and unmasks their PIC lines. Decoding and routing themselves
//! live in `traps::handlers` (the IRQ entry points) and `gui::Desktop`
//! (where routed events land).

pub fn init() {
    khal::keyboard::init();
    khal::keyboard::enable_irq();
    khal::mouse::init();
    khal::mouse::enable_irq();
}
