//! ACPI Power Management timer: the reference clock used to calibrate the
//! LAPIC timer's internal oscillator, whose frequency is not architecturally
//! fixed and must be measured at boot.
//!
//! The PM timer runs at a fixed 3.579545 MHz regardless of CPU frequency
//! scaling, so comparing a LAPIC one-shot countdown against it over a short
//! busy-wait gives the LAPIC's true tick rate. This mirrors the calibration
//! every hobby kernel with an APIC timer ends up writing, since the LAPIC
//! itself exposes no "ticks per second" anywhere.

use crate::port::inl;

/// PM timer input clock, in Hz (fixed by the ACPI specification).
pub const PM_TIMER_HZ: u32 = 3_579_545;

/// Location and width of the ACPI PM timer, discovered from the FADT.
#[derive(Debug, Clone, Copy)]
pub struct PmTimer {
    port: u16,
    is_32bit: bool,
}

#[repr(C, packed)]
struct AcpiSdtHeader {
    signature: [u8; 4],
    length: u32,
    _revision: u8,
    _checksum: u8,
    _oem_id: [u8; 6],
    _oem_table_id: [u8; 8],
    _oem_revision: u32,
    _creator_id: u32,
    _creator_revision: u32,
}

const FADT_SIGNATURE: [u8; 4] = *b"FACP";

impl PmTimer {
    /// Walks the ACPI table tree starting from the RSDP to find the FADT's
    /// `PM_TMR_BLK` port and counter width.
    ///
    /// `rsdp_addr` is the address Limine handed back for the RSDP (already
    /// dereferenceable — Limine maps it for us). `hhdm_offset` is added to
    /// every *other* table pointer found along the way, since those are
    /// physical addresses per the ACPI specification.
    ///
    /// # Safety
    ///
    /// `rsdp_addr` must point at a valid ACPI RSDP structure, and every
    /// physical address the ACPI tables reference must lie within the
    /// HHDM-mapped region.
    pub unsafe fn discover(rsdp_addr: u64, hhdm_offset: u64) -> Option<Self> {
        let revision = unsafe { *((rsdp_addr + 15) as *const u8) };

        let sdt_phys: u64 = if revision >= 2 {
            unsafe { *((rsdp_addr + 24) as *const u64) }
        } else {
            unsafe { *((rsdp_addr + 16) as *const u32) as u64 }
        };
        let use_xsdt = revision >= 2;

        let sdt_virt = hhdm_offset + sdt_phys;
        let header = unsafe { &*(sdt_virt as *const AcpiSdtHeader) };
        let entry_count = if use_xsdt {
            (header.length as usize - core::mem::size_of::<AcpiSdtHeader>()) / 8
        } else {
            (header.length as usize - core::mem::size_of::<AcpiSdtHeader>()) / 4
        };

        let entries_base = sdt_virt + core::mem::size_of::<AcpiSdtHeader>() as u64;

        for i in 0..entry_count {
            let table_phys: u64 = if use_xsdt {
                unsafe { *((entries_base + (i as u64) * 8) as *const u64) }
            } else {
                unsafe { *((entries_base + (i as u64) * 4) as *const u32) as u64 }
            };

            let table_virt = hhdm_offset + table_phys;
            let table_header = unsafe { &*(table_virt as *const AcpiSdtHeader) };
            if table_header.signature != FADT_SIGNATURE {
                continue;
            }

            let pm_tmr_blk = unsafe { *((table_virt + 76) as *const u32) };
            if pm_tmr_blk == 0 {
                return None;
            }

            let flags = if table_header.length as u64 >= 116 {
                unsafe { *((table_virt + 112) as *const u32) }
            } else {
                0
            };
            const TMR_VAL_EXT: u32 = 1 << 8;

            return Some(PmTimer {
                port: pm_tmr_blk as u16,
                is_32bit: flags & TMR_VAL_EXT != 0,
            });
        }

        None
    }

    /// Reads the current counter value (24-bit or 32-bit, per the FADT).
    pub fn read(&self) -> u32 {
        let raw = unsafe { inl(self.port) };
        if self.is_32bit {
            raw
        } else {
            raw & 0x00FF_FFFF
        }
    }

    /// Counter width, used to detect wraparound in [`elapsed_ticks`].
    fn counter_mask(&self) -> u32 {
        if self.is_32bit { u32::MAX } else { 0x00FF_FFFF }
    }

    /// Ticks elapsed between two readings, accounting for one wraparound.
    pub fn elapsed_ticks(&self, start: u32, end: u32) -> u32 {
        end.wrapping_sub(start) & self.counter_mask()
    }

    /// Busy-waits for approximately `micros` microseconds.
    pub fn wait_micros(&self, micros: u32) {
        let ticks = (PM_TIMER_HZ as u64 * micros as u64 / 1_000_000) as u32;
        let start = self.read();
        while self.elapsed_ticks(start, self.read()) < ticks {
            core::hint::spin_loop();
        }
    }
}
