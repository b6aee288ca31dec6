// =============================================================================
// MinimalOS NextGen — Memory Subsystem
// =============================================================================
//
// The memory subsystem manages all physical memory in the kernel. It's
// organized into layers:
//
//   address.rs — PhysAddr/VirtAddr newtypes (type safety for addresses)
//   pmm.rs     — Physical Memory Manager (bitmap allocator for frames)
//   paging.rs  — 4-level page table manipulation (map/translate)
//   heap.rs    — Kernel heap allocator (Box, Vec, etc.)
//
// This module only exposes what's needed. Internal details stay private.
// =============================================================================

pub mod address;
pub mod heap;
pub mod paging;
pub mod pmm;
