//! A rectangular pixel buffer: either the real screen (backed by the
//! Limine-provided framebuffer's physical memory) or a heap-backed shadow
//! used by windows and the compositor's back buffer. Grounded on the
//! original `FrameBuffer`/`FrameBufferConfig` split in `frame_buffer.hpp`.

use alloc::vec;
use alloc::vec::Vec;

use crate::error::{Error, ErrorKind};
use crate::gui::geometry::{Rectangle, Vec2};
use crate::gui::pixel::{check_bounds, PixelColor, PixelFormat, PixelSink};

enum Backing {
    /// The real screen: a raw pointer into Limine's framebuffer memory.
    Screen(*mut u8),
    /// A shadow buffer: heap-allocated, owned outright.
    Shadow(Vec<u8>),
}

// SAFETY: a FrameBuffer is only ever touched from task 1 (the kernel main
// task), never shared across a real second CPU — see the Concurrency
// design note on framebuffer ownership.
unsafe impl Send for Backing {}

pub struct FrameBuffer {
    width: i32,
    height: i32,
    stride_pixels: i32,
    format: PixelFormat,
    backing: Backing,
}

impl FrameBuffer {
    /// Wraps the real screen's memory; `stride_pixels` may exceed `width`
    /// when the firmware pads each scanline.
    pub fn from_screen(
        base_ptr: *mut u8,
        width: i32,
        height: i32,
        stride_pixels: i32,
        format: PixelFormat,
    ) -> Self {
        Self { width, height, stride_pixels, format, backing: Backing::Screen(base_ptr) }
    }

    /// Allocates a heap-backed shadow buffer of the given size. The shadow
    /// always has `stride_pixels == width` (no padding).
    pub fn new_shadow(width: i32, height: i32, format: PixelFormat) -> Self {
        let bytes = (width as usize) * (height as usize) * format.bytes_per_pixel();
        Self {
            width,
            height,
            stride_pixels: width,
            format,
            backing: Backing::Shadow(vec![0u8; bytes]),
        }
    }

    fn row_ptr(&self, y: i32) -> *mut u8 {
        let offset = (y as isize) * (self.stride_pixels as isize) * (self.format.bytes_per_pixel() as isize);
        match &self.backing {
            Backing::Screen(p) => unsafe { p.offset(offset) },
            Backing::Shadow(v) => unsafe { (v.as_ptr() as *mut u8).offset(offset) },
        }
    }

    fn pixel_ptr(&self, pos: Vec2) -> *mut u8 {
        unsafe { self.row_ptr(pos.y).add((pos.x as usize) * self.format.bytes_per_pixel()) }
    }

    pub fn bounds(&self) -> Rectangle {
        Rectangle::new(Vec2::new(0, 0), Vec2::new(self.width, self.height))
    }

    /// Copies `src_area` (in `src`'s local coordinates) to `dst_pos` in
    /// this buffer, clipped against both extents. Requires matching
    /// pixel formats. A zero-sized intersection is a silent no-op.
    ///
    /// The two clips are not independent: when the destination-side clip
    /// trims the left or top of the region, the source read position must
    /// advance by the same amount, or the wrong source pixels get copied
    /// (`src_start = copy_area.pos - (dst_pos - src_area.pos)`, per the
    /// reference `FrameBuffer::Copy`).
    pub fn copy(&mut self, dst_pos: Vec2, src: &FrameBuffer, src_area: Rectangle) -> Result<(), Error> {
        if self.format != src.format {
            return Err(crate::make_error!(ErrorKind::UnknownPixelFormat));
        }

        let src_clip = src_area.intersect(&src.bounds());
        if src_clip.is_empty() {
            return Ok(());
        }

        // Where each pixel of `src_clip` lands in `self`, before clipping
        // against this buffer's own bounds.
        let offset = dst_pos - src_area.pos;
        let dst_candidate = Rectangle::new(src_clip.pos + offset, src_clip.size);
        let dst_clip = dst_candidate.intersect(&self.bounds());
        if dst_clip.is_empty() {
            return Ok(());
        }

        // However much the destination clip trimmed the left/top, the
        // source read position shifts by the same amount.
        let shift = dst_clip.pos - dst_candidate.pos;
        let src_start = src_clip.pos + shift;

        let bpp = self.format.bytes_per_pixel();
        let row_bytes = (dst_clip.size.x as usize) * bpp;

        for row in 0..dst_clip.size.y {
            let src_row = src.pixel_ptr(Vec2::new(src_start.x, src_start.y + row));
            let dst_row = self.pixel_ptr(Vec2::new(dst_clip.pos.x, dst_clip.pos.y + row));
            unsafe {
                core::ptr::copy_nonoverlapping(src_row, dst_row, row_bytes);
            }
        }
        Ok(())
    }

    /// Intra-buffer scroll: moves the rectangle `src_rect` (in this
    /// buffer's own coordinates) so its top-left lands at `dst_pos`.
    /// Chooses copy direction by relative vertical position so
    /// overlapping regions never corrupt each other.
    pub fn move_rect(&mut self, dst_pos: Vec2, src_rect: Rectangle) {
        let src_clip = src_rect.intersect(&self.bounds());
        if src_clip.is_empty() {
            return;
        }
        let bpp = self.format.bytes_per_pixel();
        let row_bytes = (src_clip.size.x as usize) * bpp;
        let dx = dst_pos.x - src_clip.pos.x;

        if dst_pos.y < src_clip.pos.y {
            for row in 0..src_clip.size.y {
                let src_row = self.pixel_ptr(Vec2::new(src_clip.pos.x, src_clip.pos.y + row));
                let dst_row =
                    self.pixel_ptr(Vec2::new(src_clip.pos.x + dx, dst_pos.y + row));
                unsafe {
                    core::ptr::copy(src_row, dst_row, row_bytes);
                }
            }
        } else {
            for row in (0..src_clip.size.y).rev() {
                let src_row = self.pixel_ptr(Vec2::new(src_clip.pos.x, src_clip.pos.y + row));
                let dst_row =
                    self.pixel_ptr(Vec2::new(src_clip.pos.x + dx, dst_pos.y + row));
                unsafe {
                    core::ptr::copy(src_row, dst_row, row_bytes);
                }
            }
        }
    }
}

impl FrameBuffer {
    /// Reads back the pixel at `pos`, unpacked from this buffer's native
    /// byte layout. Used only by the transparent-color draw path, which
    /// needs to compare against the stored color per pixel.
    pub fn read_packed(&self, pos: Vec2) -> PixelColor {
        let ptr = self.pixel_ptr(pos);
        let bytes = unsafe { [*ptr, *ptr.add(1), *ptr.add(2), *ptr.add(3)] };
        self.format.unpack(bytes)
    }
}

impl PixelSink for FrameBuffer {
    fn write(&mut self, pos: Vec2, color: PixelColor) -> Result<(), Error> {
        check_bounds(pos, self.width, self.height)?;
        let bytes = self.format.pack(color);
        let ptr = self.pixel_ptr(pos);
        unsafe {
            core::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr, bytes.len());
        }
        Ok(())
    }

    fn width(&self) -> i32 {
        self.width
    }

    fn height(&self) -> i32 {
        self.height
    }

    fn format(&self) -> PixelFormat {
        self.format
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_back_round_trips() {
        let mut fb = FrameBuffer::new_shadow(4, 4, PixelFormat::Rgbx8);
        fb.write(Vec2::new(1, 1), PixelColor::new(10, 20, 30)).unwrap();
        let ptr = fb.pixel_ptr(Vec2::new(1, 1));
        let bytes = unsafe { [*ptr, *ptr.add(1), *ptr.add(2), *ptr.add(3)] };
        assert_eq!(PixelFormat::Rgbx8.unpack(bytes), PixelColor::new(10, 20, 30));
    }

    #[test]
    fn copy_clips_to_destination_extent() {
        let mut dst = FrameBuffer::new_shadow(4, 4, PixelFormat::Rgbx8);
        let mut src = FrameBuffer::new_shadow(10, 10, PixelFormat::Rgbx8);
        src.write(Vec2::new(0, 0), PixelColor::WHITE).unwrap();
        let r = dst.copy(Vec2::new(2, 2), &src, Rectangle::new(Vec2::new(0, 0), Vec2::new(10, 10)));
        assert!(r.is_ok());
    }

    #[test]
    fn copy_shifts_source_start_when_destination_clips_left() {
        let mut dst = FrameBuffer::new_shadow(20, 20, PixelFormat::Rgbx8);
        let mut src = FrameBuffer::new_shadow(20, 20, PixelFormat::Rgbx8);
        for x in 0..10 {
            src.write(Vec2::new(x, 0), PixelColor::new(x as u8, 0, 0)).unwrap();
        }

        // dst_pos.x == -5 trims the left 5 columns of the requested area;
        // the surviving dst columns [0,5) must read from src columns
        // [5,10), not from src columns [0,5) again.
        dst.copy(Vec2::new(-5, 0), &src, Rectangle::new(Vec2::new(0, 0), Vec2::new(10, 10))).unwrap();

        for x in 0..5 {
            assert_eq!(dst.read_packed(Vec2::new(x, 0)), PixelColor::new((x + 5) as u8, 0, 0));
        }
    }

    #[test]
    fn copy_rejects_mismatched_formats() {
        let mut dst = FrameBuffer::new_shadow(4, 4, PixelFormat::Rgbx8);
        let src = FrameBuffer::new_shadow(4, 4, PixelFormat::Bgrx8);
        let r = dst.copy(Vec2::new(0, 0), &src, src.bounds());
        assert!(r.is_err());
    }
}
