//! In-memory 1-bit panel image.
//!
//! Pixels are packed eight to a byte, most significant bit leftmost, each row
//! padded to a whole byte, which is the layout monochrome e-paper controllers
//! expect. A set bit is ink (foreground value `1`).
//!
//! Besides being the host stand-in for the panel it implements
//! `embedded-graphics`' [`DrawTarget`], so primitives and the glyph blitter
//! draw into it alike.

use std::convert::Infallible;
use std::fs;
use std::path::PathBuf;

use embedded_graphics::{pixelcolor::BinaryColor, prelude::*, primitives::Rectangle};
use log::{debug, info};

use crate::platform::{Display, DisplayError};

pub struct Framebuffer {
    width: u32,
    height: u32,
    buffer: Vec<u8>,
}

impl Framebuffer {
    pub fn new(width: u32, height: u32) -> Self {
        let bytes_per_row = width.div_ceil(8);
        Self {
            width,
            height,
            buffer: vec![0x00; (bytes_per_row * height) as usize],
        }
    }

    pub fn clear(&mut self) {
        self.buffer.fill(0x00);
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    fn index(&self, x: u32, y: u32) -> (usize, u8) {
        let bytes_per_row = self.width.div_ceil(8);
        ((y * bytes_per_row + x / 8) as usize, 0x80 >> (x % 8))
    }

    pub fn set_pixel(&mut self, x: i32, y: i32, on: bool) {
        if x < 0 || y < 0 || x as u32 >= self.width || y as u32 >= self.height {
            return;
        }
        let (byte, mask) = self.index(x as u32, y as u32);
        if on {
            self.buffer[byte] |= mask;
        } else {
            self.buffer[byte] &= !mask;
        }
    }

    pub fn pixel(&self, x: i32, y: i32) -> bool {
        if x < 0 || y < 0 || x as u32 >= self.width || y as u32 >= self.height {
            return false;
        }
        let (byte, mask) = self.index(x as u32, y as u32);
        self.buffer[byte] & mask != 0
    }

    /// Number of inked pixels.
    pub fn ink_count(&self) -> u32 {
        self.buffer.iter().map(|b| b.count_ones()).sum()
    }

    /// Plain (P4) PBM image of the frame.
    pub fn to_pbm(&self) -> Vec<u8> {
        let mut out = format!("P4\n{} {}\n", self.width, self.height).into_bytes();
        out.extend_from_slice(&self.buffer);
        out
    }

    /// Render as text, two horizontal pixels per character cell, skipping
    /// every other row so a 800x600 frame fits a wide terminal.
    pub fn to_ascii(&self) -> String {
        let mut out = String::new();
        for y in (0..self.height as i32).step_by(2) {
            let row: String = (0..self.width as i32)
                .step_by(2)
                .map(|x| {
                    let ink = self.pixel(x, y)
                        || self.pixel(x + 1, y)
                        || self.pixel(x, y + 1)
                        || self.pixel(x + 1, y + 1);
                    if ink {
                        '#'
                    } else {
                        ' '
                    }
                })
                .collect();
            out.push_str(row.trim_end());
            out.push('\n');
        }
        out
    }
}

impl OriginDimensions for Framebuffer {
    fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

impl DrawTarget for Framebuffer {
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            self.set_pixel(point.x, point.y, color.is_on());
        }
        Ok(())
    }
}

/// Where a host panel sends finished frames.
#[derive(Clone, Debug)]
pub enum FrameSink {
    /// Print ASCII art to stdout.
    Stdout,
    /// Overwrite a PBM image on every flush.
    Pbm(PathBuf),
}

/// Host implementation of the panel, backed by a [`Framebuffer`].
pub struct HostPanel {
    frame: Framebuffer,
    sink: FrameSink,
    frames: u32,
}

impl HostPanel {
    pub fn new(width: u32, height: u32, sink: FrameSink) -> Self {
        Self {
            frame: Framebuffer::new(width, height),
            sink,
            frames: 0,
        }
    }

    pub fn frame(&self) -> &Framebuffer {
        &self.frame
    }
}

impl OriginDimensions for HostPanel {
    fn size(&self) -> Size {
        self.frame.size()
    }
}

impl DrawTarget for HostPanel {
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        self.frame.draw_iter(pixels)
    }
}

impl Display for HostPanel {
    fn begin(&mut self) -> Result<(), DisplayError> {
        self.frame.clear();
        Ok(())
    }

    fn fill_rect(&mut self, x: i32, y: i32, width: u32, height: u32, color: u8) {
        let area = Rectangle::new(Point::new(x, y), Size::new(width, height));
        let color = if color != 0 {
            BinaryColor::On
        } else {
            BinaryColor::Off
        };
        self.frame.fill_solid(&area, color).ok();
    }

    fn flush(&mut self) -> Result<(), DisplayError> {
        self.frames += 1;
        match &self.sink {
            FrameSink::Stdout => {
                print!("{}", self.frame.to_ascii());
            }
            FrameSink::Pbm(path) => {
                fs::write(path, self.frame.to_pbm())
                    .map_err(|e| DisplayError(format!("{}: {e}", path.display())))?;
                info!("frame {} written to {}", self.frames, path.display());
            }
        }
        Ok(())
    }

    fn power_off(&mut self) -> Result<(), DisplayError> {
        debug!("panel powered off after {} frames", self.frames);
        Ok(())
    }

    fn width(&self) -> u32 {
        self.frame.width
    }

    fn height(&self) -> u32 {
        self.frame.height
    }
}
