//! Packed 1-bit planes for the tri-colour panel.
//!
//! A [`Frame`] carries one plane per ink colour. Both planes are row-major,
//! MSB-first, with a set bit meaning "ink here". Drivers translate to the
//! polarity their hardware expects.

use std::convert::Infallible;

use dndink_core::ObservedState;
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;

/// Panel width in pixels.
pub const WIDTH: u32 = 800;
/// Panel height in pixels.
pub const HEIGHT: u32 = 480;

const ROW_BYTES: usize = (WIDTH as usize).div_ceil(8);

/// What a frame shows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisplayStatus {
    /// Rendered state; never [`ObservedState::Unknown`] in a composed frame.
    pub state: ObservedState,
    /// Timestamp line, already formatted.
    pub updated: String,
}

/// One colour plane. Implements [`DrawTarget`], where
/// [`BinaryColor::On`] sets ink and [`BinaryColor::Off`] clears it.
#[derive(Clone, PartialEq, Eq)]
pub struct Plane {
    bits: Vec<u8>,
}

impl Plane {
    /// Blank (no ink) plane.
    pub fn new() -> Self {
        Self {
            bits: vec![0; ROW_BYTES * HEIGHT as usize],
        }
    }

    /// Whether `(x, y)` carries ink. Out-of-range coordinates read as blank.
    pub fn is_ink(&self, x: u32, y: u32) -> bool {
        if x >= WIDTH || y >= HEIGHT {
            return false;
        }
        let (index, mask) = Self::locate(x, y);
        self.bits[index] & mask != 0
    }

    /// Packed bytes, `WIDTH / 8` per row.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }

    /// Number of inked pixels.
    pub fn ink_count(&self) -> usize {
        self.bits.iter().map(|b| b.count_ones() as usize).sum()
    }

    fn set(&mut self, x: u32, y: u32, ink: bool) {
        let (index, mask) = Self::locate(x, y);
        if ink {
            self.bits[index] |= mask;
        } else {
            self.bits[index] &= !mask;
        }
    }

    fn locate(x: u32, y: u32) -> (usize, u8) {
        let index = y as usize * ROW_BYTES + x as usize / 8;
        (index, 0x80 >> (x % 8))
    }
}

impl Default for Plane {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Plane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plane")
            .field("ink", &self.ink_count())
            .finish()
    }
}

impl OriginDimensions for Plane {
    fn size(&self) -> Size {
        Size::new(WIDTH, HEIGHT)
    }
}

impl DrawTarget for Plane {
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            let (Ok(x), Ok(y)) = (u32::try_from(point.x), u32::try_from(point.y)) else {
                continue;
            };
            if x < WIDTH && y < HEIGHT {
                self.set(x, y, color.is_on());
            }
        }
        Ok(())
    }
}

/// Draws every pixel as a `factor`×`factor` block offset by `origin`.
///
/// Used to blow the 10×20 mono font up to headline size without a
/// vector font.
pub(crate) struct Scaled<'a, T> {
    target: &'a mut T,
    factor: u32,
    origin: Point,
}

impl<'a, T> Scaled<'a, T> {
    pub(crate) fn new(target: &'a mut T, factor: u32, origin: Point) -> Self {
        Self {
            target,
            factor: factor.max(1),
            origin,
        }
    }
}

impl<T: DrawTarget> Dimensions for Scaled<'_, T> {
    fn bounding_box(&self) -> Rectangle {
        let outer = self.target.bounding_box();
        Rectangle::new(
            Point::zero(),
            Size::new(outer.size.width / self.factor, outer.size.height / self.factor),
        )
    }
}

impl<T: DrawTarget> DrawTarget for Scaled<'_, T> {
    type Color = T::Color;
    type Error = T::Error;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let factor = i32::try_from(self.factor).unwrap_or(1);
        let block = Size::new(self.factor, self.factor);
        for Pixel(point, color) in pixels {
            let top_left = self.origin + Point::new(point.x * factor, point.y * factor);
            self.target.fill_solid(&Rectangle::new(top_left, block), color)?;
        }
        Ok(())
    }
}

/// A composed, ready-to-write image.
#[derive(Clone, Debug)]
pub struct Frame {
    status: DisplayStatus,
    black: Plane,
    red: Plane,
}

impl Frame {
    pub(crate) fn new(status: DisplayStatus, black: Plane, red: Plane) -> Self {
        Self { status, black, red }
    }

    /// What this frame shows.
    pub fn status(&self) -> &DisplayStatus {
        &self.status
    }

    /// Black ink plane.
    pub fn black(&self) -> &Plane {
        &self.black
    }

    /// Red ink plane.
    pub fn red(&self) -> &Plane {
        &self.red
    }
}
