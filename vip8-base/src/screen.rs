use std::fmt::{Debug, Write};

/// The 64x32 monochrome framebuffer.
///
/// Pixels are stored bit-packed, 8 per byte, most significant bit leftmost.
/// The type is `Copy`, so handing a snapshot to a renderer is a plain copy.
#[derive(PartialEq, Eq, Clone, Copy)]
pub struct Screen {
    pixel_data: [u8; Self::WIDTH_BYTES * Self::HEIGHT as usize],
}

impl Screen {
    pub const WIDTH_BYTES: usize = 8;
    pub const WIDTH: u8 = Self::WIDTH_BYTES as u8 * u8::BITS as u8;
    pub const HEIGHT: u8 = 32;

    /// XOR a byte onto the screen at pixel position `byte_x * 8`, `y`.
    ///
    /// Returns `true` if a set pixel has been unset, `false` otherwise.
    fn draw_byte(&mut self, byte_x: usize, y: usize, byte: u8) -> bool {
        let screen_byte = &mut self.pixel_data[byte_x + y * Self::WIDTH_BYTES];
        // A one in both the screen byte and the sprite byte unsets a pixel.
        let set_pixel_unset = *screen_byte & byte > 0;

        *screen_byte ^= byte;

        set_pixel_unset
    }

    /// XOR `sprite` onto the screen with its top left corner at (`x`, `y`).
    ///
    /// Each sprite byte is one row of 8 pixels.
    /// The start position is taken modulo the screen size,
    /// the parts of the sprite that then lie past the right or bottom edge are clipped.
    ///
    /// Returns `true` if any set pixel has been unset, i.e. on collision.
    pub fn draw_sprite(&mut self, x: u8, y: u8, sprite: &[u8]) -> bool {
        let x = (x % Self::WIDTH) as usize;
        let y = (y % Self::HEIGHT) as usize;
        let mut set_pixel_unset = false;

        for (row, sprite_byte) in (y..Self::HEIGHT as usize).zip(sprite.iter().copied()) {
            set_pixel_unset |= self.draw_byte(x / 8, row, sprite_byte >> (x % 8));

            // Unaligned sprites spill into the next screen byte, unless that one is offscreen.
            if x % 8 != 0 && x / 8 + 1 < Self::WIDTH_BYTES {
                set_pixel_unset |= self.draw_byte(x / 8 + 1, row, sprite_byte << (8 - x % 8));
            }
        }

        set_pixel_unset
    }

    pub fn clear(&mut self) {
        self.pixel_data.fill(0);
    }

    /// Whether the pixel at (`x`, `y`) is set.
    ///
    /// # Panics
    ///
    /// Panics if the position is offscreen.
    pub fn get(&self, x: u8, y: u8) -> bool {
        assert!(x < Self::WIDTH && y < Self::HEIGHT, "pixel ({}, {}) is offscreen", x, y);
        let byte = self.pixel_data[x as usize / 8 + y as usize * Self::WIDTH_BYTES];
        byte >> (7 - x % 8) & 1 > 0
    }

    /// All pixels, row by row from the top left.
    pub fn pixels(&self) -> impl Iterator<Item = bool> + '_ {
        self.pixel_data
            .iter()
            .copied()
            .flat_map(|byte| (0..8).rev().map(move |i| byte >> i & 1 > 0))
    }

    /// The framebuffer as a grid of rows of pixels.
    pub fn to_grid(&self) -> [[bool; Self::WIDTH as usize]; Self::HEIGHT as usize] {
        let mut grid = [[false; Self::WIDTH as usize]; Self::HEIGHT as usize];
        for (i, pixel) in self.pixels().enumerate() {
            grid[i / Self::WIDTH as usize][i % Self::WIDTH as usize] = pixel;
        }
        grid
    }

    pub fn is_blank(&self) -> bool {
        self.pixel_data.iter().all(|&byte| byte == 0)
    }
}

impl Default for Screen {
    fn default() -> Self {
        Self {
            pixel_data: [0; Self::WIDTH_BYTES * Self::HEIGHT as usize],
        }
    }
}

impl Debug for Screen {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if f.alternate() {
            writeln!(f, "Screen(")?;
            for row in self.to_grid().iter() {
                for &pixel in row.iter() {
                    f.write_char(if pixel { '#' } else { '_' })?;
                }
                f.write_char('\n')?;
            }
            write!(f, ")")
        } else {
            f.debug_tuple("Screen").field(&&self.pixel_data[..]).finish()
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn set_pixels(screen: &Screen) -> Vec<(u8, u8)> {
        (0..Screen::HEIGHT)
            .flat_map(|y| (0..Screen::WIDTH).map(move |x| (x, y)))
            .filter(|&(x, y)| screen.get(x, y))
            .collect()
    }

    #[test]
    fn draw_aligned() {
        let mut screen = Screen::default();
        assert!(!screen.draw_sprite(8, 1, &[0b1000_0001]));
        assert_eq!(set_pixels(&screen), vec![(8, 1), (15, 1)]);
    }

    #[test]
    fn draw_unaligned() {
        let mut screen = Screen::default();
        assert!(!screen.draw_sprite(5, 0, &[0b1111_0000, 0b0000_0001]));
        assert_eq!(set_pixels(&screen), vec![(5, 0), (6, 0), (7, 0), (8, 0), (12, 1)]);
    }

    #[test]
    fn draw_twice_restores() {
        let mut screen = Screen::default();
        let sprite = [0xF0, 0x90, 0xF0];
        assert!(!screen.draw_sprite(3, 4, &sprite));
        assert!(!screen.is_blank());
        assert!(screen.draw_sprite(3, 4, &sprite));
        assert!(screen.is_blank());
    }

    #[test]
    fn clip_right_edge() {
        let mut screen = Screen::default();
        screen.draw_sprite(60, 0, &[0xFF]);
        assert_eq!(set_pixels(&screen), vec![(60, 0), (61, 0), (62, 0), (63, 0)]);
    }

    #[test]
    fn clip_bottom_edge() {
        let mut screen = Screen::default();
        screen.draw_sprite(0, 30, &[0x80, 0x80, 0x80, 0x80]);
        assert_eq!(set_pixels(&screen), vec![(0, 30), (0, 31)]);
    }

    #[test]
    fn start_position_wraps() {
        let mut screen = Screen::default();
        screen.draw_sprite(64 + 2, 32 + 3, &[0x80]);
        assert_eq!(set_pixels(&screen), vec![(2, 3)]);
    }

    #[test]
    fn grid_and_clear() {
        let mut screen = Screen::default();
        screen.draw_sprite(63, 31, &[0x80]);
        let grid = screen.to_grid();
        assert!(grid[31][63]);
        assert_eq!(grid.iter().flatten().filter(|&&p| p).count(), 1);

        screen.clear();
        assert!(screen.is_blank());
    }
}
