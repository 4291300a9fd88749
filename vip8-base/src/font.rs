/// Expands to 1 for a set (`#`) and 0 for an unset (`,`) pixel.
macro_rules! pixel_to_bit {
    (#) => {
        1
    };
    (,) => {
        0
    };
}

/// Builds the bytes of a 4x5 pixel font from ASCII art, one glyph per `------` block.
macro_rules! sprite_4x5_font {
    (
        $(
            $(
                ($pixel0:tt $pixel1:tt $pixel2:tt $pixel3:tt)
            )*
            ------
        )*
    ) => {
        [
            $(
                $(
                    // Pixels go into the high nibble, i.e. the left half of the sprite byte.
                    (pixel_to_bit!($pixel0) << 7
                        | pixel_to_bit!($pixel1) << 6
                        | pixel_to_bit!($pixel2) << 5
                        | pixel_to_bit!($pixel3) << 4),
                )*
            )*
        ]
    };
}

/// Address at which the font is loaded into processor memory.
pub const FONT_ADDRESS: u16 = 0x50;

/// Bytes per hex digit glyph.
pub const GLYPH_LEN: usize = 5;

/// Length of the font sprite data in bytes.
pub const FONT_LEN: usize = GLYPH_LEN * (0xF + 1);

/// Address of the glyph sprite for `digit`.
///
/// Digits above 0xF are not rejected, the address is computed all the same.
pub const fn glyph_address(digit: u8) -> u16 {
    FONT_ADDRESS + GLYPH_LEN as u16 * digit as u16
}

/// The canonical 4x5 sprite font of the hexadecimal digits.
///
/// Since a CHIP-8 sprite is always one byte wide,
/// the low nibble is 0 for all of these character sprites.
pub const FONT: [u8; FONT_LEN] = sprite_4x5_font![
    (####)
    (#,,#)
    (#,,#)
    (#,,#)
    (####)
    ------
    (,,#,)
    (,##,)
    (,,#,)
    (,,#,)
    (,###)
    ------
    (####)
    (,,,#)
    (####)
    (#,,,)
    (####)
    ------
    (####)
    (,,,#)
    (####)
    (,,,#)
    (####)
    ------
    (#,,#)
    (#,,#)
    (####)
    (,,,#)
    (,,,#)
    ------
    (####)
    (#,,,)
    (####)
    (,,,#)
    (####)
    ------
    (####)
    (#,,,)
    (####)
    (#,,#)
    (####)
    ------
    (####)
    (,,,#)
    (,,#,)
    (,#,,)
    (,#,,)
    ------
    (####)
    (#,,#)
    (####)
    (#,,#)
    (####)
    ------
    (####)
    (#,,#)
    (####)
    (,,,#)
    (####)
    ------
    (####)
    (#,,#)
    (####)
    (#,,#)
    (#,,#)
    ------
    (###,)
    (#,,#)
    (###,)
    (#,,#)
    (###,)
    ------
    (####)
    (#,,,)
    (#,,,)
    (#,,,)
    (####)
    ------
    (###,)
    (#,,#)
    (#,,#)
    (#,,#)
    (###,)
    ------
    (####)
    (#,,,)
    (####)
    (#,,,)
    (####)
    ------
    (####)
    (#,,,)
    (####)
    (#,,,)
    (#,,,)
    ------
];

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn canonical_bytes() {
        #[rustfmt::skip]
        let expected: [u8; FONT_LEN] = [
            0xF0, 0x90, 0x90, 0x90, 0xF0, // 0
            0x20, 0x60, 0x20, 0x20, 0x70, // 1
            0xF0, 0x10, 0xF0, 0x80, 0xF0, // 2
            0xF0, 0x10, 0xF0, 0x10, 0xF0, // 3
            0x90, 0x90, 0xF0, 0x10, 0x10, // 4
            0xF0, 0x80, 0xF0, 0x10, 0xF0, // 5
            0xF0, 0x80, 0xF0, 0x90, 0xF0, // 6
            0xF0, 0x10, 0x20, 0x40, 0x40, // 7
            0xF0, 0x90, 0xF0, 0x90, 0xF0, // 8
            0xF0, 0x90, 0xF0, 0x10, 0xF0, // 9
            0xF0, 0x90, 0xF0, 0x90, 0x90, // A
            0xE0, 0x90, 0xE0, 0x90, 0xE0, // B
            0xF0, 0x80, 0x80, 0x80, 0xF0, // C
            0xE0, 0x90, 0x90, 0x90, 0xE0, // D
            0xF0, 0x80, 0xF0, 0x80, 0xF0, // E
            0xF0, 0x80, 0xF0, 0x80, 0x80, // F
        ];

        assert_eq!(FONT, expected);
    }

    #[test]
    fn glyph_addresses() {
        assert_eq!(glyph_address(0x0), 0x50);
        assert_eq!(glyph_address(0x1), 0x55);
        assert_eq!(glyph_address(0xF), 0x50 + 75);
    }
}
