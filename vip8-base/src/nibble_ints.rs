use std::convert::TryFrom;

use derive_more::*;
use thiserror::Error;

#[derive(Debug, PartialEq, Eq, Error)]
#[error("value {value} exceeds the maximum value {max_value}")]
pub struct UpperBoundExceededError {
    value: usize,
    max_value: usize,
}

/// A 4-bit integer, i.e. one nibble of an instruction word.
/// Need not actually use only 4 bits in memory.
#[derive(Debug, Default, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash, AsRef, Into, Display)]
#[repr(transparent)]
pub struct U4(u8);

/// Selects one of the two nibbles of a byte.
#[derive(Debug, Clone, Copy)]
#[repr(u8)]
pub enum U8Nibble {
    Lo = 0,
    Hi = 1,
}

impl U4 {
    pub const MIN: Self = Self(0);
    pub const MAX: Self = Self(0b1111);

    pub const fn into_u8(self) -> u8 {
        self.0
    }

    /// Extract the given nibble of `val`. Total, as the result is masked.
    pub const fn from_u8(val: u8, nibble: U8Nibble) -> Self {
        Self((val >> (4 * (nibble as u8))) & 0b1111)
    }

    /// Keep only the low nibble of `val`.
    pub const fn from_u8_masked(val: u8) -> Self {
        Self(val & 0b1111)
    }
}

impl TryFrom<u8> for U4 {
    type Error = UpperBoundExceededError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if value <= U4::MAX.into_u8() {
            Ok(Self(value))
        } else {
            Err(UpperBoundExceededError {
                value: value as usize,
                max_value: U4::MAX.into_u8() as usize,
            })
        }
    }
}

/// A 12-bit integer, the address immediate of an instruction word.
/// Need not actually use only 12 bits in memory.
#[derive(Debug, Default, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash, AsRef, Into, Display)]
#[repr(transparent)]
pub struct U12(u16);

impl U12 {
    pub const MIN: Self = Self(0);
    pub const MAX: Self = Self(0b1111_1111_1111);

    pub const fn into_u16(self) -> u16 {
        self.0
    }

    /// Keep only the low 12 bits of `val`.
    pub const fn from_u16_masked(val: u16) -> Self {
        Self(val & 0b1111_1111_1111)
    }
}

impl TryFrom<u16> for U12 {
    type Error = UpperBoundExceededError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        if value <= U12::MAX.into_u16() {
            Ok(Self(value))
        } else {
            Err(UpperBoundExceededError {
                value: value as usize,
                max_value: U12::MAX.into_u16() as usize,
            })
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn u4_nibbles() {
        assert_eq!(U4::from_u8(0xA7, U8Nibble::Hi), U4(0xA));
        assert_eq!(U4::from_u8(0xA7, U8Nibble::Lo), U4(0x7));
    }

    #[test]
    fn u4_try_from() {
        assert_eq!(U4::try_from(0xF_u8), Ok(U4::MAX));
        assert_eq!(
            U4::try_from(0x10_u8),
            Err(UpperBoundExceededError {
                value: 0x10,
                max_value: 0xF
            })
        );
    }

    #[test]
    fn u12_try_from() {
        assert_eq!(U12::try_from(0xFFF_u16), Ok(U12::MAX));
        assert!(U12::try_from(0x1000_u16).is_err());
        assert_eq!(U12::from_u16_masked(0xF123), U12(0x123));
    }
}
