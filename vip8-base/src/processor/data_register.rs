use num_enum::{IntoPrimitive, TryFromPrimitive};
use static_assertions::const_assert_eq;

use crate::nibble_ints::U4;

/// Data register of the CHIP-8 processor.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, TryFromPrimitive, IntoPrimitive,
)]
#[repr(u8)]
pub enum DataRegister {
    /// Offset of [`Instruction::JumpOffset`][crate::instruction::Instruction::JumpOffset]
    /// when [`Quirks::jump_offset_uses_v0`][super::Quirks::jump_offset_uses_v0] is set.
    V0,
    V1,
    V2,
    V3,
    V4,
    V5,
    V6,
    V7,
    V8,
    V9,
    VA,
    VB,
    VC,
    VD,
    VE,
    /// Flag register.
    /// Receives the carry of additions, the inverted borrow of subtractions,
    /// the bit shifted out by shifts and the collision flag of sprite draws.
    VF,
}

impl DataRegister {
    pub const COUNT: usize = 16;

    /// All registers in ascending order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::V0,
        Self::V1,
        Self::V2,
        Self::V3,
        Self::V4,
        Self::V5,
        Self::V6,
        Self::V7,
        Self::V8,
        Self::V9,
        Self::VA,
        Self::VB,
        Self::VC,
        Self::VD,
        Self::VE,
        Self::VF,
    ];

    pub const fn index(self) -> usize {
        self as u8 as usize
    }
}

const_assert_eq!(DataRegister::COUNT, U4::MAX.into_u8() as usize + 1);

impl From<DataRegister> for U4 {
    fn from(reg: DataRegister) -> Self {
        U4::from_u8_masked(reg as u8)
    }
}

impl From<U4> for DataRegister {
    fn from(val: U4) -> Self {
        Self::ALL[val.into_u8() as usize]
    }
}
