use num_enum::{IntoPrimitive, TryFromPrimitive};
use static_assertions::const_assert_eq;

use crate::nibble_ints::U4;

/// A key of the hexadecimal keypad as recognized by the CHIP-8 processor.
///
/// Which physical key maps to which logical key is up to the frontend.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, TryFromPrimitive, IntoPrimitive,
)]
#[repr(u8)]
pub enum Key {
    K0,
    K1,
    K2,
    K3,
    K4,
    K5,
    K6,
    K7,
    K8,
    K9,
    KA,
    KB,
    KC,
    KD,
    KE,
    KF,
}

impl Key {
    pub const COUNT: usize = 16;

    pub const ALL: [Self; Self::COUNT] = [
        Self::K0,
        Self::K1,
        Self::K2,
        Self::K3,
        Self::K4,
        Self::K5,
        Self::K6,
        Self::K7,
        Self::K8,
        Self::K9,
        Self::KA,
        Self::KB,
        Self::KC,
        Self::KD,
        Self::KE,
        Self::KF,
    ];
}

const_assert_eq!(Key::COUNT, U4::MAX.into_u8() as usize + 1);

impl From<Key> for U4 {
    fn from(key: Key) -> Self {
        U4::from_u8_masked(key as u8)
    }
}

impl From<U4> for Key {
    fn from(val: U4) -> Self {
        Self::ALL[val.into_u8() as usize]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Pressed,
    NotPressed,
}

impl Default for KeyState {
    fn default() -> Self {
        Self::NotPressed
    }
}

/// State of all 16 keys.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Keypad([KeyState; Key::COUNT]);

impl Keypad {
    pub fn get(&self, key: Key) -> KeyState {
        self.0[key as usize]
    }

    pub fn set(&mut self, key: Key, state: KeyState) {
        self.0[key as usize] = state;
    }

    pub fn is_pressed(&self, key: Key) -> bool {
        self.get(key) == KeyState::Pressed
    }

    /// The highest numbered key that is currently pressed, if any.
    pub fn last_pressed(&self) -> Option<Key> {
        Key::ALL
            .iter()
            .rev()
            .copied()
            .find(|&key| self.is_pressed(key))
    }
}
