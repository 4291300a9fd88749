use std::{convert::TryFrom, fmt};

use thiserror::Error;

use crate::{
    nibble_ints::{U8Nibble, U12, U4},
    processor::DataRegister,
};

/// A raw 16-bit instruction word, split into its fields.
///
/// Decoding into an [`Opcode`] is total: every word yields all fields,
/// whether the combination of them names an instruction is decided by
/// [`Instruction::try_from`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Opcode(u16);

impl Opcode {
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// The top nibble, selecting the instruction family.
    pub const fn family(self) -> U4 {
        U4::from_u8((self.0 >> 8) as u8, U8Nibble::Hi)
    }

    /// The first register operand.
    pub const fn x(self) -> U4 {
        U4::from_u8((self.0 >> 8) as u8, U8Nibble::Lo)
    }

    /// The second register operand.
    pub const fn y(self) -> U4 {
        U4::from_u8(self.0 as u8, U8Nibble::Hi)
    }

    /// The lowest nibble as an immediate.
    pub const fn n(self) -> U4 {
        U4::from_u8(self.0 as u8, U8Nibble::Lo)
    }

    /// The low byte as an immediate.
    pub const fn nn(self) -> u8 {
        self.0 as u8
    }

    /// The low 12 bits as an address immediate.
    pub const fn nnn(self) -> U12 {
        U12::from_u16_masked(self.0)
    }
}

impl From<u16> for Opcode {
    fn from(word: u16) -> Self {
        Self(word)
    }
}

impl From<[u8; 2]> for Opcode {
    fn from(bytes: [u8; 2]) -> Self {
        Self(u16::from_be_bytes(bytes))
    }
}

impl fmt::Debug for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Opcode({:04X})", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no instruction is defined for the word {0:?}")]
pub struct InvalidInstructionError(pub Opcode);

/// A CHIP-8 instruction.
///
/// References used are
/// <https://github.com/mattmikolay/chip-8/wiki/CHIP%E2%80%908-Instruction-Set> (CC-BY-SA 4.0, Matthew Mikolay)
/// and <https://tobiasvl.github.io/blog/write-a-chip-8-emulator/>.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Instruction {
    /// `00E0`: Clear the display.
    ClearDisplay,
    /// `00EE`: Return from a subroutine.
    Return,
    /// `0NNN`: Call the machine code routine at `address`.
    /// Only meaningful on the COSMAC VIP.
    CallMachineSubroutine { address: U12 },
    /// `1NNN`: Jump to the `target_address`.
    Jump { target_address: U12 },
    /// `2NNN`: Call the subroutine at the `target_address`.
    CallSubroutine { target_address: U12 },
    /// `3XNN`: Skip the next instruction if the value in `register`
    /// is equal to `constant`.
    SkipIfEqConst { register: DataRegister, constant: u8 },
    /// `4XNN`: Skip the next instruction if the value in `register`
    /// is not equal to `constant`.
    SkipIfNeqConst { register: DataRegister, constant: u8 },
    /// `5XY0`: Skip the next instruction if the value in `register1`
    /// is equal to the value in `register2`.
    SkipIfEq {
        register1: DataRegister,
        register2: DataRegister,
    },
    /// `6XNN`: Assign `constant` to `target_register`.
    AssignConst {
        target_register: DataRegister,
        constant: u8,
    },
    /// `7XNN`: Add `constant` to the value in `target_register`, wrapping on overflow.
    ///
    /// [`DataRegister::VF`] is not altered.
    AddAssignConst {
        target_register: DataRegister,
        constant: u8,
    },
    /// `8XY0`: Assign the value in `source_register` to `target_register`.
    Assign {
        target_register: DataRegister,
        source_register: DataRegister,
    },
    /// `8XY1`: Bitwise-OR `source_register` into `target_register`.
    OrAssign {
        target_register: DataRegister,
        source_register: DataRegister,
    },
    /// `8XY2`: Bitwise-AND `source_register` into `target_register`.
    AndAssign {
        target_register: DataRegister,
        source_register: DataRegister,
    },
    /// `8XY3`: Bitwise-XOR `source_register` into `target_register`.
    XorAssign {
        target_register: DataRegister,
        source_register: DataRegister,
    },
    /// `8XY4`: Add the value in `source_register` to `target_register`.
    ///
    /// If a carry occurs [`DataRegister::VF`] is set to `1`,
    /// if not it is set to `0`.
    AddAssign {
        target_register: DataRegister,
        source_register: DataRegister,
    },
    /// `8XY5`: Subtract the value in `source_register`
    /// from the value in `target_register`.
    ///
    /// If a borrow occurs [`DataRegister::VF`] is set to `0`,
    /// if not it is set to `1`.
    SubAssign {
        target_register: DataRegister,
        source_register: DataRegister,
    },
    /// `8XY6`: Shift the value in `target_register` one bit to the right.
    ///
    /// [`DataRegister::VF`] is set to the bit that is shifted out.
    /// `source_register` is only read with
    /// [`Quirks::shift_copies_vy`][crate::processor::Quirks::shift_copies_vy].
    ShrAssign {
        target_register: DataRegister,
        source_register: DataRegister,
    },
    /// `8XY7`: Subtract the value in `target_register`
    /// from the value in `source_register`
    /// and assign the result to `target_register`.
    ///
    /// If a borrow occurs [`DataRegister::VF`] is set to `0`,
    /// if not it is set to `1`.
    RevSubAssign {
        target_register: DataRegister,
        source_register: DataRegister,
    },
    /// `8XYE`: Shift the value in `target_register` one bit to the left.
    ///
    /// See [`Instruction::ShrAssign`].
    ShlAssign {
        target_register: DataRegister,
        source_register: DataRegister,
    },
    /// `9XY0`: Skip the next instruction if the value in `register1`
    /// is not equal to the value in `register2`.
    SkipIfNeq {
        register1: DataRegister,
        register2: DataRegister,
    },
    /// `ANNN`: Assign `address` to the index register `I`.
    AssignAddrToI { address: U12 },
    /// `BXNN`: Jump to `address` plus the value in the register named by
    /// the highest nibble of `address`.
    JumpOffset { address: U12 },
    /// `CXNN`: Assign `target_register` random bits in the positions indicated by `mask`,
    /// all other bits are cleared.
    AssignRandomMasked {
        target_register: DataRegister,
        mask: u8,
    },
    /// `DXYN`: Draw a `sprite_len` byte tall sprite read from the address in `I`
    /// at the position given by the values in `position_x_register` and `position_y_register`.
    DrawSprite {
        position_x_register: DataRegister,
        position_y_register: DataRegister,
        sprite_len: U4,
    },
    /// `EX9E`: Skip the next instruction if the key named
    /// by the value in `key_register` is pressed.
    SkipIfKeyPressed { key_register: DataRegister },
    /// `EXA1`: Skip the next instruction if the key named
    /// by the value in `key_register` is not pressed.
    SkipIfKeyNotPressed { key_register: DataRegister },
    /// `FX07`: Assign the current value of the delay timer to `target_register`.
    AssignDelayTimerVal { target_register: DataRegister },
    /// `FX0A`: Wait until a key is pressed and assign its number to `target_register`.
    WaitForKeyPress { target_register: DataRegister },
    /// `FX15`: Set the delay timer to the value in `source_register`.
    SetDelayTimer { source_register: DataRegister },
    /// `FX18`: Set the sound timer to the value in `source_register`.
    SetSoundTimer { source_register: DataRegister },
    /// `FX1E`: Add the value in `source_register` to `I`.
    ///
    /// [`DataRegister::VF`] is not altered.
    AddAssignI { source_register: DataRegister },
    /// `FX29`: Assign the address of the font glyph for the value in
    /// `hex_char_register` to `I`.
    AssignHexCharSpriteAddrToI { hex_char_register: DataRegister },
    /// `FX33`: Store the three decimal digits of the value in `source_register`
    /// at `I`, `I + 1` and `I + 2`, hundreds first.
    StoreBCD { source_register: DataRegister },
    /// `FX55`: Store registers [`DataRegister::V0`] to `last_register`
    /// in consecutive bytes of memory beginning at `I`.
    StoreRegisterValues { last_register: DataRegister },
    /// `FX65`: Load registers [`DataRegister::V0`] to `last_register`
    /// from consecutive bytes of memory beginning at `I`.
    LoadRegisterValues { last_register: DataRegister },
}

impl Instruction {
    /// The register whose value offsets a [`Instruction::JumpOffset`].
    pub fn jump_offset_register(address: U12) -> DataRegister {
        DataRegister::from(U4::from_u8((address.into_u16() >> 8) as u8, U8Nibble::Lo))
    }
}

impl TryFrom<Opcode> for Instruction {
    type Error = InvalidInstructionError;

    fn try_from(opcode: Opcode) -> Result<Self, Self::Error> {
        use Instruction::*;

        let x = DataRegister::from(opcode.x());
        let y = DataRegister::from(opcode.y());
        let nn = opcode.nn();
        let nnn = opcode.nnn();

        let instruction = match (opcode.family().into_u8(), opcode.n().into_u8()) {
            (0x0, _) => match opcode.raw() {
                0x00E0 => ClearDisplay,
                0x00EE => Return,
                _ => CallMachineSubroutine { address: nnn },
            },
            (0x1, _) => Jump {
                target_address: nnn,
            },
            (0x2, _) => CallSubroutine {
                target_address: nnn,
            },
            (0x3, _) => SkipIfEqConst {
                register: x,
                constant: nn,
            },
            (0x4, _) => SkipIfNeqConst {
                register: x,
                constant: nn,
            },
            (0x5, 0x0) => SkipIfEq {
                register1: x,
                register2: y,
            },
            (0x6, _) => AssignConst {
                target_register: x,
                constant: nn,
            },
            (0x7, _) => AddAssignConst {
                target_register: x,
                constant: nn,
            },
            (0x8, n) => {
                let (target_register, source_register) = (x, y);
                match n {
                    0x0 => Assign {
                        target_register,
                        source_register,
                    },
                    0x1 => OrAssign {
                        target_register,
                        source_register,
                    },
                    0x2 => AndAssign {
                        target_register,
                        source_register,
                    },
                    0x3 => XorAssign {
                        target_register,
                        source_register,
                    },
                    0x4 => AddAssign {
                        target_register,
                        source_register,
                    },
                    0x5 => SubAssign {
                        target_register,
                        source_register,
                    },
                    0x6 => ShrAssign {
                        target_register,
                        source_register,
                    },
                    0x7 => RevSubAssign {
                        target_register,
                        source_register,
                    },
                    0xE => ShlAssign {
                        target_register,
                        source_register,
                    },
                    _ => return Err(InvalidInstructionError(opcode)),
                }
            }
            (0x9, 0x0) => SkipIfNeq {
                register1: x,
                register2: y,
            },
            (0xA, _) => AssignAddrToI { address: nnn },
            (0xB, _) => JumpOffset { address: nnn },
            (0xC, _) => AssignRandomMasked {
                target_register: x,
                mask: nn,
            },
            (0xD, _) => DrawSprite {
                position_x_register: x,
                position_y_register: y,
                sprite_len: opcode.n(),
            },
            (0xE, _) => match nn {
                0x9E => SkipIfKeyPressed { key_register: x },
                0xA1 => SkipIfKeyNotPressed { key_register: x },
                _ => return Err(InvalidInstructionError(opcode)),
            },
            (0xF, _) => match nn {
                0x07 => AssignDelayTimerVal { target_register: x },
                0x0A => WaitForKeyPress { target_register: x },
                0x15 => SetDelayTimer { source_register: x },
                0x18 => SetSoundTimer { source_register: x },
                0x1E => AddAssignI { source_register: x },
                0x29 => AssignHexCharSpriteAddrToI {
                    hex_char_register: x,
                },
                0x33 => StoreBCD { source_register: x },
                0x55 => StoreRegisterValues { last_register: x },
                0x65 => LoadRegisterValues { last_register: x },
                _ => return Err(InvalidInstructionError(opcode)),
            },
            _ => return Err(InvalidInstructionError(opcode)),
        };

        Ok(instruction)
    }
}

impl TryFrom<[u8; 2]> for Instruction {
    type Error = InvalidInstructionError;

    fn try_from(bytes: [u8; 2]) -> Result<Self, Self::Error> {
        Self::try_from(Opcode::from(bytes))
    }
}

/// Assemble an instruction word from its nibbles.
fn word(family: u8, x: DataRegister, y: DataRegister, n: u8) -> u16 {
    (family as u16) << 12 | (x as u16) << 8 | (y as u16) << 4 | n as u16
}

/// Assemble an instruction word from a family nibble and a 12-bit address.
fn address_word(family: u8, address: U12) -> u16 {
    (family as u16) << 12 | address.into_u16()
}

/// Assemble an instruction word from a family nibble, a register and a byte.
fn byte_word(family: u8, x: DataRegister, byte: u8) -> u16 {
    (family as u16) << 12 | (x as u16) << 8 | byte as u16
}

impl From<Instruction> for u16 {
    fn from(instruction: Instruction) -> Self {
        use Instruction::*;

        match instruction {
            ClearDisplay => 0x00E0,
            Return => 0x00EE,
            CallMachineSubroutine { address } => address_word(0x0, address),
            Jump { target_address } => address_word(0x1, target_address),
            CallSubroutine { target_address } => address_word(0x2, target_address),
            SkipIfEqConst { register, constant } => byte_word(0x3, register, constant),
            SkipIfNeqConst { register, constant } => byte_word(0x4, register, constant),
            SkipIfEq {
                register1,
                register2,
            } => word(0x5, register1, register2, 0x0),
            AssignConst {
                target_register,
                constant,
            } => byte_word(0x6, target_register, constant),
            AddAssignConst {
                target_register,
                constant,
            } => byte_word(0x7, target_register, constant),
            Assign {
                target_register,
                source_register,
            } => word(0x8, target_register, source_register, 0x0),
            OrAssign {
                target_register,
                source_register,
            } => word(0x8, target_register, source_register, 0x1),
            AndAssign {
                target_register,
                source_register,
            } => word(0x8, target_register, source_register, 0x2),
            XorAssign {
                target_register,
                source_register,
            } => word(0x8, target_register, source_register, 0x3),
            AddAssign {
                target_register,
                source_register,
            } => word(0x8, target_register, source_register, 0x4),
            SubAssign {
                target_register,
                source_register,
            } => word(0x8, target_register, source_register, 0x5),
            ShrAssign {
                target_register,
                source_register,
            } => word(0x8, target_register, source_register, 0x6),
            RevSubAssign {
                target_register,
                source_register,
            } => word(0x8, target_register, source_register, 0x7),
            ShlAssign {
                target_register,
                source_register,
            } => word(0x8, target_register, source_register, 0xE),
            SkipIfNeq {
                register1,
                register2,
            } => word(0x9, register1, register2, 0x0),
            AssignAddrToI { address } => address_word(0xA, address),
            JumpOffset { address } => address_word(0xB, address),
            AssignRandomMasked {
                target_register,
                mask,
            } => byte_word(0xC, target_register, mask),
            DrawSprite {
                position_x_register,
                position_y_register,
                sprite_len,
            } => word(
                0xD,
                position_x_register,
                position_y_register,
                sprite_len.into_u8(),
            ),
            SkipIfKeyPressed { key_register } => byte_word(0xE, key_register, 0x9E),
            SkipIfKeyNotPressed { key_register } => byte_word(0xE, key_register, 0xA1),
            AssignDelayTimerVal { target_register } => byte_word(0xF, target_register, 0x07),
            WaitForKeyPress { target_register } => byte_word(0xF, target_register, 0x0A),
            SetDelayTimer { source_register } => byte_word(0xF, source_register, 0x15),
            SetSoundTimer { source_register } => byte_word(0xF, source_register, 0x18),
            AddAssignI { source_register } => byte_word(0xF, source_register, 0x1E),
            AssignHexCharSpriteAddrToI { hex_char_register } => {
                byte_word(0xF, hex_char_register, 0x29)
            }
            StoreBCD { source_register } => byte_word(0xF, source_register, 0x33),
            StoreRegisterValues { last_register } => byte_word(0xF, last_register, 0x55),
            LoadRegisterValues { last_register } => byte_word(0xF, last_register, 0x65),
        }
    }
}

impl From<Instruction> for [u8; 2] {
    fn from(instruction: Instruction) -> Self {
        u16::from(instruction).to_be_bytes()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X} {:?}", u16::from(*self), self)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn opcode_fields() {
        let opcode = Opcode::from(0xD935_u16);

        assert_eq!(opcode.family(), U4::from_u8_masked(0xD));
        assert_eq!(opcode.x(), U4::from_u8_masked(0x9));
        assert_eq!(opcode.y(), U4::from_u8_masked(0x3));
        assert_eq!(opcode.n(), U4::from_u8_masked(0x5));
        assert_eq!(opcode.nn(), 0x35);
        assert_eq!(opcode.nnn(), U12::from_u16_masked(0x935));
    }

    #[test]
    fn opcode_from_bytes() {
        assert_eq!(Opcode::from([0x12_u8, 0x34]), Opcode::from(0x1234_u16));
    }

    #[test]
    fn decoding_is_total() {
        // Every word decodes into fields, only some into instructions.
        let defined = (0..=u16::MAX)
            .filter(|&word| Instruction::try_from(Opcode::from(word)).is_ok())
            .count();
        assert!(defined > 0 && defined < u16::MAX as usize + 1);
    }

    mod instruction_try_from_u8x2 {
        use super::*;

        #[test]
        fn case_ok() {
            let instr = Instruction::AssignConst {
                target_register: DataRegister::V4,
                constant: 7,
            };

            let instr_bytes = [0x64_u8, 0x07];

            assert_eq!(
                Instruction::try_from(instr_bytes),
                Ok(instr) as Result<_, InvalidInstructionError>
            );
        }

        #[test]
        fn case_machine_subroutine() {
            assert_eq!(
                Instruction::try_from([0x03_u8, 0x45]),
                Ok(Instruction::CallMachineSubroutine {
                    address: U12::from_u16_masked(0x345)
                })
            );
        }

        macro_rules! generate_err_test {
            ($test_name:ident, $bytes:expr) => {
                #[test]
                fn $test_name() {
                    let instr_bytes: [u8; 2] = $bytes;

                    assert_eq!(
                        Instruction::try_from(instr_bytes),
                        Err(InvalidInstructionError(Opcode::from(instr_bytes)))
                            as Result<Instruction, _>
                    );
                }
            };
        }

        generate_err_test!(case_err_skip_if_eq_nonzero_n, [0x51, 0x21]);
        generate_err_test!(case_err_arith_undefined_n, [0x81, 0x28]);
        generate_err_test!(case_err_skip_if_neq_nonzero_n, [0x91, 0x2F]);
        generate_err_test!(case_err_key_family, [0xE1, 0x00]);
        generate_err_test!(case_err_misc_family, [0xF1, 0x99]);
    }

    #[test]
    fn u8x2_from_instruction() {
        let instr = Instruction::DrawSprite {
            position_x_register: DataRegister::V9,
            position_y_register: DataRegister::V3,
            sprite_len: U4::from_u8_masked(5),
        };

        let instr_bytes = [0xD9_u8, 0x35];

        assert_eq!(<[u8; 2]>::from(instr), instr_bytes);
    }

    #[test]
    fn jump_offset_register() {
        assert_eq!(
            Instruction::jump_offset_register(U12::from_u16_masked(0x3A0)),
            DataRegister::V3
        );
    }
}
