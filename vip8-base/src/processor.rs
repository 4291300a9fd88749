use std::{convert::TryFrom, fmt, ops::Range};

use rand::random;
use thiserror::Error;
use tracing::debug;

use crate::{
    font::{self, FONT, FONT_ADDRESS},
    instruction::{Instruction, InvalidInstructionError, Opcode},
    key::{Key, KeyState, Keypad},
    screen::Screen,
    timer::Timers,
};

mod call_stack;
mod data_register;
mod quirks;

pub use call_stack::{CallStack, CallStackCapacityExceededError};
pub use data_register::DataRegister;
pub use quirks::Quirks;

/// Fatal errors of a running program. None of them can be recovered from,
/// each carries the address of the instruction that caused it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessorError {
    #[error("invalid instruction at {program_counter:X}: {source}")]
    InvalidInstruction {
        program_counter: u16,
        source: InvalidInstructionError,
    },
    #[error("an out of bounds memory access of {len} bytes at {address:X} was requested at {program_counter:X}")]
    OutOfBoundsMemoryAccess {
        program_counter: u16,
        address: u16,
        len: usize,
    },
    #[error("the call request at {program_counter:X} exceeds the maximum call stack size")]
    MaxCallStackSizeExceeded { program_counter: u16 },
    #[error("return was requested at {program_counter:X} with an empty call stack")]
    ReturnWithEmptyCallStack { program_counter: u16 },
    #[error("a key with an invalid (greater than 0xF) key id {requested_key_id:X} was referenced at {program_counter:X}")]
    InvalidKey {
        program_counter: u16,
        requested_key_id: u8,
    },
    #[error("call to machine subroutine requested at {program_counter:X}, this is unsupported")]
    CallMachineSubroutineUnsupported { program_counter: u16 },
}

impl ProcessorError {
    /// Address of the instruction that failed.
    pub fn program_counter(&self) -> u16 {
        match *self {
            Self::InvalidInstruction {
                program_counter, ..
            }
            | Self::OutOfBoundsMemoryAccess {
                program_counter, ..
            }
            | Self::MaxCallStackSizeExceeded { program_counter }
            | Self::ReturnWithEmptyCallStack { program_counter }
            | Self::InvalidKey {
                program_counter, ..
            }
            | Self::CallMachineSubroutineUnsupported { program_counter } => program_counter,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyWaitingState {
    NotWaiting,
    Waiting { target_register: DataRegister },
}

impl Default for KeyWaitingState {
    fn default() -> Self {
        Self::NotWaiting
    }
}

/// What a single [`Processor::step`] did, beyond mutating the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepOutcome {
    pub instruction: Instruction,
    /// The screen was cleared or drawn to.
    pub screen_changed: bool,
    /// The instruction is waiting for a key press and will run again on the next step.
    pub waiting_for_key: bool,
}

/// The CHIP-8 machine state together with the interpreter stepping it.
#[derive(Debug, PartialEq, Eq)]
pub struct Processor {
    data_registers: [u8; DataRegister::COUNT],
    address_register: u16,
    memory: [u8; Self::MEMORY_LEN],
    program_counter: u16,
    call_stack: CallStack,
    timers: Timers,
    keypad: Keypad,
    screen: Screen,
    waiting_for_keypress: KeyWaitingState,
    quirks: Quirks,
    skip_call_machine_subroutine: bool,
    trace_instructions: bool,
}

impl Default for Processor {
    fn default() -> Self {
        ProcessorBuilder::new().build()
    }
}

impl Processor {
    /// Size of the addressable memory in bytes.
    pub const MEMORY_LEN: usize = 4096;

    /// Address at which programs are loaded and execution starts.
    pub const PROGRAM_START: u16 = 0x200;

    /// The maximum length of a program, from [`Self::PROGRAM_START`] to the end of memory.
    pub const MAX_PROGRAM_LEN: usize = Self::MEMORY_LEN - Self::PROGRAM_START as usize;

    pub fn builder() -> ProcessorBuilder {
        ProcessorBuilder::new()
    }

    /// Get the value of a data register.
    pub const fn register(&self, register: DataRegister) -> u8 {
        self.data_registers[register as u8 as usize]
    }

    /// Set the value of a data register.
    fn set_register(&mut self, register: DataRegister, val: u8) {
        self.data_registers[register.index()] = val;
    }

    pub const fn address_register(&self) -> u16 {
        self.address_register
    }

    pub const fn program_counter(&self) -> u16 {
        self.program_counter
    }

    pub fn memory(&self) -> &[u8] {
        &self.memory
    }

    pub fn call_stack(&self) -> &CallStack {
        &self.call_stack
    }

    /// Handle to the timers, shared with the timer driver.
    pub fn timers(&self) -> &Timers {
        &self.timers
    }

    pub fn screen(&self) -> &Screen {
        &self.screen
    }

    pub fn quirks(&self) -> Quirks {
        self.quirks
    }

    pub fn is_waiting_for_key(&self) -> bool {
        self.waiting_for_keypress != KeyWaitingState::NotWaiting
    }

    /// Get the state of a key.
    pub fn key_state(&self, key: Key) -> KeyState {
        self.keypad.get(key)
    }

    /// Set the state of a key.
    ///
    /// A press while [`Instruction::WaitForKeyPress`] is pending completes that instruction,
    /// so a press released again before the next step is not lost.
    pub fn set_key_state(&mut self, key: Key, state: KeyState) {
        match self.waiting_for_keypress {
            KeyWaitingState::Waiting { target_register } if state == KeyState::Pressed => {
                self.waiting_for_keypress = KeyWaitingState::NotWaiting;
                self.set_register(target_register, key as u8);
                self.program_counter = self.program_counter.wrapping_add(Self::INSTRUCTION_LEN);
            }
            _ => (),
        }
        self.keypad.set(key, state);
    }

    /// A diagnostic dump of registers, call stack and memory.
    pub fn dump(&self) -> MachineDump<'_> {
        MachineDump { processor: self }
    }

    const INSTRUCTION_LEN: u16 = std::mem::size_of::<u16>() as u16;

    /// Range of `len` bytes of memory starting at `address`,
    /// or an error if any of them is out of bounds.
    fn memory_range(&self, address: u16, len: usize) -> Result<Range<usize>, ProcessorError> {
        let start = address as usize;
        if start + len > Self::MEMORY_LEN {
            return Err(ProcessorError::OutOfBoundsMemoryAccess {
                program_counter: self.program_counter,
                address,
                len,
            });
        }
        Ok(start..start + len)
    }

    /// Number of registers transferred by `FX55`/`FX65`.
    fn load_store_len(&self, last_register: DataRegister) -> usize {
        if self.quirks.load_store_up_to_x {
            last_register.index() + 1
        } else {
            DataRegister::COUNT
        }
    }

    /// Return decimal digits of a u8 value.
    /// The hundreds digit is the first element in the array,
    /// followed by the tens and single digits.
    ///
    /// 3 digits are always enough, since the maximum value of a u8 is 255.
    fn decimal_digits_of_u8(num: u8) -> [u8; 3] {
        [num / 100, num / 10 % 10, num % 10]
    }

    /// Fetch, decode and execute one instruction.
    pub fn step(&mut self) -> Result<StepOutcome, ProcessorError> {
        let instruction_bytes = self.memory_range(self.program_counter, 2)?;
        let opcode = Opcode::from([
            self.memory[instruction_bytes.start],
            self.memory[instruction_bytes.start + 1],
        ]);

        let instruction = Instruction::try_from(opcode).map_err(|source| {
            ProcessorError::InvalidInstruction {
                program_counter: self.program_counter,
                source,
            }
        })?;

        if self.trace_instructions {
            debug!(
                program_counter = %format!("{:03X}", self.program_counter),
                address_register = %format!("{:03X}", self.address_register),
                registers = ?self.data_registers,
                %instruction,
                "executing instruction"
            );
        }

        let mut outcome = StepOutcome {
            instruction,
            screen_changed: false,
            waiting_for_key: false,
        };
        let mut was_control_flow_instr = false;

        match instruction {
            Instruction::ClearDisplay => {
                self.screen.clear();
                outcome.screen_changed = true;
            }
            Instruction::Return => {
                self.program_counter =
                    self.call_stack
                        .pop()
                        .ok_or(ProcessorError::ReturnWithEmptyCallStack {
                            program_counter: self.program_counter,
                        })?;

                was_control_flow_instr = true;
            }
            Instruction::CallMachineSubroutine { .. } => {
                if !self.skip_call_machine_subroutine {
                    return Err(ProcessorError::CallMachineSubroutineUnsupported {
                        program_counter: self.program_counter,
                    });
                }
            }
            Instruction::Jump { target_address } => {
                self.program_counter = target_address.into();

                was_control_flow_instr = true;
            }
            Instruction::CallSubroutine { target_address } => {
                let program_counter = self.program_counter;
                self.call_stack
                    .push(program_counter.wrapping_add(Self::INSTRUCTION_LEN))
                    .map_err(|_| ProcessorError::MaxCallStackSizeExceeded { program_counter })?;
                self.program_counter = target_address.into();

                was_control_flow_instr = true;
            }
            Instruction::SkipIfEqConst { register, constant } => {
                was_control_flow_instr = self.skip_if(self.register(register) == constant);
            }
            Instruction::SkipIfNeqConst { register, constant } => {
                was_control_flow_instr = self.skip_if(self.register(register) != constant);
            }
            Instruction::SkipIfEq {
                register1,
                register2,
            } => {
                was_control_flow_instr =
                    self.skip_if(self.register(register1) == self.register(register2));
            }
            Instruction::AssignConst {
                target_register,
                constant,
            } => self.set_register(target_register, constant),
            Instruction::AddAssignConst {
                target_register,
                constant,
            } => self.set_register(
                target_register,
                self.register(target_register).wrapping_add(constant),
            ),
            Instruction::Assign {
                target_register,
                source_register,
            } => self.set_register(target_register, self.register(source_register)),
            Instruction::OrAssign {
                target_register,
                source_register,
            } => self.set_register(
                target_register,
                self.register(target_register) | self.register(source_register),
            ),
            Instruction::AndAssign {
                target_register,
                source_register,
            } => self.set_register(
                target_register,
                self.register(target_register) & self.register(source_register),
            ),
            Instruction::XorAssign {
                target_register,
                source_register,
            } => self.set_register(
                target_register,
                self.register(target_register) ^ self.register(source_register),
            ),
            // The flag is written last, so it wins when the target is VF.
            Instruction::AddAssign {
                target_register,
                source_register,
            } => {
                let (res, carry) = self
                    .register(target_register)
                    .overflowing_add(self.register(source_register));
                self.set_register(target_register, res);
                self.set_register(DataRegister::VF, carry as u8);
            }
            Instruction::SubAssign {
                target_register,
                source_register,
            } => {
                let (res, borrow) = self
                    .register(target_register)
                    .overflowing_sub(self.register(source_register));
                self.set_register(target_register, res);
                self.set_register(DataRegister::VF, !borrow as u8);
            }
            Instruction::RevSubAssign {
                target_register,
                source_register,
            } => {
                let (res, borrow) = self
                    .register(source_register)
                    .overflowing_sub(self.register(target_register));
                self.set_register(target_register, res);
                self.set_register(DataRegister::VF, !borrow as u8);
            }
            // The shifted out bit goes to VF before the shift result is stored.
            Instruction::ShrAssign {
                target_register,
                source_register,
            } => {
                let val = self.shift_operand(target_register, source_register);
                self.set_register(DataRegister::VF, val & 0b1);
                self.set_register(target_register, val >> 1);
            }
            Instruction::ShlAssign {
                target_register,
                source_register,
            } => {
                let val = self.shift_operand(target_register, source_register);
                self.set_register(DataRegister::VF, val >> 7);
                self.set_register(target_register, val << 1);
            }
            Instruction::SkipIfNeq {
                register1,
                register2,
            } => {
                was_control_flow_instr =
                    self.skip_if(self.register(register1) != self.register(register2));
            }
            Instruction::AssignAddrToI { address } => self.address_register = address.into(),
            Instruction::JumpOffset { address } => {
                let offset_register = if self.quirks.jump_offset_uses_v0 {
                    DataRegister::V0
                } else {
                    Instruction::jump_offset_register(address)
                };
                self.program_counter =
                    u16::from(address).wrapping_add(self.register(offset_register) as u16);

                was_control_flow_instr = true;
            }
            Instruction::AssignRandomMasked {
                target_register,
                mask,
            } => self.set_register(target_register, random::<u8>() & mask),
            Instruction::DrawSprite {
                position_x_register,
                position_y_register,
                sprite_len,
            } => {
                let sprite = self.memory_range(self.address_register, sprite_len.into_u8().into())?;
                let x = self.register(position_x_register);
                let y = self.register(position_y_register);

                self.set_register(DataRegister::VF, 0);
                let set_pixel_unset = self.screen.draw_sprite(x, y, &self.memory[sprite]);
                self.set_register(DataRegister::VF, set_pixel_unset as u8);

                outcome.screen_changed = true;
            }
            Instruction::SkipIfKeyPressed { key_register } => {
                let key = self.key_in_register(key_register)?;
                was_control_flow_instr = self.skip_if(self.keypad.is_pressed(key));
            }
            Instruction::SkipIfKeyNotPressed { key_register } => {
                let key = self.key_in_register(key_register)?;
                was_control_flow_instr = self.skip_if(!self.keypad.is_pressed(key));
            }
            Instruction::AssignDelayTimerVal { target_register } => {
                self.set_register(target_register, self.timers.delay())
            }
            Instruction::WaitForKeyPress { target_register } => {
                if let Some(key) = self.keypad.last_pressed() {
                    self.waiting_for_keypress = KeyWaitingState::NotWaiting;
                    self.set_register(target_register, key as u8);
                } else {
                    // Run this instruction again on the next step.
                    self.waiting_for_keypress = KeyWaitingState::Waiting { target_register };
                    outcome.waiting_for_key = true;

                    was_control_flow_instr = true;
                }
            }
            Instruction::SetDelayTimer { source_register } => {
                self.timers.set_delay(self.register(source_register))
            }
            Instruction::SetSoundTimer { source_register } => {
                self.timers.set_sound(self.register(source_register))
            }
            // I may point past memory, but never wraps around to low memory.
            Instruction::AddAssignI { source_register } => {
                let offset = self.register(source_register);
                self.address_register = self
                    .address_register
                    .checked_add(offset as u16)
                    .ok_or(ProcessorError::OutOfBoundsMemoryAccess {
                        program_counter: self.program_counter,
                        address: self.address_register,
                        len: offset as usize,
                    })?;
            }
            Instruction::AssignHexCharSpriteAddrToI { hex_char_register } => {
                self.address_register = font::glyph_address(self.register(hex_char_register));
            }
            Instruction::StoreBCD { source_register } => {
                let digits = self.memory_range(self.address_register, 3)?;
                let val = self.register(source_register);

                self.memory[digits].copy_from_slice(&Self::decimal_digits_of_u8(val));
            }
            Instruction::StoreRegisterValues { last_register } => {
                let len = self.load_store_len(last_register);
                let target = self.memory_range(self.address_register, len)?;

                self.memory[target].copy_from_slice(&self.data_registers[..len]);
                self.increment_address_register_after_load_store(len);
            }
            Instruction::LoadRegisterValues { last_register } => {
                let len = self.load_store_len(last_register);
                let source = self.memory_range(self.address_register, len)?;

                self.data_registers[..len].copy_from_slice(&self.memory[source]);
                self.increment_address_register_after_load_store(len);
            }
        }

        if !was_control_flow_instr {
            self.program_counter = self.program_counter.wrapping_add(Self::INSTRUCTION_LEN);
        }

        Ok(outcome)
    }

    /// Skip the next instruction if `condition` holds.
    ///
    /// Returns whether the program counter was changed.
    fn skip_if(&mut self, condition: bool) -> bool {
        if condition {
            self.program_counter = self
                .program_counter
                .wrapping_add(2 * Self::INSTRUCTION_LEN);
        }
        condition
    }

    fn shift_operand(&self, target_register: DataRegister, source_register: DataRegister) -> u8 {
        if self.quirks.shift_copies_vy {
            self.register(source_register)
        } else {
            self.register(target_register)
        }
    }

    fn key_in_register(&self, key_register: DataRegister) -> Result<Key, ProcessorError> {
        let key_id = self.register(key_register);
        Key::try_from(key_id).map_err(|_| ProcessorError::InvalidKey {
            program_counter: self.program_counter,
            requested_key_id: key_id,
        })
    }

    fn increment_address_register_after_load_store(&mut self, len: usize) {
        if self.quirks.load_store_increments_i {
            self.address_register = self.address_register.wrapping_add(len as u16);
        }
    }
}

/// Human readable dump of the machine state, see [`Processor::dump`].
pub struct MachineDump<'a> {
    processor: &'a Processor,
}

impl fmt::Display for MachineDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const BYTES_PER_ROW: usize = 16;
        let processor = self.processor;

        writeln!(
            f,
            "PC={:03X} I={:03X} DT={:02X} ST={:02X}",
            processor.program_counter,
            processor.address_register,
            processor.timers.delay(),
            processor.timers.sound(),
        )?;
        for (register, val) in DataRegister::ALL.iter().zip(processor.data_registers.iter()) {
            write!(f, "{:?}={:02X} ", register, val)?;
        }
        writeln!(f)?;
        write!(
            f,
            "stack ({}/{}):",
            processor.call_stack.len(),
            processor.call_stack.capacity()
        )?;
        for address in processor.call_stack.as_slice() {
            write!(f, " {:03X}", address)?;
        }
        writeln!(f)?;

        writeln!(f, "{:=^86}", " memory dump ")?;
        for (row, bytes) in processor.memory.chunks(BYTES_PER_ROW).enumerate() {
            write!(f, "{:03X} |", row * BYTES_PER_ROW)?;
            for byte in bytes {
                write!(f, " {:02X}", byte)?;
            }
            writeln!(f)?;
        }
        write!(f, "{:=^86}", " end memory dump ")
    }
}

#[derive(Debug, PartialEq, Eq, Error)]
pub enum ProcessorBuilderError {
    #[error(
        "a program with a length ({program_len:X}) greater than the usable length of memory ({:X}) was supplied",
        Processor::MAX_PROGRAM_LEN
    )]
    ProgramExceedsUsableMemoryLen { program_len: usize },
}

pub struct ProcessorBuilder {
    /// The partially initialized processor
    processor: Processor,
}

impl ProcessorBuilder {
    pub fn new() -> Self {
        let mut memory = [0; Processor::MEMORY_LEN];
        memory[FONT_ADDRESS as usize..FONT_ADDRESS as usize + FONT.len()].copy_from_slice(&FONT);

        Self {
            processor: Processor {
                data_registers: [0; DataRegister::COUNT],
                address_register: 0,
                memory,
                program_counter: Processor::PROGRAM_START,
                call_stack: CallStack::default(),
                timers: Timers::default(),
                keypad: Keypad::default(),
                screen: Screen::default(),
                waiting_for_keypress: KeyWaitingState::default(),
                quirks: Quirks::default(),
                skip_call_machine_subroutine: false,
                trace_instructions: false,
            },
        }
    }

    /// Copies the program into the processor's memory,
    /// starting at [`Processor::PROGRAM_START`].
    pub fn program(mut self, program: &[u8]) -> Result<Self, ProcessorBuilderError> {
        if program.len() > Processor::MAX_PROGRAM_LEN {
            return Err(ProcessorBuilderError::ProgramExceedsUsableMemoryLen {
                program_len: program.len(),
            });
        }

        let start = Processor::PROGRAM_START as usize;
        self.processor.memory[start..start + program.len()].copy_from_slice(program);

        Ok(self)
    }

    /// Select the quirks the processor should emulate.
    /// See also [`Quirks`].
    pub fn quirks(mut self, quirks: Quirks) -> Self {
        self.processor.quirks = quirks;
        self
    }

    /// Emit a `DEBUG` level tracing event for every executed instruction.
    pub fn trace_instructions(mut self, trace_instructions: bool) -> Self {
        self.processor.trace_instructions = trace_instructions;
        self
    }

    /// Make the processor skip [`Instruction::CallMachineSubroutine`] instructions
    /// instead of returning an error.
    pub fn skip_call_machine_subroutine(mut self) -> Self {
        self.processor.skip_call_machine_subroutine = true;
        self
    }

    /// Use an existing timers handle, e.g. one already shared with a timer driver.
    pub fn timers(mut self, timers: Timers) -> Self {
        self.processor.timers = timers;
        self
    }

    pub fn build(self) -> Processor {
        self.processor
    }
}

impl Default for ProcessorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
