//! Core of the vip8 CHIP-8 virtual machine.
//!
//! [`processor::Processor`] is a synchronous step function over the machine state,
//! [`timer`] decays the delay and sound timers on their own 60 Hz clock
//! and [`runner`] ties both together with the render/input bridge of a frontend.

pub mod font;
pub mod instruction;
pub mod key;
mod nibble_ints;
pub mod processor;
pub mod runner;
pub mod screen;
pub mod timer;

pub use nibble_ints::{UpperBoundExceededError, U12, U4};
