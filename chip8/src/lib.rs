mod bytecode;
pub mod constants;
mod cpu;
mod error;
mod font;
mod keypad;
mod vm;

pub use self::{
    cpu::Chip8Cpu,
    error::{Chip8Error, Chip8Result},
    font::FONTSET,
    keypad::KeyCode,
    vm::{Chip8Conf, Chip8Vm, Flow},
};

pub const IMPL_VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod prelude {
    pub use super::{
        cpu::Chip8Cpu,
        error::{Chip8Error, Chip8Result},
        keypad::KeyCode,
        vm::{Chip8Conf, Chip8Vm, Flow},
    };
}
