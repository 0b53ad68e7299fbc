//! CPU and memory state.
use crate::{bytecode::fetch, constants::*, font::FONTSET};

/// Core state for a chip8 interpreter.
pub struct Chip8Cpu {
    // ------------------------------------------------------------------------
    // Registers
    /// Program counter pointing to the current position in the bytecode.
    pub(crate) pc: Address,
    /// Stack pointer, indicating the next free slot of the stack.
    pub(crate) sp: usize,
    /// General purpose registers for temporary values.
    ///
    /// Register 16 (VF) is used for either the carry flag or borrow switch depending on opcode.
    pub(crate) registers: [u8; REGISTER_COUNT],
    /// Pointer register used for temporarily storing an address.
    pub(crate) address: Address,
    /// (DT) Delay timer that counts down to 0.
    pub(crate) delay_timer: u8,
    /// (ST) Sound timer that counts down to 0. When it has a non-zero value, a beep is played.
    pub(crate) sound_timer: u8,
    /// Keyboard input state. Pressed is a 1 bit, released is a 0 bit.
    pub(crate) key_state: u16,
    /// Set when the display buffer changed since the host last checked.
    pub(crate) draw_flag: bool,

    // ------------------------------------------------------------------------
    // Memory
    /// Main memory storage space.
    pub(crate) ram: Box<[u8; MEM_SIZE]>,
    /// Stack of return pointers used for jumping when a routine call finishes.
    pub(crate) stack: [Address; STACK_SIZE],
    /// Screen buffer that is drawn too.
    pub(crate) display: Box<[bool; DISPLAY_BUFFER_SIZE]>,
}

impl Default for Chip8Cpu {
    fn default() -> Self {
        let mut cpu = Self {
            pc: MEM_START as Address,
            sp: 0,
            registers: [0; REGISTER_COUNT],
            address: 0,
            delay_timer: 0,
            sound_timer: 0,
            key_state: 0,
            draw_flag: false,

            ram: Box::new([0; MEM_SIZE]),
            stack: [0; STACK_SIZE],
            display: Box::new([false; DISPLAY_BUFFER_SIZE]),
        };
        cpu.load_font();
        cpu
    }
}

impl Chip8Cpu {
    pub fn new() -> Self {
        Default::default()
    }

    /// Put the machine back into its power-on state.
    ///
    /// Program memory from `MEM_START` onward is kept, so the
    /// loaded program can be started over.
    pub(crate) fn reset(&mut self) {
        self.pc = MEM_START as Address;
        self.sp = 0;
        self.registers.fill(0);
        self.address = 0;
        self.delay_timer = 0;
        self.sound_timer = 0;
        self.key_state = 0;
        self.draw_flag = false;

        self.ram[..MEM_START].fill(0);
        self.stack.fill(0);
        self.display.fill(false);

        self.load_font();
    }

    /// Copy the built-in font into the reserved interpreter area.
    fn load_font(&mut self) {
        let start = FONTSET_START as usize;
        self.ram[start..start + FONTSET_DATA_LENGTH].copy_from_slice(&FONTSET);
    }

    /// Replace the program area of memory with the given bytecode.
    ///
    /// Memory after the program is zeroed. The caller is responsible
    /// for checking that the program fits.
    pub(crate) fn load_program(&mut self, bytecode: &[u8]) {
        debug_assert!(bytecode.len() <= PROGRAM_CAPACITY);

        self.ram[MEM_START..].fill(0);
        self.ram[MEM_START..MEM_START + bytecode.len()].copy_from_slice(bytecode);
    }

    pub(crate) fn clear_display(&mut self) {
        self.display.fill(false);
        self.draw_flag = true;
    }

    /// Write a byte to memory on behalf of a program.
    ///
    /// The interpreter area below `MEM_START` is read-only to programs,
    /// and writes to it are dropped.
    #[inline]
    pub(crate) fn write_ram(&mut self, address: usize, value: u8) {
        let address = address & MEM_MASK;
        if address >= MEM_START {
            self.ram[address] = value;
        } else {
            log::trace!("dropped write to reserved memory 0x{address:03X}");
        }
    }

    #[inline]
    pub(crate) fn read_ram(&self, address: usize) -> u8 {
        self.ram[address & MEM_MASK]
    }

    pub(crate) fn set_key_state(&mut self, key_id: u8, state: bool) {
        if key_id < KEY_COUNT {
            if state {
                self.key_state |= 1 << key_id;
            } else {
                self.key_state &= !(1 << key_id);
            }
        }
    }

    pub fn key_state(&self, key_id: u8) -> bool {
        if key_id < KEY_COUNT {
            self.key_state & (1 << key_id) > 0
        } else {
            false
        }
    }

    /// Check whether any key is pressed down.
    #[inline(always)]
    pub fn any_key(&self) -> bool {
        self.key_state > 0
    }

    /// Retrieve the value of the first key that is pressed down.
    #[inline]
    pub fn first_key(&self) -> Option<u8> {
        if self.any_key() {
            (0..KEY_COUNT).find(|k| self.key_state(*k))
        } else {
            None
        }
    }

    /// Clear the keyboard input state, setting all keys to up.
    #[inline(always)]
    pub(crate) fn clear_keys(&mut self) {
        self.key_state = 0;
    }

    /// Count down both timers, stopping at zero.
    #[inline]
    pub(crate) fn tick_timers(&mut self) {
        self.delay_timer = self.delay_timer.saturating_sub(1);
        self.sound_timer = self.sound_timer.saturating_sub(1);
    }

    /// Extract the instruction at the current program counter.
    #[inline(always)]
    pub fn instr(&self) -> [u8; 2] {
        fetch(&*self.ram, self.pc as usize)
    }
}

/// Read-only access to the machine state.
impl Chip8Cpu {
    pub fn pc(&self) -> Address {
        self.pc
    }

    pub fn sp(&self) -> usize {
        self.sp
    }

    pub fn index(&self) -> Address {
        self.address
    }

    pub fn registers(&self) -> &[u8; REGISTER_COUNT] {
        &self.registers
    }

    pub fn delay_timer(&self) -> u8 {
        self.delay_timer
    }

    pub fn sound_timer(&self) -> u8 {
        self.sound_timer
    }

    pub fn ram(&self) -> &[u8; MEM_SIZE] {
        &self.ram
    }

    /// Return addresses currently on the call stack, oldest first.
    pub fn stack(&self) -> &[Address] {
        &self.stack[..self.sp]
    }

    pub fn display(&self) -> &[bool; DISPLAY_BUFFER_SIZE] {
        &self.display
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_key_state() {
        let mut cpu = Chip8Cpu::default();

        cpu.set_key_state(0, true);
        assert_eq!(cpu.key_state, 0b00000000_00000001);
        assert!(cpu.key_state(0));
        assert!(!cpu.key_state(1));
        assert!(!cpu.key_state(7));

        cpu.set_key_state(7, true);
        assert_eq!(cpu.key_state, 0b00000000_10000001);
        assert!(cpu.key_state(0));
        assert!(!cpu.key_state(1));
        assert!(cpu.key_state(7));

        cpu.set_key_state(0, false);
        assert_eq!(cpu.key_state, 0b00000000_10000000);
        assert!(!cpu.key_state(0));
        assert!(!cpu.key_state(1));
        assert!(cpu.key_state(7));

        cpu.set_key_state(15, true);
        assert_eq!(cpu.key_state, 0b10000000_10000000);
        assert!(cpu.key_state(7));
        assert!(cpu.key_state(15));
        assert_eq!(cpu.first_key(), Some(7));

        // Out of range keys are ignored.
        cpu.set_key_state(16, true);
        assert_eq!(cpu.key_state, 0b10000000_10000000);
        assert!(!cpu.key_state(16));
    }

    #[test]
    fn test_timers_stop_at_zero() {
        let mut cpu = Chip8Cpu::default();
        cpu.delay_timer = 1;
        cpu.sound_timer = 2;

        cpu.tick_timers();
        assert_eq!(cpu.delay_timer, 0);
        assert_eq!(cpu.sound_timer, 1);

        cpu.tick_timers();
        cpu.tick_timers();
        assert_eq!(cpu.delay_timer, 0);
        assert_eq!(cpu.sound_timer, 0);
    }

    #[test]
    fn test_reserved_memory_is_read_only() {
        let mut cpu = Chip8Cpu::default();
        let start = FONTSET_START as usize;

        cpu.write_ram(start, 0xAB);
        assert_eq!(cpu.ram[start], FONTSET[0]);

        cpu.write_ram(MEM_START, 0xAB);
        assert_eq!(cpu.ram[MEM_START], 0xAB);

        // Address wraps at the end of memory.
        cpu.write_ram(MEM_SIZE + MEM_START + 1, 0xCD);
        assert_eq!(cpu.ram[MEM_START + 1], 0xCD);
    }

    #[test]
    fn test_reset_keeps_program() {
        let mut cpu = Chip8Cpu::default();
        cpu.load_program(&[0x12, 0x00]);
        cpu.registers[3] = 7;
        cpu.pc = 0x300;
        cpu.display[10] = true;

        cpu.reset();
        assert_eq!(cpu.pc, MEM_START as Address);
        assert_eq!(cpu.registers[3], 0);
        assert!(!cpu.display[10]);
        assert_eq!(&cpu.ram[MEM_START..MEM_START + 2], &[0x12, 0x00]);
    }
}
