//! Virtual machine.
use std::fmt::{self, Write};

use log::debug;
use rand::prelude::*;

use crate::{
    bytecode::Opcode,
    constants::*,
    cpu::Chip8Cpu,
    error::{Chip8Error, Chip8Result},
    keypad::KeyCode,
};

pub struct Chip8Vm {
    cpu: Chip8Cpu,
    rng: StdRng,
    conf: Chip8Conf,
}

/// VM Configuration Parameters.
#[derive(Debug, Default, Clone)]
pub struct Chip8Conf {
    /// Seed for the random number generator used by `RND`.
    ///
    /// When `None` the generator is seeded from the operating system,
    /// otherwise every run of the same program is identical.
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Flow {
    Ok,
    /// Program counter has jumped to a new address.
    ///
    /// This is useful for the caller to avoid being
    /// blocked on infinite or long running loops.
    ///
    /// This is returned when the interpreter encounters:
    ///
    /// - 1nnn (`JP addr`)
    /// - 2nnn (`CALL addr`)
    /// - 00EE (`RET`)
    /// - Bnnn (`JP V0, addr`)
    Jump,
    /// The display buffer was cleared or drawn to.
    Draw,
    /// The sound timer was set.
    Sound,
    /// Wait for a keypress.
    ///
    /// This is triggered by the opcode `Fx0A` (`LD Vx, K`), which stops
    /// execution until a key is pressed, and loads the key value into `Vx`.
    KeyWait,
}

impl Chip8Vm {
    pub fn new(conf: Chip8Conf) -> Self {
        let mut vm = Chip8Vm {
            cpu: Chip8Cpu::new(),
            rng: seed_rng(&conf),
            conf,
        };
        vm.reset();
        vm
    }

    /// Read-only view of the machine state.
    pub fn cpu(&self) -> &Chip8Cpu {
        &self.cpu
    }

    /// Clear internal state in preparation for a fresh startup.
    ///
    /// The loaded program is kept in memory.
    pub fn reset(&mut self) {
        self.cpu.reset();
        self.rng = seed_rng(&self.conf);
        debug!("vm reset");
    }

    /// Copy a program image into memory at `MEM_START`.
    ///
    /// Loading is all-or-nothing. A program that does not fit
    /// leaves the machine untouched.
    pub fn load_bytecode(&mut self, bytecode: &[u8]) -> Chip8Result<()> {
        check_program_size(bytecode)?;

        // Start with clean memory to avoid leaking previous program.
        self.cpu.load_program(bytecode);
        debug!("loaded program of {} bytes", bytecode.len());

        Ok(())
    }

    /// Reset the machine and load a new program, without rebuilding the VM.
    pub fn reload(&mut self, bytecode: &[u8]) -> Chip8Result<()> {
        check_program_size(bytecode)?;
        self.reset();
        self.load_bytecode(bytecode)
    }

    pub fn display_buffer(&self) -> Chip8DisplayBuffer {
        &self.cpu.display
    }

    /// Returns whether the display changed since the last call, and clears the flag.
    pub fn consume_redraw(&mut self) -> bool {
        std::mem::take(&mut self.cpu.draw_flag)
    }

    /// The buzzer should sound while the sound timer counts down.
    pub fn is_sound_active(&self) -> bool {
        self.cpu.sound_timer > 0
    }

    /// Sets the keyboard key input state.
    pub fn set_key(&mut self, key: KeyCode, pressed: bool) {
        self.cpu.set_key_state(key.as_u8(), pressed);
    }

    /// Sets the keyboard key input state by key index.
    pub fn set_key_index(&mut self, key_id: u8, pressed: bool) -> Chip8Result<()> {
        let key = KeyCode::try_from(key_id)?;
        self.set_key(key, pressed);
        Ok(())
    }

    /// Clear the keyboard input state, setting all keys to up.
    pub fn clear_keys(&mut self) {
        self.cpu.clear_keys()
    }
}

fn seed_rng(conf: &Chip8Conf) -> StdRng {
    match conf.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

fn check_program_size(bytecode: &[u8]) -> Chip8Result<()> {
    if bytecode.len() > PROGRAM_CAPACITY {
        Err(Chip8Error::LargeProgram {
            size: bytecode.len(),
            capacity: PROGRAM_CAPACITY,
        })
    } else {
        Ok(())
    }
}

/// Interpreter
impl Chip8Vm {
    /// Run up to `step_count` cycles, stopping at the first error.
    pub fn run_steps(&mut self, step_count: usize) -> Chip8Result<Flow> {
        let mut flow = Flow::Ok;

        for _ in 0..step_count {
            flow = self.step()?;
        }

        Ok(flow)
    }

    /// Execute one fetch-decode-execute cycle, then count down the timers.
    ///
    /// A failed step leaves the program counter on the faulting
    /// instruction and does not tick the timers. Stepping again
    /// will report the same error.
    pub fn step(&mut self) -> Chip8Result<Flow> {
        let address = self.cpu.pc;
        let op = Opcode::decode(self.cpu.instr());

        self.cpu.pc = self.cpu.pc.wrapping_add(2);

        match self.exec(op, address) {
            Ok(control_flow) => {
                self.cpu.tick_timers();
                Ok(control_flow)
            }
            Err(err) => {
                self.cpu.pc = address;
                Err(err)
            }
        }
    }

    #[inline]
    fn skip_if(&mut self, cond: bool) {
        if cond {
            self.cpu.pc = self.cpu.pc.wrapping_add(2);
        }
    }

    fn exec(&mut self, op: Opcode, address: Address) -> Chip8Result<Flow> {
        let Opcode { vx, vy, nn, nnn, .. } = op;
        let (vx, vy) = (vx as usize, vy as usize);

        let mut control_flow = Flow::Ok;

        match op.op {
            // System instructions identified by nnn
            0x0 => control_flow = self.exec_sys(op, address)?,
            // 1nnn (JP addr)
            //
            // Jump to address.
            0x1 => {
                self.cpu.pc = nnn;
                control_flow = Flow::Jump;
            }
            // 2nnn (CALL addr)
            //
            // Call subroutine at nnn.
            // The return address is the instruction after the call.
            0x2 => {
                if self.cpu.sp >= STACK_SIZE {
                    return Err(Chip8Error::StackOverflow { address });
                }

                self.cpu.stack[self.cpu.sp] = self.cpu.pc;
                self.cpu.sp += 1;
                self.cpu.pc = nnn;

                control_flow = Flow::Jump;
            }
            // 3xnn (SE Vx, byte)
            //
            // Skip the next instruction if register Vx equals value nn.
            0x3 => self.skip_if(self.cpu.registers[vx] == nn),
            // 4xnn (SNE Vx, byte)
            //
            // Skip the next instruction if register Vx does not equal value nn.
            0x4 => self.skip_if(self.cpu.registers[vx] != nn),
            // 5xy0 (SE Vx, Vy)
            //
            // Skip the next instruction if register Vx equals value Vy.
            0x5 => self.skip_if(self.cpu.registers[vx] == self.cpu.registers[vy]),
            // 6xnn (LD Vx, byte)
            //
            // Set register Vx to value nn.
            0x6 => self.cpu.registers[vx] = nn,
            // 7xnn (ADD Vx, byte)
            //
            // Add value nn to register Vx. Carry flag is not set.
            0x7 => {
                let x = self.cpu.registers[vx];
                self.cpu.registers[vx] = x.wrapping_add(nn);
            }
            // Arithmetic instructions indentified by n
            0x8 => self.exec_math(op, address)?,
            // 9xy0 (SNE Vx, Vy)
            //
            // Skip next instruction if Vx != Vy.
            0x9 => self.skip_if(self.cpu.registers[vx] != self.cpu.registers[vy]),
            // Annn (LD I, addr)
            //
            // Set address register I to value nnn.
            0xA => self.cpu.address = nnn,
            // Bnnn (JP V0, addr)
            //
            // Jump to address nnn offset by V0.
            0xB => {
                self.cpu.pc = nnn.wrapping_add(self.cpu.registers[0] as Address);
                control_flow = Flow::Jump;
            }
            // Cxnn (RND Vx, byte)
            //
            // Generate random number.
            // Set register Vx to the result of bitwise AND between a random number and nn.
            0xC => self.cpu.registers[vx] = nn & self.rng.gen::<u8>(),
            // Dxyn (DRW Vx, Vy, nibble)
            0xD => {
                self.draw_sprite(op);
                control_flow = Flow::Draw;
            }
            // Keyboard instructions identified by nn
            0xE => self.exec_key(op, address)?,
            // Miscellaneous instructions identified by nn
            0xF => control_flow = self.exec_misc(op, address)?,
            _ => return Err(decode_error(op, address)),
        }

        Ok(control_flow)
    }

    /// Execute a system instruction
    #[inline]
    fn exec_sys(&mut self, op: Opcode, address: Address) -> Chip8Result<Flow> {
        debug_assert_eq!(op.op, 0x0);

        match op.nnn {
            // 00E0 (CLS)
            //
            // Clear display
            0x0E0 => {
                self.cpu.clear_display();
                Ok(Flow::Draw)
            }
            // 00EE (RET)
            //
            // Return from a subroutine.
            // Subtract 1 from the stack pointer.
            // Set the program counter to the value at the top of the stack.
            0x0EE => {
                if self.cpu.sp == 0 {
                    return Err(Chip8Error::StackUnderflow { address });
                }

                self.cpu.sp -= 1;
                self.cpu.pc = self.cpu.stack[self.cpu.sp];
                Ok(Flow::Jump)
            }
            // 0nnn (SYS addr) called machine code on the original hardware.
            _ => Err(decode_error(op, address)),
        }
    }

    /// Execute an arithmetic instruction
    ///
    /// Results are computed from the operands before anything is
    /// written, and the flag register VF is always written last.
    #[inline]
    fn exec_math(&mut self, op: Opcode, address: Address) -> Chip8Result<()> {
        debug_assert_eq!(op.op, 0x8);

        let (vx, vy) = (op.vx as usize, op.vy as usize);
        let (x, y) = (self.cpu.registers[vx], self.cpu.registers[vy]);

        match op.n {
            // 8xy0 (LD Vx, Vy)
            //
            // Store the value of register Vy in register Vx.
            0x0 => self.cpu.registers[vx] = y,
            // 8xy1 (OR Vx, Vy)
            0x1 => self.cpu.registers[vx] = x | y,
            // 8xy2 (AND Vx, Vy)
            0x2 => self.cpu.registers[vx] = x & y,
            // 8xy3 (XOR Vx, Vy)
            0x3 => self.cpu.registers[vx] = x ^ y,
            // 8xy4 (ADD Vx, Vy)
            //
            // Adds Vy to Vx, and stores the result in Vx.
            // Overflow is wrapped.
            // If overflow, set VF to 1, else 0.
            0x4 => {
                let (result, carry) = x.overflowing_add(y);
                self.cpu.registers[vx] = result;
                self.cpu.registers[FLAG_REGISTER] = carry as u8;
            }
            // 8xy5 (SUB Vx, Vy)
            //
            // Subtracts Vy from Vx, and stores the result in Vx.
            // VF is set to 0 when there is a borrow, set to 1 when there isn't.
            0x5 => {
                self.cpu.registers[vx] = x.wrapping_sub(y);
                self.cpu.registers[FLAG_REGISTER] = (x >= y) as u8;
            }
            // 8xy6 (SHR Vx)
            //
            // Least-significant bit of Vx is stored in VF.
            // Shift Vx right by 1.
            // Vy is unused.
            0x6 => {
                self.cpu.registers[vx] = x >> 1;
                self.cpu.registers[FLAG_REGISTER] = x & 1;
            }
            // 8xy7 (SUBN Vx, Vy)
            //
            // Subtracts Vx from Vy, and stores the result in Vy.
            // VF is set to 0 when there is a borrow, set to 1 when there isn't.
            0x7 => {
                self.cpu.registers[vy] = y.wrapping_sub(x);
                self.cpu.registers[FLAG_REGISTER] = (y >= x) as u8;
            }
            // 8xyE (SHL Vx)
            //
            // Most-significant bit of Vx is stored in VF.
            // Shift Vx left by 1.
            // Vy is unused.
            0xE => {
                self.cpu.registers[vx] = x << 1;
                self.cpu.registers[FLAG_REGISTER] = (x >> 7) & 1;
            }
            // ----------------------------------------------------------------
            // Unsupported operation.
            _ => return Err(decode_error(op, address)),
        }

        Ok(())
    }

    /// Dxyn (DRW Vx, Vy, nibble)
    ///
    /// Draw sprite to the display buffer, at coordinate as per registers Vx and Vy.
    /// Sprite is encoded as 8 pixels wide, N pixels high, stored in bits located in
    /// memory pointed to by address register I.
    ///
    /// If the sprite is drawn outside of the display area, it is wrapped around to the other side.
    ///
    /// If the drawing operation erases existing pixels in the display buffer, register VF is set to
    /// 1, and set to 0 if no display bits are unset. This is used for collision detection.
    fn draw_sprite(&mut self, op: Opcode) {
        let (x, y) = (
            self.cpu.registers[op.vx as usize] as usize,
            self.cpu.registers[op.vy as usize] as usize,
        );
        let addr = self.cpu.address as usize;
        let mut is_erased = false;

        for r in 0..op.n as usize {
            // Each row is 8 bits representing the 8 pixels of the sprite.
            let row = self.cpu.read_ram(addr + r);

            for c in 0..SPRITE_WIDTH {
                if (row >> (7 - c)) & 1 == 0 {
                    continue;
                }

                let d = ((x + c) & DISPLAY_WIDTH_MASK)
                    + ((y + r) & DISPLAY_HEIGHT_MASK) * DISPLAY_WIDTH;

                // XOR erases a pixel when both the old and new values are both 1.
                let old_px = self.cpu.display[d];
                is_erased |= old_px;
                self.cpu.display[d] = !old_px;
            }
        }

        // If a pixel was erased, then a collision occurred.
        self.cpu.registers[FLAG_REGISTER] = is_erased as u8;
        self.cpu.draw_flag = true;
    }

    /// Execute a keyboard instruction
    #[inline]
    fn exec_key(&mut self, op: Opcode, address: Address) -> Chip8Result<()> {
        debug_assert_eq!(op.op, 0xE);

        let key = self.cpu.registers[op.vx as usize];

        match op.nn {
            // Ex9E (SKP Vx)
            //
            // Skip next instruction if the key with the value of Vx is pressed.
            0x9E => self.skip_if(self.cpu.key_state(key)),
            // ExA1 (SKNP Vx)
            //
            // Skip next instruction if the key with the value of Vx is not pressed.
            0xA1 => self.skip_if(!self.cpu.key_state(key)),
            _ => return Err(decode_error(op, address)),
        }

        Ok(())
    }

    /// Execute a miscellaneous instruction
    #[inline]
    fn exec_misc(&mut self, op: Opcode, address: Address) -> Chip8Result<Flow> {
        debug_assert_eq!(op.op, 0xF);

        let vx = op.vx as usize;
        let x = self.cpu.registers[vx];
        let addr = self.cpu.address as usize;

        let mut control_flow = Flow::Ok;

        match op.nn {
            // Fx07 (LD Vx, DT)
            //
            // Set Vx = delay timer value.
            0x07 => self.cpu.registers[vx] = self.cpu.delay_timer,
            // Fx0A (LD Vx, K)
            //
            // Wait for a key press, store the value of the key in Vx.
            // All execution stops until a key is pressed, then the value of that key is stored in Vx.
            0x0A => {
                if let Some(k) = self.cpu.first_key() {
                    self.cpu.registers[vx] = k;
                } else {
                    // rewind the program counter to stall the machine
                    self.cpu.pc = self.cpu.pc.wrapping_sub(2);
                    control_flow = Flow::KeyWait;
                }
            }
            // Fx15 (LD DT, Vx)
            //
            // Set delay timer = Vx.
            0x15 => self.cpu.delay_timer = x,
            // Fx18 (LD ST, Vx)
            //
            // Set sound timer = Vx.
            0x18 => {
                self.cpu.sound_timer = x;
                control_flow = Flow::Sound;
            }
            // Fx1E (ADD I, Vx)
            //
            // Add Vx to I
            0x1E => self.cpu.address = self.cpu.address.wrapping_add(x as Address),
            // Fx29 (LD F, Vx)
            //
            // Set I = location of sprite for digit Vx.
            0x29 => {
                self.cpu.address = FONTSET_START + (x & 0xF) as Address * FONTSET_HEIGHT as Address;
            }
            // Fx33 (LD B, Vx)
            //
            // Store the binary-coded decimal representation of Vx
            // in the memory locations I, I+1, and I+2.
            #[rustfmt::skip]
            0x33 => {
                self.cpu.write_ram(addr,     x / 100 % 10);
                self.cpu.write_ram(addr + 1, x / 10  % 10);
                self.cpu.write_ram(addr + 2, x       % 10);
            }
            // Fx55 (LD [I], Vx)
            //
            // Store registers V0 through Vx in memory starting at location I.
            0x55 => {
                for v in 0..=vx {
                    let value = self.cpu.registers[v];
                    self.cpu.write_ram(addr + v, value);
                }
            }
            // Fx65 (LD Vx, [I])
            //
            // Read registers V0 through Vx from memory starting at location I.
            0x65 => {
                for v in 0..=vx {
                    self.cpu.registers[v] = self.cpu.read_ram(addr + v);
                }
            }
            // ----------------------------------------------------------------
            // Unsupported operation.
            _ => return Err(decode_error(op, address)),
        }

        Ok(control_flow)
    }
}

#[inline]
fn decode_error(op: Opcode, address: Address) -> Chip8Error {
    Chip8Error::Decode {
        opcode: op.code,
        address,
    }
}

/// Troubleshooting
impl Chip8Vm {
    /// Returns the contents of the program memory as a human readable string.
    pub fn dump_ram(&self, count: usize) -> Result<String, fmt::Error> {
        let iter = self
            .cpu
            .ram
            .iter()
            .enumerate()
            .skip(MEM_START)
            .take(count)
            .step_by(2);
        let mut buf = String::new();

        for (i, op) in iter {
            let next = self.cpu.read_ram(i + 1);
            writeln!(buf, "{:04X}: {:02X}{:02X}", i, op, next)?;
        }

        Ok(buf)
    }

    pub fn dump_display(&self) -> Result<String, fmt::Error> {
        let mut buf = String::new();

        for y in 0..DISPLAY_HEIGHT {
            for x in 0..DISPLAY_WIDTH {
                if self.cpu.display[x + y * DISPLAY_WIDTH] {
                    write!(buf, "#")?;
                } else {
                    write!(buf, ".")?;
                }
            }
            writeln!(buf)?;
        }

        Ok(buf)
    }

    pub fn dump_keys(&self) -> Result<String, fmt::Error> {
        let mut buf = String::new();

        if self.cpu.any_key() {
            write!(buf, "keys: ")?;
            for i in 0..KEY_COUNT {
                if self.cpu.key_state(i) {
                    write!(buf, "k{i:x}")?;
                }
            }
        }

        Ok(buf)
    }
}
