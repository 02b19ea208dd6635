//! Virtual machine.
use std::fmt::{self, Write};

use rand::prelude::*;

use crate::{
    bytecode::Opcode,
    conf::Chip8Conf,
    constants::*,
    cpu::{Chip8Cpu, CpuState},
    devices::{KeyCode, Snapshot},
    error::{Chip8Error, Chip8Result},
};

pub struct Chip8Vm {
    cpu: Chip8Cpu,
    rng: StdRng,
    conf: Chip8Conf,
}

impl Chip8Vm {
    pub fn new(conf: Chip8Conf) -> Self {
        let mut vm = Chip8Vm {
            cpu: Chip8Cpu::new(),
            rng: seed_rng(conf.seed),
            conf,
        };
        vm.initialize();
        vm
    }

    /// Configuration that was used to instantiate the VM.
    pub fn config(&self) -> &Chip8Conf {
        &self.conf
    }

    /// Bring the machine back to its power-on state.
    ///
    /// Memory is cleared, the font is written to the bottom of memory and
    /// the random number generator is reseeded. Safe to call repeatedly.
    pub fn initialize(&mut self) {
        self.cpu.reset();
        self.rng = seed_rng(self.conf.seed);
        log::debug!("initialized VM");
    }

    /// Load a program into memory at `MEM_START`, reinitializing the machine.
    ///
    /// Nothing is modified when the program doesn't fit.
    pub fn load_program(&mut self, bytecode: &[u8]) -> Chip8Result<()> {
        if !check_program_size(bytecode) {
            return Err(Chip8Error::CapacityExceeded {
                size: bytecode.len(),
                capacity: MAX_PROGRAM_SIZE,
            });
        }

        // Start with clean memory to avoid leaking previous program.
        self.initialize();

        // Load program into virtual RAM
        self.cpu.ram[MEM_START..MEM_START + bytecode.len()].copy_from_slice(bytecode);
        log::debug!("loaded program of {} bytes", bytecode.len());

        Ok(())
    }

    pub fn display_buffer(&self) -> &Framebuffer {
        &self.cpu.display
    }
}

fn seed_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

#[inline]
fn check_program_size(bytecode: &[u8]) -> bool {
    bytecode.len() <= MAX_PROGRAM_SIZE
}

/// Outcome of a single step, for the driver to decide what to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Ok,
    /// Program counter has jumped to a new address.
    ///
    /// This is returned when the interpreter encounters:
    ///
    /// - 1nnn (`JP addr`)
    /// - 2nnn (`CALL addr`)
    /// - 00EE (`RET`)
    /// - Bnnn (`JP V0, addr`)
    Jump,
    /// The display buffer changed and should be presented.
    Draw,
    /// The sound timer was started.
    Sound,
    /// Wait for a keypress.
    ///
    /// This is triggered by the opcode `Fx0A` (`LD Vx, K`), which stops
    /// execution until a key is pressed, and loads the key value into `Vx`.
    KeyWait,
    /// Instruction word was not recognised and was skipped.
    Unknown(u16),
}

/// Register access
impl Chip8Vm {
    pub fn pc(&self) -> usize {
        self.cpu.pc
    }

    pub fn sp(&self) -> usize {
        self.cpu.sp
    }

    /// Return addresses currently on the call stack, oldest first.
    pub fn stack(&self) -> &[Address] {
        &self.cpu.stack[..self.cpu.sp]
    }

    pub fn opcode(&self) -> Opcode {
        self.cpu.opcode
    }

    pub fn registers(&self) -> &[u8; REGISTER_COUNT] {
        &self.cpu.registers
    }

    /// Index register I.
    pub fn address(&self) -> Address {
        self.cpu.address
    }

    pub fn delay_timer(&self) -> u8 {
        self.cpu.delay_timer
    }

    pub fn sound_timer(&self) -> u8 {
        self.cpu.sound_timer
    }

    pub fn state(&self) -> CpuState {
        self.cpu.state
    }

    pub fn ticks(&self) -> u64 {
        self.cpu.ticks
    }

    pub fn ram(&self) -> &[u8; MEM_SIZE] {
        &self.cpu.ram
    }

    /// Copy of the registers for the debugger.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            opcode: self.cpu.opcode,
            mnemonic: self.cpu.opcode.mnemonic(),
            address: self.cpu.address,
            pc: self.cpu.pc,
            ticks: self.cpu.ticks,
            sp: self.cpu.sp,
            stack: self.cpu.stack,
            registers: self.cpu.registers,
            delay_timer: self.cpu.delay_timer,
            sound_timer: self.cpu.sound_timer,
            key_wait: matches!(self.cpu.state, CpuState::AwaitingKey { .. }),
        }
    }
}

/// Interpreter
impl Chip8Vm {
    /// Sets the keyboard key input state.
    pub fn set_key(&mut self, key: KeyCode, pressed: bool) {
        self.cpu.set_key_state(key.as_u8(), pressed);
    }

    pub fn is_pressed(&self, key: KeyCode) -> bool {
        self.cpu.key_state(key.as_u8())
    }

    /// Clear the keyboard input state, setting all keys to up.
    pub fn clear_keys(&mut self) {
        self.cpu.clear_keys()
    }

    /// Count down the delay and sound timers by one.
    ///
    /// Must be called at 60Hz, independent of the instruction rate.
    pub fn tick_timers(&mut self) {
        self.cpu.tick_delay();
        self.cpu.tick_sound();
    }

    /// Buzzer should be on while the sound timer counts down.
    pub fn is_buzzing(&self) -> bool {
        self.cpu.sound_timer > 0
    }

    /// Execute the given number of cycles, stopping early on errors.
    pub fn run_steps(&mut self, step_count: usize) -> Chip8Result<Flow> {
        let mut flow = Flow::Ok;

        for _ in 0..step_count {
            flow = self.step()?;
        }

        Ok(flow)
    }

    /// Read the instruction word at the program counter.
    pub fn fetch(&mut self) -> Chip8Result<Opcode> {
        let [hi, lo] = self.cpu.instr()?;
        self.cpu.opcode = Opcode::from_bytes(hi, lo);
        Ok(self.cpu.opcode)
    }

    /// Run one cycle.
    ///
    /// While the machine is waiting for a key press no instruction is fetched,
    /// and [`Flow::KeyWait`] is returned until a new key goes down.
    pub fn step(&mut self) -> Chip8Result<Flow> {
        if let CpuState::AwaitingKey { register, held } = self.cpu.state {
            return Ok(self.resume_key_wait(register, held));
        }

        let opcode = self.fetch()?;
        self.execute(opcode)
    }

    /// Execute a single instruction against the current state.
    pub fn execute(&mut self, opcode: Opcode) -> Chip8Result<Flow> {
        op_trace(&self.cpu, opcode);

        self.cpu.opcode = opcode;

        let vx = opcode.x() as usize;
        let vy = opcode.y() as usize;
        let (n, nn, nnn) = (opcode.n(), opcode.nn(), opcode.nnn());

        let control_flow = match opcode.op() {
            // Miscellaneous instructions identified by nn
            0x0 | 0xE | 0xF => self.exec_misc(opcode)?,
            // 1nnn (JP addr)
            //
            // Jump to address.
            0x1 => {
                self.cpu.pc = nnn as usize;
                Flow::Jump
            }
            // 2nnn (CALL addr)
            //
            // Call subroutine at nnn.
            // The current program counter is pushed, and incremented on return.
            0x2 => {
                if self.cpu.sp >= STACK_SIZE {
                    return Err(Chip8Error::StackOverflow { pc: self.cpu.pc });
                }

                self.cpu.stack[self.cpu.sp] = self.cpu.pc as Address;
                self.cpu.sp += 1;
                self.cpu.pc = nnn as usize;
                Flow::Jump
            }
            // 3xnn (SE Vx, byte)
            //
            // Skip the next instruction if register VX equals value NN.
            0x3 => self.skip_if(self.cpu.registers[vx] == nn),
            // 4xnn (SNE Vx, byte)
            //
            // Skip the next instruction if register VX does not equal value NN.
            0x4 => self.skip_if(self.cpu.registers[vx] != nn),
            // 5xy0 (SE Vx, Vy)
            //
            // Skip the next instruction if register VX equals value VY.
            0x5 if n == 0 => {
                self.skip_if(self.cpu.registers[vx] == self.cpu.registers[vy])
            }
            // 6xnn (LD Vx, byte)
            //
            // Set register VX to value NN.
            0x6 => {
                self.cpu.registers[vx] = nn;
                self.next()
            }
            // 7xnn (ADD Vx, byte)
            //
            // Add value NN to register VX. Carry flag is not set.
            0x7 => {
                self.cpu.registers[vx] = self.cpu.registers[vx].wrapping_add(nn);
                self.next()
            }
            // Arithmetic instructions indentified by n
            0x8 => self.exec_math(opcode),
            // 9xy0 (SNE Vx, Vy)
            //
            // Skip next instruction if Vx != Vy.
            0x9 if n == 0 => {
                self.skip_if(self.cpu.registers[vx] != self.cpu.registers[vy])
            }
            // Annn (LD I, addr)
            //
            // Set address register I to value NNN.
            0xA => {
                self.cpu.address = nnn;
                self.next()
            }
            // Bnnn (JP V0, addr)
            //
            // Jump to address NNN offset by V0.
            0xB => {
                self.cpu.pc = nnn as usize + self.cpu.registers[0] as usize;
                Flow::Jump
            }
            // Cxnn (RND Vx, byte)
            //
            // Generate random number.
            // Set register VX to the result of bitwise AND between a random number and NN.
            0xC => {
                self.cpu.registers[vx] = nn & self.rng.gen::<u8>();
                self.next()
            }
            // Dxyn (DRW Vx, Vy, nibble)
            //
            // Draw sprite to the display buffer, at coordinate as per registers Vx and Vy.
            0xD => {
                self.draw(vx, vy, n)?;
                self.next();
                Flow::Draw
            }
            // Unsupported operation.
            _ => self.unknown(opcode),
        };

        // Rejected instructions don't count as a cycle.
        self.cpu.ticks += 1;

        Ok(control_flow)
    }

    /// Advance to the next instruction.
    #[inline(always)]
    fn next(&mut self) -> Flow {
        self.cpu.pc += 2;
        Flow::Ok
    }

    /// Advance to the next instruction, skipping over it when the condition holds.
    #[inline(always)]
    fn skip_if(&mut self, cond: bool) -> Flow {
        self.cpu.pc += if cond { 4 } else { 2 };
        Flow::Ok
    }

    /// Unrecognised instructions are skipped rather than halting the machine.
    fn unknown(&mut self, opcode: Opcode) -> Flow {
        log::warn!("unknown opcode {} at {:#05X}", opcode, self.cpu.pc);
        self.cpu.pc += 2;
        Flow::Unknown(opcode.word())
    }

    /// Check whether a key went down since the wait started.
    fn resume_key_wait(&mut self, register: u8, held: u16) -> Flow {
        match self.cpu.take_key_press(held) {
            Some(key) => {
                self.cpu.registers[register as usize] = key;
                self.cpu.state = CpuState::Running;
                self.next()
            }
            None => {
                // Released keys may count as new presses later.
                self.cpu.state = CpuState::AwaitingKey {
                    register,
                    held: held & self.cpu.key_state,
                };
                Flow::KeyWait
            }
        }
    }

    /// Sprite is encoded as 8 pixels wide, N pixels high, stored in bits located in
    /// memory pointed to by address register I.
    ///
    /// The start coordinate always wraps. Pixels that run over the edge either wrap
    /// around to the other side, or are clipped, depending on [`Quirks::clip_sprites`].
    ///
    /// If the drawing operation erases existing pixels in the display buffer, register VF is set to
    /// 1, and set to 0 if no display bits are unset. This is used for collision detection.
    ///
    /// [`Quirks::clip_sprites`]: crate::conf::Quirks::clip_sprites
    fn draw(&mut self, vx: usize, vy: usize, n: u8) -> Chip8Result<()> {
        let clip = self.conf.quirks.clip_sprites;
        let x0 = self.cpu.registers[vx] as usize & DISPLAY_WIDTH_MASK;
        let y0 = self.cpu.registers[vy] as usize & DISPLAY_HEIGHT_MASK;

        // Read the whole sprite before anything is written.
        let height = n as usize;
        let mut sprite = [0u8; 0x10];
        sprite[..height].copy_from_slice(self.cpu.mem(self.cpu.address as usize, height)?);

        self.cpu.set_flag(false);
        let mut is_erased = false;

        for (r, row) in sprite[..height].iter().enumerate() {
            let y = y0 + r;
            if clip && y >= DISPLAY_HEIGHT {
                break;
            }

            // Each row is 8 bits representing the 8 pixels of the sprite.
            for c in 0..8 {
                if (row >> (7 - c)) & 1 == 0 {
                    continue;
                }

                let x = x0 + c;
                if clip && x >= DISPLAY_WIDTH {
                    break;
                }

                let d = (x & DISPLAY_WIDTH_MASK) + (y & DISPLAY_HEIGHT_MASK) * DISPLAY_WIDTH;

                // XOR erases a pixel when both the old and new values are both 1.
                is_erased |= self.cpu.display[d] == 1;
                self.cpu.display[d] ^= 1;
            }
        }

        // If a pixel was erased, then a collision occurred.
        self.cpu.set_flag(is_erased);

        Ok(())
    }

    /// Execute an arithmetic instruction
    ///
    /// The result is written to VX before the flag, so the flag wins when X is F.
    #[inline]
    #[must_use]
    fn exec_math(&mut self, opcode: Opcode) -> Flow {
        debug_assert_eq!(opcode.op(), 0x8);

        let (vx, vy) = (opcode.x() as usize, opcode.y() as usize);
        let (x, y) = (self.cpu.registers[vx], self.cpu.registers[vy]);
        let shift_source = if self.conf.quirks.shift_reads_vy { y } else { x };

        match opcode.n() {
            // 8xy0 (LD Vx, Vy)
            //
            // Store the value of register VY in register VX.
            0x0 => self.cpu.registers[vx] = y,
            // 8xy1 (OR Vx, Vy)
            0x1 => self.cpu.registers[vx] = x | y,
            // 8xy2 (AND Vx, Vy)
            0x2 => self.cpu.registers[vx] = x & y,
            // 8xy3 (XOR Vx, Vy)
            0x3 => self.cpu.registers[vx] = x ^ y,
            // 8xy4 (ADD Vx, Vy)
            //
            // ADDs VX to VY, and stores the result in VX.
            // Overflow is wrapped.
            // If overflow, set VF to 1, else 0.
            0x4 => {
                let (result, carry) = x.overflowing_add(y);
                self.cpu.registers[vx] = result;
                self.cpu.set_flag(carry);
            }
            // 8xy5 (SUB Vx, Vy)
            //
            // Subtracts VY from VX, and stores the result in VX.
            // VF is set to 1 when VX is larger than VY, otherwise 0.
            0x5 => {
                self.cpu.registers[vx] = x.wrapping_sub(y);
                self.cpu.set_flag(x > y);
            }
            // 8xy6 (SHR Vx {, Vy})
            //
            // VF is set to the least-significant bit of the source before the shift.
            0x6 => {
                self.cpu.registers[vx] = shift_source >> 1;
                self.cpu.set_flag(shift_source & 1 == 1);
            }
            // 8xy7 (SUBN Vx, Vy)
            //
            // Subtracts VX from VY, and stores the result in VX.
            // VF is set to 1 when VY is larger than VX, otherwise 0.
            0x7 => {
                self.cpu.registers[vx] = y.wrapping_sub(x);
                self.cpu.set_flag(y > x);
            }
            // 8xyE (SHL Vx {, Vy})
            //
            // VF is set to the most-significant bit of the source before the shift.
            0xE => {
                self.cpu.registers[vx] = shift_source << 1;
                self.cpu.set_flag(shift_source & 0x80 != 0);
            }
            // ----------------------------------------------------------------
            // Unsupported operation.
            _ => return self.unknown(opcode),
        }

        self.next()
    }

    /// Execute a miscellaneous instruction
    #[inline]
    fn exec_misc(&mut self, opcode: Opcode) -> Chip8Result<Flow> {
        let vx = opcode.x() as usize;

        let control_flow = match (opcode.op(), opcode.nn()) {
            // Empty memory is skipped over without reporting it as unknown,
            // so running off the end of a program doesn't flood the log.
            (0x0, 0x00) if opcode.word() == 0x0000 => self.next(),
            // ----------------------------------------------------------------
            // 00E0 (CLS)
            //
            // Clear display
            (0x0, 0xE0) if opcode.x() == 0 => {
                self.cpu.clear_display();
                self.next();
                Flow::Draw
            }
            // 00EE (RET)
            //
            // Return from a subroutine.
            // Pop the call address off the stack, then continue after it.
            (0x0, 0xEE) if opcode.x() == 0 => {
                if self.cpu.sp == 0 {
                    return Err(Chip8Error::StackUnderflow { pc: self.cpu.pc });
                }

                self.cpu.sp -= 1;
                self.cpu.pc = self.cpu.stack[self.cpu.sp] as usize + 2;
                Flow::Jump
            }
            // ----------------------------------------------------------------
            // Ex9E (SKP Vx)
            //
            // Skip the next instruction if the key in Vx is pressed.
            (0xE, 0x9E) => self.skip_if(self.cpu.key_state(self.cpu.registers[vx])),
            // ExA1 (SKNP Vx)
            //
            // Skip the next instruction if the key in Vx is not pressed.
            (0xE, 0xA1) => self.skip_if(!self.cpu.key_state(self.cpu.registers[vx])),
            // ----------------------------------------------------------------
            // Fx07 (LD Vx, DT)
            //
            // Set Vx = delay timer value.
            (0xF, 0x07) => {
                self.cpu.registers[vx] = self.cpu.delay_timer;
                self.next()
            }
            // Fx0A (LD Vx, K)
            //
            // Wait for a key press, store the value of the key in Vx.
            // The program counter stays on this instruction until a key goes down.
            (0xF, 0x0A) => {
                self.cpu.clear_pressed_edges();
                self.cpu.state = CpuState::AwaitingKey {
                    register: vx as u8,
                    held: self.cpu.key_state,
                };
                Flow::KeyWait
            }
            // Fx15 (LD DT, Vx)
            //
            // Set delay timer = Vx.
            (0xF, 0x15) => {
                self.cpu.delay_timer = self.cpu.registers[vx];
                self.next()
            }
            // Fx18 (LD ST, Vx)
            //
            // Set sound timer = Vx.
            (0xF, 0x18) => {
                self.cpu.sound_timer = self.cpu.registers[vx];
                self.next();
                if self.cpu.sound_timer > 0 {
                    Flow::Sound
                } else {
                    Flow::Ok
                }
            }
            // Fx1E (ADD I, Vx)
            //
            // Add Vx to I
            (0xF, 0x1E) => {
                let x = self.cpu.registers[vx] as Address;
                self.cpu.address = self.cpu.address.wrapping_add(x);
                self.next()
            }
            // Fx29 (LD F, Vx)
            //
            // Set I = location of sprite for digit Vx.
            (0xF, 0x29) => {
                let x = self.cpu.registers[vx] as Address;
                self.cpu.address = FONTSET_START + x * FONTSET_HEIGHT as Address;
                self.next()
            }
            // Fx33 (LD B, Vx)
            //
            // Store the binary-coded decimal representation of Vx
            // in the memory locations I, I+1, and I+2.
            (0xF, 0x33) => {
                let x = self.cpu.registers[vx];
                let digits = self.cpu.mem_mut(self.cpu.address as usize, 3)?;
                digits.copy_from_slice(&[x / 100, x / 10 % 10, x % 10]);
                self.next()
            }
            // Fx55 (LD [I], Vx)
            //
            // Store registers V0 through Vx in memory starting at location I.
            // I is left unchanged.
            (0xF, 0x55) => {
                let registers = self.cpu.registers;
                let dest = self.cpu.mem_mut(self.cpu.address as usize, vx + 1)?;
                dest.copy_from_slice(&registers[..=vx]);
                self.next()
            }
            // Fx65 (LD Vx, [I])
            //
            // Read registers V0 through Vx from memory starting at location I.
            // I is left unchanged.
            (0xF, 0x65) => {
                let mut values = [0u8; REGISTER_COUNT];
                values[..=vx].copy_from_slice(self.cpu.mem(self.cpu.address as usize, vx + 1)?);
                self.cpu.registers[..=vx].copy_from_slice(&values[..=vx]);
                self.next()
            }
            // ----------------------------------------------------------------
            // Unsupported operation.
            _ => self.unknown(opcode),
        };

        Ok(control_flow)
    }
}

/// Troubleshooting
impl Chip8Vm {
    /// Returns the program memory as a human readable listing.
    pub fn dump_ram(&self, count: usize) -> Result<String, fmt::Error> {
        let end = MEM_START.saturating_add(count).min(MEM_SIZE);
        crate::disasm::Disassembler::with_origin(&self.cpu.ram[MEM_START..end], MEM_START)
            .listing()
    }

    pub fn dump_display(&self) -> Result<String, fmt::Error> {
        let mut buf = String::new();

        for y in 0..DISPLAY_HEIGHT {
            for x in 0..DISPLAY_WIDTH {
                if self.cpu.display[x + y * DISPLAY_WIDTH] == 1 {
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

#[cfg(feature = "op_trace")]
#[inline]
fn op_trace(cpu: &Chip8Cpu, opcode: Opcode) {
    log::trace!("{:04X}: {} {}", cpu.pc, opcode, opcode.mnemonic());
}

#[cfg(not(feature = "op_trace"))]
#[inline]
fn op_trace(_: &Chip8Cpu, _: Opcode) {}
