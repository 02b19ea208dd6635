//! CPU and memory state.
use crate::{
    bytecode::Opcode,
    constants::*,
    error::{Chip8Error, Chip8Result},
};

/// Execution state of the CPU.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum CpuState {
    /// Fetching and executing instructions.
    #[default]
    Running,
    /// Stalled on `Fx0A (LD Vx, K)` until a key goes down.
    AwaitingKey {
        /// Register VX that receives the key.
        register: u8,
        /// Keys that were already held when the wait started.
        /// These don't count as a new key press.
        held: u16,
    },
}

/// Core state for a chip8 interpreter.
pub struct Chip8Cpu {
    // ------------------------------------------------------------------------
    // Registers
    /// Program counter pointing to the current instruction.
    pub(crate) pc: usize,
    /// Stack pointer, the number of return addresses on the stack.
    pub(crate) sp: usize,
    /// Instruction word that was last fetched.
    pub(crate) opcode: Opcode,
    /// General purpose registers for temporary values.
    ///
    /// Register 16 (VF) is used for either the carry flag or borrow switch depending on opcode.
    /// Use [`Chip8Cpu::flag`] and [`Chip8Cpu::set_flag`] when it's used as a flag.
    pub(crate) registers: [u8; REGISTER_COUNT],
    /// Pointer register used for temporarily storing an address.
    pub(crate) address: Address,
    /// (DT) Delay timer that counts down to 0.
    pub(crate) delay_timer: u8,
    /// (ST) Sound timer that counts down to 0. When it has a non-zero value, a beep is played.
    pub(crate) sound_timer: u8,
    /// Keyboard input state. Pressed is a 1 bit, released is a 0 bit.
    pub(crate) key_state: u16,
    /// Keys that went down since the latch was last taken, even if they
    /// were released again in the meantime.
    pub(crate) pressed_edges: u16,
    pub(crate) state: CpuState,
    /// Number of executed cycles since the program was loaded.
    pub(crate) ticks: u64,

    // ------------------------------------------------------------------------
    // Memory
    /// Main memory storage space.
    pub(crate) ram: Box<[u8; MEM_SIZE]>,
    /// Stack of return pointers used for jumping when a routine call finishes.
    pub(crate) stack: [Address; STACK_SIZE],
    /// Screen buffer that is drawn too.
    pub(crate) display: Box<Framebuffer>,
}

impl Default for Chip8Cpu {
    fn default() -> Self {
        Self {
            pc: MEM_START,
            sp: 0,
            opcode: Opcode::default(),
            registers: [0; REGISTER_COUNT],
            address: 0,
            delay_timer: 0,
            sound_timer: 0,
            key_state: 0,
            pressed_edges: 0,
            state: CpuState::Running,
            ticks: 0,

            ram: Box::new([0; MEM_SIZE]),
            stack: [0; STACK_SIZE],
            display: Box::new([0; DISPLAY_BUFFER_SIZE]),
        }
    }
}

impl Chip8Cpu {
    pub fn new() -> Self {
        Default::default()
    }

    /// Put every register and memory buffer back into its power-on state.
    ///
    /// The font is written to the bottom of memory. Keyboard state is
    /// left alone because it mirrors the physical keys.
    pub(crate) fn reset(&mut self) {
        self.pc = MEM_START;
        self.sp = 0;
        self.opcode = Opcode::default();
        self.registers.fill(0);
        self.address = 0;
        self.delay_timer = 0;
        self.sound_timer = 0;
        self.state = CpuState::Running;
        self.pressed_edges = 0;
        self.ticks = 0;

        self.clear_memory();
        let start = FONTSET_START as usize;
        self.ram[start..start + FONTSET_DATA_LENGTH].copy_from_slice(&FONTSET);
    }

    /// Erase the contents of the memory buffers `ram`, `stack` and `display`.
    pub(crate) fn clear_memory(&mut self) {
        self.ram.fill(0);
        self.stack.fill(0);
        self.display.fill(0);
    }

    pub fn clear_display(&mut self) {
        self.display.fill(0);
    }

    /// Value of the flag register VF.
    #[inline(always)]
    pub fn flag(&self) -> u8 {
        self.registers[FLAG_REGISTER]
    }

    /// Write the carry, borrow or collision outcome into VF.
    #[inline(always)]
    pub fn set_flag(&mut self, on: bool) {
        self.registers[FLAG_REGISTER] = on as u8;
    }

    pub fn set_key_state(&mut self, key_id: u8, state: bool) {
        if key_id < KEY_COUNT {
            if state {
                if self.key_state & (1 << key_id) == 0 {
                    self.pressed_edges |= 1 << key_id;
                }
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

    /// Forget key presses seen so far.
    #[inline(always)]
    pub fn clear_pressed_edges(&mut self) {
        self.pressed_edges = 0;
    }

    /// Retrieve the lowest key that is pressed now but wasn't in the `held` set,
    /// or that went down since the last call. Empties the press latch.
    #[inline]
    pub fn take_key_press(&mut self, held: u16) -> Option<u8> {
        let fresh = (self.key_state & !held) | self.pressed_edges;
        self.pressed_edges = 0;
        if fresh == 0 {
            None
        } else {
            Some(fresh.trailing_zeros() as u8)
        }
    }

    /// Clear the keyboard input state, setting all keys to up.
    #[inline(always)]
    pub fn clear_keys(&mut self) {
        self.key_state = 0;
    }

    /// Count down the delay timer.
    #[inline]
    pub fn tick_delay(&mut self) {
        self.delay_timer = self.delay_timer.saturating_sub(1);
    }

    /// Count down the sound timer.
    #[inline]
    pub fn tick_sound(&mut self) {
        self.sound_timer = self.sound_timer.saturating_sub(1);
    }

    /// Extract the instruction bytes at the current program counter.
    #[inline]
    pub fn instr(&self) -> Chip8Result<[u8; 2]> {
        if self.pc > MAX_PC {
            return Err(Chip8Error::PcOutOfBounds { pc: self.pc });
        }
        Ok([self.ram[self.pc], self.ram[self.pc + 1]])
    }

    /// Borrow `len` bytes of memory starting at `address`.
    #[inline]
    pub fn mem(&self, address: usize, len: usize) -> Chip8Result<&[u8]> {
        check_range(address, len)?;
        Ok(&self.ram[address..address + len])
    }

    /// Mutably borrow `len` bytes of memory starting at `address`.
    #[inline]
    pub fn mem_mut(&mut self, address: usize, len: usize) -> Chip8Result<&mut [u8]> {
        check_range(address, len)?;
        Ok(&mut self.ram[address..address + len])
    }
}

/// Reports the first address past the end of memory, if the range overruns.
#[inline]
fn check_range(address: usize, len: usize) -> Chip8Result<()> {
    if address + len > MEM_SIZE {
        Err(Chip8Error::MemoryOutOfBounds {
            address: address.max(MEM_SIZE),
        })
    } else {
        Ok(())
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
        assert!(cpu.key_state(15));

        // Out of range keys are ignored.
        cpu.set_key_state(16, true);
        assert_eq!(cpu.key_state, 0b10000000_10000000);
        assert!(!cpu.key_state(16));
    }

    #[test]
    fn test_take_key_press() {
        let mut cpu = Chip8Cpu::default();
        cpu.set_key_state(3, true);
        cpu.clear_pressed_edges();
        let held = cpu.key_state;

        assert_eq!(cpu.take_key_press(held), None);

        cpu.set_key_state(9, true);
        assert_eq!(cpu.take_key_press(held), Some(9));
    }

    #[test]
    fn test_pressed_edges() {
        let mut cpu = Chip8Cpu::default();

        // Tap between two polls is latched.
        cpu.set_key_state(0xB, true);
        cpu.set_key_state(0xB, false);
        assert_eq!(cpu.pressed_edges, 1 << 0xB);
        assert_eq!(cpu.take_key_press(0), Some(0xB));
        assert_eq!(cpu.take_key_press(0), None);

        // Repeated down events for a held key aren't new presses.
        cpu.set_key_state(2, true);
        cpu.clear_pressed_edges();
        cpu.set_key_state(2, true);
        assert_eq!(cpu.pressed_edges, 0);

        cpu.set_key_state(4, true);
        cpu.reset();
        assert_eq!(cpu.pressed_edges, 0);
    }

    #[test]
    fn test_timers_stop_at_zero() {
        let mut cpu = Chip8Cpu::default();
        cpu.delay_timer = 1;
        cpu.tick_delay();
        cpu.tick_delay();
        cpu.tick_sound();
        assert_eq!(cpu.delay_timer, 0);
        assert_eq!(cpu.sound_timer, 0);
    }

    #[test]
    fn test_reset_writes_font() {
        let mut cpu = Chip8Cpu::default();
        cpu.ram[0x300] = 0xAB;
        cpu.registers[4] = 9;
        cpu.reset();

        assert_eq!(&cpu.ram[0..FONTSET_DATA_LENGTH], &FONTSET[..]);
        assert_eq!(cpu.ram[0x300], 0);
        assert_eq!(cpu.registers[4], 0);
        assert_eq!(cpu.pc, MEM_START);
    }

    #[test]
    fn test_bounds() {
        let cpu = Chip8Cpu::default();
        assert!(cpu.mem(MEM_SIZE - 3, 3).is_ok());
        assert!(matches!(
            cpu.mem(MEM_SIZE - 2, 3),
            Err(Chip8Error::MemoryOutOfBounds { address: MEM_SIZE })
        ));
    }
}
