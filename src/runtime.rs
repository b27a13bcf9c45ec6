use std::cmp::Ordering;

use miette::Result;

use crate::error;
use crate::image::Image;
use crate::term::Console;

/// LC3 can address 128KB of memory.
pub const MEMORY_MAX: usize = 0x10000;

/// Keyboard status register; bit 15 is set while a key is waiting.
pub const KBSR: u16 = 0xFE00;
/// Keyboard data register; holds the key latched by the last KBSR read.
pub const KBDR: u16 = 0xFE02;

/// Address of the first instruction executed after load.
const PC_START: u16 = 0x3000;

/// Represents complete program state during runtime.
///
/// Generic over the [`Console`] that backs the memory-mapped keyboard
/// registers and the I/O traps, so the machine can run headless in tests.
pub struct RunState<C> {
    /// System memory - 128KB in size.
    mem: Box<[u16; MEMORY_MAX]>,
    /// Program counter
    pc: u16,
    /// 8x 16-bit registers
    reg: [u16; 8],
    /// Condition code
    flag: RunFlag,
    /// Cleared by the HALT trap.
    running: bool,
    /// Terminal capability.
    console: C,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunFlag {
    N = 0b100,
    Z = 0b010,
    P = 0b001,
}

/// Opcode field of an instruction word (bits 15..12).
///
/// `Rti` and `Res` are reserved in this architecture revision; executing
/// either is fatal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Opcode {
    Br = 0x0,
    Add = 0x1,
    Ld = 0x2,
    St = 0x3,
    Jsr = 0x4,
    And = 0x5,
    Ldr = 0x6,
    Str = 0x7,
    Rti = 0x8,
    Not = 0x9,
    Ldi = 0xA,
    Sti = 0xB,
    Jmp = 0xC,
    Res = 0xD,
    Lea = 0xE,
    Trap = 0xF,
}

impl Opcode {
    fn decode(instr: u16) -> Opcode {
        match instr >> 12 {
            0x0 => Self::Br,
            0x1 => Self::Add,
            0x2 => Self::Ld,
            0x3 => Self::St,
            0x4 => Self::Jsr,
            0x5 => Self::And,
            0x6 => Self::Ldr,
            0x7 => Self::Str,
            0x8 => Self::Rti,
            0x9 => Self::Not,
            0xA => Self::Ldi,
            0xB => Self::Sti,
            0xC => Self::Jmp,
            0xD => Self::Res,
            0xE => Self::Lea,
            0xF => Self::Trap,
            _ => unreachable!("opcode field is 4 bits wide"),
        }
    }
}

impl<C: Console> RunState<C> {
    pub fn new(console: C) -> RunState<C> {
        RunState {
            mem: Box::new([0; MEMORY_MAX]),
            pc: PC_START,
            reg: [0; 8],
            flag: RunFlag::Z,
            running: true,
            console,
        }
    }

    /// Copy a decoded image into memory. Later images may overwrite earlier
    /// ones at overlapping addresses.
    pub fn load(&mut self, image: &Image) {
        let orig = usize::from(image.orig());
        self.mem[orig..orig + image.words().len()].copy_from_slice(image.words());
    }

    /// Execute until the HALT trap clears the running bit.
    pub fn run(&mut self) -> Result<()> {
        while self.running {
            self.step()?;
        }
        Ok(())
    }

    /// Fetch, decode and execute the instruction at the program counter.
    pub fn step(&mut self) -> Result<()> {
        let instr = self.mem_read(self.pc);
        // PC is incremented before the instruction executes, so PC-relative
        // offsets are taken from the address of the following instruction
        self.pc = self.pc.wrapping_add(1);
        match Opcode::decode(instr) {
            Opcode::Br => self.br(instr),
            Opcode::Add => self.add(instr),
            Opcode::Ld => self.ld(instr),
            Opcode::St => self.st(instr),
            Opcode::Jsr => self.jsr(instr),
            Opcode::And => self.and(instr),
            Opcode::Ldr => self.ldr(instr),
            Opcode::Str => self.str(instr),
            Opcode::Not => self.not(instr),
            Opcode::Ldi => self.ldi(instr),
            Opcode::Sti => self.sti(instr),
            Opcode::Jmp => self.jmp(instr),
            Opcode::Lea => self.lea(instr),
            Opcode::Trap => self.trap(instr),
            op @ (Opcode::Rti | Opcode::Res) => {
                return Err(error::reserved_opcode(op as u16, self.pc.wrapping_sub(1)));
            }
        }
        Ok(())
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn reg(&self, reg: u16) -> u16 {
        self.reg[usize::from(reg & 0b111)]
    }

    pub fn flag(&self) -> RunFlag {
        self.flag
    }

    pub fn running(&self) -> bool {
        self.running
    }

    #[inline]
    fn reg_mut(&mut self, reg: u16) -> &mut u16 {
        &mut self.reg[usize::from(reg & 0b111)]
    }

    /// Read a memory word.
    ///
    /// A read of the keyboard status register first polls the console and
    /// refreshes both keyboard registers; consuming a pending key is a side
    /// effect of the read itself. Every read re-polls, so the status bit can
    /// flip back to zero once input is drained.
    fn mem_read(&mut self, addr: u16) -> u16 {
        if addr == KBSR {
            match self.console.poll() {
                Some(byte) => {
                    self.mem[usize::from(KBSR)] = 1 << 15;
                    self.mem[usize::from(KBDR)] = u16::from(byte);
                }
                None => self.mem[usize::from(KBSR)] = 0,
            }
        }
        self.mem[usize::from(addr)]
    }

    /// Unconditional store; no address is write-protected.
    fn mem_write(&mut self, addr: u16, val: u16) {
        self.mem[usize::from(addr)] = val;
    }

    #[inline]
    fn set_flags(&mut self, val: u16) {
        self.flag = match (val as i16).cmp(&0) {
            Ordering::Less => RunFlag::N,
            Ordering::Equal => RunFlag::Z,
            Ordering::Greater => RunFlag::P,
        }
    }

    fn add(&mut self, instr: u16) {
        let dr = (instr >> 9) & 0b111;
        let sr = (instr >> 6) & 0b111;

        let val1 = *self.reg_mut(sr);
        // Check if imm
        let val2 = if instr & 0b100000 == 0 {
            // reg
            *self.reg_mut(instr & 0b111)
        } else {
            // imm
            s_ext(instr, 5)
        };
        let res = val1.wrapping_add(val2);
        self.set_flags(res);
        *self.reg_mut(dr) = res;
    }

    fn and(&mut self, instr: u16) {
        let dr = (instr >> 9) & 0b111;
        let sr = (instr >> 6) & 0b111;

        let val1 = *self.reg_mut(sr);
        // Check if imm
        let val2 = if instr & 0b100000 == 0 {
            // reg
            *self.reg_mut(instr & 0b111)
        } else {
            // imm
            s_ext(instr, 5)
        };
        let res = val1 & val2;
        self.set_flags(res);
        *self.reg_mut(dr) = res;
    }

    fn not(&mut self, instr: u16) {
        let dr = (instr >> 9) & 0b111;
        let sr = (instr >> 6) & 0b111;
        let val = !*self.reg_mut(sr);
        *self.reg_mut(dr) = val;
        self.set_flags(val);
    }

    fn br(&mut self, instr: u16) {
        let flag = (instr >> 9) & 0b111;
        if self.flag as u16 & flag != 0 {
            self.pc = self.pc.wrapping_add(s_ext(instr, 9))
        }
    }

    fn jmp(&mut self, instr: u16) {
        let br = (instr >> 6) & 0b111;
        self.pc = *self.reg_mut(br)
    }

    fn jsr(&mut self, instr: u16) {
        *self.reg_mut(7) = self.pc;
        if instr & 0x800 == 0 {
            // reg
            let br = (instr >> 6) & 0b111;
            self.pc = *self.reg_mut(br)
        } else {
            // offs
            self.pc = self.pc.wrapping_add(s_ext(instr, 11))
        }
    }

    fn ld(&mut self, instr: u16) {
        let dr = (instr >> 9) & 0b111;
        let val = self.mem_read(self.pc.wrapping_add(s_ext(instr, 9)));
        *self.reg_mut(dr) = val;
        self.set_flags(val);
    }

    fn ldi(&mut self, instr: u16) {
        let dr = (instr >> 9) & 0b111;
        let ptr = self.mem_read(self.pc.wrapping_add(s_ext(instr, 9)));
        let val = self.mem_read(ptr);
        *self.reg_mut(dr) = val;
        self.set_flags(val);
    }

    fn ldr(&mut self, instr: u16) {
        let dr = (instr >> 9) & 0b111;
        let br = (instr >> 6) & 0b111;
        let ptr = *self.reg_mut(br);
        let val = self.mem_read(ptr.wrapping_add(s_ext(instr, 6)));
        *self.reg_mut(dr) = val;
        self.set_flags(val);
    }

    fn lea(&mut self, instr: u16) {
        let dr = (instr >> 9) & 0b111;
        let val = self.pc.wrapping_add(s_ext(instr, 9));
        *self.reg_mut(dr) = val;
        self.set_flags(val);
    }

    fn st(&mut self, instr: u16) {
        let sr = (instr >> 9) & 0b111;
        let val = *self.reg_mut(sr);
        self.mem_write(self.pc.wrapping_add(s_ext(instr, 9)), val);
    }

    fn sti(&mut self, instr: u16) {
        let sr = (instr >> 9) & 0b111;
        let val = *self.reg_mut(sr);
        let ptr = self.mem_read(self.pc.wrapping_add(s_ext(instr, 9)));
        self.mem_write(ptr, val);
    }

    fn str(&mut self, instr: u16) {
        let sr = (instr >> 9) & 0b111;
        let br = (instr >> 6) & 0b111;
        let ptr = *self.reg_mut(br);
        let val = *self.reg_mut(sr);
        self.mem_write(ptr.wrapping_add(s_ext(instr, 6)), val);
    }

    /// Save the return address and dispatch on the trap vector.
    ///
    /// Unknown vectors are ignored rather than halting the machine.
    fn trap(&mut self, instr: u16) {
        *self.reg_mut(7) = self.pc;
        match instr & 0xFF {
            0x20 => self.trap_getc(),
            0x21 => self.trap_out(),
            0x22 => self.trap_puts(),
            0x23 => self.trap_in(),
            0x24 => self.trap_putsp(),
            0x25 => self.trap_halt(),
            _ => (),
        }
    }

    /// Read one key into R0, without echo.
    fn trap_getc(&mut self) {
        let byte = self.console.read();
        *self.reg_mut(0) = u16::from(byte);
        self.set_flags(u16::from(byte));
    }

    /// Write the character in R0's low byte.
    fn trap_out(&mut self) {
        let byte = (self.reg(0) & 0xFF) as u8;
        self.console.write(byte);
        self.console.flush();
    }

    /// Write the string at R0: one character per word, until a zero word.
    fn trap_puts(&mut self) {
        let mut addr = self.reg(0);
        loop {
            let word = self.mem[usize::from(addr)];
            if word == 0 {
                break;
            }
            self.console.write((word & 0xFF) as u8);
            addr = addr.wrapping_add(1);
        }
        self.console.flush();
    }

    /// Prompt for a key, echo it, and store it in R0.
    fn trap_in(&mut self) {
        for byte in b"Enter a character: " {
            self.console.write(*byte);
        }
        self.console.flush();
        let byte = self.console.read();
        self.console.write(byte);
        self.console.flush();
        *self.reg_mut(0) = u16::from(byte);
        self.set_flags(u16::from(byte));
    }

    /// Write the packed string at R0: two characters per word, low byte
    /// first, high byte only if nonzero, until a fully-zero word.
    fn trap_putsp(&mut self) {
        let mut addr = self.reg(0);
        loop {
            let word = self.mem[usize::from(addr)];
            if word == 0 {
                break;
            }
            self.console.write((word & 0xFF) as u8);
            let high = (word >> 8) as u8;
            if high != 0 {
                self.console.write(high);
            }
            addr = addr.wrapping_add(1);
        }
        self.console.flush();
    }

    fn trap_halt(&mut self) {
        self.running = false;
        for byte in b"\nHALT\n" {
            self.console.write(*byte);
        }
        self.console.flush();
    }
}

/// Extend `val`'s low `bits`-wide field to a 16-bit two's-complement value.
#[inline]
fn s_ext(val: u16, bits: u32) -> u16 {
    debug_assert!(bits >= 1 && bits <= 16);
    // Sign bit
    let sign = val & (1u16 << (bits - 1));
    // Bits lower than sign bit
    let magnitude = val & (((1u32 << bits) - 1) as u16);
    // Positive input: all bits unset; 0x0000
    // Negative input: sign bit and above will be set, lower bits will be reset
    //      Eg. bits=14 -> 0xE000
    let sign_extension = (!sign).wrapping_add(1); // sign * -1
    magnitude | sign_extension
}
