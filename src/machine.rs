use std::fmt;

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::{Error, Result};

/// Unit of memory cells and registers.
pub type Word = u64;

pub const DEFAULT_RAM_SIZE: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u64)]
pub enum Register {
    Eax,
    Ebx,
    Ecx,
    Edx,
    Ebp,
    Esp,
    Eip,
}

pub const REGISTER_COUNT: usize = 7;

impl Register {
    /// Registers that may be named in source. `eip` is only reachable
    /// through jumps.
    pub const NAMED: [Register; 6] = [
        Register::Eax,
        Register::Ebx,
        Register::Ecx,
        Register::Edx,
        Register::Ebp,
        Register::Esp,
    ];

    pub fn from_token(token: &str) -> Option<Self> {
        Self::NAMED.into_iter().find(|r| r.name() == token)
    }

    pub fn name(self) -> &'static str {
        match self {
            Register::Eax => "eax",
            Register::Ebx => "ebx",
            Register::Ecx => "ecx",
            Register::Edx => "edx",
            Register::Ebp => "ebp",
            Register::Esp => "esp",
            Register::Eip => "eip",
        }
    }

    pub fn id(self) -> Word {
        self.into()
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Memory, register file and zero flag of the virtual machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Machine {
    pub ram: Vec<Word>,
    pub zero_flag: bool,
    registers: [Word; REGISTER_COUNT],
    program_len: usize,
}

impl Machine {
    pub fn new(ram_size: usize) -> Self {
        Self {
            ram: vec![0; ram_size],
            zero_flag: false,
            registers: [0; REGISTER_COUNT],
            program_len: 0,
        }
    }

    pub fn reg(&self, r: Register) -> Word {
        self.registers[r as usize]
    }

    pub fn set_reg(&mut self, r: Register, val: Word) {
        self.registers[r as usize] = val;
    }

    pub fn eax(&self) -> Word {
        self.reg(Register::Eax)
    }

    pub fn eip(&self) -> Word {
        self.reg(Register::Eip)
    }

    pub fn set_eip(&mut self, ip: Word) {
        self.set_reg(Register::Eip, ip);
    }

    /// Number of words written by the assembler.
    pub fn program_len(&self) -> usize {
        self.program_len
    }

    pub(crate) fn set_program_len(&mut self, len: usize) {
        self.program_len = len;
    }

    pub fn read(&self, address: Word) -> Result<Word> {
        usize::try_from(address)
            .ok()
            .and_then(|a| self.ram.get(a))
            .copied()
            .ok_or(Error::OutOfBounds {
                ip: self.eip(),
                address,
            })
    }

    pub fn write(&mut self, address: Word, val: Word) -> Result<()> {
        let ip = self.eip();
        let cell = usize::try_from(address)
            .ok()
            .and_then(|a| self.ram.get_mut(a))
            .ok_or(Error::OutOfBounds { ip, address })?;
        *cell = val;
        Ok(())
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new(DEFAULT_RAM_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_zeroed() {
        let m = Machine::new(16);
        assert_eq!(m.ram, vec![0; 16]);
        assert!(!m.zero_flag);
        for r in Register::NAMED {
            assert_eq!(m.reg(r), 0);
        }
        assert_eq!(m.eip(), 0);
    }

    #[test]
    fn register_names() {
        assert_eq!(Register::from_token("ecx"), Some(Register::Ecx));
        assert_eq!(Register::from_token("esp"), Some(Register::Esp));
        assert_eq!(Register::from_token("eip"), None);
        assert_eq!(Register::from_token("EAX"), None);
        assert_eq!(Register::try_from(4u64).ok(), Some(Register::Ebp));
        assert!(Register::try_from(7u64).is_err());
    }

    #[test]
    fn bounds_checked_access() {
        let mut m = Machine::new(4);
        m.set_eip(2);
        assert!(m.write(3, 9).is_ok());
        assert_eq!(m.read(3), Ok(9));
        assert_eq!(m.read(4), Err(Error::OutOfBounds { ip: 2, address: 4 }));
        assert_eq!(
            m.write(u64::MAX, 1),
            Err(Error::OutOfBounds {
                ip: 2,
                address: u64::MAX
            })
        );
    }
}
