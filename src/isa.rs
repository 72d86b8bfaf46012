//! Instruction set: opcode ids, source shapes and word encodings.
//!
//! | opcode        | source form                  | words                 |
//! |---------------|------------------------------|-----------------------|
//! | `Je`          | `je ip`                      | `[1, ip]`             |
//! | `Jmp`         | `jmp ip`                     | `[2, ip]`             |
//! | `Cmp`         | `cmp reg , val`              | `[3, reg, val]`       |
//! | `AddRegMem`   | `add reg , [ reg2 + val ]`   | `[4, reg, reg2, val]` |
//! | `SubRegVal`   | `sub reg , val`              | `[5, reg, val]`       |
//! | `MovMemReg`   | `mov [ reg + val ] , reg2`   | `[6, reg, val, reg2]` |
//! | `MovMemVal`   | `mov [ reg + val ] , val2`   | `[7, reg, val, val2]` |
//! | `MovRegMem`   | `mov reg , [ reg2 + val ]`   | `[8, reg, reg2, val]` |
//! | `MovRegReg`   | `mov reg , reg2`             | `[9, reg, reg2]`      |
//! | `MovRegVal`   | `mov reg , val`              | `[10, reg, val]`      |
//! | `Inc`         | `inc reg`                    | `[11, reg]`           |
//! | `Exit`        | `exit`                       | `[12]`                |

use std::fmt;

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::{Error, Result};
use crate::lex::Token;
use crate::machine::{Register, Word};

pub const COMMA: &str = ",";
pub const OPEN_BRACKET: &str = "[";
pub const CLOSE_BRACKET: &str = "]";
pub const PLUS: &str = "+";

/// Opcode id, stored as the first word of every encoded instruction.
/// Id 0 is left unassigned so zeroed memory never decodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u64)]
pub enum Opcode {
    Je = 1,
    Jmp,
    Cmp,
    AddRegMem,
    SubRegVal,
    MovMemReg,
    MovMemVal,
    MovRegMem,
    MovRegReg,
    MovRegVal,
    Inc,
    Exit,
}

impl Opcode {
    pub fn id(self) -> Word {
        self.into()
    }

    /// Source tokens consumed, mnemonic and punctuation included.
    pub fn token_count(self) -> usize {
        match self {
            Opcode::Je | Opcode::Jmp | Opcode::Inc => 2,
            Opcode::Cmp | Opcode::SubRegVal | Opcode::MovRegReg | Opcode::MovRegVal => 4,
            Opcode::AddRegMem | Opcode::MovMemReg | Opcode::MovMemVal | Opcode::MovRegMem => 8,
            Opcode::Exit => 1,
        }
    }

    /// Memory words occupied once encoded.
    pub fn ip_delta(self) -> Word {
        match self {
            Opcode::Je | Opcode::Jmp | Opcode::Inc => 2,
            Opcode::Cmp | Opcode::SubRegVal | Opcode::MovRegReg | Opcode::MovRegVal => 3,
            Opcode::AddRegMem | Opcode::MovMemReg | Opcode::MovMemVal | Opcode::MovRegMem => 4,
            Opcode::Exit => 1,
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Je => "je",
            Opcode::Jmp => "jmp",
            Opcode::Cmp => "cmp",
            Opcode::AddRegMem => "add",
            Opcode::SubRegVal => "sub",
            Opcode::MovMemReg
            | Opcode::MovMemVal
            | Opcode::MovRegMem
            | Opcode::MovRegReg
            | Opcode::MovRegVal => "mov",
            Opcode::Inc => "inc",
            Opcode::Exit => "exit",
        }
    }
}

fn is_register(token: &str) -> bool {
    Register::from_token(token).is_some()
}

fn malformed(token: &Token) -> Error {
    Error::MalformedToken {
        index: token.index,
        token: token.text.clone(),
    }
}

/// Picks the opcode of the instruction starting at `tokens[cursor]`.
///
/// Only the mnemonic and a fixed lookahead are inspected: `mov [` looks at
/// the source operand 7 tokens ahead, `mov reg` looks 3 tokens ahead (past
/// the comma). Operands are not validated here.
pub fn classify(tokens: &[Token], cursor: usize) -> Result<Opcode> {
    let token = tokens.get(cursor).ok_or(Error::UnexpectedEnd {
        index: tokens.last().map_or(0, |t| t.index),
    })?;

    let opcode = match token.as_str() {
        "je" => Opcode::Je,
        "jmp" => Opcode::Jmp,
        "cmp" => Opcode::Cmp,
        "add" => Opcode::AddRegMem,
        "sub" => Opcode::SubRegVal,
        "inc" => Opcode::Inc,
        "exit" => Opcode::Exit,
        "mov" => classify_mov(tokens, cursor)?,
        _ => return Err(malformed(token)),
    };

    Ok(opcode)
}

fn classify_mov(tokens: &[Token], cursor: usize) -> Result<Opcode> {
    let lookahead = |n: usize| {
        tokens
            .get(cursor + n)
            .ok_or(Error::UnexpectedEnd {
                index: tokens[cursor].index,
            })
    };

    let dest = lookahead(1)?;

    if dest.as_str() == OPEN_BRACKET {
        // mov [ reg + val ] , src
        if is_register(lookahead(7)?.as_str()) {
            Ok(Opcode::MovMemReg)
        } else {
            Ok(Opcode::MovMemVal)
        }
    } else if is_register(dest.as_str()) {
        // mov reg , src
        let src = lookahead(3)?;
        if is_register(src.as_str()) {
            Ok(Opcode::MovRegReg)
        } else if src.as_str() == OPEN_BRACKET {
            Ok(Opcode::MovRegMem)
        } else {
            Ok(Opcode::MovRegVal)
        }
    } else {
        Err(malformed(dest))
    }
}

/// A decoded instruction with its operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Je(Word),
    Jmp(Word),
    Cmp(Register, Word),
    AddRegMem(Register, Register, Word),
    SubRegVal(Register, Word),
    MovMemReg(Register, Word, Register),
    MovMemVal(Register, Word, Word),
    MovRegMem(Register, Register, Word),
    MovRegReg(Register, Register),
    MovRegVal(Register, Word),
    Inc(Register),
    Exit,
}

impl Instruction {
    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::Je(_) => Opcode::Je,
            Instruction::Jmp(_) => Opcode::Jmp,
            Instruction::Cmp(..) => Opcode::Cmp,
            Instruction::AddRegMem(..) => Opcode::AddRegMem,
            Instruction::SubRegVal(..) => Opcode::SubRegVal,
            Instruction::MovMemReg(..) => Opcode::MovMemReg,
            Instruction::MovMemVal(..) => Opcode::MovMemVal,
            Instruction::MovRegMem(..) => Opcode::MovRegMem,
            Instruction::MovRegReg(..) => Opcode::MovRegReg,
            Instruction::MovRegVal(..) => Opcode::MovRegVal,
            Instruction::Inc(_) => Opcode::Inc,
            Instruction::Exit => Opcode::Exit,
        }
    }

    /// Opcode word followed by operand words.
    pub fn encode(&self) -> Vec<Word> {
        let mut words = vec![self.opcode().id()];

        match *self {
            Instruction::Je(ip) | Instruction::Jmp(ip) => words.push(ip),
            Instruction::Cmp(reg, val)
            | Instruction::SubRegVal(reg, val)
            | Instruction::MovRegVal(reg, val) => words.extend([reg.id(), val]),
            Instruction::AddRegMem(reg, reg2, val) | Instruction::MovRegMem(reg, reg2, val) => {
                words.extend([reg.id(), reg2.id(), val])
            }
            Instruction::MovMemReg(reg, val, reg2) => words.extend([reg.id(), val, reg2.id()]),
            Instruction::MovMemVal(reg, val, val2) => words.extend([reg.id(), val, val2]),
            Instruction::MovRegReg(reg, reg2) => words.extend([reg.id(), reg2.id()]),
            Instruction::Inc(reg) => words.push(reg.id()),
            Instruction::Exit => (),
        }

        words
    }

    /// Decodes the instruction whose opcode word sits at `ram[ip]`.
    pub fn decode(ram: &[Word], ip: Word) -> Result<Self> {
        let word = |k: Word| -> Result<Word> {
            let address = ip.wrapping_add(k);
            usize::try_from(address)
                .ok()
                .and_then(|a| ram.get(a))
                .copied()
                .ok_or(Error::OutOfBounds { ip, address })
        };
        let reg = |k: Word| -> Result<Register> {
            let w = word(k)?;
            Register::try_from(w).map_err(|_| Error::IllegalRegister { ip, word: w })
        };

        let opcode_word = word(0)?;
        let opcode = Opcode::try_from(opcode_word).map_err(|_| Error::IllegalInstruction {
            ip,
            opcode: opcode_word,
        })?;

        let ins = match opcode {
            Opcode::Je => Instruction::Je(word(1)?),
            Opcode::Jmp => Instruction::Jmp(word(1)?),
            Opcode::Cmp => Instruction::Cmp(reg(1)?, word(2)?),
            Opcode::AddRegMem => Instruction::AddRegMem(reg(1)?, reg(2)?, word(3)?),
            Opcode::SubRegVal => Instruction::SubRegVal(reg(1)?, word(2)?),
            Opcode::MovMemReg => Instruction::MovMemReg(reg(1)?, word(2)?, reg(3)?),
            Opcode::MovMemVal => Instruction::MovMemVal(reg(1)?, word(2)?, word(3)?),
            Opcode::MovRegMem => Instruction::MovRegMem(reg(1)?, reg(2)?, word(3)?),
            Opcode::MovRegReg => Instruction::MovRegReg(reg(1)?, reg(2)?),
            Opcode::MovRegVal => Instruction::MovRegVal(reg(1)?, word(2)?),
            Opcode::Inc => Instruction::Inc(reg(1)?),
            Opcode::Exit => Instruction::Exit,
        };

        Ok(ins)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.opcode().mnemonic();
        match self {
            Instruction::Je(ip) | Instruction::Jmp(ip) => write!(f, "{m} {ip}"),
            Instruction::Cmp(reg, val)
            | Instruction::SubRegVal(reg, val)
            | Instruction::MovRegVal(reg, val) => write!(f, "{m} {reg} , {val}"),
            Instruction::AddRegMem(reg, reg2, val) | Instruction::MovRegMem(reg, reg2, val) => {
                write!(f, "{m} {reg} , [ {reg2} + {val} ]")
            }
            Instruction::MovMemReg(reg, val, reg2) => write!(f, "{m} [ {reg} + {val} ] , {reg2}"),
            Instruction::MovMemVal(reg, val, val2) => write!(f, "{m} [ {reg} + {val} ] , {val2}"),
            Instruction::MovRegReg(reg, reg2) => write!(f, "{m} {reg} , {reg2}"),
            Instruction::Inc(reg) => write!(f, "{m} {reg}"),
            Instruction::Exit => write!(f, "{m}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lex::tokenize;

    fn classify_src(source: &str) -> Result<Opcode> {
        classify(&tokenize(source), 0)
    }

    #[test]
    fn classify_plain_mnemonics() {
        assert_eq!(classify_src("je 4"), Ok(Opcode::Je));
        assert_eq!(classify_src("jmp .top"), Ok(Opcode::Jmp));
        assert_eq!(classify_src("cmp ecx , 6"), Ok(Opcode::Cmp));
        assert_eq!(
            classify_src("add eax , [ ebp + 2 ]"),
            Ok(Opcode::AddRegMem)
        );
        assert_eq!(classify_src("sub esp , 4"), Ok(Opcode::SubRegVal));
        assert_eq!(classify_src("inc ecx"), Ok(Opcode::Inc));
        assert_eq!(classify_src("exit"), Ok(Opcode::Exit));
    }

    #[test]
    fn classify_mov_by_shape() {
        assert_eq!(
            classify_src("mov [ ebp + 4 ] , eax"),
            Ok(Opcode::MovMemReg)
        );
        assert_eq!(
            classify_src("mov [ ebp + 2 ] , 0"),
            Ok(Opcode::MovMemVal)
        );
        assert_eq!(
            classify_src("mov eax , [ ebp + 3 ]"),
            Ok(Opcode::MovRegMem)
        );
        assert_eq!(classify_src("mov ebp , esp"), Ok(Opcode::MovRegReg));
        assert_eq!(classify_src("mov ecx , 1"), Ok(Opcode::MovRegVal));
    }

    #[test]
    fn classify_uses_cursor() {
        let tokens = tokenize("inc eax mov ebx , eax exit");
        assert_eq!(classify(&tokens, 0), Ok(Opcode::Inc));
        assert_eq!(classify(&tokens, 2), Ok(Opcode::MovRegReg));
        assert_eq!(classify(&tokens, 6), Ok(Opcode::Exit));
    }

    #[test]
    fn classify_rejects_unknown() {
        assert_eq!(
            classify_src("push eax"),
            Err(Error::MalformedToken {
                index: 0,
                token: "push".into()
            })
        );
        assert_eq!(
            classify_src("mov 4 , eax"),
            Err(Error::MalformedToken {
                index: 1,
                token: "4".into()
            })
        );
        assert_eq!(
            classify_src("mov [ ebp + 2 ]"),
            Err(Error::UnexpectedEnd { index: 0 })
        );
        assert_eq!(classify_src("mov"), Err(Error::UnexpectedEnd { index: 0 }));
    }

    #[test]
    fn sizes_per_opcode() {
        assert_eq!(Opcode::Exit.token_count(), 1);
        assert_eq!(Opcode::Exit.ip_delta(), 1);
        assert_eq!(Opcode::MovRegVal.token_count(), 4);
        assert_eq!(Opcode::MovRegVal.ip_delta(), 3);
        assert_eq!(Opcode::MovMemVal.token_count(), 8);
        assert_eq!(Opcode::MovMemVal.ip_delta(), 4);
        assert_eq!(Opcode::Jmp.token_count(), 2);
        assert_eq!(Opcode::Jmp.ip_delta(), 2);
    }

    #[test]
    fn encode_then_decode() {
        let ins = [
            Instruction::Je(7),
            Instruction::MovMemReg(Register::Ebp, 4, Register::Eax),
            Instruction::AddRegMem(Register::Eax, Register::Ebp, 2),
            Instruction::Exit,
        ];

        for i in ins {
            let words = i.encode();
            assert_eq!(words.len() as Word, i.opcode().ip_delta());
            assert_eq!(Instruction::decode(&words, 0), Ok(i));
        }
    }

    #[test]
    fn decode_failures() {
        assert_eq!(
            Instruction::decode(&[0, 0], 0),
            Err(Error::IllegalInstruction { ip: 0, opcode: 0 })
        );
        assert_eq!(
            Instruction::decode(&[11, 9], 0),
            Err(Error::IllegalRegister { ip: 0, word: 9 })
        );
        assert_eq!(
            Instruction::decode(&[2], 0),
            Err(Error::OutOfBounds { ip: 0, address: 1 })
        );
    }

    #[test]
    fn display_in_source_syntax() {
        let ins = Instruction::MovRegMem(Register::Eax, Register::Ebp, 3);
        assert_eq!(ins.to_string(), "mov eax , [ ebp + 3 ]");
        assert_eq!(Instruction::Jmp(16).to_string(), "jmp 16");
    }
}
