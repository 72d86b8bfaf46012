use crate::error::{Error, Result};
use crate::isa::{classify, Instruction, Opcode, CLOSE_BRACKET, COMMA, OPEN_BRACKET, PLUS};
use crate::lex::Token;
use crate::machine::{Machine, Register, Word};

/// Operand access relative to the mnemonic at `cursor`.
struct Operands<'a> {
    tokens: &'a [Token],
    cursor: usize,
}

impl<'a> Operands<'a> {
    fn token(&self, n: usize) -> Result<&'a Token> {
        self.tokens.get(self.cursor + n).ok_or(Error::UnexpectedEnd {
            index: self.tokens[self.cursor].index,
        })
    }

    fn expect(&self, n: usize, punct: &str) -> Result<()> {
        let token = self.token(n)?;
        if token.as_str() == punct {
            Ok(())
        } else {
            Err(Error::MalformedToken {
                index: token.index,
                token: token.text.clone(),
            })
        }
    }

    fn reg(&self, n: usize) -> Result<Register> {
        let token = self.token(n)?;
        Register::from_token(token.as_str()).ok_or_else(|| Error::InvalidRegister {
            index: token.index,
            token: token.text.clone(),
        })
    }

    fn val(&self, n: usize) -> Result<Word> {
        let token = self.token(n)?;
        parse_literal(token.as_str()).ok_or_else(|| Error::InvalidNumber {
            index: token.index,
            token: token.text.clone(),
        })
    }

    /// `[ reg + val ]` starting at operand `n`.
    fn indirect(&self, n: usize) -> Result<(Register, Word)> {
        self.expect(n, OPEN_BRACKET)?;
        let reg = self.reg(n + 1)?;
        self.expect(n + 2, PLUS)?;
        let val = self.val(n + 3)?;
        self.expect(n + 4, CLOSE_BRACKET)?;
        Ok((reg, val))
    }
}

/// Unsigned decimal digits only: no sign, no base prefix.
fn parse_literal(text: &str) -> Option<Word> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

/// Parses and validates the instruction at `tokens[cursor]`. Expects a
/// stream with labels already substituted.
pub fn parse_instruction(tokens: &[Token], cursor: usize) -> Result<Instruction> {
    let opcode = classify(tokens, cursor)?;
    let ops = Operands { tokens, cursor };

    let ins = match opcode {
        // je ip
        Opcode::Je => Instruction::Je(ops.val(1)?),
        // jmp ip
        Opcode::Jmp => Instruction::Jmp(ops.val(1)?),
        // cmp reg , val
        Opcode::Cmp => {
            ops.expect(2, COMMA)?;
            Instruction::Cmp(ops.reg(1)?, ops.val(3)?)
        }
        // add reg , [ reg2 + val ]
        Opcode::AddRegMem => {
            let reg = ops.reg(1)?;
            ops.expect(2, COMMA)?;
            let (reg2, val) = ops.indirect(3)?;
            Instruction::AddRegMem(reg, reg2, val)
        }
        // sub reg , val
        Opcode::SubRegVal => {
            ops.expect(2, COMMA)?;
            Instruction::SubRegVal(ops.reg(1)?, ops.val(3)?)
        }
        // mov [ reg + val ] , reg2
        Opcode::MovMemReg => {
            let (reg, val) = ops.indirect(1)?;
            ops.expect(6, COMMA)?;
            Instruction::MovMemReg(reg, val, ops.reg(7)?)
        }
        // mov [ reg + val ] , val2
        Opcode::MovMemVal => {
            let (reg, val) = ops.indirect(1)?;
            ops.expect(6, COMMA)?;
            Instruction::MovMemVal(reg, val, ops.val(7)?)
        }
        // mov reg , [ reg2 + val ]
        Opcode::MovRegMem => {
            let reg = ops.reg(1)?;
            ops.expect(2, COMMA)?;
            let (reg2, val) = ops.indirect(3)?;
            Instruction::MovRegMem(reg, reg2, val)
        }
        // mov reg , reg2
        Opcode::MovRegReg => {
            ops.expect(2, COMMA)?;
            Instruction::MovRegReg(ops.reg(1)?, ops.reg(3)?)
        }
        // mov reg , val
        Opcode::MovRegVal => {
            ops.expect(2, COMMA)?;
            Instruction::MovRegVal(ops.reg(1)?, ops.val(3)?)
        }
        // inc reg
        Opcode::Inc => Instruction::Inc(ops.reg(1)?),
        Opcode::Exit => Instruction::Exit,
    };

    Ok(ins)
}

/// Words for the single instruction at `tokens[cursor]`.
pub fn encode(tokens: &[Token], cursor: usize) -> Result<Vec<Word>> {
    Ok(parse_instruction(tokens, cursor)?.encode())
}

/// Encodes every instruction into a fresh machine of `ram_size` words, then
/// points `esp` at the top of memory and `eip` at the first instruction.
pub fn assemble(tokens: &[Token], ram_size: usize) -> Result<Machine> {
    let mut words: Vec<Word> = vec![];
    let mut cursor = 0;

    while cursor < tokens.len() {
        let ins = parse_instruction(tokens, cursor)?;
        words.extend(ins.encode());
        cursor += ins.opcode().token_count();

        if words.len() > ram_size {
            return Err(Error::OutOfMemory {
                required: words.len(),
                capacity: ram_size,
            });
        }
    }

    let mut machine = Machine::new(ram_size);
    machine.ram[..words.len()].copy_from_slice(&words);
    machine.set_program_len(words.len());
    machine.set_reg(Register::Esp, ram_size.saturating_sub(1) as Word);
    machine.set_eip(0);

    log::debug!("assembled {} words into {} words of memory", words.len(), ram_size);

    Ok(machine)
}
