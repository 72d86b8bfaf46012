use crate::error::{Error, Result};
use crate::isa::Instruction;
use crate::machine::{Machine, Register, Word};

/// Sink for per-instruction trace messages.
pub trait Log {
    fn log(&mut self, msg: String);
}

/// Forwards trace messages to the `log` facade.
pub struct TraceLog;

impl Log for TraceLog {
    fn log(&mut self, msg: String) {
        log::trace!("{msg}");
    }
}

pub struct NullLog;

impl Log for NullLog {
    fn log(&mut self, _msg: String) {}
}

/// Fetch-decode-execute loop over an assembled machine.
pub struct Interpreter<'a, L: Log> {
    machine: Machine,
    halted: bool,
    steps: u64,
    logger: &'a mut L,
}

impl<'a, L: Log> Interpreter<'a, L> {
    pub fn new(machine: Machine, logger: &'a mut L) -> Self {
        Self {
            machine,
            halted: false,
            steps: 0,
            logger,
        }
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Instructions executed so far, `exit` included.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    pub fn into_machine(self) -> Machine {
        self.machine
    }

    /// Runs until `exit` and returns `eax`. With a step budget, gives up
    /// with `StepLimitExceeded` once the budget is spent.
    pub fn run(&mut self, max_steps: Option<u64>) -> Result<Word> {
        while !self.halted {
            if let Some(limit) = max_steps {
                if self.steps >= limit {
                    return Err(Error::StepLimitExceeded {
                        ip: self.machine.eip(),
                        steps: limit,
                    });
                }
            }
            self.step()?;
        }

        log::debug!("halted after {} steps", self.steps);

        Ok(self.machine.eax())
    }

    pub fn step(&mut self) -> Result<()> {
        if self.halted {
            self.logger.log("Cannot step: interpreter is halted".into());
            return Ok(());
        }

        let ip = self.machine.eip();
        let ins = Instruction::decode(&self.machine.ram, ip)?;

        self.logger
            .log(format!("Fetched instruction: {ins} at address {ip}"));
        self.steps += 1;

        match ins {
            Instruction::Exit => {
                self.logger.log("--> exit".into());
                self.halted = true;
                return Ok(());
            }
            Instruction::Jmp(target) => {
                self.jump(target);
                return Ok(());
            }
            Instruction::Je(target) => {
                if self.machine.zero_flag {
                    self.jump(target);
                    return Ok(());
                }
                self.logger.log("--> zero flag clear, no jump".into());
            }
            Instruction::Cmp(reg, val) => self.cmp(reg, val),
            Instruction::AddRegMem(reg, reg2, off) => self.add(reg, reg2, off)?,
            Instruction::SubRegVal(reg, val) => self.sub(reg, val),
            Instruction::Inc(reg) => self.inc(reg),
            Instruction::MovMemReg(reg, off, reg2) => {
                let val = self.machine.reg(reg2);
                self.store(reg, off, val)?;
            }
            Instruction::MovMemVal(reg, off, val) => self.store(reg, off, val)?,
            Instruction::MovRegMem(reg, reg2, off) => {
                let val = self.load(reg2, off)?;
                self.set(reg, val);
            }
            Instruction::MovRegReg(reg, reg2) => {
                let val = self.machine.reg(reg2);
                self.set(reg, val);
            }
            Instruction::MovRegVal(reg, val) => self.set(reg, val),
        }

        self.machine
            .set_eip(ip.wrapping_add(ins.opcode().ip_delta()));

        Ok(())
    }

    fn jump(&mut self, target: Word) {
        self.logger.log(format!("--> jump to {target}"));
        self.machine.set_eip(target);
    }

    fn cmp(&mut self, reg: Register, val: Word) {
        self.machine.zero_flag = self.machine.reg(reg) == val;
        self.logger.log(format!(
            "--> {reg} == {val}: zero flag {}",
            self.machine.zero_flag
        ));
    }

    fn add(&mut self, reg: Register, base: Register, off: Word) -> Result<()> {
        let val = self.load(base, off)?;
        let new_val = self.machine.reg(reg).wrapping_add(val);
        self.set(reg, new_val);
        Ok(())
    }

    fn sub(&mut self, reg: Register, val: Word) {
        let new_val = self.machine.reg(reg).wrapping_sub(val);
        self.set(reg, new_val);
    }

    fn inc(&mut self, reg: Register) {
        let new_val = self.machine.reg(reg).wrapping_add(1);
        self.set(reg, new_val);
    }

    fn address(&self, base: Register, off: Word) -> Word {
        self.machine.reg(base).wrapping_add(off)
    }

    fn load(&mut self, base: Register, off: Word) -> Result<Word> {
        let addr = self.address(base, off);
        let val = self.machine.read(addr)?;
        self.logger.log(format!("--> read {val} from [{addr}]"));
        Ok(val)
    }

    fn store(&mut self, base: Register, off: Word, val: Word) -> Result<()> {
        let addr = self.address(base, off);
        self.machine.write(addr, val)?;
        self.logger.log(format!("--> wrote {val} to [{addr}]"));
        Ok(())
    }

    fn set(&mut self, reg: Register, val: Word) {
        self.machine.set_reg(reg, val);
        self.logger.log(format!("--> {reg} = {val}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::assemble;
    use crate::labels::{extract_labels, substitute_labels};
    use crate::lex::tokenize;

    #[derive(Default)]
    struct VecLog {
        lines: Vec<String>,
    }

    impl Log for VecLog {
        fn log(&mut self, msg: String) {
            self.lines.push(msg);
        }
    }

    fn machine(source: &str) -> Machine {
        let tokens = tokenize(source);
        let labels = extract_labels(&tokens).unwrap();
        let tokens = substitute_labels(&tokens, &labels).unwrap();
        assemble(&tokens, 64).unwrap()
    }

    fn exec(source: &str) -> Result<Machine> {
        let mut logger = NullLog;
        let mut interpreter = Interpreter::new(machine(source), &mut logger);
        interpreter.run(Some(10_000))?;
        Ok(interpreter.into_machine())
    }

    #[test]
    fn exit_returns_zeroed_eax() {
        let mut logger = NullLog;
        let mut interpreter = Interpreter::new(machine("exit"), &mut logger);
        assert_eq!(interpreter.run(None), Ok(0));
        assert_eq!(interpreter.steps(), 1);
        assert!(interpreter.is_halted());
    }

    #[test]
    fn register_moves_and_arithmetic() {
        let m = exec("mov eax , 10 mov ebx , eax sub ebx , 3 inc ebx exit").unwrap();
        assert_eq!(m.eax(), 10);
        assert_eq!(m.reg(Register::Ebx), 8);
    }

    #[test]
    fn memory_reads_and_writes() {
        let m = exec(
            "mov ebx , 40 mov [ ebx + 2 ] , 5 mov ecx , 7 mov [ ebx + 3 ] , ecx \
             mov eax , [ ebx + 2 ] add eax , [ ebx + 3 ] exit",
        )
        .unwrap();
        assert_eq!(m.ram[42], 5);
        assert_eq!(m.ram[43], 7);
        assert_eq!(m.eax(), 12);
    }

    #[test]
    fn compare_sets_zero_flag() {
        let m = exec("mov ecx , 3 cmp ecx , 3 exit").unwrap();
        assert!(m.zero_flag);
        let m = exec("mov ecx , 3 cmp ecx , 4 exit").unwrap();
        assert!(!m.zero_flag);
    }

    #[test]
    fn conditional_jump_follows_flag() {
        // counts ecx up to 4, eax counts loop iterations
        let source = ":loop cmp ecx , 4 je .end inc ecx inc eax jmp .loop :end exit";
        let m = exec(source).unwrap();
        assert_eq!(m.reg(Register::Ecx), 4);
        assert_eq!(m.eax(), 4);
    }

    #[test]
    fn jumps_do_not_advance_eip() {
        let mut logger = NullLog;
        let mut interpreter = Interpreter::new(machine("jmp 4 inc eax exit"), &mut logger);
        interpreter.step().unwrap();
        assert_eq!(interpreter.machine().eip(), 4);
        interpreter.step().unwrap();
        assert!(interpreter.is_halted());
        assert_eq!(interpreter.machine().eax(), 0);
    }

    #[test]
    fn sub_wraps_below_zero() {
        let m = exec("sub eax , 1 exit").unwrap();
        assert_eq!(m.eax(), u64::MAX);
    }

    #[test]
    fn out_of_bounds_access() {
        assert_eq!(
            exec("mov ebx , 60 mov [ ebx + 4 ] , 1 exit"),
            Err(Error::OutOfBounds { ip: 3, address: 64 })
        );
        assert_eq!(
            exec("mov eax , [ esp + 1 ] exit"),
            Err(Error::OutOfBounds { ip: 0, address: 64 })
        );
    }

    #[test]
    fn running_off_the_program_is_illegal() {
        assert_eq!(
            exec("inc eax"),
            Err(Error::IllegalInstruction { ip: 2, opcode: 0 })
        );
    }

    #[test]
    fn step_limit_stops_infinite_loop() {
        let mut logger = NullLog;
        let mut interpreter = Interpreter::new(machine(":spin jmp .spin"), &mut logger);
        assert_eq!(
            interpreter.run(Some(50)),
            Err(Error::StepLimitExceeded { ip: 0, steps: 50 })
        );
        assert_eq!(interpreter.steps(), 50);
    }

    #[test]
    fn traces_each_instruction() {
        let mut logger = VecLog::default();
        let mut interpreter = Interpreter::new(machine("inc eax exit"), &mut logger);
        interpreter.run(None).unwrap();
        interpreter.step().unwrap();

        assert_eq!(
            logger.lines,
            vec![
                "Fetched instruction: inc eax at address 0",
                "--> eax = 1",
                "Fetched instruction: exit at address 2",
                "--> exit",
                "Cannot step: interpreter is halted",
            ]
        );
    }
}
