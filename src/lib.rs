pub mod assembler;
pub mod error;
pub mod interpreter;
pub mod isa;
pub mod labels;
pub mod lex;
pub mod machine;

pub mod cli;

pub use error::{Error, Result};
pub use machine::{Machine, Register, Word};

use interpreter::{Interpreter, TraceLog};
use labels::LabelTable;
use machine::DEFAULT_RAM_SIZE;

/// Machine size and execution budget.
#[derive(Debug, Clone)]
pub struct Config {
    pub ram_size: usize,
    /// `None` lets a program that never exits run forever.
    pub max_steps: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ram_size: DEFAULT_RAM_SIZE,
            max_steps: None,
        }
    }
}

/// An assembled program, ready to execute.
#[derive(Debug, Clone)]
pub struct Program {
    pub machine: Machine,
    pub labels: LabelTable,
}

/// Tokenizes, resolves labels and assembles `source`.
pub fn make_program(source: &str, config: &Config) -> Result<Program> {
    let tokens = lex::tokenize(source);
    let labels = labels::extract_labels(&tokens)?;
    let tokens = labels::substitute_labels(&tokens, &labels)?;
    let machine = assembler::assemble(&tokens, config.ram_size)?;

    Ok(Program { machine, labels })
}

/// Assembles and runs `source` with the default configuration, returning
/// `eax` at exit.
pub fn run(source: &str) -> Result<Word> {
    run_with(source, &Config::default())
}

pub fn run_with(source: &str, config: &Config) -> Result<Word> {
    let program = make_program(source, config)?;

    let mut logger = TraceLog;
    let mut interpreter = Interpreter::new(program.machine, &mut logger);
    interpreter.run(config.max_steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::fibonacci_source;
    use crate::interpreter::NullLog;

    fn bounded() -> Config {
        Config {
            max_steps: Some(100_000),
            ..Config::default()
        }
    }

    #[test]
    fn fibonacci_program() {
        assert_eq!(run_with(&fibonacci_source(6), &bounded()), Ok(8));
        assert_eq!(run_with(&fibonacci_source(15), &bounded()), Ok(610));
        assert_eq!(run_with(&fibonacci_source(2), &bounded()), Ok(1));
    }

    #[test]
    fn exit_only() {
        let program = make_program("exit", &Config::default()).unwrap();
        assert_eq!(program.machine.program_len(), 1);
        assert_eq!(run("exit"), Ok(0));
    }

    #[test]
    fn runs_are_deterministic() {
        let source = fibonacci_source(10);
        let config = bounded();

        let finish = || {
            let program = make_program(&source, &config).unwrap();
            let mut logger = NullLog;
            let mut interpreter = Interpreter::new(program.machine, &mut logger);
            let result = interpreter.run(config.max_steps).unwrap();
            (result, interpreter.into_machine())
        };

        let (first, first_machine) = finish();
        let (second, second_machine) = finish();
        assert_eq!(first, 55);
        assert_eq!(first, second);
        assert_eq!(first_machine, second_machine);
    }

    #[test]
    fn undeclared_label_fails() {
        assert_eq!(
            run("mov eax , 1 jmp .missing exit"),
            Err(Error::UnknownLabel {
                index: 5,
                label: "missing".into()
            })
        );
    }

    #[test]
    fn label_as_immediate() {
        assert_eq!(run("mov eax , .here :here exit"), Ok(3));
    }

    #[test]
    fn first_error_stops_pipeline() {
        assert!(matches!(
            run("bogus jmp .missing"),
            Err(Error::MalformedToken { index: 0, .. })
        ));
    }

    #[test]
    fn honours_ram_size() {
        let config = Config {
            ram_size: 2,
            max_steps: None,
        };
        assert_eq!(
            run_with("mov eax , 1 exit", &config),
            Err(Error::OutOfMemory {
                required: 3,
                capacity: 2
            })
        );
    }
}
