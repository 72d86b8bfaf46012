use tabled::{builder::Builder, settings::Style, Table, Tabled};

use std::collections::HashMap;
use std::{io, io::Write};

use crate::interpreter::{Interpreter, Log, TraceLog};
use crate::isa::Instruction;
use crate::machine::{Machine, Register, Word};
use crate::{Config, Program, Result};

/// Fibonacci program used by `regvm demo`. Loops until `ecx` reaches `n`
/// and leaves the `n`th Fibonacci number in `eax`.
pub fn fibonacci_source(n: u64) -> String {
    [
        "sub esp , 4",
        "mov ebp , esp",
        "mov [ ebp + 2 ] , 0",
        "mov [ ebp + 3 ] , 1",
        "mov [ ebp + 4 ] , 1",
        "mov [ ebp + 1 ] , 1",
        "mov ecx , 1",
        ":loop",
        &format!("cmp ecx , {n}"),
        "je .end",
        "mov eax , [ ebp + 3 ]",
        "add eax , [ ebp + 2 ]",
        "mov [ ebp + 4 ] , eax",
        "mov eax , [ ebp + 3 ]",
        "mov [ ebp + 2 ] , eax",
        "mov eax , [ ebp + 4 ]",
        "mov [ ebp + 3 ] , eax",
        "mov eax , [ ebp + 1 ]",
        "inc ecx",
        "jmp .loop",
        ":end",
        "mov eax , [ ebp + 4 ]",
        "exit",
    ]
    .join(" ")
}

/// Folds a multi-line file into the single-space form the tokenizer reads.
pub fn normalize_source(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

struct CLILogger;

impl Log for CLILogger {
    fn log(&mut self, msg: String) {
        println!("{msg}");
    }
}

#[derive(Tabled)]
struct ListingRow {
    addr: Word,
    label: String,
    instruction: String,
    words: String,
}

#[derive(Tabled)]
struct LabelRow {
    name: String,
    ip: Word,
    token: usize,
}

/// Decodes the assembled program instruction by instruction.
fn listing(machine: &Machine) -> Result<Vec<(Word, Instruction)>> {
    let mut rows = vec![];
    let mut addr: Word = 0;

    while (addr as usize) < machine.program_len() {
        let ins = Instruction::decode(&machine.ram, addr)?;
        rows.push((addr, ins));
        addr += ins.opcode().ip_delta();
    }

    Ok(rows)
}

fn addr_to_label(program: &Program) -> HashMap<Word, String> {
    let mut map: HashMap<Word, String> = HashMap::new();
    for label in program.labels.iter() {
        map.entry(label.ip)
            .and_modify(|names| {
                names.push_str(", ");
                names.push_str(&label.name);
            })
            .or_insert_with(|| label.name.clone());
    }
    map
}

fn format_words(ins: &Instruction) -> String {
    ins.encode()
        .iter()
        .map(Word::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

fn registers_table(machine: &Machine, halted: bool) -> String {
    let mut builder = Builder::default();

    let mut header: Vec<String> = Register::NAMED.iter().map(|r| r.to_string()).collect();
    header.extend(["eip".to_owned(), "zf".to_owned(), "halted".to_owned()]);
    builder.push_record(header);

    let mut values: Vec<String> = Register::NAMED
        .iter()
        .map(|r| machine.reg(*r).to_string())
        .collect();
    values.extend([
        machine.eip().to_string(),
        machine.zero_flag.to_string(),
        halted.to_string(),
    ]);
    builder.push_record(values);

    builder.build().with(Style::sharp()).to_string()
}

pub fn run(source: &str, config: &Config, trace: bool) -> Result<Word> {
    let program = crate::make_program(source, config)?;

    let (result, steps) = if trace {
        let mut logger = CLILogger;
        let mut interpreter = Interpreter::new(program.machine, &mut logger);
        (interpreter.run(config.max_steps)?, interpreter.steps())
    } else {
        let mut logger = TraceLog;
        let mut interpreter = Interpreter::new(program.machine, &mut logger);
        (interpreter.run(config.max_steps)?, interpreter.steps())
    };

    println!("\n--- summary ---");
    println!("instruction count: {steps}");
    println!("eax: {result}");

    Ok(result)
}

pub fn list(source: &str, config: &Config) -> Result<()> {
    let program = crate::make_program(source, config)?;
    let labels = addr_to_label(&program);

    let label_rows: Vec<LabelRow> = program
        .labels
        .iter()
        .map(|l| LabelRow {
            name: l.name.clone(),
            ip: l.ip,
            token: l.index,
        })
        .collect();

    let rows: Vec<ListingRow> = listing(&program.machine)?
        .into_iter()
        .map(|(addr, ins)| ListingRow {
            addr,
            label: labels.get(&addr).cloned().unwrap_or_default(),
            instruction: ins.to_string(),
            words: format_words(&ins),
        })
        .collect();

    println!("--- labels ---");
    println!("{}", Table::new(label_rows).with(Style::sharp()));
    println!("\n--- program ({} words) ---", program.machine.program_len());
    println!("{}", Table::new(rows).with(Style::sharp()));

    Ok(())
}

pub fn run_debugger(source: &str, config: &Config) -> Result<()> {
    let program = crate::make_program(source, config)?;
    let labels = addr_to_label(&program);
    let rows = listing(&program.machine)?;

    let mut logger = CLILogger;
    let mut interpreter = Interpreter::new(program.machine, &mut logger);
    let mut skip_count = 0;

    while !interpreter.is_halted() {
        println!("\n--- ins #{} ---", interpreter.steps());
        let machine = interpreter.machine();
        let eip = machine.eip();

        let mut builder = Builder::default();
        builder.push_record(["eip", "addr", "label", "instruction", "words"]);

        let height = 15;
        let current = rows.iter().position(|(addr, _)| *addr == eip).unwrap_or(0);
        let min = current.saturating_sub(height / 2);
        let max = (min + height).min(rows.len());

        for (addr, ins) in &rows[min..max] {
            let arrow = if *addr == eip { ">" } else { "" };
            let addr_str = format!("{addr:04}");
            let label = labels.get(addr).map(String::as_str).unwrap_or("");
            let ins_str = ins.to_string();
            let words_str = format_words(ins);

            builder.push_record([
                arrow,
                addr_str.as_str(),
                label,
                ins_str.as_str(),
                words_str.as_str(),
            ]);
        }

        let mem_table = builder.build().with(Style::sharp()).to_string();
        println!("{mem_table}");
        println!("{}", registers_table(machine, interpreter.is_halted()));

        if skip_count == 0 {
            loop {
                print!(">>> ");
                let _ = io::stdout().flush();

                let mut input = String::new();

                if io::stdin().read_line(&mut input).is_err() {
                    continue;
                }

                let input = input.trim();

                if input.is_empty() {
                    skip_count = 1;
                    break;
                }

                match input.parse::<usize>() {
                    Ok(n) => {
                        skip_count = n.max(1);
                        break;
                    }
                    Err(_) => continue,
                };
            }
        }

        if let Some(limit) = config.max_steps {
            if interpreter.steps() >= limit {
                return Err(crate::Error::StepLimitExceeded {
                    ip: interpreter.machine().eip(),
                    steps: limit,
                });
            }
        }

        interpreter.step()?;
        skip_count -= 1;
    }

    let mut builder = Builder::default();
    builder.push_record(["ins_count", "eax"]);
    builder.push_record([
        interpreter.steps().to_string(),
        interpreter.machine().eax().to_string(),
    ]);

    let result_table = builder.build().with(Style::sharp()).to_string();

    println!("\n--- summary ---");
    println!("{result_table}");

    Ok(())
}
