use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use regvm::{cli, Config};

/// Assembler and virtual machine for a tiny register-machine language
#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Memory size in words
    #[clap(long, default_value_t = regvm::machine::DEFAULT_RAM_SIZE)]
    ram_size: usize,

    /// Abort after this many instructions
    #[clap(long)]
    max_steps: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Assemble and execute a program, printing eax at exit
    Run {
        /// Source file, or `-` for stdin
        file: PathBuf,

        /// Print every executed instruction
        #[clap(long)]
        trace: bool,
    },
    /// Step through a program interactively
    Debug {
        /// Source file, or `-` for stdin
        file: PathBuf,
    },
    /// Print the label table and the assembled program
    List {
        /// Source file, or `-` for stdin
        file: PathBuf,
    },
    /// Run the built-in Fibonacci program
    Demo {
        /// Loop bound
        #[clap(long, default_value_t = 6)]
        n: u64,
    },
}

fn read_source(path: &Path) -> Result<String> {
    let mut text = String::new();

    if path == Path::new("-") {
        std::io::stdin()
            .read_to_string(&mut text)
            .context("failed to read stdin")?;
    } else {
        text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {:?}", path))?;
    }

    Ok(cli::normalize_source(&text))
}

fn main() -> Result<()> {
    let env = env_logger::Env::default()
        .filter_or("REGVM_LOG", "warn")
        .write_style_or("REGVM_LOG", "always");
    env_logger::init_from_env(env);

    let args = Args::parse();
    let config = Config {
        ram_size: args.ram_size,
        max_steps: args.max_steps,
    };

    match args.command {
        Command::Run { file, trace } => {
            let source = read_source(&file)?;
            cli::run(&source, &config, trace)
                .with_context(|| format!("failed to run {:?}", file))?;
        }
        Command::Debug { file } => {
            let source = read_source(&file)?;
            cli::run_debugger(&source, &config)
                .with_context(|| format!("failed to debug {:?}", file))?;
        }
        Command::List { file } => {
            let source = read_source(&file)?;
            cli::list(&source, &config).with_context(|| format!("failed to assemble {:?}", file))?;
        }
        Command::Demo { n } => {
            info!("running fibonacci demo with n = {n}");
            cli::run(&cli::fibonacci_source(n), &config, false).context("demo failed")?;
        }
    }

    Ok(())
}
