use std::fs;
use std::io::{self, BufReader, Write};
use std::path::PathBuf;
use std::process;

use clap::Parser;
use tracing::debug;

use awk_vm::lexer::{unescape, EscapeMode};
use awk_vm::{compile, Encoding, Interpreter};

mod logging;

#[derive(Parser)]
#[command(
    name = "awk-vm",
    version,
    about = "POSIX AWK on a bytecode virtual machine",
    override_usage = "awk-vm [-bc] [-F fs] [-v var=val]... 'program' [file ...]\n       awk-vm [-bc] [-F fs] [-v var=val]... -f progfile [file ...]"
)]
struct Cli {
    /// Set the field separator to fs ("t" means tab)
    #[arg(short = 'F', value_name = "fs", allow_hyphen_values = true)]
    field_separator: Option<String>,

    /// Assign val to var before execution
    #[arg(short = 'v', value_name = "var=val")]
    assignments: Vec<String>,

    /// Read the program from progfile
    #[arg(short = 'f', value_name = "progfile")]
    program_files: Vec<PathBuf>,

    /// Treat input and program text as bytes: length() counts bytes and
    /// non-UTF-8 input passes through unchanged
    #[arg(short = 'b')]
    bytes: bool,

    /// Compile the program and exit without running it
    #[arg(short = 'c')]
    compile_only: bool,

    /// With -c, print the compiled bytecode
    #[arg(long, requires = "compile_only")]
    disassemble: bool,

    /// Program text (unless -f is given), then input files and assignments
    #[arg(value_name = "ARGS", trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

fn main() {
    logging::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("awk-vm: {}", e);
            process::exit(2);
        }
    }
}

fn run(cli: Cli) -> Result<i32, Box<dyn std::error::Error>> {
    let encoding = if cli.bytes { Encoding::Bytes } else { Encoding::Utf8 };
    let mut operands = cli.args.into_iter().map(|arg| encoding.widen(&arg));

    let source = if cli.program_files.is_empty() {
        operands.next().ok_or("no program given")?
    } else {
        let mut sources = Vec::with_capacity(cli.program_files.len());
        for path in &cli.program_files {
            let bytes =
                fs::read(path).map_err(|e| format!("can't open source file `{}': {}", path.display(), e))?;
            let text = encoding
                .decode(bytes)
                .map_err(|e| format!("source file `{}': {}", path.display(), e))?;
            sources.push(text);
        }
        sources.join("\n")
    };

    let program = match compile(&source) {
        Ok(program) => program,
        Err(e) => {
            for diagnostic in e.diagnostics() {
                eprintln!("awk-vm: {}", diagnostic);
            }
            return Ok(2);
        }
    };
    debug!(target: "awk::compiler", instructions = program.code.len(), "compiled");

    if cli.compile_only {
        if cli.disassemble {
            let mut stdout = io::stdout().lock();
            write!(stdout, "{}", program)?;
            stdout.flush()?;
        }
        return Ok(0);
    }

    let mut interpreter = Interpreter::new(&program);
    interpreter.set_encoding(encoding);

    if let Some(fs) = cli.field_separator {
        let fs = if fs == "t" { "\t".to_string() } else { unescape(&encoding.widen(&fs), EscapeMode::String) };
        interpreter.set_fs(&fs);
    }

    let mut argv = vec!["awk-vm".to_string()];
    argv.extend(operands);
    interpreter.set_args(argv);

    for assignment in &cli.assignments {
        let (name, value) = assignment
            .split_once('=')
            .ok_or_else(|| format!("invalid -v argument: {}", assignment))?;
        interpreter.set_variable(name, &encoding.widen(value))?;
    }

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut output = io::BufWriter::new(stdout.lock());
    let status = interpreter.run(BufReader::new(stdin.lock()), &mut output)?;
    Ok(status)
}
