use std::{
    cell::RefCell,
    io::Write,
    path::{Path, PathBuf},
    process::ExitCode,
    rc::Rc,
    time::{SystemTime, UNIX_EPOCH},
};

use clap::{Args, Parser, Subcommand};
use obsidian::{
    interpreter::ExecutionError,
    parser,
    runtime::{RunError, Runtime},
    tokenizer,
};

const SOURCE_EXTENSIONS: [&str; 2] = ["ob", "obsidian"];

/// Exit code used when the interpreter itself fails.
const INTERNAL_FAILURE: u8 = 70;

#[derive(Debug, Parser)]
#[command(version, about = "Interpreter for the Obsidian scripting language")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

impl Cli {
    pub fn command(&self) -> &Command {
        self.command.as_ref().unwrap_or(&Command::Repl)
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a source file
    Run(FileArgs),
    /// Start an interactive session
    Repl,
    /// Print the tokens of a source file
    Tokens(FileArgs),
    /// Print the syntax tree of a source file
    Ast(FileArgs),
}

#[derive(Debug, Args)]
struct FileArgs {
    file: PathBuf,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("Usage: {0}")]
    Usage(String),
    #[error("Could not read '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Could not write to the terminal: {0}")]
    Io(#[from] std::io::Error),
    /// Already written to stderr when it happened.
    #[error(transparent)]
    Run(#[from] RunError),
}

impl CliError {
    fn exit_code(&self) -> u8 {
        match self {
            CliError::Usage(_) => 64,
            CliError::Read { .. } => 66,
            CliError::Io(_) => 74,
            CliError::Run(err) => err.exit_code(),
        }
    }
}

fn main() -> ExitCode {
    init_tracing();
    install_panic_hook();

    let args = Cli::parse();

    let result = match args.command() {
        Command::Repl => repl_command(),
        Command::Run(args) => run_command(args),
        Command::Tokens(args) => tokens_command(args),
        Command::Ast(args) => ast_command(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Run(err)) => {
            if let RunError::Execution(ExecutionError::Internal { message, snapshot }) = &err {
                write_core_dump(message, snapshot);
            }
            ExitCode::from(err.exit_code())
        }
        Err(err) => {
            eprintln!("{err}");
            ExitCode::from(err.exit_code())
        }
    }
}

/// Logging is off unless `RUST_LOG` is set, e.g. `RUST_LOG=obsidian=trace`.
fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
            .with(EnvFilter::from_default_env())
            .init();
    }
}

fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        default_hook(info);
        let backtrace = std::backtrace::Backtrace::force_capture();
        write_core_dump(&info.to_string(), &backtrace.to_string());
        std::process::exit(INTERNAL_FAILURE.into());
    }));
}

fn write_core_dump(message: &str, snapshot: &str) {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default();
    let path = PathBuf::from(format!("core_dump_{timestamp}.log"));

    tracing::error!(path = %path.display(), "writing core dump");
    match std::fs::write(&path, format!("{message}\n\n{snapshot}\n")) {
        Ok(()) => eprintln!("Internal failure, state written to {}", path.display()),
        Err(e) => eprintln!("Internal failure, could not write {}: {e}", path.display()),
    }
}

fn repl_command() -> Result<(), CliError> {
    println!("Welcome to the Obsidian REPL!");
    println!("Type .exit or send EOF to quit. (Ctrl+D on *nix, Ctrl+Z on Windows)");

    let mut runtime = Runtime::new(
        Rc::new(RefCell::new(std::io::stdout())),
        Rc::new(RefCell::new(std::io::stderr())),
    );
    let mut input = String::new();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        input.clear();
        if std::io::stdin().read_line(&mut input)? == 0 {
            break;
        }

        let source = input.trim();
        if source == ".exit" {
            break;
        }

        match runtime.run(source) {
            Ok(()) => {}
            Err(err @ RunError::Execution(ExecutionError::Internal { .. })) => {
                return Err(err.into())
            }
            // Reported by the runtime, the session goes on
            Err(_) => {}
        }
    }

    Ok(())
}

fn run_command(args: &FileArgs) -> Result<(), CliError> {
    let has_source_extension = args
        .file
        .extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| SOURCE_EXTENSIONS.contains(&extension));
    if !has_source_extension {
        return Err(CliError::Usage(format!(
            "obsidian run <file>, where the file ends in .{}",
            SOURCE_EXTENSIONS.join(" or .")
        )));
    }

    let source = read_source(&args.file)?;
    let mut runtime = Runtime::new(
        Rc::new(RefCell::new(std::io::stdout())),
        Rc::new(RefCell::new(std::io::stderr())),
    );
    runtime.run(&source)?;
    Ok(())
}

fn tokens_command(args: &FileArgs) -> Result<(), CliError> {
    let source = read_source(&args.file)?;
    let tokens = tokenizer::tokens(&source).map_err(|errors| {
        eprint!("{errors}");
        RunError::from(errors)
    })?;

    let mut stdout = std::io::stdout().lock();
    let mut line = 0;
    for token in tokens {
        if token.line != line {
            write!(stdout, "{:4} ", token.line)?;
            line = token.line;
        } else {
            write!(stdout, "   | ")?;
        }

        writeln!(
            stdout,
            "{:<10} {}",
            format!("{:?}", token.token_type),
            token.lexeme
        )?;
    }

    Ok(())
}

fn ast_command(args: &FileArgs) -> Result<(), CliError> {
    let source = read_source(&args.file)?;
    let tokens = tokenizer::tokens(&source).map_err(|errors| {
        eprint!("{errors}");
        RunError::from(errors)
    })?;
    let program = parser::program(&tokens).map_err(|errors| {
        eprint!("{errors}");
        RunError::from(errors)
    })?;

    write!(std::io::stdout().lock(), "{program}")?;
    Ok(())
}

fn read_source(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })
}
