// ptyrelay: backend half of a browser-accessible terminal
//
// Runs a command on a pty, turns its output into line logs and an escaped
// viewer stream, and turns viewer keystrokes back into pty input.

use clap::{Parser as ClapParser, Subcommand};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, ErrorKind, Read, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use ptyrelay::config::parse_terminal_size;
use ptyrelay::sink::write_fully;
use ptyrelay::{escape, LogSink, Session, SessionConfig, Target};

mod bridge;
mod pty;

#[derive(ClapParser)]
#[command(name = "ptyrelay")]
#[command(about = "Pty relay for browser terminals", long_about = None)]
struct Cli {
    /// Log level used when RUST_LOG is not set (logs go to stderr)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a command on a pty: keystrokes on stdin, viewer stream on stdout
    Bridge {
        /// Terminal size (e.g., 80x24)
        #[arg(long, default_value = "80x24")]
        size: String,

        /// Append reconstructed lines to this file
        #[arg(long)]
        plain_log: Option<PathBuf>,

        /// Append the raw pty output to this file
        #[arg(long)]
        raw_log: Option<PathBuf>,

        /// Do not write the escaped viewer stream to stdout
        #[arg(long)]
        no_forward: bool,

        /// Longest line that can be reconstructed, in bytes
        #[arg(long, default_value_t = SessionConfig::default().line_capacity)]
        line_capacity: usize,

        /// TERM value for the child
        #[arg(long, default_value = "xterm")]
        term: String,

        /// Where to write the diagnostic dump if the session fails
        #[arg(long)]
        dump: Option<PathBuf>,

        /// Command to run
        #[arg(required = true, last = true)]
        command: Vec<String>,
    },

    /// Rebuild plaintext lines (or the viewer stream) from a raw log
    Replay {
        /// Raw log to read (stdin if omitted)
        file: Option<PathBuf>,

        /// Print the escaped viewer stream instead of plaintext lines
        #[arg(long)]
        escaped: bool,

        /// Longest line that can be reconstructed, in bytes
        #[arg(long, default_value_t = SessionConfig::default().line_capacity)]
        line_capacity: usize,
    },

    /// Print the transport-safe encoding of a file (stdin if omitted)
    Encode {
        file: Option<PathBuf>,
    },
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(false)
        .init();
}

fn open_input(file: Option<PathBuf>) -> Result<Box<dyn Read>> {
    match file {
        Some(path) => {
            let f = File::open(&path).with_context(|| format!("Failed to open {}", path.display()))?;
            Ok(Box::new(f))
        }
        None => Ok(Box::new(io::stdin())),
    }
}

fn cmd_replay(file: Option<PathBuf>, escaped: bool, line_capacity: usize) -> Result<()> {
    let mut input = open_input(file)?;
    let config = SessionConfig {
        line_capacity,
        forward_to_viewers: escaped,
        ..Default::default()
    };
    let mut session = Session::new(config);
    if !escaped {
        session.attach_logs(Some(LogSink::new(io::stdout())), None);
    }

    let mut stdout = io::stdout();
    let mut buf = [0u8; 4096];
    loop {
        let n = match input.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e).context("Failed to read raw log"),
        };
        session.process_output(&buf[..n])?;
        if escaped {
            write_fully(&mut stdout, session.escaped_output(), Target::Viewers)?;
        }
    }

    // An unterminated last line would otherwise be lost
    if !escaped && !session.line().is_empty() {
        session.process_output(b"\n")?;
    }
    stdout.flush()?;
    Ok(())
}

fn cmd_encode(file: Option<PathBuf>) -> Result<()> {
    let mut input = open_input(file)?;
    let mut data = Vec::new();
    input.read_to_end(&mut data).context("Failed to read input")?;

    let mut encoded = escape::encode(&data);
    encoded.push(b'\n');
    let mut stdout = io::stdout();
    write_fully(&mut stdout, &encoded, Target::Viewers)?;
    stdout.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match cli.command {
        Commands::Bridge { size, plain_log, raw_log, no_forward, line_capacity, term, dump, command } => {
            let (cols, rows) = parse_terminal_size(&size)?;
            let config = SessionConfig {
                line_capacity,
                forward_to_viewers: !no_forward,
                ..Default::default()
            };
            let code = bridge::run(bridge::BridgeOptions {
                command,
                cols,
                rows,
                term,
                plain_log,
                raw_log,
                dump,
                config,
            })?;
            std::process::exit(code);
        }
        Commands::Replay { file, escaped, line_capacity } => {
            cmd_replay(file, escaped, line_capacity)?;
        }
        Commands::Encode { file } => {
            cmd_encode(file)?;
        }
    }

    Ok(())
}
