//! `lc`: ask an OpenAI-compatible model from the Linux command line.
//!
//! ```bash
//! lc how do I find files larger than 1G
//! dmesg | tail -n 50 | lc what went wrong
//! lc --memory and how do I delete them
//! lc --set openai_base_url=http://localhost:11434/v1/
//! ```

use std::io::{self, IsTerminal, Read};

use arrrg::CommandLine;
use lc::cli::{self, LcArgs};
use lc::config::Paths;
use lc::render::format_error;

fn init_logging(debug: bool) {
    let default_filter = if debug { "warn,lc=debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}

/// Piped stdin, or `None` when stdin is a terminal.
fn read_piped_stdin() -> io::Result<Option<String>> {
    let mut stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }
    let mut buffer = String::new();
    stdin.read_to_string(&mut buffer)?;
    Ok(Some(buffer))
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let (args, free) = LcArgs::from_command_line_relaxed(cli::USAGE);
    init_logging(args.debug);
    let use_color = io::stderr().is_terminal();

    let paths = match Paths::discover() {
        Ok(paths) => paths,
        Err(err) => {
            eprintln!("{}", format_error(&err.to_string(), use_color));
            std::process::exit(1);
        }
    };
    let piped = match read_piped_stdin() {
        Ok(piped) => piped,
        Err(err) => {
            eprintln!("{}", format_error(&format!("failed to read stdin: {err}"), use_color));
            std::process::exit(1);
        }
    };

    if let Err(err) = cli::run(args, free, &paths, piped).await {
        eprintln!("{}", format_error(&err.to_string(), use_color));
        std::process::exit(1);
    }
}
