use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process;

use anyhow::{bail, Context, Result};
use clap::Parser;

use cmdblock::{run_commands, Error, Outcome, ParseOptions, Parser as DocParser, RunOptions, SystemShell};

/// Apply a command-block document to the filesystem.
///
/// Every command is verified before any is applied. `exec` commands ask for
/// confirmation on stdin unless --yes is given, so a document piped on stdin
/// may only contain `exec` commands together with --yes.
#[derive(Debug, Parser)]
#[command(name = "cmdblock", version)]
struct Args {
    /// Protocol document to read; `-` or nothing reads stdin.
    file: Option<PathBuf>,

    /// Fail on any line that is not a command, parameter, comment or blank.
    #[arg(long, env = "CMDBLOCK_STRICT")]
    strict: bool,

    /// Verify every command but change nothing.
    #[arg(long)]
    dry_run: bool,

    /// Run `exec` commands without asking.
    #[arg(short = 'y', long)]
    yes: bool,

    /// Resolve relative paths against this directory.
    #[arg(short = 'C', long = "dir", value_name = "DIR")]
    dir: Option<PathBuf>,

    /// Log progress to stderr.
    #[arg(short, long)]
    verbose: bool,
}

/// Returns the document and whether it was taken from stdin.
fn read_input(file: Option<&PathBuf>) -> Result<(String, bool)> {
    match file {
        Some(p) if p.as_os_str() != "-" => {
            let text = fs::read_to_string(p).with_context(|| format!("failed to read {}", p.display()))?;
            Ok((text, false))
        }
        _ => {
            let mut input = String::new();
            io::stdin()
                .read_to_string(&mut input)
                .context("failed to read stdin")?;
            Ok((input, true))
        }
    }
}

fn describe(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Written(p) => format!("wrote {}", p.display()),
        Outcome::Created(p) => format!("created {}", p.display()),
        Outcome::Removed(p) => format!("removed {}", p.display()),
        Outcome::Ran { command, .. } => format!("ran {command}"),
        Outcome::Declined(command) => format!("skipped {command}"),
    }
}

fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<Error>() {
        Some(Error::Apply { .. }) => 1,
        Some(_) => 2,
        None => 1,
    }
}

fn run(args: &Args) -> Result<()> {
    // Read before changing directory so a relative FILE means what the user typed.
    let (input, from_stdin) = read_input(args.file.as_ref())?;

    let commands = DocParser::with_options(input.as_bytes(), ParseOptions { strict: args.strict })
        .parse()
        .map_err(Error::from)?;

    // Confirmations are read from stdin, which the document already drained.
    let has_exec = commands.iter().any(|c| c.name.eq_ignore_ascii_case("exec"));
    if from_stdin && has_exec && !args.yes && !args.dry_run {
        bail!("exec commands cannot be confirmed when the document is read from stdin; pass -y to run them or give the document as FILE");
    }

    if let Some(dir) = &args.dir {
        std::env::set_current_dir(dir)
            .with_context(|| format!("failed to enter {}", dir.display()))?;
    }

    let opts = RunOptions {
        strict: args.strict,
        dry_run: args.dry_run,
    };
    let mut shell = SystemShell {
        assume_yes: args.yes,
    };

    let report = run_commands(&commands, &opts, &mut shell)?;

    for step in &report.steps {
        match &step.outcome {
            Some(o) => println!("{}: {}", step.line_no, describe(o)),
            None => println!("{}: {} {} ok", step.line_no, step.kind, step.target),
        }
    }
    Ok(())
}

fn main() {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();

    if let Err(e) = run(&args) {
        // Library errors already carry their cause in the message.
        if e.downcast_ref::<Error>().is_some() {
            eprintln!("error: {e}");
        } else {
            eprintln!("error: {e:#}");
        }
        process::exit(exit_code(&e));
    }
}
