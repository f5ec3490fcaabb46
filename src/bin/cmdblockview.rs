use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::PathBuf;
use std::process;

use clap::Parser as ArgParser;

use cmdblock::{ParseOptions, Parser};

/// Print the commands of a command-block document as JSON, one per line.
#[derive(Debug, ArgParser)]
#[command(name = "cmdblockview", version)]
struct Args {
    /// Protocol document to read; `-` or nothing reads stdin.
    file: Option<PathBuf>,

    /// Fail on any line that is not a command, parameter, comment or blank.
    #[arg(long, env = "CMDBLOCK_STRICT")]
    strict: bool,
}

fn main() {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .init();

    let reader: Box<dyn Read> = match &args.file {
        Some(p) if p.as_os_str() != "-" => match File::open(p) {
            Ok(f) => Box::new(f),
            Err(e) => {
                eprintln!("error: failed to read {}: {e}", p.display());
                process::exit(1);
            }
        },
        _ => Box::new(io::stdin()),
    };

    let mut parser = Parser::with_options(BufReader::new(reader), ParseOptions { strict: args.strict });

    // Stream commands as they are parsed.
    loop {
        match parser.parse_command() {
            Ok(Some(cmd)) => match serde_json::to_string(&cmd) {
                Ok(json) => println!("{json}"),
                Err(e) => {
                    eprintln!("error: {e}");
                    process::exit(1);
                }
            },
            Ok(None) => break,
            Err(e) => {
                eprintln!("error: {e}");
                process::exit(2);
            }
        }
    }
}
