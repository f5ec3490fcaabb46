use std::io::BufRead;

use crate::action::{Action, Outcome, Shell};
use crate::dispatch::dispatch_all;
use crate::parse::{Command, ParseOptions, Parser};
use crate::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Reject unrecognized protocol lines.
    pub strict: bool,
    /// Verify every action but apply none.
    pub dry_run: bool,
}

/// One action of a batch and what happened to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub line_no: usize,
    pub kind: String,
    pub target: String,
    /// `None` when the action was only verified.
    pub outcome: Option<Outcome>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    pub steps: Vec<Step>,
    pub dry_run: bool,
}

/// Parse, dispatch, verify and apply a protocol document.
pub fn run_document(text: &str, opts: &RunOptions, shell: &mut dyn Shell) -> Result<Report, Error> {
    run_reader(text.as_bytes(), opts, shell)
}

pub fn run_reader<R: BufRead>(reader: R, opts: &RunOptions, shell: &mut dyn Shell) -> Result<Report, Error> {
    let commands = Parser::with_options(reader, ParseOptions { strict: opts.strict }).parse()?;
    run_commands(&commands, opts, shell)
}

/// Run already parsed commands.
///
/// Nothing is applied unless every action dispatches and verifies. Once
/// applying starts, a failure stops the batch; earlier actions stay applied and
/// the error records how many there were.
pub fn run_commands(commands: &[Command], opts: &RunOptions, shell: &mut dyn Shell) -> Result<Report, Error> {
    let actions = dispatch_all(commands)?;
    verify_all(&actions, &*shell)?;

    let mut report = Report {
        steps: Vec::with_capacity(actions.len()),
        dry_run: opts.dry_run,
    };

    for (applied, action) in actions.iter().enumerate() {
        let cmd = action.command();
        let outcome = if opts.dry_run {
            None
        } else {
            let outcome = action.apply(shell).map_err(|source| Error::Apply {
                line: cmd.line_no,
                kind: action.kind(),
                applied,
                source,
            })?;
            Some(outcome)
        };
        report.steps.push(Step {
            line_no: cmd.line_no,
            kind: action.kind(),
            target: cmd.payload.clone(),
            outcome,
        });
    }
    Ok(report)
}

fn verify_all(actions: &[Action], shell: &dyn Shell) -> Result<(), Error> {
    for action in actions {
        action.verify(shell).map_err(|source| Error::Verify {
            line: action.command().line_no,
            kind: action.kind(),
            source,
        })?;
    }
    Ok(())
}
