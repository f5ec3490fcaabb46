//! cmdblock — command-block protocol and verified file patching
//!
//! This crate parses the `:command` / `$param` / heredoc protocol and turns each
//! command into an action that is verified against the filesystem before it is
//! applied. It backs the `cmdblock` and `cmdblockview` CLIs.

pub mod action;
pub mod bind;
pub mod cursor;
pub mod dispatch;
pub mod engine;
pub mod parse;
pub mod search;

#[cfg(feature = "pyo3")]
mod python;

use thiserror::Error;

pub use action::{Action, ActionError, EditOp, Outcome, Shell, SystemShell, VerifyError};
pub use bind::{bind, bind_new, BindError, BindParams, FromParam, Json};
pub use cursor::LineCursor;
pub use dispatch::{dispatch, dispatch_all, DispatchError};
pub use engine::{run_commands, run_document, run_reader, Report, RunOptions, Step};
pub use parse::{parse_str, parse_str_strict, render_document, Command, Param, ParseError, ParseOptions, Parser};
pub use search::SearchBlock;

/// Failure of a whole batch, with the position of the action that stopped it.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error("line {line}: {kind}: {source}")]
    Verify {
        line: usize,
        kind: String,
        #[source]
        source: VerifyError,
    },
    #[error("line {line}: {kind}: {source} ({applied} earlier action(s) already applied)")]
    Apply {
        line: usize,
        kind: String,
        applied: usize,
        #[source]
        source: ActionError,
    },
}
