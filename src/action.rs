use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::{self, Stdio};

use thiserror::Error;

use crate::bind::{bind_new, BindError};
use crate::bind_params;
use crate::parse::Command;
use crate::search::SearchBlock;

/// A precondition that does not hold.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("missing target path")]
    MissingPath,
    #[error("file already exists: {0}")]
    FileExists(PathBuf),
    #[error("file does not exist: {0}")]
    FileMissing(PathBuf),
    #[error("not a regular file: {0}")]
    NotAFile(PathBuf),
    #[error("cannot create parent directory of {path}: {blocker} is not a directory")]
    ParentNotCreatable { path: PathBuf, blocker: PathBuf },
    #[error("parameter {0} must not be empty")]
    EmptyParam(&'static str),
    #[error("search string not found in {0}")]
    SearchNotFound(PathBuf),
    #[error("binary file rejected (NUL byte found): {0}")]
    Binary(PathBuf),
    #[error("non-UTF8 file rejected: {0}")]
    NotUtf8(PathBuf),
    #[error("empty command line")]
    EmptyCommandLine,
    #[error("executable not found on PATH: {0}")]
    ExecutableNotFound(String),
    #[error(transparent)]
    Bind(#[from] BindError),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ActionError {
    #[error(transparent)]
    Verify(#[from] VerifyError),
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("no replacements were made in {0}")]
    NoReplacement(PathBuf),
    #[error("failed to read confirmation: {0}")]
    Prompt(#[source] io::Error),
    #[error("failed to run {command:?}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("command {command:?} {}", exit_label(.code))]
    CommandFailed { command: String, code: Option<i32> },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("exited with status {c}"),
        None => "was terminated by a signal".to_string(),
    }
}

/// What a successful apply did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Written(PathBuf),
    Created(PathBuf),
    Removed(PathBuf),
    Ran { command: String, code: Option<i32> },
    Declined(String),
}

/// Operator confirmation and process execution, as needed by `exec`.
pub trait Shell {
    /// Resolve a program name against the search path.
    fn lookup(&self, program: &str) -> Option<PathBuf>;
    /// Ask the operator a yes/no question.
    fn confirm(&mut self, prompt: &str) -> io::Result<bool>;
    /// Run a command line through the platform shell, returning its exit code.
    fn run(&mut self, command_line: &str) -> io::Result<Option<i32>>;
}

/// [`Shell`] backed by the real terminal and `sh -c` (`cmd /C` on Windows).
#[derive(Debug, Clone, Default)]
pub struct SystemShell {
    /// Answer every confirmation with yes.
    pub assume_yes: bool,
}

impl Shell for SystemShell {
    fn lookup(&self, program: &str) -> Option<PathBuf> {
        which::which(program).ok()
    }

    fn confirm(&mut self, prompt: &str) -> io::Result<bool> {
        if self.assume_yes {
            return Ok(true);
        }
        let mut stderr = io::stderr();
        write!(stderr, "{prompt} [y/N] ")?;
        stderr.flush()?;
        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer)?;
        Ok(is_yes(&answer))
    }

    fn run(&mut self, command_line: &str) -> io::Result<Option<i32>> {
        let status = platform_shell(command_line)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()?;
        Ok(status.code())
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(windows)]
fn platform_shell(command_line: &str) -> process::Command {
    let mut cmd = process::Command::new("cmd");
    cmd.arg("/C").arg(command_line);
    cmd
}

#[cfg(not(windows))]
fn platform_shell(command_line: &str) -> process::Command {
    let mut cmd = process::Command::new("sh");
    cmd.arg("-c").arg(command_line);
    cmd
}

/// Sub-actions of the generic `edit` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOp {
    WriteAll,
    Change,
    Insert,
    Append,
    Delete,
}

impl EditOp {
    /// Case-insensitive lookup of an `action` parameter value.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "writeall" => Some(EditOp::WriteAll),
            "change" => Some(EditOp::Change),
            "insert" => Some(EditOp::Insert),
            "append" => Some(EditOp::Append),
            "delete" => Some(EditOp::Delete),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EditOp::WriteAll => "writeAll",
            EditOp::Change => "change",
            EditOp::Insert => "insert",
            EditOp::Append => "append",
            EditOp::Delete => "delete",
        }
    }
}

/// A verifiable, applicable mutation built from one command.
#[derive(Debug, Clone)]
pub enum Action {
    Rewrite(Command),
    Create(Command),
    Delete(Command),
    Modify(Command),
    Edit(EditOp, Command),
    Exec(Command),
}

#[derive(Debug, Default)]
struct ContentParams {
    content: String,
}

bind_params!(ContentParams {
    content: "content" (required),
});

#[derive(Debug, Default)]
struct ModifyParams {
    search: String,
    replace: String,
}

bind_params!(ModifyParams {
    search: "search" (required),
    replace: "replace",
});

#[derive(Debug, Default)]
struct EditParams {
    search: String,
    content: String,
}

bind_params!(EditParams {
    search: "search",
    content: "content",
});

/// The concrete effect an action resolved to during verification.
enum Plan {
    Write {
        path: PathBuf,
        content: String,
        create_dirs: bool,
    },
    Patch {
        path: PathBuf,
        original: String,
        updated: String,
    },
    Create {
        path: PathBuf,
        content: String,
    },
    Remove {
        path: PathBuf,
    },
    Exec {
        command_line: String,
    },
}

impl Action {
    pub fn command(&self) -> &Command {
        match self {
            Action::Rewrite(c)
            | Action::Create(c)
            | Action::Delete(c)
            | Action::Modify(c)
            | Action::Edit(_, c)
            | Action::Exec(c) => c,
        }
    }

    /// Short label such as `modify` or `edit:insert`.
    pub fn kind(&self) -> String {
        match self {
            Action::Rewrite(_) => "rewrite".into(),
            Action::Create(_) => "create".into(),
            Action::Delete(_) => "delete".into(),
            Action::Modify(_) => "modify".into(),
            Action::Edit(op, _) => format!("edit:{}", op.name()),
            Action::Exec(_) => "exec".into(),
        }
    }

    /// Check every precondition without modifying the filesystem.
    pub fn verify(&self, shell: &dyn Shell) -> Result<(), VerifyError> {
        self.plan(shell).map(|_| ())
    }

    /// Verify, then perform the mutation.
    pub fn apply(&self, shell: &mut dyn Shell) -> Result<Outcome, ActionError> {
        let plan = self.plan(&*shell)?;
        log::debug!("apply {} {:?}", self.kind(), self.command().payload);
        match plan {
            Plan::Write {
                path,
                content,
                create_dirs,
            } => {
                if create_dirs {
                    create_parent_dirs(&path)?;
                }
                write_atomic(&path, &content).map_err(|source| ActionError::Io {
                    path: path.clone(),
                    source,
                })?;
                Ok(Outcome::Written(path))
            }
            Plan::Patch {
                path,
                original,
                updated,
            } => {
                if updated == original {
                    return Err(ActionError::NoReplacement(path));
                }
                write_atomic(&path, &updated).map_err(|source| ActionError::Io {
                    path: path.clone(),
                    source,
                })?;
                Ok(Outcome::Written(path))
            }
            Plan::Create { path, content } => {
                create_parent_dirs(&path)?;
                create_new(&path, &content).map_err(|source| ActionError::Io {
                    path: path.clone(),
                    source,
                })?;
                Ok(Outcome::Created(path))
            }
            Plan::Remove { path } => {
                fs::remove_file(&path).map_err(|source| ActionError::Io {
                    path: path.clone(),
                    source,
                })?;
                Ok(Outcome::Removed(path))
            }
            Plan::Exec { command_line } => {
                let prompt = format!("Run `{command_line}`?");
                if !shell.confirm(&prompt).map_err(ActionError::Prompt)? {
                    log::info!("skipped {command_line:?}");
                    return Ok(Outcome::Declined(command_line));
                }
                let code = shell
                    .run(&command_line)
                    .map_err(|source| ActionError::Spawn {
                        command: command_line.clone(),
                        source,
                    })?;
                if code != Some(0) {
                    return Err(ActionError::CommandFailed {
                        command: command_line,
                        code,
                    });
                }
                Ok(Outcome::Ran {
                    command: command_line,
                    code,
                })
            }
        }
    }

    fn plan(&self, shell: &dyn Shell) -> Result<Plan, VerifyError> {
        log::debug!("verify {} {:?}", self.kind(), self.command().payload);
        match self {
            Action::Rewrite(cmd) => {
                let path = target_path(cmd)?;
                existing_file(&path)?;
                let p: ContentParams = bind_new(cmd)?;
                non_empty("content", &p.content)?;
                Ok(Plan::Write {
                    path,
                    content: p.content,
                    create_dirs: false,
                })
            }
            Action::Create(cmd) => {
                let path = target_path(cmd)?;
                if fs::symlink_metadata(&path).is_ok() {
                    return Err(VerifyError::FileExists(path));
                }
                check_parent_creatable(&path)?;
                let p: ContentParams = bind_new(cmd)?;
                Ok(Plan::Create {
                    path,
                    content: p.content,
                })
            }
            Action::Delete(cmd) => {
                let path = target_path(cmd)?;
                existing_file(&path)?;
                Ok(Plan::Remove { path })
            }
            Action::Modify(cmd) => {
                let path = target_path(cmd)?;
                let original = read_target(&path)?;
                let p: ModifyParams = bind_new(cmd)?;
                non_empty("search", &p.search)?;
                let block = SearchBlock::parse(&p.search);
                if !block.is_match(&original) {
                    return Err(VerifyError::SearchNotFound(path));
                }
                let updated = block.replace(&original, &p.replace);
                Ok(Plan::Patch {
                    path,
                    original,
                    updated,
                })
            }
            Action::Edit(op, cmd) => plan_edit(*op, cmd),
            Action::Exec(cmd) => {
                let command_line = cmd.payload.trim();
                let program = command_line
                    .split_whitespace()
                    .next()
                    .ok_or(VerifyError::EmptyCommandLine)?;
                if shell.lookup(program).is_none() {
                    return Err(VerifyError::ExecutableNotFound(program.to_string()));
                }
                Ok(Plan::Exec {
                    command_line: command_line.to_string(),
                })
            }
        }
    }
}

fn plan_edit(op: EditOp, cmd: &Command) -> Result<Plan, VerifyError> {
    let path = target_path(cmd)?;
    let p: EditParams = bind_new(cmd)?;

    if op == EditOp::WriteAll {
        non_empty("content", &p.content)?;
        return Ok(Plan::Write {
            path,
            content: p.content,
            create_dirs: true,
        });
    }

    let original = read_target(&path)?;
    non_empty("search", &p.search)?;
    if op != EditOp::Delete {
        non_empty("content", &p.content)?;
    }
    let Some(at) = original.find(&p.search) else {
        return Err(VerifyError::SearchNotFound(path));
    };
    let end = at + p.search.len();

    let updated = match op {
        EditOp::Change => splice(&original, at..end, &p.content),
        EditOp::Insert => splice(&original, at..at, &p.content),
        EditOp::Append => splice(&original, end..end, &p.content),
        EditOp::Delete => splice(&original, at..end, ""),
        EditOp::WriteAll => unreachable!("handled above"),
    };
    Ok(Plan::Patch {
        path,
        original,
        updated,
    })
}

fn splice(s: &str, range: std::ops::Range<usize>, new: &str) -> String {
    let mut out = String::with_capacity(s.len() + new.len());
    out.push_str(&s[..range.start]);
    out.push_str(new);
    out.push_str(&s[range.end..]);
    out
}

fn non_empty(name: &'static str, value: &str) -> Result<(), VerifyError> {
    if value.is_empty() {
        return Err(VerifyError::EmptyParam(name));
    }
    Ok(())
}

fn target_path(cmd: &Command) -> Result<PathBuf, VerifyError> {
    if cmd.payload.trim().is_empty() {
        return Err(VerifyError::MissingPath);
    }
    Ok(PathBuf::from(&cmd.payload))
}

fn existing_file(path: &Path) -> Result<(), VerifyError> {
    match fs::metadata(path) {
        Ok(m) if m.is_file() => Ok(()),
        Ok(_) => Err(VerifyError::NotAFile(path.to_path_buf())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(VerifyError::FileMissing(path.to_path_buf()))
        }
        Err(source) => Err(VerifyError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn read_target(path: &Path) -> Result<String, VerifyError> {
    existing_file(path)?;
    let bytes = fs::read(path).map_err(|source| VerifyError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if bytes.contains(&0) {
        return Err(VerifyError::Binary(path.to_path_buf()));
    }
    String::from_utf8(bytes).map_err(|_| VerifyError::NotUtf8(path.to_path_buf()))
}

/// The nearest existing ancestor must be a directory.
fn check_parent_creatable(path: &Path) -> Result<(), VerifyError> {
    let mut dir = path.parent();
    while let Some(d) = dir {
        if d.as_os_str().is_empty() {
            return Ok(());
        }
        match fs::metadata(d) {
            Ok(m) if m.is_dir() => return Ok(()),
            Ok(_) => {
                return Err(VerifyError::ParentNotCreatable {
                    path: path.to_path_buf(),
                    blocker: d.to_path_buf(),
                })
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => dir = d.parent(),
            Err(source) => {
                return Err(VerifyError::Io {
                    path: d.to_path_buf(),
                    source,
                })
            }
        }
    }
    Ok(())
}

fn create_parent_dirs(path: &Path) -> Result<(), ActionError> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => {
            fs::create_dir_all(dir).map_err(|source| ActionError::Io {
                path: dir.to_path_buf(),
                source,
            })
        }
        _ => Ok(()),
    }
}

fn create_new(path: &Path, content: &str) -> io::Result<()> {
    let mut f = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    f.write_all(content.as_bytes())?;
    f.sync_all()
}

/// Write through a sibling temp file and rename over `path`, keeping permissions.
fn write_atomic(path: &Path, content: &str) -> io::Result<()> {
    let dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d,
        _ => Path::new("."),
    };
    let file_name = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "file".to_string());

    let perms = fs::metadata(path).map(|m| m.permissions()).ok();

    let pid = process::id();
    let mut attempt: u64 = 0;
    let tmp_path = loop {
        let candidate = dir.join(format!(".{file_name}.cmdblock.tmp.{pid}.{attempt}"));
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
        {
            Ok(mut f) => {
                if let Err(e) = f.write_all(content.as_bytes()).and_then(|_| f.sync_all()) {
                    drop(f);
                    let _ = fs::remove_file(&candidate);
                    return Err(e);
                }
                if let Some(p) = perms {
                    let _ = fs::set_permissions(&candidate, p);
                }
                break candidate;
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    };

    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }
    Ok(())
}
