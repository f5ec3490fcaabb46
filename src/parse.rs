use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::io::{self, BufRead};

use serde::Serialize;
use thiserror::Error;

use crate::cursor::{structural, LineCursor};

/// A named argument of a [`Command`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Param {
    pub line_no: usize,
    pub name: String,
    pub payload: String,
}

/// One instruction block: `:name payload` followed by its `$param` lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Command {
    pub line_no: usize,
    pub name: String,
    pub payload: String,
    pub params: Vec<Param>,
}

impl Command {
    /// First parameter with the given name.
    pub fn param(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn param_payload(&self, name: &str) -> Option<&str> {
        self.param(name).map(|p| p.payload.as_str())
    }

    /// Render this command back to protocol text.
    ///
    /// Single-line payloads are written inline; anything else goes into a heredoc
    /// whose marker does not collide with any payload line.
    pub fn to_protocol(&self) -> String {
        let mut out = String::new();
        write_entry(&mut out, ':', &self.name, &self.payload);
        for p in &self.params {
            write_entry(&mut out, '$', &p.name, &p.payload);
        }
        out
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_protocol())
    }
}

/// Render a sequence of commands as one protocol document.
pub fn render_document(commands: &[Command]) -> String {
    commands
        .iter()
        .map(Command::to_protocol)
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("line {line}: empty command name")]
    EmptyCommandName { line: usize },
    #[error("line {line}: empty parameter name")]
    EmptyParamName { line: usize },
    #[error("line {line}: empty heredoc marker")]
    EmptyMarker { line: usize },
    #[error("line {line}: unclosed heredoc, marker {marker:?} never found")]
    UnclosedHeredoc { marker: String, line: usize },
    #[error("line {line}: unexpected line {text:?}")]
    UnexpectedLine { line: usize, text: String },
    #[error("line {line}: failed to read input: {source}")]
    Io {
        line: usize,
        #[source]
        source: io::Error,
    },
}

impl ParseError {
    /// Line the error refers to (1-based).
    pub fn line(&self) -> usize {
        match self {
            ParseError::EmptyCommandName { line }
            | ParseError::EmptyParamName { line }
            | ParseError::EmptyMarker { line }
            | ParseError::UnclosedHeredoc { line, .. }
            | ParseError::UnexpectedLine { line, .. }
            | ParseError::Io { line, .. } => *line,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseOptions {
    /// Treat unrecognized lines as fatal instead of discarding them.
    pub strict: bool,
}

#[derive(Clone, Copy)]
enum Entry {
    Command,
    Param,
}

enum Tail<'a> {
    None,
    Inline(&'a str),
    Heredoc(&'a str),
}

/// Incremental protocol parser over a line stream.
pub struct Parser<R> {
    cursor: LineCursor<R>,
    strict: bool,
    pending: VecDeque<Command>,
}

impl<R: BufRead> Parser<R> {
    pub fn new(reader: R) -> Self {
        Self::with_options(reader, ParseOptions::default())
    }

    pub fn strict(reader: R) -> Self {
        Self::with_options(reader, ParseOptions { strict: true })
    }

    pub fn with_options(reader: R, opts: ParseOptions) -> Self {
        Self {
            cursor: LineCursor::new(reader),
            strict: opts.strict,
            pending: VecDeque::new(),
        }
    }

    /// Return the next logical command, or `None` at a clean end of input.
    ///
    /// A block whose parameter names repeat is split into several commands; the
    /// copies are handed out by successive calls.
    pub fn parse_command(&mut self) -> Result<Option<Command>, ParseError> {
        if let Some(cmd) = self.pending.pop_front() {
            return Ok(Some(cmd));
        }

        let (line_no, header) = loop {
            let Some((n, raw)) = self.next_line()? else {
                return Ok(None);
            };
            let line = structural(&raw);
            if is_skippable(line) {
                continue;
            }
            match line.strip_prefix(':') {
                Some(rest) => break (n, rest.to_string()),
                None => self.unexpected(n, line)?,
            }
        };

        let (name, payload) = self.read_entry(line_no, &header, Entry::Command)?;
        log::trace!("line {line_no}: command {name:?}");

        let mut params = Vec::new();
        while !self.next_is_command()? {
            let Some((n, raw)) = self.next_line()? else {
                break;
            };
            let line = structural(&raw);
            if is_skippable(line) {
                continue;
            }
            match line.strip_prefix('$') {
                Some(rest) => {
                    let (pname, ppayload) = self.read_entry(n, rest, Entry::Param)?;
                    params.push(Param {
                        line_no: n,
                        name: pname,
                        payload: ppayload,
                    });
                }
                None => self.unexpected(n, line)?,
            }
        }

        let mut copies: VecDeque<Command> = split_repeated(Command {
            line_no,
            name,
            payload,
            params,
        })
        .into();
        let first = copies.pop_front();
        self.pending = copies;
        Ok(first)
    }

    /// Drain every remaining command.
    pub fn parse(&mut self) -> Result<Vec<Command>, ParseError> {
        let mut out = Vec::new();
        while let Some(cmd) = self.parse_command()? {
            out.push(cmd);
        }
        Ok(out)
    }

    fn next_line(&mut self) -> Result<Option<(usize, String)>, ParseError> {
        let line = self.cursor.line_no() + 1;
        self.cursor
            .next_line()
            .map_err(|source| ParseError::Io { line, source })
    }

    fn next_is_command(&mut self) -> Result<bool, ParseError> {
        let line = self.cursor.line_no() + 1;
        let next = self
            .cursor
            .peek()
            .map_err(|source| ParseError::Io { line, source })?;
        // End of input also ends the parameter list.
        Ok(next.map_or(true, |l| l.starts_with(':')))
    }

    fn unexpected(&self, line: usize, text: &str) -> Result<(), ParseError> {
        if self.strict {
            return Err(ParseError::UnexpectedLine {
                line,
                text: text.to_string(),
            });
        }
        log::trace!("line {line}: discarding {text:?}");
        Ok(())
    }

    fn read_entry(
        &mut self,
        line: usize,
        header: &str,
        entry: Entry,
    ) -> Result<(String, String), ParseError> {
        let (name, tail) = split_name(header);
        if name.is_empty() {
            return Err(match entry {
                Entry::Command => ParseError::EmptyCommandName { line },
                Entry::Param => ParseError::EmptyParamName { line },
            });
        }
        let payload = match tail {
            Tail::None => String::new(),
            Tail::Inline(p) => p.to_string(),
            Tail::Heredoc(m) => {
                let marker = m.trim();
                if marker.is_empty() {
                    return Err(ParseError::EmptyMarker { line });
                }
                self.read_heredoc(marker, line)?
            }
        };
        Ok((name, payload))
    }

    fn read_heredoc(&mut self, marker: &str, opened_at: usize) -> Result<String, ParseError> {
        let mut body = Vec::new();
        loop {
            match self.next_line()? {
                None => {
                    return Err(ParseError::UnclosedHeredoc {
                        marker: marker.to_string(),
                        line: opened_at,
                    })
                }
                Some((_, raw)) => {
                    if structural(&raw) == marker {
                        break;
                    }
                    body.push(raw);
                }
            }
        }
        Ok(body.join("\n"))
    }
}

/// Parse a whole document in lenient mode.
pub fn parse_str(text: &str) -> Result<Vec<Command>, ParseError> {
    Parser::new(text.as_bytes()).parse()
}

/// Parse a whole document, failing on any unrecognized line.
pub fn parse_str_strict(text: &str) -> Result<Vec<Command>, ParseError> {
    Parser::strict(text.as_bytes()).parse()
}

fn is_skippable(line: &str) -> bool {
    line.trim().is_empty() || line.starts_with('#')
}

/// Split a header into its name and whatever follows the name.
///
/// The name ends at the first unescaped space (inline payload follows) or `<`
/// (heredoc marker follows). `\x` in a name stands for a literal `x`.
fn split_name(s: &str) -> (String, Tail<'_>) {
    let mut name = String::new();
    let mut chars = s.char_indices();
    while let Some((i, ch)) = chars.next() {
        match ch {
            '\\' => match chars.next() {
                Some((_, esc)) => name.push(esc),
                None => name.push('\\'),
            },
            ' ' => return (name, Tail::Inline(s[i + 1..].trim_end())),
            '<' => return (name, Tail::Heredoc(&s[i + 1..])),
            _ => name.push(ch),
        }
    }
    (name, Tail::None)
}

/// Split a command at every parameter name that repeats within the current run.
fn split_repeated(cmd: Command) -> Vec<Command> {
    let Command {
        line_no,
        name,
        payload,
        params,
    } = cmd;

    let mut groups = Vec::new();
    let mut current: Vec<Param> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for p in params {
        if seen.contains(&p.name) {
            groups.push(std::mem::take(&mut current));
            seen.clear();
        }
        seen.insert(p.name.clone());
        current.push(p);
    }
    groups.push(current);

    if groups.len() > 1 {
        log::debug!(
            "line {line_no}: repeated parameters split {name:?} into {} commands",
            groups.len()
        );
    }

    groups
        .into_iter()
        .map(|params| Command {
            line_no,
            name: name.clone(),
            payload: payload.clone(),
            params,
        })
        .collect()
}

fn write_entry(out: &mut String, sigil: char, name: &str, payload: &str) {
    out.push(sigil);
    for ch in name.chars() {
        if matches!(ch, ' ' | '<' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    if payload.is_empty() {
        out.push('\n');
    } else if payload.contains(['\n', '\r']) || payload.trim_end() != payload {
        let marker = pick_marker(payload);
        out.push('<');
        out.push_str(&marker);
        out.push('\n');
        out.push_str(payload);
        out.push('\n');
        out.push_str(&marker);
        out.push('\n');
    } else {
        out.push(' ');
        out.push_str(payload);
        out.push('\n');
    }
}

fn pick_marker(payload: &str) -> String {
    let taken: HashSet<&str> = payload.split('\n').map(structural).collect();
    let mut marker = "EOF".to_string();
    let mut n = 0;
    while taken.contains(marker.as_str()) {
        n += 1;
        marker = format!("EOF_{n}");
    }
    marker
}
