use std::io::{self, BufRead};

/// Peek/consume cursor over a line-based input stream.
///
/// Lines are split on `\n` only. The newline is removed but a preceding `\r`
/// is left in place, so literal blocks copied out of the stream stay byte-exact.
pub struct LineCursor<R> {
    reader: R,
    peeked: Option<String>,
    line_no: usize,
    eof: bool,
}

impl<R: BufRead> LineCursor<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            peeked: None,
            line_no: 0,
            eof: false,
        }
    }

    /// Number of the last consumed line (1-based, 0 before the first read).
    pub fn line_no(&self) -> usize {
        self.line_no
    }

    /// Look at the next line without consuming it.
    pub fn peek(&mut self) -> io::Result<Option<&str>> {
        if self.peeked.is_none() {
            self.peeked = self.read_raw()?;
        }
        Ok(self.peeked.as_deref())
    }

    /// Consume the next line, returning its 1-based number and text.
    pub fn next_line(&mut self) -> io::Result<Option<(usize, String)>> {
        let line = match self.peeked.take() {
            Some(l) => Some(l),
            None => self.read_raw()?,
        };
        Ok(line.map(|l| {
            self.line_no += 1;
            (self.line_no, l)
        }))
    }

    /// True once the underlying reader is exhausted and nothing is peeked.
    pub fn at_eof(&mut self) -> io::Result<bool> {
        Ok(self.peek()?.is_none())
    }

    fn read_raw(&mut self) -> io::Result<Option<String>> {
        if self.eof {
            return Ok(None);
        }
        let mut buf = String::new();
        let n = self.reader.read_line(&mut buf)?;
        if n == 0 {
            self.eof = true;
            return Ok(None);
        }
        if buf.ends_with('\n') {
            buf.pop();
        }
        Ok(Some(buf))
    }
}

/// Strip one trailing `\r`, for comparing structural lines.
pub(crate) fn structural(line: &str) -> &str {
    line.strip_suffix('\r').unwrap_or(line)
}
