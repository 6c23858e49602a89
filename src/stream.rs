use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};

use crate::error::{LispError, LispResult};

/// Where input bytes come from.
enum Source {
    Text { bytes: Vec<u8>, pos: usize },
    Reader(BufReader<Box<dyn Read>>),
}

/// Character input with a single byte of pushback.
pub struct InputStream {
    source: Source,
    pushback: Option<u8>,
    line: usize,
    column: usize,
    /// Position before the last `get_char`, restored by `unget_char`.
    prev: (usize, usize),
}

impl InputStream {
    fn with_source(source: Source) -> Self {
        InputStream {
            source,
            pushback: None,
            line: 1,
            column: 1,
            prev: (1, 1),
        }
    }

    /// An in-memory stream over `text`.
    pub fn from_text(text: &str) -> Self {
        Self::with_source(Source::Text {
            bytes: text.as_bytes().to_vec(),
            pos: 0,
        })
    }

    /// Open a file for reading.
    pub fn open(path: &str) -> LispResult<Self> {
        let file = File::open(path)
            .map_err(|e| LispError::Io(format!("cannot open '{}': {}", path, e)))?;
        Ok(Self::from_reader(file))
    }

    pub fn stdin() -> Self {
        Self::from_reader(io::stdin())
    }

    pub fn from_reader(reader: impl Read + 'static) -> Self {
        let boxed: Box<dyn Read> = Box::new(reader);
        Self::with_source(Source::Reader(BufReader::new(boxed)))
    }

    /// Next byte, or `None` at end of input.
    pub fn get_char(&mut self) -> LispResult<Option<u8>> {
        let next = match self.pushback.take() {
            Some(c) => Some(c),
            None => self.read_source()?,
        };
        if let Some(c) = next {
            self.prev = (self.line, self.column);
            if c == b'\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        Ok(next)
    }

    /// Push one byte back. Only one byte of pushback is available.
    pub fn unget_char(&mut self, c: u8) -> LispResult<()> {
        if self.pushback.is_some() {
            return Err(LispError::Internal("pushback buffer already full".into()));
        }
        self.pushback = Some(c);
        (self.line, self.column) = self.prev;
        Ok(())
    }

    pub fn peek_char(&mut self) -> LispResult<Option<u8>> {
        let c = self.get_char()?;
        if let Some(c) = c {
            self.unget_char(c)?;
        }
        Ok(c)
    }

    /// Line and column of the next byte to be read, both 1-based.
    pub fn position(&self) -> (usize, usize) {
        (self.line, self.column)
    }

    fn read_source(&mut self) -> LispResult<Option<u8>> {
        match &mut self.source {
            Source::Text { bytes, pos } => {
                let c = bytes.get(*pos).copied();
                if c.is_some() {
                    *pos += 1;
                }
                Ok(c)
            }
            Source::Reader(reader) => {
                let buf = reader.fill_buf()?;
                match buf.first().copied() {
                    Some(c) => {
                        reader.consume(1);
                        Ok(Some(c))
                    }
                    None => Ok(None),
                }
            }
        }
    }
}

/// Where output goes.
enum Sink {
    Stdout(io::Stdout),
    Stderr(io::Stderr),
    Buffer { buf: String, limit: usize },
}

/// Character output to the console or a bounded in-memory buffer.
pub struct OutputStream {
    sink: Sink,
}

impl OutputStream {
    pub fn stdout() -> Self {
        OutputStream {
            sink: Sink::Stdout(io::stdout()),
        }
    }

    pub fn stderr() -> Self {
        OutputStream {
            sink: Sink::Stderr(io::stderr()),
        }
    }

    /// An in-memory buffer holding at most `limit` bytes.
    pub fn buffer(limit: usize) -> Self {
        OutputStream {
            sink: Sink::Buffer {
                buf: String::new(),
                limit,
            },
        }
    }

    pub fn put_char(&mut self, c: char) -> LispResult<()> {
        let mut tmp = [0u8; 4];
        self.put_str(c.encode_utf8(&mut tmp))
    }

    /// Write a whole string. A buffer write that would pass the limit fails
    /// without writing anything.
    pub fn put_str(&mut self, s: &str) -> LispResult<()> {
        match &mut self.sink {
            Sink::Stdout(out) => out.lock().write_all(s.as_bytes())?,
            Sink::Stderr(out) => out.lock().write_all(s.as_bytes())?,
            Sink::Buffer { buf, limit } => {
                if buf.len() + s.len() > *limit {
                    return Err(LispError::OutputOverflow { limit: *limit });
                }
                buf.push_str(s);
            }
        }
        Ok(())
    }

    pub fn put_int(&mut self, n: i64) -> LispResult<()> {
        self.put_str(&n.to_string())
    }

    pub fn flush(&mut self) -> LispResult<()> {
        match &mut self.sink {
            Sink::Stdout(out) => out.flush()?,
            Sink::Stderr(out) => out.flush()?,
            Sink::Buffer { .. } => {}
        }
        Ok(())
    }

    /// Buffered text, for in-memory streams.
    pub fn contents(&self) -> Option<&str> {
        match &self.sink {
            Sink::Buffer { buf, .. } => Some(buf),
            _ => None,
        }
    }

    /// Take and clear the buffered text, for in-memory streams.
    pub fn take_contents(&mut self) -> Option<String> {
        match &mut self.sink {
            Sink::Buffer { buf, .. } => Some(std::mem::take(buf)),
            _ => None,
        }
    }
}
