use crate::error::{LispError, LispResult};
use crate::heap::Heap;
use crate::stream::InputStream;
use crate::value::{Cell, CellId};

/// Limits applied while reading.
#[derive(Debug, Clone, Copy)]
pub struct ReadLimits {
    /// Longest symbol or string, in bytes.
    pub max_token_len: usize,
    /// Deepest list nesting.
    pub max_depth: usize,
}

impl Default for ReadLimits {
    fn default() -> Self {
        ReadLimits {
            max_token_len: 4096,
            max_depth: 256,
        }
    }
}

/// Recursive-descent reader: turns a character stream into cells.
pub struct Reader<'a> {
    input: &'a mut InputStream,
    heap: &'a mut Heap,
    limits: ReadLimits,
    depth: usize,
    /// Lists still open when the current term failed to read.
    unclosed: usize,
}

impl<'a> Reader<'a> {
    pub fn new(input: &'a mut InputStream, heap: &'a mut Heap, limits: ReadLimits) -> Self {
        Reader {
            input,
            heap,
            limits,
            depth: 0,
            unclosed: 0,
        }
    }

    /// Read one term. Returns None at end of input.
    ///
    /// A `)` with no list open is consumed and reported, so the next call
    /// resumes after it. On any other error the rest of the failed term is
    /// skipped up to its closing paren.
    pub fn read_term(&mut self) -> LispResult<Option<CellId>> {
        self.skip_whitespace_and_comments()?;
        let pos = self.input.position();
        match self.input.get_char()? {
            None => Ok(None),
            Some(b')') => Err(LispError::parse("unexpected ')'", pos)),
            Some(c) => {
                self.input.unget_char(c)?;
                self.unclosed = 0;
                match self.read_expr() {
                    Ok(term) => Ok(Some(term)),
                    Err(e) => {
                        let open = std::mem::take(&mut self.unclosed);
                        self.skip_open_lists(open)?;
                        Err(e)
                    }
                }
            }
        }
    }

    /// Read every remaining term.
    pub fn read_all(&mut self) -> LispResult<Vec<CellId>> {
        let mut terms = Vec::new();
        while let Some(term) = self.read_term()? {
            terms.push(term);
        }
        Ok(terms)
    }

    fn skip_whitespace_and_comments(&mut self) -> LispResult<()> {
        loop {
            match self.input.get_char()? {
                Some(c) if is_whitespace(c) => {}
                Some(b';') => {
                    // Line comment
                    while let Some(c) = self.input.get_char()? {
                        if c == b'\n' {
                            break;
                        }
                    }
                }
                Some(c) => {
                    self.input.unget_char(c)?;
                    return Ok(());
                }
                None => return Ok(()),
            }
        }
    }

    fn read_expr(&mut self) -> LispResult<CellId> {
        self.skip_whitespace_and_comments()?;
        let pos = self.input.position();
        match self.input.get_char()? {
            None => Err(LispError::parse("unexpected end of input", pos)),
            Some(b'(') => self.read_list(pos),
            Some(b'"') => self.read_string(pos),
            Some(c) => {
                self.input.unget_char(c)?;
                self.read_token()
            }
        }
    }

    /// Read list elements up to the matching `)`. The opening paren has been
    /// consumed.
    fn read_list(&mut self, start: (usize, usize)) -> LispResult<CellId> {
        if self.depth >= self.limits.max_depth {
            self.unclosed = self.depth + 1;
            return Err(LispError::parse(
                format!("lists nested deeper than {}", self.limits.max_depth),
                start,
            ));
        }
        self.depth += 1;
        let result = self.read_elements(start);
        if result.is_err() && self.unclosed == 0 {
            self.unclosed = self.depth;
        }
        self.depth -= 1;
        result
    }

    fn read_elements(&mut self, start: (usize, usize)) -> LispResult<CellId> {
        let mut elements = Vec::new();
        loop {
            self.skip_whitespace_and_comments()?;
            match self.input.get_char()? {
                None => return Err(LispError::parse("unterminated list", start)),
                Some(b')') => break,
                Some(c) => {
                    self.input.unget_char(c)?;
                    elements.push(self.read_expr()?);
                }
            }
        }
        self.heap.list(elements)
    }

    /// Read a string body. The opening quote has been consumed. Only `\\` and
    /// `\"` are valid escapes.
    fn read_string(&mut self, start: (usize, usize)) -> LispResult<CellId> {
        let mut bytes = Vec::new();
        loop {
            let pos = self.input.position();
            let c = self
                .input
                .get_char()?
                .ok_or_else(|| LispError::parse("unterminated string", start))?;
            match c {
                b'"' => break,
                b'\\' => match self.input.get_char()? {
                    Some(esc @ (b'\\' | b'"')) => bytes.push(esc),
                    Some(other) => {
                        self.skip_string_rest()?;
                        return Err(LispError::parse(
                            format!("invalid escape '\\{}' in string", other as char),
                            pos,
                        ))
                    }
                    None => return Err(LispError::parse("unterminated string", start)),
                },
                c => bytes.push(c),
            }
            if bytes.len() > self.limits.max_token_len {
                self.skip_string_rest()?;
                return Err(self.too_long(start));
            }
        }
        let text = String::from_utf8(bytes)
            .map_err(|_| LispError::parse("invalid UTF-8 in string", start))?;
        self.heap.alloc(Cell::Str(text))
    }

    /// Read a bare token: an integer if it is all digits after an optional
    /// sign, otherwise a symbol. `\(`, `\)`, `\\` and `\"` stand for the
    /// literal character.
    fn read_token(&mut self) -> LispResult<CellId> {
        let start = self.input.position();
        let mut bytes = Vec::new();
        let mut escaped = false;
        loop {
            let pos = self.input.position();
            match self.input.get_char()? {
                None => break,
                Some(c) if is_whitespace(c) => break,
                Some(c @ (b'(' | b')')) => {
                    self.input.unget_char(c)?;
                    break;
                }
                Some(b'\\') => match self.input.get_char()? {
                    Some(esc @ (b'(' | b')' | b'\\' | b'"')) => {
                        escaped = true;
                        bytes.push(esc);
                    }
                    Some(other) => {
                        self.skip_token_rest()?;
                        return Err(LispError::parse(
                            format!("invalid escape '\\{}' in symbol", other as char),
                            pos,
                        ))
                    }
                    None => return Err(LispError::parse("escape at end of input", pos)),
                },
                Some(c) => bytes.push(c),
            }
            if bytes.len() > self.limits.max_token_len {
                self.skip_token_rest()?;
                return Err(self.too_long(start));
            }
        }

        let word = String::from_utf8(bytes)
            .map_err(|_| LispError::parse("invalid UTF-8 in symbol", start))?;

        if !escaped && looks_like_integer(&word) {
            let n = word
                .parse::<i64>()
                .map_err(|_| LispError::parse(format!("integer out of range: {}", word), start))?;
            return self.heap.integer(n);
        }
        self.heap.alloc(Cell::Symbol(word))
    }

    fn skip_string_rest(&mut self) -> LispResult<()> {
        while let Some(c) = self.input.get_char()? {
            match c {
                b'"' => break,
                b'\\' => {
                    self.input.get_char()?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn skip_token_rest(&mut self) -> LispResult<()> {
        while let Some(c) = self.input.get_char()? {
            match c {
                c if is_whitespace(c) => break,
                b'(' | b')' => {
                    self.input.unget_char(c)?;
                    break;
                }
                b'\\' => {
                    self.input.get_char()?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Consume input until `open` lists are closed or input ends. Parens
    /// inside strings, comments and escapes do not count.
    fn skip_open_lists(&mut self, mut open: usize) -> LispResult<()> {
        let mut at_token_start = true;
        while open > 0 {
            let Some(c) = self.input.get_char()? else {
                break;
            };
            match c {
                b'\\' => {
                    self.input.get_char()?;
                    at_token_start = false;
                }
                b'"' if at_token_start => self.skip_string_rest()?,
                b';' if at_token_start => {
                    while let Some(c) = self.input.get_char()? {
                        if c == b'\n' {
                            break;
                        }
                    }
                }
                b'(' => {
                    open += 1;
                    at_token_start = true;
                }
                b')' => {
                    open -= 1;
                    at_token_start = true;
                }
                c => at_token_start = is_whitespace(c),
            }
        }
        Ok(())
    }

    fn too_long(&self, (line, column): (usize, usize)) -> LispError {
        LispError::TokenTooLong {
            max: self.limits.max_token_len,
            line,
            column,
        }
    }
}

fn is_whitespace(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\n' | b'\r' | b'\x0c')
}

/// An optional sign followed by at least one decimal digit and nothing else.
fn looks_like_integer(word: &str) -> bool {
    let digits = word
        .strip_prefix('+')
        .or_else(|| word.strip_prefix('-'))
        .unwrap_or(word);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Read a single term from a string. Errors if the input holds no term.
pub fn read_str(input: &str, heap: &mut Heap) -> LispResult<CellId> {
    let mut stream = InputStream::from_text(input);
    let mut reader = Reader::new(&mut stream, heap, ReadLimits::default());
    reader
        .read_term()?
        .ok_or_else(|| LispError::parse("empty input", (1, 1)))
}

/// Read all terms from a string.
pub fn read_all(input: &str, heap: &mut Heap) -> LispResult<Vec<CellId>> {
    let mut stream = InputStream::from_text(input);
    let mut reader = Reader::new(&mut stream, heap, ReadLimits::default());
    reader.read_all()
}
