use thiserror::Error;

/// Errors that can occur while reading, evaluating or printing.
///
/// Most variants are recoverable: the top-level loop reports them and moves
/// on to the next term. [`LispError::is_fatal`] picks out the ones that stop
/// the interpreter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LispError {
    /// Malformed input: unterminated list or string, bad escape, bad numeral.
    #[error("parse error at {line}:{column}: {message}")]
    Parse {
        message: String,
        line: usize,
        column: usize,
    },

    /// A symbol or string token longer than the configured maximum.
    #[error("token too long at {line}:{column} (maximum is {max} bytes)")]
    TokenTooLong { max: usize, line: usize, column: usize },

    /// Bounds-checked list access outside `[0, len)`. The index is signed so
    /// a negative index from user code is reported as given.
    #[error("index {index} out of range for list of length {len}")]
    Index { index: i64, len: usize },

    /// Symbol lookup or `set!` on a name with no binding.
    #[error("unbound symbol '{0}'")]
    Unbound(String),

    /// Wrong number of operands to a special form, primitive or procedure.
    #[error("{name}: expected {expected} arguments, got {got}")]
    Arity {
        name: String,
        expected: String,
        got: usize,
    },

    /// A value of the wrong type was passed to a primitive or special form.
    #[error("type error: {0}")]
    Type(String),

    #[error("division by zero")]
    DivisionByZero,

    /// Integer arithmetic left the machine range.
    #[error("integer overflow in {0}")]
    Overflow(&'static str),

    /// The head of a call form is not something that can be applied.
    #[error("cannot apply {0}")]
    CannotApply(String),

    /// Evaluation or reading nested deeper than the configured bound.
    #[error("maximum nesting depth {0} exceeded")]
    DepthExceeded(usize),

    /// The interrupt flag was raised while evaluating.
    #[error("interrupted")]
    Interrupted,

    /// A write past the end of a bounded output buffer.
    #[error("output buffer limit of {limit} bytes exceeded")]
    OutputOverflow { limit: usize },

    #[error("I/O error: {0}")]
    Io(String),

    /// The cell store cannot satisfy an allocation.
    #[error("heap exhausted ({capacity} cells)")]
    HeapExhausted { capacity: usize },

    /// Internal invariant violation. Should not happen in correct code.
    #[error("internal error: {0}")]
    Internal(String),
}

impl LispError {
    pub fn parse(message: impl Into<String>, (line, column): (usize, usize)) -> Self {
        LispError::Parse {
            message: message.into(),
            line,
            column,
        }
    }

    pub fn index(index: usize, len: usize) -> Self {
        LispError::Index {
            index: i64::try_from(index).unwrap_or(i64::MAX),
            len,
        }
    }

    pub fn arity(name: impl Into<String>, expected: usize, got: usize) -> Self {
        LispError::Arity {
            name: name.into(),
            expected: expected.to_string(),
            got,
        }
    }

    pub fn arity_at_least(name: impl Into<String>, expected: usize, got: usize) -> Self {
        LispError::Arity {
            name: name.into(),
            expected: format!("at least {}", expected),
            got,
        }
    }

    /// Fatal errors end the top-level loop; everything else is reported and
    /// the loop continues with the next term.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LispError::HeapExhausted { .. } | LispError::Internal(_)
        )
    }
}

impl From<std::io::Error> for LispError {
    fn from(e: std::io::Error) -> Self {
        LispError::Io(e.to_string())
    }
}

pub type LispResult<T> = Result<T, LispError>;
