use std::fmt;

use crate::error::LispResult;
use crate::eval::Machine;

/// Index into the cell heap. This is the GC handle.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellId(pub u32);

impl CellId {
    /// The `Nil` singleton. Slot 0 of every heap.
    pub const NIL: CellId = CellId(0);
    /// The `True` singleton. Slot 1 of every heap.
    pub const TRUE: CellId = CellId(1);

    pub fn is_nil(self) -> bool {
        self == CellId::NIL
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CellId({})", self.0)
    }
}

/// Native function signature. Receives the machine and the already-evaluated
/// arguments; the arguments stay rooted for the duration of the call.
pub type NativeFn = fn(&mut Machine, &[CellId]) -> LispResult<CellId>;

/// A native function registered under a name.
#[derive(Clone)]
pub struct Primitive {
    pub name: String,
    pub func: NativeFn,
}

/// A closure: parameter list, body forms and the environment it was created in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Procedure {
    /// `List` of `Symbol` cells.
    pub params: CellId,
    /// `List` of body forms, evaluated with `begin` semantics.
    pub body: CellId,
    pub env: CellId,
}

/// The runtime value representation. List elements and closure parts are
/// handles into the heap; the heap owns every cell.
#[derive(Clone)]
pub enum Cell {
    Nil,
    True,
    List(Vec<CellId>),
    Str(String),
    Symbol(String),
    Integer(i64),
    Primitive(Primitive),
    Procedure(Procedure),
}

impl Cell {
    pub fn type_name(&self) -> &'static str {
        match self {
            Cell::Nil => "nil",
            Cell::True => "true",
            Cell::List(_) => "list",
            Cell::Str(_) => "string",
            Cell::Symbol(_) => "symbol",
            Cell::Integer(_) => "integer",
            Cell::Primitive(_) => "primitive",
            Cell::Procedure(_) => "procedure",
        }
    }

    /// Element count for lists, byte count for strings and symbols.
    pub fn len(&self) -> Option<usize> {
        match self {
            Cell::List(items) => Some(items.len()),
            Cell::Str(s) | Cell::Symbol(s) => Some(s.len()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[CellId]> {
        match self {
            Cell::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Cell::Symbol(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Cell::Integer(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Nil => write!(f, "Nil"),
            Cell::True => write!(f, "True"),
            Cell::List(items) => write!(f, "List({:?})", items),
            Cell::Str(s) => write!(f, "Str({:?})", s),
            Cell::Symbol(s) => write!(f, "Symbol({})", s),
            Cell::Integer(n) => write!(f, "Integer({})", n),
            Cell::Primitive(p) => write!(f, "Primitive({})", p.name),
            Cell::Procedure(p) => write!(f, "Procedure({:?})", p),
        }
    }
}
