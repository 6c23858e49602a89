use crate::error::LispResult;
use crate::heap::Heap;
use crate::stream::OutputStream;
use crate::value::{Cell, CellId};

/// Prefix written once per nesting level by the indented printer.
pub const INDENT: &str = "  ";

const MAX_PRINT_DEPTH: usize = 1000;

/// Print a value on one line.
pub fn print_val(val: CellId, heap: &Heap) -> String {
    let mut out = String::new();
    print_inner(val, heap, &mut out, 0);
    out
}

/// Print a value with one `INDENT` per level of `depth`. Lists made only of
/// atoms stay on one line; any other list puts each element on its own line,
/// one level deeper. The result reads back to the same value.
pub fn print_indented(val: CellId, heap: &Heap, depth: usize) -> String {
    let mut out = String::new();
    print_tree(val, heap, &mut out, depth);
    out
}

/// Write the indented rendering of `val` to a stream.
pub fn print(val: CellId, heap: &Heap, out: &mut OutputStream, depth: usize) -> LispResult<()> {
    out.put_str(&print_indented(val, heap, depth))
}

fn print_inner(val: CellId, heap: &Heap, out: &mut String, depth: usize) {
    if depth > MAX_PRINT_DEPTH {
        out.push_str("...");
        return;
    }

    match heap.get(val) {
        Cell::List(items) => {
            out.push('(');
            for (i, &item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                print_inner(item, heap, out, depth + 1);
            }
            out.push(')');
        }
        cell => print_atom(cell, out),
    }
}

fn print_tree(val: CellId, heap: &Heap, out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
    let items = match heap.get(val) {
        Cell::List(items) if !is_flat(items, heap) => items,
        _ => {
            print_inner(val, heap, out, depth);
            return;
        }
    };
    if depth > MAX_PRINT_DEPTH {
        out.push_str("...");
        return;
    }
    out.push('(');
    for &item in items {
        out.push('\n');
        print_tree(item, heap, out, depth + 1);
    }
    out.push(')');
}

fn is_flat(items: &[CellId], heap: &Heap) -> bool {
    items
        .iter()
        .all(|&item| !matches!(heap.get(item), Cell::List(_)))
}

fn print_atom(cell: &Cell, out: &mut String) {
    match cell {
        Cell::Nil => out.push_str("nil"),
        Cell::True => out.push('t'),
        Cell::Integer(n) => out.push_str(&n.to_string()),
        Cell::Str(s) => {
            out.push('"');
            for ch in s.chars() {
                if ch == '"' || ch == '\\' {
                    out.push('\\');
                }
                out.push(ch);
            }
            out.push('"');
        }
        Cell::Symbol(name) => {
            for ch in name.chars() {
                if matches!(ch, '"' | '\\' | '(' | ')') {
                    out.push('\\');
                }
                out.push(ch);
            }
        }
        // Closures are never expanded: their environments can be large.
        Cell::Primitive(p) => {
            out.push_str("#<primitive ");
            out.push_str(&p.name);
            out.push('>');
        }
        Cell::Procedure(_) => out.push_str("#<procedure>"),
        Cell::List(_) => out.push_str("(...)"),
    }
}
