use rand::Rng;

use crate::error::{LispError, LispResult};
use crate::eval::Machine;
use crate::printer;
use crate::value::{Cell, CellId, NativeFn};

/// Every primitive installed in a fresh machine, with its global name.
/// Aliases share a function.
const PRIMITIVES: &[(&str, NativeFn)] = &[
    // Arithmetic
    ("add", prim_add),
    ("+", prim_add),
    ("sub", prim_sub),
    ("-", prim_sub),
    ("mul", prim_mul),
    ("*", prim_mul),
    ("div", prim_div),
    ("/", prim_div),
    // Lists
    ("car", prim_car),
    ("first", prim_car),
    ("cdr", prim_cdr),
    ("rest", prim_cdr),
    ("cons", prim_cons),
    ("list", prim_list),
    ("length", prim_length),
    ("nth", prim_nth),
    ("append", prim_append),
    // Predicates
    ("eq", prim_eq),
    ("lt", prim_lt),
    ("<", prim_lt),
    ("gt", prim_gt),
    (">", prim_gt),
    ("null", prim_null),
    // Machine
    ("print", prim_print),
    ("collect-garbage", prim_collect_garbage),
    ("coin", prim_coin),
];

/// Install every primitive into the global environment of `m`.
pub fn register_all(m: &mut Machine) -> LispResult<()> {
    for &(name, func) in PRIMITIVES {
        m.register_primitive(name, func)?;
    }
    Ok(())
}

fn check_arity(name: &str, args: &[CellId], n: usize) -> LispResult<()> {
    if args.len() != n {
        return Err(LispError::arity(name, n, args.len()));
    }
    Ok(())
}

fn check_arity_at_least(name: &str, args: &[CellId], n: usize) -> LispResult<()> {
    if args.len() < n {
        return Err(LispError::arity_at_least(name, n, args.len()));
    }
    Ok(())
}

fn integer_arg(m: &Machine, name: &str, arg: CellId) -> LispResult<i64> {
    match m.heap.get(arg) {
        Cell::Integer(n) => Ok(*n),
        other => Err(LispError::Type(format!(
            "{}: expected integer, got {}",
            name,
            other.type_name()
        ))),
    }
}

/// Elements of a list argument. `Nil` counts as the empty list.
fn list_arg(m: &Machine, name: &str, arg: CellId) -> LispResult<Vec<CellId>> {
    if arg.is_nil() {
        return Ok(Vec::new());
    }
    Ok(m.heap.list_items(arg, name)?.to_vec())
}

fn boolean(b: bool) -> CellId {
    if b {
        CellId::TRUE
    } else {
        CellId::NIL
    }
}

// ============================================================================
// Arithmetic
// ============================================================================

/// Fold `args` left to right with `op`, starting from `init` when given and
/// from the first argument otherwise.
fn fold_integers(
    m: &mut Machine,
    name: &'static str,
    args: &[CellId],
    init: Option<i64>,
    op: impl Fn(i64, i64) -> LispResult<i64>,
) -> LispResult<CellId> {
    let mut rest = args.iter();
    let mut acc = match init {
        Some(n) => n,
        None => match rest.next() {
            Some(&first) => integer_arg(m, name, first)?,
            None => return Err(LispError::arity_at_least(name, 1, 0)),
        },
    };
    for &arg in rest {
        let n = integer_arg(m, name, arg)?;
        acc = op(acc, n)?;
    }
    m.heap.integer(acc)
}

fn prim_add(m: &mut Machine, args: &[CellId]) -> LispResult<CellId> {
    fold_integers(m, "add", args, Some(0), |a, b| {
        a.checked_add(b).ok_or(LispError::Overflow("add"))
    })
}

fn prim_sub(m: &mut Machine, args: &[CellId]) -> LispResult<CellId> {
    fold_integers(m, "sub", args, None, |a, b| {
        a.checked_sub(b).ok_or(LispError::Overflow("sub"))
    })
}

fn prim_mul(m: &mut Machine, args: &[CellId]) -> LispResult<CellId> {
    fold_integers(m, "mul", args, Some(1), |a, b| {
        a.checked_mul(b).ok_or(LispError::Overflow("mul"))
    })
}

fn prim_div(m: &mut Machine, args: &[CellId]) -> LispResult<CellId> {
    fold_integers(m, "div", args, None, |a, b| {
        if b == 0 {
            return Err(LispError::DivisionByZero);
        }
        a.checked_div(b).ok_or(LispError::Overflow("div"))
    })
}

// ============================================================================
// Lists
// ============================================================================

/// The first element. `Nil` counts as the empty list, which has none.
fn prim_car(m: &mut Machine, args: &[CellId]) -> LispResult<CellId> {
    check_arity("car", args, 1)?;
    let items = list_arg(m, "car", args[0])?;
    items
        .first()
        .copied()
        .ok_or_else(|| LispError::index(0, 0))
}

/// The list without its first element. Lists of length 0 or 1, and `Nil`,
/// give the empty list.
fn prim_cdr(m: &mut Machine, args: &[CellId]) -> LispResult<CellId> {
    check_arity("cdr", args, 1)?;
    let items = list_arg(m, "cdr", args[0])?;
    if items.len() <= 1 {
        return m.heap.list(Vec::new());
    }
    m.heap.rest_from(args[0], 1)
}

fn prim_cons(m: &mut Machine, args: &[CellId]) -> LispResult<CellId> {
    check_arity("cons", args, 2)?;
    let (head, tail) = (args[0], args[1]);
    let mut items = vec![head];
    match m.heap.get(tail) {
        Cell::Nil => {}
        Cell::List(rest) => items.extend_from_slice(rest),
        _ => items.push(tail),
    }
    m.heap.list(items)
}

fn prim_list(m: &mut Machine, args: &[CellId]) -> LispResult<CellId> {
    m.heap.list(args.to_vec())
}

fn prim_length(m: &mut Machine, args: &[CellId]) -> LispResult<CellId> {
    check_arity("length", args, 1)?;
    let len = list_arg(m, "length", args[0])?.len();
    let len = i64::try_from(len).map_err(|_| LispError::Overflow("length"))?;
    m.heap.integer(len)
}

fn prim_nth(m: &mut Machine, args: &[CellId]) -> LispResult<CellId> {
    check_arity("nth", args, 2)?;
    let k = integer_arg(m, "nth", args[1])?;
    let len = list_arg(m, "nth", args[0])?.len();
    let k = usize::try_from(k).map_err(|_| LispError::Index { index: k, len })?;
    if len == 0 {
        return Err(LispError::index(k, 0));
    }
    m.heap.nth(args[0], k)
}

/// A fresh list holding the elements of every argument in order.
fn prim_append(m: &mut Machine, args: &[CellId]) -> LispResult<CellId> {
    let result = m.heap.list(Vec::new())?;
    for &arg in args {
        for item in list_arg(m, "append", arg)? {
            m.heap.append(result, item)?;
        }
    }
    Ok(result)
}

// ============================================================================
// Predicates
// ============================================================================

fn prim_eq(m: &mut Machine, args: &[CellId]) -> LispResult<CellId> {
    check_arity("eq", args, 2)?;
    Ok(boolean(m.heap.equal(args[0], args[1])))
}

fn prim_lt(m: &mut Machine, args: &[CellId]) -> LispResult<CellId> {
    check_arity("lt", args, 2)?;
    let a = integer_arg(m, "lt", args[0])?;
    let b = integer_arg(m, "lt", args[1])?;
    Ok(boolean(a < b))
}

fn prim_gt(m: &mut Machine, args: &[CellId]) -> LispResult<CellId> {
    check_arity("gt", args, 2)?;
    let a = integer_arg(m, "gt", args[0])?;
    let b = integer_arg(m, "gt", args[1])?;
    Ok(boolean(a > b))
}

fn prim_null(m: &mut Machine, args: &[CellId]) -> LispResult<CellId> {
    check_arity("null", args, 1)?;
    Ok(boolean(m.is_false(args[0])))
}

// ============================================================================
// Machine
// ============================================================================

/// Write each argument on its own line and return the last one.
fn prim_print(m: &mut Machine, args: &[CellId]) -> LispResult<CellId> {
    check_arity_at_least("print", args, 1)?;
    for &arg in args {
        let text = printer::print_val(arg, &m.heap);
        m.output.put_str(&text)?;
        m.output.put_char('\n')?;
    }
    Ok(args[args.len() - 1])
}

fn prim_collect_garbage(m: &mut Machine, args: &[CellId]) -> LispResult<CellId> {
    check_arity("collect-garbage", args, 0)?;
    let reclaimed = m.collect_garbage();
    let reclaimed = i64::try_from(reclaimed).map_err(|_| LispError::Overflow("collect-garbage"))?;
    m.heap.integer(reclaimed)
}

fn prim_coin(_m: &mut Machine, args: &[CellId]) -> LispResult<CellId> {
    check_arity("coin", args, 0)?;
    Ok(boolean(rand::thread_rng().gen::<bool>()))
}
