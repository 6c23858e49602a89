//! Environments are ordinary heap cells so the collector traces them like any
//! other list.
//!
//! Layout: a `List` whose element 0 is the parent environment (`Nil` for the
//! global environment) and whose remaining elements are binding pairs, each a
//! 2-element `List` of `(symbol value)`. Bindings are appended, and lookup
//! scans a frame newest-first before moving on to the parent.

use crate::error::{LispError, LispResult};
use crate::heap::Heap;
use crate::value::{Cell, CellId};

/// Create an empty environment frame under `parent`.
pub fn new_env(heap: &mut Heap, parent: CellId) -> LispResult<CellId> {
    heap.list(vec![parent])
}

/// Append a `(symbol value)` pair to `env` and return `value`. Existing
/// bindings of the same name are not checked; the new one shadows them.
pub fn extend(heap: &mut Heap, env: CellId, symbol: CellId, value: CellId) -> LispResult<CellId> {
    let pair = heap.list(vec![symbol, value])?;
    heap.append(env, pair)?;
    Ok(value)
}

/// Value bound to `name`, or `None` when the name is unbound.
pub fn lookup(heap: &Heap, env: CellId, name: &str) -> LispResult<Option<CellId>> {
    match find_binding(heap, env, name)? {
        Some(pair) => binding_value(heap, pair).map(Some),
        None => Ok(None),
    }
}

/// Overwrite the value slot of the nearest existing binding of `name`.
/// Returns `None` when the name is unbound.
pub fn set_existing(
    heap: &mut Heap,
    env: CellId,
    name: &str,
    value: CellId,
) -> LispResult<Option<CellId>> {
    let Some(pair) = find_binding(heap, env, name)? else {
        return Ok(None);
    };
    match heap.get_mut(pair) {
        Cell::List(slots) if slots.len() == 2 => {
            slots[1] = value;
            Ok(Some(value))
        }
        _ => Err(malformed("binding")),
    }
}

/// Like `set_existing`, but only looks at the bindings of `env` itself, not
/// its parents.
pub fn set_in_frame(
    heap: &mut Heap,
    env: CellId,
    name: &str,
    value: CellId,
) -> LispResult<Option<CellId>> {
    let Some(pair) = find_in_frame(heap, env, name)? else {
        return Ok(None);
    };
    match heap.get_mut(pair) {
        Cell::List(slots) if slots.len() == 2 => {
            slots[1] = value;
            Ok(Some(value))
        }
        _ => Err(malformed("binding")),
    }
}

/// Names bound directly in `env`, oldest first.
pub fn frame_names(heap: &Heap, env: CellId) -> LispResult<Vec<String>> {
    let (_, bindings) = frame(heap, env)?;
    let mut names = Vec::with_capacity(bindings.len());
    for &pair in bindings {
        let (symbol, _) = binding_parts(heap, pair)?;
        if let Some(name) = heap.get(symbol).as_symbol() {
            names.push(name.to_string());
        }
    }
    Ok(names)
}

fn find_binding(heap: &Heap, env: CellId, name: &str) -> LispResult<Option<CellId>> {
    let mut current = env;
    while !current.is_nil() {
        if let Some(pair) = find_in_frame(heap, current, name)? {
            return Ok(Some(pair));
        }
        current = frame(heap, current)?.0;
    }
    Ok(None)
}

fn find_in_frame(heap: &Heap, env: CellId, name: &str) -> LispResult<Option<CellId>> {
    let (_, bindings) = frame(heap, env)?;
    for &pair in bindings.iter().rev() {
        let (symbol, _) = binding_parts(heap, pair)?;
        if heap.get(symbol).as_symbol() == Some(name) {
            return Ok(Some(pair));
        }
    }
    Ok(None)
}

/// Split an environment into its parent and its binding pairs.
fn frame(heap: &Heap, env: CellId) -> LispResult<(CellId, &[CellId])> {
    match heap.get(env) {
        Cell::List(items) if !items.is_empty() => Ok((items[0], &items[1..])),
        _ => Err(malformed("environment")),
    }
}

fn binding_parts(heap: &Heap, pair: CellId) -> LispResult<(CellId, CellId)> {
    match heap.get(pair) {
        Cell::List(slots) if slots.len() == 2 => Ok((slots[0], slots[1])),
        _ => Err(malformed("binding")),
    }
}

fn binding_value(heap: &Heap, pair: CellId) -> LispResult<CellId> {
    binding_parts(heap, pair).map(|(_, value)| value)
}

fn malformed(what: &str) -> LispError {
    LispError::Internal(format!("malformed {}", what))
}
