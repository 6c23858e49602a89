use crate::error::{LispError, LispResult};
use crate::value::{Cell, CellId, Procedure};

/// A single heap slot.
struct Slot {
    cell: Cell,
    live: bool,
    mark: bool,
}

/// The cell heap. Every runtime value is allocated here and addressed by
/// `CellId`, an index into `slots`. Only `sweep` retires slots.
pub struct Heap {
    slots: Vec<Slot>,
    free_list: Vec<CellId>,
    capacity: usize,
    /// Number of allocations since last GC (for triggering).
    allocs_since_gc: usize,
    /// GC threshold: trigger GC when allocs_since_gc reaches this.
    gc_threshold: usize,
    /// Half the free room left by the last sweep. Caps the threshold so a
    /// collection runs before the reclaimable room is used up.
    headroom_limit: usize,
    collections: u64,
}

impl Heap {
    /// Create a heap holding at most `capacity` cells. Slots 0 and 1 are the
    /// `Nil` and `True` singletons and are never reclaimed.
    pub fn new(capacity: usize, gc_threshold: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity.min(1024));
        for cell in [Cell::Nil, Cell::True] {
            slots.push(Slot {
                cell,
                live: true,
                mark: false,
            });
        }
        Heap {
            slots,
            free_list: Vec::new(),
            capacity: capacity.max(2),
            allocs_since_gc: 0,
            gc_threshold: gc_threshold.max(1),
            headroom_limit: (capacity / 2).max(1),
            collections: 0,
        }
    }

    /// Allocate a new cell. Returns Err(HeapExhausted) if capacity is exceeded.
    pub fn alloc(&mut self, cell: Cell) -> LispResult<CellId> {
        self.allocs_since_gc += 1;

        if let Some(id) = self.free_list.pop() {
            let slot = &mut self.slots[id.index()];
            slot.cell = cell;
            slot.live = true;
            slot.mark = false;
            return Ok(id);
        }

        if self.slots.len() >= self.capacity {
            return Err(LispError::HeapExhausted {
                capacity: self.capacity,
            });
        }

        let id = CellId(self.slots.len() as u32);
        self.slots.push(Slot {
            cell,
            live: true,
            mark: false,
        });
        Ok(id)
    }

    pub fn integer(&mut self, n: i64) -> LispResult<CellId> {
        self.alloc(Cell::Integer(n))
    }

    pub fn string(&mut self, s: impl Into<String>) -> LispResult<CellId> {
        self.alloc(Cell::Str(s.into()))
    }

    pub fn symbol(&mut self, name: impl Into<String>) -> LispResult<CellId> {
        self.alloc(Cell::Symbol(name.into()))
    }

    pub fn list(&mut self, items: Vec<CellId>) -> LispResult<CellId> {
        self.alloc(Cell::List(items))
    }

    pub fn procedure(&mut self, proc: Procedure) -> LispResult<CellId> {
        self.alloc(Cell::Procedure(proc))
    }

    #[inline]
    pub fn get(&self, id: CellId) -> &Cell {
        let slot = &self.slots[id.index()];
        debug_assert!(slot.live, "use of reclaimed cell {:?}", id);
        &slot.cell
    }

    #[inline]
    pub fn get_mut(&mut self, id: CellId) -> &mut Cell {
        let slot = &mut self.slots[id.index()];
        debug_assert!(slot.live, "use of reclaimed cell {:?}", id);
        &mut slot.cell
    }

    /// Elements of a `List` cell, or a type error naming `what`.
    pub fn list_items(&self, id: CellId, what: &str) -> LispResult<&[CellId]> {
        match self.get(id) {
            Cell::List(items) => Ok(items),
            other => Err(LispError::Type(format!(
                "{}: expected list, got {}",
                what,
                other.type_name()
            ))),
        }
    }

    // === List accessors ===

    pub fn first(&self, list: CellId) -> LispResult<CellId> {
        self.nth(list, 0)
    }

    pub fn nth(&self, list: CellId, k: usize) -> LispResult<CellId> {
        let items = self.list_items(list, "nth")?;
        items
            .get(k)
            .copied()
            .ok_or_else(|| LispError::index(k, items.len()))
    }

    /// A fresh list holding the elements from index `k` on. `k == len`
    /// yields an empty list; anything past that is an index error.
    pub fn rest_from(&mut self, list: CellId, k: usize) -> LispResult<CellId> {
        let items = self.list_items(list, "rest")?;
        if k > items.len() {
            return Err(LispError::index(k, items.len()));
        }
        let tail = items[k..].to_vec();
        self.list(tail)
    }

    /// Grow a list in place by one element.
    pub fn append(&mut self, list: CellId, element: CellId) -> LispResult<()> {
        match self.get_mut(list) {
            Cell::List(items) => {
                items.push(element);
                Ok(())
            }
            other => Err(LispError::Type(format!(
                "append: expected list, got {}",
                other.type_name()
            ))),
        }
    }

    /// Structural equality: same tag and payload, lists compared element-wise.
    /// Closures compare by identity. Nesting depth is unbounded; pairs still
    /// to compare are kept on a worklist.
    pub fn equal(&self, a: CellId, b: CellId) -> bool {
        let mut pending = vec![(a, b)];
        while let Some((a, b)) = pending.pop() {
            if a == b {
                continue;
            }
            let same = match (self.get(a), self.get(b)) {
                (Cell::Nil, Cell::Nil) | (Cell::True, Cell::True) => true,
                (Cell::Integer(x), Cell::Integer(y)) => x == y,
                (Cell::Str(x), Cell::Str(y)) | (Cell::Symbol(x), Cell::Symbol(y)) => x == y,
                (Cell::List(xs), Cell::List(ys)) if xs.len() == ys.len() => {
                    pending.extend(xs.iter().copied().zip(ys.iter().copied()));
                    true
                }
                (Cell::Primitive(p), Cell::Primitive(q)) => p.name == q.name,
                _ => false,
            };
            if !same {
                return false;
            }
        }
        true
    }

    // === Statistics ===

    /// Total slots ever handed out, including free-listed ones.
    pub fn total_slots(&self) -> usize {
        self.slots.len()
    }

    pub fn free_count(&self) -> usize {
        self.free_list.len()
    }

    /// Cells currently allocated, singletons included.
    pub fn live_count(&self) -> usize {
        self.slots.len() - self.free_list.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn collections(&self) -> u64 {
        self.collections
    }

    /// Allocations allowed before the next collection.
    pub fn gc_threshold(&self) -> usize {
        self.gc_threshold.min(self.headroom_limit)
    }

    /// Returns true if we should trigger a GC cycle.
    pub fn should_gc(&self) -> bool {
        self.allocs_since_gc >= self.gc_threshold()
    }

    pub fn reset_gc_counter(&mut self) {
        self.allocs_since_gc = 0;
    }

    /// Adjust GC threshold based on occupancy and the room left after a sweep.
    pub fn adjust_gc_threshold(&mut self) {
        let live = self.live_count();
        let total = self.total_slots();
        if total > 0 {
            let occupancy = live as f64 / total as f64;
            if occupancy > 0.75 {
                // High occupancy: double the threshold to avoid thrashing
                self.gc_threshold = (self.gc_threshold * 2).min(self.capacity);
            }
        }
        self.headroom_limit = (self.capacity.saturating_sub(live) / 2).max(1);
    }

    // === GC methods ===

    pub fn clear_marks(&mut self) {
        for slot in &mut self.slots {
            slot.mark = false;
        }
    }

    pub fn is_marked(&self, id: CellId) -> bool {
        self.slots[id.index()].mark
    }

    /// Mark a cell as reachable and queue it for scanning.
    pub fn mark_value(&mut self, id: CellId, worklist: &mut Vec<CellId>) {
        let slot = &mut self.slots[id.index()];
        if !slot.mark {
            slot.mark = true;
            worklist.push(id);
        }
    }

    /// Process the mark worklist: lists mark their elements, procedures their
    /// parameters, body and captured environment. Everything else is a leaf.
    pub fn process_worklist(&mut self, worklist: &mut Vec<CellId>) {
        let mut children = Vec::new();
        while let Some(id) = worklist.pop() {
            match &self.slots[id.index()].cell {
                Cell::List(items) => children.extend_from_slice(items),
                Cell::Procedure(p) => children.extend([p.params, p.body, p.env]),
                Cell::Nil
                | Cell::True
                | Cell::Str(_)
                | Cell::Symbol(_)
                | Cell::Integer(_)
                | Cell::Primitive(_) => {}
            }
            for child in children.drain(..) {
                self.mark_value(child, worklist);
            }
        }
    }

    /// Reclaim every live, unmarked slot and return how many were freed.
    /// Marks are cleared for the next cycle.
    pub fn sweep(&mut self) -> usize {
        let mut reclaimed = 0;
        for i in 2..self.slots.len() {
            let slot = &mut self.slots[i];
            if slot.live && !slot.mark {
                // Drop the owned payload now rather than on reuse.
                slot.cell = Cell::Nil;
                slot.live = false;
                self.free_list.push(CellId(i as u32));
                reclaimed += 1;
            }
            slot.mark = false;
        }
        self.slots[0].mark = false;
        self.slots[1].mark = false;
        self.collections += 1;
        reclaimed
    }
}
