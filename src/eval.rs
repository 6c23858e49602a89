use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::config::MachineConfig;
use crate::env;
use crate::error::{LispError, LispResult};
use crate::heap::Heap;
use crate::primitives;
use crate::printer;
use crate::reader::Reader;
use crate::stream::{InputStream, OutputStream};
use crate::value::{Cell, CellId, NativeFn, Primitive, Procedure};

/// Syntactic forms handled by the evaluator itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialForm {
    Quote,
    If,
    Begin,
    Set,
    Define,
    Lambda,
}

/// The special-form dispatch table. A list head matching one of these names
/// is never evaluated as a call.
const SPECIAL_FORMS: &[(&str, SpecialForm)] = &[
    ("quote", SpecialForm::Quote),
    ("if", SpecialForm::If),
    ("begin", SpecialForm::Begin),
    ("set!", SpecialForm::Set),
    ("define", SpecialForm::Define),
    ("lambda", SpecialForm::Lambda),
];

impl SpecialForm {
    pub fn lookup(name: &str) -> Option<Self> {
        SPECIAL_FORMS
            .iter()
            .find(|(form_name, _)| *form_name == name)
            .map(|&(_, form)| form)
    }

    pub fn name(self) -> &'static str {
        SPECIAL_FORMS
            .iter()
            .find(|&&(_, form)| form == self)
            .map_or("?", |&(name, _)| name)
    }
}

/// One interpreter instance. All interpreter state lives here so GC can
/// find roots; separate machines share nothing.
pub struct Machine {
    pub heap: Heap,
    /// The global environment.
    pub global: CellId,
    pub config: MachineConfig,
    /// Where results and `print` output go.
    pub output: OutputStream,
    /// Where recoverable errors are reported.
    pub errors: OutputStream,

    /// Cells referenced only from in-flight evaluation: expressions,
    /// environments, callees and evaluated arguments.
    roots: Vec<CellId>,
    /// Current nesting of `evaluate`.
    depth: usize,
    /// Ctrl+C interrupt flag.
    interrupted: Arc<AtomicBool>,
}

impl Machine {
    /// A machine writing to stdout and stderr, with every primitive installed.
    pub fn new(config: MachineConfig) -> LispResult<Self> {
        Self::with_streams(config, OutputStream::stdout(), OutputStream::stderr())
    }

    pub fn with_streams(
        config: MachineConfig,
        output: OutputStream,
        errors: OutputStream,
    ) -> LispResult<Self> {
        let mut heap = Heap::new(config.heap_capacity, config.gc_threshold);
        let global = env::new_env(&mut heap, CellId::NIL)?;

        let mut m = Machine {
            heap,
            global,
            config,
            output,
            errors,
            roots: Vec::new(),
            depth: 0,
            interrupted: Arc::new(AtomicBool::new(false)),
        };

        m.define_global("nil", CellId::NIL)?;
        m.define_global("t", CellId::TRUE)?;
        primitives::register_all(&mut m)?;
        Ok(m)
    }

    /// Bind a name in the global environment with a fresh symbol cell.
    pub fn define_global(&mut self, name: &str, value: CellId) -> LispResult<CellId> {
        let symbol = self.heap.symbol(name)?;
        env::extend(&mut self.heap, self.global, symbol, value)
    }

    /// Install a native function under `name` in the global environment.
    pub fn register_primitive(&mut self, name: &str, func: NativeFn) -> LispResult<CellId> {
        let prim = self.heap.alloc(Cell::Primitive(Primitive {
            name: name.to_string(),
            func,
        }))?;
        self.define_global(name, prim)
    }

    /// Get the interrupt flag for use with a Ctrl+C handler.
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        self.interrupted.clone()
    }

    /// Current nesting of `evaluate`; zero between top-level terms.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Number of cells held by in-flight evaluation.
    pub fn root_count(&self) -> usize {
        self.roots.len()
    }

    // ========================================================================
    // Reading and the top-level loop
    // ========================================================================

    /// Read one term from `input`. Returns None at end of input.
    pub fn read_term(&mut self, input: &mut InputStream) -> LispResult<Option<CellId>> {
        let limits = self.config.read_limits();
        Reader::new(input, &mut self.heap, limits).read_term()
    }

    /// Read, evaluate and print every term in `input`. Recoverable errors
    /// are reported to `errors` and the loop continues; a fatal error stops
    /// it and is returned.
    pub fn run(&mut self, input: &mut InputStream) -> LispResult<()> {
        loop {
            self.maybe_collect();

            let term = match self.read_term(input) {
                Ok(Some(term)) => term,
                Ok(None) => break,
                Err(e) => {
                    self.recover(e)?;
                    continue;
                }
            };

            let shown = self.eval(term).and_then(|val| self.emit(val));
            if let Err(e) = shown {
                self.recover(e)?;
            }
        }
        self.output.flush()
    }

    /// Evaluate every term in `source` and return the last value, or `Nil`
    /// for empty input. The result is not rooted: it stays valid until the
    /// next evaluation may collect.
    pub fn eval_str(&mut self, source: &str) -> LispResult<CellId> {
        let mut input = InputStream::from_text(source);
        let mut last = CellId::NIL;
        while let Some(term) = self.read_term(&mut input)? {
            last = self.eval(term)?;
        }
        Ok(last)
    }

    /// `eval_str`, then print the result.
    pub fn eval_to_string(&mut self, source: &str) -> LispResult<String> {
        let val = self.eval_str(source)?;
        Ok(self.print(val))
    }

    pub fn print(&self, val: CellId) -> String {
        printer::print_val(val, &self.heap)
    }

    fn emit(&mut self, val: CellId) -> LispResult<()> {
        let text = printer::print_val(val, &self.heap);
        self.output.put_str(&text)?;
        self.output.put_char('\n')
    }

    /// Report a recoverable error, or hand a fatal one back to the caller.
    fn recover(&mut self, e: LispError) -> LispResult<()> {
        if e.is_fatal() {
            return Err(e);
        }
        warn!(error = %e, "recoverable error");
        self.errors.put_str(&format!("error: {}\n", e))?;
        self.errors.flush()
    }

    // ========================================================================
    // Garbage collection
    // ========================================================================

    /// Run a full mark-and-sweep collection and return the number of cells
    /// reclaimed. Roots are the singletons, the global environment and every
    /// cell on the evaluation root stack.
    pub fn collect_garbage(&mut self) -> usize {
        self.heap.clear_marks();
        let mut worklist = Vec::new();

        self.heap.mark_value(CellId::NIL, &mut worklist);
        self.heap.mark_value(CellId::TRUE, &mut worklist);
        self.heap.mark_value(self.global, &mut worklist);
        for &root in &self.roots {
            self.heap.mark_value(root, &mut worklist);
        }

        self.heap.process_worklist(&mut worklist);

        let reclaimed = self.heap.sweep();
        self.heap.reset_gc_counter();
        self.heap.adjust_gc_threshold();
        debug!(
            reclaimed,
            live = self.heap.live_count(),
            roots = self.roots.len(),
            threshold = self.heap.gc_threshold(),
            "garbage collection"
        );
        reclaimed
    }

    fn maybe_collect(&mut self) {
        if self.heap.should_gc() {
            self.collect_garbage();
        }
    }

    // ========================================================================
    // Core evaluation entry point
    // ========================================================================

    /// Evaluate an expression in the global environment.
    pub fn eval(&mut self, expr: CellId) -> LispResult<CellId> {
        let global = self.global;
        self.evaluate(expr, global)
    }

    /// Evaluate `expr` in `env`. `expr` and `env` are rooted for the whole
    /// call, so a collection at any nested safe point sees them.
    pub fn evaluate(&mut self, expr: CellId, env: CellId) -> LispResult<CellId> {
        if self.interrupted.swap(false, Ordering::Relaxed) {
            return Err(LispError::Interrupted);
        }
        if self.depth >= self.config.max_eval_depth {
            return Err(LispError::DepthExceeded(self.config.max_eval_depth));
        }

        let base = self.roots.len();
        self.roots.push(expr);
        self.roots.push(env);
        self.maybe_collect();

        self.depth += 1;
        let result = self.eval_cell(expr, env);
        self.depth -= 1;
        self.roots.truncate(base);
        result
    }

    fn eval_cell(&mut self, expr: CellId, env: CellId) -> LispResult<CellId> {
        match self.heap.get(expr) {
            Cell::Nil
            | Cell::True
            | Cell::Integer(_)
            | Cell::Str(_)
            | Cell::Primitive(_)
            | Cell::Procedure(_) => Ok(expr),
            Cell::Symbol(name) => env::lookup(&self.heap, env, name)?
                .ok_or_else(|| LispError::Unbound(name.clone())),
            Cell::List(items) if items.is_empty() => Ok(CellId::NIL),
            Cell::List(items) => {
                let items = items.to_vec();
                let form = match self.heap.get(items[0]) {
                    Cell::Symbol(name) => SpecialForm::lookup(name),
                    _ => return Err(LispError::CannotApply(self.print(items[0]))),
                };
                match form {
                    Some(form) => self.eval_special(form, &items, env),
                    None => self.eval_call(&items, env),
                }
            }
        }
    }

    // ========================================================================
    // Special forms
    // ========================================================================

    fn eval_special(
        &mut self,
        form: SpecialForm,
        items: &[CellId],
        env: CellId,
    ) -> LispResult<CellId> {
        trace!(form = form.name(), "special form");
        match form {
            SpecialForm::Quote => {
                expect_operands(form, items, 1)?;
                Ok(items[1])
            }
            SpecialForm::If => {
                expect_operands(form, items, 3)?;
                let test = self.evaluate(items[1], env)?;
                if self.is_false(test) {
                    self.evaluate(items[3], env)
                } else {
                    self.evaluate(items[2], env)
                }
            }
            SpecialForm::Begin => self.eval_sequence(&items[1..], env),
            SpecialForm::Set => {
                expect_operands(form, items, 2)?;
                let name = self.symbol_name(items[1], form)?;
                let value = self.evaluate(items[2], env)?;
                env::set_existing(&mut self.heap, env, &name, value)?
                    .ok_or(LispError::Unbound(name))
            }
            SpecialForm::Define => {
                expect_operands(form, items, 2)?;
                let name = self.symbol_name(items[1], form)?;
                let value = self.evaluate(items[2], env)?;
                // Redefinition replaces the old global binding so the old
                // value becomes unreachable.
                let global = self.global;
                match env::set_in_frame(&mut self.heap, global, &name, value)? {
                    Some(value) => Ok(value),
                    None => env::extend(&mut self.heap, global, items[1], value),
                }
            }
            SpecialForm::Lambda => {
                if items.len() < 3 {
                    return Err(LispError::arity_at_least(form.name(), 2, items.len() - 1));
                }
                let params = items[1];
                self.check_params(params)?;
                let body = self.heap.list(items[2..].to_vec())?;
                self.heap.procedure(Procedure { params, body, env })
            }
        }
    }

    /// Evaluate forms left to right and return the last value (`Nil` if none).
    fn eval_sequence(&mut self, forms: &[CellId], env: CellId) -> LispResult<CellId> {
        let mut last = CellId::NIL;
        for &form in forms {
            last = self.evaluate(form, env)?;
        }
        Ok(last)
    }

    /// Only `Nil` and the empty list are false.
    pub fn is_false(&self, val: CellId) -> bool {
        val.is_nil() || matches!(self.heap.get(val), Cell::List(items) if items.is_empty())
    }

    fn symbol_name(&self, id: CellId, form: SpecialForm) -> LispResult<String> {
        match self.heap.get(id) {
            Cell::Symbol(name) => Ok(name.clone()),
            other => Err(LispError::Type(format!(
                "{}: expected symbol, got {}",
                form.name(),
                other.type_name()
            ))),
        }
    }

    fn check_params(&self, params: CellId) -> LispResult<()> {
        let items = self.heap.list_items(params, "lambda parameters")?;
        for &param in items {
            if !matches!(self.heap.get(param), Cell::Symbol(_)) {
                return Err(LispError::Type(format!(
                    "lambda: parameter {} is not a symbol",
                    self.print(param)
                )));
            }
        }
        Ok(())
    }

    // ========================================================================
    // Calls
    // ========================================================================

    /// Evaluate the head and every argument left to right, keeping each
    /// result rooted, then apply.
    fn eval_call(&mut self, items: &[CellId], env: CellId) -> LispResult<CellId> {
        let base = self.roots.len();
        let result = self.eval_call_rooted(items, env, base);
        self.roots.truncate(base);
        result
    }

    fn eval_call_rooted(
        &mut self,
        items: &[CellId],
        env: CellId,
        base: usize,
    ) -> LispResult<CellId> {
        let callee = self.evaluate(items[0], env)?;
        self.roots.push(callee);
        for &arg in &items[1..] {
            let val = self.evaluate(arg, env)?;
            self.roots.push(val);
        }
        let args = self.roots[base + 1..].to_vec();
        self.apply(callee, &args)
    }

    /// Apply a primitive or procedure to evaluated arguments. The caller must
    /// keep `callee` and `args` reachable.
    pub fn apply(&mut self, callee: CellId, args: &[CellId]) -> LispResult<CellId> {
        match self.heap.get(callee) {
            Cell::Primitive(prim) => {
                trace!(primitive = %prim.name, nargs = args.len(), "apply");
                let func = prim.func;
                func(self, args)
            }
            Cell::Procedure(proc) => {
                let proc = *proc;
                self.apply_procedure(proc, args)
            }
            _ => Err(LispError::CannotApply(self.print(callee))),
        }
    }

    fn apply_procedure(&mut self, proc: Procedure, args: &[CellId]) -> LispResult<CellId> {
        let params = self.heap.list_items(proc.params, "lambda parameters")?.to_vec();
        if params.len() != args.len() {
            return Err(LispError::arity("procedure", params.len(), args.len()));
        }
        trace!(nargs = args.len(), "apply procedure");

        let base = self.roots.len();
        let frame = env::new_env(&mut self.heap, proc.env)?;
        self.roots.push(frame);
        let result = self.run_body(proc, &params, args, frame);
        self.roots.truncate(base);
        result
    }

    fn run_body(
        &mut self,
        proc: Procedure,
        params: &[CellId],
        args: &[CellId],
        frame: CellId,
    ) -> LispResult<CellId> {
        for (&param, &arg) in params.iter().zip(args) {
            env::extend(&mut self.heap, frame, param, arg)?;
        }
        let body = self.heap.list_items(proc.body, "procedure body")?.to_vec();
        self.eval_sequence(&body, frame)
    }
}

/// Check that a special form has exactly `n` operands after its name.
fn expect_operands(form: SpecialForm, items: &[CellId], n: usize) -> LispResult<()> {
    if items.len() != n + 1 {
        return Err(LispError::arity(form.name(), n, items.len() - 1));
    }
    Ok(())
}
