// End-to-end evaluation through the public Machine API.

use cellisp::stream::{InputStream, OutputStream};
use cellisp::{LispError, LispResult, Machine, MachineConfig};

fn machine() -> Machine {
    Machine::with_streams(
        MachineConfig::default(),
        OutputStream::buffer(1 << 16),
        OutputStream::buffer(1 << 16),
    )
    .unwrap()
}

fn eval(m: &mut Machine, src: &str) -> LispResult<String> {
    m.eval_to_string(src)
}

/// Run a whole program through the top-level loop and return (output, errors).
fn run_program(src: &str) -> (String, String) {
    let mut m = machine();
    m.run(&mut InputStream::from_text(src)).unwrap();
    let out = m.output.take_contents().unwrap();
    let err = m.errors.take_contents().unwrap();
    (out, err)
}

// ============================================================================
// Top-level loop
// ============================================================================

#[test]
fn top_level_prints_each_result() {
    let (out, err) = run_program(
        "; a comment\n\
         (define sq (lambda (x) (mul x x)))\n\
         (sq 12)\n\
         (quote (a \"b\" 3))\n\
         ()",
    );
    assert_eq!(out, "#<procedure>\n144\n(a \"b\" 3)\nnil\n");
    assert_eq!(err, "");
}

#[test]
fn errors_do_not_stop_the_loop() {
    let (out, err) = run_program("(car (quote ())) (undefined 1) (1 2) (add 1 2)");
    assert_eq!(out, "3\n");
    assert_eq!(err.lines().count(), 3, "{}", err);
    assert!(err.contains("index 0 out of range"), "{}", err);
    assert!(err.contains("unbound symbol 'undefined'"), "{}", err);
    assert!(err.contains("cannot apply 1"), "{}", err);
}

#[test]
fn parse_error_is_reported_with_position() {
    let (out, err) = run_program("(add 1 2)\n(add 1 \"oops");
    assert_eq!(out, "3\n");
    assert!(err.contains("parse error at 2:8: unterminated string"), "{}", err);
}

#[test]
fn malformed_form_is_discarded_whole() {
    let mut m = machine();
    let program = "(begin \"bad \\n escape\" (define launched 1))\n\
                   (define (nested (deeper \\q)) (define also 2))\n\
                   (add 1 2)";
    m.run(&mut InputStream::from_text(program)).unwrap();
    assert_eq!(m.output.contents(), Some("3\n"));
    let errors = m.errors.take_contents().unwrap();
    assert_eq!(errors.lines().count(), 2, "{}", errors);
    assert!(errors.contains("invalid escape '\\n' in string"), "{}", errors);
    assert!(errors.contains("invalid escape '\\q' in symbol"), "{}", errors);
    assert_eq!(
        eval(&mut m, "launched").unwrap_err(),
        LispError::Unbound("launched".into())
    );
    assert_eq!(
        eval(&mut m, "also").unwrap_err(),
        LispError::Unbound("also".into())
    );
}

#[test]
fn unterminated_list_at_end_of_input() {
    let (out, err) = run_program("(list 1 (list 2");
    assert_eq!(out, "");
    assert!(err.contains("unterminated list"), "{}", err);
}

#[test]
fn empty_input_does_nothing() {
    let (out, err) = run_program("   ; only a comment\n");
    assert_eq!(out, "");
    assert_eq!(err, "");
}

#[test]
fn output_buffer_overflow_is_recoverable() {
    let mut m = Machine::with_streams(
        MachineConfig::default(),
        OutputStream::buffer(8),
        OutputStream::buffer(1 << 12),
    )
    .unwrap();
    m.run(&mut InputStream::from_text("\"a long string value\" 1"))
        .unwrap();
    assert_eq!(m.output.contents(), Some("1\n"));
    assert!(m.errors.contents().unwrap().contains("output buffer limit"));
}

// ============================================================================
// Language
// ============================================================================

#[test]
fn truthiness() {
    let mut m = machine();
    assert_eq!(eval(&mut m, "(if nil 1 2)").unwrap(), "2");
    assert_eq!(eval(&mut m, "(if () 1 2)").unwrap(), "2");
    assert_eq!(eval(&mut m, "(if (quote ()) 1 2)").unwrap(), "2");
    assert_eq!(eval(&mut m, "(if 0 1 2)").unwrap(), "1");
    assert_eq!(eval(&mut m, "(if \"\" 1 2)").unwrap(), "1");
    assert_eq!(eval(&mut m, "(if (quote (nil)) 1 2)").unwrap(), "1");
}

#[test]
fn higher_order_procedures() {
    let mut m = machine();
    eval(
        &mut m,
        "(define map (lambda (f xs) \
           (if (null xs) nil (cons (f (car xs)) (map f (cdr xs))))))",
    )
    .unwrap();
    eval(&mut m, "(define double (lambda (x) (add x x)))").unwrap();
    assert_eq!(eval(&mut m, "(map double (list 1 2 3))").unwrap(), "(2 4 6)");
}

#[test]
fn counter_closure_keeps_private_state() {
    let mut m = machine();
    eval(
        &mut m,
        "(define make-counter (lambda (n) (lambda () (begin (set! n (add n 1)) n))))",
    )
    .unwrap();
    eval(&mut m, "(define c1 (make-counter 0))").unwrap();
    eval(&mut m, "(define c2 (make-counter 10))").unwrap();
    assert_eq!(eval(&mut m, "(c1)").unwrap(), "1");
    assert_eq!(eval(&mut m, "(c1)").unwrap(), "2");
    assert_eq!(eval(&mut m, "(c2)").unwrap(), "11");
}

#[test]
fn define_inside_procedure_is_global() {
    let mut m = machine();
    eval(&mut m, "(define setup (lambda (v) (define shared v)))").unwrap();
    eval(&mut m, "(setup 9)").unwrap();
    assert_eq!(eval(&mut m, "shared").unwrap(), "9");
}

#[test]
fn arguments_are_evaluated_left_to_right() {
    let mut m = machine();
    eval(&mut m, "(print 1 2 3)").unwrap();
    eval(&mut m, "(list (print 4) (print 5))").unwrap();
    assert_eq!(m.output.contents(), Some("1\n2\n3\n4\n5\n"));
}

#[test]
fn primitives_can_be_rebound() {
    let mut m = machine();
    eval(&mut m, "(define add (lambda (a b) (sub a b)))").unwrap();
    assert_eq!(eval(&mut m, "(add 5 3)").unwrap(), "2");
    assert_eq!(eval(&mut m, "(+ 5 3)").unwrap(), "8");
}

#[test]
fn register_primitive_extends_the_language() {
    fn answer(m: &mut Machine, args: &[cellisp::CellId]) -> LispResult<cellisp::CellId> {
        if !args.is_empty() {
            return Err(LispError::arity("answer", 0, args.len()));
        }
        m.heap.integer(42)
    }

    let mut m = machine();
    m.register_primitive("answer", answer).unwrap();
    assert_eq!(eval(&mut m, "(add (answer) 1)").unwrap(), "43");
    assert_eq!(eval(&mut m, "answer").unwrap(), "#<primitive answer>");
}

#[test]
fn deep_data_is_fine_but_deep_evaluation_is_bounded() {
    let config = MachineConfig {
        max_eval_depth: 40,
        ..MachineConfig::default()
    };
    let mut m = Machine::with_streams(
        config,
        OutputStream::buffer(1 << 16),
        OutputStream::buffer(1 << 16),
    )
    .unwrap();
    eval(
        &mut m,
        "(define count (lambda (n) (if (lt n 1) 0 (add 1 (count (sub n 1))))))",
    )
    .unwrap();
    assert_eq!(eval(&mut m, "(count 3)").unwrap(), "3");
    assert_eq!(
        eval(&mut m, "(count 100)").unwrap_err(),
        LispError::DepthExceeded(40)
    );
    // The machine is still usable.
    assert_eq!(eval(&mut m, "(count 2)").unwrap(), "2");
}

#[test]
fn eq_on_deep_runtime_structures() {
    let mut m = machine();
    eval(&mut m, "(define x 0) (define y 0) (define z 1)").unwrap();
    m.eval_str(&"(set! x (list x)) (set! y (list y)) (set! z (list z)) ".repeat(50_000))
        .unwrap();
    assert_eq!(eval(&mut m, "(eq x y)").unwrap(), "t");
    assert_eq!(eval(&mut m, "(eq x z)").unwrap(), "nil");
}

#[test]
fn machines_are_independent() {
    let mut a = machine();
    let mut b = machine();
    eval(&mut a, "(define x 1)").unwrap();
    assert_eq!(eval(&mut a, "x").unwrap(), "1");
    assert_eq!(
        eval(&mut b, "x").unwrap_err(),
        LispError::Unbound("x".into())
    );
}
