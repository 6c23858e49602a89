// Collector behaviour observed through the heap's live count.

use cellisp::stream::{InputStream, OutputStream};
use cellisp::{LispError, Machine, MachineConfig};

fn machine_with(config: MachineConfig) -> Machine {
    Machine::with_streams(
        config,
        OutputStream::buffer(1 << 16),
        OutputStream::buffer(1 << 16),
    )
    .unwrap()
}

fn machine() -> Machine {
    machine_with(MachineConfig::default())
}

/// Collect every cell the evaluator could leave behind.
fn settle(m: &mut Machine) -> usize {
    m.collect_garbage();
    m.heap.live_count()
}

#[test]
fn fresh_machine_has_no_garbage() {
    let mut m = machine();
    let before = m.heap.live_count();
    assert_eq!(m.collect_garbage(), 0);
    assert_eq!(m.heap.live_count(), before);
}

#[test]
fn unreachable_results_are_reclaimed() {
    let mut m = machine();
    let baseline = settle(&mut m);
    m.eval_str("(list 1 2 3 (list 4 5))").unwrap();
    assert!(m.heap.live_count() > baseline);
    assert_eq!(settle(&mut m), baseline);
}

#[test]
fn repeated_evaluation_does_not_grow_the_heap() {
    let mut m = machine();
    m.eval_str("(define f (lambda (n) (list n n n)))").unwrap();
    m.eval_str("(f 1)").unwrap();
    let steady = settle(&mut m);
    for _ in 0..100 {
        m.eval_str("(f 1)").unwrap();
        assert_eq!(settle(&mut m), steady);
    }
}

#[test]
fn redefining_a_global_releases_its_old_value() {
    let mut m = machine();
    let baseline = settle(&mut m);

    // 100 nested lists, each holding a number and a string beside the next.
    let nested = format!("{}{}", "(1 \"text\" ".repeat(100), ")".repeat(100));
    m.eval_str(&format!("(define big (quote {}))", nested)).unwrap();
    let with_big = settle(&mut m);
    assert!(with_big >= baseline + 300, "{} < {} + 300", with_big, baseline);

    m.eval_str("(define big nil)").unwrap();
    let after = settle(&mut m);
    assert!(after + 300 <= with_big, "{} + 300 > {}", after, with_big);
    assert_eq!(m.eval_to_string("big").unwrap(), "nil");
}

#[test]
fn bound_values_survive_collection() {
    let mut m = machine();
    m.eval_str("(define keep (quote (a (b \"c\") 4)))").unwrap();
    m.eval_str("(define make (lambda (k) (lambda (x) (add x k))))").unwrap();
    m.eval_str("(define add3 (make 3))").unwrap();
    settle(&mut m);
    settle(&mut m);
    assert_eq!(m.eval_to_string("keep").unwrap(), "(a (b \"c\") 4)");
    assert_eq!(m.eval_to_string("(add3 4)").unwrap(), "7");
}

#[test]
fn explicit_collection_preserves_in_flight_temporaries() {
    let mut m = machine();
    let out = m
        .eval_to_string("(list (list 1 2 3) (begin (collect-garbage) 0) (list 4 5))")
        .unwrap();
    assert_eq!(out, "((1 2 3) 0 (4 5))");
}

#[test]
fn collection_inside_a_procedure_keeps_its_frame() {
    let mut m = machine();
    m.eval_str(
        "(define f (lambda (a b) (begin (collect-garbage) (list a b (cons a b)))))",
    )
    .unwrap();
    assert_eq!(
        m.eval_to_string("(f (list 1 2) (list 3))").unwrap(),
        "((1 2) (3) ((1 2) 3))"
    );
}

#[test]
fn collecting_at_every_safe_point_gives_the_same_answers() {
    let config = MachineConfig {
        gc_threshold: 1,
        ..MachineConfig::default()
    };
    let mut m = machine_with(config);
    let program = "
        (define fact (lambda (n) (if (lt n 2) 1 (mul n (fact (sub n 1))))))
        (define range (lambda (lo hi) (if (lt lo hi) (cons lo (range (add lo 1) hi)) nil)))
        (define sum (lambda (xs) (if (null xs) 0 (add (car xs) (sum (cdr xs))))))
        (define make-adder (lambda (n) (lambda (x) (add x n))))
        (fact 12)
        (range 0 8)
        (sum (range 1 21))
        (define add41 (make-adder 41))
        (add41 1)
        (append (range 0 3) (list \"s\" (quote sym)) (range 3 5))
    ";
    m.run(&mut InputStream::from_text(program)).unwrap();
    assert_eq!(m.errors.contents(), Some(""));
    assert_eq!(
        m.output.contents(),
        Some(
            "#<procedure>\n#<procedure>\n#<procedure>\n#<procedure>\n\
             479001600\n(0 1 2 3 4 5 6 7)\n210\n#<procedure>\n42\n\
             (0 1 2 \"s\" sym 3 4)\n"
        )
    );
    assert!(m.heap.collections() > 10);
}

#[test]
fn garbage_is_reclaimed_automatically() {
    let config = MachineConfig {
        heap_capacity: 2_000,
        gc_threshold: 64,
        ..MachineConfig::default()
    };
    let mut m = machine_with(config);
    // Far more total allocation than the heap can hold at once.
    for i in 0..200 {
        let src = format!("(list {} {} {} (list {} {}))", i, i, i, i, i);
        m.eval_str(&src).unwrap();
    }
    assert!(m.heap.collections() > 0);
}

#[test]
fn large_live_set_with_churn_does_not_exhaust_the_heap() {
    let config = MachineConfig {
        heap_capacity: 20_000,
        gc_threshold: 64,
        ..MachineConfig::default()
    };
    let mut m = machine_with(config);
    let numbers: Vec<String> = (0..15_000).map(|n| n.to_string()).collect();
    m.eval_str(&format!("(define big (quote ({})))", numbers.join(" ")))
        .unwrap();

    for _ in 0..5_000 {
        m.eval_str("(list 1 2 3)").unwrap();
    }
    assert!(m.heap.collections() > 1);
    assert_eq!(m.eval_to_string("(length big)").unwrap(), "15000");
}

#[test]
fn exhausting_the_heap_is_fatal() {
    let config = MachineConfig {
        heap_capacity: machine().heap.live_count() + 20,
        ..MachineConfig::default()
    };
    let mut m = machine_with(config);
    let err = m
        .eval_str("(list 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15 16 17 18 19 20 21 22)")
        .unwrap_err();
    assert!(matches!(err, LispError::HeapExhausted { .. }));
    assert!(err.is_fatal());
}
