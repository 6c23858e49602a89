use std::io::{self, IsTerminal};

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::error;
use tracing_subscriber::EnvFilter;

use cellisp::config::MachineConfig;
use cellisp::error::LispError;
use cellisp::eval::Machine;
use cellisp::stream::InputStream;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    let mut load_files: Vec<String> = Vec::new();
    let mut gc_stats = false;
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--load" => {
                if i + 1 < args.len() {
                    load_files.push(args[i + 1].clone());
                    i += 2;
                } else {
                    eprintln!("--load requires a file path");
                    std::process::exit(1);
                }
            }
            "--gc-stats" => {
                gc_stats = true;
                i += 1;
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                eprintln!("Try 'cellisp --help' for usage information.");
                std::process::exit(1);
            }
        }
    }

    let mut machine = match Machine::new(MachineConfig::from_env()) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("Failed to initialize machine: {}", e);
            std::process::exit(1);
        }
    };

    for path in &load_files {
        if let Err(e) = load_file(&mut machine, path) {
            exit_fatal(&machine, gc_stats, path, e);
        }
    }

    let result = if io::stdin().is_terminal() {
        run_interactive(&mut machine)
    } else {
        machine.run(&mut InputStream::stdin())
    };
    if let Err(e) = result {
        exit_fatal(&machine, gc_stats, "<stdin>", e);
    }

    if gc_stats {
        report_gc_stats(&machine);
    }
}

fn print_usage() {
    println!("Usage: cellisp [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --load <file>    Evaluate a source file before reading standard input");
    println!("  --gc-stats       Print heap and collector statistics on exit");
    println!("  --help, -h       Show this help message");
    println!();
    println!("Environment variables:");
    println!("  CELLISP_HEAP_CAPACITY   Maximum number of live cells");
    println!("  CELLISP_GC_THRESHOLD    Allocations between collections");
    println!("  CELLISP_MAX_DEPTH       Maximum evaluation depth");
    println!("  CELLISP_MAX_TOKEN       Longest symbol or string, in bytes");
    println!("  RUST_LOG                Log filter, e.g. cellisp=debug");
}

fn load_file(machine: &mut Machine, path: &str) -> Result<(), LispError> {
    let mut input = InputStream::open(path)?;
    machine.run(&mut input)
}

fn exit_fatal(machine: &Machine, gc_stats: bool, source: &str, e: LispError) -> ! {
    error!(source, error = %e, "fatal error");
    eprintln!("fatal: {}: {}", source, e);
    if gc_stats {
        report_gc_stats(machine);
    }
    std::process::exit(1);
}

fn report_gc_stats(machine: &Machine) {
    let heap = &machine.heap;
    eprintln!(
        "heap: {} live, {} free, {} slots, capacity {}, {} collections",
        heap.live_count(),
        heap.free_count(),
        heap.total_slots(),
        heap.capacity(),
        heap.collections()
    );
}

/// Interactive REPL: accumulate lines until parens are balanced, then
/// evaluate everything entered.
fn run_interactive(machine: &mut Machine) -> Result<(), LispError> {
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => {
            eprintln!("Could not initialize line editor: {}", e);
            return machine.run(&mut InputStream::stdin());
        }
    };

    println!("cellisp");
    println!("  Heap: {} cells used", machine.heap.live_count());
    println!("Ready.\n");

    let mut buf = String::new();
    let mut depth: i64 = 0;
    loop {
        let prompt = if depth == 0 { "> " } else { "  " };
        match editor.readline(prompt) {
            Ok(line) => {
                depth += paren_balance(&line);
                buf.push_str(&line);
                buf.push('\n');
            }
            Err(ReadlineError::Interrupted) => {
                buf.clear();
                depth = 0;
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Read error: {}", e);
                break;
            }
        }

        if depth <= 0 {
            depth = 0;
            let input = std::mem::take(&mut buf);
            if input.trim().is_empty() {
                continue;
            }
            let _ = editor.add_history_entry(input.trim());
            machine.run(&mut InputStream::from_text(&input))?;
        }
    }
    Ok(())
}

/// Opening minus closing parens in `line`, skipping strings, comments and
/// escaped characters.
fn paren_balance(line: &str) -> i64 {
    let mut balance = 0;
    let mut in_string = false;
    let mut chars = line.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                chars.next();
            }
            '"' => in_string = !in_string,
            ';' if !in_string => break,
            '(' if !in_string => balance += 1,
            ')' if !in_string => balance -= 1,
            _ => {}
        }
    }
    balance
}
