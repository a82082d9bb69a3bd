//! End-to-end tests: tokenize, compile and run whole programs.

use std::io::Cursor;

use pretty_assertions::assert_eq;

use crate::config::{CompilerLimits, RuntimeConfig};
use crate::error::{CjError, RuntimeError};
use crate::lexer::{tokenize, MemoryLoader};
use crate::natives;

use super::{compile, Program, SharedBuffer, Vm};

fn build(source: &str, loader: &MemoryLoader) -> Program {
    let stream = tokenize("test.cj", source, loader).expect("tokenize");
    let natives = natives::global_functions(natives::extension("default"));
    compile(stream, &natives, CompilerLimits::default()).expect("compile")
}

fn start(source: &str, config: RuntimeConfig) -> (Vm, SharedBuffer) {
    let output = SharedBuffer::new();
    let vm = Vm::new(build(source, &MemoryLoader::new()), config).with_output(output.clone());
    (vm, output)
}

fn run(source: &str) -> String {
    let (mut vm, output) = start(source, RuntimeConfig::default());
    vm.run_main(&[]).expect("run");
    output.contents()
}

fn run_err(source: &str) -> CjError {
    let (mut vm, _) = start(source, RuntimeConfig::default());
    vm.run_main(&[]).expect_err("program should fail")
}

fn runtime_error(source: &str) -> RuntimeError {
    match run_err(source) {
        CjError::Runtime { error, .. } => error,
        other => panic!("expected runtime error, got {other}"),
    }
}

#[test]
fn test_prelinked_call() {
    let out = run("function add(a, b) { return a + b; } function main() { println(add(2, 3)); }");
    assert_eq!(out, "5\n");
}

#[test]
fn test_counter_instance() {
    let out = run(
        "class Counter { void init() { self.n = 0; } void inc() { self.n += 1; } }
         function main() { c = new Counter(); c.inc(); c.inc(); println(c.n); }",
    );
    assert_eq!(out, "2\n");
}

#[test]
fn test_inherited_methods_and_overrides() {
    let out = run(
        "class Base {
             void init(n) { self.n = n; }
             describe() { return self.n * 10; }
             void hello() { println(\"base\"); }
         }
         class Child(Base) {
             void init(n) { pInit(n + 1); }
             void hello() { println(\"child\"); }
         }
         function main() { c = new Child(1); c.hello(); println(c.describe()); }",
    );
    assert_eq!(out, "child\n20\n");
}

#[test]
fn test_parent_init_follows_the_executing_class() {
    let out = run(
        "class A { void init() { self.trail = [1]; } }
         class B(A) { void init() { pInit(); self.trail.add(2); } }
         class C(B) { void init() { pInit(); self.trail.add(3); } }
         function main() { c = new C(); println(c.trail); }",
    );
    assert_eq!(out, "[1, 2, 3]\n");
}

#[test]
fn test_operator_overloads_and_custom_print() {
    let out = run(
        "class Vec {
             void init(x) { self.x = x; }
             _add(other) { return new Vec(self.x + other.x); }
             _less(other) { return self.x < other.x; }
             void print() { print(\"Vec(\", self.x, \")\"); }
         }
         function main() {
             a = new Vec(1); b = new Vec(2);
             c = a + b;
             println(c, \" \", a < b, \" \", b > a);
         }",
    );
    assert_eq!(out, "Vec(3) true true\n");
}

#[test]
fn test_missing_operator() {
    let err = runtime_error("function main() { x = 1 + none; }");
    assert!(matches!(err, RuntimeError::NoOperator(_)));
}

#[test]
fn test_number_formatting() {
    let out = run("function main() { println(7 / 2, \" \", 10 % 3, \" \", 2 ^ 10, \" \", -4); }");
    assert_eq!(out, "3.5000000000 1 1024 -4\n");
}

#[test]
fn test_folded_and_runtime_arithmetic_agree() {
    let folded = run("function main() { println(2 + 3 * 4 - 10 / 4); }");
    let dynamic = run("function main() { a = 2; b = 3; c = 4; d = 10; println(a + b * c - d / c); }");
    assert_eq!(folded, dynamic);
    assert_eq!(folded, "11.5000000000\n");
}

#[test]
fn test_nested_loops_break_and_continue_independently() {
    let out = run(
        "function main() {
             total = 0;
             n = 0;
             while (n < 4) {
                 n += 1;
                 if (n == 2) { continue; }
                 for (i = 0; i < 10; i += 1) {
                     if (i == 1) { continue; }
                     if (i == 3) { break; }
                     total += i * 10;
                 }
                 if (n == 4) { break; }
                 total += n;
             }
             println(total);
         }",
    );
    assert_eq!(out, "64\n");
}

#[test]
fn test_loops_break_and_continue() {
    let out = run(
        "function main() {
             total = 0;
             for (i = 0; i < 10; i += 1) {
                 if (i % 2 == 1) { continue; }
                 if (i > 6) { break; }
                 total += i;
             }
             n = 0;
             while (n < 5) { n += 1; }
             println(total, \" \", n);
         }",
    );
    assert_eq!(out, "12 5\n");
}

#[test]
fn test_elif_chain() {
    let out = run(
        "function grade(x) {
             if (x > 8) { return \"a\"; } elif (x > 5) { return \"b\"; } else { return \"c\"; }
         }
         function main() { println(grade(9), grade(6), grade(1)); }",
    );
    assert_eq!(out, "abc\n");
}

#[test]
fn test_globals_shared_between_functions() {
    let out = run(
        "void function setup() { global g; g = 5; }
         function read() { return g; }
         function shadow() { y = g; g = 7; return y; }
         function main() { setup(); println(read(), \" \", shadow()); }",
    );
    assert_eq!(out, "5 5\n");
}

#[test]
fn test_list_operations() {
    let out = run(
        "function main() {
             x = [1, 2];
             x.add(3);
             x.insert(0, 0);
             x[1] = 10;
             x[2] += 5;
             x.remove(3);
             println(x, \" \", x.size(), \" \", x.contains(10), \" \", x.index(7), \" \", x[0]);
         }",
    );
    assert_eq!(out, "[0, 10, 7] 3 true 2 0\n");
}

#[test]
fn test_list_index_out_of_range() {
    let err = runtime_error("function main() { x = [1]; y = x[5]; }");
    assert!(matches!(err, RuntimeError::IndexOutOfRange { length: 1, .. }));
}

#[test]
fn test_dict_and_set_operations() {
    let out = run(
        "function main() {
             d = d{\"k\": 1};
             d.add(\"j\", 2);
             d.remove(\"k\");
             s = s{1, 2, 2};
             s.add(3);
             s.remove(1);
             println(d, \" \", d.get(\"j\"), \" \", d.contains(\"k\"), \" \", s, \" \", s.size());
         }",
    );
    assert_eq!(out, "d{j:2} 2 false s{2, 3} 2\n");
}

#[test]
fn test_missing_dict_key() {
    let err = runtime_error("function main() { d = d{}; y = d.get(1); }");
    assert!(matches!(err, RuntimeError::KeyNotFound));
}

#[test]
fn test_user_keys_use_hash_string_and_eq() {
    let out = run(
        "class Key {
             void init(k) { self.k = k; }
             hashString() { return self.k; }
             _eq(other) { return self.k == other.k; }
         }
         function main() {
             d = d{};
             a = new Key(1);
             b = new Key(1);
             d.add(a, \"one\");
             println(d.get(b), \" \", d.size());
         }",
    );
    assert_eq!(out, "one 1\n");
}

#[test]
fn test_key_without_hash_string() {
    let err = runtime_error(
        "class Plain { void init() {} }
         function main() { s = s{}; p = new Plain(); s.add(p); }",
    );
    assert!(matches!(err, RuntimeError::Hash(_)));
}

#[test]
fn test_printing_builtins_and_callables() {
    let out = run(
        "function f() { return 1; }
         function main() { println(none, \" \", true, \" \", type(1), \" \", type(\"s\"), \" \", f); }",
    );
    assert_eq!(out, "None true num str Function object\n");
}

#[test]
fn test_is_compares_identity() {
    let out = run(
        "function main() { a = [1]; b = [1]; c = a; println(a is c, \" \", a is b, \" \", 1 is 1); }",
    );
    assert_eq!(out, "true false true\n");
}

#[test]
fn test_arity_checked_through_function_values() {
    let err = runtime_error(
        "function add(a, b) { return a + b; } function main() { f = add; x = (f)(1); }",
    );
    assert!(matches!(err, RuntimeError::WrongArity { expected: 2, got: 1 }));
}

#[test]
fn test_variadic_accepts_any_count() {
    let out = run("function main() { println(); println(1); println(1, 2, 3); }");
    assert_eq!(out, "\n1\n123\n");
}

#[test]
fn test_void_result_used_as_value() {
    let err = runtime_error("void function nothing() {} function main() { f = nothing; x = (f)(); }");
    assert!(matches!(err, RuntimeError::NoOutput));
}

#[test]
fn test_setting_attribute_on_builtin() {
    let err = runtime_error("function main() { x = [1]; x.size = 3; }");
    assert!(matches!(err, RuntimeError::TypeError(_)));
}

#[test]
fn test_traceback_lists_active_calls() {
    let err = run_err(
        "function boom(x) { return x.missing; }
         function middle() { return boom(1); }
         function main() { y = middle(); }",
    );
    let CjError::Runtime { error, traceback } = err else {
        panic!("expected runtime error");
    };
    assert!(matches!(error, RuntimeError::AttributeNotFound(_)));
    let names: Vec<&str> = traceback.frames.iter().map(|f| f.callable.as_str()).collect();
    assert_eq!(names, vec!["boom", "middle", "main"]);
    assert_eq!(traceback.frames[0].span.line, 1);
    assert_eq!(traceback.frames[2].span.line, 3);
}

#[test]
fn test_unbounded_recursion_overflows() {
    let err = runtime_error("function down(n) { return down(n + 1); } function main() { x = down(0); }");
    assert!(matches!(err, RuntimeError::StackOverflow(_)));
}

#[test]
fn test_recursion() {
    let out = run(
        "function fib(n) { if (n < 2) { return n; } return fib(n - 1) + fib(n - 2); }
         function main() { println(fib(15)); }",
    );
    assert_eq!(out, "610\n");
}

#[test]
fn test_stack_is_balanced_after_run() {
    let (mut vm, _) = start(
        "function f(a) { return a; }
         void function g() { f(1); l = [1, 2]; l.size(); }
         function main() { i = 0; while (i < 50) { g(); x = f(i); i += 1; } }",
        RuntimeConfig::default(),
    );
    vm.run_main(&[]).unwrap();
    assert_eq!(vm.stack_len(), 0);
}

#[test]
fn test_main_receives_arguments() {
    let (mut vm, output) = start("function main(inArgs) { println(inArgs, \" \", inArgs.size()); }", RuntimeConfig::default());
    vm.run_main(&["a".to_string(), "b".to_string()]).unwrap();
    assert_eq!(output.contents(), "[a, b] 2\n");
}

#[test]
fn test_input_reads_one_line() {
    let output = SharedBuffer::new();
    let program = build(
        "function main() { name = input(\"name? \"); println(\"hi \", name); }",
        &MemoryLoader::new(),
    );
    let mut vm = Vm::new(program, RuntimeConfig::default())
        .with_output(output.clone())
        .with_input(Cursor::new("bob\nignored\n"));
    vm.run_main(&[]).unwrap();
    assert_eq!(output.contents(), "name? hi bob\n");
}

#[test]
fn test_included_functions() {
    let loader = MemoryLoader::new()
        .with_file("math", "function twice(x) { return x * 2; }")
        .with_file("text", "include math function shout() { return twice(21); }");
    let program = build("include text function main() { println(shout()); }", &loader);
    let output = SharedBuffer::new();
    let mut vm = Vm::new(program, RuntimeConfig::default()).with_output(output.clone());
    vm.run_main(&[]).unwrap();
    assert_eq!(output.contents(), "42\n");
}

#[test]
fn test_extension_function() {
    let out = run("function main() { p = C_CalculatePi(100000); println(p > 3.14 and p < 3.15); }");
    assert_eq!(out, "true\n");
}

#[test]
fn test_collection_keeps_reachable_objects() {
    let config = RuntimeConfig {
        heap_block_size: 4,
        gc_stress: true,
        ..RuntimeConfig::default()
    };
    let (mut vm, output) = start(
        "function main() {
             keep = d{\"k\": [1, [2, 3]]};
             i = 0;
             while (i < 200) { junk = [i, s{i}]; i += 1; }
             println(keep);
         }",
        config,
    );
    vm.run_main(&[]).unwrap();
    assert_eq!(output.contents(), "d{k:[1, [2, 3]]}\n");
    assert!(vm.heap().capacity() < 64);
    assert!(vm.heap().collections() > 200);
}

#[test]
fn test_collection_reclaims_before_growing() {
    let config = RuntimeConfig {
        heap_block_size: 8,
        ..RuntimeConfig::default()
    };
    let (mut vm, _) = start(
        "function main() { i = 0; while (i < 500) { junk = [i]; i += 1; } }",
        config,
    );
    vm.run_main(&[]).unwrap();
    assert!(vm.heap().collections() > 0);
    assert!(vm.heap().capacity() < 64);

    vm.collect_garbage();
    assert_eq!(vm.heap().live_objects(), 0);
}

#[test]
fn test_globals_are_roots() {
    let config = RuntimeConfig {
        heap_block_size: 2,
        gc_stress: true,
        ..RuntimeConfig::default()
    };
    let (mut vm, output) = start(
        "void function fill() { global saved; saved = [\"x\", \"y\"]; }
         function main() { fill(); i = 0; while (i < 20) { t = [i]; i += 1; } println(saved); }",
        config,
    );
    vm.run_main(&[]).unwrap();
    assert_eq!(output.contents(), "[x, y]\n");
    vm.collect_garbage();
    assert!(vm.global("saved").is_some());
    assert_eq!(vm.heap().live_objects(), 1);
}
