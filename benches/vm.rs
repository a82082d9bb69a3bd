//! VM benchmarks: whole programs, compilation alone, and collector pressure.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::fs;
use std::io;

use cjlang::config::RuntimeConfig;
use cjlang::lexer::{MemoryLoader, SourceMap};
use cjlang::natives;
use cjlang::vm::{Program, Vm};

fn compile(source: &str) -> Program {
    cjlang::compile_source(
        "bench.cj",
        source,
        &MemoryLoader::new(),
        natives::extension("default"),
        &mut SourceMap::new(),
    )
    .expect("compile error")
}

fn run_vm(source: &str, config: RuntimeConfig) {
    let program = compile(source);
    Vm::new(program, config)
        .with_output(io::sink())
        .run_main(&[])
        .expect("vm runtime error");
}

fn load_program(name: &str) -> String {
    let path = format!("benches/programs/{}.cj", name);
    fs::read_to_string(&path).unwrap_or_else(|_| panic!("failed to read {}", path))
}

fn programs(c: &mut Criterion) {
    let mut group = c.benchmark_group("programs");

    for name in ["fib_recursive", "loop_sum", "containers", "objects"] {
        let source = load_program(name);
        group.bench_with_input(BenchmarkId::new("run", name), &source, |b, src| {
            b.iter(|| run_vm(black_box(src), RuntimeConfig::default()))
        });
    }

    group.finish();
}

fn fib_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("fib_scaling");

    for n in [10, 15, 20].iter() {
        let source = format!(
            r#"
function fib(n) {{
    if (n < 2) {{
        return n;
    }}
    return fib(n - 1) + fib(n - 2);
}}
void function main() {{
    result = fib({});
}}
"#,
            n
        );

        group.bench_with_input(BenchmarkId::new("vm", n), &source, |b, src| {
            b.iter(|| run_vm(black_box(src), RuntimeConfig::default()))
        });
    }

    group.finish();
}

/// Compilation time alone (not execution).
fn compilation_overhead(c: &mut Criterion) {
    let mut group = c.benchmark_group("compilation_overhead");

    for name in ["fib_recursive", "objects"] {
        let source = load_program(name);
        group.bench_with_input(BenchmarkId::new("compile", name), &source, |b, src| {
            b.iter(|| compile(black_box(src)))
        });
    }

    group.finish();
}

/// Container churn under different heap block sizes.
fn heap_block_size(c: &mut Criterion) {
    let mut group = c.benchmark_group("heap_block_size");
    let source = load_program("containers");

    for size in [16, 256, 4096] {
        let config = RuntimeConfig {
            heap_block_size: size,
            ..RuntimeConfig::default()
        };
        group.bench_with_input(BenchmarkId::new("containers", size), &config, |b, config| {
            b.iter(|| run_vm(black_box(&source), config.clone()))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    programs,
    fib_scaling,
    compilation_overhead,
    heap_block_size,
);

criterion_main!(benches);
