//! Performance benchmarks for `asm_flow`.
//!
//! Measures:
//! - Plain statement throughput (KB/s of source text)
//! - Loop replay (`!for`, `!do`)
//! - Macro call overhead
//! - Conditional skipping of large blocks
//! - Nested source inclusion
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use asm_flow::{assemble_str, Assembler, MemoryLoader};

// ─── Plain Statements ───────────────────────────────────────────────────────

fn bench_plain(c: &mut Criterion) {
    let mut group = c.benchmark_group("plain");

    let source: String = (0..1_000)
        .map(|i| format!("lda #{}\nsta $d020\nlabel{i} = {i} * 2\n", i & 0xff))
        .collect();
    group.throughput(Throughput::Bytes(source.len() as u64));
    group.bench_function("1000_lines_with_assignments", |b| {
        b.iter(|| assemble_str(black_box(&source)).unwrap())
    });

    group.finish();
}

// ─── Loops ──────────────────────────────────────────────────────────────────

fn bench_loops(c: &mut Criterion) {
    let mut group = c.benchmark_group("loops");

    group.bench_function("for_1000", |b| {
        b.iter(|| assemble_str(black_box("!for i, 1, 1000 { lda #i\nsta $0400 + i }\n")).unwrap())
    });

    group.bench_function("for_nested_32x32", |b| {
        b.iter(|| {
            assemble_str(black_box(
                "!for y, 0, 31 {\n  !for x, 0, 31 { !if (x + y) & 1 { plot } }\n}\n",
            ))
            .unwrap()
        })
    });

    group.bench_function("do_while_1000", |b| {
        b.iter(|| {
            assemble_str(black_box(
                "!set n = 0\n!do while n < 1000 { !set n = n + 1 : nop }\n",
            ))
            .unwrap()
        })
    });

    group.finish();
}

// ─── Macros ─────────────────────────────────────────────────────────────────

fn bench_macros(c: &mut Criterion) {
    let mut group = c.benchmark_group("macros");

    let mut source = String::from("!macro poke .addr, .val {\n  lda #.val\n  sta .addr\n}\n");
    for i in 0..500 {
        source.push_str(&format!("+poke $d000 + {i}, {}\n", i & 0xff));
    }
    group.throughput(Throughput::Elements(500));
    group.bench_function("500_calls", |b| {
        b.iter(|| assemble_str(black_box(&source)).unwrap())
    });

    group.bench_function("recursive_depth_32", |b| {
        b.iter(|| {
            assemble_str(black_box(
                "!macro down .n { !if .n > 0 { step\n+down .n - 1 } }\n+down 32\n",
            ))
            .unwrap()
        })
    });

    group.finish();
}

// ─── Conditionals ───────────────────────────────────────────────────────────

fn bench_skipping(c: &mut Criterion) {
    let mut group = c.benchmark_group("skipping");

    let body: String = (0..2_000).map(|i| format!("  dead{i} \"}}\" ; {{ }}\n")).collect();
    let source = format!("!if 0 {{\n{body}}} else {{ alive }}\n");
    group.throughput(Throughput::Bytes(source.len() as u64));
    group.bench_function("skip_2000_lines", |b| {
        b.iter(|| assemble_str(black_box(&source)).unwrap())
    });

    group.finish();
}

// ─── Inclusion ──────────────────────────────────────────────────────────────

fn bench_inclusion(c: &mut Criterion) {
    let mut group = c.benchmark_group("inclusion");

    let mut loader = MemoryLoader::new().file("main.a", "!src \"d1.a\"\n");
    for i in 1..32 {
        loader.insert(format!("d{i}.a"), format!("x{i}\n!src \"d{}.a\"\n", i + 1));
    }
    loader.insert("d32.a", "leaf\n");

    group.bench_function("chain_32", |b| {
        b.iter(|| {
            let mut asm = Assembler::new();
            asm.with_loader(loader.clone());
            asm.assemble_file(black_box("main.a")).unwrap()
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_plain,
    bench_loops,
    bench_macros,
    bench_skipping,
    bench_inclusion
);
criterion_main!(benches);
