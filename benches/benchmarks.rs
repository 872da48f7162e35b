use std::io::Write;

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use tempfile::NamedTempFile;

use awk_vm::{compile, Compiler, Interpreter, Lexer, Program};

/// Run a compiled program once; returns the output size so nothing is
/// optimized away
fn execute(program: &Program, input: &[u8]) -> usize {
    let mut interpreter = Interpreter::new(program);
    let mut output = Vec::new();
    interpreter.run(input, &mut output).unwrap();
    output.len()
}

/// `lines` log-like records: level, numeric id, latency and a message
fn log_lines(lines: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for i in 0..lines {
        let level = match i % 50 {
            0 => "start",
            25 => "stop",
            n if n % 7 == 0 => "error",
            _ => "info",
        };
        writeln!(out, "{} {} {} request {} handled", level, i, i % 97, i % 13).unwrap();
    }
    out
}

/// `lines` records with mixed `,` and `;` separators
fn csv_lines(lines: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for i in 0..lines {
        writeln!(out, "{},{}; {},name{};{} ,x", i, i * 2, i % 10, i, i % 3).unwrap();
    }
    out
}

const REPORT: &str = r#"
    function pct(part, whole) { return whole ? 100 * part / whole : 0 }
    BEGIN { FS = " "; split("info error start stop", names) }
    $1 == "error" { errors[$4]++; bad++ }
    /^start/, /^stop/ { in_window++ }
    { total++; latency += $3; if ($3 > max) max = $3 }
    END {
        for (k in errors) printf "%s %d %.1f%%\n", k, errors[k], pct(errors[k], bad)
        printf "total %d window %d mean %.2f max %d\n", total, in_window, latency / total, max
    }
"#;

// ============ Front end ============

fn bench_front_end(c: &mut Criterion) {
    let mut group = c.benchmark_group("front_end");

    group.bench_function("scan_report", |b| {
        b.iter(|| Lexer::new(black_box(REPORT)).tokenize().unwrap())
    });

    let tokens = Lexer::new(REPORT).tokenize().unwrap();
    group.bench_function("compile_report", |b| {
        b.iter(|| Compiler::new(black_box(tokens.clone())).compile().unwrap())
    });

    group.finish();
}

// ============ Record processing ============

fn bench_records(c: &mut Criterion) {
    let mut group = c.benchmark_group("records");

    let cases = [
        ("range_pattern", "/^start/, /^stop/ { n++ } END { print n }"),
        ("field_assign_rebuild", "{ $3 = $2 + $3; $6 = \"x\"; NF = 4; n += length($0) } END { print n }"),
        ("report", REPORT),
    ];
    for lines in [1_000, 10_000] {
        let input = log_lines(lines);
        group.throughput(Throughput::Bytes(input.len() as u64));
        for (name, source) in cases {
            let program = compile(source).unwrap();
            group.bench_with_input(BenchmarkId::new(name, lines), &input, |b, input| {
                b.iter(|| execute(&program, black_box(input)))
            });
        }
    }

    let program = compile(r#"BEGIN { FS = "[,;] *" } { fields += NF; sum += $2 } END { print fields, sum }"#).unwrap();
    for lines in [1_000, 10_000] {
        let input = csv_lines(lines);
        group.throughput(Throughput::Bytes(input.len() as u64));
        group.bench_with_input(BenchmarkId::new("regex_fs_split", lines), &input, |b, input| {
            b.iter(|| execute(&program, black_box(input)))
        });
    }

    group.finish();
}

// ============ Arrays ============

fn bench_arrays(c: &mut Criterion) {
    let mut group = c.benchmark_group("arrays");

    // A sliding window keeps the array small while slots churn; doubling n
    // should double the time
    let churn = compile("BEGIN { for (i = 0; i < n; i++) { q[i] = i; delete q[i - 8] } print length(q) }").unwrap();
    for n in [20_000, 40_000, 80_000] {
        group.throughput(Throughput::Elements(n));
        group.bench_with_input(BenchmarkId::new("insert_delete_churn", n), &n, |b, &n| {
            b.iter(|| {
                let mut interpreter = Interpreter::new(&churn);
                interpreter.set_variable("n", &n.to_string()).unwrap();
                let mut output = Vec::new();
                interpreter.run(std::io::empty(), &mut output).unwrap();
                output.len()
            })
        });
    }

    let drain = compile("BEGIN { for (i = 0; i < 20000; i++) a[i]; for (k in a) { delete a[k]; n++ } print n }").unwrap();
    group.bench_function("for_in_drain", |b| b.iter(|| execute(&drain, b"")));

    let grouped = compile("{ count[$1, $4]++ } END { for (k in count) n++; print n }").unwrap();
    let input = log_lines(10_000);
    group.bench_function("subsep_counting", |b| b.iter(|| execute(&grouped, black_box(&input))));

    group.finish();
}

// ============ getline ============

fn bench_getline(c: &mut Criterion) {
    let mut group = c.benchmark_group("getline");

    let input = log_lines(10_000);
    group.throughput(Throughput::Bytes(input.len() as u64));

    let main_input = compile("BEGIN { while ((getline line) > 0) n += length(line); print n }").unwrap();
    group.bench_function("main_input_var", |b| b.iter(|| execute(&main_input, black_box(&input))));

    let mut file = NamedTempFile::new().unwrap();
    file.write_all(&input).unwrap();
    let path = file.path().to_str().unwrap().to_string();
    let from_file = compile("BEGIN { while ((getline < path) > 0) n += NF; close(path); print n }").unwrap();
    group.bench_function("file_record", |b| {
        b.iter(|| {
            let mut interpreter = Interpreter::new(&from_file);
            interpreter.set_variable("path", &path).unwrap();
            let mut output = Vec::new();
            interpreter.run(std::io::empty(), &mut output).unwrap();
            output.len()
        })
    });

    group.finish();
}

// ============ Function calls ============

fn bench_calls(c: &mut Criterion) {
    let mut group = c.benchmark_group("calls");

    let fib = compile("function fib(n) { return n < 2 ? n : fib(n - 1) + fib(n - 2) } BEGIN { print fib(20) }").unwrap();
    group.bench_function("recursive_fib", |b| b.iter(|| execute(&fib, b"")));

    let by_ref = compile(
        "function fill(a, n, i) { for (i = 0; i < n; i++) a[i] = i } BEGIN { for (r = 0; r < 100; r++) { fill(t, 100); delete t } }",
    )
    .unwrap();
    group.bench_function("array_argument", |b| b.iter(|| execute(&by_ref, b"")));

    group.finish();
}

criterion_group!(benches, bench_front_end, bench_records, bench_arrays, bench_getline, bench_calls);
criterion_main!(benches);
