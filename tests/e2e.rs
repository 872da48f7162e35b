//! End-to-end tests for awk-vm
//!
//! These tests compile complete AWK programs and run them on the virtual
//! machine, checking the output against expected results.

use std::fs;
use std::io::Write;

use awk_vm::{compile, Encoding, Interpreter};
use tempfile::{NamedTempFile, TempDir};

/// Run an AWK program with the given input and return the output
fn run_awk(program: &str, input: &str) -> Result<String, String> {
    run_awk_with_args(program, input, &[])
}

/// Run an AWK program with ARGV operands after the program name
fn run_awk_with_args(program: &str, input: &str, args: &[&str]) -> Result<String, String> {
    let program = compile(program).map_err(|e| e.to_string())?;

    let mut interpreter = Interpreter::new(&program);
    let mut argv = vec!["awk-vm".to_string()];
    argv.extend(args.iter().map(|a| a.to_string()));
    interpreter.set_args(argv);

    let mut output = Vec::new();
    interpreter
        .run(input.as_bytes(), &mut output)
        .map_err(|e| e.to_string())?;

    String::from_utf8(output).map_err(|e| e.to_string())
}

/// Run an AWK program with a custom field separator
fn run_awk_with_fs(program: &str, input: &str, fs: &str) -> Result<String, String> {
    let program = compile(program).map_err(|e| e.to_string())?;

    let mut interpreter = Interpreter::new(&program);
    interpreter.set_fs(fs);
    let mut output = Vec::new();
    interpreter
        .run(input.as_bytes(), &mut output)
        .map_err(|e| e.to_string())?;

    String::from_utf8(output).map_err(|e| e.to_string())
}

/// Run an AWK program and return its exit status
fn run_status(program: &str, input: &str) -> i32 {
    let program = compile(program).unwrap();
    let mut interpreter = Interpreter::new(&program);
    interpreter.run(input.as_bytes(), &mut Vec::new()).unwrap()
}

/// Run an AWK program over raw input bytes, returning raw output bytes
fn run_awk_bytes(program: &str, input: &[u8], encoding: Encoding) -> Result<Vec<u8>, String> {
    let source = encoding.widen(program);
    let program = compile(&source).map_err(|e| e.to_string())?;

    let mut interpreter = Interpreter::new(&program);
    interpreter.set_encoding(encoding);
    let mut output = Vec::new();
    interpreter.run(input, &mut output).map_err(|e| e.to_string())?;
    Ok(output)
}

fn sorted_lines(output: &str) -> Vec<&str> {
    let mut lines: Vec<&str> = output.lines().collect();
    lines.sort_unstable();
    lines
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_scenario_default_splitting() {
    let output = run_awk("{ print $2, NF }", " a  b c ").unwrap();
    assert_eq!(output, "b 3\n");
}

#[test]
fn test_scenario_field_assignment_rebuilds() {
    let output = run_awk(r#"BEGIN{FS=","} {$2="X"; print}"#, "a,b,c").unwrap();
    assert_eq!(output, "a X c\n");
}

#[test]
fn test_scenario_counting() {
    let output = run_awk("{ a[$1]++ } END { for (k in a) print k, a[k] }", "x\ny\nx\n").unwrap();
    assert_eq!(sorted_lines(&output), ["x 2", "y 1"]);
}

#[test]
fn test_negative_zero_prints_sign() {
    let output = run_awk(r#"BEGIN { print -0; x = 0; print -x, -x "" ; print 0 }"#, "").unwrap();
    assert_eq!(output, "-0\n-0 -0\n0\n");
}

#[test]
fn test_scenario_division_output() {
    let output = run_awk("BEGIN{ print 1/3 }", "").unwrap();
    assert_eq!(output, "0.333333\n");
}

#[test]
fn test_scenario_range_rearms() {
    let input = "a\nstart 1\nb\nstop 1\nc\nstart 2\nstop 2\nd\n";
    let output = run_awk("/start/,/stop/{print}", input).unwrap();
    assert_eq!(output, "start 1\nb\nstop 1\nstart 2\nstop 2\n");
}

// ============================================================================
// Basic Output Tests
// ============================================================================

#[test]
fn test_hello_world() {
    let output = run_awk(r#"BEGIN { print "Hello, World!" }"#, "").unwrap();
    assert_eq!(output, "Hello, World!\n");
}

#[test]
fn test_print_numbers() {
    let output = run_awk("BEGIN { print 42, 3.14159, 1e6, 2^53, 0.1 + 0.2 }", "").unwrap();
    assert_eq!(output, "42 3.14159 1000000 9007199254740992 0.3\n");
}

#[test]
fn test_print_uses_ofmt_conversion_uses_convfmt() {
    let output = run_awk(
        r#"BEGIN { OFMT = "%.2f"; CONVFMT = "%.3f"; x = 3.14159; print x; print x "" }"#,
        "",
    )
    .unwrap();
    assert_eq!(output, "3.14\n3.142\n");
}

#[test]
fn test_output_separators() {
    let output = run_awk(r#"BEGIN { OFS = "-"; ORS = "|" } { print $1, $2 }"#, "a b\nc d\n").unwrap();
    assert_eq!(output, "a-b|c-d|");
}

#[test]
fn test_print_concatenation_and_grouping() {
    let output = run_awk(r#"BEGIN { print "a" 1 + 2 "b"; print ("x" > "y") }"#, "").unwrap();
    assert_eq!(output, "a3b\n0\n");
}

#[test]
fn test_print_bare_prints_record() {
    let output = run_awk("{ print }", "one two\n").unwrap();
    assert_eq!(output, "one two\n");
}

#[test]
fn test_pattern_without_action() {
    let output = run_awk("$1 > 1", "1\n2\n3\n").unwrap();
    assert_eq!(output, "2\n3\n");
}

// ============================================================================
// Field Tests
// ============================================================================

#[test]
fn test_field_separator_colon() {
    let output = run_awk_with_fs("{ print $1 }", "root:x:0:0:root:/root:/bin/bash", ":").unwrap();
    assert_eq!(output, "root\n");
}

#[test]
fn test_regex_field_separator() {
    let output = run_awk_with_fs("{ print $2 }", "a1b22c", "[0-9]+").unwrap();
    assert_eq!(output, "b\n");
}

#[test]
fn test_tab_field_separator() {
    let output = run_awk(r#"BEGIN { FS = "\t" } { print $2 }"#, "a b\tc d\n").unwrap();
    assert_eq!(output, "c d\n");
}

#[test]
fn test_last_field_and_past_nf() {
    let output = run_awk(r#"{ print $NF; print "[" $(NF + 2) "]"; print NF }"#, "a b c").unwrap();
    assert_eq!(output, "c\n[]\n3\n");
}

#[test]
fn test_assigning_past_nf_grows_record() {
    let output = run_awk(r#"BEGIN { OFS = ":" } { $5 = "e"; print; print NF }"#, "a b").unwrap();
    assert_eq!(output, "a:b:::e\n5\n");
}

#[test]
fn test_assigning_nf_truncates() {
    let output = run_awk("{ NF = 2; print; NF = 4; print; print NF }", "a b c d e").unwrap();
    assert_eq!(output, "a b\na b  \n4\n");
}

#[test]
fn test_padding_fields_compare_as_uninitialized() {
    let output = run_awk(r#"{ $5 = "e"; print ($3 == 0), ($3 == ""), length($4); NF = 7; print ($7 == 0) }"#, "a b").unwrap();
    assert_eq!(output, "1 1 0\n1\n");
}

#[test]
fn test_assigning_record_resplits() {
    let output = run_awk(r#"{ $0 = "x y z w"; print NF, $3 }"#, "a").unwrap();
    assert_eq!(output, "4 z\n");
}

#[test]
fn test_modified_fields_resplit_identically() {
    let output = run_awk(
        r#"{ $2 = "new"; n = NF; line = $0; $0 = line; print (n == NF), ($2 == "new"), $0 }"#,
        "one two three",
    )
    .unwrap();
    assert_eq!(output, "1 1 one new three\n");
}

#[test]
fn test_paragraph_mode() {
    let input = "a b\nc\n\n\nd e\nf\n";
    let output = run_awk(r#"BEGIN { RS = "" } { print NR ": " $1 "," $NF "," NF }"#, input).unwrap();
    assert_eq!(output, "1: a,c,3\n2: d,f,3\n");
}

#[test]
fn test_single_char_record_separator() {
    let output = run_awk(r#"BEGIN { RS = ";" } { print NR, $0 }"#, "a;b;c").unwrap();
    assert_eq!(output, "1 a\n2 b\n3 c\n");
}

#[test]
fn test_regex_record_separator() {
    let output = run_awk(r#"BEGIN { RS = "[0-9]+" } { print $0 }"#, "a1b22c").unwrap();
    assert_eq!(output, "a\nb\nc\n");
}

// ============================================================================
// Arithmetic and Comparison Tests
// ============================================================================

#[test]
fn test_arithmetic_precedence() {
    let output = run_awk("BEGIN { print 2 + 3 * 4, (2 + 3) * 4, 2 ^ 3 ^ 2, -2 ^ 2, 7 % 3, -7 % 3 }", "").unwrap();
    assert_eq!(output, "14 20 512 -4 1 -1\n");
}

#[test]
fn test_increment_and_assignment_operators() {
    let output = run_awk(
        "BEGIN { x = 5; y = x++; z = ++x; x += 2; x *= 3; x -= 1; x /= 2; x %= 7; x ^= 2; print x, y, z }",
        "",
    )
    .unwrap();
    // x: 7 -> 9 -> 27 -> 26 -> 13 -> 6 -> 36
    assert_eq!(output, "36 5 7\n");
}

#[test]
fn test_string_and_numeric_comparison() {
    let output = run_awk(r#"{ print ($1 < $2), ("10" < "9"), (10 < 9) }"#, "10 9").unwrap();
    assert_eq!(output, "0 1 0\n");
}

#[test]
fn test_numeric_string_equality() {
    let output = run_awk(r#"{ print ($1 == 3), ($1 == "3"), ("3.0" == 3) }"#, "3.0").unwrap();
    assert_eq!(output, "1 0 0\n");
}

#[test]
fn test_uninitialized_values() {
    let output = run_awk(r#"BEGIN { print x + 0, "[" x "]", (x == 0), (x == "") }"#, "").unwrap();
    assert_eq!(output, "0 [] 1 1\n");
}

#[test]
fn test_string_to_number_coercion() {
    let output = run_awk(r#"BEGIN { print "3abc" + 4, "abc" * 2, " 12 " + 1, ".5" + 0 }"#, "").unwrap();
    assert_eq!(output, "7 0 13 0.5\n");
}

#[test]
fn test_logical_operators_short_circuit() {
    let output = run_awk("BEGIN { x = 0; if (0 && x++) print \"no\"; if (1 || x++) print x; print !x, !!5 }", "").unwrap();
    assert_eq!(output, "0\n1 1\n");
}

#[test]
fn test_ternary_and_in() {
    let output = run_awk(
        r#"BEGIN { a["k"]; r1 = ("k" in a) ? "yes" : "no"; r2 = ("z" in a) ? "yes" : "no"; print r1, r2 }"#,
        "",
    )
    .unwrap();
    assert_eq!(output, "yes no\n");
}

#[test]
fn test_large_integers_print_exactly() {
    let output = run_awk("BEGIN { print 2^31, 2^53 + 1, 1e16 }", "").unwrap();
    assert_eq!(output, "2147483648 9007199254740992 1e+16\n");
}

// ============================================================================
// Control Flow Tests
// ============================================================================

#[test]
fn test_while_do_and_for() {
    let output = run_awk(
        "BEGIN { i = 0; while (i < 3) i++; do { i-- } while (i > 1); for (j = 0; j < 3; j++) s = s j; print i, s }",
        "",
    )
    .unwrap();
    assert_eq!(output, "1 012\n");
}

#[test]
fn test_break_and_continue() {
    let output = run_awk(
        "BEGIN { for (i = 0; i < 10; i++) { if (i == 2) continue; if (i == 5) break; s = s i }; print s }",
        "",
    )
    .unwrap();
    assert_eq!(output, "0134\n");
}

#[test]
fn test_nested_loops_break_inner_only() {
    let output = run_awk(
        "BEGIN { for (i = 0; i < 3; i++) for (j = 0; j < 3; j++) { if (j == 1) break; n++ }; print n }",
        "",
    )
    .unwrap();
    assert_eq!(output, "3\n");
}

#[test]
fn test_if_else_chain() {
    let output = run_awk(
        r#"{ if ($1 < 0) print "neg"; else if ($1 == 0) print "zero"; else print "pos" }"#,
        "-1\n0\n5\n",
    )
    .unwrap();
    assert_eq!(output, "neg\nzero\npos\n");
}

#[test]
fn test_next_skips_remaining_rules() {
    let output = run_awk("/skip/ { next } { print }", "a\nskip me\nb\n").unwrap();
    assert_eq!(output, "a\nb\n");
}

#[test]
fn test_exit_runs_end() {
    let output = run_awk(r#"{ print; exit } END { print "end" }"#, "a\nb\n").unwrap();
    assert_eq!(output, "a\nend\n");
}

#[test]
fn test_exit_in_begin_skips_input_but_runs_end() {
    let output = run_awk(r#"BEGIN { exit 3 } { print "main" } END { print "end" }"#, "a\n").unwrap();
    assert_eq!(output, "end\n");
}

#[test]
fn test_exit_status() {
    assert_eq!(run_status("BEGIN { exit 3 }", ""), 3);
    assert_eq!(run_status("BEGIN { exit 1 } END { exit }", ""), 1);
    assert_eq!(run_status("BEGIN { exit 1 } END { exit 4 }", ""), 4);
    assert_eq!(run_status("BEGIN { exit -1 }", ""), 255);
    assert_eq!(run_status("{ }", "a\n"), 0);
}

#[test]
fn test_nextfile() {
    let mut first = NamedTempFile::new().unwrap();
    writeln!(first, "a1\na2").unwrap();
    let mut second = NamedTempFile::new().unwrap();
    writeln!(second, "b1\nb2").unwrap();
    let paths = [first.path().to_str().unwrap(), second.path().to_str().unwrap()];

    let output = run_awk_with_args("{ print; nextfile }", "", &paths).unwrap();
    assert_eq!(output, "a1\nb1\n");
}

// ============================================================================
// Pattern Tests
// ============================================================================

#[test]
fn test_regex_pattern() {
    let output = run_awk("/^a/", "apple\nbanana\navocado\n").unwrap();
    assert_eq!(output, "apple\navocado\n");
}

#[test]
fn test_match_operators() {
    let output = run_awk(r#"{ print ($0 ~ /b+/), ($0 !~ "^a"), ($1 ~ $2) }"#, "abb b").unwrap();
    assert_eq!(output, "1 0 1\n");
}

#[test]
fn test_dynamic_regex_from_variable() {
    let output = run_awk(r#"BEGIN { re = "^[0-9]+$" } $0 ~ re { n++ } END { print n }"#, "12\nab\n3\n").unwrap();
    assert_eq!(output, "2\n");
}

#[test]
fn test_posix_bracket_expressions() {
    let output = run_awk(r#"/^[[:upper:]][[:digit:]]$/ { print } /[]]/ { print "bracket" }"#, "A1\nb2\n]\n").unwrap();
    assert_eq!(output, "A1\nbracket\n");
}

#[test]
fn test_compound_patterns() {
    let output = run_awk("NR == 2 || /c/ { print NR }", "a\nb\nc\n").unwrap();
    assert_eq!(output, "2\n3\n");
}

#[test]
fn test_range_ending_on_same_record() {
    let output = run_awk("/x/,/x/ { print NR }", "x\ny\nx\n").unwrap();
    assert_eq!(output, "1\n3\n");
}

#[test]
fn test_range_left_open() {
    let output = run_awk("NR == 2, 0", "a\nb\nc\n").unwrap();
    assert_eq!(output, "b\nc\n");
}

// ============================================================================
// Array Tests
// ============================================================================

#[test]
fn test_array_membership_does_not_create() {
    let output = run_awk(r#"BEGIN { if ("x" in a) print "bad"; n = 0; for (k in a) n++; print n; a["x"]; print length(a) }"#, "").unwrap();
    assert_eq!(output, "0\n1\n");
}

#[test]
fn test_multidimensional_subscripts() {
    let output = run_awk(
        r#"BEGIN { a[1, 2] = 3; for (k in a) { split(k, p, SUBSEP); print p[1], p[2], a[k] }; print ((1, 2) in a) }"#,
        "",
    )
    .unwrap();
    assert_eq!(output, "1 2 3\n1\n");
}

#[test]
fn test_delete_element_and_array() {
    let output = run_awk(
        r#"BEGIN { a[1]; a[2]; a[3]; delete a[2]; print length(a), (2 in a); delete a; print length(a) }"#,
        "",
    )
    .unwrap();
    assert_eq!(output, "2 0\n0\n");
}

#[test]
fn test_for_in_visits_each_key_once() {
    let output = run_awk(
        r#"BEGIN { for (i = 0; i < 100; i++) a[i] = i; for (k in a) { seen[k]++; sum += a[k] }; for (k in seen) if (seen[k] != 1) bad++; print sum, bad + 0 }"#,
        "",
    )
    .unwrap();
    assert_eq!(output, "4950 0\n");
}

#[test]
fn test_delete_during_iteration() {
    let output = run_awk(
        r#"BEGIN { for (i = 1; i <= 10; i++) a[i]; for (k in a) { n++; delete a; } print n, length(a) }"#,
        "",
    )
    .unwrap();
    assert_eq!(output, "1 0\n");
}

#[test]
fn test_insert_delete_churn() {
    let output = run_awk(
        r#"BEGIN { q["keep"] = 1; for (i = 0; i < 100000; i++) { q[i] = i; delete q[i] } for (k in q) n++; print n, length(q), q["keep"] }"#,
        "",
    )
    .unwrap();
    assert_eq!(output, "1 1 1\n");
}

#[test]
fn test_churn_inside_for_in_keeps_position() {
    let output = run_awk(
        r#"BEGIN { for (i = 0; i < 100; i++) a[i]; for (k in a) { delete a[k]; for (j = 0; j < 50; j++) { t = "t" j; a[t]; delete a[t] } n++ } print n, length(a) }"#,
        "",
    )
    .unwrap();
    assert_eq!(output, "100 0\n");
}

#[test]
fn test_numeric_subscripts_use_convfmt() {
    let output = run_awk(r#"BEGIN { a[0.1 + 0.2] = "x"; a[12] = "y"; print a["0.3"], a["12"] }"#, "").unwrap();
    assert_eq!(output, "x y\n");
}

// ============================================================================
// Built-in Function Tests
// ============================================================================

#[test]
fn test_length() {
    let output = run_awk(r#"{ print length(), length, length($1), length(12345) }"#, "héllo wörld").unwrap();
    assert_eq!(output, "11 11 5 5\n");
}

#[test]
fn test_substr_and_index() {
    let output = run_awk(r#"BEGIN { s = "hello"; print substr(s, 2, 3), substr(s, 0, 2), substr(s, 4), index(s, "ll"), index(s, "z") }"#, "").unwrap();
    assert_eq!(output, "ell h lo 3 0\n");
}

#[test]
fn test_split() {
    let output = run_awk(
        r#"BEGIN { n = split("a:b:c", parts, ":"); print n, parts[1], parts[3]; n = split("  x  y ", w); print n, w[1] w[2]; print split("", e), length(e) }"#,
        "",
    )
    .unwrap();
    assert_eq!(output, "3 a c\n2 xy\n0 0\n");
}

#[test]
fn test_split_with_regex() {
    let output = run_awk(r#"BEGIN { n = split("a1b22c", p, /[0-9]+/); print n, p[1] p[2] p[3] }"#, "").unwrap();
    assert_eq!(output, "3 abc\n");
}

#[test]
fn test_sub_and_gsub() {
    let output = run_awk(
        r#"{ n = gsub(/o/, "0"); print n, $0; sub(/w/, "[&]", $2); print $2; t = "aaa"; gsub(/a/, "\\&", t); print t }"#,
        "foo world",
    )
    .unwrap();
    assert_eq!(output, "3 f00 w0rld\n[w]0rld\n&&&\n");
}

#[test]
fn test_gsub_on_field_rebuilds_record() {
    let output = run_awk(r#"BEGIN { OFS = "-" } { gsub(/b/, "B", $2); print }"#, "ab ab ab").unwrap();
    assert_eq!(output, "ab-aB-ab\n");
}

#[test]
fn test_gsub_empty_match() {
    let output = run_awk(r#"BEGIN { s = "abc"; gsub(/x*/, "-", s); print s }"#, "").unwrap();
    assert_eq!(output, "-a-b-c-\n");
}

#[test]
fn test_match_sets_rstart_rlength() {
    let output = run_awk(r#"BEGIN { print match("foobar", /o+/), RSTART, RLENGTH; print match("abc", "z"), RSTART, RLENGTH }"#, "").unwrap();
    assert_eq!(output, "2 2 2\n0 0 -1\n");
}

#[test]
fn test_case_conversion() {
    let output = run_awk(r#"BEGIN { print toupper("abc1"), tolower("ÀBC") }"#, "").unwrap();
    assert_eq!(output, "ABC1 àbc\n");
}

#[test]
fn test_math_functions() {
    let output = run_awk(
        "BEGIN { print int(3.9), int(-3.9), sqrt(16), exp(0), log(1), sin(0), cos(0), atan2(0, 1) }",
        "",
    )
    .unwrap();
    assert_eq!(output, "3 -3 4 1 0 0 1 0\n");
}

#[test]
fn test_rand_is_deterministic_until_srand() {
    let first = run_awk("BEGIN { print rand(), rand() }", "").unwrap();
    let second = run_awk("BEGIN { print rand(), rand() }", "").unwrap();
    assert_eq!(first, second);

    let output = run_awk("BEGIN { print srand(5), srand(7); x = rand(); print (x >= 0 && x < 1) }", "").unwrap();
    assert_eq!(output, "0 5\n1\n");
}

#[test]
fn test_bitwise_functions() {
    let output = run_awk("BEGIN { print and(12, 10), or(12, 10), xor(12, 10), lshift(1, 4), rshift(256, 4) }", "").unwrap();
    assert_eq!(output, "8 14 6 16 16\n");
}

#[test]
fn test_system_returns_status() {
    let output = run_awk(r#"BEGIN { print system("exit 3") }"#, "").unwrap();
    assert_eq!(output, "3\n");
}

// ============================================================================
// Printf Tests
// ============================================================================

#[test]
fn test_printf_conversions() {
    let output = run_awk(
        r#"BEGIN { printf "%d|%5.2f|%-4s|%x|%o|%c|%c|%e|%%\n", 42.9, 3.14159, "ab", 255, 8, 65, "hello", 1234.5 }"#,
        "",
    )
    .unwrap();
    assert_eq!(output, "42| 3.14|ab  |ff|10|A|h|1.234500e+03|%\n");
}

#[test]
fn test_printf_flags_and_star() {
    let output = run_awk(r#"BEGIN { printf "%+d|% d|%05d|%*d|%.3s|%#o\n", 5, 5, 42, 4, 7, "abcdef", 8 }"#, "").unwrap();
    assert_eq!(output, "+5| 5|00042|   7|abc|010\n");
}

#[test]
fn test_printf_g_conversion() {
    let output = run_awk(r#"BEGIN { printf "%g %g %g %G\n", 100000, 1000000, 0.0001, 1e-5 }"#, "").unwrap();
    assert_eq!(output, "100000 1e+06 0.0001 1E-05\n");
}

#[test]
fn test_sprintf_with_missing_args() {
    let output = run_awk(r#"BEGIN { s = sprintf("%s-%d-%s", "a"); print s }"#, "").unwrap();
    assert_eq!(output, "a-0-\n");
}

#[test]
fn test_printf_parenthesized_args() {
    let output = run_awk(r#"BEGIN { printf("%s %s\n", "a", "b") }"#, "").unwrap();
    assert_eq!(output, "a b\n");
}

// ============================================================================
// User-Defined Function Tests
// ============================================================================

#[test]
fn test_recursive_function() {
    let output = run_awk("function fact(n) { return n <= 1 ? 1 : n * fact(n - 1) } BEGIN { print fact(10) }", "").unwrap();
    assert_eq!(output, "3628800\n");
}

#[test]
fn test_scalars_by_value_arrays_by_reference() {
    let output = run_awk(
        r#"function f(s, arr) { s = "changed"; arr["k"] = "set" } BEGIN { x = "orig"; f(x, a); print x, a["k"] }"#,
        "",
    )
    .unwrap();
    assert_eq!(output, "orig set\n");
}

#[test]
fn test_untyped_argument_becomes_array_in_callee() {
    let output = run_awk(
        r#"function fill(a) { a[1] = "one"; a[2] = "two" } function pass(b) { fill(b) } BEGIN { pass(arr); print length(arr), arr[2] }"#,
        "",
    )
    .unwrap();
    assert_eq!(output, "2 two\n");
}

#[test]
fn test_extra_parameters_are_locals() {
    let output = run_awk(
        r#"function f(x,    tmp, loc) { tmp = x * 2; loc[1] = tmp; return loc[1] } BEGIN { tmp = "global"; print f(4), tmp }"#,
        "",
    )
    .unwrap();
    assert_eq!(output, "8 global\n");
}

#[test]
fn test_function_without_return_value() {
    let output = run_awk(r#"function f() { } BEGIN { x = f(); print "[" x "]", x + 0 }"#, "").unwrap();
    assert_eq!(output, "[] 0\n");
}

#[test]
fn test_function_called_before_definition() {
    let output = run_awk("BEGIN { print twice(21) } function twice(n) { return 2 * n }", "").unwrap();
    assert_eq!(output, "42\n");
}

// ============================================================================
// Input Tests
// ============================================================================

#[test]
fn test_nr_and_fnr_across_files() {
    let mut first = NamedTempFile::new().unwrap();
    writeln!(first, "a\nb").unwrap();
    let mut second = NamedTempFile::new().unwrap();
    writeln!(second, "c").unwrap();
    let paths = [first.path().to_str().unwrap(), second.path().to_str().unwrap()];

    let output = run_awk_with_args("{ print NR, FNR, $0 }", "", &paths).unwrap();
    assert_eq!(output, "1 1 a\n2 2 b\n3 1 c\n");
}

#[test]
fn test_filename() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "x").unwrap();
    let path = file.path().to_str().unwrap();

    let output = run_awk_with_args("{ print FILENAME }", "", &[path]).unwrap();
    assert_eq!(output, format!("{}\n", path));
}

#[test]
fn test_operand_assignments() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "line").unwrap();
    let path = file.path().to_str().unwrap();

    let output = run_awk_with_args("{ print x, $0 }", "", &["x=1", path, "x=2", path]).unwrap();
    assert_eq!(output, "1 line\n2 line\n");
}

#[test]
fn test_dash_operand_reads_stdin() {
    let output = run_awk_with_args("{ print }", "from stdin\n", &["-"]).unwrap();
    assert_eq!(output, "from stdin\n");
}

#[test]
fn test_missing_input_file_is_fatal() {
    let err = run_awk_with_args("{ print }", "", &["/nonexistent/awk-vm-input"]).unwrap_err();
    assert!(err.contains("can't open file"), "{}", err);
}

#[test]
fn test_getline_from_main_input() {
    let output = run_awk("NR == 1 { getline; print NR, $0; getline line; print NR, line, $0 }", "a\nb\nc\n").unwrap();
    assert_eq!(output, "2 b\n3 c b\n");
}

#[test]
fn test_getline_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "first\nsecond").unwrap();
    let path = file.path().to_str().unwrap();

    let program = format!(
        r#"BEGIN {{ f = "{}"; while ((getline line < f) > 0) n++; print n, NR; close(f); getline < f; print $0; print (getline x < "/nonexistent/awk-vm") }}"#,
        path
    );
    let output = run_awk(&program, "").unwrap();
    assert_eq!(output, "2 0\nfirst\n-1\n");
}

#[test]
fn test_getline_from_command() {
    let output = run_awk(
        r#"BEGIN { while (("printf 'a\nb\n'" | getline line) > 0) s = s line; print s, NR; "echo x y" | getline; print $2, NF }"#,
        "",
    )
    .unwrap();
    assert_eq!(output, "ab 2\ny 2\n");
}

#[test]
fn test_getline_dash_shares_standard_input() {
    let output = run_awk("{ print } NR == 1 { getline line < \"-\"; print \"got \" line }", "a\nb\nc\n").unwrap();
    assert_eq!(output, "a\ngot b\nc\n");
}

#[test]
fn test_getline_dev_stdin_at_end_of_input() {
    let output = run_awk("END { print (getline line < \"/dev/stdin\") }", "only\n").unwrap();
    assert_eq!(output, "0\n");
}

// ============================================================================
// Encoding Tests
// ============================================================================

#[test]
fn test_non_utf8_input_is_rejected() {
    let err = run_awk_bytes("{ print }", b"caf\xe9\n", Encoding::Utf8).unwrap_err();
    assert!(err.contains("invalid UTF-8"), "{}", err);
}

#[test]
fn test_byte_mode_passes_non_utf8_through() {
    let output = run_awk_bytes("{ print }", b"caf\xe9\n\xff\xfe\n", Encoding::Bytes).unwrap();
    assert_eq!(output, b"caf\xe9\n\xff\xfe\n");
}

#[test]
fn test_byte_mode_counts_bytes() {
    let output = run_awk_bytes("{ print length($0) }", b"\xff\xfe\n", Encoding::Bytes).unwrap();
    assert_eq!(output, b"2\n");
    let output = run_awk_bytes("{ print length($0), length(\"é\") }", "héllo\n".as_bytes(), Encoding::Bytes).unwrap();
    assert_eq!(output, b"6 2\n");
}

#[test]
fn test_byte_mode_fields_and_substr() {
    let output = run_awk_bytes("{ $2 = \"\\xe9\"; print; print substr($1, 2, 1) }", b"a\xe1b c\n", Encoding::Bytes).unwrap();
    assert_eq!(output, b"a\xe1b \xe9\n\xe1\n");
}

#[test]
fn test_byte_mode_case_mapping_is_ascii_only() {
    let output = run_awk_bytes("{ print toupper($0) }", b"ab\xe9\xff\n", Encoding::Bytes).unwrap();
    assert_eq!(output, b"AB\xe9\xff\n");
}

#[test]
fn test_utf8_mode_counts_characters() {
    let output = run_awk_bytes("{ print length($0), toupper(substr($0, 1, 2)) }", "héllo\n".as_bytes(), Encoding::Utf8).unwrap();
    assert_eq!(output, "5 HÉ\n".as_bytes());
}

// ============================================================================
// Output Redirection Tests
// ============================================================================

#[test]
fn test_print_to_file_and_append() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("out.txt");
    let path = path.to_str().unwrap();

    let program = format!(
        r#"BEGIN {{ f = "{0}"; print "one" > f; print "two" > f; close(f); print "three" >> f }}"#,
        path
    );
    run_awk(&program, "").unwrap();
    assert_eq!(fs::read_to_string(path).unwrap(), "one\ntwo\nthree\n");
}

#[test]
fn test_print_to_pipe() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sorted.txt");
    let path = path.to_str().unwrap();

    let program = format!(
        r#"BEGIN {{ cmd = "sort > {0}"; print "b" | cmd; print "a" | cmd; print close(cmd) }}"#,
        path
    );
    let output = run_awk(&program, "").unwrap();
    assert_eq!(output, "0\n");
    assert_eq!(fs::read_to_string(path).unwrap(), "a\nb\n");
}

#[test]
fn test_close_unknown_stream() {
    let output = run_awk(r#"BEGIN { print close("never-opened") }"#, "").unwrap();
    assert_eq!(output, "-1\n");
}

#[test]
fn test_dev_stdout_redirect() {
    let output = run_awk(r#"BEGIN { print "x" > "/dev/stdout"; printf "%s\n", "y" > "/dev/stdout" }"#, "").unwrap();
    assert_eq!(output, "x\ny\n");
}

// ============================================================================
// Error Tests
// ============================================================================

#[test]
fn test_syntax_errors_are_collected() {
    let err = compile("BEGIN { x = ; y = }").unwrap_err();
    assert!(err.diagnostics().len() >= 2, "{:?}", err);
}

#[test]
fn test_runtime_errors_carry_location() {
    let err = run_awk("BEGIN {\n  x = 0\n  print 1 / x\n}", "").unwrap_err();
    assert!(err.contains("division by zero"), "{}", err);
    assert!(err.contains("line 3"), "{}", err);
}

#[test]
fn test_global_array_scalar_misuse_is_a_compile_error() {
    let err = compile("BEGIN { a[1] = 1; print a + 1 }").unwrap_err();
    assert!(err.diagnostics().iter().any(|d| d.to_string().contains("array")), "{:?}", err);
}

#[test]
fn test_parameter_array_scalar_misuse() {
    let err = run_awk("function f(x) { x[1] = 1 } BEGIN { s = 1; f(s) }", "").unwrap_err();
    assert!(err.contains("array"), "{}", err);
    let err = run_awk("function g(a) { return a + 1 } BEGIN { m[1]; g(m) }", "").unwrap_err();
    assert!(err.contains("array"), "{}", err);
}

#[test]
fn test_negative_field_index() {
    let err = run_awk("{ print $(-1) }", "a").unwrap_err();
    assert!(err.contains("field"), "{}", err);
}
