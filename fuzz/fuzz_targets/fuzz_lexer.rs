#![no_main]

use libfuzzer_sys::fuzz_target;
use awk_vm::Lexer;

fuzz_target!(|data: &str| {
    // Errors are fine; panics and hangs are not
    let mut lexer = Lexer::new(data);
    let _ = lexer.tokenize();
});
