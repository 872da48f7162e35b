#![no_main]

use libfuzzer_sys::fuzz_target;
use awk_vm::{compile, Interpreter};

fuzz_target!(|data: &[u8]| {
    // First third is the program, the rest is input
    let split_point = data.len() / 3;
    let (program_bytes, input_bytes) = data.split_at(split_point);

    let Ok(program) = std::str::from_utf8(program_bytes) else {
        return;
    };

    // Limit sizes to prevent hangs, and keep the fuzzer away from the shell
    // and the filesystem
    if program.len() > 10000 || input_bytes.len() > 100000 {
        return;
    }
    if ["system", "|", ">", "getline", "while", "for", "do"]
        .iter()
        .any(|word| program.contains(word))
    {
        return;
    }

    let Ok(program) = compile(program) else {
        return;
    };

    let mut interpreter = Interpreter::new(&program);
    let mut output = Vec::new();
    let _ = interpreter.run(input_bytes, &mut output);
});
