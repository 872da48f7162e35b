#![no_main]

use libfuzzer_sys::fuzz_target;
use awk_vm::compile;
use awk_vm::program::Op;

fuzz_target!(|data: &str| {
    let Ok(program) = compile(data) else {
        return;
    };
    let len = program.code.len();
    for op in &program.code {
        if let Op::Jump(t) | Op::JumpIfFalse(t) | Op::JumpIfTrue(t) | Op::AndJump(t) | Op::OrJump(t) = op {
            assert!(*t <= len, "jump to {} past end {}", t, len);
        }
    }
    let _ = program.to_string();
});
