//! awk-vm - an embedded POSIX AWK engine
//!
//! AWK source is scanned by the [`Lexer`], compiled in a single pass by the
//! [`Compiler`] into a flat bytecode [`Program`], and executed by the stack
//! machine in [`Interpreter`].
//!
//! # Example
//!
//! ```
//! use awk_vm::{compile, Interpreter};
//!
//! let program = compile(r#"BEGIN { print "Hello, World!" }"#).unwrap();
//!
//! let mut interpreter = Interpreter::new(&program);
//! let mut output = Vec::new();
//! interpreter.run(std::io::empty(), &mut output).unwrap();
//!
//! assert_eq!(String::from_utf8(output).unwrap(), "Hello, World!\n");
//! ```
//!
//! # Field Processing Example
//!
//! ```
//! use awk_vm::{compile, Interpreter};
//!
//! let program = compile(r#"{ print $1, $2 }"#).unwrap();
//!
//! let mut interpreter = Interpreter::new(&program);
//! interpreter.set_fs(",");
//!
//! let input = b"hello,world\nfoo,bar\n";
//! let mut output = Vec::new();
//! interpreter.run(&input[..], &mut output).unwrap();
//!
//! assert_eq!(String::from_utf8(output).unwrap(), "hello world\nfoo bar\n");
//! ```
//!
//! # Step by step
//!
//! ```
//! use awk_vm::{Compiler, Interpreter, Lexer};
//!
//! let tokens = Lexer::new("/error/ { n++ } END { print n }").tokenize().unwrap();
//! let program = Compiler::new(tokens).compile().unwrap();
//!
//! let mut interpreter = Interpreter::new(&program);
//! let input = b"info: ok\nerror: failed\nerror: again\n";
//! let mut output = Vec::new();
//! let status = interpreter.run(&input[..], &mut output).unwrap();
//!
//! assert_eq!(status, 0);
//! assert_eq!(String::from_utf8(output).unwrap(), "2\n");
//! ```

pub mod compiler;
pub mod error;
pub mod interpreter;
pub mod lexer;
pub mod program;
pub mod regex_bridge;
pub mod value;

pub use compiler::Compiler;
pub use error::{Error, Result, SourceLocation};
pub use interpreter::{Encoding, Interpreter};
pub use lexer::{Lexer, Token, TokenKind};
pub use program::Program;
pub use value::Value;

/// Scan and compile an AWK program
pub fn compile(source: &str) -> Result<Program> {
    let tokens = Lexer::new(source).tokenize()?;
    Compiler::new(tokens).compile()
}
