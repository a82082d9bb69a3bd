//! CJ: a small dynamically-typed, class-based scripting language.
//!
//! Source text is tokenized (with includes expanded), compiled in a single
//! pass to per-function bytecode chunks, linked into a [`vm::Program`] and
//! run by a stack VM with a mark-and-sweep heap.
//!
//! ```no_run
//! use cjlang::vm::SharedBuffer;
//!
//! let output = SharedBuffer::new();
//! cjlang::run_source("function main() { println(1 + 2); }", output.clone()).unwrap();
//! assert_eq!(output.contents(), "3\n");
//! ```

#![allow(clippy::result_large_err)]
#![allow(clippy::new_without_default)]
#![allow(clippy::too_many_arguments)]

pub mod config;
pub mod error;
pub mod highlight;
pub mod lexer;
pub mod natives;
pub mod object;
pub mod reftable;
pub mod runtime;
pub mod span;
pub mod vm;

use std::fs;
use std::io::Write;
use std::path::Path;

use config::{CompilerLimits, RuntimeConfig};
use error::CjError;
use lexer::{FileLoader, MemoryLoader, SourceLoader, SourceMap};
use natives::Extension;
use vm::{Program, Vm};

/// Tokenize and compile a program against the builtins plus `ext`.
///
/// Every file read along the way is recorded in `sources`, also when
/// compilation fails, so the error can be rendered with its context.
pub fn compile_source(
    name: &str,
    text: &str,
    loader: &dyn SourceLoader,
    ext: Option<&Extension>,
    sources: &mut SourceMap,
) -> Result<Program, CjError> {
    let stream = lexer::tokenize_into(name, text, loader, sources)?;
    let natives = natives::global_functions(ext);
    Ok(vm::compile(stream, &natives, CompilerLimits::default())?)
}

/// Compile and run an in-memory program with the default extension,
/// writing everything it prints to `output`.
pub fn run_source(source: &str, output: impl Write + 'static) -> Result<(), CjError> {
    let program = compile_source(
        "<source>",
        source,
        &MemoryLoader::new(),
        natives::extension("default"),
        &mut SourceMap::new(),
    )?;
    Vm::new(program, RuntimeConfig::default())
        .with_output(output)
        .run_main(&[])
}

/// Compile and run a script file, passing `args` to `main(inArgs)`.
pub fn run_file(
    path: &Path,
    args: &[String],
    config: RuntimeConfig,
    ext: Option<&Extension>,
) -> Result<(), CjError> {
    let text = fs::read_to_string(path)?;
    let program = compile_source(
        &path.display().to_string(),
        &text,
        &FileLoader::for_script(path),
        ext,
        &mut SourceMap::new(),
    )?;
    Vm::new(program, config).run_main(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use vm::SharedBuffer;

    #[test]
    fn test_run_source() {
        let output = SharedBuffer::new();
        run_source("function main() { println(d{1: 2}); }", output.clone()).unwrap();
        assert_eq!(output.contents(), "d{1:2}\n");
    }

    #[test]
    fn test_compile_failure_keeps_sources() {
        let mut sources = SourceMap::new();
        let result = compile_source(
            "main.cj",
            "function main() { return missing(1); }",
            &MemoryLoader::new(),
            None,
            &mut sources,
        );
        assert!(matches!(result, Err(CjError::Compile(_))));
        assert_eq!(sources.len(), 1);
    }

    #[test]
    fn test_run_file_with_include() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("util.cj"), "function twice(x) { return x * 2; }").unwrap();
        let script = dir.path().join("main.cj");
        fs::write(&script, "include util function main() { x = twice(2); }").unwrap();
        run_file(&script, &[], RuntimeConfig::default(), None).unwrap();
    }

    #[test]
    fn test_run_file_reports_missing_file() {
        let err = run_file(Path::new("/nonexistent/x.cj"), &[], RuntimeConfig::default(), None)
            .unwrap_err();
        assert_eq!(err.exit_code(), 74);
    }
}
