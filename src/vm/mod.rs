//! Bytecode compiler and virtual machine for CJ.
//!
//! The compiler turns a token stream straight into per-body chunks and links
//! them into a [`Program`]; the VM runs `main` on a value stack with a
//! mark-and-sweep heap.

pub mod chunk;
pub mod compiler;
pub mod compiler_exprs;
pub mod compiler_stmts;
pub mod disassembler;
pub mod encoding;
pub mod linker;
pub mod opcode;
pub mod program;
#[allow(clippy::module_inception)]
pub mod vm;
pub mod vm_calls;
pub mod vm_classes;
pub mod vm_containers;

#[cfg(test)]
mod tests;

pub use chunk::Chunk;
pub use compiler::{compile, Compiler};
pub use disassembler::{disassemble, disassemble_packed};
pub use opcode::Op;
pub use program::Program;
pub use vm::{SharedBuffer, Vm};
