//! Bytecode disassembler for debug output.

use crate::object::{ObjectData, Value};

use super::chunk::Chunk;
use super::encoding;
use super::opcode::{Capture, Op, Operands, VarRef};
use super::program::Program;

/// Disassemble every chunk of a program.
pub fn disassemble(program: &Program) -> String {
    let mut out = String::new();
    for (id, chunk) in program.chunks.iter().enumerate() {
        if id > 0 {
            out.push('\n');
        }
        out.push_str(&disassemble_chunk(chunk, program));
    }
    out
}

pub fn disassemble_chunk(chunk: &Chunk, program: &Program) -> String {
    let mut out = format!(
        "== {} (locals={}, constants={}) ==\n",
        chunk.name,
        chunk.locals_count,
        chunk.constants.len()
    );
    for (offset, op) in chunk.code.iter().enumerate() {
        let line = chunk.spans.get(offset).map_or(0, |s| s.line);
        let line_str = if offset > 0 && chunk.spans.get(offset - 1).map(|s| s.line) == Some(line) {
            "   |".to_string()
        } else {
            format!("{:4}", line)
        };
        out.push_str(&format!("{:04} {} {:<16}", offset, line_str, op.name()));
        let operands = describe_operands(op, offset, chunk, program);
        if !operands.is_empty() {
            out.push(' ');
            out.push_str(&operands);
        }
        out.push('\n');
    }
    out
}

/// Every instruction of every chunk as its packed 64-bit word.
pub fn disassemble_packed(program: &Program) -> String {
    let mut out = String::new();
    for chunk in &program.chunks {
        out.push_str(&format!("== {} ==\n", chunk.name));
        for (offset, op) in chunk.code.iter().enumerate() {
            match encoding::encode(op) {
                Ok(word) => out.push_str(&format!("{:04} {:016x} {}\n", offset, word, op.name())),
                Err(err) => out.push_str(&format!("{:04} {:>16} {}\n", offset, err, op.name())),
            }
        }
    }
    out
}

fn describe_operands(op: &Op, offset: usize, chunk: &Chunk, program: &Program) -> String {
    let local = |slot: u16| {
        chunk
            .local_names
            .get(slot as usize)
            .map_or_else(|| format!("{}", slot), |n| format!("{} ({})", slot, n))
    };
    let global = |slot: u16| {
        program
            .global_names
            .get(slot as usize)
            .map_or_else(|| format!("{}", slot), |n| format!("{} ({})", slot, n))
    };
    let constant = |index: u16| {
        let text = chunk
            .constants
            .get(index as usize)
            .map_or_else(|| "?".to_string(), |v| format_constant(*v, program));
        format!("{:>5} {}", index, text)
    };

    match *op {
        Op::Constant(i) | Op::GetAttr(i) | Op::GetAttrCall(i) => constant(i),
        Op::SetAttr { name, modifier } => format!("{} {}", constant(name), modifier.symbol()),
        Op::GetGlobal(slot) => global(slot),
        Op::GetLocal(slot) => local(slot),
        Op::GetCombined { local: l, global: g } => format!("local {} / global {}", local(l), global(g)),
        Op::SetGlobal { slot, modifier } => format!("{} {}", global(slot), modifier.symbol()),
        Op::SetLocal { slot, modifier } => format!("{} {}", local(slot), modifier.symbol()),
        Op::SetCombined { local: l, global: g, modifier } => {
            format!("local {} / global {} {}", local(l), global(g), modifier.symbol())
        }
        Op::SetIndex(modifier) => modifier.symbol().to_string(),
        Op::ExecFunction { argc, function, enforce } => {
            let name = program
                .functions
                .get(function as usize)
                .and_then(|f| program.callable(*f))
                .map_or_else(|| "?".to_string(), |c| c.name.to_string());
            format!("{} argc={}{}", name, argc, if enforce { " enforce" } else { "" })
        }
        Op::ExecMethod { argc, bound, enforce } => format!(
            "argc={}{}{}",
            argc,
            if bound { " bound" } else { "" },
            if enforce { " enforce" } else { "" }
        ),
        Op::Init(class) | Op::GetParentInit(class) => {
            format!("{} ({})", class, program.classes.name_of(class))
        }
        Op::Jump(delta) | Op::JumpIfFalse(delta) => {
            format!("{:+} -> {:04}", delta, offset as i64 + delta as i64)
        }
        _ => match op.as_binary() {
            Some((_, operands)) => describe_captures(operands),
            None => String::new(),
        },
    }
}

fn describe_captures(operands: Operands) -> String {
    if operands == Operands::stack() {
        return String::new();
    }
    format!(
        "left={} right={}",
        describe_capture(operands.left),
        describe_capture(operands.right)
    )
}

fn describe_capture(capture: Capture) -> String {
    match capture {
        Capture::None => "stack".to_string(),
        Capture::Payload(n) => format!("#{}", n),
        Capture::Variable(VarRef::Local(slot)) => format!("local {}", slot),
        Capture::Variable(VarRef::Global(slot)) => format!("global {}", slot),
        Capture::Variable(VarRef::Combined { local, global }) => {
            format!("local {}/global {}", local, global)
        }
    }
}

fn format_constant(value: Value, program: &Program) -> String {
    match value {
        Value::Object(r) => match program.heap.get(r).map(|o| &o.data) {
            Some(ObjectData::Str(s)) => format!("\"{}\"", s),
            Some(ObjectData::Callable(c)) => format!("<fn {}>", c.name),
            _ => value.to_string(),
        },
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerLimits;
    use crate::lexer::{tokenize, MemoryLoader};
    use crate::vm::compiler::compile;

    #[test]
    fn test_disassembly_names_every_chunk() {
        let source = "function add(a, b) { return a + b; } function main() { x = add(1, 2); }";
        let stream = tokenize("test", source, &MemoryLoader::new()).unwrap();
        let program = compile(stream, &[], CompilerLimits::default()).unwrap();
        let text = disassemble(&program);

        assert!(text.contains("== add (locals=2"));
        assert!(text.contains("== main"));
        assert!(text.contains("EXEC_FUNCTION"));
        assert!(text.contains("add argc=2 enforce"));
        assert!(text.contains("RETURN"));
    }

    #[test]
    fn test_packed_words_decode_back() {
        let source = "function main() { x = [1, 2]; x.add(3); return x.size(); }";
        let stream = tokenize("test", source, &MemoryLoader::new()).unwrap();
        let program = compile(stream, &[], CompilerLimits::default()).unwrap();
        let text = disassemble_packed(&program);
        let main = &program.chunks[program.chunks.len() - 1];

        assert!(text.contains("== main =="));
        for (word, op) in main.encode().unwrap().into_iter().zip(&main.code) {
            assert_eq!(encoding::decode(word).unwrap(), *op);
            assert!(text.contains(&format!("{:016x}", word)));
        }
    }

    #[test]
    fn test_jumps_show_their_target() {
        let source = "function main() { x = 0; while (x < 3) { x += 1; } }";
        let stream = tokenize("test", source, &MemoryLoader::new()).unwrap();
        let program = compile(stream, &[], CompilerLimits::default()).unwrap();
        let text = disassemble(&program);
        assert!(text.contains("JUMP_IF_FALSE"));
        assert!(text.contains("-> "));
    }
}
