//! Body finalization and whole-program linking.
//!
//! [`Compiler::finish_body`] runs once per body: combined references to
//! locals that are never assigned become global reads, surviving locals are
//! renumbered from 0, unused constants are dropped and jumps become relative.
//! [`Compiler::link`] runs once per program: it resolves classes and
//! prelinked calls, then compacts the global slot array.

use std::rc::Rc;

use log::{debug, info};

use crate::error::CompileError;
use crate::object::class::FIRST_USER_CLASS;
use crate::object::{ChunkId, ClassId, Value};

use super::compiler::{CompileResult, Compiler};
use super::opcode::{Capture, Op, VarRef};
use super::program::Program;

fn remap_capture(capture: &mut Capture, remap: impl Fn(VarRef) -> VarRef) {
    if let Capture::Variable(var) = capture {
        *var = remap(*var);
    }
}

impl Compiler {
    /// Finalize the current body and store its chunk.
    pub(crate) fn finish_body(&mut self) -> CompileResult<ChunkId> {
        let end = if self.body.returns {
            Op::ReturnNone
        } else {
            Op::Return
        };
        self.emit(end);

        let body = std::mem::take(&mut self.body);
        let mut chunk = body.chunk;

        let mut local_map: Vec<Option<u16>> = vec![None; body.locals.len()];
        let mut kept: u16 = 0;
        for (slot, entry) in local_map.iter_mut().enumerate() {
            if body.set_locals.contains(&(slot as u16)) {
                *entry = Some(kept);
                kept += 1;
            }
        }
        let resolve = |var: VarRef| match var {
            VarRef::Combined { local, global } => match local_map[local as usize] {
                Some(local) => VarRef::Combined { local, global },
                None => VarRef::Global(global),
            },
            other => other,
        };

        for (index, op) in chunk.code.iter_mut().enumerate() {
            let replacement = match *op {
                Op::GetCombined { local, global } => match local_map[local as usize] {
                    Some(local) => Op::GetCombined { local, global },
                    None => Op::GetGlobal(global),
                },
                Op::SetCombined {
                    local,
                    global,
                    modifier,
                } => Op::SetCombined {
                    local: local_map[local as usize].unwrap_or(local),
                    global,
                    modifier,
                },
                Op::Jump(target) | Op::JumpIfFalse(target) => {
                    let offset = target - index as i32;
                    if i16::try_from(offset).is_err() {
                        return Err(CompileError::new(
                            "Jump offset out of range",
                            chunk.spans[index],
                        ));
                    }
                    match op {
                        Op::Jump(_) => Op::Jump(offset),
                        _ => Op::JumpIfFalse(offset),
                    }
                }
                _ => {
                    if let Some(operands) = op.operands_mut() {
                        remap_capture(&mut operands.left, resolve);
                        remap_capture(&mut operands.right, resolve);
                    }
                    continue;
                }
            };
            *op = replacement;
        }
        chunk.locals_count = kept;
        chunk.local_names = local_map
            .iter()
            .enumerate()
            .filter(|(_, kept)| kept.is_some())
            .filter_map(|(slot, _)| body.locals.name(slot as u16))
            .map(Rc::from)
            .collect();

        self.compact_constants(&mut chunk.constants, &mut chunk.code)
            .map_err(|message| CompileError::new(message, chunk.spans.last().copied().unwrap_or_default()))?;

        debug!(
            "finalized '{}': {} instructions, {} of {} locals kept, {} constants",
            chunk.name,
            chunk.code.len(),
            kept,
            body.locals.len(),
            chunk.constants.len()
        );
        self.chunks.push(chunk);
        Ok(self.chunks.len() - 1)
    }

    /// Drop pool entries no instruction refers to and renumber the rest.
    fn compact_constants(&self, constants: &mut Vec<Value>, code: &mut [Op]) -> Result<(), &'static str> {
        let mut used = vec![false; constants.len()];
        for op in code.iter() {
            if let Op::Constant(i) | Op::GetAttr(i) | Op::GetAttrCall(i) | Op::SetAttr { name: i, .. } = op {
                used[*i as usize] = true;
            }
        }
        let mut map = vec![0u16; constants.len()];
        let mut next = 0usize;
        let mut compacted = Vec::new();
        for (i, value) in constants.iter().enumerate() {
            if used[i] {
                map[i] = next as u16;
                compacted.push(*value);
                next += 1;
            }
        }
        if compacted.len() > self.limits.max_constants {
            return Err("Too many constants in one body");
        }
        for op in code.iter_mut() {
            if let Op::Constant(i) | Op::GetAttr(i) | Op::GetAttrCall(i) | Op::SetAttr { name: i, .. } = op {
                *i = map[*i as usize];
            }
        }
        *constants = compacted;
        Ok(())
    }

    /// Resolve the whole program into a [`Program`].
    pub(crate) fn link(mut self) -> CompileResult<Program> {
        let eof = self.current_span();
        let functions = self.prelink()?;
        self.resolve_classes()?;
        let Some((main, main_takes_args)) = self.main else {
            return Err(CompileError::new("No main function found", eof));
        };
        let (globals, global_names) = self.compact_globals();

        info!("Compilation successful");
        Ok(Program {
            chunks: self.chunks,
            classes: self.classes,
            heap: self.heap,
            globals,
            global_names,
            functions,
            main,
            main_takes_args,
            sources: self.sources,
        })
    }

    /// Build the function table and check every direct call against it.
    fn prelink(&self) -> CompileResult<Vec<Value>> {
        let functions: Vec<Value> = self
            .function_refs
            .names()
            .map(|name| {
                self.globals
                    .get(name)
                    .and_then(|slot| self.global_values.get(slot as usize).copied())
                    .unwrap_or(Value::InternalNull)
            })
            .collect();

        for chunk in &self.chunks {
            for (op, span) in chunk.code.iter().zip(&chunk.spans) {
                let Op::ExecFunction { argc, function, .. } = *op else {
                    continue;
                };
                let name = self.function_refs.name(function).unwrap_or("<unknown>");
                let value = functions.get(function as usize).copied().unwrap_or(Value::InternalNull);
                if value.is_internal_null() {
                    return Err(CompileError::new(format!("Undefined function '{}'", name), *span));
                }
                let Some(callable) = value
                    .as_object()
                    .and_then(|r| self.heap.get(r))
                    .and_then(|o| o.as_callable())
                else {
                    return Err(CompileError::new(format!("'{}' is not callable", name), *span));
                };
                if !callable.arity.accepts(argc as usize) {
                    return Err(CompileError::new(
                        format!(
                            "Incorrect number of arguments for '{}': expected {}, got {}",
                            name, callable.arity, argc
                        ),
                        *span,
                    ));
                }
            }
        }
        debug!("prelinked {} functions", functions.len());
        Ok(functions)
    }

    fn resolve_classes(&mut self) -> CompileResult<()> {
        for id in FIRST_USER_CLASS as usize..self.class_refs.len() {
            let id = id as ClassId;
            if !self.defined_classes.contains(&id) {
                let name = self.class_refs.name(id).unwrap_or("<unknown>");
                let span = self.class_uses.get(&id).copied().unwrap_or_default();
                return Err(CompileError::new(format!("Undefined class '{}'", name), span));
            }
        }

        for &(child, parent, span) in &self.parents {
            if parent < FIRST_USER_CLASS {
                return Err(CompileError::new(
                    format!("Cannot inherit from builtin class '{}'", self.classes.name_of(parent)),
                    span,
                ));
            }
            if let Some(class) = self.classes.get_mut(child) {
                class.parent = Some(parent);
            }
        }

        for &(child, _, span) in &self.parents {
            let mut current = self.classes.get(child).and_then(|c| c.parent);
            let mut steps = 0;
            while let Some(id) = current {
                if id == child || steps > self.classes.len() {
                    return Err(CompileError::new(
                        format!("Cyclic inheritance involving class '{}'", self.classes.name_of(child)),
                        span,
                    ));
                }
                current = self.classes.get(id).and_then(|c| c.parent);
                steps += 1;
            }
        }

        for &(class, span) in &self.parent_init_uses {
            if self.classes.get(class).and_then(|c| c.parent).is_none() {
                return Err(CompileError::new(
                    format!("Class '{}' has no parent class", self.classes.name_of(class)),
                    span,
                ));
            }
        }
        Ok(())
    }

    /// Keep only global slots that hold a compile-time value or are read or
    /// written as globals; combined references to dropped slots become local.
    fn compact_globals(&mut self) -> (Vec<Value>, Vec<Rc<str>>) {
        let total = self.globals.len();
        let mut used: Vec<bool> = (0..total)
            .map(|slot| {
                self.global_values
                    .get(slot)
                    .is_some_and(|v| !v.is_internal_null())
            })
            .collect();

        for chunk in &self.chunks {
            for op in &chunk.code {
                match *op {
                    Op::GetGlobal(slot) | Op::SetGlobal { slot, .. } => used[slot as usize] = true,
                    _ => {
                        if let Some((_, operands)) = op.as_binary() {
                            for capture in [operands.left, operands.right] {
                                if let Capture::Variable(VarRef::Global(slot)) = capture {
                                    used[slot as usize] = true;
                                }
                            }
                        }
                    }
                }
            }
        }

        let mut map: Vec<Option<u16>> = vec![None; total];
        let mut globals = Vec::new();
        let mut names = Vec::new();
        for (slot, name) in self.globals.names().enumerate() {
            if used[slot] {
                map[slot] = Some(globals.len() as u16);
                globals.push(
                    self.global_values
                        .get(slot)
                        .copied()
                        .unwrap_or(Value::InternalNull),
                );
                names.push(Rc::from(name));
            }
        }

        let resolve = |var: VarRef| match var {
            VarRef::Global(slot) => VarRef::Global(map[slot as usize].unwrap_or(slot)),
            VarRef::Combined { local, global } => match map[global as usize] {
                Some(global) => VarRef::Combined { local, global },
                None => VarRef::Local(local),
            },
            other => other,
        };

        for chunk in &mut self.chunks {
            for op in &mut chunk.code {
                let replacement = match *op {
                    Op::GetGlobal(slot) => Op::GetGlobal(map[slot as usize].unwrap_or(slot)),
                    Op::SetGlobal { slot, modifier } => Op::SetGlobal {
                        slot: map[slot as usize].unwrap_or(slot),
                        modifier,
                    },
                    Op::GetCombined { local, global } => match map[global as usize] {
                        Some(global) => Op::GetCombined { local, global },
                        None => Op::GetLocal(local),
                    },
                    Op::SetCombined {
                        local,
                        global,
                        modifier,
                    } => match map[global as usize] {
                        Some(global) => Op::SetCombined {
                            local,
                            global,
                            modifier,
                        },
                        None => Op::SetLocal {
                            slot: local,
                            modifier,
                        },
                    },
                    _ => {
                        if let Some(operands) = op.operands_mut() {
                            remap_capture(&mut operands.left, resolve);
                            remap_capture(&mut operands.right, resolve);
                        }
                        continue;
                    }
                };
                *op = replacement;
            }
        }

        debug!("global compaction kept {} of {} slots", globals.len(), total);
        (globals, names)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::CompilerLimits;
    use crate::error::CompileError;
    use crate::lexer::{tokenize, MemoryLoader};
    use crate::vm::compiler::Compiler;
    use crate::vm::opcode::{Capture, Op, VarRef};
    use crate::vm::program::Program;
    use pretty_assertions::assert_eq;

    fn try_compile(source: &str) -> Result<Program, CompileError> {
        let stream = tokenize("test", source, &MemoryLoader::new())?;
        Compiler::new(stream, &[], CompilerLimits::default()).compile()
    }

    fn error_message(source: &str) -> String {
        try_compile(source).unwrap_err().message()
    }

    #[test]
    fn test_unassigned_names_become_global_reads() {
        let program = try_compile(
            "function helper() { return 1; } function main() { f = helper; return f; }",
        )
        .unwrap();
        let main = program.chunks.last().unwrap();
        assert!(main.code.iter().any(|op| matches!(op, Op::GetGlobal(_))));
        assert!(main.code.iter().any(|op| matches!(op, Op::SetLocal { .. })));
        assert_eq!(main.locals_count, 1);
    }

    #[test]
    fn test_parameters_keep_the_first_slots() {
        let program = try_compile(
            "function add(a, b) { c = a + b; return c; } function main() { return add(1, 2); }",
        )
        .unwrap();
        let add = &program.chunks[0];
        assert_eq!(add.locals_count, 3);
        assert_eq!(
            add.code[0],
            Op::Add(crate::vm::opcode::Operands::new(
                Capture::Variable(VarRef::Local(0)),
                Capture::Variable(VarRef::Local(1)),
            ))
        );
    }

    #[test]
    fn test_unused_globals_are_dropped() {
        let program = try_compile("function main() { x = 1; return x; }").unwrap();
        assert_eq!(program.global_names.len(), 1);
        assert_eq!(&*program.global_names[0], "main");
    }

    #[test]
    fn test_prelink_errors() {
        assert_eq!(
            error_message("function main() { return missing(1); }"),
            "Undefined function 'missing'"
        );
        assert_eq!(
            error_message("function f(a) { return a; } function main() { return f(1, 2); }"),
            "Incorrect number of arguments for 'f': expected 1, got 2"
        );
    }

    #[test]
    fn test_class_resolution_errors() {
        assert_eq!(
            error_message("function main() { x = new Missing(); }"),
            "Undefined class 'Missing'"
        );
        assert_eq!(
            error_message(
                "class A(B) { void init() {} } class B(A) { void init() {} } function main() { return 1; }"
            ),
            "Cyclic inheritance involving class 'A'"
        );
        assert_eq!(
            error_message("class A(list) { void init() {} } function main() { return 1; }"),
            "Cannot inherit from builtin class 'list'"
        );
    }

    #[test]
    fn test_missing_main() {
        assert_eq!(error_message("function f() { return 1; }"), "No main function found");
    }

    #[test]
    fn test_forward_parent_is_resolved() {
        let program = try_compile(
            "class Child(Base) { void init() { pInit(); } } class Base { void init() {} } function main() { return 1; }",
        )
        .unwrap();
        let child = program.classes.iter().find(|c| &*c.name == "Child").unwrap();
        let base = program.classes.iter().find(|c| &*c.name == "Base").unwrap();
        assert_eq!(child.parent, Some(base.id));
    }
}
