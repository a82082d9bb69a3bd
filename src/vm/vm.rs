//! The bytecode virtual machine: a value stack, call frames and a dispatch loop.

use std::cell::RefCell;
use std::io::{self, BufRead, Write};
use std::rc::Rc;
use std::time::{Duration, Instant};

use log::{debug, trace};

use crate::config::RuntimeConfig;
use crate::error::{CjError, RuntimeError, TraceFrame, Traceback};
use crate::object::class::LIST_CLASS;
use crate::object::{ChunkId, GcStats, Heap, Object, Value};

use super::opcode::{AssignMod, BinaryOp, Capture, Op, VarRef};
use super::program::Program;

/// One active compiled call.
#[derive(Debug, Clone)]
pub struct CallFrame {
    pub chunk: ChunkId,
    /// Index of the next instruction.
    pub ip: usize,
    /// Stack index of local slot 0.
    pub base: usize,
    /// Stack length to restore when the call returns.
    pub floor: usize,
    /// Whether the body produces a value.
    pub returns: bool,
    /// Push the result for the caller (false for calls used as statements).
    pub keep_result: bool,
    pub name: Rc<str>,
}

/// An output sink that can still be read after the VM has taken it.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// The bytecode VM.
pub struct Vm {
    pub(crate) program: Program,
    /// Global slots, initialized from the program.
    pub(crate) globals: Vec<Value>,
    pub(crate) stack: Vec<Value>,
    pub(crate) frames: Vec<CallFrame>,
    pub(crate) config: RuntimeConfig,
    /// Depth of nested `call_value` runs.
    pub(crate) reentry: usize,
    output: Box<dyn Write>,
    input: Box<dyn BufRead>,
    started: Instant,
}

impl Vm {
    pub fn new(mut program: Program, config: RuntimeConfig) -> Self {
        program.heap.set_block_size(config.heap_block_size);
        let globals = program.globals.clone();
        Self {
            program,
            globals,
            stack: Vec::with_capacity(256),
            frames: Vec::with_capacity(64),
            config,
            reentry: 0,
            output: Box::new(io::stdout()),
            input: Box::new(io::BufReader::new(io::stdin())),
            started: Instant::now(),
        }
    }

    /// Replace the output sink.
    pub fn with_output(mut self, output: impl Write + 'static) -> Self {
        self.output = Box::new(output);
        self
    }

    /// Replace the input source read by `input()`.
    pub fn with_input(mut self, input: impl BufRead + 'static) -> Self {
        self.input = Box::new(input);
        self
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn heap(&self) -> &Heap {
        &self.program.heap
    }

    pub fn stack_len(&self) -> usize {
        self.stack.len()
    }

    /// Current value of the global named `name`.
    pub fn global(&self, name: &str) -> Option<Value> {
        let slot = self
            .program
            .global_names
            .iter()
            .position(|n| n.as_ref() == name)?;
        self.globals.get(slot).copied()
    }

    /// Run `main`, passing `args` as `inArgs` when it takes them.
    pub fn run_main(&mut self, args: &[String]) -> Result<(), CjError> {
        let result = self.start_main(args);
        let flushed = self.output.flush();
        match result {
            Ok(()) => {
                flushed?;
                Ok(())
            }
            Err(error) => {
                let traceback = self.traceback();
                self.frames.clear();
                self.stack.clear();
                self.reentry = 0;
                Err(CjError::Runtime { error, traceback })
            }
        }
    }

    fn start_main(&mut self, args: &[String]) -> Result<(), RuntimeError> {
        let main = self.program.main;
        let floor = self.stack.len();
        let depth = self.frames.len();
        let argc = if self.program.main_takes_args {
            let list = self.alloc(Object::instance_of(LIST_CLASS))?;
            self.push(list)?;
            let list_ref = crate::natives::self_object(list)?;
            for arg in args {
                let item = self.alloc(Object::string(arg.as_str()))?;
                self.list_mut(list_ref)?.push(item);
            }
            1
        } else {
            0
        };
        self.begin_call(main, argc, false, floor, false, false)?;
        self.run(depth)
    }

    /// Active calls, innermost first, each at its executing instruction.
    pub fn traceback(&self) -> Traceback {
        let frames = self
            .frames
            .iter()
            .rev()
            .map(|frame| TraceFrame {
                callable: frame.name.to_string(),
                span: self
                    .program
                    .chunk(frame.chunk)
                    .and_then(|c| c.spans.get(frame.ip.saturating_sub(1)))
                    .copied()
                    .unwrap_or_default(),
            })
            .collect();
        Traceback { frames }
    }

    // ===== Stack =====

    pub(crate) fn push(&mut self, value: Value) -> Result<(), RuntimeError> {
        if self.stack.len() >= self.config.stack_limit {
            return Err(RuntimeError::stack_overflow("value stack limit exceeded"));
        }
        self.stack.push(value);
        Ok(())
    }

    pub(crate) fn pop(&mut self) -> Result<Value, RuntimeError> {
        self.stack
            .pop()
            .ok_or_else(|| RuntimeError::new("Stack underflow"))
    }

    /// The value `distance` slots below the top.
    pub(crate) fn peek(&self, distance: usize) -> Result<Value, RuntimeError> {
        self.stack
            .len()
            .checked_sub(distance + 1)
            .and_then(|i| self.stack.get(i))
            .copied()
            .ok_or_else(|| RuntimeError::new("Stack underflow"))
    }

    // ===== Memory =====

    /// Store a runtime object, collecting first when the heap has no free slot.
    pub fn alloc(&mut self, object: Object) -> Result<Value, RuntimeError> {
        if self.config.gc_stress || self.program.heap.needs_collection() {
            self.collect_garbage();
        }
        Ok(Value::Object(self.program.heap.alloc(object)))
    }

    /// Mark from the stack and the globals, then sweep.
    pub fn collect_garbage(&mut self) -> GcStats {
        let roots = self.stack.iter().chain(self.globals.iter()).copied();
        self.program.heap.collect(roots)
    }

    // ===== Host I/O =====

    pub fn write_output(&mut self, text: &str) -> Result<(), RuntimeError> {
        self.output
            .write_all(text.as_bytes())
            .map_err(|e| RuntimeError::Io(e.to_string()))
    }

    pub fn flush_output(&mut self) -> Result<(), RuntimeError> {
        self.output
            .flush()
            .map_err(|e| RuntimeError::Io(e.to_string()))
    }

    /// One line of input without its terminator. End of input reads as "".
    pub fn read_line(&mut self) -> Result<String, RuntimeError> {
        let mut line = String::new();
        self.input
            .read_line(&mut line)
            .map_err(|e| RuntimeError::Io(e.to_string()))?;
        let trimmed = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(trimmed);
        Ok(line)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    // ===== Variables =====

    fn var_name(&self, var: VarRef) -> String {
        let frame = self.frames.last();
        let local_name = |slot: u16| {
            frame
                .and_then(|f| self.program.chunk(f.chunk))
                .and_then(|c| c.local_names.get(slot as usize))
                .map(|n| n.to_string())
        };
        let global_name = |slot: u16| {
            self.program
                .global_names
                .get(slot as usize)
                .map(|n| n.to_string())
        };
        match var {
            VarRef::Local(slot) => local_name(slot),
            VarRef::Global(slot) | VarRef::Combined { global: slot, .. } => global_name(slot),
        }
        .unwrap_or_else(|| "<unknown>".to_string())
    }

    fn local(&self, slot: u16) -> Value {
        let base = self.frames.last().map_or(0, |f| f.base);
        self.stack
            .get(base + slot as usize)
            .copied()
            .unwrap_or(Value::InternalNull)
    }

    fn local_mut(&mut self, slot: u16) -> Result<&mut Value, RuntimeError> {
        let base = self.frames.last().map_or(0, |f| f.base);
        self.stack
            .get_mut(base + slot as usize)
            .ok_or_else(|| RuntimeError::new("Local slot out of range"))
    }

    fn global_mut(&mut self, slot: u16) -> Result<&mut Value, RuntimeError> {
        self.globals
            .get_mut(slot as usize)
            .ok_or_else(|| RuntimeError::new("Global slot out of range"))
    }

    fn read_var(&self, var: VarRef) -> Result<Value, RuntimeError> {
        let value = match var {
            VarRef::Local(slot) => self.local(slot),
            VarRef::Global(slot) => self.globals.get(slot as usize).copied().unwrap_or(Value::InternalNull),
            VarRef::Combined { local, global } => match self.local(local) {
                Value::InternalNull => self
                    .globals
                    .get(global as usize)
                    .copied()
                    .unwrap_or(Value::InternalNull),
                value => value,
            },
        };
        if value.is_internal_null() {
            return Err(RuntimeError::undefined(format!(
                "Undefined reference to '{}'",
                self.var_name(var)
            )));
        }
        Ok(value)
    }

    /// Assign `value` to a variable. Compound modifiers need an existing value;
    /// a combined reference modifies the local when it is set, else the global.
    fn assign_var(&mut self, var: VarRef, modifier: AssignMod, value: Value) -> Result<(), RuntimeError> {
        if modifier == AssignMod::None {
            match var {
                VarRef::Local(slot) | VarRef::Combined { local: slot, .. } => *self.local_mut(slot)? = value,
                VarRef::Global(slot) => *self.global_mut(slot)? = value,
            }
            return Ok(());
        }

        let target = match var {
            VarRef::Combined { local, global } if self.local(local).is_internal_null() => {
                VarRef::Global(global)
            }
            VarRef::Combined { local, .. } => VarRef::Local(local),
            other => other,
        };
        let current = self.read_var(target).map_err(|_| {
            RuntimeError::undefined(format!("Undefined reference to '{}'", self.var_name(var)))
        })?;
        let modified = self.modify(modifier, current, value)?;
        match target {
            VarRef::Local(slot) => *self.local_mut(slot)? = modified,
            VarRef::Global(slot) => *self.global_mut(slot)? = modified,
            VarRef::Combined { .. } => {}
        }
        Ok(())
    }

    /// The value of one binary operand: popped, embedded or read from a slot.
    fn operand(&mut self, capture: Capture) -> Result<Value, RuntimeError> {
        match capture {
            Capture::None => self.pop(),
            Capture::Payload(n) => Ok(Value::Number(n as f64)),
            Capture::Variable(var) => self.read_var(var),
        }
    }

    fn constant(&self, chunk: ChunkId, index: u16) -> Result<Value, RuntimeError> {
        self.program
            .chunk(chunk)
            .and_then(|c| c.constants.get(index as usize))
            .copied()
            .ok_or_else(|| RuntimeError::new("Constant index out of range"))
    }

    /// The string constant naming an attribute.
    fn attr_name(&self, chunk: ChunkId, index: u16) -> Result<Rc<str>, RuntimeError> {
        let value = self.constant(chunk, index)?;
        value
            .as_object()
            .and_then(|r| self.program.heap.get(r))
            .and_then(|o| o.as_str())
            .cloned()
            .ok_or_else(|| RuntimeError::type_error("Attribute name is not a string"))
    }

    fn bool_operand(value: Value) -> Result<bool, RuntimeError> {
        value
            .as_bool()
            .ok_or_else(|| RuntimeError::type_error("Object is not a boolean"))
    }

    // ===== Dispatch =====

    /// Execute instructions until the frame stack is back to `depth` frames.
    pub(crate) fn run(&mut self, depth: usize) -> Result<(), RuntimeError> {
        while self.frames.len() > depth {
            let Some(frame) = self.frames.last_mut() else {
                break;
            };
            let ip = frame.ip;
            frame.ip += 1;
            let chunk = frame.chunk;
            let op = self
                .program
                .chunk(chunk)
                .and_then(|c| c.code.get(ip))
                .copied()
                .ok_or_else(|| RuntimeError::new("Instruction pointer out of range"))?;

            if self.config.trace_execution {
                trace!("{:04} {:<16} stack={} {:?}", ip, op.name(), self.stack.len(), op);
            }

            match op {
                Op::Constant(index) => {
                    let value = self.constant(chunk, index)?;
                    self.push(value)?;
                }
                Op::GetGlobal(slot) => {
                    let value = self.read_var(VarRef::Global(slot))?;
                    self.push(value)?;
                }
                Op::GetLocal(slot) => {
                    let value = self.read_var(VarRef::Local(slot))?;
                    self.push(value)?;
                }
                Op::GetCombined { local, global } => {
                    let value = self.read_var(VarRef::Combined { local, global })?;
                    self.push(value)?;
                }
                Op::GetSelf => {
                    let value = self.local(0);
                    self.push(value)?;
                }
                Op::SetGlobal { slot, modifier } => {
                    let value = self.pop()?;
                    self.assign_var(VarRef::Global(slot), modifier, value)?;
                }
                Op::SetLocal { slot, modifier } => {
                    let value = self.pop()?;
                    self.assign_var(VarRef::Local(slot), modifier, value)?;
                }
                Op::SetCombined { local, global, modifier } => {
                    let value = self.pop()?;
                    self.assign_var(VarRef::Combined { local, global }, modifier, value)?;
                }

                Op::GetIndex => {
                    let index = self.pop()?;
                    let target = self.pop()?;
                    let value = self.get_index(target, index)?;
                    self.push(value)?;
                }
                Op::SetIndex(modifier) => {
                    // Operands stay on the stack while user code runs.
                    let value = self.peek(0)?;
                    let index = self.peek(1)?;
                    let target = self.peek(2)?;
                    self.set_index(target, index, modifier, value)?;
                    self.stack.truncate(self.stack.len() - 3);
                }
                Op::GetAttr(name) => {
                    let name = self.attr_name(chunk, name)?;
                    let object = self.pop()?;
                    let value = self.get_attr(object, &name)?;
                    self.push(value)?;
                }
                Op::GetAttrCall(name) => {
                    let name = self.attr_name(chunk, name)?;
                    let object = self.pop()?;
                    let value = self.get_attr(object, &name)?;
                    self.push(value)?;
                    self.push(object)?;
                }
                Op::SetAttr { name, modifier } => {
                    let name = self.attr_name(chunk, name)?;
                    let value = self.peek(0)?;
                    let target = self.peek(1)?;
                    self.set_attr(target, &name, modifier, value)?;
                    self.stack.truncate(self.stack.len() - 2);
                }

                Op::Add(o)
                | Op::Sub(o)
                | Op::Mul(o)
                | Op::Div(o)
                | Op::Mod(o)
                | Op::Pow(o)
                | Op::Less(o)
                | Op::More(o)
                | Op::LessEqual(o)
                | Op::MoreEqual(o)
                | Op::Equal(o) => {
                    let binary = op.as_binary().map_or(BinaryOp::Add, |(b, _)| b);
                    let right = self.operand(o.right)?;
                    let left = self.operand(o.left)?;
                    let result = self.binary(binary, left, right)?;
                    self.push(result)?;
                }

                Op::Negate => {
                    let value = self.pop()?;
                    let result = match value {
                        Value::Number(n) => Value::Number(-n),
                        other => self.unary(other, "_ng")?,
                    };
                    self.push(result)?;
                }
                Op::Not => {
                    let value = Self::bool_operand(self.pop()?)?;
                    self.push(Value::Bool(!value))?;
                }
                Op::And => {
                    let b = Self::bool_operand(self.pop()?)?;
                    let a = Self::bool_operand(self.pop()?)?;
                    self.push(Value::Bool(a && b))?;
                }
                Op::Or => {
                    let b = Self::bool_operand(self.pop()?)?;
                    let a = Self::bool_operand(self.pop()?)?;
                    self.push(Value::Bool(a || b))?;
                }
                Op::Is => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    self.push(Value::Bool(a == b))?;
                }

                Op::ExecFunction { argc, function, enforce } => {
                    let callee = self
                        .program
                        .functions
                        .get(function as usize)
                        .copied()
                        .ok_or_else(|| RuntimeError::new("Function index out of range"))?;
                    let floor = self.args_start(argc as usize)?;
                    self.begin_call(callee, argc as usize, false, floor, enforce, enforce)?;
                }
                Op::ExecMethod { argc, bound, enforce } => {
                    let below = argc as usize + bound as usize;
                    let callee = self.peek(below)?;
                    let floor = self.stack.len() - below - 1;
                    self.begin_call(callee, argc as usize, bound, floor, enforce, enforce)?;
                }
                Op::Init(class) => {
                    let init = self
                        .program
                        .classes
                        .get(class)
                        .and_then(|c| c.init)
                        .ok_or_else(|| {
                            RuntimeError::type_error(
                                "Inappropriate class initialization type for 'new' operation",
                            )
                        })?;
                    let object = self.alloc(Object::instance_of(class))?;
                    self.push(object)?;
                    self.push(init)?;
                    self.push(object)?;
                }
                Op::GetParentInit(class) => {
                    let init = self
                        .program
                        .classes
                        .get(class)
                        .and_then(|c| c.parent)
                        .and_then(|p| self.program.classes.get(p))
                        .and_then(|p| p.init)
                        .ok_or_else(|| {
                            RuntimeError::type_error("Inappropriate parent class initialization type")
                        })?;
                    let this = self.local(0);
                    self.push(init)?;
                    self.push(this)?;
                }
                Op::Return | Op::ReturnNone => {
                    let Some(frame) = self.frames.pop() else {
                        break;
                    };
                    let result = match op {
                        Op::ReturnNone => Value::None,
                        _ if frame.returns => self.pop()?,
                        _ => Value::InternalNull,
                    };
                    self.stack.truncate(frame.floor);
                    if frame.keep_result && frame.returns {
                        self.push(result)?;
                    }
                }

                Op::Jump(offset) => self.jump(ip, offset)?,
                Op::JumpIfFalse(offset) => {
                    let condition = self
                        .pop()?
                        .as_bool()
                        .ok_or_else(|| RuntimeError::type_error("Condition is not a boolean"))?;
                    if !condition {
                        self.jump(ip, offset)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn jump(&mut self, ip: usize, offset: i32) -> Result<(), RuntimeError> {
        let target = ip as i64 + offset as i64;
        let frame = self
            .frames
            .last_mut()
            .ok_or_else(|| RuntimeError::new("No active frame"))?;
        frame.ip = usize::try_from(target).map_err(|_| RuntimeError::new("Jump target out of range"))?;
        Ok(())
    }

    fn args_start(&self, argc: usize) -> Result<usize, RuntimeError> {
        self.stack
            .len()
            .checked_sub(argc)
            .ok_or_else(|| RuntimeError::new("Stack underflow"))
    }

    /// Log heap statistics; used after a run when debugging the collector.
    pub fn log_heap_stats(&self) {
        let heap = &self.program.heap;
        debug!(
            "heap: {} live objects, {} slots, {} collections",
            heap.live_objects(),
            heap.capacity(),
            heap.collections()
        );
    }
}
