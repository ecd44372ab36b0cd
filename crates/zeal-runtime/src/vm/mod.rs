//! Stack-based virtual machine
//!
//! Executes module chunk streams against a value stack, a frame stack, an
//! exception stack, a template-builder stack and a modules stack, with
//! ownership of the garbage-collected object heap.
//!
//! The dispatcher is a state machine: an inner fetch-decode-execute loop
//! that surfaces three outcomes to the outer driver — normal halt, an
//! import continuation (an unresolved module needs its entry function run
//! before the current instruction can complete), or a runtime error.
//! Thrown exceptions with a live handler unwind inside the inner loop.

mod frame;
mod stringify;

pub use frame::Frame;

use crate::bytecode::{Opcode, Proc};
use crate::error::{RuntimeError, TraceFrame};
use crate::heap::{
    Closure, Heap, NativeBody, NativeData, NativeFnBody, ObjBody, OutValue, RecordBody,
};
use crate::module::{GlobalValue, Module, Predefined, SubmoduleSym, Visibility};
use crate::natives::{self, NativeFn, NativeSym};
use crate::value::{DictKey, ObjRef, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Write;
use std::rc::Rc;

/// Frame stack capacity
const FRAME_LENGTH: usize = 255;
/// Value stack capacity
const STACK_LENGTH: usize = 255 * FRAME_LENGTH;

/// Shared writer used for `print`-family output
pub type OutputWriter = Rc<RefCell<dyn Write>>;

/// Writer bound to stdout
pub fn stdout_writer() -> OutputWriter {
    Rc::new(RefCell::new(std::io::stdout()))
}

/// Writer bound to stderr
pub fn stderr_writer() -> OutputWriter {
    Rc::new(RefCell::new(std::io::stderr()))
}

/// An in-memory writer whose contents can be read back; used to capture
/// program output in tests and by embedders
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl SharedBuffer {
    /// The captured bytes as (lossy) UTF-8
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// A writer/buffer pair: hand the writer to the VM, read the buffer after
pub fn buffer_writer() -> (OutputWriter, SharedBuffer) {
    let buffer = SharedBuffer::default();
    (Rc::new(RefCell::new(buffer.clone())), buffer)
}

/// An open `try` region
#[derive(Debug, Clone, Copy)]
struct ExceptionFrame {
    /// Chunk offset of the catch label in the opening frame's function
    catch_ip: usize,
    /// Value stack height at `TRY_OPEN`
    stack_top: usize,
    /// Index of the frame that opened the region
    frame_index: usize,
}

/// Outcome of the inner dispatch loop
enum Flow {
    Halt(u8),
    Import(Rc<Module>),
}

/// Object kind tags used when a handler must classify before mutating
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Str,
    Array,
    List,
    Dict,
    Record,
    Native,
    NativeFn,
    Proc,
    Closure,
    NativeModule,
    Module,
    NonObj,
}

/// Virtual machine state
pub struct Vm {
    /// Value stack
    stack: Vec<Value>,
    /// Call frames
    frames: Vec<Frame>,
    /// Open `try` regions
    exceptions: Vec<ExceptionFrame>,
    /// Template string builders
    templates: Vec<String>,
    /// Modules whose entries are running or suspended, bottom first
    modules: Vec<Rc<Module>>,
    /// Native function bindings, by bare name
    natives: Rc<HashMap<&'static str, Rc<NativeFn>>>,
    /// The object heap
    pub(crate) heap: Heap,
    out: OutputWriter,
    err: OutputWriter,
    /// Set by the `exit`/`halt` natives; honored at the next dispatch
    pending_halt: Option<u8>,
    /// Values kept alive across multi-step allocations that are not yet
    /// reachable from the stack
    temp_roots: Vec<Value>,
}

impl Vm {
    /// Create a VM with the given native bindings
    pub fn new(natives: Rc<HashMap<&'static str, Rc<NativeFn>>>) -> Self {
        Self {
            stack: Vec::with_capacity(1024),
            frames: Vec::with_capacity(16),
            exceptions: Vec::new(),
            templates: Vec::new(),
            modules: Vec::new(),
            natives,
            heap: Heap::new(),
            out: stdout_writer(),
            err: stderr_writer(),
            pending_halt: None,
            temp_roots: Vec::new(),
        }
    }

    /// Redirect `print`-family output
    pub fn set_output_writer(&mut self, writer: OutputWriter) {
        self.out = writer;
    }

    /// Redirect `eprint`-family output
    pub fn set_error_writer(&mut self, writer: OutputWriter) {
        self.err = writer;
    }

    /// Execute a compiled module to completion; returns the exit code
    pub fn execute(&mut self, module: Rc<Module>) -> Result<u8, RuntimeError> {
        module.set_resolved();
        self.modules.push(module.clone());
        self.prepare_module(&module)?;
        self.push_entry(&module)?;

        loop {
            match self.dispatch()? {
                Flow::Halt(code) => return Ok(code),
                Flow::Import(imported) => {
                    self.modules.push(imported.clone());
                    self.prepare_module(&imported)?;
                    self.push_entry(&imported)?;
                }
            }
        }
    }

    /// Materialize a module's compile-time registrations into globals
    fn prepare_module(&mut self, module: &Rc<Module>) -> Result<(), RuntimeError> {
        if module.prepared() {
            return Ok(());
        }
        module.set_prepared();

        for (name, predefined) in module.predefined_bindings() {
            let value = match predefined {
                Predefined::Proc(proc) => Value::Obj(self.alloc(ObjBody::Proc(proc))?),
                Predefined::Module(imported) => {
                    Value::Obj(self.alloc(ObjBody::Module(imported))?)
                }
                Predefined::NativeModule(native) => {
                    Value::Obj(self.alloc(ObjBody::NativeModule(native))?)
                }
            };
            let visibility = if module.take_pending_public(&name) {
                Visibility::Public
            } else {
                Visibility::Private
            };
            module
                .define_global(&name, GlobalValue { visibility, value })
                .map_err(|_| {
                    self.internal(format!("predefined global '{}' already exists", name))
                })?;
        }

        Ok(())
    }

    /// Push a module's entry function as a new frame
    fn push_entry(&mut self, module: &Rc<Module>) -> Result<(), RuntimeError> {
        let entry = module.entry();
        let callable = self.alloc(ObjBody::Proc(entry.clone()))?;
        self.push(Value::Obj(callable))?;

        let base = self.stack.len() - 1;
        let mut frame = Frame::new(entry, base);
        frame.module_entry = Some(module.clone());
        self.push_frame(frame)?;
        Ok(())
    }

    // ===== Dispatch =====

    /// Run instructions until a halt, an import continuation, or an error.
    ///
    /// Runtime errors raised inside an open `try` region unwind to the
    /// handler like a `throw` whose value is a `{msg: ...}` record;
    /// internal errors always terminate.
    fn dispatch(&mut self) -> Result<Flow, RuntimeError> {
        loop {
            match self.step() {
                Ok(Some(flow)) => return Ok(flow),
                Ok(None) => {}
                Err(err) => {
                    if matches!(err, RuntimeError::Raised { .. })
                        && !self.exceptions.is_empty()
                    {
                        let handler = self.exceptions.pop().expect("checked non-empty");
                        let value = self.error_value(err.message())?;
                        self.frames.truncate(handler.frame_index + 1);
                        self.stack.truncate(handler.stack_top);
                        self.frame_mut().ip = handler.catch_ip;
                        self.push(value)?;
                        continue;
                    }
                    return Err(err);
                }
            }
        }
    }

    /// The `{msg: ...}` record pushed when a runtime error is caught
    fn error_value(&mut self, msg: &str) -> Result<Value, RuntimeError> {
        let msg_value = self.alloc_str(msg)?;
        self.protect(msg_value);
        let mut attrs = HashMap::new();
        attrs.insert("msg".to_string(), msg_value);
        let result = self.alloc(ObjBody::Record(RecordBody { attrs, declared: 1 }));
        self.unprotect(1);
        Ok(Value::Obj(result?))
    }

    /// Execute a single instruction
    fn step(&mut self) -> Result<Option<Flow>, RuntimeError> {
        {
            if let Some(code) = self.pending_halt.take() {
                return Ok(Some(Flow::Halt(code)));
            }

            let op_offset = self.frame().ip;
            self.frame_mut().last_offset = op_offset;
            let byte = self.advance_byte()?;
            let opcode = Opcode::from_byte(byte)
                .ok_or_else(|| self.internal(format!("illegal opcode 0x{:02x}", byte)))?;

            match opcode {
                // ===== Constants =====
                Opcode::Empty => self.push(Value::Empty)?,
                Opcode::False => self.push(Value::Bool(false))?,
                Opcode::True => self.push(Value::Bool(true))?,
                Opcode::CInt => {
                    let value = self.advance_byte()? as i64;
                    self.push(Value::Int(value))?;
                }
                Opcode::Int => {
                    let value = self.read_int_const()?;
                    self.push(Value::Int(value))?;
                }
                Opcode::Float => {
                    let value = self.read_float_const()?;
                    self.push(Value::Float(value))?;
                }
                Opcode::String => {
                    let text = self.read_static_str()?;
                    let value = self.alloc_str(&text)?;
                    self.push(value)?;
                }

                // ===== Template strings =====
                Opcode::Stte => self.templates.push(String::new()),
                Opcode::Wtte => {
                    let value = self.pop()?;
                    let text = self.stringify_value(value);
                    if self.templates.is_empty() {
                        return Err(self.internal("template stack is empty".to_string()));
                    }
                    self.templates
                        .last_mut()
                        .expect("checked non-empty")
                        .push_str(&text);
                }
                Opcode::Ette => {
                    let builder = self
                        .templates
                        .pop()
                        .ok_or_else(|| self.internal("template stack is empty".to_string()))?;
                    let value = self.alloc_str(&builder)?;
                    self.push(value)?;
                }

                // ===== Collections =====
                Opcode::Array => {
                    let len_value = self.pop()?;
                    let len = len_value
                        .as_int()
                        .filter(|len| *len >= 0)
                        .ok_or_else(|| self.error("expect 'int' as array length"))?;
                    let obj = self.alloc(ObjBody::Array(vec![Value::Empty; len as usize]))?;
                    self.push(Value::Obj(obj))?;
                }
                Opcode::List => {
                    let obj = self.alloc(ObjBody::List(Vec::new()))?;
                    self.push(Value::Obj(obj))?;
                }
                Opcode::Dict => {
                    let obj = self.alloc(ObjBody::Dict(HashMap::new()))?;
                    self.push(Value::Obj(obj))?;
                }
                Opcode::Record => {
                    let declared = self.read_i16()? as u16;
                    let obj = self.alloc(ObjBody::Record(RecordBody {
                        attrs: HashMap::new(),
                        declared,
                    }))?;
                    self.push(Value::Obj(obj))?;
                }
                Opcode::IArray => {
                    let index = self.read_i16()? as i64;
                    let value = self.pop()?;
                    let array = self.peek()?;
                    let obj = self.expect_kind(array, |b| matches!(b, ObjBody::Array(_)), "array")?;
                    let len = match self.heap.get(obj) {
                        ObjBody::Array(values) => values.len(),
                        _ => unreachable!(),
                    };
                    if index < 0 || index as usize >= len {
                        return Err(self.error("index out of bounds"));
                    }
                    if let ObjBody::Array(values) = self.heap.get_mut(obj) {
                        values[index as usize] = value;
                    }
                }
                Opcode::IList => {
                    let value = self.peek_at(0)?;
                    let list = self.peek_at(1)?;
                    let obj = self.expect_kind(list, |b| matches!(b, ObjBody::List(_)), "list")?;
                    if let ObjBody::List(items) = self.heap.get_mut(obj) {
                        items.push(value);
                    }
                    self.heap.remeasure(obj);
                    self.pop()?;
                }
                Opcode::IDict => {
                    let value = self.peek_at(0)?;
                    let key = self.peek_at(1)?;
                    let dict = self.peek_at(2)?;
                    let obj = self.expect_kind(dict, |b| matches!(b, ObjBody::Dict(_)), "dict")?;
                    if let ObjBody::Dict(entries) = self.heap.get_mut(obj) {
                        entries.insert(DictKey(key), value);
                    }
                    self.heap.remeasure(obj);
                    self.pop()?;
                    self.pop()?;
                }
                Opcode::IRecord => {
                    let name = self.read_static_str()?;
                    let value = self.peek_at(0)?;
                    let record = self.peek_at(1)?;
                    let obj =
                        self.expect_kind(record, |b| matches!(b, ObjBody::Record(_)), "record")?;
                    let inserted = match self.heap.get_mut(obj) {
                        ObjBody::Record(body) => body.insert_attr(name.to_string(), value),
                        _ => unreachable!(),
                    };
                    if inserted.is_err() {
                        return Err(
                            self.internal("record attribute set is frozen".to_string())
                        );
                    }
                    self.heap.remeasure(obj);
                    self.pop()?;
                }

                // ===== Concatenation and replication =====
                Opcode::Concat => self.op_concat()?,
                Opcode::MulStr => self.op_mulstr()?,

                // ===== Arithmetic =====
                Opcode::Add => self.binary_arith(opcode)?,
                Opcode::Sub => self.binary_arith(opcode)?,
                Opcode::Mul => self.binary_arith(opcode)?,
                Opcode::Div => self.binary_arith(opcode)?,
                Opcode::Mod => {
                    let right = self.pop()?;
                    let left = self.pop()?;
                    match (left, right) {
                        (Value::Int(a), Value::Int(b)) => {
                            if b == 0 {
                                return Err(self.error("division by zero is undefined"));
                            }
                            self.push(Value::Int(a % b))?;
                        }
                        _ => return Err(self.error("unsupported types using 'mod' operator")),
                    }
                }

                // ===== Bitwise =====
                Opcode::BNot => {
                    let value = self.pop()?;
                    match value {
                        Value::Int(v) => self.push(Value::Int(!v))?,
                        _ => return Err(self.error("expect integer at right side")),
                    }
                }
                Opcode::Lsh | Opcode::Rsh | Opcode::BAnd | Opcode::BXor | Opcode::BOr => {
                    let right = self.pop()?;
                    let left = self.pop()?;
                    let (Value::Int(a), Value::Int(b)) = (left, right) else {
                        return Err(self.error("bitwise operators require integer operands"));
                    };
                    let result = match opcode {
                        Opcode::Lsh => a.wrapping_shl(b as u32),
                        Opcode::Rsh => a.wrapping_shr(b as u32),
                        Opcode::BAnd => a & b,
                        Opcode::BXor => a ^ b,
                        _ => a | b,
                    };
                    self.push(Value::Int(result))?;
                }

                // ===== Comparison =====
                Opcode::Lt | Opcode::Gt | Opcode::Le | Opcode::Ge => self.binary_compare(opcode)?,
                Opcode::Eq | Opcode::Ne => self.binary_equality(opcode)?,

                // ===== Short-circuit =====
                Opcode::Or | Opcode::And => {
                    let delta = self.read_i16()?;
                    let value = self.peek()?;
                    let Value::Bool(flag) = value else {
                        return Err(self.error(format!(
                            "unsupported types using '{}' operator",
                            if opcode == Opcode::Or { "or" } else { "and" }
                        )));
                    };
                    let short_circuit = if opcode == Opcode::Or { flag } else { !flag };
                    if short_circuit {
                        self.jump(delta)?;
                    } else {
                        self.pop()?;
                    }
                }
                Opcode::Not => {
                    let value = self.pop()?;
                    let Value::Bool(flag) = value else {
                        return Err(self.error("expect boolean at right side"));
                    };
                    self.push(Value::Bool(!flag))?;
                }
                Opcode::NNot => {
                    let value = self.pop()?;
                    match value {
                        Value::Int(v) => self.push(Value::Int(-v))?,
                        Value::Float(v) => self.push(Value::Float(-v))?,
                        _ => return Err(self.error("expect integer or float at right side")),
                    }
                }

                // ===== Locals and captures =====
                Opcode::LSet => {
                    let index = self.advance_byte()?;
                    let value = self.peek()?;
                    let slot = self.local_slot(index)?;
                    self.stack[slot] = value;
                }
                Opcode::LGet => {
                    let index = self.advance_byte()?;
                    let slot = self.local_slot(index)?;
                    let value = self.stack[slot];
                    self.push(value)?;
                }
                Opcode::OSet => {
                    let index = self.advance_byte()?;
                    let value = self.peek()?;
                    let out = self.find_out(index)?;
                    let mut borrow = out.borrow_mut();
                    match &mut *borrow {
                        OutValue::Linked { slot, .. } => {
                            let slot = *slot;
                            drop(borrow);
                            self.stack[slot] = value;
                        }
                        OutValue::Closed {
                            value: closed_value,
                            ..
                        } => *closed_value = value,
                    }
                }
                Opcode::OGet => {
                    let index = self.advance_byte()?;
                    let out = self.find_out(index)?;
                    let value = match &*out.borrow() {
                        OutValue::Linked { slot, .. } => self.stack[*slot],
                        OutValue::Closed { value, .. } => *value,
                    };
                    self.push(value)?;
                }

                // ===== Globals =====
                Opcode::GDef => {
                    let name = self.read_static_str()?;
                    let value = self.pop()?;
                    let module = self.current_module()?;
                    let visibility = if module.take_pending_public(&name) {
                        Visibility::Public
                    } else {
                        Visibility::Private
                    };
                    module
                        .define_global(&name, GlobalValue { visibility, value })
                        .map_err(|_| {
                            self.error(format!("cannot define global '{}': already exists", name))
                        })?;
                }
                Opcode::GASet => {
                    let name = self.read_static_str()?;
                    let access = self.advance_byte()?;
                    let visibility = match access {
                        0 => Visibility::Private,
                        1 => Visibility::Public,
                        other => {
                            return Err(self.internal(format!("illegal access type {}", other)));
                        }
                    };
                    let module = self.current_module()?;
                    match module.global(&name) {
                        Some(global) => {
                            if let Value::Obj(obj) = global.value {
                                if matches!(
                                    self.heap.get(obj),
                                    ObjBody::Module(_) | ObjBody::NativeModule(_)
                                ) {
                                    return Err(
                                        self.error("modules cannot modify its access")
                                    );
                                }
                            }
                            module
                                .set_visibility(&name, visibility)
                                .map_err(|_| self.internal("global vanished".to_string()))?;
                        }
                        // Exports may precede the definition; remember it
                        None => module.add_pending_public(&name),
                    }
                }
                Opcode::GSet => {
                    let name = self.read_static_str()?;
                    let value = self.peek()?;
                    let module = self.current_module()?;
                    module
                        .set_global(&name, value)
                        .map_err(|_| self.error(format!("global '{}' does not exist", name)))?;
                }
                Opcode::GGet => {
                    let name = self.read_static_str()?;
                    let module = self.current_module()?;
                    let global = module
                        .global(&name)
                        .ok_or_else(|| {
                            self.error(format!("global symbol '{}' does not exist", name))
                        })?;

                    let unresolved = match global.value {
                        Value::Obj(obj) => match self.heap.get(obj) {
                            ObjBody::Module(target) if !target.resolved() => {
                                Some(target.clone())
                            }
                            _ => None,
                        },
                        _ => None,
                    };
                    if let Some(target) = unresolved {
                        // Rewind to this opcode; it replays once the
                        // imported entry has run
                        let frame = self.frame_mut();
                        frame.ip = frame.last_offset;
                        return Ok(Some(Flow::Import(target)));
                    }

                    self.push(global.value)?;
                }
                Opcode::NGet => {
                    let name = self.read_static_str()?;
                    let native = self
                        .natives
                        .get(name.as_ref())
                        .cloned()
                        .ok_or_else(|| {
                            self.internal(format!("unknown native symbol '{}'", name))
                        })?;
                    let obj = self.alloc(ObjBody::NativeFn(NativeFnBody {
                        native,
                        target: Value::Empty,
                    }))?;
                    self.push(Value::Obj(obj))?;
                }
                Opcode::SGet => {
                    let index = self.read_i32()? as usize;
                    let module = self.current_module()?;
                    let symbol = module.symbol(index).ok_or_else(|| {
                        self.error(format!(
                            "failed to get module symbol: index ({}) out of bounds",
                            index
                        ))
                    })?;

                    match symbol {
                        SubmoduleSym::Proc(proc) => {
                            let obj = self.alloc(ObjBody::Proc(proc))?;
                            self.push(Value::Obj(obj))?;
                        }
                        SubmoduleSym::Closure(meta) => {
                            let closure = self.init_closure(meta)?;
                            self.push(Value::Obj(closure))?;
                        }
                        SubmoduleSym::NativeModule(native) => {
                            let obj = self.alloc(ObjBody::NativeModule(native))?;
                            self.push(Value::Obj(obj))?;
                        }
                        SubmoduleSym::Module(imported) => {
                            let obj = self.alloc(ObjBody::Module(imported.clone()))?;
                            self.push(Value::Obj(obj))?;
                            if !imported.resolved() {
                                return Ok(Some(Flow::Import(imported)));
                            }
                        }
                    }
                }

                // ===== Assignment targets =====
                Opcode::ASet => self.op_aset()?,
                Opcode::RSet => {
                    let name = self.read_static_str()?;
                    let target = self.pop()?;
                    let value = self.peek()?;
                    let obj = target
                        .as_obj()
                        .filter(|o| matches!(self.heap.get(*o), ObjBody::Record(_)))
                        .ok_or_else(|| self.error("expect record in assignment"))?;
                    let updated = match self.heap.get_mut(obj) {
                        ObjBody::Record(body) => body.set_attr(name.as_ref(), value),
                        _ => unreachable!(),
                    };
                    if updated.is_err() {
                        return Err(self.error(format!(
                            "record does not have attribute '{}'",
                            name
                        )));
                    }
                }

                Opcode::Pop => {
                    self.pop()?;
                }

                // ===== Jumps =====
                Opcode::Jmp => {
                    let delta = self.read_i16()?;
                    self.jump(delta)?;
                }
                Opcode::Jif => {
                    let delta = self.read_i16()?;
                    let value = self.pop()?;
                    let Value::Bool(flag) = value else {
                        return Err(self.error("expect boolean as condition"));
                    };
                    if !flag {
                        self.jump(delta)?;
                    }
                }
                Opcode::Jit => {
                    let delta = self.read_i16()?;
                    let value = self.pop()?;
                    let Value::Bool(flag) = value else {
                        return Err(self.error("expect boolean as condition"));
                    };
                    if flag {
                        self.jump(delta)?;
                    }
                }

                // ===== Calls and access =====
                Opcode::Call => self.op_call()?,
                Opcode::Access => self.op_access()?,
                Opcode::Index => self.op_index()?,

                Opcode::Ret => {
                    // Close every capture still linked to this frame
                    let outs = std::mem::take(&mut self.frame_mut().outs);
                    for out in outs {
                        let closed = match &*out.borrow() {
                            OutValue::Linked { at, slot } => Some((*at, self.stack[*slot])),
                            OutValue::Closed { .. } => None,
                        };
                        if let Some((at, value)) = closed {
                            *out.borrow_mut() = OutValue::Closed { at, value };
                        }
                    }

                    let result = self.pop()?;
                    let frame = self.frames.pop().expect("frame checked by dispatch");
                    self.stack.truncate(frame.base);

                    if let Some(module) = frame.module_entry {
                        module.set_resolved();
                        self.modules.pop();
                        if self.frames.is_empty() {
                            return Ok(Some(Flow::Halt(0)));
                        }
                        // The suspended importer resumes; a rewound GGET
                        // replays against the now-resolved module
                        return Ok(None);
                    }

                    if self.frames.is_empty() {
                        return Ok(Some(Flow::Halt(0)));
                    }
                    self.push(result)?;
                }

                Opcode::Is => {
                    let value = self.pop()?;
                    let tag = self.advance_byte()?;
                    let value_tag = self.type_tag_of(value)?;
                    self.push(Value::Bool(tag == value_tag))?;
                }

                // ===== Exceptions =====
                Opcode::TryOpen => {
                    let catch_ip = self.read_i16()? as u16 as usize;
                    self.exceptions.push(ExceptionFrame {
                        catch_ip,
                        stack_top: self.stack.len(),
                        frame_index: self.frames.len() - 1,
                    });
                }
                Opcode::TryClose => {
                    if self.exceptions.pop().is_none() {
                        return Err(self.internal("exception stack is empty".to_string()));
                    }
                }
                Opcode::Throw => {
                    let has_value = self.advance_byte()? != 0;
                    let value = if has_value { self.pop()? } else { Value::Empty };
                    let message = self.throw_message(value)?;

                    match self.exceptions.pop() {
                        Some(handler) => {
                            self.frames.truncate(handler.frame_index + 1);
                            self.stack.truncate(handler.stack_top);
                            self.frame_mut().ip = handler.catch_ip;
                            self.push(value)?;
                        }
                        None => {
                            return Err(self.error(message.unwrap_or_default()));
                        }
                    }
                }

                Opcode::Hlt => return Ok(Some(Flow::Halt(0))),
            }
        }

        Ok(None)
    }

    // ===== Compound handlers =====

    fn op_concat(&mut self) -> Result<(), RuntimeError> {
        let right = self.peek_at(0)?;
        let left = self.peek_at(1)?;
        let left_kind = self.kind_of(left);
        let right_kind = self.kind_of(right);

        // Join results allocate while both operands are still on the
        // stack, so their elements stay rooted through a collection
        let result = if left_kind == Kind::Str && right_kind == Kind::Str {
            let joined = format!("{}{}", self.str_of(left)?, self.str_of(right)?);
            let value = self.alloc_str(&joined)?;
            self.pop()?;
            self.pop()?;
            value
        } else if left_kind == Kind::Array && right_kind == Kind::Array {
            let mut joined = self.values_of(left)?;
            joined.extend(self.values_of(right)?);
            let value = Value::Obj(self.alloc(ObjBody::Array(joined))?);
            self.pop()?;
            self.pop()?;
            value
        } else if left_kind == Kind::List && right_kind == Kind::List {
            let mut joined = self.values_of(left)?;
            joined.extend(self.values_of(right)?);
            let value = Value::Obj(self.alloc(ObjBody::List(joined))?);
            self.pop()?;
            self.pop()?;
            value
        } else if left_kind == Kind::Array {
            let mut joined = self.values_of(left)?;
            joined.push(right);
            let value = Value::Obj(self.alloc(ObjBody::Array(joined))?);
            self.pop()?;
            self.pop()?;
            value
        } else if right_kind == Kind::Array {
            let mut joined = vec![left];
            joined.extend(self.values_of(right)?);
            let value = Value::Obj(self.alloc(ObjBody::Array(joined))?);
            self.pop()?;
            self.pop()?;
            value
        } else if left_kind == Kind::List {
            // Appending to a list mutates it in place
            let obj = left.as_obj().expect("list kind implies object");
            if let ObjBody::List(items) = self.heap.get_mut(obj) {
                items.push(right);
            }
            self.heap.remeasure(obj);
            self.pop()?;
            self.pop()?;
            left
        } else if right_kind == Kind::List {
            let obj = right.as_obj().expect("list kind implies object");
            if let ObjBody::List(items) = self.heap.get_mut(obj) {
                items.insert(0, left);
            }
            self.heap.remeasure(obj);
            self.pop()?;
            self.pop()?;
            right
        } else {
            return Err(self.error("illegal operands for concatenation"));
        };

        self.push(result)
    }

    fn op_mulstr(&mut self) -> Result<(), RuntimeError> {
        let right = self.pop()?;
        let left = self.pop()?;
        let value = self.replicate_str(left, right)?;
        self.push(value)
    }

    fn replicate_str(&mut self, left: Value, right: Value) -> Result<Value, RuntimeError> {
        let (count, text_value) = match (left, right) {
            (Value::Int(count), other) | (other, Value::Int(count)) => (count, other),
            _ => return Err(self.error("illegal operands for string multiplication")),
        };
        let text = text_value
            .as_obj()
            .and_then(|obj| self.heap.str_text(obj))
            .ok_or_else(|| self.error("illegal operands for string multiplication"))?;
        if count < 0 {
            return Err(self.error("string multiplication count is negative"));
        }
        self.alloc_str(&text.repeat(count as usize))
    }

    fn binary_arith(&mut self, opcode: Opcode) -> Result<(), RuntimeError> {
        let right = self.pop()?;
        let left = self.pop()?;

        let result = match (left, right) {
            (Value::Int(a), Value::Int(b)) => match opcode {
                Opcode::Add => Value::Int(a.wrapping_add(b)),
                Opcode::Sub => Value::Int(a.wrapping_sub(b)),
                Opcode::Mul => Value::Int(a.wrapping_mul(b)),
                _ => {
                    if b == 0 {
                        return Err(self.error("division by zero is undefined"));
                    }
                    Value::Int(a.wrapping_div(b))
                }
            },
            (Value::Int(_), Value::Float(_))
            | (Value::Float(_), Value::Int(_))
            | (Value::Float(_), Value::Float(_)) => {
                let a = match left {
                    Value::Int(v) => v as f64,
                    Value::Float(v) => v,
                    _ => unreachable!(),
                };
                let b = match right {
                    Value::Int(v) => v as f64,
                    Value::Float(v) => v,
                    _ => unreachable!(),
                };
                match opcode {
                    Opcode::Add => Value::Float(a + b),
                    Opcode::Sub => Value::Float(a - b),
                    Opcode::Mul => Value::Float(a * b),
                    _ => {
                        if b == 0.0 {
                            return Err(self.error("division by zero is undefined"));
                        }
                        Value::Float(a / b)
                    }
                }
            }
            // `*` over int and str replicates
            _ if opcode == Opcode::Mul => return self.replicate_int_str(left, right),
            _ => {
                let symbol = match opcode {
                    Opcode::Add => "+",
                    Opcode::Sub => "-",
                    Opcode::Mul => "*",
                    _ => "/",
                };
                return Err(self.error(format!("unsupported types using {} operator", symbol)));
            }
        };

        self.push(result)
    }

    fn replicate_int_str(&mut self, left: Value, right: Value) -> Result<(), RuntimeError> {
        let is_int_str = |a: Value, b: Value| {
            matches!(a, Value::Int(_))
                && b.as_obj()
                    .map(|obj| matches!(self.heap.get(obj), ObjBody::Str(_)))
                    .unwrap_or(false)
        };
        if is_int_str(left, right) || is_int_str(right, left) {
            let value = self.replicate_str(left, right)?;
            self.push(value)
        } else {
            Err(self.error("unsupported types using * operator"))
        }
    }

    fn binary_compare(&mut self, opcode: Opcode) -> Result<(), RuntimeError> {
        let right = self.pop()?;
        let left = self.pop()?;

        let (a, b) = match (left, right) {
            (Value::Int(a), Value::Int(b)) => {
                let result = match opcode {
                    Opcode::Lt => a < b,
                    Opcode::Gt => a > b,
                    Opcode::Le => a <= b,
                    _ => a >= b,
                };
                return self.push(Value::Bool(result));
            }
            (Value::Int(a), Value::Float(b)) => (a as f64, b),
            (Value::Float(a), Value::Int(b)) => (a, b as f64),
            (Value::Float(a), Value::Float(b)) => (a, b),
            _ => {
                let symbol = match opcode {
                    Opcode::Lt => "<",
                    Opcode::Gt => ">",
                    Opcode::Le => "<=",
                    _ => ">=",
                };
                return Err(self.error(format!("unsupported types using {} operator", symbol)));
            }
        };

        let result = match opcode {
            Opcode::Lt => a < b,
            Opcode::Gt => a > b,
            Opcode::Le => a <= b,
            _ => a >= b,
        };
        self.push(Value::Bool(result))
    }

    fn binary_equality(&mut self, opcode: Opcode) -> Result<(), RuntimeError> {
        let right = self.pop()?;
        let left = self.pop()?;

        let equal = match (left, right) {
            (Value::Empty, Value::Empty) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) => (a as f64) == b,
            (Value::Float(a), Value::Int(b)) => a == (b as f64),
            // Interned strings and every other object compare by identity
            (Value::Obj(a), Value::Obj(b)) => a == b,
            _ => {
                let symbol = if opcode == Opcode::Eq { "==" } else { "!=" };
                return Err(self.error(format!("unsupported types using {} operator", symbol)));
            }
        };

        let result = if opcode == Opcode::Eq { equal } else { !equal };
        self.push(Value::Bool(result))
    }

    fn op_call(&mut self) -> Result<(), RuntimeError> {
        let argc = self.advance_byte()? as usize;
        let callable = self.peek_at(argc)?;
        let Some(obj) = callable.as_obj() else {
            return Err(self.error("target is not callable"));
        };

        enum Callee {
            Native(Rc<NativeFn>, Value),
            Proc(Rc<Proc>, Option<ObjRef>),
        }

        let callee = match self.heap.get(obj) {
            ObjBody::NativeFn(body) => Callee::Native(body.native.clone(), body.target),
            ObjBody::Proc(proc) => Callee::Proc(proc.clone(), None),
            ObjBody::Closure(closure) => Callee::Proc(closure.meta.proc.clone(), Some(obj)),
            _ => return Err(self.error("target is not callable")),
        };

        match callee {
            Callee::Native(native, target) => {
                if native.arity as usize != argc {
                    return Err(self.error(format!(
                        "failed to call native function '{}': declared with {} parameter(s), but got {} argument(s)",
                        native.name, native.arity, argc
                    )));
                }

                let args_base = self.stack.len() - argc;
                let args: Vec<Value> = self.stack[args_base..].to_vec();
                let result = (native.raw)(&args, target, self)?;

                // Drop the arguments and the callable, then push the result
                self.stack.truncate(args_base - 1);
                self.push(result)?;
            }
            Callee::Proc(proc, closure) => self.call_proc(argc, proc, closure)?,
        }

        Ok(())
    }

    fn call_proc(
        &mut self,
        argc: usize,
        proc: Rc<Proc>,
        closure: Option<ObjRef>,
    ) -> Result<(), RuntimeError> {
        if proc.arity as usize != argc {
            return Err(self.error(format!(
                "failed to call function '{}': declared with {} parameter(s), but got {} argument(s)",
                proc.name, proc.arity, argc
            )));
        }

        let base = self.stack.len() - 1 - argc;
        let mut frame = Frame::new(proc, base);
        frame.closure = closure;
        self.push_frame(frame)
    }

    fn op_access(&mut self) -> Result<(), RuntimeError> {
        let name = self.read_static_str()?;
        let target = self.peek()?;
        let Some(obj) = target.as_obj() else {
            return Err(self.error("expect object as target of access"));
        };

        enum Plan {
            Bind(Option<Rc<NativeFn>>),
            Value(Value),
            NativeSymbol(Rc<crate::natives::NativeModule>),
            ModuleGlobal(Rc<Module>),
        }

        let plan = match self.heap.get(obj) {
            ObjBody::Str(_) => Plan::Bind(natives::methods::str_method(&name)),
            ObjBody::Array(_) => Plan::Bind(natives::methods::array_method(&name)),
            ObjBody::List(_) => Plan::Bind(natives::methods::list_method(&name)),
            ObjBody::Dict(_) => Plan::Bind(natives::methods::dict_method(&name)),
            ObjBody::Record(body) => Plan::Value(*body.attrs.get(name.as_ref()).ok_or_else(
                || self.error(format!("record does not have attribute '{}'", name)),
            )?),
            ObjBody::NativeModule(module) => Plan::NativeSymbol(module.clone()),
            ObjBody::Module(module) => Plan::ModuleGlobal(module.clone()),
            _ => return Err(self.error("illegal access target")),
        };

        let value = match plan {
            Plan::Bind(native) => self.bind_method(native, target, &name)?,
            Plan::Value(value) => value,
            Plan::NativeSymbol(module) => match module.symbol(&name).cloned() {
                Some(NativeSym::Fn(native)) => Value::Obj(self.alloc(ObjBody::NativeFn(
                    NativeFnBody {
                        native,
                        target: Value::Empty,
                    },
                ))?),
                Some(NativeSym::Int(value)) => Value::Int(value),
                Some(NativeSym::Float(value)) => Value::Float(value),
                Some(NativeSym::Str(text)) => self.alloc_str(text)?,
                None => {
                    return Err(self.error(format!(
                        "native module '{}' does not contain symbol '{}'",
                        module.name, name
                    )));
                }
            },
            Plan::ModuleGlobal(module) => {
                let global = module.global(&name).ok_or_else(|| {
                    self.error(format!(
                        "module '{}' does not have symbol '{}'",
                        module.name, name
                    ))
                })?;
                if global.visibility == Visibility::Private {
                    return Err(self.error(format!(
                        "symbol '{}' in module '{}' is private",
                        name, module.name
                    )));
                }
                global.value
            }
        };

        self.pop()?;
        self.push(value)
    }

    fn bind_method(
        &mut self,
        native: Option<Rc<NativeFn>>,
        target: Value,
        name: &str,
    ) -> Result<Value, RuntimeError> {
        let native = native
            .ok_or_else(|| self.error(format!("target does not contain symbol '{}'", name)))?;
        let obj = self.alloc(ObjBody::NativeFn(NativeFnBody { native, target }))?;
        Ok(Value::Obj(obj))
    }

    fn op_index(&mut self) -> Result<(), RuntimeError> {
        let target = self.peek_at(0)?;
        let index = self.peek_at(1)?;
        let Some(obj) = target.as_obj() else {
            return Err(self.error("illegal target to index"));
        };

        enum Plan {
            Value(Value),
            Char(char),
        }

        let plan = match self.heap.get(obj) {
            ObjBody::Array(values) | ObjBody::List(values) => {
                let idx = self.validate_index(index, values.len())?;
                Plan::Value(values[idx])
            }
            ObjBody::Dict(entries) => Plan::Value(
                entries
                    .get(&DictKey(index))
                    .copied()
                    .unwrap_or(Value::Empty),
            ),
            ObjBody::Str(body) => {
                let chars: Vec<char> = body.text.chars().collect();
                let idx = self.validate_index(index, chars.len())?;
                Plan::Char(chars[idx])
            }
            ObjBody::Native(NativeBody {
                data: NativeData::Bytes(bytes),
                ..
            }) => {
                let idx = self.validate_index(index, bytes.len())?;
                Plan::Value(Value::Int(bytes[idx] as i64))
            }
            _ => return Err(self.error("illegal target to index")),
        };

        let result = match plan {
            Plan::Value(value) => value,
            Plan::Char(c) => self.alloc_str(&c.to_string())?,
        };

        self.pop()?;
        self.pop()?;
        self.push(result)
    }

    fn op_aset(&mut self) -> Result<(), RuntimeError> {
        let target = self.peek_at(0)?;
        let index = self.peek_at(1)?;
        let value = self.peek_at(2)?;
        let Some(obj) = target.as_obj() else {
            return Err(self.error("illegal assignment target, expect: array, list, dict, nbarray"));
        };

        let len = match self.heap.get(obj) {
            ObjBody::Array(values) | ObjBody::List(values) => Some(values.len()),
            ObjBody::Dict(_) => None,
            ObjBody::Native(NativeBody {
                data: NativeData::Bytes(bytes),
                ..
            }) => Some(bytes.len()),
            _ => {
                return Err(
                    self.error("illegal assignment target, expect: array, list, dict, nbarray")
                );
            }
        };

        match self.kind_of(target) {
            Kind::Array | Kind::List => {
                let idx = self.validate_index(index, len.expect("sequence has a length"))?;
                match self.heap.get_mut(obj) {
                    ObjBody::Array(values) | ObjBody::List(values) => values[idx] = value,
                    _ => unreachable!(),
                }
            }
            Kind::Dict => {
                if let ObjBody::Dict(entries) = self.heap.get_mut(obj) {
                    entries.insert(DictKey(index), value);
                }
                self.heap.remeasure(obj);
            }
            Kind::Native => {
                let idx = self.validate_index(index, len.expect("byte array has a length"))?;
                let Some(byte) = value.as_int().filter(|v| (0..=255).contains(v)) else {
                    return Err(
                        self.error("expect assignment value of type 'int' between 0 and 255")
                    );
                };
                if let ObjBody::Native(NativeBody {
                    data: NativeData::Bytes(bytes),
                    ..
                }) = self.heap.get_mut(obj)
                {
                    bytes[idx] = byte as u8;
                }
            }
            _ => unreachable!("kinds filtered above"),
        }

        self.pop()?;
        self.pop()?;
        Ok(())
    }

    /// Bind a closure's captures to the current frame's live locals
    fn init_closure(&mut self, meta: Rc<crate::bytecode::MetaClosure>) -> Result<ObjRef, RuntimeError> {
        let mut outs = Vec::with_capacity(meta.captures.len());
        for &at in &meta.captures {
            let slot = self.local_slot(at)?;
            let out: crate::heap::OutRef =
                Rc::new(RefCell::new(OutValue::Linked { at, slot }));
            self.frame_mut().outs.push(out.clone());
            outs.push(out);
        }
        self.alloc(ObjBody::Closure(Closure { meta, outs }))
    }

    // ===== Machine primitives =====

    fn frame(&self) -> &Frame {
        self.frames.last().expect("frame stack is empty")
    }

    fn frame_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("frame stack is empty")
    }

    fn push_frame(&mut self, frame: Frame) -> Result<(), RuntimeError> {
        if self.frames.len() >= FRAME_LENGTH {
            return Err(self.error("frame stack is full"));
        }
        if frame.base >= self.stack.len() {
            return Err(self.internal("frame locals out of value stack".to_string()));
        }
        self.frames.push(frame);
        Ok(())
    }

    fn push(&mut self, value: Value) -> Result<(), RuntimeError> {
        if self.stack.len() >= STACK_LENGTH {
            return Err(self.error("stack overflow"));
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self) -> Result<Value, RuntimeError> {
        self.stack
            .pop()
            .ok_or_else(|| self.error("stack underflow"))
    }

    fn peek(&self) -> Result<Value, RuntimeError> {
        self.stack
            .last()
            .copied()
            .ok_or_else(|| self.internal("stack is empty".to_string()))
    }

    fn peek_at(&self, offset: usize) -> Result<Value, RuntimeError> {
        if offset + 1 > self.stack.len() {
            return Err(self.internal("illegal stack peek offset".to_string()));
        }
        Ok(self.stack[self.stack.len() - 1 - offset])
    }

    fn advance_byte(&mut self) -> Result<u8, RuntimeError> {
        let frame = self.frames.last_mut().expect("frame stack is empty");
        let byte = frame
            .proc
            .chunks
            .get(frame.ip)
            .copied()
            .ok_or_else(|| RuntimeError::Internal {
                msg: "instruction pointer exceeded chunks length".to_string(),
                trace: Vec::new(),
            })?;
        frame.ip += 1;
        Ok(byte)
    }

    fn read_i16(&mut self) -> Result<i16, RuntimeError> {
        let high = self.advance_byte()?;
        let low = self.advance_byte()?;
        Ok(i16::from_be_bytes([high, low]))
    }

    fn read_i32(&mut self) -> Result<i32, RuntimeError> {
        let mut bytes = [0u8; 4];
        for byte in &mut bytes {
            *byte = self.advance_byte()?;
        }
        Ok(i32::from_be_bytes(bytes))
    }

    fn read_int_const(&mut self) -> Result<i64, RuntimeError> {
        let index = self.read_i16()? as u16 as usize;
        self.frame()
            .proc
            .iconsts
            .get(index)
            .copied()
            .ok_or_else(|| self.internal("integer constant index out of bounds".to_string()))
    }

    fn read_float_const(&mut self) -> Result<f64, RuntimeError> {
        let index = self.read_i16()? as u16 as usize;
        self.frame()
            .proc
            .fconsts
            .get(index)
            .copied()
            .ok_or_else(|| self.internal("float constant index out of bounds".to_string()))
    }

    fn read_static_str(&mut self) -> Result<Rc<str>, RuntimeError> {
        let index = self.read_i16()? as u16 as usize;
        let module = self.current_module()?;
        module
            .static_str(index)
            .ok_or_else(|| self.internal("static string index out of bounds".to_string()))
    }

    fn current_module(&self) -> Result<Rc<Module>, RuntimeError> {
        self.frame()
            .proc
            .module()
            .ok_or_else(|| self.internal("function module dropped".to_string()))
    }

    fn jump(&mut self, delta: i16) -> Result<(), RuntimeError> {
        let frame = self.frames.last_mut().expect("frame stack is empty");
        let target = frame.ip as i64 + delta as i64;
        if target < 0 || target as usize > frame.proc.chunks.len() {
            return Err(self.internal("jump target out of bounds".to_string()));
        }
        self.frames.last_mut().expect("frame stack is empty").ip = target as usize;
        Ok(())
    }

    fn local_slot(&self, index: u8) -> Result<usize, RuntimeError> {
        let slot = self.frame().base + 1 + index as usize;
        if slot >= self.stack.len() {
            return Err(self.internal(
                "index for frame local passes value stack top".to_string(),
            ));
        }
        Ok(slot)
    }

    fn find_out(&self, index: u8) -> Result<crate::heap::OutRef, RuntimeError> {
        let closure = self
            .frame()
            .closure
            .ok_or_else(|| self.internal("out-value access outside closure".to_string()))?;
        match self.heap.get(closure) {
            ObjBody::Closure(closure) => closure
                .outs
                .iter()
                .find(|out| out.borrow().at() == index)
                .cloned()
                .ok_or_else(|| {
                    self.internal(format!("closure does not capture offset {}", index))
                }),
            _ => Err(self.internal("frame closure is not a closure object".to_string())),
        }
    }

    fn kind_of(&self, value: Value) -> Kind {
        match value.as_obj() {
            None => Kind::NonObj,
            Some(obj) => match self.heap.get(obj) {
                ObjBody::Str(_) => Kind::Str,
                ObjBody::Array(_) => Kind::Array,
                ObjBody::List(_) => Kind::List,
                ObjBody::Dict(_) => Kind::Dict,
                ObjBody::Record(_) => Kind::Record,
                ObjBody::Native(_) => Kind::Native,
                ObjBody::NativeFn(_) => Kind::NativeFn,
                ObjBody::Proc(_) => Kind::Proc,
                ObjBody::Closure(_) => Kind::Closure,
                ObjBody::NativeModule(_) => Kind::NativeModule,
                ObjBody::Module(_) => Kind::Module,
            },
        }
    }

    /// String contents of a value already known to be a string
    fn str_of(&self, value: Value) -> Result<Rc<str>, RuntimeError> {
        value
            .as_obj()
            .and_then(|obj| self.heap.str_text(obj))
            .ok_or_else(|| self.internal("expected a string value".to_string()))
    }

    /// Element snapshot of a value already known to be an array or list
    fn values_of(&self, value: Value) -> Result<Vec<Value>, RuntimeError> {
        let body = value.as_obj().map(|obj| self.heap.get(obj));
        match body {
            Some(ObjBody::Array(values)) | Some(ObjBody::List(values)) => Ok(values.clone()),
            _ => Err(self.internal("expected a sequence value".to_string())),
        }
    }

    fn expect_kind(
        &self,
        value: Value,
        matches_kind: fn(&ObjBody) -> bool,
        what: &str,
    ) -> Result<ObjRef, RuntimeError> {
        value
            .as_obj()
            .filter(|obj| matches_kind(self.heap.get(*obj)))
            .ok_or_else(|| {
                self.internal(format!("expect value of type '{}', but got something else", what))
            })
    }

    fn validate_index(&self, index: Value, len: usize) -> Result<usize, RuntimeError> {
        let Some(idx) = index.as_int() else {
            return Err(self.error("expect 'int' as index"));
        };
        if idx < 0 || idx as usize >= len {
            return Err(self.error("index out of bounds"));
        }
        Ok(idx as usize)
    }

    fn type_tag_of(&self, value: Value) -> Result<u8, RuntimeError> {
        let tag = match value {
            Value::Empty => 0,
            Value::Bool(_) => 1,
            Value::Int(_) => 2,
            Value::Float(_) => 3,
            Value::Obj(obj) => match self.heap.get(obj) {
                ObjBody::Str(_) => 4,
                ObjBody::Array(_) => 5,
                ObjBody::List(_) => 6,
                ObjBody::Dict(_) => 7,
                ObjBody::Record(_) => 8,
                ObjBody::NativeFn(_) | ObjBody::Proc(_) | ObjBody::Closure(_) => 9,
                _ => return Err(self.internal("illegal object type".to_string())),
            },
        };
        Ok(tag)
    }

    /// The throw diagnostic: a string value, or a record's `msg` attribute
    fn throw_message(&self, value: Value) -> Result<Option<String>, RuntimeError> {
        let Some(obj) = value.as_obj() else {
            return Ok(None);
        };
        match self.heap.get(obj) {
            ObjBody::Str(body) => Ok(Some(body.text.to_string())),
            ObjBody::Record(record) => match record.attrs.get("msg") {
                Some(msg) => {
                    let text = msg
                        .as_obj()
                        .and_then(|msg_obj| self.heap.str_text(msg_obj))
                        .ok_or_else(|| {
                            self.error("expect record attribute 'msg' to be of type 'str'")
                        })?;
                    Ok(Some(text.to_string()))
                }
                None => Ok(None),
            },
            _ => Ok(None),
        }
    }

    // ===== Heap interface =====

    /// Allocate through the budget shim: collect when the request would
    /// cross the budget, and double it when the cycle did not keep up
    pub(crate) fn alloc(&mut self, body: ObjBody) -> Result<ObjRef, RuntimeError> {
        let requested = Heap::size_hint(&body);
        if self.heap.should_collect(requested) {
            let freed = self.run_gc();
            if freed < requested {
                self.heap.grow_budget();
            }
        }
        Ok(self.heap.alloc(body))
    }

    /// Allocate (or reuse) an interned string value
    pub(crate) fn alloc_str(&mut self, text: &str) -> Result<Value, RuntimeError> {
        if let Some(existing) = self.heap.lookup_interned(text) {
            return Ok(Value::Obj(existing));
        }
        let requested = std::mem::size_of::<ObjBody>() + text.len();
        if self.heap.should_collect(requested) {
            let freed = self.run_gc();
            if freed < requested {
                self.heap.grow_budget();
            }
        }
        Ok(Value::Obj(self.heap.create_str(text, true)))
    }

    /// Run one collection cycle against the machine's roots
    pub fn run_gc(&mut self) -> usize {
        if self.temp_roots.is_empty() {
            self.heap.collect(&self.stack, &self.modules)
        } else {
            let mut roots = self.stack.clone();
            roots.extend(self.temp_roots.iter().copied());
            self.heap.collect(&roots, &self.modules)
        }
    }

    /// Keep a value alive across allocations before it reaches the stack
    pub(crate) fn protect(&mut self, value: Value) {
        self.temp_roots.push(value);
    }

    /// Release the most recent `count` protected values
    pub(crate) fn unprotect(&mut self, count: usize) {
        let len = self.temp_roots.len().saturating_sub(count);
        self.temp_roots.truncate(len);
    }

    // ===== Native support =====

    pub(crate) fn request_halt(&mut self, code: u8) {
        self.pending_halt = Some(code);
    }

    pub(crate) fn write_out(&self, text: &str) {
        let _ = self.out.borrow_mut().write_all(text.as_bytes());
        let _ = self.out.borrow_mut().flush();
    }

    pub(crate) fn write_err(&self, text: &str) {
        let _ = self.err.borrow_mut().write_all(text.as_bytes());
        let _ = self.err.borrow_mut().flush();
    }

    /// Debug rendering of the value stack, bottom first
    pub(crate) fn stack_dump(&self) -> String {
        let mut out = String::new();
        for (index, value) in self.stack.iter().enumerate() {
            out.push_str(&format!("[{}] {}\n", index, self.stringify_value(*value)));
        }
        out
    }

    /// Current value-stack depth (test introspection)
    pub fn stack_len(&self) -> usize {
        self.stack.len()
    }

    /// Open exception regions (test introspection)
    pub fn exception_depth(&self) -> usize {
        self.exceptions.len()
    }

    // ===== Errors =====

    pub(crate) fn rt_error(&self, msg: String) -> RuntimeError {
        RuntimeError::Raised {
            msg,
            trace: self.capture_trace(),
        }
    }

    fn error(&self, msg: impl Into<String>) -> RuntimeError {
        self.rt_error(msg.into())
    }

    fn internal(&self, msg: String) -> RuntimeError {
        RuntimeError::Internal {
            msg,
            trace: self.capture_trace(),
        }
    }

    /// Best-effort stack trace, bottom to top
    fn capture_trace(&self) -> Vec<TraceFrame> {
        self.frames
            .iter()
            .map(|frame| TraceFrame {
                file: frame
                    .proc
                    .module()
                    .map(|m| m.path.display().to_string())
                    .unwrap_or_else(|| "<unknown>".to_string()),
                function: frame.proc.name.clone(),
                line: frame.proc.line_for_offset(frame.last_offset),
            })
            .collect()
    }
}
