//! Call frames

use crate::bytecode::Proc;
use crate::heap::OutRef;
use crate::module::Module;
use crate::value::ObjRef;
use std::rc::Rc;

/// One in-progress call
///
/// The frame owns the stack region starting at its base: slot `base` holds
/// the callable itself, parameters sit at `base + 1 ..= base + arity`, and
/// further locals follow.
#[derive(Debug)]
pub struct Frame {
    /// Chunk offset of the next instruction
    pub ip: usize,
    /// Chunk offset of the last dispatched opcode, for error reporting and
    /// cooperative import replay
    pub last_offset: usize,
    /// The function being executed
    pub proc: Rc<Proc>,
    /// The closure through which the function was called, if any
    pub closure: Option<ObjRef>,
    /// Stack index of the callable
    pub base: usize,
    /// Captures created while this frame was active; closed when it pops
    pub outs: Vec<OutRef>,
    /// Set on module entry frames; returning marks the module resolved
    pub module_entry: Option<Rc<Module>>,
}

impl Frame {
    pub fn new(proc: Rc<Proc>, base: usize) -> Self {
        Self {
            ip: 0,
            last_offset: 0,
            proc,
            closure: None,
            base,
            outs: Vec::new(),
            module_entry: None,
        }
    }
}
