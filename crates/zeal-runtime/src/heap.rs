//! Object heap and garbage collector
//!
//! Objects live in a slab addressed by [`ObjRef`] handles; freed slots are
//! recycled through a free list. Every object header carries a tri-color
//! mark and intrusive prev/next links; the heap keeps one intrusive list
//! per color and every color transition is a single unlink+relink.
//!
//! Allocation is metered: when a request would push live bytes past the
//! current budget the VM runs a collection first, and if the cycle frees
//! less than the request the budget doubles. Deallocations that drop live
//! bytes under half the budget halve it.
//!
//! Collection cycle: recolor roots white→gray, mark (pop gray, gray its
//! white children, blacken), sweep every remaining white object through its
//! kind destructor (strings drop their intern entry, natives run their
//! destroy hook via `Drop`), then move the black list back to white.

use crate::bytecode::{MetaClosure, Proc};
use crate::module::Module;
use crate::natives::{NativeFn, NativeModule};
use crate::value::{DictKey, ObjRef, Value};
use rand::rngs::StdRng;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::File;
use std::rc::Rc;

/// Initial allocation budget: 16 MiB
const ALLOCATE_START_LIMIT: usize = 16 * 1024 * 1024;
/// Budget growth factor when a collection does not keep up
const GROW_LIMIT_FACTOR: usize = 2;
/// Budget floor; halving never goes below this
const MIN_LIMIT: usize = 4096;

/// GC color of an object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    /// Unvisited / condemned
    White,
    /// Reachable, children not yet scanned
    Gray,
    /// Scanned
    Black,
    /// Outside the color lists (staging only)
    Transparent,
}

/// Identifier of the color list an object is linked into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListId {
    White = 0,
    Gray = 1,
    Black = 2,
}

/// One intrusive list of objects
#[derive(Debug, Default, Clone, Copy)]
struct ObjList {
    len: usize,
    head: Option<u32>,
    tail: Option<u32>,
}

/// A captured variable
///
/// While linked it aliases a live value-stack slot; once the owning frame
/// returns it holds an independent copy.
#[derive(Debug)]
pub enum OutValue {
    /// Aliases the absolute stack slot
    Linked { at: u8, slot: usize },
    /// Holds a closed-over copy
    Closed { at: u8, value: Value },
}

impl OutValue {
    /// The frame-local offset this capture refers to
    pub fn at(&self) -> u8 {
        match self {
            OutValue::Linked { at, .. } | OutValue::Closed { at, .. } => *at,
        }
    }
}

/// Shared handle to a captured variable
pub type OutRef = Rc<RefCell<OutValue>>;

/// A closure: function layout plus live captures
#[derive(Debug)]
pub struct Closure {
    pub meta: Rc<MetaClosure>,
    pub outs: Vec<OutRef>,
}

/// String body; `runtime` marks strings built at runtime rather than loaded
/// from a module's static table.
#[derive(Debug)]
pub struct StrBody {
    pub text: Rc<str>,
    pub runtime: bool,
}

/// Record body; the attribute set freezes once `declared` attributes exist.
#[derive(Debug)]
pub struct RecordBody {
    pub attrs: HashMap<String, Value>,
    pub declared: u16,
}

impl RecordBody {
    /// Whether the attribute set is frozen
    pub fn frozen(&self) -> bool {
        self.attrs.len() >= self.declared as usize
    }

    /// Insert an attribute during literal construction; fails once the
    /// declared set froze
    pub fn insert_attr(&mut self, name: String, value: Value) -> Result<(), ()> {
        if self.frozen() {
            return Err(());
        }
        self.attrs.insert(name, value);
        Ok(())
    }

    /// Update an existing attribute; the frozen set admits no additions
    pub fn set_attr(&mut self, name: &str, value: Value) -> Result<(), ()> {
        match self.attrs.get_mut(name) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(()),
        }
    }
}

/// Opaque native resource payloads
pub enum NativeData {
    /// An open (or closed) file handle
    File {
        file: Option<File>,
        path: String,
        mode: String,
    },
    /// A random number generator
    Rng(StdRng),
    /// A byte array
    Bytes(Vec<u8>),
}

impl std::fmt::Debug for NativeData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NativeData::File { path, mode, .. } => {
                write!(f, "File({:?}, {:?})", path, mode)
            }
            NativeData::Rng(_) => write!(f, "Rng"),
            NativeData::Bytes(bytes) => write!(f, "Bytes({})", bytes.len()),
        }
    }
}

/// A native object: a name for diagnostics plus the owned resource.
/// The resource's `Drop` is the destroy callback run at sweep.
#[derive(Debug)]
pub struct NativeBody {
    pub name: &'static str,
    pub data: NativeData,
}

/// A native function optionally bound to a target value
#[derive(Debug)]
pub struct NativeFnBody {
    pub native: Rc<NativeFn>,
    pub target: Value,
}

/// Object payloads by kind
#[derive(Debug)]
pub enum ObjBody {
    Str(StrBody),
    Array(Vec<Value>),
    List(Vec<Value>),
    Dict(HashMap<DictKey, Value>),
    Record(RecordBody),
    Native(NativeBody),
    NativeFn(NativeFnBody),
    Proc(Rc<Proc>),
    Closure(Closure),
    NativeModule(Rc<NativeModule>),
    Module(Rc<Module>),
}

impl ObjBody {
    /// Kind name for diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            ObjBody::Str(_) => "str",
            ObjBody::Array(_) => "array",
            ObjBody::List(_) => "list",
            ObjBody::Dict(_) => "dict",
            ObjBody::Record(_) => "record",
            ObjBody::Native(_) => "native",
            ObjBody::NativeFn(_) => "native function",
            ObjBody::Proc(_) => "function",
            ObjBody::Closure(_) => "closure",
            ObjBody::NativeModule(_) => "native module",
            ObjBody::Module(_) => "module",
        }
    }
}

#[derive(Debug)]
struct ObjHeader {
    color: Color,
    list: ListId,
    prev: Option<u32>,
    next: Option<u32>,
    /// Accounted size at the last (re)measure
    size: usize,
}

#[derive(Debug)]
struct ObjEntry {
    header: ObjHeader,
    body: ObjBody,
}

#[derive(Debug)]
enum Slot {
    Occupied(Box<ObjEntry>),
    Free { next: Option<u32> },
}

/// The object heap
pub struct Heap {
    slots: Vec<Slot>,
    free_head: Option<u32>,
    lists: [ObjList; 3],
    interner: HashMap<Rc<str>, ObjRef>,
    bytes_alive: usize,
    budget: usize,
    /// Completed collection cycles
    pub gc_cycles: usize,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Heap {
    /// Create an empty heap with the starting budget
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_head: None,
            lists: [ObjList::default(); 3],
            interner: HashMap::new(),
            bytes_alive: 0,
            budget: ALLOCATE_START_LIMIT,
            gc_cycles: 0,
        }
    }

    /// Live bytes currently accounted
    pub fn bytes_alive(&self) -> usize {
        self.bytes_alive
    }

    /// Current allocation budget
    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Number of live objects
    pub fn object_count(&self) -> usize {
        self.lists.iter().map(|l| l.len).sum()
    }

    /// Length of the gray list (empty outside a collection)
    pub fn gray_len(&self) -> usize {
        self.lists[ListId::Gray as usize].len
    }

    /// Length of the white list
    pub fn white_len(&self) -> usize {
        self.lists[ListId::White as usize].len
    }

    /// Sum of every live object's accounted size
    pub fn accounted_bytes(&self) -> usize {
        self.slots
            .iter()
            .filter_map(|slot| match slot {
                Slot::Occupied(entry) => Some(entry.header.size),
                Slot::Free { .. } => None,
            })
            .sum()
    }

    /// Whether allocating `size` more bytes would cross the budget
    pub fn should_collect(&self, size: usize) -> bool {
        self.bytes_alive + size >= self.budget
    }

    /// Double the budget after a collection that freed too little
    pub fn grow_budget(&mut self) {
        self.budget *= GROW_LIMIT_FACTOR;
    }

    /// Whether an object handle is live
    pub fn contains(&self, obj: ObjRef) -> bool {
        matches!(
            self.slots.get(obj.0 as usize),
            Some(Slot::Occupied(_))
        )
    }

    /// Borrow an object body
    pub fn get(&self, obj: ObjRef) -> &ObjBody {
        match &self.slots[obj.0 as usize] {
            Slot::Occupied(entry) => &entry.body,
            Slot::Free { .. } => panic!("dangling object handle {:?}", obj),
        }
    }

    /// Mutably borrow an object body
    pub fn get_mut(&mut self, obj: ObjRef) -> &mut ObjBody {
        match &mut self.slots[obj.0 as usize] {
            Slot::Occupied(entry) => &mut entry.body,
            Slot::Free { .. } => panic!("dangling object handle {:?}", obj),
        }
    }

    /// The color of an object
    pub fn color(&self, obj: ObjRef) -> Color {
        match &self.slots[obj.0 as usize] {
            Slot::Occupied(entry) => entry.header.color,
            Slot::Free { .. } => panic!("dangling object handle {:?}", obj),
        }
    }

    /// Interned string contents
    pub fn str_text(&self, obj: ObjRef) -> Option<Rc<str>> {
        match self.get(obj) {
            ObjBody::Str(body) => Some(body.text.clone()),
            _ => None,
        }
    }

    /// Allocate an object; every new object starts white
    pub fn alloc(&mut self, body: ObjBody) -> ObjRef {
        let size = Self::body_size(&body);
        let entry = Box::new(ObjEntry {
            header: ObjHeader {
                color: Color::White,
                list: ListId::White,
                prev: None,
                next: None,
                size,
            },
            body,
        });

        let index = match self.free_head {
            Some(index) => {
                self.free_head = match &self.slots[index as usize] {
                    Slot::Free { next } => *next,
                    Slot::Occupied(_) => unreachable!("free list points at live slot"),
                };
                self.slots[index as usize] = Slot::Occupied(entry);
                index
            }
            None => {
                self.slots.push(Slot::Occupied(entry));
                (self.slots.len() - 1) as u32
            }
        };

        self.bytes_alive += size;
        self.link(index, ListId::White);
        ObjRef(index)
    }

    /// Existing interned string for these contents, if any
    pub fn lookup_interned(&self, text: &str) -> Option<ObjRef> {
        self.interner.get(text).copied()
    }

    /// Approximate accounted size for a body about to be allocated
    pub(crate) fn size_hint(body: &ObjBody) -> usize {
        Self::body_size(body)
    }

    /// Intern-aware string allocation: equal contents share one object
    pub fn create_str(&mut self, text: &str, runtime: bool) -> ObjRef {
        if let Some(&existing) = self.interner.get(text) {
            return existing;
        }
        let shared: Rc<str> = Rc::from(text);
        let obj = self.alloc(ObjBody::Str(StrBody {
            text: shared.clone(),
            runtime,
        }));
        self.interner.insert(shared, obj);
        obj
    }

    /// Re-measure an object after a mutating operation and adjust the
    /// live-byte accounting; shrinking below half the budget halves it.
    pub fn remeasure(&mut self, obj: ObjRef) {
        let (old, new) = match &mut self.slots[obj.0 as usize] {
            Slot::Occupied(entry) => {
                let old = entry.header.size;
                let new = Self::body_size(&entry.body);
                entry.header.size = new;
                (old, new)
            }
            Slot::Free { .. } => panic!("dangling object handle {:?}", obj),
        };
        self.bytes_alive = self.bytes_alive - old + new;
        if new < old {
            self.maybe_shrink_budget();
        }
    }

    /// Run one full collection cycle; returns the number of bytes freed.
    ///
    /// `roots` are the values reachable from the machine (value stack);
    /// `modules` are the modules stack entries whose globals are also roots.
    pub fn collect(&mut self, roots: &[Value], modules: &[Rc<Module>]) -> usize {
        let before = self.bytes_alive;

        // Roots: recolor every white root gray
        for value in roots {
            if let Value::Obj(obj) = value {
                self.recolor_gray(*obj);
            }
        }
        for module in modules {
            for value in module.global_values() {
                if let Value::Obj(obj) = value {
                    self.recolor_gray(obj);
                }
            }
        }

        self.mark();
        self.sweep();
        self.normalize();

        self.gc_cycles += 1;
        self.maybe_shrink_budget();
        before - self.bytes_alive
    }

    // ===== Cycle phases =====

    fn recolor_gray(&mut self, obj: ObjRef) {
        if self.color(obj) != Color::White {
            return;
        }
        self.unlink(obj.0);
        match &mut self.slots[obj.0 as usize] {
            Slot::Occupied(entry) => entry.header.color = Color::Gray,
            Slot::Free { .. } => unreachable!(),
        }
        self.link(obj.0, ListId::Gray);
    }

    /// Drain the gray list, graying children and blackening scanned objects
    fn mark(&mut self) {
        let mut children = Vec::new();

        while let Some(index) = self.lists[ListId::Gray as usize].head {
            children.clear();
            let obj = ObjRef(index);

            match self.get(obj) {
                // Leaves: descriptor state is not GC-managed
                ObjBody::Str(_)
                | ObjBody::Proc(_)
                | ObjBody::Native(_)
                | ObjBody::NativeModule(_) => {}
                ObjBody::Array(values) | ObjBody::List(values) => {
                    children.extend(values.iter().filter_map(Value::as_obj));
                }
                ObjBody::Dict(entries) => {
                    for (key, value) in entries {
                        children.extend(key.0.as_obj());
                        children.extend(value.as_obj());
                    }
                }
                ObjBody::Record(record) => {
                    children.extend(record.attrs.values().filter_map(Value::as_obj));
                }
                ObjBody::NativeFn(body) => {
                    children.extend(body.target.as_obj());
                }
                ObjBody::Closure(closure) => {
                    // Linked captures alias stack slots already scanned as
                    // roots; closed captures are independent copies.
                    for out in &closure.outs {
                        if let OutValue::Closed { value, .. } = &*out.borrow() {
                            children.extend(value.as_obj());
                        }
                    }
                }
                ObjBody::Module(module) => {
                    children.extend(
                        module
                            .global_values()
                            .into_iter()
                            .filter_map(|v| v.as_obj()),
                    );
                }
            }

            for child in &children {
                self.recolor_gray(*child);
            }

            self.unlink(index);
            match &mut self.slots[index as usize] {
                Slot::Occupied(entry) => entry.header.color = Color::Black,
                Slot::Free { .. } => unreachable!(),
            }
            self.link(index, ListId::Black);
        }
    }

    /// Destroy every object still white
    fn sweep(&mut self) {
        let mut current = self.lists[ListId::White as usize].head;
        while let Some(index) = current {
            let next = match &self.slots[index as usize] {
                Slot::Occupied(entry) => entry.header.next,
                Slot::Free { .. } => unreachable!(),
            };
            self.free(index);
            current = next;
        }
        self.lists[ListId::White as usize] = ObjList::default();
    }

    /// Move the black list en masse back to white for the next cycle
    fn normalize(&mut self) {
        let mut current = self.lists[ListId::Black as usize].head;
        while let Some(index) = current {
            let next = match &mut self.slots[index as usize] {
                Slot::Occupied(entry) => {
                    entry.header.color = Color::White;
                    entry.header.list = ListId::White;
                    entry.header.next
                }
                Slot::Free { .. } => unreachable!(),
            };
            current = next;
        }
        self.lists[ListId::White as usize] = self.lists[ListId::Black as usize];
        self.lists[ListId::Black as usize] = ObjList::default();
    }

    /// Destroy a single object: kind destructor, accounting, slot reuse
    fn free(&mut self, index: u32) {
        let entry = match std::mem::replace(
            &mut self.slots[index as usize],
            Slot::Free {
                next: self.free_head,
            },
        ) {
            Slot::Occupied(entry) => entry,
            Slot::Free { .. } => unreachable!("double free of slot {}", index),
        };
        self.free_head = Some(index);
        self.bytes_alive -= entry.header.size;

        // The string destructor removes its intern entry; native resources
        // release through Drop below.
        if let ObjBody::Str(body) = &entry.body {
            self.interner.remove(&body.text);
        }

        drop(entry);
    }

    fn maybe_shrink_budget(&mut self) {
        while self.bytes_alive < self.budget / 2 && self.budget / 2 >= MIN_LIMIT {
            self.budget /= 2;
        }
    }

    // ===== Intrusive list maintenance =====

    fn link(&mut self, index: u32, list_id: ListId) {
        let tail = self.lists[list_id as usize].tail;
        match &mut self.slots[index as usize] {
            Slot::Occupied(entry) => {
                entry.header.list = list_id;
                entry.header.prev = tail;
                entry.header.next = None;
            }
            Slot::Free { .. } => unreachable!(),
        }
        let list = &mut self.lists[list_id as usize];
        match tail {
            Some(tail_index) => {
                list.tail = Some(index);
                match &mut self.slots[tail_index as usize] {
                    Slot::Occupied(entry) => entry.header.next = Some(index),
                    Slot::Free { .. } => unreachable!(),
                }
            }
            None => {
                list.head = Some(index);
                list.tail = Some(index);
            }
        }
        self.lists[list_id as usize].len += 1;
    }

    fn unlink(&mut self, index: u32) {
        let (list_id, prev, next) = match &mut self.slots[index as usize] {
            Slot::Occupied(entry) => {
                let triple = (entry.header.list, entry.header.prev, entry.header.next);
                entry.header.prev = None;
                entry.header.next = None;
                triple
            }
            Slot::Free { .. } => unreachable!(),
        };

        let list = &mut self.lists[list_id as usize];
        if list.head == Some(index) {
            list.head = next;
        }
        if list.tail == Some(index) {
            list.tail = prev;
        }
        list.len -= 1;

        if let Some(prev_index) = prev {
            match &mut self.slots[prev_index as usize] {
                Slot::Occupied(entry) => entry.header.next = next,
                Slot::Free { .. } => unreachable!(),
            }
        }
        if let Some(next_index) = next {
            match &mut self.slots[next_index as usize] {
                Slot::Occupied(entry) => entry.header.prev = prev,
                Slot::Free { .. } => unreachable!(),
            }
        }
    }

    /// Approximate owned size of an object, header included
    fn body_size(body: &ObjBody) -> usize {
        let base = std::mem::size_of::<ObjEntry>();
        base + match body {
            ObjBody::Str(s) => s.text.len(),
            ObjBody::Array(values) | ObjBody::List(values) => {
                values.len() * std::mem::size_of::<Value>()
            }
            ObjBody::Dict(entries) => entries.len() * 3 * std::mem::size_of::<Value>(),
            ObjBody::Record(record) => {
                record
                    .attrs
                    .iter()
                    .map(|(k, _)| k.len() + std::mem::size_of::<Value>())
                    .sum::<usize>()
            }
            ObjBody::Native(native) => match &native.data {
                NativeData::Bytes(bytes) => bytes.len(),
                _ => 64,
            },
            ObjBody::Closure(closure) => closure.outs.len() * 24,
            ObjBody::NativeFn(_)
            | ObjBody::Proc(_)
            | ObjBody::NativeModule(_)
            | ObjBody::Module(_) => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_roots() -> Vec<Value> {
        Vec::new()
    }

    #[test]
    fn test_intern_returns_same_object() {
        let mut heap = Heap::new();
        let a = heap.create_str("hello", false);
        let b = heap.create_str("hello", true);
        let c = heap.create_str("other", false);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_unreachable_objects_are_swept() {
        let mut heap = Heap::new();
        let kept = heap.create_str("kept", false);
        let _lost = heap.create_str("lost", false);
        assert_eq!(heap.object_count(), 2);

        let roots = vec![Value::Obj(kept)];
        let freed = heap.collect(&roots, &[]);

        assert!(freed > 0);
        assert_eq!(heap.object_count(), 1);
        assert!(heap.contains(kept));
        assert_eq!(heap.str_text(kept).unwrap().as_ref(), "kept");
    }

    #[test]
    fn test_sweep_removes_intern_entry() {
        let mut heap = Heap::new();
        let first = heap.create_str("transient", false);
        heap.collect(&empty_roots(), &[]);
        assert!(!heap.contains(first));

        // Re-interning after the sweep must produce a fresh object
        let second = heap.create_str("transient", false);
        assert!(heap.contains(second));
    }

    #[test]
    fn test_collection_traces_containers() {
        let mut heap = Heap::new();
        let inner = heap.create_str("inner", false);
        let list = heap.alloc(ObjBody::List(vec![Value::Obj(inner)]));
        let array = heap.alloc(ObjBody::Array(vec![Value::Obj(list)]));

        let roots = vec![Value::Obj(array)];
        heap.collect(&roots, &[]);

        assert!(heap.contains(array));
        assert!(heap.contains(list));
        assert!(heap.contains(inner));
    }

    #[test]
    fn test_collection_traces_cycles_without_looping() {
        let mut heap = Heap::new();
        let a = heap.alloc(ObjBody::List(Vec::new()));
        let b = heap.alloc(ObjBody::List(vec![Value::Obj(a)]));
        match heap.get_mut(a) {
            ObjBody::List(items) => items.push(Value::Obj(b)),
            _ => unreachable!(),
        }

        let roots = vec![Value::Obj(a)];
        heap.collect(&roots, &[]);
        assert!(heap.contains(a));
        assert!(heap.contains(b));

        // Dropping the root frees the whole cycle
        heap.collect(&empty_roots(), &[]);
        assert!(!heap.contains(a));
        assert!(!heap.contains(b));
    }

    #[test]
    fn test_no_gray_after_cycle_and_survivors_white() {
        let mut heap = Heap::new();
        let a = heap.create_str("a", false);
        let _b = heap.create_str("b", false);
        let roots = vec![Value::Obj(a)];
        heap.collect(&roots, &[]);

        assert_eq!(heap.gray_len(), 0);
        assert_eq!(heap.white_len(), heap.object_count());
        assert_eq!(heap.color(a), Color::White);
    }

    #[test]
    fn test_accounting_matches_sum_of_sizes() {
        let mut heap = Heap::new();
        let a = heap.create_str("some text", false);
        heap.alloc(ObjBody::Array(vec![Value::Int(1); 8]));
        assert_eq!(heap.bytes_alive(), heap.accounted_bytes());

        let roots = vec![Value::Obj(a)];
        heap.collect(&roots, &[]);
        assert_eq!(heap.bytes_alive(), heap.accounted_bytes());
    }

    #[test]
    fn test_slot_reuse_after_sweep() {
        let mut heap = Heap::new();
        let dead = heap.create_str("dead", false);
        heap.collect(&empty_roots(), &[]);
        let reused = heap.create_str("reused", false);
        // The freed slot index is recycled
        assert_eq!(dead.0, reused.0);
    }

    #[test]
    fn test_remeasure_tracks_growth() {
        let mut heap = Heap::new();
        let list = heap.alloc(ObjBody::List(Vec::new()));
        let before = heap.bytes_alive();
        match heap.get_mut(list) {
            ObjBody::List(items) => {
                for i in 0..32 {
                    items.push(Value::Int(i));
                }
            }
            _ => unreachable!(),
        }
        heap.remeasure(list);
        assert!(heap.bytes_alive() > before);
        assert_eq!(heap.bytes_alive(), heap.accounted_bytes());
    }

    #[test]
    fn test_record_attribute_set_freezes_after_population() {
        let mut body = RecordBody {
            attrs: HashMap::new(),
            declared: 2,
        };

        assert!(body.insert_attr("a".to_string(), Value::Int(1)).is_ok());
        assert!(!body.frozen());
        assert!(body.insert_attr("b".to_string(), Value::Int(2)).is_ok());
        assert!(body.frozen());

        // Frozen: no additions, updates only
        assert!(body.insert_attr("c".to_string(), Value::Int(3)).is_err());
        assert!(body.set_attr("a", Value::Int(10)).is_ok());
        assert!(body.set_attr("missing", Value::Int(0)).is_err());
        assert_eq!(body.attrs["a"], Value::Int(10));
    }

    #[test]
    fn test_closed_captures_keep_objects_alive() {
        let mut heap = Heap::new();
        let captured = heap.create_str("captured", false);
        let meta = Rc::new(MetaClosure {
            proc: Rc::new(crate::bytecode::Proc {
                name: "anonymous".to_string(),
                arity: 0,
                chunks: Vec::new(),
                iconsts: Vec::new(),
                fconsts: Vec::new(),
                locations: Vec::new(),
                module: std::rc::Weak::new(),
            }),
            captures: vec![0],
        });
        let closure = heap.alloc(ObjBody::Closure(Closure {
            meta,
            outs: vec![Rc::new(RefCell::new(OutValue::Closed {
                at: 0,
                value: Value::Obj(captured),
            }))],
        }));

        let roots = vec![Value::Obj(closure)];
        heap.collect(&roots, &[]);
        assert!(heap.contains(captured));
    }
}
