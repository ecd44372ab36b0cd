//! The `io` native module
//!
//! Files are native objects; the handle closes when `close` is called or
//! when the object is swept.

use super::{arg_int, arg_str, NativeFn, NativeModule, NativeSym};
use crate::error::RuntimeError;
use crate::heap::{NativeBody, NativeData, ObjBody};
use crate::value::Value;
use crate::vm::Vm;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::rc::Rc;

pub fn build() -> Rc<NativeModule> {
    NativeModule::new(
        "io",
        vec![
            ("open", NativeSym::Fn(NativeFn::new("open", 2, io_open))),
            ("close", NativeSym::Fn(NativeFn::new("close", 1, io_close))),
            (
                "is_closed",
                NativeSym::Fn(NativeFn::new("is_closed", 1, io_is_closed)),
            ),
            ("len", NativeSym::Fn(NativeFn::new("len", 1, io_len))),
            ("pos", NativeSym::Fn(NativeFn::new("pos", 1, io_pos))),
            (
                "read_byte",
                NativeSym::Fn(NativeFn::new("read_byte", 1, io_read_byte)),
            ),
            (
                "read_bytes",
                NativeSym::Fn(NativeFn::new("read_bytes", 2, io_read_bytes)),
            ),
            (
                "read_all",
                NativeSym::Fn(NativeFn::new("read_all", 1, io_read_all)),
            ),
            (
                "write_str",
                NativeSym::Fn(NativeFn::new("write_str", 2, io_write_str)),
            ),
            ("path", NativeSym::Fn(NativeFn::new("path", 1, io_path))),
            ("mode", NativeSym::Fn(NativeFn::new("mode", 1, io_mode))),
        ],
    )
}

enum FileField<'vm> {
    Handle(&'vm mut Option<File>),
    Path(&'vm str),
    Mode(&'vm str),
}

fn file_field<'vm>(
    vm: &'vm mut Vm,
    value: Value,
    pick: u8,
) -> Result<FileField<'vm>, RuntimeError> {
    let err = vm.rt_error("expect file as argument".to_string());
    let Some(obj) = value.as_obj() else {
        return Err(err);
    };
    match vm.heap.get_mut(obj) {
        ObjBody::Native(NativeBody {
            data: NativeData::File { file, path, mode },
            ..
        }) => Ok(match pick {
            0 => FileField::Handle(file),
            1 => FileField::Path(path),
            _ => FileField::Mode(mode),
        }),
        _ => Err(err),
    }
}

fn file_handle<'vm>(
    vm: &'vm mut Vm,
    value: Value,
) -> Result<&'vm mut Option<File>, RuntimeError> {
    match file_field(vm, value, 0)? {
        FileField::Handle(handle) => Ok(handle),
        _ => unreachable!(),
    }
}

fn open_handle<'vm>(vm: &'vm mut Vm, value: Value) -> Result<&'vm mut File, RuntimeError> {
    let closed_err = vm.rt_error("file is closed".to_string());
    file_handle(vm, value)?.as_mut().ok_or(closed_err)
}

fn io_open(args: &[Value], _target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    let path = arg_str(vm, args, 0, "file path")?;
    let mode = arg_str(vm, args, 1, "file mode")?;

    let mut options = OpenOptions::new();
    match mode.as_ref() {
        "r" => options.read(true),
        "w" => options.write(true).create(true).truncate(true),
        "a" => options.append(true).create(true),
        "rw" => options.read(true).write(true).create(true),
        other => {
            return Err(vm.rt_error(format!("unknown file mode '{}'", other)));
        }
    };

    let file = options
        .open(path.as_ref())
        .map_err(|e| vm.rt_error(format!("failed to open '{}': {}", path, e)))?;

    let obj = vm.alloc(ObjBody::Native(NativeBody {
        name: "file",
        data: NativeData::File {
            file: Some(file),
            path: path.to_string(),
            mode: mode.to_string(),
        },
    }))?;
    Ok(Value::Obj(obj))
}

fn io_close(args: &[Value], _target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    let handle = file_handle(vm, args[0])?;
    *handle = None;
    Ok(Value::Empty)
}

fn io_is_closed(args: &[Value], _target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    let handle = file_handle(vm, args[0])?;
    Ok(Value::Bool(handle.is_none()))
}

fn io_len(args: &[Value], _target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    let file = open_handle(vm, args[0])?;
    let len = file
        .metadata()
        .map(|m| m.len() as i64)
        .map_err(|e| RuntimeError::Raised {
            msg: format!("failed to stat file: {}", e),
            trace: Vec::new(),
        })?;
    Ok(Value::Int(len))
}

fn io_pos(args: &[Value], _target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    let file = open_handle(vm, args[0])?;
    let pos = file
        .stream_position()
        .map_err(|e| RuntimeError::Raised {
            msg: format!("failed to query file position: {}", e),
            trace: Vec::new(),
        })?;
    Ok(Value::Int(pos as i64))
}

fn io_read_byte(args: &[Value], _target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    let file = open_handle(vm, args[0])?;
    let mut byte = [0u8; 1];
    match file.read(&mut byte) {
        Ok(0) => Ok(Value::Int(-1)),
        Ok(_) => Ok(Value::Int(byte[0] as i64)),
        Err(e) => Err(RuntimeError::Raised {
            msg: format!("failed to read file: {}", e),
            trace: Vec::new(),
        }),
    }
}

fn io_read_bytes(args: &[Value], _target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    let count = arg_int(vm, args, 1, "byte count")?;
    if count < 0 {
        return Err(vm.rt_error("expect a non-negative byte count".to_string()));
    }

    let file = open_handle(vm, args[0])?;
    let mut bytes = vec![0u8; count as usize];
    let read = file.read(&mut bytes).map_err(|e| RuntimeError::Raised {
        msg: format!("failed to read file: {}", e),
        trace: Vec::new(),
    })?;
    bytes.truncate(read);

    let obj = vm.alloc(ObjBody::Native(NativeBody {
        name: "nbarray",
        data: NativeData::Bytes(bytes),
    }))?;
    Ok(Value::Obj(obj))
}

fn io_read_all(args: &[Value], _target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    let file = open_handle(vm, args[0])?;
    let mut text = String::new();
    file.seek(SeekFrom::Start(0)).ok();
    file.read_to_string(&mut text)
        .map_err(|e| RuntimeError::Raised {
            msg: format!("failed to read file: {}", e),
            trace: Vec::new(),
        })?;
    vm.alloc_str(&text)
}

fn io_write_str(args: &[Value], _target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    let text = arg_str(vm, args, 1, "text")?;
    let file = open_handle(vm, args[0])?;
    let written = file
        .write(text.as_bytes())
        .map_err(|e| RuntimeError::Raised {
            msg: format!("failed to write file: {}", e),
            trace: Vec::new(),
        })?;
    Ok(Value::Int(written as i64))
}

fn io_path(args: &[Value], _target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    let path = match file_field(vm, args[0], 1)? {
        FileField::Path(path) => path.to_string(),
        _ => unreachable!(),
    };
    vm.alloc_str(&path)
}

fn io_mode(args: &[Value], _target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    let mode = match file_field(vm, args[0], 2)? {
        FileField::Mode(mode) => mode.to_string(),
        _ => unreachable!(),
    };
    vm.alloc_str(&mode)
}
