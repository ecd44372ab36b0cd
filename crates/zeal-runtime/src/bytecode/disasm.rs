//! Bytecode disassembler
//!
//! Renders a function's chunk stream in a human-readable listing, one
//! instruction per line: offset, mnemonic, decoded operands.

use super::{Opcode, Proc};

/// Disassemble a single function
pub fn disassemble(proc: &Proc) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "== {} (arity {}, {} bytes) ==\n",
        proc.name,
        proc.arity,
        proc.chunks.len()
    ));

    let mut offset = 0usize;
    while offset < proc.chunks.len() {
        offset = disassemble_instruction(proc, offset, &mut out);
    }

    out
}

fn disassemble_instruction(proc: &Proc, offset: usize, out: &mut String) -> usize {
    out.push_str(&format!("{:04} ", offset));

    let byte = proc.chunks[offset];
    let opcode = match Opcode::from_byte(byte) {
        Some(opcode) => opcode,
        None => {
            out.push_str(&format!("??? (0x{:02x})\n", byte));
            return offset + 1;
        }
    };

    let mut cursor = offset + 1;
    match opcode {
        Opcode::CInt => {
            let value = read_u8(proc, &mut cursor);
            out.push_str(&format!("CINT {}", value));
        }
        Opcode::Int => {
            let index = read_u16(proc, &mut cursor);
            let value = proc.iconsts.get(index as usize).copied().unwrap_or(0);
            out.push_str(&format!("INT {} ({})", index, value));
        }
        Opcode::Float => {
            let index = read_u16(proc, &mut cursor);
            let value = proc.fconsts.get(index as usize).copied().unwrap_or(0.0);
            out.push_str(&format!("FLOAT {} ({})", index, value));
        }
        Opcode::String
        | Opcode::IRecord
        | Opcode::GDef
        | Opcode::GSet
        | Opcode::GGet
        | Opcode::NGet
        | Opcode::Access
        | Opcode::RSet => {
            let index = read_u16(proc, &mut cursor);
            let text = proc
                .module()
                .and_then(|m| m.static_str(index as usize))
                .map(|s| s.to_string())
                .unwrap_or_default();
            out.push_str(&format!("{} {} ('{}')", mnemonic(opcode), index, text));
        }
        Opcode::GASet => {
            let index = read_u16(proc, &mut cursor);
            let access = read_u8(proc, &mut cursor);
            let text = proc
                .module()
                .and_then(|m| m.static_str(index as usize))
                .map(|s| s.to_string())
                .unwrap_or_default();
            out.push_str(&format!("GASET {} ('{}') {}", index, text, access));
        }
        Opcode::Record | Opcode::IArray | Opcode::TryOpen => {
            let value = read_u16(proc, &mut cursor);
            out.push_str(&format!("{} {}", mnemonic(opcode), value));
        }
        Opcode::Jmp | Opcode::Jif | Opcode::Jit | Opcode::Or | Opcode::And => {
            let delta = read_u16(proc, &mut cursor) as i16;
            let target = cursor as i64 + delta as i64;
            out.push_str(&format!("{} {} (-> {})", mnemonic(opcode), delta, target));
        }
        Opcode::LSet | Opcode::LGet | Opcode::OSet | Opcode::OGet | Opcode::Call => {
            let value = read_u8(proc, &mut cursor);
            out.push_str(&format!("{} {}", mnemonic(opcode), value));
        }
        Opcode::Is | Opcode::Throw => {
            let value = read_u8(proc, &mut cursor);
            out.push_str(&format!("{} {}", mnemonic(opcode), value));
        }
        Opcode::SGet => {
            let index = read_u32(proc, &mut cursor) as i32;
            out.push_str(&format!("SGET {}", index));
        }
        _ => out.push_str(mnemonic(opcode)),
    }

    out.push('\n');
    cursor
}

fn mnemonic(opcode: Opcode) -> &'static str {
    match opcode {
        Opcode::Empty => "EMPTY",
        Opcode::False => "FALSE",
        Opcode::True => "TRUE",
        Opcode::CInt => "CINT",
        Opcode::Int => "INT",
        Opcode::Float => "FLOAT",
        Opcode::String => "STRING",
        Opcode::Stte => "STTE",
        Opcode::Wtte => "WTTE",
        Opcode::Ette => "ETTE",
        Opcode::Array => "ARRAY",
        Opcode::List => "LIST",
        Opcode::Dict => "DICT",
        Opcode::Record => "RECORD",
        Opcode::IArray => "IARRAY",
        Opcode::IList => "ILIST",
        Opcode::IDict => "IDICT",
        Opcode::IRecord => "IRECORD",
        Opcode::Concat => "CONCAT",
        Opcode::MulStr => "MULSTR",
        Opcode::Add => "ADD",
        Opcode::Sub => "SUB",
        Opcode::Mul => "MUL",
        Opcode::Div => "DIV",
        Opcode::Mod => "MOD",
        Opcode::BNot => "BNOT",
        Opcode::Lsh => "LSH",
        Opcode::Rsh => "RSH",
        Opcode::BAnd => "BAND",
        Opcode::BXor => "BXOR",
        Opcode::BOr => "BOR",
        Opcode::Lt => "LT",
        Opcode::Gt => "GT",
        Opcode::Le => "LE",
        Opcode::Ge => "GE",
        Opcode::Eq => "EQ",
        Opcode::Ne => "NE",
        Opcode::Or => "OR",
        Opcode::And => "AND",
        Opcode::Not => "NOT",
        Opcode::NNot => "NNOT",
        Opcode::LSet => "LSET",
        Opcode::LGet => "LGET",
        Opcode::OSet => "OSET",
        Opcode::OGet => "OGET",
        Opcode::GDef => "GDEF",
        Opcode::GASet => "GASET",
        Opcode::GSet => "GSET",
        Opcode::GGet => "GGET",
        Opcode::NGet => "NGET",
        Opcode::SGet => "SGET",
        Opcode::ASet => "ASET",
        Opcode::RSet => "RSET",
        Opcode::Pop => "POP",
        Opcode::Jmp => "JMP",
        Opcode::Jif => "JIF",
        Opcode::Jit => "JIT",
        Opcode::Call => "CALL",
        Opcode::Access => "ACCESS",
        Opcode::Index => "INDEX",
        Opcode::Ret => "RET",
        Opcode::Is => "IS",
        Opcode::TryOpen => "TRY_OPEN",
        Opcode::TryClose => "TRY_CLOSE",
        Opcode::Throw => "THROW",
        Opcode::Hlt => "HLT",
    }
}

fn read_u8(proc: &Proc, cursor: &mut usize) -> u8 {
    let value = proc.chunks.get(*cursor).copied().unwrap_or(0);
    *cursor += 1;
    value
}

fn read_u16(proc: &Proc, cursor: &mut usize) -> u16 {
    let high = read_u8(proc, cursor) as u16;
    let low = read_u8(proc, cursor) as u16;
    (high << 8) | low
}

fn read_u32(proc: &Proc, cursor: &mut usize) -> u32 {
    let high = read_u16(proc, cursor) as u32;
    let low = read_u16(proc, cursor) as u32;
    (high << 16) | low
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Weak;

    #[test]
    fn test_disassemble_simple_stream() {
        let proc = Proc {
            name: "main".to_string(),
            arity: 0,
            // CINT 2, CINT 3, ADD, POP
            chunks: vec![
                Opcode::CInt as u8,
                2,
                Opcode::CInt as u8,
                3,
                Opcode::Add as u8,
                Opcode::Pop as u8,
            ],
            iconsts: Vec::new(),
            fconsts: Vec::new(),
            locations: Vec::new(),
            module: Weak::new(),
        };
        let listing = disassemble(&proc);
        assert!(listing.contains("0000 CINT 2"));
        assert!(listing.contains("0002 CINT 3"));
        assert!(listing.contains("0004 ADD"));
        assert!(listing.contains("0005 POP"));
    }

    #[test]
    fn test_disassemble_jump_target() {
        let proc = Proc {
            name: "main".to_string(),
            arity: 0,
            // JMP +1 (lands on HLT), POP, HLT
            chunks: vec![
                Opcode::Jmp as u8,
                0,
                1,
                Opcode::Pop as u8,
                Opcode::Hlt as u8,
            ],
            iconsts: Vec::new(),
            fconsts: Vec::new(),
            locations: Vec::new(),
            module: Weak::new(),
        };
        let listing = disassemble(&proc);
        assert!(listing.contains("JMP 1 (-> 4)"));
    }
}
