//! Expression compilation
//!
//! Every expression compiles to a stack-effect of exactly +1.

use super::scope::{ScopeKind, Symbol};
use super::Compiler;
use crate::ast::{BinaryOp, Expr, LogicalOp, Param, Stmt, UnaryOp};
use crate::bytecode::{MetaClosure, Opcode};
use crate::error::CompileError;
use crate::module::SubmoduleSym;
use crate::span::Span;
use std::rc::Rc;

impl<'ctx> Compiler<'ctx> {
    pub(super) fn compile_expr(&mut self, expr: &Expr) -> Result<(), CompileError> {
        match expr {
            Expr::Empty(span) => {
                self.write_chunk(Opcode::Empty);
                self.write_location(*span);
            }
            Expr::Bool(value, span) => {
                self.write_chunk(if *value { Opcode::True } else { Opcode::False });
                self.write_location(*span);
            }
            Expr::Int(value, span) => {
                if (0..=u8::MAX as i64).contains(value) {
                    self.write_chunk(Opcode::CInt);
                    self.write_location(*span);
                    self.write_byte(*value as u8);
                } else {
                    self.write_chunk(Opcode::Int);
                    self.write_location(*span);
                    self.write_iconst(*value)?;
                }
            }
            Expr::Float(value, span) => {
                self.write_chunk(Opcode::Float);
                self.write_location(*span);
                self.write_fconst(*value)?;
            }
            Expr::Str(text, span) => {
                self.write_chunk(Opcode::String);
                self.write_location(*span);
                self.write_str(text)?;
            }
            Expr::Template { parts, span } => {
                self.write_chunk(Opcode::Stte);
                self.write_location(*span);
                for part in parts {
                    self.compile_expr(part)?;
                    self.write_chunk(Opcode::Wtte);
                    self.write_location(*span);
                }
                self.write_chunk(Opcode::Ette);
                self.write_location(*span);
            }
            Expr::Ident(name, span) => self.compile_ident_get(name, *span)?,
            Expr::Group(inner) => self.compile_expr(inner)?,
            Expr::Call { callee, args, span } => self.compile_call(callee, args, *span)?,
            Expr::Access { target, name, span } => {
                self.compile_expr(target)?;
                self.write_chunk(Opcode::Access);
                self.write_location(*span);
                self.write_str(name)?;
            }
            Expr::Index { target, index, span } => {
                self.compile_expr(index)?;
                self.compile_expr(target)?;
                self.write_chunk(Opcode::Index);
                self.write_location(*span);
            }
            Expr::Unary { op, operand, span } => {
                self.compile_expr(operand)?;
                let opcode = match op {
                    UnaryOp::Neg => Opcode::NNot,
                    UnaryOp::Not => Opcode::Not,
                    UnaryOp::BitNot => Opcode::BNot,
                };
                self.write_chunk(opcode);
                self.write_location(*span);
            }
            Expr::Binary {
                op,
                left,
                right,
                span,
            } => {
                self.compile_expr(left)?;
                self.compile_expr(right)?;
                let opcode = match op {
                    BinaryOp::Add => Opcode::Add,
                    BinaryOp::Sub => Opcode::Sub,
                    // Replication is only knowable at compile time when a
                    // side is a string literal
                    BinaryOp::Mul => {
                        if matches!(left.as_ref(), Expr::Str(..))
                            || matches!(right.as_ref(), Expr::Str(..))
                        {
                            Opcode::MulStr
                        } else {
                            Opcode::Mul
                        }
                    }
                    BinaryOp::Div => Opcode::Div,
                    BinaryOp::Mod => Opcode::Mod,
                    BinaryOp::Concat => Opcode::Concat,
                    BinaryOp::Lt => Opcode::Lt,
                    BinaryOp::Gt => Opcode::Gt,
                    BinaryOp::Le => Opcode::Le,
                    BinaryOp::Ge => Opcode::Ge,
                    BinaryOp::Eq => Opcode::Eq,
                    BinaryOp::Ne => Opcode::Ne,
                    BinaryOp::Shl => Opcode::Lsh,
                    BinaryOp::Shr => Opcode::Rsh,
                    BinaryOp::BitAnd => Opcode::BAnd,
                    BinaryOp::BitXor => Opcode::BXor,
                    BinaryOp::BitOr => Opcode::BOr,
                };
                self.write_chunk(opcode);
                self.write_location(*span);
            }
            Expr::Logical {
                op,
                left,
                right,
                span,
            } => {
                self.compile_expr(left)?;
                let id = self.generate_id();
                let label = match op {
                    LogicalOp::Or => {
                        let label = format!("OR_END_{}", id);
                        self.or_jump(label.clone());
                        label
                    }
                    LogicalOp::And => {
                        let label = format!("AND_END_{}", id);
                        self.and_jump(label.clone());
                        label
                    }
                };
                self.write_location(*span);
                self.compile_expr(right)?;
                self.label(label)?;
            }
            Expr::Assign {
                target,
                op,
                value,
                span,
            } => self.compile_assign(target, *op, value, *span)?,
            Expr::Is { operand, tag, span } => {
                self.compile_expr(operand)?;
                self.write_chunk(Opcode::Is);
                self.write_location(*span);
                self.write_byte(tag.as_byte());
            }
            Expr::Anon { params, body, span } => self.compile_anon(params, body, *span)?,
            Expr::ArrayLiteral { items, span } => {
                if items.len() > u16::MAX as usize {
                    return Err(self.error(*span, "array literal has too many items"));
                }
                self.compile_expr(&Expr::Int(items.len() as i64, *span))?;
                self.write_chunk(Opcode::Array);
                self.write_location(*span);
                for (index, item) in items.iter().enumerate() {
                    self.compile_expr(item)?;
                    self.write_chunk(Opcode::IArray);
                    self.write_location(*span);
                    self.write_i16(index as i16);
                }
            }
            Expr::ArrayNew { len, span } => {
                self.compile_expr(len)?;
                self.write_chunk(Opcode::Array);
                self.write_location(*span);
            }
            Expr::ListLiteral { items, span } => {
                self.write_chunk(Opcode::List);
                self.write_location(*span);
                for item in items {
                    self.compile_expr(item)?;
                    self.write_chunk(Opcode::IList);
                    self.write_location(*span);
                }
            }
            Expr::DictLiteral { entries, span } => {
                self.write_chunk(Opcode::Dict);
                self.write_location(*span);
                for (key, value) in entries {
                    self.compile_expr(key)?;
                    self.compile_expr(value)?;
                    self.write_chunk(Opcode::IDict);
                    self.write_location(*span);
                }
            }
            Expr::RecordLiteral { fields, span } => {
                if fields.len() > u16::MAX as usize {
                    return Err(self.error(*span, "record literal has too many attributes"));
                }
                self.write_chunk(Opcode::Record);
                self.write_location(*span);
                self.write_i16(fields.len() as i16);
                for (name, value) in fields {
                    self.compile_expr(value)?;
                    self.write_chunk(Opcode::IRecord);
                    self.write_location(*span);
                    self.write_str(name)?;
                }
            }
        }

        Ok(())
    }

    /// Identifier read: local, captured local (one hop), global, procedure,
    /// module, or native function
    fn compile_ident_get(&mut self, name: &str, span: Span) -> Result<(), CompileError> {
        let symbol = self
            .scopes
            .lookup(name)
            .ok_or_else(|| self.error(span, format!("symbol '{}' does not exist", name)))?;

        match symbol {
            Symbol::Local {
                offset, fn_depth, ..
            } => {
                let current_depth = self.scopes.fn_depth();
                if current_depth > fn_depth {
                    let hops = current_depth - fn_depth;
                    if hops > 1 {
                        return Err(self.error(
                            span,
                            "cannot capture locals with more than one jump",
                        ));
                    }
                    self.unit().capture(name, offset);
                    self.write_chunk(Opcode::OGet);
                    self.write_location(span);
                    self.write_byte(offset);
                } else {
                    self.write_chunk(Opcode::LGet);
                    self.write_location(span);
                    self.write_byte(offset);
                }
            }
            Symbol::Global { .. } | Symbol::Proc { .. } | Symbol::Module => {
                self.write_chunk(Opcode::GGet);
                self.write_location(span);
                self.write_str(name)?;
            }
            Symbol::NativeFn { .. } => {
                self.write_chunk(Opcode::NGet);
                self.write_location(span);
                self.write_str(name)?;
            }
        }

        Ok(())
    }

    fn compile_call(
        &mut self,
        callee: &Expr,
        args: &[Expr],
        span: Span,
    ) -> Result<(), CompileError> {
        if args.len() > u8::MAX as usize {
            return Err(self.error(span, "too many call arguments"));
        }

        // Arity check against symbols known at compile time
        if let Expr::Ident(name, ident_span) = callee {
            match self.scopes.lookup(name) {
                Some(Symbol::Proc { arity }) if arity as usize != args.len() => {
                    return Err(self.error(
                        *ident_span,
                        format!(
                            "procedure '{}' declares {} parameter(s), but got {} argument(s)",
                            name,
                            arity,
                            args.len()
                        ),
                    ));
                }
                Some(Symbol::NativeFn { arity }) if arity as usize != args.len() => {
                    return Err(self.error(
                        *ident_span,
                        format!(
                            "native procedure '{}' declares {} parameter(s), but got {} argument(s)",
                            name,
                            arity,
                            args.len()
                        ),
                    ));
                }
                _ => {}
            }
        }

        self.compile_expr(callee)?;
        for arg in args {
            self.compile_expr(arg)?;
        }
        self.write_chunk(Opcode::Call);
        self.write_location(span);
        self.write_byte(args.len() as u8);

        Ok(())
    }

    fn compile_assign(
        &mut self,
        target: &Expr,
        op: Option<BinaryOp>,
        value: &Expr,
        span: Span,
    ) -> Result<(), CompileError> {
        // Module values never flow into variables
        if let Expr::Ident(value_name, value_span) = value {
            if matches!(self.scopes.lookup(value_name), Some(Symbol::Module)) {
                return Err(self.error(*value_span, "cannot assign modules to variables"));
            }
        }

        match target {
            Expr::Ident(name, ident_span) => {
                let symbol = self.scopes.lookup(name).ok_or_else(|| {
                    self.error(*ident_span, format!("symbol '{}' does not exist", name))
                })?;

                match symbol {
                    Symbol::Local {
                        offset,
                        mutable,
                        initialized,
                        fn_depth,
                    } => {
                        if !mutable && initialized {
                            return Err(self.error(
                                span,
                                format!(
                                    "local symbol '{}' declared as immutable and already initialized",
                                    name
                                ),
                            ));
                        }

                        let hops = self.scopes.fn_depth().saturating_sub(fn_depth);
                        if hops > 1 {
                            return Err(self.error(
                                span,
                                "cannot capture locals with more than one jump",
                            ));
                        }

                        if let Some(binary) = op {
                            // Desugar: get, value, op, set
                            if hops == 1 {
                                self.unit().capture(name, offset);
                                self.write_chunk(Opcode::OGet);
                            } else {
                                self.write_chunk(Opcode::LGet);
                            }
                            self.write_location(*ident_span);
                            self.write_byte(offset);
                            self.compile_expr(value)?;
                            self.write_binary_op(binary, span);
                        } else {
                            self.compile_expr(value)?;
                        }

                        if hops == 1 {
                            self.unit().capture(name, offset);
                            self.write_chunk(Opcode::OSet);
                        } else {
                            self.write_chunk(Opcode::LSet);
                        }
                        self.write_location(span);
                        self.write_byte(offset);

                        self.scopes.mark_local_initialized(name);
                    }
                    Symbol::Global { mutable } => {
                        if !mutable {
                            return Err(self.error(
                                span,
                                format!("global variable '{}' declared as immutable", name),
                            ));
                        }

                        if let Some(binary) = op {
                            self.write_chunk(Opcode::GGet);
                            self.write_location(*ident_span);
                            self.write_str(name)?;
                            self.compile_expr(value)?;
                            self.write_binary_op(binary, span);
                        } else {
                            self.compile_expr(value)?;
                        }

                        self.write_chunk(Opcode::GSet);
                        self.write_location(span);
                        self.write_str(name)?;
                    }
                    Symbol::Proc { .. } => {
                        return Err(
                            self.error(span, "procedure names cannot be re-assigned")
                        );
                    }
                    Symbol::Module => {
                        return Err(self.error(span, "module names cannot be re-assigned"));
                    }
                    Symbol::NativeFn { .. } => {
                        return Err(self.error(span, "illegal assignment target"));
                    }
                }
            }
            Expr::Index { target: indexable, index, span: index_span } => {
                if let Some(binary) = op {
                    self.compile_expr(target)?;
                    self.compile_expr(value)?;
                    self.write_binary_op(binary, span);
                } else {
                    self.compile_expr(value)?;
                }
                self.compile_expr(index)?;
                self.compile_expr(indexable)?;
                self.write_chunk(Opcode::ASet);
                self.write_location(*index_span);
            }
            Expr::Access { target: record, name, span: access_span } => {
                if let Some(binary) = op {
                    self.compile_expr(target)?;
                    self.compile_expr(value)?;
                    self.write_binary_op(binary, span);
                } else {
                    self.compile_expr(value)?;
                }
                self.compile_expr(record)?;
                self.write_chunk(Opcode::RSet);
                self.write_location(*access_span);
                self.write_str(name)?;
            }
            _ => return Err(self.error(span, "illegal assignment target")),
        }

        Ok(())
    }

    fn write_binary_op(&mut self, op: BinaryOp, span: Span) {
        let opcode = match op {
            BinaryOp::Add => Opcode::Add,
            BinaryOp::Sub => Opcode::Sub,
            BinaryOp::Mul => Opcode::Mul,
            BinaryOp::Div => Opcode::Div,
            _ => Opcode::Add,
        };
        self.write_chunk(opcode);
        self.write_location(span);
    }

    /// Anonymous function: compile a nested unit and emit `SGET` of the
    /// resulting function or closure symbol
    fn compile_anon(
        &mut self,
        params: &[Param],
        body: &[Stmt],
        span: Span,
    ) -> Result<(), CompileError> {
        if params.len() > u8::MAX as usize {
            return Err(self.error(span, "too many parameters"));
        }

        self.scopes.push(ScopeKind::Function);
        self.push_unit("anonymous", params.len() as u8);

        for param in params {
            self.scopes
                .define_local(&param.name, true, true)
                .map_err(|msg| self.error(param.span, msg))?;
        }

        let must_return = self.compile_fn_body(body, span)?;
        if must_return {
            self.write_chunk(Opcode::Empty);
            self.write_chunk(Opcode::Ret);
        }

        let captured = std::mem::take(&mut self.unit().captured);
        let proc = Rc::new(self.pop_unit()?);
        self.scopes.pop();

        let symbol = if captured.is_empty() {
            SubmoduleSym::Proc(proc)
        } else {
            SubmoduleSym::Closure(Rc::new(MetaClosure {
                proc,
                captures: captured.into_iter().map(|(_, offset)| offset).collect(),
            }))
        };
        let index = self.module.add_symbol(symbol);

        self.write_chunk(Opcode::SGet);
        self.write_location(span);
        self.unit().write_u32(index as u32);

        Ok(())
    }
}
