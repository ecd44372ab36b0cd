//! Statement compilation

use super::scope::{ScopeKind, Symbol};
use super::unit::{Block, Loop};
use super::Compiler;
use crate::ast::{Expr, ForDirection, IfBranch, Param, Stmt};
use crate::bytecode::Opcode;
use crate::error::CompileError;
use crate::module::Predefined;
use crate::span::Span;
use std::rc::Rc;

impl<'ctx> Compiler<'ctx> {
    pub(super) fn compile_stmt(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        match stmt {
            Stmt::Expr(expr) => {
                self.compile_expr(expr)?;
                self.write_chunk(Opcode::Pop);
            }
            Stmt::VarDecl {
                mutable,
                name,
                init,
                span,
            } => self.compile_var_decl(*mutable, name, init.as_ref(), *span)?,
            Stmt::Block { stmts, span } => {
                self.scopes.push(ScopeKind::Block);
                self.compile_block_stmts(stmts, *span)?;
                self.pop_scope_locals();
                self.scopes.propagate_return();
                self.scopes.pop();
            }
            Stmt::If {
                branches,
                else_body,
                span,
            } => self.compile_if(branches, else_body.as_deref(), *span)?,
            Stmt::While {
                condition,
                body,
                span,
            } => self.compile_while(condition, body, *span)?,
            Stmt::ForRange {
                var,
                init,
                direction,
                bound,
                body,
                span,
            } => self.compile_for_range(var, init.as_ref(), *direction, bound, body, *span)?,
            Stmt::Stop(span) => self.compile_stop(*span)?,
            Stmt::Continue(span) => self.compile_continue(*span)?,
            Stmt::Ret { value, span } => self.compile_ret(value.as_ref(), *span)?,
            Stmt::Proc {
                name,
                params,
                body,
                span,
            } => self.compile_proc(name, params, body, *span)?,
            Stmt::Throw { value, span } => {
                if self.scopes.is_global_scope() {
                    return Err(
                        self.error(*span, "cannot use throw statements in global scope")
                    );
                }
                let has_value = value.is_some();
                if let Some(value) = value {
                    self.compile_expr(value)?;
                }
                self.write_chunk(Opcode::Throw);
                self.write_location(*span);
                self.write_byte(has_value as u8);
            }
            Stmt::Try {
                body,
                binding,
                catch_body,
                span,
            } => self.compile_try(body, binding.as_deref(), catch_body, *span)?,
            Stmt::Import { names, alias, span } => {
                self.compile_import(names, alias.as_deref(), *span)?;
            }
            Stmt::Export { names, span } => {
                if !self.scopes.is_global_scope() {
                    return Err(
                        self.error(*span, "export statements only allowed in global scope")
                    );
                }
                for (name, name_span) in names {
                    self.write_chunk(Opcode::GASet);
                    self.write_location(*name_span);
                    self.write_str(name)?;
                    self.write_byte(1);
                }
            }
        }

        Ok(())
    }

    fn compile_var_decl(
        &mut self,
        mutable: bool,
        name: &str,
        init: Option<&Expr>,
        span: Span,
    ) -> Result<(), CompileError> {
        if self.scopes.exists_proc(name) {
            return Err(self.error(span, "cannot shadow procedures name"));
        }

        match init {
            Some(init) => self.compile_expr(init)?,
            None => {
                self.write_chunk(Opcode::Empty);
                self.write_location(span);
            }
        }

        if self.scopes.is_global_scope() {
            if !mutable && init.is_none() {
                return Err(self.error(
                    span,
                    "immutable global variables must be initialized in declaration place",
                ));
            }

            self.scopes
                .define_global(name, mutable)
                .map_err(|msg| self.error(span, msg))?;

            self.write_chunk(Opcode::GDef);
            self.write_location(span);
            self.write_str(name)?;
        } else {
            // The initializer value on the stack becomes the local's slot
            self.scopes
                .define_local(name, mutable, init.is_some())
                .map_err(|msg| self.error(span, msg))?;
        }

        Ok(())
    }

    fn compile_if(
        &mut self,
        branches: &[IfBranch],
        else_body: Option<&[Stmt]>,
        span: Span,
    ) -> Result<(), CompileError> {
        let id = self.generate_id();
        let total = branches.len() + usize::from(else_body.is_some());
        let mut returns = 0usize;

        for (which, branch) in branches.iter().enumerate() {
            let kind = if which == 0 {
                ScopeKind::If
            } else {
                ScopeKind::Elif
            };
            if self.compile_if_branch(branch, kind, id, which)? {
                returns += 1;
            }
        }

        if let Some(else_stmts) = else_body {
            self.scopes.push(ScopeKind::Else);
            self.compile_block_stmts(else_stmts, span)?;
            if self.scopes.current_returned() {
                returns += 1;
            }
            self.pop_scope_locals();
            self.scopes.pop();
        }

        // Dead-code detection: the statement as a whole returns only when
        // every branch (including else) returns
        if else_body.is_some() && returns == total {
            self.scopes.set_returned();
        }

        self.label(format!(".IF({})_END", id))?;

        Ok(())
    }

    fn compile_if_branch(
        &mut self,
        branch: &IfBranch,
        kind: ScopeKind,
        id: i32,
        which: usize,
    ) -> Result<bool, CompileError> {
        self.compile_expr(&branch.condition)?;
        self.jif(format!(".IFB({})_END_{}", id, which));
        self.write_location(branch.span);

        self.scopes.push(kind);
        self.compile_block_stmts(&branch.body, branch.span)?;
        self.pop_scope_locals();

        self.jmp(format!(".IF({})_END", id));
        self.label(format!(".IFB({})_END_{}", id, which))?;

        let returned = self.scopes.current_returned();
        self.scopes.pop();

        Ok(returned)
    }

    fn compile_while(
        &mut self,
        condition: &Expr,
        body: &[Stmt],
        span: Span,
    ) -> Result<(), CompileError> {
        let id = self.generate_id();

        self.label(format!(".WHILE({})_TEST", id))?;
        self.compile_expr(condition)?;
        self.jif(format!(".WHILE({})_END", id));
        self.write_location(span);

        self.scopes.push(ScopeKind::While);
        self.unit().loops.push(Loop { id, is_for: false });

        self.compile_block_stmts(body, span)?;
        self.pop_scope_locals();

        self.jmp(format!(".WHILE({})_TEST", id));
        self.label(format!(".WHILE({})_END", id))?;

        self.unit().loops.pop();
        self.scopes.pop();

        Ok(())
    }

    fn compile_for_range(
        &mut self,
        var: &str,
        init: Option<&Expr>,
        direction: ForDirection,
        bound: &Expr,
        body: &[Stmt],
        span: Span,
    ) -> Result<(), CompileError> {
        let id = self.generate_id();

        // Outer block scope holds the induction variable
        self.scopes.push(ScopeKind::Block);
        let offset = self
            .scopes
            .define_local(var, false, true)
            .map_err(|msg| self.error(span, msg))?;

        self.scopes.push(ScopeKind::For);
        self.unit().loops.push(Loop { id, is_for: true });

        // Initialization: the value becomes the induction variable's slot
        match init {
            Some(init) => self.compile_expr(init)?,
            None => self.compile_expr(&Expr::Int(0, span))?,
        }

        // Test section
        self.label(format!(".FOR({})_TEST", id))?;
        self.write_chunk(Opcode::LGet);
        self.write_location(span);
        self.write_byte(offset);
        self.compile_expr(bound)?;
        match direction {
            ForDirection::Upto => self.write_chunk(Opcode::Ge),
            ForDirection::Downto => self.write_chunk(Opcode::Lt),
        };
        self.write_location(span);
        self.jit(format!(".FOR_RANGE({})_END", id));

        self.compile_block_stmts(body, span)?;
        self.pop_scope_locals();

        // Increment section; `continue` lands here
        self.label(format!(".FOR({})_STEP", id))?;
        self.write_chunk(Opcode::LGet);
        self.write_location(span);
        self.write_byte(offset);
        self.write_chunk(Opcode::CInt);
        self.write_location(span);
        self.write_byte(1);
        match direction {
            ForDirection::Upto => self.write_chunk(Opcode::Add),
            ForDirection::Downto => self.write_chunk(Opcode::Sub),
        };
        self.write_location(span);
        self.write_chunk(Opcode::LSet);
        self.write_location(span);
        self.write_byte(offset);
        self.write_chunk(Opcode::Pop);

        self.jmp(format!(".FOR({})_TEST", id));

        // `stop` lands here
        self.label(format!(".FOR({})_END", id))?;

        self.unit().loops.pop();
        self.scopes.pop();

        // End of the whole statement: drop the induction variable
        self.label(format!(".FOR_RANGE({})_END", id))?;
        self.pop_scope_locals();
        self.scopes.pop();

        Ok(())
    }

    fn compile_stop(&mut self, span: Span) -> Result<(), CompileError> {
        let Some(locals) = self.scopes.locals_down_to_loop() else {
            return Err(self.error(span, "stop statements only allowed in while and for loops"));
        };
        let current_loop = *self
            .unit()
            .loops
            .last()
            .expect("loop stack tracks loop scopes");

        for _ in 0..locals {
            self.write_chunk(Opcode::Pop);
        }
        let label = if current_loop.is_for {
            format!(".FOR({})_END", current_loop.id)
        } else {
            format!(".WHILE({})_END", current_loop.id)
        };
        self.jmp(label);
        self.write_location(span);

        Ok(())
    }

    fn compile_continue(&mut self, span: Span) -> Result<(), CompileError> {
        let Some(locals) = self.scopes.locals_down_to_loop() else {
            return Err(self.error(
                span,
                "continue statements only allowed in while and for loops",
            ));
        };
        let current_loop = *self
            .unit()
            .loops
            .last()
            .expect("loop stack tracks loop scopes");

        for _ in 0..locals {
            self.write_chunk(Opcode::Pop);
        }
        // For ranges re-enter at the increment, not the test
        let label = if current_loop.is_for {
            format!(".FOR({})_STEP", current_loop.id)
        } else {
            format!(".WHILE({})_TEST", current_loop.id)
        };
        self.jmp(label);
        self.write_location(span);

        Ok(())
    }

    fn compile_ret(&mut self, value: Option<&Expr>, span: Span) -> Result<(), CompileError> {
        if self.scopes.is_global_scope() {
            return Err(self.error(span, "return statements not allowed in global scope"));
        }

        if let Some(block) = self.unit().blocks.last() {
            if block.current_stmt < block.stmts_len {
                return Err(self.error(span, "return statements must be the last in the scope"));
            }
        }

        self.scopes.set_returned();

        match value {
            Some(value) => {
                if let Expr::Ident(name, ident_span) = value {
                    if matches!(self.scopes.lookup(name), Some(Symbol::Module)) {
                        return Err(self.error(*ident_span, "cannot return modules"));
                    }
                }
                self.compile_expr(value)?;
            }
            None => {
                self.write_chunk(Opcode::Empty);
                self.write_location(span);
            }
        }

        self.write_chunk(Opcode::Ret);
        self.write_location(span);

        Ok(())
    }

    fn compile_proc(
        &mut self,
        name: &str,
        params: &[Param],
        body: &[Stmt],
        span: Span,
    ) -> Result<(), CompileError> {
        if !self.scopes.is_global_scope() {
            return Err(self.error(
                span,
                "procedures declarations only allowed in global scope",
            ));
        }
        if params.len() > u8::MAX as usize {
            return Err(self.error(span, "too many parameters"));
        }

        // Defined before the body so the procedure can call itself
        self.scopes
            .define_proc(name, params.len() as u8)
            .map_err(|msg| self.error(span, msg))?;

        self.scopes.push(ScopeKind::Function);
        self.push_unit(name, params.len() as u8);

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

        let proc = Rc::new(self.pop_unit()?);
        self.scopes.pop();

        self.module
            .add_predefined(name, Predefined::Proc(proc));

        Ok(())
    }

    fn compile_try(
        &mut self,
        body: &[Stmt],
        binding: Option<&str>,
        catch_body: &[Stmt],
        span: Span,
    ) -> Result<(), CompileError> {
        if self.scopes.in_scope_kind(ScopeKind::Catch) {
            return Err(self.error(span, "cannot use try statements inside catch scopes"));
        }

        let id = self.generate_id();

        self.scopes.push(ScopeKind::Try);

        self.write_chunk(Opcode::TryOpen);
        self.write_location(span);
        self.mark(format!("CATCH({})", id));

        self.compile_block_stmts(body, span)?;
        self.pop_scope_locals();

        self.write_chunk(Opcode::TryClose);
        self.write_location(span);
        self.jmp(format!("CATCH({})_END", id));

        self.scopes.pop();
        self.scopes.push(ScopeKind::Catch);

        self.label(format!("CATCH({})", id))?;
        // The unwinder pushed the thrown value; bind it or drop it
        match binding {
            Some(binding) => {
                self.scopes
                    .define_local(binding, false, true)
                    .map_err(|msg| self.error(span, msg))?;
            }
            None => {
                self.write_chunk(Opcode::Pop);
            }
        }

        self.compile_block_stmts(catch_body, span)?;
        self.pop_scope_locals();
        self.label(format!("CATCH({})_END", id))?;

        self.scopes.pop();

        Ok(())
    }

    /// Compile the statements of a block-like construct inside the current
    /// scope, tracking the statement cursor for return-position checks and
    /// rejecting statements after the scope returned
    pub(super) fn compile_block_stmts(
        &mut self,
        stmts: &[Stmt],
        span: Span,
    ) -> Result<(), CompileError> {
        self.unit().blocks.push(Block {
            stmts_len: stmts.len(),
            current_stmt: 0,
        });

        for (index, stmt) in stmts.iter().enumerate() {
            if self.scopes.current_returned() {
                self.unit().blocks.pop();
                return Err(self.error(
                    span,
                    "cannot exist statements after the scope returned",
                ));
            }
            self.unit()
                .blocks
                .last_mut()
                .expect("block pushed above")
                .current_stmt = index + 1;
            self.compile_stmt(stmt)?;
        }

        self.unit().blocks.pop();
        Ok(())
    }

    /// Compile a function body; returns whether an implicit return must be
    /// appended (the last statement is not a `ret`)
    pub(super) fn compile_fn_body(
        &mut self,
        body: &[Stmt],
        span: Span,
    ) -> Result<bool, CompileError> {
        self.compile_block_stmts(body, span)?;
        Ok(!matches!(body.last(), Some(Stmt::Ret { .. })))
    }
}
