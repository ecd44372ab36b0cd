//! Syntax analysis
//!
//! A recursive-descent parser with precedence climbing for expressions.
//! Statement terminators are optional semicolons; blocks are brace
//! delimited. Template string segments produced by the lexer are re-parsed
//! here into expression parts.

use crate::ast::*;
use crate::error::CompileError;
use crate::lexer::Lexer;
use crate::span::Span;
use crate::token::{TemplateSegment, Token, TokenKind};

/// Parser state over a token stream
pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
}

impl Parser {
    /// Create a new parser for the given tokens
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, current: 0 }
    }

    /// Parse a whole program
    pub fn parse(mut self) -> Result<Program, CompileError> {
        let mut stmts = Vec::new();
        while !self.check(&TokenKind::Eof) {
            stmts.push(self.statement()?);
        }
        Ok(Program { stmts })
    }

    // ===== Statements =====

    fn statement(&mut self) -> Result<Stmt, CompileError> {
        let stmt = match self.peek_kind().clone() {
            TokenKind::Mut => self.var_decl(true)?,
            TokenKind::Let => self.var_decl(false)?,
            TokenKind::Proc => self.proc_decl()?,
            TokenKind::If => self.if_stmt()?,
            TokenKind::While => self.while_stmt()?,
            TokenKind::For => self.for_stmt()?,
            TokenKind::Stop => {
                let span = self.advance().span;
                Stmt::Stop(span)
            }
            TokenKind::Continue => {
                let span = self.advance().span;
                Stmt::Continue(span)
            }
            TokenKind::Ret => self.ret_stmt()?,
            TokenKind::Throw => self.throw_stmt()?,
            TokenKind::Try => self.try_stmt()?,
            TokenKind::Import => self.import_stmt()?,
            TokenKind::Export => self.export_stmt()?,
            TokenKind::LeftBrace => {
                let span = self.advance().span;
                let stmts = self.block_body()?;
                Stmt::Block { stmts, span }
            }
            _ => Stmt::Expr(self.expression()?),
        };

        // Statement terminators are optional
        self.matches(&TokenKind::Semicolon);

        Ok(stmt)
    }

    fn var_decl(&mut self, mutable: bool) -> Result<Stmt, CompileError> {
        let span = self.advance().span;
        let name = self.expect_ident("variable name")?;

        let init = if self.matches(&TokenKind::Equal) {
            Some(self.expression()?)
        } else {
            None
        };

        Ok(Stmt::VarDecl {
            mutable,
            name,
            init,
            span,
        })
    }

    fn proc_decl(&mut self) -> Result<Stmt, CompileError> {
        let span = self.advance().span;
        let name = self.expect_ident("procedure name")?;
        let params = self.params()?;
        self.expect(&TokenKind::LeftBrace, "'{' before procedure body")?;
        let body = self.block_body()?;

        Ok(Stmt::Proc {
            name,
            params,
            body,
            span,
        })
    }

    fn params(&mut self) -> Result<Vec<Param>, CompileError> {
        self.expect(&TokenKind::LeftParen, "'(' before parameter list")?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RightParen) {
            loop {
                let span = self.peek().span;
                let name = self.expect_ident("parameter name")?;
                params.push(Param { name, span });
                if !self.matches(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RightParen, "')' after parameter list")?;
        Ok(params)
    }

    fn if_stmt(&mut self) -> Result<Stmt, CompileError> {
        let span = self.advance().span;
        let mut branches = Vec::new();

        let condition = self.expression()?;
        let branch_span = condition.span();
        self.expect(&TokenKind::LeftBrace, "'{' before if body")?;
        let body = self.block_body()?;
        branches.push(IfBranch {
            condition,
            body,
            span: branch_span,
        });

        let mut else_body = None;
        loop {
            if self.matches(&TokenKind::Elif) {
                let condition = self.expression()?;
                let branch_span = condition.span();
                self.expect(&TokenKind::LeftBrace, "'{' before elif body")?;
                let body = self.block_body()?;
                branches.push(IfBranch {
                    condition,
                    body,
                    span: branch_span,
                });
            } else if self.matches(&TokenKind::Else) {
                self.expect(&TokenKind::LeftBrace, "'{' before else body")?;
                else_body = Some(self.block_body()?);
                break;
            } else {
                break;
            }
        }

        Ok(Stmt::If {
            branches,
            else_body,
            span,
        })
    }

    fn while_stmt(&mut self) -> Result<Stmt, CompileError> {
        let span = self.advance().span;
        let condition = self.expression()?;
        self.expect(&TokenKind::LeftBrace, "'{' before while body")?;
        let body = self.block_body()?;

        Ok(Stmt::While {
            condition,
            body,
            span,
        })
    }

    /// `for i upto 3 { ... }` / `for i = 10 downto 0 { ... }`
    fn for_stmt(&mut self) -> Result<Stmt, CompileError> {
        let span = self.advance().span;
        let var = self.expect_ident("loop variable")?;

        let init = if self.matches(&TokenKind::Equal) {
            Some(self.expression()?)
        } else {
            None
        };

        let direction = if self.matches(&TokenKind::Upto) {
            ForDirection::Upto
        } else if self.matches(&TokenKind::Downto) {
            ForDirection::Downto
        } else {
            return Err(self.error("expected 'upto' or 'downto' in for statement"));
        };

        let bound = self.expression()?;
        self.expect(&TokenKind::LeftBrace, "'{' before for body")?;
        let body = self.block_body()?;

        Ok(Stmt::ForRange {
            var,
            init,
            direction,
            bound,
            body,
            span,
        })
    }

    fn ret_stmt(&mut self) -> Result<Stmt, CompileError> {
        let span = self.advance().span;
        let value = if self.check(&TokenKind::RightBrace) || self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.expression()?)
        };
        Ok(Stmt::Ret { value, span })
    }

    fn throw_stmt(&mut self) -> Result<Stmt, CompileError> {
        let span = self.advance().span;
        let value = if self.check(&TokenKind::RightBrace) || self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.expression()?)
        };
        Ok(Stmt::Throw { value, span })
    }

    fn try_stmt(&mut self) -> Result<Stmt, CompileError> {
        let span = self.advance().span;
        self.expect(&TokenKind::LeftBrace, "'{' before try body")?;
        let body = self.block_body()?;

        self.expect(&TokenKind::Catch, "'catch' after try body")?;
        let binding = match self.peek_kind() {
            TokenKind::Ident(_) => Some(self.expect_ident("catch binding")?),
            _ => None,
        };
        self.expect(&TokenKind::LeftBrace, "'{' before catch body")?;
        let catch_body = self.block_body()?;

        Ok(Stmt::Try {
            body,
            binding,
            catch_body,
            span,
        })
    }

    fn import_stmt(&mut self) -> Result<Stmt, CompileError> {
        let span = self.advance().span;
        let mut names = vec![self.expect_ident("module name")?];
        while self.matches(&TokenKind::Dot) {
            names.push(self.expect_ident("module name")?);
        }
        let alias = if self.matches(&TokenKind::As) {
            Some(self.expect_ident("module alias")?)
        } else {
            None
        };
        Ok(Stmt::Import { names, alias, span })
    }

    fn export_stmt(&mut self) -> Result<Stmt, CompileError> {
        let span = self.advance().span;
        let mut names = Vec::new();
        loop {
            let name_span = self.peek().span;
            let name = self.expect_ident("exported name")?;
            names.push((name, name_span));
            if !self.matches(&TokenKind::Comma) {
                break;
            }
        }
        Ok(Stmt::Export { names, span })
    }

    /// Statements up to and including the closing brace
    fn block_body(&mut self) -> Result<Vec<Stmt>, CompileError> {
        let mut stmts = Vec::new();
        while !self.check(&TokenKind::RightBrace) && !self.check(&TokenKind::Eof) {
            stmts.push(self.statement()?);
        }
        self.expect(&TokenKind::RightBrace, "'}' after block")?;
        Ok(stmts)
    }

    // ===== Expressions =====

    fn expression(&mut self) -> Result<Expr, CompileError> {
        self.assignment()
    }

    fn assignment(&mut self) -> Result<Expr, CompileError> {
        let target = self.or_expr()?;

        let op = match self.peek_kind() {
            TokenKind::Equal => None,
            TokenKind::PlusEqual => Some(BinaryOp::Add),
            TokenKind::MinusEqual => Some(BinaryOp::Sub),
            TokenKind::StarEqual => Some(BinaryOp::Mul),
            TokenKind::SlashEqual => Some(BinaryOp::Div),
            _ => return Ok(target),
        };
        let span = self.advance().span;

        match target {
            Expr::Ident(..) | Expr::Index { .. } | Expr::Access { .. } => {}
            _ => return Err(self.error_at(span, "illegal assignment target")),
        }

        let value = self.assignment()?;
        Ok(Expr::Assign {
            target: Box::new(target),
            op,
            value: Box::new(value),
            span,
        })
    }

    fn or_expr(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.and_expr()?;
        while self.check(&TokenKind::Or) {
            let span = self.advance().span;
            let right = self.and_expr()?;
            left = Expr::Logical {
                op: LogicalOp::Or,
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.equality()?;
        while self.check(&TokenKind::And) {
            let span = self.advance().span;
            let right = self.equality()?;
            left = Expr::Logical {
                op: LogicalOp::And,
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }
        Ok(left)
    }

    fn equality(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.comparison()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::EqualEqual => BinaryOp::Eq,
                TokenKind::BangEqual => BinaryOp::Ne,
                _ => break,
            };
            let span = self.advance().span;
            let right = self.comparison()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }
        Ok(left)
    }

    fn comparison(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.bit_or()?;
        loop {
            if self.check(&TokenKind::Is) {
                let span = self.advance().span;
                let tag = self.type_tag()?;
                left = Expr::Is {
                    operand: Box::new(left),
                    tag,
                    span,
                };
                continue;
            }
            let op = match self.peek_kind() {
                TokenKind::Less => BinaryOp::Lt,
                TokenKind::Greater => BinaryOp::Gt,
                TokenKind::LessEqual => BinaryOp::Le,
                TokenKind::GreaterEqual => BinaryOp::Ge,
                _ => break,
            };
            let span = self.advance().span;
            let right = self.bit_or()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }
        Ok(left)
    }

    /// A type tag name after `is`; several tags double as keywords
    fn type_tag(&mut self) -> Result<TypeTag, CompileError> {
        let token = self.advance();
        let tag = match &token.kind {
            TokenKind::Empty => Some(TypeTag::Empty),
            TokenKind::Array => Some(TypeTag::Array),
            TokenKind::List => Some(TypeTag::List),
            TokenKind::Dict => Some(TypeTag::Dict),
            TokenKind::Proc => Some(TypeTag::Proc),
            TokenKind::Ident(name) => TypeTag::from_name(name),
            _ => None,
        };
        tag.ok_or_else(|| self.error_at(token.span, "expected a type tag after 'is'"))
    }

    fn bit_or(&mut self) -> Result<Expr, CompileError> {
        self.binary_level(
            &[(TokenKind::Pipe, BinaryOp::BitOr)],
            Self::bit_xor,
        )
    }

    fn bit_xor(&mut self) -> Result<Expr, CompileError> {
        self.binary_level(
            &[(TokenKind::Caret, BinaryOp::BitXor)],
            Self::bit_and,
        )
    }

    fn bit_and(&mut self) -> Result<Expr, CompileError> {
        self.binary_level(&[(TokenKind::Amp, BinaryOp::BitAnd)], Self::shift)
    }

    fn shift(&mut self) -> Result<Expr, CompileError> {
        self.binary_level(
            &[
                (TokenKind::LessLess, BinaryOp::Shl),
                (TokenKind::GreaterGreater, BinaryOp::Shr),
            ],
            Self::concat,
        )
    }

    fn concat(&mut self) -> Result<Expr, CompileError> {
        self.binary_level(&[(TokenKind::PlusPlus, BinaryOp::Concat)], Self::term)
    }

    fn term(&mut self) -> Result<Expr, CompileError> {
        self.binary_level(
            &[
                (TokenKind::Plus, BinaryOp::Add),
                (TokenKind::Minus, BinaryOp::Sub),
            ],
            Self::factor,
        )
    }

    fn factor(&mut self) -> Result<Expr, CompileError> {
        self.binary_level(
            &[
                (TokenKind::Star, BinaryOp::Mul),
                (TokenKind::Slash, BinaryOp::Div),
                (TokenKind::Percent, BinaryOp::Mod),
            ],
            Self::unary,
        )
    }

    fn binary_level(
        &mut self,
        ops: &[(TokenKind, BinaryOp)],
        next: fn(&mut Self) -> Result<Expr, CompileError>,
    ) -> Result<Expr, CompileError> {
        let mut left = next(self)?;
        'outer: loop {
            for (kind, op) in ops {
                if self.check(kind) {
                    let span = self.advance().span;
                    let right = next(self)?;
                    left = Expr::Binary {
                        op: *op,
                        left: Box::new(left),
                        right: Box::new(right),
                        span,
                    };
                    continue 'outer;
                }
            }
            break;
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, CompileError> {
        let op = match self.peek_kind() {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            _ => None,
        };

        if let Some(op) = op {
            let span = self.advance().span;
            let operand = self.unary()?;
            return Ok(Expr::Unary {
                op,
                operand: Box::new(operand),
                span,
            });
        }

        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, CompileError> {
        let mut expr = self.primary()?;

        loop {
            if self.check(&TokenKind::LeftParen) {
                let span = self.advance().span;
                let mut args = Vec::new();
                if !self.check(&TokenKind::RightParen) {
                    loop {
                        args.push(self.expression()?);
                        if !self.matches(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&TokenKind::RightParen, "')' after arguments")?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                    span,
                };
            } else if self.check(&TokenKind::LeftBracket) {
                let span = self.advance().span;
                let index = self.expression()?;
                self.expect(&TokenKind::RightBracket, "']' after index")?;
                expr = Expr::Index {
                    target: Box::new(expr),
                    index: Box::new(index),
                    span,
                };
            } else if self.check(&TokenKind::Dot) {
                let span = self.advance().span;
                let name = self.expect_ident("member name after '.'")?;
                expr = Expr::Access {
                    target: Box::new(expr),
                    name,
                    span,
                };
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr, CompileError> {
        let token = self.advance();
        let span = token.span;

        let expr = match token.kind {
            TokenKind::Empty => Expr::Empty(span),
            TokenKind::True => Expr::Bool(true, span),
            TokenKind::False => Expr::Bool(false, span),
            TokenKind::Int(value) => Expr::Int(value, span),
            TokenKind::Float(value) => Expr::Float(value, span),
            TokenKind::Str(value) => Expr::Str(value, span),
            TokenKind::Template(segments) => self.template(segments, span)?,
            TokenKind::Ident(name) => Expr::Ident(name, span),
            TokenKind::LeftParen => {
                let inner = self.expression()?;
                self.expect(&TokenKind::RightParen, "')' after expression")?;
                Expr::Group(Box::new(inner))
            }
            TokenKind::Anon => {
                let params = self.params()?;
                self.expect(&TokenKind::LeftBrace, "'{' before anon body")?;
                let body = self.block_body()?;
                Expr::Anon { params, body, span }
            }
            TokenKind::LeftBracket => {
                let mut items = Vec::new();
                if !self.check(&TokenKind::RightBracket) {
                    loop {
                        items.push(self.expression()?);
                        if !self.matches(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&TokenKind::RightBracket, "']' after array items")?;
                Expr::ArrayLiteral { items, span }
            }
            TokenKind::Array => {
                self.expect(&TokenKind::LeftParen, "'(' after 'array'")?;
                let len = self.expression()?;
                self.expect(&TokenKind::RightParen, "')' after array length")?;
                Expr::ArrayNew {
                    len: Box::new(len),
                    span,
                }
            }
            TokenKind::List => {
                self.expect(&TokenKind::LeftParen, "'(' after 'list'")?;
                let mut items = Vec::new();
                if !self.check(&TokenKind::RightParen) {
                    loop {
                        items.push(self.expression()?);
                        if !self.matches(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&TokenKind::RightParen, "')' after list items")?;
                Expr::ListLiteral { items, span }
            }
            TokenKind::Dict => {
                self.expect(&TokenKind::LeftParen, "'(' after 'dict'")?;
                let mut entries = Vec::new();
                if !self.check(&TokenKind::RightParen) {
                    loop {
                        let key = self.expression()?;
                        self.expect(&TokenKind::Colon, "':' after dict key")?;
                        let value = self.expression()?;
                        entries.push((key, value));
                        if !self.matches(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&TokenKind::RightParen, "')' after dict entries")?;
                Expr::DictLiteral { entries, span }
            }
            TokenKind::LeftBrace => {
                let mut fields = Vec::new();
                if !self.check(&TokenKind::RightBrace) {
                    loop {
                        let name = self.expect_ident("record attribute name")?;
                        self.expect(&TokenKind::Colon, "':' after attribute name")?;
                        let value = self.expression()?;
                        fields.push((name, value));
                        if !self.matches(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&TokenKind::RightBrace, "'}' after record fields")?;
                Expr::RecordLiteral { fields, span }
            }
            other => {
                return Err(self.error_at(span, &format!("unexpected token {:?}", other)));
            }
        };

        Ok(expr)
    }

    /// Resolve template segments: text becomes string parts, sources are
    /// re-lexed and re-parsed as expressions.
    fn template(
        &mut self,
        segments: Vec<TemplateSegment>,
        span: Span,
    ) -> Result<Expr, CompileError> {
        let mut parts = Vec::new();

        for segment in segments {
            match segment {
                TemplateSegment::Text(text) => {
                    parts.push(Expr::Str(text, span));
                }
                TemplateSegment::Source(source, line) => {
                    let tokens = Lexer::new(&source).tokenize().map_err(|err| match err {
                        CompileError::Lex { msg, path, .. } => CompileError::Lex {
                            msg,
                            line,
                            path,
                        },
                        other => other,
                    })?;
                    let mut sub = Parser::new(tokens);
                    let expr = sub.expression()?;
                    if !sub.check(&TokenKind::Eof) {
                        return Err(CompileError::Parse {
                            msg: "trailing tokens in template expression".to_string(),
                            line,
                            path: "<input>".to_string(),
                        });
                    }
                    parts.push(expr);
                }
            }
        }

        Ok(Expr::Template { parts, span })
    }

    // ===== Helpers =====

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.tokens[self.current].kind
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.current].clone();
        if self.current + 1 < self.tokens.len() {
            self.current += 1;
        }
        token
    }

    fn matches(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<Token, CompileError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error(&format!("expected {}", what)))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String, CompileError> {
        match self.peek_kind().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.error(&format!("expected {}", what))),
        }
    }

    fn error(&self, msg: &str) -> CompileError {
        self.error_at(self.peek().span, msg)
    }

    fn error_at(&self, span: Span, msg: &str) -> CompileError {
        CompileError::Parse {
            msg: msg.to_string(),
            line: span.line,
            path: "<input>".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(source: &str) -> Program {
        let tokens = Lexer::new(source).tokenize().expect("lexing failed");
        Parser::new(tokens).parse().expect("parsing failed")
    }

    #[test]
    fn test_var_decl_and_assignment() {
        let program = parse("mut a = 2\na = a + 3 * 4");
        assert_eq!(program.stmts.len(), 2);
        match &program.stmts[1] {
            Stmt::Expr(Expr::Assign { op: None, .. }) => {}
            other => panic!("expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_mul_binds_tighter_than_add() {
        let program = parse("1 + 2 * 3");
        match &program.stmts[0] {
            Stmt::Expr(Expr::Binary {
                op: BinaryOp::Add,
                right,
                ..
            }) => match right.as_ref() {
                Expr::Binary {
                    op: BinaryOp::Mul, ..
                } => {}
                other => panic!("expected mul on the right, got {:?}", other),
            },
            other => panic!("expected add, got {:?}", other),
        }
    }

    #[test]
    fn test_proc_with_ret() {
        let program = parse("proc add(a, b) { ret a + b }");
        match &program.stmts[0] {
            Stmt::Proc { name, params, body, .. } => {
                assert_eq!(name, "add");
                assert_eq!(params.len(), 2);
                assert!(matches!(body[0], Stmt::Ret { value: Some(_), .. }));
            }
            other => panic!("expected proc, got {:?}", other),
        }
    }

    #[test]
    fn test_anon_expression() {
        let program = parse("let f = anon(x) { ret x }");
        match &program.stmts[0] {
            Stmt::VarDecl {
                init: Some(Expr::Anon { params, .. }),
                ..
            } => assert_eq!(params.len(), 1),
            other => panic!("expected anon initializer, got {:?}", other),
        }
    }

    #[test]
    fn test_for_range() {
        let program = parse("for i upto 3 { println(i) }");
        match &program.stmts[0] {
            Stmt::ForRange {
                var,
                init: None,
                direction: ForDirection::Upto,
                ..
            } => assert_eq!(var, "i"),
            other => panic!("expected for range, got {:?}", other),
        }
    }

    #[test]
    fn test_try_catch_with_binding() {
        let program = parse("try { throw { msg: \"boom\" } } catch e { println(e) }");
        match &program.stmts[0] {
            Stmt::Try { binding, .. } => assert_eq!(binding.as_deref(), Some("e")),
            other => panic!("expected try, got {:?}", other),
        }
    }

    #[test]
    fn test_import_dotted_with_alias() {
        let program = parse("import a.b.c as d");
        match &program.stmts[0] {
            Stmt::Import { names, alias, .. } => {
                assert_eq!(names, &vec!["a".to_string(), "b".to_string(), "c".to_string()]);
                assert_eq!(alias.as_deref(), Some("d"));
            }
            other => panic!("expected import, got {:?}", other),
        }
    }

    #[test]
    fn test_is_expression() {
        let program = parse("x is record");
        match &program.stmts[0] {
            Stmt::Expr(Expr::Is { tag, .. }) => assert_eq!(*tag, TypeTag::Record),
            other => panic!("expected is expression, got {:?}", other),
        }
    }

    #[test]
    fn test_collection_literals() {
        let program = parse("let a = [1, 2]\nlet l = list(3)\nlet d = dict(1: 2)\nlet r = { msg: \"hi\" }");
        assert!(matches!(
            &program.stmts[0],
            Stmt::VarDecl { init: Some(Expr::ArrayLiteral { items, .. }), .. } if items.len() == 2
        ));
        assert!(matches!(
            &program.stmts[1],
            Stmt::VarDecl { init: Some(Expr::ListLiteral { items, .. }), .. } if items.len() == 1
        ));
        assert!(matches!(
            &program.stmts[2],
            Stmt::VarDecl { init: Some(Expr::DictLiteral { entries, .. }), .. } if entries.len() == 1
        ));
        assert!(matches!(
            &program.stmts[3],
            Stmt::VarDecl { init: Some(Expr::RecordLiteral { fields, .. }), .. } if fields.len() == 1
        ));
    }

    #[test]
    fn test_template_parts() {
        let program = parse("`a is {a}`");
        match &program.stmts[0] {
            Stmt::Expr(Expr::Template { parts, .. }) => {
                assert_eq!(parts.len(), 2);
                assert!(matches!(parts[0], Expr::Str(..)));
                assert!(matches!(parts[1], Expr::Ident(..)));
            }
            other => panic!("expected template, got {:?}", other),
        }
    }

    #[test]
    fn test_concat_statement() {
        let program = parse("xs ++ i");
        assert!(matches!(
            &program.stmts[0],
            Stmt::Expr(Expr::Binary {
                op: BinaryOp::Concat,
                ..
            })
        ));
    }

    #[test]
    fn test_parse_error_reports_line() {
        let tokens = Lexer::new("mut = 2").tokenize().unwrap();
        let err = Parser::new(tokens).parse().unwrap_err();
        assert!(err.to_string().contains("expected variable name"));
    }
}
