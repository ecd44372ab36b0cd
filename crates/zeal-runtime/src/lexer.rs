//! Lexical analysis (tokenization)
//!
//! The lexer converts Zeal source code into a stream of tokens with line
//! information. Template strings are split into text and expression
//! segments here; the parser re-parses the expression segments.

use crate::error::CompileError;
use crate::span::Span;
use crate::token::{TemplateSegment, Token, TokenKind};

/// Lexer state for tokenizing source code
pub struct Lexer {
    /// Characters of source code
    chars: Vec<char>,
    /// Current position in chars
    current: usize,
    /// Current line number (1-indexed)
    line: u32,
    /// Start position of current token
    start_pos: usize,
    /// Start line of current token
    start_line: u32,
}

impl Lexer {
    /// Create a new lexer for the given source code
    pub fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            current: 0,
            line: 1,
            start_pos: 0,
            start_line: 1,
        }
    }

    /// Tokenize the source code
    pub fn tokenize(mut self) -> Result<Vec<Token>, CompileError> {
        let mut tokens = Vec::new();

        loop {
            let token = self.next_token()?;
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }

        Ok(tokens)
    }

    fn next_token(&mut self) -> Result<Token, CompileError> {
        self.skip_whitespace_and_comments()?;

        self.start_pos = self.current;
        self.start_line = self.line;

        if self.is_at_end() {
            return Ok(self.make_token(TokenKind::Eof));
        }

        let c = self.advance();

        let kind = match c {
            '(' => TokenKind::LeftParen,
            ')' => TokenKind::RightParen,
            '{' => TokenKind::LeftBrace,
            '}' => TokenKind::RightBrace,
            '[' => TokenKind::LeftBracket,
            ']' => TokenKind::RightBracket,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            ';' => TokenKind::Semicolon,
            '.' => TokenKind::Dot,
            '~' => TokenKind::Tilde,
            '&' => TokenKind::Amp,
            '|' => TokenKind::Pipe,
            '^' => TokenKind::Caret,
            '+' => {
                if self.matches('+') {
                    TokenKind::PlusPlus
                } else if self.matches('=') {
                    TokenKind::PlusEqual
                } else {
                    TokenKind::Plus
                }
            }
            '-' => {
                if self.matches('=') {
                    TokenKind::MinusEqual
                } else {
                    TokenKind::Minus
                }
            }
            '*' => {
                if self.matches('=') {
                    TokenKind::StarEqual
                } else {
                    TokenKind::Star
                }
            }
            '/' => {
                if self.matches('=') {
                    TokenKind::SlashEqual
                } else {
                    TokenKind::Slash
                }
            }
            '%' => TokenKind::Percent,
            '=' => {
                if self.matches('=') {
                    TokenKind::EqualEqual
                } else {
                    TokenKind::Equal
                }
            }
            '!' => {
                if self.matches('=') {
                    TokenKind::BangEqual
                } else {
                    TokenKind::Bang
                }
            }
            '<' => {
                if self.matches('=') {
                    TokenKind::LessEqual
                } else if self.matches('<') {
                    TokenKind::LessLess
                } else {
                    TokenKind::Less
                }
            }
            '>' => {
                if self.matches('=') {
                    TokenKind::GreaterEqual
                } else if self.matches('>') {
                    TokenKind::GreaterGreater
                } else {
                    TokenKind::Greater
                }
            }
            '"' => return self.string(),
            '`' => return self.template(),
            c if c.is_ascii_digit() => return self.number(),
            c if c.is_alphabetic() || c == '_' => return Ok(self.identifier()),
            other => {
                return Err(self.error(format!("unexpected character '{}'", other)));
            }
        };

        Ok(self.make_token(kind))
    }

    fn string(&mut self) -> Result<Token, CompileError> {
        let mut value = String::new();

        loop {
            if self.is_at_end() {
                return Err(self.error("unterminated string literal".to_string()));
            }
            match self.advance() {
                '"' => break,
                '\\' => value.push(self.escape()?),
                '\n' => {
                    return Err(self.error("unterminated string literal".to_string()));
                }
                c => value.push(c),
            }
        }

        Ok(self.make_token(TokenKind::Str(value)))
    }

    /// Template strings: `` `text {expr} more` `` — text and expression
    /// segments are separated here, expressions stay as raw source.
    fn template(&mut self) -> Result<Token, CompileError> {
        let mut segments = Vec::new();
        let mut text = String::new();

        loop {
            if self.is_at_end() {
                return Err(self.error("unterminated template string".to_string()));
            }
            match self.advance() {
                '`' => break,
                '\\' => text.push(self.escape()?),
                '{' => {
                    if !text.is_empty() {
                        segments.push(TemplateSegment::Text(std::mem::take(&mut text)));
                    }
                    let expr_line = self.line;
                    let mut source = String::new();
                    let mut depth = 1usize;
                    loop {
                        if self.is_at_end() {
                            return Err(
                                self.error("unterminated template expression".to_string())
                            );
                        }
                        let c = self.advance();
                        match c {
                            '{' => depth += 1,
                            '}' => {
                                depth -= 1;
                                if depth == 0 {
                                    break;
                                }
                            }
                            '\n' => self.line += 1,
                            _ => {}
                        }
                        if depth > 0 {
                            source.push(c);
                        }
                    }
                    segments.push(TemplateSegment::Source(source, expr_line));
                }
                '\n' => {
                    self.line += 1;
                    text.push('\n');
                }
                c => text.push(c),
            }
        }

        if !text.is_empty() {
            segments.push(TemplateSegment::Text(text));
        }

        Ok(self.make_token(TokenKind::Template(segments)))
    }

    fn escape(&mut self) -> Result<char, CompileError> {
        if self.is_at_end() {
            return Err(self.error("unterminated escape sequence".to_string()));
        }
        let c = match self.advance() {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            '0' => '\0',
            '\\' => '\\',
            '"' => '"',
            '`' => '`',
            '{' => '{',
            other => {
                return Err(self.error(format!("unknown escape sequence '\\{}'", other)));
            }
        };
        Ok(c)
    }

    fn number(&mut self) -> Result<Token, CompileError> {
        while self.peek().is_ascii_digit() {
            self.advance();
        }

        let mut is_float = false;
        if self.peek() == '.' && self.peek_next().is_ascii_digit() {
            is_float = true;
            self.advance();
            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }

        let lexeme: String = self.chars[self.start_pos..self.current].iter().collect();

        if is_float {
            let value: f64 = lexeme
                .parse()
                .map_err(|_| self.error(format!("invalid float literal '{}'", lexeme)))?;
            Ok(self.make_token(TokenKind::Float(value)))
        } else {
            let value: i64 = lexeme
                .parse()
                .map_err(|_| self.error(format!("integer literal '{}' out of range", lexeme)))?;
            Ok(self.make_token(TokenKind::Int(value)))
        }
    }

    fn identifier(&mut self) -> Token {
        while self.peek().is_alphanumeric() || self.peek() == '_' {
            self.advance();
        }

        let lexeme: String = self.chars[self.start_pos..self.current].iter().collect();
        let kind = TokenKind::keyword(&lexeme).unwrap_or(TokenKind::Ident(lexeme));
        self.make_token(kind)
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), CompileError> {
        loop {
            match self.peek() {
                ' ' | '\t' | '\r' => {
                    self.advance();
                }
                '\n' => {
                    self.line += 1;
                    self.advance();
                }
                '/' if self.peek_next() == '/' => {
                    while !self.is_at_end() && self.peek() != '\n' {
                        self.advance();
                    }
                }
                '/' if self.peek_next() == '*' => {
                    self.advance();
                    self.advance();
                    loop {
                        if self.is_at_end() {
                            return Err(self.error("unterminated block comment".to_string()));
                        }
                        if self.peek() == '*' && self.peek_next() == '/' {
                            self.advance();
                            self.advance();
                            break;
                        }
                        if self.peek() == '\n' {
                            self.line += 1;
                        }
                        self.advance();
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn make_token(&self, kind: TokenKind) -> Token {
        Token {
            kind,
            span: Span::new(self.start_pos, self.current, self.start_line),
        }
    }

    fn error(&self, msg: String) -> CompileError {
        CompileError::Lex {
            msg,
            line: self.start_line,
            path: "<input>".to_string(),
        }
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.chars.len()
    }

    fn advance(&mut self) -> char {
        let c = self.chars[self.current];
        self.current += 1;
        c
    }

    fn matches(&mut self, expected: char) -> bool {
        if self.peek() == expected {
            self.current += 1;
            true
        } else {
            false
        }
    }

    fn peek(&self) -> char {
        self.chars.get(self.current).copied().unwrap_or('\0')
    }

    fn peek_next(&self) -> char {
        self.chars.get(self.current + 1).copied().unwrap_or('\0')
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source)
            .tokenize()
            .expect("lexing failed")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_simple_statement() {
        assert_eq!(
            kinds("mut a = 2"),
            vec![
                TokenKind::Mut,
                TokenKind::Ident("a".to_string()),
                TokenKind::Equal,
                TokenKind::Int(2),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("a ++ b << 2 >= 1.5"),
            vec![
                TokenKind::Ident("a".to_string()),
                TokenKind::PlusPlus,
                TokenKind::Ident("b".to_string()),
                TokenKind::LessLess,
                TokenKind::Int(2),
                TokenKind::GreaterEqual,
                TokenKind::Float(1.5),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            kinds(r#""a\nb""#),
            vec![TokenKind::Str("a\nb".to_string()), TokenKind::Eof]
        );
    }

    #[test]
    fn test_line_tracking() {
        let tokens = Lexer::new("a\nb\n\nc").tokenize().unwrap();
        let lines: Vec<u32> = tokens.iter().map(|t| t.span.line).collect();
        assert_eq!(lines, vec![1, 2, 4, 4]);
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(
            kinds("1 // line\n/* block\n */ 2"),
            vec![TokenKind::Int(1), TokenKind::Int(2), TokenKind::Eof]
        );
    }

    #[test]
    fn test_template_segments() {
        let tokens = Lexer::new("`x = {x}!`").tokenize().unwrap();
        match &tokens[0].kind {
            TokenKind::Template(segments) => {
                assert_eq!(
                    segments,
                    &vec![
                        TemplateSegment::Text("x = ".to_string()),
                        TemplateSegment::Source("x".to_string(), 1),
                        TemplateSegment::Text("!".to_string()),
                    ]
                );
            }
            other => panic!("expected template, got {:?}", other),
        }
    }

    #[test]
    fn test_unterminated_string_errors() {
        let err = Lexer::new("\"abc").tokenize().unwrap_err();
        assert!(err.to_string().contains("unterminated string"));
    }

    #[test]
    fn test_keywords_and_identifiers() {
        assert_eq!(
            kinds("proc is procs"),
            vec![
                TokenKind::Proc,
                TokenKind::Is,
                TokenKind::Ident("procs".to_string()),
                TokenKind::Eof,
            ]
        );
    }
}
