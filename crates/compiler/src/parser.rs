//! Single-pass Pratt parser and code generator.
//!
//! There is no intermediate syntax tree: every production emits bytecode
//! into the current function's `Chunk` as it is recognized. Scope and
//! upvalue bookkeeping is delegated to `Compiler` (see `compiler.rs`);
//! this module owns the token stream, the precedence table, and all
//! opcode emission.

use crate::compiler::{Compiler, FunctionType};
use crate::scanner::{Scanner, Token, TokenKind};
use std::rc::Rc;
use wisp_core::{FunctionObj, OpCode, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
enum Precedence {
    None,
    Assignment, // =
    Or,         // or
    And,        // and
    Equality,   // == !=
    Comparison, // < > <= >=
    Term,       // + - & | ^
    Factor,     // * /
    Unary,      // ! - ~
    Call,       // . () []
    Primary,
}

impl Precedence {
    fn next(self) -> Precedence {
        use Precedence::*;
        match self {
            None => Assignment,
            Assignment => Or,
            Or => And,
            And => Equality,
            Equality => Comparison,
            Comparison => Term,
            Term => Factor,
            Factor => Unary,
            Unary => Call,
            Call => Primary,
            Primary => Primary,
        }
    }
}

type ParseFn = fn(&mut Parser, bool) -> Result<(), String>;

struct ParseRule {
    prefix: Option<ParseFn>,
    infix: Option<ParseFn>,
    precedence: Precedence,
}

const fn rule(prefix: Option<ParseFn>, infix: Option<ParseFn>, precedence: Precedence) -> ParseRule {
    ParseRule {
        prefix,
        infix,
        precedence,
    }
}

fn get_rule(kind: TokenKind) -> ParseRule {
    use Precedence::*;
    use TokenKind::*;
    match kind {
        LeftParen => rule(Some(Parser::grouping), Some(Parser::call), Call),
        Dot => rule(None, Some(Parser::dot), Call),
        LeftBracket => rule(Some(Parser::array_literal), Some(Parser::index), Or),
        Minus => rule(Some(Parser::unary), Some(Parser::binary), Term),
        Plus => rule(None, Some(Parser::binary), Term),
        Slash => rule(None, Some(Parser::binary), Factor),
        Star => rule(None, Some(Parser::binary), Factor),
        Bang => rule(Some(Parser::unary), None, None),
        Tilde => rule(Some(Parser::unary), None, None),
        BangEqual => rule(None, Some(Parser::binary), Equality),
        EqualEqual => rule(None, Some(Parser::binary), Equality),
        Greater => rule(None, Some(Parser::binary), Comparison),
        GreaterEqual => rule(None, Some(Parser::binary), Comparison),
        Less => rule(None, Some(Parser::binary), Comparison),
        LessEqual => rule(None, Some(Parser::binary), Comparison),
        Amp => rule(None, Some(Parser::binary), Term),
        Pipe => rule(None, Some(Parser::binary), Term),
        Caret => rule(None, Some(Parser::binary), Term),
        Identifier => rule(Some(Parser::variable), None, None),
        String => rule(Some(Parser::string), None, None),
        Number => rule(Some(Parser::number), None, None),
        And => rule(None, Some(Parser::and_), And),
        Or => rule(None, Some(Parser::or_), Or),
        False => rule(Some(Parser::literal), None, None),
        True => rule(Some(Parser::literal), None, None),
        Null => rule(Some(Parser::literal), None, None),
        This => rule(Some(Parser::this_), None, None),
        Super => rule(Some(Parser::super_), None, None),
        _ => rule(None, None, None),
    }
}

struct ClassCompilerState {
    has_superclass: bool,
}

pub struct Parser {
    scanner: Scanner,
    previous: Token,
    current: Token,
    compiler: Box<Compiler>,
    class_compilers: Vec<ClassCompilerState>,
    had_error: bool,
    panic_mode: bool,
    errors: Vec<String>,
}

impl Parser {
    fn new(source: &str) -> Self {
        let mut scanner = Scanner::new(source);
        let placeholder = Token {
            kind: TokenKind::Error,
            lexeme: String::new(),
            line: 0,
        };
        let first = scanner.next_token();
        Parser {
            scanner,
            previous: placeholder,
            current: first,
            compiler: Box::new(Compiler::new(FunctionType::Script, String::new(), None)),
            class_compilers: Vec::new(),
            had_error: false,
            panic_mode: false,
            errors: Vec::new(),
        }
    }

    // ---- token stream -----------------------------------------------

    fn advance(&mut self) {
        std::mem::swap(&mut self.previous, &mut self.current);
        loop {
            self.current = self.scanner.next_token();
            if self.current.kind != TokenKind::Error {
                break;
            }
            let msg = self.current.lexeme.clone();
            self.error_at_current(&msg);
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn match_token(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    fn consume(&mut self, kind: TokenKind, message: &str) -> Result<(), String> {
        if self.check(kind) {
            self.advance();
            return Ok(());
        }
        self.error_at_current(message);
        Err(message.to_string())
    }

    // ---- error reporting ----------------------------------------------

    fn error_at(&mut self, token_kind: TokenKind, token_lexeme: &str, token_line: u32, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        let location = match token_kind {
            TokenKind::Eof => " at end".to_string(),
            TokenKind::Error => String::new(),
            _ => format!(" at '{token_lexeme}'"),
        };
        eprintln!("[line {token_line}] Error{location}: {message}");
        tracing::debug!(line = token_line, %message, "parse error");
        self.had_error = true;
        self.errors.push(message.to_string());
    }

    fn error_at_current(&mut self, message: &str) {
        let (kind, lexeme, line) = (
            self.current.kind,
            self.current.lexeme.clone(),
            self.current.line,
        );
        self.error_at(kind, &lexeme, line, message);
    }

    fn error(&mut self, message: &str) {
        let (kind, lexeme, line) = (
            self.previous.kind,
            self.previous.lexeme.clone(),
            self.previous.line,
        );
        self.error_at(kind, &lexeme, line, message);
    }

    fn synchronize(&mut self) {
        self.panic_mode = false;
        while self.current.kind != TokenKind::Eof {
            if self.previous.kind == TokenKind::Semicolon {
                return;
            }
            match self.current.kind {
                TokenKind::Class
                | TokenKind::Func
                | TokenKind::Var
                | TokenKind::For
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Print
                | TokenKind::Return => return,
                _ => {}
            }
            self.advance();
        }
    }

    // ---- bytecode emission --------------------------------------------

    fn current_chunk(&mut self) -> &mut wisp_core::Chunk {
        &mut self.compiler.function.chunk
    }

    fn emit_byte(&mut self, byte: u8, line: u32) {
        self.current_chunk().write_byte(byte, line);
    }

    fn emit_op(&mut self, op: OpCode, line: u32) {
        self.current_chunk().write_op(op, line);
    }

    fn emit_op_u8(&mut self, op: OpCode, operand: u8, line: u32) {
        self.emit_op(op, line);
        self.emit_byte(operand, line);
    }

    fn emit_jump(&mut self, op: OpCode, line: u32) -> usize {
        self.emit_op(op, line);
        self.current_chunk().emit_jump_placeholder(line)
    }

    fn patch_jump(&mut self, offset: usize) -> Result<(), String> {
        if let Err(msg) = self.current_chunk().patch_jump(offset) {
            self.error(&msg);
            return Err(msg);
        }
        Ok(())
    }

    fn emit_loop(&mut self, loop_start: usize, line: u32) -> Result<(), String> {
        if let Err(msg) = self.current_chunk().emit_loop(loop_start, line) {
            self.error(&msg);
            return Err(msg);
        }
        Ok(())
    }

    fn emit_return(&mut self, line: u32) {
        if self.compiler.function_type == FunctionType::Initializer {
            self.emit_op_u8(OpCode::GetLocal, 0, line);
        } else {
            self.emit_op(OpCode::Null, line);
        }
        self.emit_op(OpCode::Return, line);
    }

    fn identifier_constant(&mut self, name: String) -> Result<u8, String> {
        match self.current_chunk().add_constant(Value::String(Rc::from(name.as_str()))) {
            Some(idx) => Ok(idx),
            None => {
                self.error("Too many constants in one chunk.");
                Err("Too many constants in one chunk.".to_string())
            }
        }
    }

    fn emit_constant(&mut self, value: Value, line: u32) -> Result<(), String> {
        match self.current_chunk().add_constant(value) {
            Some(idx) => {
                self.emit_op_u8(OpCode::Constant, idx, line);
                Ok(())
            }
            None => {
                self.error("Too many constants in one chunk.");
                Err("Too many constants in one chunk.".to_string())
            }
        }
    }

    // ---- scope / upvalue plumbing (thin wrappers that also report) ----

    fn declare_variable_current(&mut self) -> Result<(), String> {
        let name = self.previous.lexeme.clone();
        if let Err(msg) = self.compiler.declare_variable(&name) {
            self.error(&msg);
            return Err(msg);
        }
        Ok(())
    }

    fn resolve_local_current(&mut self, name: &str) -> Result<Option<u8>, String> {
        match self.compiler.resolve_local(name) {
            Ok(v) => Ok(v),
            Err(msg) => {
                self.error(&msg);
                Err(msg)
            }
        }
    }

    fn resolve_upvalue_current(&mut self, name: &str) -> Result<Option<u8>, String> {
        match self.compiler.resolve_upvalue(name) {
            Ok(v) => Ok(v),
            Err(msg) => {
                self.error(&msg);
                Err(msg)
            }
        }
    }

    fn parse_variable(&mut self, error_msg: &str) -> Result<u8, String> {
        self.consume(TokenKind::Identifier, error_msg)?;
        self.declare_variable_current()?;
        if self.compiler.scope_depth() > 0 {
            return Ok(0);
        }
        let name = self.previous.lexeme.clone();
        self.identifier_constant(name)
    }

    fn define_variable(&mut self, global: u8, line: u32) {
        if self.compiler.scope_depth() > 0 {
            self.compiler.mark_initialized();
            return;
        }
        self.emit_op_u8(OpCode::DefineGlobal, global, line);
    }

    fn named_variable(&mut self, name: String, can_assign: bool) -> Result<(), String> {
        let line = self.previous.line;
        let (get_op, set_op, arg) = if let Some(slot) = self.resolve_local_current(&name)? {
            (OpCode::GetLocal, OpCode::SetLocal, slot)
        } else if let Some(slot) = self.resolve_upvalue_current(&name)? {
            (OpCode::GetUpvalue, OpCode::SetUpvalue, slot)
        } else {
            let idx = self.identifier_constant(name)?;
            (OpCode::GetGlobal, OpCode::SetGlobal, idx)
        };

        if can_assign && self.match_token(TokenKind::Equal) {
            self.expression()?;
            self.emit_op_u8(set_op, arg, line);
        } else {
            self.emit_op_u8(get_op, arg, line);
        }
        Ok(())
    }

    fn argument_list(&mut self) -> Result<u8, String> {
        let mut count: u32 = 0;
        if !self.check(TokenKind::RightParen) {
            loop {
                self.expression()?;
                if count == 255 {
                    self.error("Can't have more than 255 arguments.");
                }
                count += 1;
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after arguments.")?;
        Ok(count as u8)
    }

    // ---- Pratt parsing --------------------------------------------------

    fn parse_precedence(&mut self, precedence: Precedence) -> Result<(), String> {
        self.advance();
        let prefix_rule = get_rule(self.previous.kind).prefix;
        let Some(prefix) = prefix_rule else {
            self.error("Expect expression.");
            return Err("Expect expression.".to_string());
        };

        let can_assign = precedence <= Precedence::Assignment;
        prefix(self, can_assign)?;

        while precedence <= get_rule(self.current.kind).precedence {
            self.advance();
            let infix = get_rule(self.previous.kind).infix.expect("infix rule must exist");
            infix(self, can_assign)?;
        }

        if can_assign && self.match_token(TokenKind::Equal) {
            self.error("Invalid assignment target.");
            return Err("Invalid assignment target.".to_string());
        }
        Ok(())
    }

    fn expression(&mut self) -> Result<(), String> {
        self.parse_precedence(Precedence::Assignment)
    }

    // ---- prefix/infix handlers (signature matches ParseFn) -------------

    fn grouping(&mut self, _can_assign: bool) -> Result<(), String> {
        self.expression()?;
        self.consume(TokenKind::RightParen, "Expect ')' after expression.")
    }

    fn number(&mut self, _can_assign: bool) -> Result<(), String> {
        let line = self.previous.line;
        let value: f64 = self
            .previous
            .lexeme
            .parse()
            .map_err(|_| "Invalid number literal.".to_string())?;
        self.emit_constant(Value::Number(value), line)
    }

    fn string(&mut self, _can_assign: bool) -> Result<(), String> {
        let line = self.previous.line;
        let text = self.previous.lexeme.clone();
        self.emit_constant(Value::String(Rc::from(text.as_str())), line)
    }

    fn literal(&mut self, _can_assign: bool) -> Result<(), String> {
        let line = self.previous.line;
        match self.previous.kind {
            TokenKind::False => self.emit_op(OpCode::False, line),
            TokenKind::True => self.emit_op(OpCode::True, line),
            TokenKind::Null => self.emit_op(OpCode::Null, line),
            _ => unreachable!("literal() called on non-literal token"),
        }
        Ok(())
    }

    fn variable(&mut self, can_assign: bool) -> Result<(), String> {
        let name = self.previous.lexeme.clone();
        self.named_variable(name, can_assign)
    }

    fn this_(&mut self, _can_assign: bool) -> Result<(), String> {
        if self.class_compilers.is_empty() {
            self.error("Can't use 'this' outside of a class.");
            return Err("Can't use 'this' outside of a class.".to_string());
        }
        self.named_variable("this".to_string(), false)
    }

    fn super_(&mut self, _can_assign: bool) -> Result<(), String> {
        let line = self.previous.line;
        if self.class_compilers.is_empty() {
            self.error("'super' cannot be used outside of a class.");
            return Err("'super' cannot be used outside of a class.".to_string());
        } else if !self.class_compilers.last().unwrap().has_superclass {
            self.error("Can't use 'super' in a class with no superclass.");
            return Err("Can't use 'super' in a class with no superclass.".to_string());
        }

        self.consume(TokenKind::Dot, "Expect '.' after 'super'.")?;
        self.consume(TokenKind::Identifier, "Expect superclass method name.")?;
        let name = self.previous.lexeme.clone();
        let name_const = self.identifier_constant(name)?;

        self.named_variable("this".to_string(), false)?;
        if self.match_token(TokenKind::LeftParen) {
            let argc = self.argument_list()?;
            self.named_variable("super".to_string(), false)?;
            self.emit_op_u8(OpCode::SuperInvoke, name_const, line);
            self.emit_byte(argc, line);
        } else {
            self.named_variable("super".to_string(), false)?;
            self.emit_op_u8(OpCode::GetSuper, name_const, line);
        }
        Ok(())
    }

    fn unary(&mut self, _can_assign: bool) -> Result<(), String> {
        let op_kind = self.previous.kind;
        let line = self.previous.line;
        self.parse_precedence(Precedence::Unary)?;
        match op_kind {
            TokenKind::Minus => self.emit_op(OpCode::Negate, line),
            TokenKind::Bang => self.emit_op(OpCode::Not, line),
            TokenKind::Tilde => self.emit_op(OpCode::BwNot, line),
            _ => unreachable!("unary() called on non-unary token"),
        }
        Ok(())
    }

    fn binary(&mut self, _can_assign: bool) -> Result<(), String> {
        let op_kind = self.previous.kind;
        let line = self.previous.line;
        let rule = get_rule(op_kind);
        self.parse_precedence(rule.precedence.next())?;
        match op_kind {
            TokenKind::Plus => self.emit_op(OpCode::Add, line),
            TokenKind::Minus => self.emit_op(OpCode::Subtract, line),
            TokenKind::Star => self.emit_op(OpCode::Multiply, line),
            TokenKind::Slash => self.emit_op(OpCode::Divide, line),
            TokenKind::BangEqual => {
                self.emit_op(OpCode::Equal, line);
                self.emit_op(OpCode::Not, line);
            }
            TokenKind::EqualEqual => self.emit_op(OpCode::Equal, line),
            TokenKind::Greater => self.emit_op(OpCode::Greater, line),
            TokenKind::GreaterEqual => {
                self.emit_op(OpCode::Less, line);
                self.emit_op(OpCode::Not, line);
            }
            TokenKind::Less => self.emit_op(OpCode::Less, line),
            TokenKind::LessEqual => {
                self.emit_op(OpCode::Greater, line);
                self.emit_op(OpCode::Not, line);
            }
            TokenKind::Amp => self.emit_op(OpCode::BwAnd, line),
            TokenKind::Pipe => self.emit_op(OpCode::BwOr, line),
            TokenKind::Caret => self.emit_op(OpCode::BwXor, line),
            _ => unreachable!("binary() called on non-binary token"),
        }
        Ok(())
    }

    fn and_(&mut self, _can_assign: bool) -> Result<(), String> {
        let line = self.previous.line;
        let end_jump = self.emit_jump(OpCode::JumpIfFalse, line);
        self.emit_op(OpCode::Pop, line);
        self.parse_precedence(Precedence::And)?;
        self.patch_jump(end_jump)
    }

    fn or_(&mut self, _can_assign: bool) -> Result<(), String> {
        let line = self.previous.line;
        let else_jump = self.emit_jump(OpCode::JumpIfFalse, line);
        let end_jump = self.emit_jump(OpCode::Jump, line);
        self.patch_jump(else_jump)?;
        self.emit_op(OpCode::Pop, line);
        self.parse_precedence(Precedence::Or)?;
        self.patch_jump(end_jump)
    }

    fn call(&mut self, _can_assign: bool) -> Result<(), String> {
        let line = self.previous.line;
        let argc = self.argument_list()?;
        self.emit_op_u8(OpCode::Call, argc, line);
        Ok(())
    }

    fn dot(&mut self, can_assign: bool) -> Result<(), String> {
        self.consume(TokenKind::Identifier, "Expect property name after '.'.")?;
        let name = self.previous.lexeme.clone();
        let line = self.previous.line;
        let name_const = self.identifier_constant(name)?;

        if can_assign && self.match_token(TokenKind::Equal) {
            self.expression()?;
            self.emit_op_u8(OpCode::SetProperty, name_const, line);
        } else if self.match_token(TokenKind::LeftParen) {
            let argc = self.argument_list()?;
            self.emit_op_u8(OpCode::Invoke, name_const, line);
            self.emit_byte(argc, line);
        } else {
            self.emit_op_u8(OpCode::GetProperty, name_const, line);
        }
        Ok(())
    }

    fn array_literal(&mut self, _can_assign: bool) -> Result<(), String> {
        let line = self.previous.line;
        let mut count: u32 = 0;
        if !self.check(TokenKind::RightBracket) {
            loop {
                self.expression()?;
                if count == 255 {
                    self.error("Can't have more than 255 array elements.");
                }
                count += 1;
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightBracket, "Expect ']' after array elements.")?;
        self.emit_op_u8(OpCode::ArrBuild, count as u8, line);
        Ok(())
    }

    fn index(&mut self, can_assign: bool) -> Result<(), String> {
        let line = self.previous.line;
        self.expression()?;
        self.consume(TokenKind::RightBracket, "Expect ']' after index.")?;
        if can_assign && self.match_token(TokenKind::Equal) {
            self.expression()?;
            self.emit_op(OpCode::ArrStore, line);
        } else {
            self.emit_op(OpCode::ArrIndex, line);
        }
        Ok(())
    }

    // ---- statements / declarations --------------------------------------

    fn block(&mut self) -> Result<(), String> {
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.declaration();
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after block.")
    }

    fn push_compiler(&mut self, function_type: FunctionType, name: String) {
        let mut new_compiler = Box::new(Compiler::new(function_type, name, None));
        std::mem::swap(&mut self.compiler, &mut new_compiler);
        self.compiler.enclosing = Some(new_compiler);
    }

    fn end_current_function(&mut self) -> (FunctionObj, Vec<(bool, u8)>) {
        let upvalues = self.compiler.upvalue_capture_bytes();
        let enclosing = self
            .compiler
            .enclosing
            .take()
            .expect("end_current_function called without an enclosing compiler");
        let finished = std::mem::replace(&mut self.compiler, enclosing);
        (finished.function, upvalues)
    }

    fn function(&mut self, function_type: FunctionType, name: String) -> Result<(), String> {
        self.push_compiler(function_type, name);
        self.compiler.begin_scope();

        self.consume(TokenKind::LeftParen, "Expect '(' after function name.")?;
        if !self.check(TokenKind::RightParen) {
            loop {
                if self.compiler.function.arity == 255 {
                    self.error_at_current("Can't have more than 255 parameters.");
                }
                self.compiler.function.arity = self.compiler.function.arity.saturating_add(1);
                let param_const = self.parse_variable("Expect parameter name.")?;
                let line = self.previous.line;
                self.define_variable(param_const, line);
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after parameters.")?;
        self.consume(TokenKind::LeftBrace, "Expect '{' before function body.")?;
        self.block()?;

        let line = self.previous.line;
        self.emit_return(line);
        let (function, upvalues) = self.end_current_function();
        let const_idx = match self.current_chunk().add_constant(Value::Function(Rc::new(function))) {
            Some(idx) => idx,
            None => {
                self.error("Too many constants in one chunk.");
                return Err("Too many constants in one chunk.".to_string());
            }
        };
        self.emit_op_u8(OpCode::Closure, const_idx, line);
        for (is_local, index) in upvalues {
            self.emit_byte(if is_local { 1 } else { 0 }, line);
            self.emit_byte(index, line);
        }
        Ok(())
    }

    fn method(&mut self) -> Result<(), String> {
        self.consume(TokenKind::Identifier, "Expect method name.")?;
        let name = self.previous.lexeme.clone();
        let line = self.previous.line;
        let name_const = self.identifier_constant(name.clone())?;
        let function_type = if name == "init" {
            FunctionType::Initializer
        } else {
            FunctionType::Method
        };
        self.function(function_type, name)?;
        self.emit_op_u8(OpCode::Method, name_const, line);
        Ok(())
    }

    fn class_declaration(&mut self) -> Result<(), String> {
        self.consume(TokenKind::Identifier, "Expect class name.")?;
        let class_name = self.previous.lexeme.clone();
        let line = self.previous.line;
        let name_const = self.identifier_constant(class_name.clone())?;
        self.declare_variable_current()?;

        self.emit_op_u8(OpCode::Class, name_const, line);
        self.define_variable(name_const, line);

        self.class_compilers.push(ClassCompilerState {
            has_superclass: false,
        });

        if self.match_token(TokenKind::Less) {
            self.consume(TokenKind::Identifier, "Expect superclass name.")?;
            let superclass_name = self.previous.lexeme.clone();
            self.variable(false)?;

            if superclass_name == class_name {
                self.error("A class cannot inherit from itself.");
            }

            self.compiler.begin_scope();
            self.compiler.declare_variable("super").ok();
            self.compiler.mark_initialized();
            self.named_variable(class_name.clone(), false)?;
            self.emit_op(OpCode::Inherit, line);
            self.class_compilers.last_mut().unwrap().has_superclass = true;
        }

        self.named_variable(class_name.clone(), false)?;
        self.consume(TokenKind::LeftBrace, "Expect '{' before class body.")?;
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.method()?;
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after class body.")?;
        self.emit_op(OpCode::Pop, line);

        let had_superclass = self.class_compilers.last().unwrap().has_superclass;
        if had_superclass {
            self.compiler.end_scope(line);
        }
        self.class_compilers.pop();
        Ok(())
    }

    fn fun_declaration(&mut self) -> Result<(), String> {
        let global = self.parse_variable("Expect function name.")?;
        self.compiler.mark_initialized();
        let name = self.previous.lexeme.clone();
        self.function(FunctionType::Function, name)?;
        let line = self.previous.line;
        self.define_variable(global, line);
        Ok(())
    }

    fn var_declaration(&mut self) -> Result<(), String> {
        let global = self.parse_variable("Expect variable name.")?;
        let line = self.previous.line;
        if self.match_token(TokenKind::Equal) {
            self.expression()?;
        } else {
            self.emit_op(OpCode::Null, line);
        }
        self.consume(TokenKind::Semicolon, "Expect ';' after variable declaration.")?;
        self.define_variable(global, line);
        Ok(())
    }

    fn expression_statement(&mut self) -> Result<(), String> {
        self.expression()?;
        let line = self.previous.line;
        self.consume(TokenKind::Semicolon, "Expect ';' after expression.")?;
        self.emit_op(OpCode::Pop, line);
        Ok(())
    }

    fn print_statement(&mut self) -> Result<(), String> {
        self.expression()?;
        let line = self.previous.line;
        self.consume(TokenKind::Semicolon, "Expect ';' after value.")?;
        self.emit_op(OpCode::Print, line);
        Ok(())
    }

    fn if_statement(&mut self) -> Result<(), String> {
        self.consume(TokenKind::LeftParen, "Expect '(' after 'if'.")?;
        self.expression()?;
        self.consume(TokenKind::RightParen, "Expect ')' after condition.")?;
        let line = self.previous.line;

        let then_jump = self.emit_jump(OpCode::JumpIfFalse, line);
        self.emit_op(OpCode::Pop, line);
        self.statement()?;

        let else_jump = self.emit_jump(OpCode::Jump, line);
        self.patch_jump(then_jump)?;
        self.emit_op(OpCode::Pop, line);

        if self.match_token(TokenKind::Else) {
            self.statement()?;
        }
        self.patch_jump(else_jump)
    }

    fn while_statement(&mut self) -> Result<(), String> {
        let loop_start = self.current_chunk().count();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'while'.")?;
        self.expression()?;
        self.consume(TokenKind::RightParen, "Expect ')' after condition.")?;
        let line = self.previous.line;

        let exit_jump = self.emit_jump(OpCode::JumpIfFalse, line);
        self.emit_op(OpCode::Pop, line);
        self.statement()?;
        self.emit_loop(loop_start, line)?;

        self.patch_jump(exit_jump)?;
        self.emit_op(OpCode::Pop, line);
        Ok(())
    }

    fn for_statement(&mut self) -> Result<(), String> {
        self.compiler.begin_scope();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'for'.")?;

        if self.match_token(TokenKind::Semicolon) {
            // no initializer
        } else if self.match_token(TokenKind::Var) {
            self.var_declaration()?;
        } else {
            self.expression_statement()?;
        }

        let mut loop_start = self.current_chunk().count();
        let mut exit_jump: Option<usize> = None;

        if !self.match_token(TokenKind::Semicolon) {
            self.expression()?;
            self.consume(TokenKind::Semicolon, "Expect ';' after loop condition.")?;
            let line = self.previous.line;
            exit_jump = Some(self.emit_jump(OpCode::JumpIfFalse, line));
            self.emit_op(OpCode::Pop, line);
        }

        if !self.match_token(TokenKind::RightParen) {
            let line = self.previous.line;
            let body_jump = self.emit_jump(OpCode::Jump, line);
            let incr_start = self.current_chunk().count();
            self.expression()?;
            let line = self.previous.line;
            self.emit_op(OpCode::Pop, line);
            self.consume(TokenKind::RightParen, "Expect ')' after for clauses.")?;

            self.emit_loop(loop_start, line)?;
            loop_start = incr_start;
            self.patch_jump(body_jump)?;
        }

        self.statement()?;
        let line = self.previous.line;
        self.emit_loop(loop_start, line)?;

        if let Some(exit_jump) = exit_jump {
            self.patch_jump(exit_jump)?;
            self.emit_op(OpCode::Pop, line);
        }

        self.compiler.end_scope(line);
        Ok(())
    }

    fn return_statement(&mut self) -> Result<(), String> {
        let line = self.previous.line;
        if self.compiler.function_type == FunctionType::Script {
            self.error("Cannot return from top-level code.");
        }

        if self.match_token(TokenKind::Semicolon) {
            self.emit_return(line);
        } else {
            if self.compiler.function_type == FunctionType::Initializer {
                self.error("Can't return a value from an initializer.");
            }
            self.expression()?;
            self.consume(TokenKind::Semicolon, "Expect ';' after return value.")?;
            self.emit_op(OpCode::Return, line);
        }
        Ok(())
    }

    fn statement(&mut self) -> Result<(), String> {
        if self.match_token(TokenKind::Print) {
            self.print_statement()
        } else if self.match_token(TokenKind::For) {
            self.for_statement()
        } else if self.match_token(TokenKind::If) {
            self.if_statement()
        } else if self.match_token(TokenKind::Return) {
            self.return_statement()
        } else if self.match_token(TokenKind::While) {
            self.while_statement()
        } else if self.match_token(TokenKind::LeftBrace) {
            self.compiler.begin_scope();
            self.block()?;
            let line = self.previous.line;
            self.compiler.end_scope(line);
            Ok(())
        } else {
            self.expression_statement()
        }
    }

    fn declaration(&mut self) {
        let result = if self.match_token(TokenKind::Class) {
            self.class_declaration()
        } else if self.match_token(TokenKind::Func) {
            self.fun_declaration()
        } else if self.match_token(TokenKind::Var) {
            self.var_declaration()
        } else {
            self.statement()
        };

        if result.is_err() || self.panic_mode {
            self.synchronize();
        }
    }
}

/// Compile `source` into a top-level function (arity 0, empty name) whose
/// chunk is the whole program. `Err` carries every reported compile error
/// message; the caller is expected to have already seen them on stderr.
pub fn compile(source: &str) -> Result<Rc<FunctionObj>, Vec<String>> {
    let mut parser = Parser::new(source);

    while !parser.check(TokenKind::Eof) {
        parser.declaration();
    }

    let line = parser.previous.line;
    parser.emit_return(line);

    if parser.had_error {
        Err(parser.errors)
    } else {
        Ok(Rc::new(parser.compiler.function))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compiles_ok(source: &str) -> Rc<FunctionObj> {
        compile(source).unwrap_or_else(|errs| panic!("expected clean compile, got {errs:?}"))
    }

    #[test]
    fn compiles_simple_arithmetic() {
        let f = compiles_ok("print 1 + 2 * 3;");
        assert!(f.chunk.count() > 0);
    }

    #[test]
    fn rejects_reading_own_initializer() {
        let err = compile("{ var x = x; }").unwrap_err();
        assert!(err.iter().any(|m| m.contains("its own initializer")));
    }

    #[test]
    fn rejects_self_inheriting_class() {
        let err = compile("class A < A {}").unwrap_err();
        assert!(err.iter().any(|m| m.contains("cannot inherit from itself")));
    }

    #[test]
    fn rejects_top_level_return() {
        let err = compile("return 1;").unwrap_err();
        assert!(err.iter().any(|m| m == "Cannot return from top-level code."));
    }

    #[test]
    fn rejects_super_outside_class() {
        let err = compile("super.x;").unwrap_err();
        assert!(err.iter().any(|m| m.contains("'super' cannot be used outside of a class")));
    }

    #[test]
    fn compiles_nested_closures() {
        compiles_ok(
            "func make() { var x = 0; func incr() { x = x + 1; return x; } return incr; }",
        );
    }

    #[test]
    fn compiles_class_with_inheritance_and_super() {
        compiles_ok(
            "class A { greet() { print \"hi\"; } } \
             class B < A { greet() { super.greet(); } }",
        );
    }
}
