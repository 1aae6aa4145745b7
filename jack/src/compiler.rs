//! Single pass compiler from Jack source to VM instructions.
//!
//! There is no syntax tree: every production emits its instructions through
//! the [`VmWriter`] as soon as it is recognized. Productions take the token
//! [`Cursor`] explicitly so each one can be driven on its own. A cursor built
//! with [`Cursor::with_tree`] also records the parse tree as XML on the way.
use std::fmt::{self, Display, Formatter};
use std::mem;

use log::debug;

use crate::error::{CompileError, Pos, Result};
use crate::scanner::{Scanner, Token};
use crate::symbols::{Redefinition, Scopes, Type, VarKind};
use crate::vm::{BinaryOp, Instruction, Segment, SubKind, UnaryOp, VmWriter};
use crate::xml::TreeWriter;

/// Expressions, terms and statement blocks open deeper than this are
/// rejected instead of exhausting the stack.
pub const MAX_NESTING: usize = 256;

/// A scanner plus one token of lookahead.
pub struct Cursor<'a> {
    scanner: Scanner<'a>,
    tok: Token,
    pos: Pos,
    tree: Option<TreeWriter>,
}

impl<'a> Cursor<'a> {
    pub fn new(source: &'a [u8]) -> Result<Self> {
        let mut scanner = Scanner::new(source);
        let tok = scanner.scan_token()?;
        let pos = scanner.pos();
        Ok(Self {
            scanner,
            tok,
            pos,
            tree: None,
        })
    }

    /// Records every grammar rule and consumed token from here on.
    pub fn with_tree(mut self) -> Self {
        self.tree = Some(TreeWriter::new());
        self
    }

    pub fn open(&mut self, rule: &str) {
        if let Some(tree) = &mut self.tree {
            tree.open(rule);
        }
    }

    pub fn close(&mut self, rule: &str) {
        if let Some(tree) = &mut self.tree {
            tree.close(rule);
        }
    }

    pub fn take_tree(&mut self) -> Option<String> {
        self.tree.take().map(TreeWriter::finish)
    }

    pub fn tok(&self) -> &Token {
        &self.tok
    }

    pub fn pos(&self) -> Pos {
        self.pos
    }

    /// Returns the current token and moves to the next one.
    pub fn consume(&mut self) -> Result<Token> {
        let next_tok = self.scanner.scan_token()?;
        self.pos = self.scanner.pos();
        let tok = mem::replace(&mut self.tok, next_tok);
        if let Some(tree) = &mut self.tree {
            tree.token(&tok);
        }
        Ok(tok)
    }

    pub fn want(&mut self, tok: &Token) -> Result<bool> {
        if &self.tok == tok {
            self.consume()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn unexpected(&self, expected: &'static str) -> CompileError {
        CompileError::UnexpectedToken {
            pos: self.pos,
            found: self.tok.describe(),
            expected,
        }
    }

    pub fn expect(
        &mut self,
        accept: impl FnOnce(&Token) -> bool,
        expected: &'static str,
    ) -> Result<Token> {
        if accept(&self.tok) {
            self.consume()
        } else {
            Err(self.unexpected(expected))
        }
    }

    pub fn expect_token(&mut self, accept: &Token) -> Result<()> {
        self.expect(|tok| tok == accept, accept.as_str()).map(|_| ())
    }

    pub fn expect_ident(&mut self) -> Result<String> {
        match self.expect(|tok| matches!(tok, Token::Ident(_)), "identifier")? {
            Token::Ident(name) => Ok(name),
            _ => unreachable!(),
        }
    }
}

fn binary_op(tok: &Token) -> Option<BinaryOp> {
    match tok {
        Token::Plus => Some(BinaryOp::Add),
        Token::Minus => Some(BinaryOp::Sub),
        Token::Asterisk => Some(BinaryOp::Mul),
        Token::Slash => Some(BinaryOp::Div),
        Token::And => Some(BinaryOp::And),
        Token::Or => Some(BinaryOp::Or),
        Token::Lt => Some(BinaryOp::Lt),
        Token::Gt => Some(BinaryOp::Gt),
        Token::Equal => Some(BinaryOp::Eq),
        _ => None,
    }
}

/// Code generator for one class.
pub struct CodeGen {
    class_name: String,
    scopes: Scopes,
    writer: VmWriter,
    depth: usize,
}

impl CodeGen {
    pub fn new(class_name: &str) -> Self {
        Self {
            class_name: class_name.to_string(),
            scopes: Scopes::new(),
            writer: VmWriter::new(),
            depth: 0,
        }
    }

    pub fn scopes(&self) -> &Scopes {
        &self.scopes
    }

    pub fn instructions(&self) -> &[Instruction] {
        self.writer.instructions()
    }

    pub fn into_instructions(self) -> Vec<Instruction> {
        self.writer.into_instructions()
    }

    /// Runs `production` one nesting level deeper.
    fn nested(
        &mut self,
        cur: &mut Cursor<'_>,
        production: fn(&mut Self, &mut Cursor<'_>) -> Result<()>,
    ) -> Result<()> {
        if self.depth >= MAX_NESTING {
            return Err(CompileError::TooDeep { pos: cur.pos() });
        }
        self.depth += 1;
        let res = production(self, cur);
        self.depth -= 1;
        res
    }

    fn define(&mut self, pos: Pos, ty: Type, name: &str, kind: VarKind) -> Result<()> {
        let table = match kind {
            VarKind::Static | VarKind::Field => &mut self.scopes.class,
            VarKind::Arg | VarKind::Local => &mut self.scopes.subroutine,
        };
        table
            .define(ty, name, kind)
            .map(|_| ())
            .map_err(|Redefinition(name)| CompileError::Redefined { pos, name })
    }

    /// Segment and index of a variable visible from the current subroutine.
    fn lookup(&self, name: &str, pos: Pos) -> Result<(Segment, u32)> {
        self.scopes
            .resolve(name)
            .map(|sym| (sym.kind.into(), sym.index))
            .ok_or_else(|| CompileError::UndefinedVariable {
                pos,
                name: name.to_string(),
            })
    }

    fn type_ref(&mut self, cur: &mut Cursor<'_>) -> Result<Type> {
        let ty = cur.expect(
            |tok| matches!(tok, Token::Int | Token::Char | Token::Boolean | Token::Ident(_)),
            "type",
        )?;
        Ok(match ty {
            Token::Int => Type::Int,
            Token::Char => Type::Char,
            Token::Boolean => Type::Boolean,
            Token::Ident(name) => Type::Class(name),
            _ => unreachable!(),
        })
    }

    /// `type name (',' name)* ';'`, defining every name with `kind`.
    fn var_names(&mut self, cur: &mut Cursor<'_>, kind: VarKind) -> Result<()> {
        let ty = self.type_ref(cur)?;
        loop {
            let pos = cur.pos();
            let name = cur.expect_ident()?;
            self.define(pos, ty.clone(), &name, kind)?;
            let tok = cur.expect(|tok| matches!(tok, Token::Comma | Token::Semicolon), ", or ;")?;
            if tok == Token::Semicolon {
                return Ok(());
            }
        }
    }

    pub fn class_var_dec(&mut self, cur: &mut Cursor<'_>) -> Result<()> {
        cur.open("classVarDec");
        let kind = match cur.expect(|tok| matches!(tok, Token::Static | Token::Field), "static or field")? {
            Token::Static => VarKind::Static,
            Token::Field => VarKind::Field,
            _ => unreachable!(),
        };
        self.var_names(cur, kind)?;
        cur.close("classVarDec");
        Ok(())
    }

    pub fn var_dec(&mut self, cur: &mut Cursor<'_>) -> Result<()> {
        cur.open("varDec");
        cur.expect_token(&Token::Var)?;
        self.var_names(cur, VarKind::Local)?;
        cur.close("varDec");
        Ok(())
    }

    fn parameter_list(&mut self, cur: &mut Cursor<'_>) -> Result<()> {
        cur.open("parameterList");
        if !matches!(cur.tok(), Token::RParen) {
            loop {
                let ty = self.type_ref(cur)?;
                let pos = cur.pos();
                let name = cur.expect_ident()?;
                self.define(pos, ty, &name, VarKind::Arg)?;
                if !cur.want(&Token::Comma)? {
                    break;
                }
            }
        }
        cur.close("parameterList");
        Ok(())
    }

    pub fn subroutine_dec(&mut self, cur: &mut Cursor<'_>) -> Result<()> {
        cur.open("subroutineDec");
        let lead = cur.expect(
            |tok| matches!(tok, Token::Constructor | Token::Function | Token::Method),
            "constructor, function or method",
        )?;
        let kind = match lead {
            Token::Constructor => SubKind::Ctor,
            Token::Function => SubKind::Func,
            Token::Method => SubKind::Method,
            _ => unreachable!(),
        };
        if !cur.want(&Token::Void)? {
            self.type_ref(cur)?;
        }
        let pos = cur.pos();
        let sub_name = cur.expect_ident()?;

        self.scopes.enter_subroutine();
        if kind == SubKind::Method {
            let this_ty = Type::Class(self.class_name.clone());
            self.define(pos, this_ty, "this", VarKind::Arg)?;
        }
        cur.expect_token(&Token::LParen)?;
        self.parameter_list(cur)?;
        cur.expect_token(&Token::RParen)?;

        cur.open("subroutineBody");
        cur.expect_token(&Token::LBrace)?;
        while matches!(cur.tok(), Token::Var) {
            self.var_dec(cur)?;
        }

        let fn_name = format!("{}.{}", self.class_name, sub_name);
        let locals = self.scopes.subroutine.var_count(VarKind::Local);
        let size = self.scopes.class.var_count(VarKind::Field)
            + self.scopes.class.var_count(VarKind::Static);
        self.writer.write_function(kind, &fn_name, locals, size);
        if kind == SubKind::Method {
            self.writer.write_push(Segment::Argument, 0);
            self.writer.write_pop(Segment::Pointer, 0);
        }
        debug!("{}: {:?} {} with {} locals", pos, kind, fn_name, locals);

        self.statements(cur)?;
        cur.expect_token(&Token::RBrace)?;
        cur.close("subroutineBody");
        cur.close("subroutineDec");
        Ok(())
    }

    /// Everything after the class name: `'{' classVarDec* subroutineDec* '}'`.
    pub fn class_body(&mut self, cur: &mut Cursor<'_>) -> Result<()> {
        cur.expect_token(&Token::LBrace)?;
        while matches!(cur.tok(), Token::Static | Token::Field) {
            self.class_var_dec(cur)?;
        }
        while matches!(
            cur.tok(),
            Token::Constructor | Token::Function | Token::Method
        ) {
            self.subroutine_dec(cur)?;
        }
        cur.expect_token(&Token::RBrace)
    }

    pub fn statements(&mut self, cur: &mut Cursor<'_>) -> Result<()> {
        self.nested(cur, Self::statements_body)
    }

    fn statements_body(&mut self, cur: &mut Cursor<'_>) -> Result<()> {
        cur.open("statements");
        loop {
            match cur.tok() {
                Token::Let => self.let_stmt(cur)?,
                Token::If => self.if_stmt(cur)?,
                Token::While => self.while_stmt(cur)?,
                Token::Do => self.do_stmt(cur)?,
                Token::Return => self.return_stmt(cur)?,
                _ => break,
            }
        }
        cur.close("statements");
        Ok(())
    }

    fn block(&mut self, cur: &mut Cursor<'_>) -> Result<()> {
        cur.expect_token(&Token::LBrace)?;
        self.statements(cur)?;
        cur.expect_token(&Token::RBrace)
    }

    pub fn let_stmt(&mut self, cur: &mut Cursor<'_>) -> Result<()> {
        cur.open("letStatement");
        cur.expect_token(&Token::Let)?;
        let pos = cur.pos();
        let name = cur.expect_ident()?;
        let (seg, index) = self.lookup(&name, pos)?;
        if cur.want(&Token::LBrack)? {
            self.expression(cur)?;
            cur.expect_token(&Token::RBrack)?;
            self.writer.write_push(seg, index);
            self.writer.write_binary_op(BinaryOp::Add);
            cur.expect_token(&Token::Equal)?;
            self.expression(cur)?;
            cur.expect_token(&Token::Semicolon)?;
            // the element address stays below the value until both are popped
            self.writer.write_pop(Segment::Temp, 0);
            self.writer.write_pop(Segment::Pointer, 1);
            self.writer.write_push(Segment::Temp, 0);
            self.writer.write_pop(Segment::That, 0);
        } else {
            cur.expect_token(&Token::Equal)?;
            self.expression(cur)?;
            cur.expect_token(&Token::Semicolon)?;
            self.writer.write_pop(seg, index);
        }
        cur.close("letStatement");
        Ok(())
    }

    pub fn if_stmt(&mut self, cur: &mut Cursor<'_>) -> Result<()> {
        let false_label = self.writer.new_label();
        let end_label = self.writer.new_label();
        cur.open("ifStatement");
        cur.expect_token(&Token::If)?;
        cur.expect_token(&Token::LParen)?;
        self.expression(cur)?;
        cur.expect_token(&Token::RParen)?;
        self.writer.write_if(&false_label);
        self.block(cur)?;
        self.writer.write_goto(&end_label);
        self.writer.write_label(&false_label);
        if cur.want(&Token::Else)? {
            self.block(cur)?;
        }
        self.writer.write_label(&end_label);
        cur.close("ifStatement");
        Ok(())
    }

    pub fn while_stmt(&mut self, cur: &mut Cursor<'_>) -> Result<()> {
        let top_label = self.writer.new_label();
        let bottom_label = self.writer.new_label();
        cur.open("whileStatement");
        cur.expect_token(&Token::While)?;
        self.writer.write_label(&top_label);
        cur.expect_token(&Token::LParen)?;
        self.expression(cur)?;
        cur.expect_token(&Token::RParen)?;
        self.writer.write_if(&bottom_label);
        self.block(cur)?;
        self.writer.write_goto(&top_label);
        self.writer.write_label(&bottom_label);
        cur.close("whileStatement");
        Ok(())
    }

    pub fn do_stmt(&mut self, cur: &mut Cursor<'_>) -> Result<()> {
        cur.open("doStatement");
        cur.expect_token(&Token::Do)?;
        let pos = cur.pos();
        let name = cur.expect_ident()?;
        if !matches!(cur.tok(), Token::Period | Token::LParen) {
            return Err(cur.unexpected(". or ("));
        }
        let (fn_name, args) = self.subroutine_call(cur, name, pos)?;
        cur.expect_token(&Token::Semicolon)?;
        self.writer.write_do(&fn_name, args);
        cur.close("doStatement");
        Ok(())
    }

    pub fn return_stmt(&mut self, cur: &mut Cursor<'_>) -> Result<()> {
        cur.open("returnStatement");
        cur.expect_token(&Token::Return)?;
        if cur.want(&Token::Semicolon)? {
            // void subroutines still hand a value back to the caller
            self.writer.write_push(Segment::Constant, 0);
        } else {
            self.expression(cur)?;
            cur.expect_token(&Token::Semicolon)?;
        }
        self.writer.write_return();
        cur.close("returnStatement");
        Ok(())
    }

    /// Pushes the receiver (if any) and the arguments of a call whose first
    /// identifier `name` has already been consumed. Returns the function to
    /// call and its argument count, receiver included.
    ///
    /// `obj.m(..)` on a variable calls `Type.m` with the object as argument 0.
    /// A bare `m(..)` is a method call on `this`. Any other `Name.m(..)` is a
    /// call into another class, which is not checked to exist.
    fn subroutine_call(
        &mut self,
        cur: &mut Cursor<'_>,
        name: String,
        pos: Pos,
    ) -> Result<(String, u32)> {
        let (fn_name, receiver) = if cur.want(&Token::Period)? {
            let member = cur.expect_ident()?;
            match self.scopes.resolve(&name) {
                Some(sym) => {
                    let class = sym.ty.class_name().ok_or_else(|| CompileError::NotAnObject {
                        pos,
                        name: name.clone(),
                        ty: sym.ty.to_string(),
                    })?;
                    let fn_name = format!("{}.{}", class, member);
                    self.writer.write_push(sym.kind.into(), sym.index);
                    (fn_name, 1)
                }
                None => {
                    debug!("{}: {}.{} is an external call", pos, name, member);
                    (format!("{}.{}", name, member), 0)
                }
            }
        } else {
            self.writer.write_push(Segment::Pointer, 0);
            (format!("{}.{}", self.class_name, name), 1)
        };
        cur.expect_token(&Token::LParen)?;
        let args = self.expression_list(cur)?;
        cur.expect_token(&Token::RParen)?;
        Ok((fn_name, receiver + args))
    }

    fn expression_list(&mut self, cur: &mut Cursor<'_>) -> Result<u32> {
        cur.open("expressionList");
        let mut count = 0;
        if !matches!(cur.tok(), Token::RParen) {
            loop {
                self.expression(cur)?;
                count += 1;
                if !cur.want(&Token::Comma)? {
                    break;
                }
            }
        }
        cur.close("expressionList");
        Ok(count)
    }

    /// `term (op term)*`, evaluated left to right without precedence.
    pub fn expression(&mut self, cur: &mut Cursor<'_>) -> Result<()> {
        self.nested(cur, Self::expression_body)
    }

    fn expression_body(&mut self, cur: &mut Cursor<'_>) -> Result<()> {
        cur.open("expression");
        self.term(cur)?;
        while let Some(op) = binary_op(cur.tok()) {
            cur.consume()?;
            self.term(cur)?;
            self.writer.write_binary_op(op);
        }
        cur.close("expression");
        Ok(())
    }

    pub fn term(&mut self, cur: &mut Cursor<'_>) -> Result<()> {
        self.nested(cur, Self::term_body)
    }

    fn term_body(&mut self, cur: &mut Cursor<'_>) -> Result<()> {
        cur.open("term");
        let pos = cur.pos();
        let lead = cur.expect(
            |tok| {
                matches!(
                    tok,
                    Token::IntLit(_)
                        | Token::StringLit(_)
                        | Token::True
                        | Token::False
                        | Token::Null
                        | Token::This
                        | Token::Ident(_)
                        | Token::LParen
                        | Token::Minus
                        | Token::Tilde
                )
            },
            "expression",
        )?;
        match lead {
            Token::IntLit(n) => self.writer.write_push(Segment::Constant, u32::from(n)),
            Token::StringLit(s) => self.writer.write_string(&s),
            Token::True => {
                self.writer.write_push(Segment::Constant, 1);
                self.writer.write_unary_op(UnaryOp::Neg);
            }
            Token::False | Token::Null => self.writer.write_push(Segment::Constant, 0),
            Token::This => self.writer.write_push(Segment::Pointer, 0),
            Token::LParen => {
                self.expression(cur)?;
                cur.expect_token(&Token::RParen)?;
            }
            Token::Minus => {
                self.term(cur)?;
                self.writer.write_unary_op(UnaryOp::Neg);
            }
            Token::Tilde => {
                self.term(cur)?;
                self.writer.write_unary_op(UnaryOp::Not);
            }
            Token::Ident(name) => match cur.tok() {
                Token::LBrack => {
                    let (seg, index) = self.lookup(&name, pos)?;
                    cur.consume()?;
                    self.writer.write_push(seg, index);
                    self.expression(cur)?;
                    cur.expect_token(&Token::RBrack)?;
                    self.writer.write_binary_op(BinaryOp::Add);
                    self.writer.write_pop(Segment::Pointer, 1);
                    self.writer.write_push(Segment::That, 0);
                }
                Token::Period | Token::LParen => {
                    let (fn_name, args) = self.subroutine_call(cur, name, pos)?;
                    self.writer.write_call(&fn_name, args);
                }
                _ => {
                    let (seg, index) = self.lookup(&name, pos)?;
                    self.writer.write_push(seg, index);
                }
            },
            _ => unreachable!(),
        }
        cur.close("term");
        Ok(())
    }
}

/// VM code of one compiled class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledClass {
    pub name: String,
    pub instructions: Vec<Instruction>,
}

impl Display for CompiledClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for instr in &self.instructions {
            writeln!(f, "{}", instr)?;
        }
        Ok(())
    }
}

fn compile_class(cur: &mut Cursor<'_>) -> Result<CompiledClass> {
    cur.open("class");
    cur.expect_token(&Token::Class)?;
    let name = cur.expect_ident()?;
    debug!("compiling class {}", name);

    let mut gen = CodeGen::new(&name);
    gen.class_body(cur)?;
    cur.close("class");
    cur.expect_token(&Token::EOF)?;

    Ok(CompiledClass {
        name,
        instructions: gen.into_instructions(),
    })
}

/// Compiles the single class in `source`. Nothing is returned for a class
/// with any lexical or syntax error.
pub fn compile(source: &[u8]) -> Result<CompiledClass> {
    compile_class(&mut Cursor::new(source)?)
}

/// Like [`compile`], also returning the parse tree of the class as XML.
pub fn compile_with_tree(source: &[u8]) -> Result<(CompiledClass, String)> {
    let mut cur = Cursor::new(source)?.with_tree();
    let class = compile_class(&mut cur)?;
    let tree = cur.take_tree().unwrap_or_default();
    Ok((class, tree))
}
