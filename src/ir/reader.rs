//! Textual IR reader.
//!
//! Hand-rolled lexer plus a two-phase parser: function bodies are first
//! collected into lightweight parsed statements, then built into arena
//! entities once every label and value name is known, so forward references
//! (phis, branches to later blocks) resolve without lookahead tricks.

use std::collections::HashMap;

use thiserror::Error;

use crate::{
    ir::{
        BlockRef, CmpCond, ConstData, GlobalRef, InstKind, InstRef, Module, Opcode, ValueSSA,
        builder::IRBuilder,
    },
    typing::{DataLayout, FloatKind, ValTypeID},
};

#[derive(Debug, Clone, Error)]
#[error("{line}:{col}: {msg}")]
pub struct ParseError {
    pub line: u32,
    pub col: u32,
    pub msg: String,
}

pub fn parse_module(name: impl Into<String>, src: &str) -> Result<Module, ParseError> {
    let tokens = Lexer::new(src).run()?;
    let parsed = Parser { tokens, pos: 0 }.parse_tops()?;
    build_module(name.into(), parsed)
}

// ---------------------------------------------------------------------------
// lexer

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Global(String),
    Local(String),
    Int(i64),
    Float(f64),
    Punct(char),
    Eof,
}

#[derive(Debug, Clone)]
struct SpannedTok {
    tok: Tok,
    line: u32,
    col: u32,
}

struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    line: u32,
    col: u32,
}

fn is_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'.' || b == b'$'
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self { src: src.as_bytes(), pos: 0, line: 1, col: 1 }
    }

    fn error(&self, msg: impl Into<String>) -> ParseError {
        ParseError { line: self.line, col: self.col, msg: msg.into() }
    }

    fn bump(&mut self) -> u8 {
        let b = self.src[self.pos];
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        b
    }
    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn run(mut self) -> Result<Vec<SpannedTok>, ParseError> {
        let mut out = Vec::new();
        loop {
            match self.peek() {
                None => break,
                Some(b) if b.is_ascii_whitespace() => {
                    self.bump();
                }
                Some(b';') => {
                    while let Some(b) = self.peek() {
                        if b == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some(_) => {
                    let (line, col) = (self.line, self.col);
                    let tok = self.lex_token()?;
                    out.push(SpannedTok { tok, line, col });
                }
            }
        }
        out.push(SpannedTok { tok: Tok::Eof, line: self.line, col: self.col });
        Ok(out)
    }

    fn lex_token(&mut self) -> Result<Tok, ParseError> {
        let b = self.peek().unwrap();
        match b {
            b'@' | b'%' => {
                self.bump();
                let name = self.lex_word();
                if name.is_empty() {
                    return Err(self.error("expected a name after sigil"));
                }
                Ok(if b == b'@' { Tok::Global(name) } else { Tok::Local(name) })
            }
            b'(' | b')' | b'{' | b'}' | b'[' | b']' | b',' | b'=' | b':' => {
                self.bump();
                Ok(Tok::Punct(b as char))
            }
            b'-' => {
                self.bump();
                match self.peek() {
                    Some(d) if d.is_ascii_digit() => self.lex_number(true),
                    Some(a) if a.is_ascii_alphabetic() => {
                        // negative float spellings such as `-inf`
                        let word = format!("-{}", self.lex_word());
                        word.parse::<f64>()
                            .map(Tok::Float)
                            .map_err(|_| self.error(format!("bad numeric literal `{word}`")))
                    }
                    _ => Err(self.error("stray `-`")),
                }
            }
            d if d.is_ascii_digit() => self.lex_number(false),
            a if is_ident_char(a) => Ok(Tok::Ident(self.lex_word())),
            other => Err(self.error(format!("unexpected character `{}`", other as char))),
        }
    }

    fn lex_word(&mut self) -> String {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if is_ident_char(b) {
                self.bump();
            } else {
                break;
            }
        }
        String::from_utf8_lossy(&self.src[start..self.pos]).into_owned()
    }

    fn lex_number(&mut self, negative: bool) -> Result<Tok, ParseError> {
        let start = self.pos;
        let mut is_float = false;
        while let Some(b) = self.peek() {
            match b {
                b'0'..=b'9' => {
                    self.bump();
                }
                b'.' | b'e' | b'E' => {
                    is_float = true;
                    self.bump();
                    if matches!(self.peek(), Some(b'+') | Some(b'-')) {
                        self.bump();
                    }
                }
                _ => break,
            }
        }
        let body = String::from_utf8_lossy(&self.src[start..self.pos]).into_owned();
        let text = if negative { format!("-{body}") } else { body };
        if is_float {
            text.parse::<f64>()
                .map(Tok::Float)
                .map_err(|_| self.error(format!("bad float literal `{text}`")))
        } else {
            text.parse::<i64>()
                .map(Tok::Int)
                .map_err(|_| self.error(format!("integer literal `{text}` out of range")))
        }
    }
}

// ---------------------------------------------------------------------------
// parsed form

#[derive(Debug, Clone)]
enum PVal {
    Local(String),
    Global(String),
    Label(String),
    Const(ConstData),
}

#[derive(Debug)]
struct PInst {
    result: Option<String>,
    opcode: Opcode,
    kind: InstKind,
    ret_type: ValTypeID,
    operands: Vec<PVal>,
    line: u32,
    col: u32,
}

#[derive(Debug)]
struct PBlock {
    label: String,
    insts: Vec<PInst>,
    line: u32,
    col: u32,
}

#[derive(Debug)]
struct PFunc {
    name: String,
    ret_type: ValTypeID,
    params: Vec<(ValTypeID, Option<String>)>,
    blocks: Option<Vec<PBlock>>,
    line: u32,
    col: u32,
}

#[derive(Debug)]
struct PVar {
    name: String,
    value_ty: ValTypeID,
}

#[derive(Debug, Default)]
struct PModule {
    funcs: Vec<PFunc>,
    vars: Vec<PVar>,
}

// ---------------------------------------------------------------------------
// parser

struct Parser {
    tokens: Vec<SpannedTok>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Tok {
        &self.tokens[self.pos].tok
    }
    fn here(&self) -> (u32, u32) {
        let t = &self.tokens[self.pos];
        (t.line, t.col)
    }
    fn bump(&mut self) -> Tok {
        let tok = self.tokens[self.pos].tok.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }
    fn error_here(&self, msg: impl Into<String>) -> ParseError {
        let (line, col) = self.here();
        ParseError { line, col, msg: msg.into() }
    }

    fn expect_punct(&mut self, c: char) -> Result<(), ParseError> {
        match self.bump() {
            Tok::Punct(p) if p == c => Ok(()),
            other => Err(self.error_here(format!("expected `{c}`, found {other:?}"))),
        }
    }
    fn eat_punct(&mut self, c: char) -> bool {
        if *self.peek() == Tok::Punct(c) {
            self.bump();
            return true;
        }
        false
    }
    fn expect_ident(&mut self, word: &str) -> Result<(), ParseError> {
        match self.bump() {
            Tok::Ident(s) if s == word => Ok(()),
            other => Err(self.error_here(format!("expected `{word}`, found {other:?}"))),
        }
    }
    fn eat_ident(&mut self, word: &str) -> bool {
        if matches!(self.peek(), Tok::Ident(s) if s == word) {
            self.bump();
            return true;
        }
        false
    }
    fn take_ident(&mut self) -> Result<String, ParseError> {
        match self.bump() {
            Tok::Ident(s) => Ok(s),
            other => Err(self.error_here(format!("expected identifier, found {other:?}"))),
        }
    }
    fn take_global(&mut self) -> Result<String, ParseError> {
        match self.bump() {
            Tok::Global(s) => Ok(s),
            other => Err(self.error_here(format!("expected `@name`, found {other:?}"))),
        }
    }
    fn take_local(&mut self) -> Result<String, ParseError> {
        match self.bump() {
            Tok::Local(s) => Ok(s),
            other => Err(self.error_here(format!("expected `%name`, found {other:?}"))),
        }
    }

    fn parse_type(&mut self) -> Result<ValTypeID, ParseError> {
        let word = self.take_ident()?;
        parse_type_name(&word).ok_or_else(|| self.error_here(format!("unknown type `{word}`")))
    }

    fn parse_tops(mut self) -> Result<PModule, ParseError> {
        let mut module = PModule::default();
        loop {
            match self.peek().clone() {
                Tok::Eof => break,
                Tok::Ident(word) if word == "declare" => {
                    self.bump();
                    module.funcs.push(self.parse_declare()?);
                }
                Tok::Ident(word) if word == "define" => {
                    self.bump();
                    module.funcs.push(self.parse_define()?);
                }
                Tok::Global(_) => {
                    let name = self.take_global()?;
                    self.expect_punct('=')?;
                    self.expect_ident("global")?;
                    let value_ty = self.parse_type()?;
                    module.vars.push(PVar { name, value_ty });
                }
                other => {
                    return Err(self.error_here(format!(
                        "expected `define`, `declare` or a global, found {other:?}"
                    )));
                }
            }
        }
        Ok(module)
    }

    fn parse_declare(&mut self) -> Result<PFunc, ParseError> {
        let (line, col) = self.here();
        let ret_type = self.parse_type()?;
        let name = self.take_global()?;
        self.expect_punct('(')?;
        let mut params = Vec::new();
        if !self.eat_punct(')') {
            loop {
                let ty = self.parse_type()?;
                params.push((ty, None));
                if self.eat_punct(')') {
                    break;
                }
                self.expect_punct(',')?;
            }
        }
        Ok(PFunc { name, ret_type, params, blocks: None, line, col })
    }

    fn parse_define(&mut self) -> Result<PFunc, ParseError> {
        let (line, col) = self.here();
        let ret_type = self.parse_type()?;
        let name = self.take_global()?;
        self.expect_punct('(')?;
        let mut params = Vec::new();
        if !self.eat_punct(')') {
            loop {
                let ty = self.parse_type()?;
                let pname = self.take_local()?;
                params.push((ty, Some(pname)));
                if self.eat_punct(')') {
                    break;
                }
                self.expect_punct(',')?;
            }
        }
        self.expect_punct('{')?;
        let mut blocks: Vec<PBlock> = Vec::new();
        loop {
            if self.eat_punct('}') {
                break;
            }
            let (bline, bcol) = self.here();
            match self.bump() {
                Tok::Ident(label) => {
                    self.expect_punct(':')?;
                    blocks.push(PBlock { label, insts: Vec::new(), line: bline, col: bcol });
                }
                other => {
                    return Err(self.error_here(format!(
                        "expected a block label or `}}`, found {other:?}"
                    )));
                }
            }
            // block body: statements until the next label or `}`
            loop {
                match self.peek() {
                    Tok::Punct('}') => break,
                    Tok::Ident(_) if self.tokens[self.pos + 1].tok == Tok::Punct(':') => break,
                    _ => {
                        let inst = self.parse_inst()?;
                        blocks.last_mut().unwrap().insts.push(inst);
                    }
                }
            }
        }
        Ok(PFunc { name, ret_type, params, blocks: Some(blocks), line, col })
    }

    /// One instruction statement, `[%name =] opcode ...`.
    fn parse_inst(&mut self) -> Result<PInst, ParseError> {
        let (line, col) = self.here();
        let result = if matches!(self.peek(), Tok::Local(_)) {
            let name = self.take_local()?;
            self.expect_punct('=')?;
            Some(name)
        } else {
            None
        };
        let word = self.take_ident()?;
        let mut inst = self.parse_inst_body(&word, line, col)?;
        inst.result = result;
        if inst.result.is_some() && !inst.ret_type.makes_instance() {
            return Err(ParseError {
                line,
                col,
                msg: "a void-typed instruction cannot name a result".into(),
            });
        }
        Ok(inst)
    }

    fn parse_inst_body(&mut self, word: &str, line: u32, col: u32) -> Result<PInst, ParseError> {
        let pinst = |opcode, kind, ret_type, operands| PInst {
            result: None,
            opcode,
            kind,
            ret_type,
            operands,
            line,
            col,
        };

        if let Ok(opcode) = word.parse::<Opcode>() {
            let is_binary = opcode != Opcode::Fneg
                && (opcode.is_int_arith()
                    || opcode.is_float_arith()
                    || opcode.is_logic_op()
                    || opcode.is_shift_op());
            if is_binary {
                let ty = self.parse_type()?;
                let lhs = self.parse_value_atom(ty)?;
                self.expect_punct(',')?;
                let rhs = self.parse_value_atom(ty)?;
                return Ok(pinst(opcode, InstKind::Binary, ty, vec![lhs, rhs]));
            }
            if opcode == Opcode::Fneg {
                let ty = self.parse_type()?;
                let value = self.parse_value_atom(ty)?;
                return Ok(pinst(opcode, InstKind::Binary, ty, vec![value]));
            }
            if opcode.is_cast() {
                let from_ty = self.parse_type()?;
                let value = self.parse_value_atom(from_ty)?;
                self.expect_ident("to")?;
                let to_ty = self.parse_type()?;
                return Ok(pinst(opcode, InstKind::Cast, to_ty, vec![value]));
            }
        }

        match word {
            "icmp" | "fcmp" => {
                let cond_word = self.take_ident()?;
                let cond = if word == "icmp" {
                    CmpCond::parse_icmp(&cond_word)
                } else {
                    CmpCond::parse_fcmp(&cond_word)
                };
                let cond = cond.ok_or_else(|| {
                    self.error_here(format!("unknown {word} condition `{cond_word}`"))
                })?;
                let ty = self.parse_type()?;
                let lhs = self.parse_value_atom(ty)?;
                self.expect_punct(',')?;
                let rhs = self.parse_value_atom(ty)?;
                let opcode = if word == "icmp" { Opcode::Icmp } else { Opcode::Fcmp };
                Ok(pinst(
                    opcode,
                    InstKind::Cmp(cond),
                    ValTypeID::new_boolean(),
                    vec![lhs, rhs],
                ))
            }
            "select" => {
                let cond_ty = self.parse_type()?;
                let cond = self.parse_value_atom(cond_ty)?;
                self.expect_punct(',')?;
                let then_ty = self.parse_type()?;
                let then_val = self.parse_value_atom(then_ty)?;
                self.expect_punct(',')?;
                let else_ty = self.parse_type()?;
                let else_val = self.parse_value_atom(else_ty)?;
                Ok(pinst(
                    Opcode::Select,
                    InstKind::Select,
                    then_ty,
                    vec![cond, then_val, else_val],
                ))
            }
            "phi" => {
                let ty = self.parse_type()?;
                let mut operands = Vec::new();
                loop {
                    self.expect_punct('[')?;
                    operands.push(self.parse_value_atom(ty)?);
                    self.expect_punct(',')?;
                    operands.push(PVal::Label(self.take_local()?));
                    self.expect_punct(']')?;
                    if !self.eat_punct(',') {
                        break;
                    }
                }
                Ok(pinst(Opcode::Phi, InstKind::Phi, ty, operands))
            }
            "getelementptr" => {
                let elem_ty = self.parse_type()?;
                self.expect_punct(',')?;
                let base_ty = self.parse_type()?;
                let base = self.parse_value_atom(base_ty)?;
                let mut operands = vec![base];
                while self.eat_punct(',') {
                    let index_ty = self.parse_type()?;
                    operands.push(self.parse_value_atom(index_ty)?);
                }
                Ok(pinst(Opcode::Gep, InstKind::Gep { elem_ty }, ValTypeID::Ptr, operands))
            }
            "load" => {
                let volatile = self.eat_ident("volatile");
                let ty = self.parse_type()?;
                self.expect_punct(',')?;
                let ptr_ty = self.parse_type()?;
                let ptr = self.parse_value_atom(ptr_ty)?;
                let align = self.parse_align_suffix()?;
                Ok(pinst(Opcode::Load, InstKind::Load { volatile, align }, ty, vec![ptr]))
            }
            "store" => {
                let volatile = self.eat_ident("volatile");
                let value_ty = self.parse_type()?;
                let value = self.parse_value_atom(value_ty)?;
                self.expect_punct(',')?;
                let ptr_ty = self.parse_type()?;
                let ptr = self.parse_value_atom(ptr_ty)?;
                let align = self.parse_align_suffix()?;
                Ok(pinst(
                    Opcode::Store,
                    InstKind::Store { volatile, align },
                    ValTypeID::Void,
                    vec![value, ptr],
                ))
            }
            "alloca" => {
                let alloc_ty = self.parse_type()?;
                let align = self.parse_align_suffix()?;
                Ok(pinst(
                    Opcode::Alloca,
                    InstKind::Alloca { alloc_ty, align },
                    ValTypeID::Ptr,
                    vec![],
                ))
            }
            "call" => {
                let ret_type = self.parse_type()?;
                let callee = match self.bump() {
                    Tok::Global(name) => PVal::Global(name),
                    Tok::Local(name) => PVal::Local(name),
                    other => {
                        return Err(self.error_here(format!(
                            "expected a callee, found {other:?}"
                        )));
                    }
                };
                self.expect_punct('(')?;
                let mut operands = vec![callee];
                if !self.eat_punct(')') {
                    loop {
                        let ty = self.parse_type()?;
                        operands.push(self.parse_value_atom(ty)?);
                        if self.eat_punct(')') {
                            break;
                        }
                        self.expect_punct(',')?;
                    }
                }
                Ok(pinst(Opcode::Call, InstKind::Call, ret_type, operands))
            }
            "va_arg" => {
                let ptr_ty = self.parse_type()?;
                let ap = self.parse_value_atom(ptr_ty)?;
                self.expect_punct(',')?;
                let ret_type = self.parse_type()?;
                Ok(pinst(Opcode::VaArg, InstKind::VaArg, ret_type, vec![ap]))
            }
            "ret" => {
                let ty = self.parse_type()?;
                if ty == ValTypeID::Void {
                    Ok(pinst(Opcode::Ret, InstKind::Ret, ValTypeID::Void, vec![]))
                } else {
                    let value = self.parse_value_atom(ty)?;
                    Ok(pinst(Opcode::Ret, InstKind::Ret, ValTypeID::Void, vec![value]))
                }
            }
            "br" => {
                if self.eat_ident("label") {
                    let target = PVal::Label(self.take_local()?);
                    return Ok(pinst(Opcode::Jump, InstKind::Jump, ValTypeID::Void, vec![target]));
                }
                let cond_ty = self.parse_type()?;
                let cond = self.parse_value_atom(cond_ty)?;
                self.expect_punct(',')?;
                self.expect_ident("label")?;
                let then_bb = PVal::Label(self.take_local()?);
                self.expect_punct(',')?;
                self.expect_ident("label")?;
                let else_bb = PVal::Label(self.take_local()?);
                Ok(pinst(
                    Opcode::Br,
                    InstKind::Br,
                    ValTypeID::Void,
                    vec![cond, then_bb, else_bb],
                ))
            }
            "switch" => {
                let ty = self.parse_type()?;
                let value = self.parse_value_atom(ty)?;
                self.expect_punct(',')?;
                self.expect_ident("label")?;
                let default = PVal::Label(self.take_local()?);
                self.expect_punct('[')?;
                let mut operands = vec![value, default];
                if !self.eat_punct(']') {
                    loop {
                        let case_ty = self.parse_type()?;
                        operands.push(self.parse_value_atom(case_ty)?);
                        self.expect_punct(',')?;
                        self.expect_ident("label")?;
                        operands.push(PVal::Label(self.take_local()?));
                        if self.eat_punct(']') {
                            break;
                        }
                        self.expect_punct(',')?;
                    }
                }
                Ok(pinst(Opcode::Switch, InstKind::Switch, ValTypeID::Void, operands))
            }
            "unreachable" => {
                Ok(pinst(Opcode::Unreachable, InstKind::Unreachable, ValTypeID::Void, vec![]))
            }
            other => Err(ParseError {
                line,
                col,
                msg: format!("unknown instruction `{other}`"),
            }),
        }
    }

    fn parse_align_suffix(&mut self) -> Result<u32, ParseError> {
        if !self.eat_punct(',') {
            return Ok(0);
        }
        self.expect_ident("align")?;
        match self.bump() {
            Tok::Int(n) if n > 0 => Ok(n as u32),
            other => Err(self.error_here(format!("expected an alignment, found {other:?}"))),
        }
    }

    /// A value atom in a context whose type is already known.
    fn parse_value_atom(&mut self, ty: ValTypeID) -> Result<PVal, ParseError> {
        match self.bump() {
            Tok::Local(name) => Ok(PVal::Local(name)),
            Tok::Global(name) => Ok(PVal::Global(name)),
            Tok::Int(v) => match ty {
                ValTypeID::Int(bits) => Ok(PVal::Const(ConstData::int(bits, v))),
                ValTypeID::Float(kind) => Ok(PVal::Const(ConstData::float(kind, v as f64))),
                _ => Err(self.error_here(format!("integer literal used at type {ty}"))),
            },
            Tok::Float(v) => match ty {
                ValTypeID::Float(kind) => Ok(PVal::Const(ConstData::float(kind, v))),
                _ => Err(self.error_here(format!("float literal used at type {ty}"))),
            },
            Tok::Ident(word) => match word.as_str() {
                "true" | "false" => {
                    if ty != ValTypeID::new_boolean() {
                        return Err(self.error_here(format!("boolean literal used at type {ty}")));
                    }
                    Ok(PVal::Const(ConstData::bool(word == "true")))
                }
                "null" => {
                    if ty != ValTypeID::Ptr {
                        return Err(self.error_here(format!("`null` used at type {ty}")));
                    }
                    Ok(PVal::Const(ConstData::PtrNull))
                }
                "undef" => Ok(PVal::Const(ConstData::Undef(ty))),
                "zeroinitializer" => Ok(PVal::Const(ConstData::zero(ty))),
                "inf" | "NaN" => match ty {
                    ValTypeID::Float(kind) => {
                        let v = if word == "inf" { f64::INFINITY } else { f64::NAN };
                        Ok(PVal::Const(ConstData::float(kind, v)))
                    }
                    _ => Err(self.error_here(format!("float literal used at type {ty}"))),
                },
                other => Err(self.error_here(format!("expected a value, found `{other}`"))),
            },
            other => Err(self.error_here(format!("expected a value, found {other:?}"))),
        }
    }
}

fn parse_type_name(word: &str) -> Option<ValTypeID> {
    match word {
        "void" => Some(ValTypeID::Void),
        "ptr" => Some(ValTypeID::Ptr),
        "float" => Some(ValTypeID::Float(FloatKind::Ieee32)),
        "double" => Some(ValTypeID::Float(FloatKind::Ieee64)),
        _ => {
            let bits = word.strip_prefix('i')?.parse::<u8>().ok()?;
            if bits == 0 { None } else { Some(ValTypeID::Int(bits)) }
        }
    }
}

// ---------------------------------------------------------------------------
// building

fn build_module(name: String, parsed: PModule) -> Result<Module, ParseError> {
    let mut module = Module::new(name, DataLayout::new_host());
    let mut builder = IRBuilder::new(&mut module);

    for var in &parsed.vars {
        builder.declare_var(var.name.as_str(), var.value_ty);
    }
    // function headers first so calls resolve in either direction
    let mut func_refs = Vec::with_capacity(parsed.funcs.len());
    for func in &parsed.funcs {
        let params: Vec<ValTypeID> = func.params.iter().map(|(ty, _)| *ty).collect();
        let global = if func.blocks.is_some() {
            builder.define_func(func.name.as_str(), func.ret_type, &params)
        } else {
            builder.declare_func(func.name.as_str(), func.ret_type, &params)
        };
        func_refs.push(global);
    }

    for (func, &global) in parsed.funcs.iter().zip(func_refs.iter()) {
        let Some(blocks) = &func.blocks else { continue };
        build_func_body(&mut builder, func, global, blocks)?;
    }
    Ok(module)
}

fn build_func_body(
    builder: &mut IRBuilder<'_>,
    func: &PFunc,
    global: GlobalRef,
    blocks: &[PBlock],
) -> Result<(), ParseError> {
    if blocks.is_empty() {
        return Err(ParseError {
            line: func.line,
            col: func.col,
            msg: format!("function @{} has an empty body", func.name),
        });
    }

    let mut values: HashMap<String, ValueSSA> = HashMap::new();
    for (index, (_, pname)) in func.params.iter().enumerate() {
        if let Some(pname) = pname {
            values.insert(pname.clone(), ValueSSA::FuncArg(global, index as u32));
        }
    }

    let mut block_refs: HashMap<String, BlockRef> = HashMap::new();
    for pblock in blocks {
        if block_refs.contains_key(&pblock.label) {
            return Err(ParseError {
                line: pblock.line,
                col: pblock.col,
                msg: format!("duplicate block label `{}`", pblock.label),
            });
        }
        let block = builder.append_block(global, pblock.label.as_str());
        block_refs.insert(pblock.label.clone(), block);
    }

    // create every instruction with empty operand slots, recording result
    // names; operands are resolved in a second sweep once all names exist
    let mut created: Vec<(InstRef, &PInst)> = Vec::new();
    for pblock in blocks {
        let block = block_refs[&pblock.label];
        for pinst in &pblock.insts {
            let placeholders = vec![ValueSSA::None; pinst.operands.len()];
            let inst = InstRef::new(
                &mut builder.module.allocs,
                pinst.opcode,
                pinst.ret_type,
                pinst.kind,
                &placeholders,
            );
            block.push_inst_back(&builder.module.allocs, inst);
            if let Some(result) = &pinst.result {
                if values.insert(result.clone(), ValueSSA::Inst(inst)).is_some() {
                    return Err(ParseError {
                        line: pinst.line,
                        col: pinst.col,
                        msg: format!("redefinition of value %{result}"),
                    });
                }
            }
            created.push((inst, pinst));
        }
    }

    for (inst, pinst) in created {
        for (index, pval) in pinst.operands.iter().enumerate() {
            let value = resolve_value(builder.module, &values, &block_refs, pval, pinst)?;
            inst.set_operand(&builder.module.allocs, index, value);
        }
    }
    Ok(())
}

fn resolve_value(
    module: &Module,
    values: &HashMap<String, ValueSSA>,
    block_refs: &HashMap<String, BlockRef>,
    pval: &PVal,
    pinst: &PInst,
) -> Result<ValueSSA, ParseError> {
    let err = |msg: String| ParseError { line: pinst.line, col: pinst.col, msg };
    match pval {
        PVal::Const(data) => Ok(ValueSSA::ConstData(*data)),
        PVal::Local(name) => values
            .get(name)
            .copied()
            .ok_or_else(|| err(format!("unknown value %{name}"))),
        PVal::Global(name) => module
            .get_global_by_name(name)
            .map(ValueSSA::Global)
            .ok_or_else(|| err(format!("unknown global @{name}"))),
        PVal::Label(name) => block_refs
            .get(name)
            .copied()
            .map(ValueSSA::Block)
            .ok_or_else(|| err(format!("unknown block label %{name}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::writer::write_module_to_string;

    #[test]
    fn parse_simple_function() {
        let src = r#"
            define i32 @add3(i32 %x, i32 %y) {
            entry:
              %s = add i32 %x, %y
              %t = add i32 %s, 3
              ret i32 %t
            }
        "#;
        let module = parse_module("test", src).expect("parse failed");
        let func = module.get_global_by_name("add3").unwrap();
        let blocks = func.blocks_vec(&module.allocs);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].inst_count(&module.allocs), 3);
        let term = blocks[0].terminator(&module.allocs).unwrap();
        assert_eq!(term.get_opcode(&module.allocs), Opcode::Ret);
    }

    #[test]
    fn parse_forward_references() {
        let src = r#"
            define i32 @loop(i32 %n) {
            entry:
              br label %header
            header:
              %i = phi i32 [ 0, %entry ], [ %next, %body ]
              %c = icmp slt i32 %i, %n
              br i1 %c, label %body, label %exit
            body:
              %next = add i32 %i, 1
              br label %header
            exit:
              ret i32 %i
            }
        "#;
        let module = parse_module("test", src).expect("parse failed");
        let func = module.get_global_by_name("loop").unwrap();
        assert_eq!(func.blocks_vec(&module.allocs).len(), 4);
    }

    #[test]
    fn roundtrip_through_writer() {
        let src = r#"
            declare i32 @getint()
            define i32 @main() {
            entry:
              %p = alloca i32, align 4
              %v = call i32 @getint()
              store i32 %v, ptr %p, align 4
              %l = load i32, ptr %p, align 4
              %c = icmp eq i32 %l, 42
              br i1 %c, label %yes, label %no
            yes:
              ret i32 1
            no:
              ret i32 0
            }
        "#;
        let module = parse_module("test", src).expect("parse failed");
        let text = write_module_to_string(&module);
        let module2 = parse_module("test2", &text).expect("reparse failed");
        let func = module2.get_global_by_name("main").unwrap();
        assert_eq!(func.blocks_vec(&module2.allocs).len(), 3);
        // volatile and alignment survive the round trip
        let entry = func.blocks_vec(&module2.allocs)[0];
        let insts = entry.insts_vec(&module2.allocs);
        assert!(matches!(
            insts[2].get_kind(&module2.allocs),
            InstKind::Store { volatile: false, align: 4 }
        ));
    }

    #[test]
    fn unknown_value_is_reported_with_location() {
        let src = "define i32 @f() {\nentry:\n  ret i32 %nope\n}\n";
        let error = parse_module("test", src).unwrap_err();
        assert!(error.msg.contains("unknown value %nope"), "{error}");
        assert_eq!(error.line, 3);
    }

    #[test]
    fn zeroinitializer_parses_to_canonical_zero() {
        let src = r#"
            define i32 @f(i32 %x) {
            entry:
              %t = add i32 %x, zeroinitializer
              ret i32 %t
            }
        "#;
        let module = parse_module("test", src).expect("parse failed");
        let func = module.get_global_by_name("f").unwrap();
        let entry = func.blocks_vec(&module.allocs)[0];
        let add = entry.first_inst(&module.allocs).unwrap();
        assert_eq!(
            add.get_operand(&module.allocs, 1),
            ValueSSA::ConstData(ConstData::int(32, 0))
        );
    }

    #[test]
    fn volatile_load_parses() {
        let src = r#"
            define i32 @f(ptr %p) {
            entry:
              %v = load volatile i32, ptr %p
              ret i32 %v
            }
        "#;
        let module = parse_module("test", src).expect("parse failed");
        let func = module.get_global_by_name("f").unwrap();
        let entry = func.blocks_vec(&module.allocs)[0];
        let load = entry.first_inst(&module.allocs).unwrap();
        assert!(load.is_volatile(&module.allocs));
    }
}
