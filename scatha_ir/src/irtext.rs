//! Textual IR: a lexer, recursive-descent parser and matching printer for
//! scalar-typed IR modules (§4.1/§4.2's instruction set over `void`/`ptr`/
//! `iN`/`fN` operands), grounded on the token kinds enumerated in
//! `examples/original_source/include/scatha/IR/Parser/IRToken.h`. Aggregate
//! (struct/array) types are printed/parsed by name only — a literal
//! aggregate constant or GEP index list round-trips through its numeric
//! form, not a structural one; see DESIGN.md for why that scope was chosen.

use crate::context::Context;
use crate::ids::{BlockId, FunctionId, InstId, LocalValue, Operand, TypeId};
use crate::instruction::{ArithmeticOp, Callee, CompareMode, CompareOp, ConversionOp, GepIndex, InstKind, UnaryArithmeticOp};
use crate::module::Module;
use crate::types::Type as IrType;
use hashbrown::HashMap;
use std::fmt::Write as _;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Identifier(String),
    LocalIdent(String),
    GlobalIdent(String),
    IntLiteral(i128),
    FloatLiteral(f64),
    StringLiteral(String),
    Void,
    Ptr,
    IntType(u8),
    FloatType(u8),
    Null,
    Undef,
    OpenParen,
    CloseParen,
    OpenBrace,
    CloseBrace,
    Comma,
    Colon,
    Assign,
    Arrow,
    Star,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IrToken {
    pub kind: TokenKind,
    pub text: String,
    pub offset: u32,
}

pub struct IrTextError {
    pub message: String,
    pub offset: u32,
}

impl std::fmt::Display for IrTextError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "IR text error at offset {}: {}", self.offset, self.message)
    }
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
}

impl Lexer {
    fn new(text: &str) -> Self {
        Self { chars: text.chars().collect(), pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_trivia(&mut self) {
        loop {
            while matches!(self.peek(), Some(c) if c.is_whitespace()) {
                self.pos += 1;
            }
            if self.peek() == Some(';') {
                while matches!(self.peek(), Some(c) if c != '\n') {
                    self.pos += 1;
                }
                continue;
            }
            break;
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if pred(c)) {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn next_token(&mut self) -> Result<IrToken, IrTextError> {
        self.skip_trivia();
        let offset = self.pos as u32;
        let Some(c) = self.peek() else {
            return Ok(IrToken { kind: TokenKind::Eof, text: String::new(), offset });
        };
        let kind = match c {
            '(' => {
                self.bump();
                TokenKind::OpenParen
            }
            ')' => {
                self.bump();
                TokenKind::CloseParen
            }
            '{' => {
                self.bump();
                TokenKind::OpenBrace
            }
            '}' => {
                self.bump();
                TokenKind::CloseBrace
            }
            ',' => {
                self.bump();
                TokenKind::Comma
            }
            ':' => {
                self.bump();
                TokenKind::Colon
            }
            '*' => {
                self.bump();
                TokenKind::Star
            }
            '=' => {
                self.bump();
                TokenKind::Assign
            }
            '"' => {
                self.bump();
                let s = self.take_while(|c| c != '"');
                if self.peek() != Some('"') {
                    return Err(IrTextError { message: "unterminated string literal".to_string(), offset });
                }
                self.bump();
                TokenKind::StringLiteral(s)
            }
            '-' if self.chars.get(self.pos + 1) == Some(&'>') => {
                self.pos += 2;
                TokenKind::Arrow
            }
            '%' => {
                self.bump();
                let name = self.take_while(|c| c.is_alphanumeric() || c == '_' || c == '.');
                TokenKind::LocalIdent(name)
            }
            '@' => {
                self.bump();
                let name = self.take_while(|c| c.is_alphanumeric() || c == '_' || c == '.');
                TokenKind::GlobalIdent(name)
            }
            c if c.is_ascii_digit() || c == '-' => {
                let text = self.take_while(|c| c.is_ascii_digit() || c == '.' || c == '-' || c == 'e' || c == 'E' || c == '+');
                if text.contains('.') || (text.contains('e') && !text.starts_with("0x")) {
                    let value: f64 = text.parse().map_err(|_| IrTextError { message: format!("invalid float literal {text:?}"), offset })?;
                    TokenKind::FloatLiteral(value)
                } else {
                    let value: i128 = text.parse().map_err(|_| IrTextError { message: format!("invalid integer literal {text:?}"), offset })?;
                    TokenKind::IntLiteral(value)
                }
            }
            c if c.is_alphabetic() || c == '_' => {
                let word = self.take_while(|c| c.is_alphanumeric() || c == '_');
                classify_word(&word)
            }
            other => return Err(IrTextError { message: format!("unexpected character {other:?}"), offset }),
        };
        let end = self.pos;
        Ok(IrToken { kind, text: self.chars[offset as usize..end].iter().collect(), offset })
    }

    fn tokenize(mut self) -> Result<Vec<IrToken>, IrTextError> {
        let mut out = Vec::new();
        loop {
            let tok = self.next_token()?;
            let done = tok.kind == TokenKind::Eof;
            out.push(tok);
            if done {
                break;
            }
        }
        Ok(out)
    }
}

fn classify_word(word: &str) -> TokenKind {
    if word == "void" {
        return TokenKind::Void;
    }
    if word == "ptr" {
        return TokenKind::Ptr;
    }
    if word == "null" {
        return TokenKind::Null;
    }
    if word == "undef" {
        return TokenKind::Undef;
    }
    if let Some(rest) = word.strip_prefix('i') {
        if let Ok(width) = rest.parse::<u8>() {
            return TokenKind::IntType(width);
        }
    }
    if let Some(rest) = word.strip_prefix('f') {
        if let Ok(width) = rest.parse::<u8>() {
            if width == 32 || width == 64 {
                return TokenKind::FloatType(width);
            }
        }
    }
    TokenKind::Identifier(word.to_string())
}

/// Parses `text` into a fresh [`Module`], interning every type/constant it
/// mentions into `ctx`.
pub fn parse(ctx: &mut Context, text: &str) -> Result<Module, IrTextError> {
    let tokens = Lexer::new(text).tokenize()?;
    let mut parser = TextParser { tokens, pos: 0, ctx, module: Module::new(), local_names: HashMap::new(), block_names: HashMap::new() };
    parser.parse_module()?;
    Ok(parser.module)
}

struct TextParser<'a> {
    tokens: Vec<IrToken>,
    pos: usize,
    ctx: &'a mut Context,
    module: Module,
    local_names: HashMap<String, Operand>,
    block_names: HashMap<String, BlockId>,
}

impl<'a> TextParser<'a> {
    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn offset(&self) -> u32 {
        self.tokens[self.pos].offset
    }

    fn bump(&mut self) -> IrToken {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn err(&self, message: impl Into<String>) -> IrTextError {
        IrTextError { message: message.into(), offset: self.offset() }
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<(), IrTextError> {
        if self.peek() == kind {
            self.bump();
            Ok(())
        } else {
            Err(self.err(format!("expected {kind:?}, found {:?}", self.peek())))
        }
    }

    fn expect_identifier(&mut self, expected: &str) -> Result<(), IrTextError> {
        match self.peek().clone() {
            TokenKind::Identifier(w) if w == expected => {
                self.bump();
                Ok(())
            }
            other => Err(self.err(format!("expected keyword '{expected}', found {other:?}"))),
        }
    }

    fn parse_module(&mut self) -> Result<(), IrTextError> {
        loop {
            match self.peek().clone() {
                TokenKind::Eof => break,
                TokenKind::Identifier(w) if w == "func" => self.parse_function()?,
                other => return Err(self.err(format!("expected 'func', found {other:?}"))),
            }
        }
        Ok(())
    }

    fn parse_type(&mut self) -> Result<TypeId, IrTextError> {
        match self.bump().kind {
            TokenKind::Void => Ok(self.ctx.void_type()),
            TokenKind::Ptr => Ok(self.ctx.ptr_type()),
            TokenKind::IntType(w) => Ok(self.ctx.int_type(w)),
            TokenKind::FloatType(w) => Ok(self.ctx.float_type(w)),
            other => Err(self.err(format!("expected a type, found {other:?}"))),
        }
    }

    fn parse_function(&mut self) -> Result<(), IrTextError> {
        self.expect_identifier("func")?;
        let name = match self.bump().kind {
            TokenKind::GlobalIdent(n) => n,
            other => return Err(self.err(format!("expected function name, found {other:?}"))),
        };
        self.expect(&TokenKind::OpenParen)?;
        let mut param_types = Vec::new();
        if self.peek() != &TokenKind::CloseParen {
            loop {
                param_types.push(self.parse_type()?);
                if self.peek() == &TokenKind::Comma {
                    self.bump();
                } else {
                    break;
                }
            }
        }
        self.expect(&TokenKind::CloseParen)?;
        self.expect(&TokenKind::Arrow)?;
        let ret_ty = self.parse_type()?;

        let id = self.module.declare_function(name, param_types.clone(), ret_ty);
        self.local_names.clear();
        self.block_names.clear();

        if self.peek() != &TokenKind::OpenBrace {
            // Declaration only, no body (e.g. a foreign import).
            return Ok(());
        }
        self.expect(&TokenKind::OpenBrace)?;

        // First pass: collect every block label so forward references in
        // gotos/branches/phis resolve regardless of textual order.
        let body_start = self.pos;
        let mut depth = 0i32;
        loop {
            match self.peek().clone() {
                TokenKind::OpenBrace => {
                    depth += 1;
                    self.bump();
                }
                TokenKind::CloseBrace if depth == 0 => break,
                TokenKind::CloseBrace => {
                    depth -= 1;
                    self.bump();
                }
                TokenKind::Identifier(w) => {
                    let next_is_colon = self.tokens.get(self.pos + 1).map(|t| &t.kind) == Some(&TokenKind::Colon);
                    self.bump();
                    if next_is_colon && depth == 0 {
                        self.bump();
                        let func = self.module.function_mut(id);
                        let block = func.new_block(Some(w.clone()));
                        self.block_names.insert(w, block);
                    }
                }
                TokenKind::Eof => return Err(self.err("unterminated function body")),
                _ => {
                    self.bump();
                }
            }
        }
        self.pos = body_start;

        for i in 0..param_types.len() {
            self.local_names.insert(format!("arg{i}"), Operand::Local(LocalValue::Param(i as u32)));
        }

        let mut current_block: Option<BlockId> = None;
        loop {
            match self.peek().clone() {
                TokenKind::CloseBrace => {
                    self.bump();
                    break;
                }
                TokenKind::Identifier(w) if self.tokens.get(self.pos + 1).map(|t| &t.kind) == Some(&TokenKind::Colon) => {
                    self.bump();
                    self.bump();
                    current_block = Some(*self.block_names.get(&w).expect("collected in first pass"));
                }
                _ => {
                    let block = current_block.ok_or_else(|| self.err("instruction outside of any block"))?;
                    self.parse_instruction(id, block)?;
                }
            }
        }
        Ok(())
    }

    fn parse_operand(&mut self, expect_ty: TypeId) -> Result<Operand, IrTextError> {
        match self.bump().kind {
            TokenKind::LocalIdent(n) => self.local_names.get(&n).copied().ok_or_else(|| self.err(format!("undefined local %{n}"))),
            TokenKind::GlobalIdent(n) => {
                let gid = self.module.find_global(&n).ok_or_else(|| self.err(format!("undefined global @{n}")))?;
                Ok(Operand::Global(gid))
            }
            TokenKind::IntLiteral(v) => Ok(Operand::Constant(self.ctx.const_int(expect_ty, v))),
            TokenKind::FloatLiteral(v) => Ok(Operand::Constant(self.ctx.const_float(expect_ty, v))),
            TokenKind::Null => Ok(Operand::Constant(self.ctx.const_null())),
            TokenKind::Undef => Ok(Operand::Constant(self.ctx.const_undef(expect_ty))),
            other => Err(self.err(format!("expected an operand, found {other:?}"))),
        }
    }

    fn parse_block_ref(&mut self) -> Result<BlockId, IrTextError> {
        match self.bump().kind {
            TokenKind::LocalIdent(n) => self.block_names.get(&n).copied().ok_or_else(|| self.err(format!("undefined block %{n}"))),
            other => Err(self.err(format!("expected a block label, found {other:?}"))),
        }
    }

    fn bind_result(&mut self, name: Option<String>, value: InstId) {
        if let Some(n) = name {
            self.local_names.insert(n, Operand::Local(LocalValue::Inst(value)));
        }
    }

    fn parse_instruction(&mut self, func_id: FunctionId, block: BlockId) -> Result<(), IrTextError> {
        let mut result_name = None;
        if let TokenKind::LocalIdent(n) = self.peek().clone() {
            if self.tokens.get(self.pos + 1).map(|t| &t.kind) == Some(&TokenKind::Assign) {
                self.bump();
                self.bump();
                result_name = Some(n);
            }
        }
        let mnemonic = match self.bump().kind {
            TokenKind::Identifier(w) => w,
            other => return Err(self.err(format!("expected an instruction mnemonic, found {other:?}"))),
        };
        match mnemonic.as_str() {
            "alloca" => {
                let ty = self.parse_type()?;
                let ptr_ty = self.ctx.ptr_type();
                let func = self.module.function_mut(func_id);
                let id = func.append(block, InstKind::Alloca { allocated_ty: ty }, ptr_ty, result_name.clone());
                self.bind_result(result_name, id);
            }
            "load" => {
                let ty = self.parse_type()?;
                self.expect(&TokenKind::Comma)?;
                let ptr = self.parse_operand(self.ctx.ptr_type())?;
                let func = self.module.function_mut(func_id);
                let id = func.append(block, InstKind::Load { ptr, loaded_ty: ty }, ty, result_name.clone());
                self.bind_result(result_name, id);
            }
            "store" => {
                let ty = self.parse_type()?;
                let ptr = self.parse_operand(self.ctx.ptr_type())?;
                self.expect(&TokenKind::Comma)?;
                let value = self.parse_operand(ty)?;
                let func = self.module.function_mut(func_id);
                func.append(block, InstKind::Store { ptr, value }, self.ctx.void_type(), None);
            }
            "goto" => {
                self.expect_identifier("label")?;
                let target = self.parse_block_ref()?;
                let func = self.module.function_mut(func_id);
                func.set_terminator(block, InstKind::Goto { target }, None, self.ctx.void_type());
            }
            "branch" => {
                let i1 = self.ctx.int_type(1);
                let cond = self.parse_operand(i1)?;
                self.expect(&TokenKind::Comma)?;
                self.expect_identifier("label")?;
                let if_true = self.parse_block_ref()?;
                self.expect(&TokenKind::Comma)?;
                self.expect_identifier("label")?;
                let if_false = self.parse_block_ref()?;
                let func = self.module.function_mut(func_id);
                func.set_terminator(block, InstKind::Branch { cond, if_true, if_false }, None, self.ctx.void_type());
            }
            "return" | "ret" => {
                let value = match self.peek().clone() {
                    TokenKind::Void => {
                        self.bump();
                        None
                    }
                    _ => {
                        let ty = self.parse_type()?;
                        Some(self.parse_operand(ty)?)
                    }
                };
                let func = self.module.function_mut(func_id);
                func.set_terminator(block, InstKind::Return { value }, None, self.ctx.void_type());
            }
            "unreachable" => {
                let func = self.module.function_mut(func_id);
                func.set_terminator(block, InstKind::Unreachable, None, self.ctx.void_type());
            }
            "phi" => {
                let ty = self.parse_type()?;
                let mut incoming = Vec::new();
                loop {
                    self.expect(&TokenKind::OpenParen)?;
                    let pred = self.parse_block_ref()?;
                    self.expect(&TokenKind::Comma)?;
                    let value = self.parse_operand(ty)?;
                    self.expect(&TokenKind::CloseParen)?;
                    incoming.push((pred, value));
                    if self.peek() == &TokenKind::Comma {
                        self.bump();
                    } else {
                        break;
                    }
                }
                let func = self.module.function_mut(func_id);
                let id = func.append(block, InstKind::Phi { incoming: incoming.into() }, ty, result_name.clone());
                self.bind_result(result_name, id);
            }
            "call" => {
                let ty = self.parse_type()?;
                let callee_name = match self.bump().kind {
                    TokenKind::GlobalIdent(n) => n,
                    other => return Err(self.err(format!("expected callee, found {other:?}"))),
                };
                let callee_id = self.module.find_function(&callee_name).ok_or_else(|| self.err(format!("undefined function @{callee_name}")))?;
                self.expect(&TokenKind::OpenParen)?;
                let param_tys = self.module.function(callee_id).param_types.clone();
                let mut args = Vec::new();
                for (i, pty) in param_tys.iter().enumerate() {
                    if i > 0 {
                        self.expect(&TokenKind::Comma)?;
                    }
                    args.push(self.parse_operand(*pty)?);
                }
                self.expect(&TokenKind::CloseParen)?;
                let func = self.module.function_mut(func_id);
                let id = func.append(block, InstKind::Call { callee: Callee::Function(callee_id), args }, ty, result_name.clone());
                self.bind_result(result_name, id);
            }
            "gep" => {
                let base_ty = self.parse_type()?;
                self.expect(&TokenKind::Comma)?;
                let ptr_ty = self.ctx.ptr_type();
                let ptr = self.parse_operand(ptr_ty)?;
                let i64_ty = self.ctx.int_type(64);
                let mut indices = Vec::new();
                while self.peek() == &TokenKind::Comma {
                    self.bump();
                    match self.peek().clone() {
                        TokenKind::IntLiteral(v) => {
                            self.bump();
                            indices.push(GepIndex::Const(v as i64));
                        }
                        _ => indices.push(GepIndex::Value(self.parse_operand(i64_ty)?)),
                    }
                }
                let func = self.module.function_mut(func_id);
                let id = func.append(block, InstKind::GetElementPointer { ptr, base_ty, indices }, ptr_ty, result_name.clone());
                self.bind_result(result_name, id);
            }
            op if conversion_op(op).is_some() => {
                let cop = conversion_op(op).unwrap();
                let ty = self.parse_type()?;
                let operand = self.parse_operand(ty)?;
                self.expect_identifier("to")?;
                let target_ty = self.parse_type()?;
                let func = self.module.function_mut(func_id);
                let id = func.append(block, InstKind::Conversion { op: cop, operand, target_ty }, target_ty, result_name.clone());
                self.bind_result(result_name, id);
            }
            op if arithmetic_op(op).is_some() => {
                let aop = arithmetic_op(op).unwrap();
                let ty = self.parse_type()?;
                let lhs = self.parse_operand(ty)?;
                self.expect(&TokenKind::Comma)?;
                let rhs = self.parse_operand(ty)?;
                let func = self.module.function_mut(func_id);
                let id = func.append(block, InstKind::Arithmetic { op: aop, lhs, rhs }, ty, result_name.clone());
                self.bind_result(result_name, id);
            }
            op if unary_op(op).is_some() => {
                let uop = unary_op(op).unwrap();
                let ty = self.parse_type()?;
                let operand = self.parse_operand(ty)?;
                let func = self.module.function_mut(func_id);
                let id = func.append(block, InstKind::UnaryArithmetic { op: uop, operand }, ty, result_name.clone());
                self.bind_result(result_name, id);
            }
            "scmp" | "ucmp" | "fcmp" => {
                let mode = match mnemonic.as_str() {
                    "scmp" => CompareMode::Signed,
                    "ucmp" => CompareMode::Unsigned,
                    _ => CompareMode::Float,
                };
                let cop = match self.bump().kind {
                    TokenKind::Identifier(w) => compare_op(&w).ok_or_else(|| self.err(format!("unknown comparison '{w}'")))?,
                    other => return Err(self.err(format!("expected a comparison kind, found {other:?}"))),
                };
                let ty = self.parse_type()?;
                let lhs = self.parse_operand(ty)?;
                self.expect(&TokenKind::Comma)?;
                let rhs = self.parse_operand(ty)?;
                let i1 = self.ctx.int_type(1);
                let func = self.module.function_mut(func_id);
                let id = func.append(block, InstKind::Compare { mode, op: cop, lhs, rhs }, i1, result_name.clone());
                self.bind_result(result_name, id);
            }
            other => return Err(self.err(format!("unknown instruction mnemonic '{other}'"))),
        }
        Ok(())
    }
}

fn arithmetic_op(mnemonic: &str) -> Option<ArithmeticOp> {
    Some(match mnemonic {
        "add" => ArithmeticOp::Add,
        "sub" => ArithmeticOp::Sub,
        "mul" => ArithmeticOp::Mul,
        "sdiv" => ArithmeticOp::SDiv,
        "udiv" => ArithmeticOp::UDiv,
        "srem" => ArithmeticOp::SRem,
        "urem" => ArithmeticOp::URem,
        "fadd" => ArithmeticOp::FAdd,
        "fsub" => ArithmeticOp::FSub,
        "fmul" => ArithmeticOp::FMul,
        "fdiv" => ArithmeticOp::FDiv,
        "shl" => ArithmeticOp::Shl,
        "lshr" => ArithmeticOp::LShr,
        "ashr" => ArithmeticOp::AShr,
        "and" => ArithmeticOp::And,
        "or" => ArithmeticOp::Or,
        "xor" => ArithmeticOp::Xor,
        _ => return None,
    })
}

fn unary_op(mnemonic: &str) -> Option<UnaryArithmeticOp> {
    Some(match mnemonic {
        "neg" => UnaryArithmeticOp::Neg,
        "bnot" => UnaryArithmeticOp::BNot,
        "lnot" => UnaryArithmeticOp::LNot,
        _ => return None,
    })
}

fn conversion_op(mnemonic: &str) -> Option<ConversionOp> {
    Some(match mnemonic {
        "zext" => ConversionOp::Zext,
        "sext" => ConversionOp::Sext,
        "trunc" => ConversionOp::Trunc,
        "bitcast" => ConversionOp::Bitcast,
        "stof" => ConversionOp::SIntToFloat,
        "utof" => ConversionOp::UIntToFloat,
        "ftos" => ConversionOp::FloatToSInt,
        "ftou" => ConversionOp::FloatToUInt,
        "ftrunc" => ConversionOp::FloatTrunc,
        "fext" => ConversionOp::FloatExt,
        _ => return None,
    })
}

fn compare_op(mnemonic: &str) -> Option<CompareOp> {
    Some(match mnemonic {
        "eq" => CompareOp::Eq,
        "neq" => CompareOp::Ne,
        "less" => CompareOp::Lt,
        "lseq" => CompareOp::Le,
        "grt" => CompareOp::Gt,
        "grteq" => CompareOp::Ge,
        _ => return None,
    })
}

/// Renders `module` back to text in the same grammar [`parse`] accepts.
/// `print(parse(ctx, text))` reproduces `text` up to whitespace and operand
/// naming (anonymous values print under their positional `%N` name).
pub fn print(ctx: &Context, module: &Module) -> String {
    let mut out = String::new();
    for func in &module.functions {
        write_function(ctx, module, func, &mut out);
    }
    out
}

fn type_name(ctx: &Context, ty: TypeId) -> String {
    match ctx.type_of(ty) {
        IrType::Void => "void".to_string(),
        IrType::Ptr => "ptr".to_string(),
        IrType::Int(w) => format!("i{w}"),
        IrType::Float(w) => format!("f{w}"),
        IrType::Struct(id) => {
            let layout = ctx.struct_layout(*id);
            layout.name.clone().unwrap_or_else(|| format!("%anon{}", id.index()))
        }
        IrType::Array { element, count } => format!("[{} x {}]", count, type_name(ctx, *element)),
        IrType::Function { ret, params } => {
            let params: Vec<String> = params.iter().map(|p| type_name(ctx, *p)).collect();
            format!("({}) -> {}", params.join(", "), type_name(ctx, *ret))
        }
    }
}

fn operand_text(ctx: &Context, func: &crate::module::Function, operand: Operand) -> String {
    match operand {
        Operand::Local(LocalValue::Param(i)) => format!("%arg{i}"),
        Operand::Local(LocalValue::Inst(id)) => func.inst(id).display_name(),
        Operand::Global(g) => format!("@g{}", g.index()),
        Operand::Constant(c) => match ctx.constant(c) {
            crate::context::Constant::Integral { value, .. } => value.to_string(),
            crate::context::Constant::Float { bits, .. } => f64::from_bits(*bits).to_string(),
            crate::context::Constant::NullPointer => "null".to_string(),
            crate::context::Constant::Undef { .. } => "undef".to_string(),
            crate::context::Constant::RecordStruct { .. } => "undef".to_string(),
            crate::context::Constant::RecordArray { .. } => "undef".to_string(),
        },
    }
}

fn write_function(ctx: &Context, module: &Module, func: &crate::module::Function, out: &mut String) {
    let params: Vec<String> = func.param_types.iter().map(|t| type_name(ctx, *t)).collect();
    let _ = write!(out, "func @{}({}) -> {}", func.name, params.join(", "), type_name(ctx, func.ret_ty));
    if func.is_declaration() {
        let _ = writeln!(out, ";");
        return;
    }
    let _ = writeln!(out, " {{");
    for (block_id, block) in func.blocks_iter() {
        let label = block.name.clone().unwrap_or_else(|| format!("bb{}", block_id.index()));
        let _ = writeln!(out, "{label}:");
        for inst in func.insts_in(block_id) {
            write_instruction(ctx, module, func, inst, out);
        }
    }
    let _ = writeln!(out, "}}");
}

fn write_instruction(ctx: &Context, module: &Module, func: &crate::module::Function, inst: &crate::instruction::Instruction, out: &mut String) {
    let is_void_call = matches!(&inst.kind, InstKind::Call { .. } if inst.ty == ctx.void_type());
    let prefix = if is_void_call || matches!(inst.kind, InstKind::Store { .. } | InstKind::Goto { .. } | InstKind::Branch { .. } | InstKind::Return { .. } | InstKind::Unreachable) {
        String::new()
    } else {
        format!("{} = ", inst.display_name())
    };
    let line = match &inst.kind {
        InstKind::Alloca { allocated_ty } => format!("alloca {}", type_name(ctx, *allocated_ty)),
        InstKind::Load { ptr, loaded_ty } => format!("load {}, {}", type_name(ctx, *loaded_ty), operand_text(ctx, func, *ptr)),
        InstKind::Store { ptr, value } => format!("store {}, {}", operand_text(ctx, func, *ptr), operand_text(ctx, func, *value)),
        InstKind::GetElementPointer { ptr, base_ty, indices } => {
            let idx_text: Vec<String> = indices
                .iter()
                .map(|i| match i {
                    GepIndex::Const(c) => c.to_string(),
                    GepIndex::Value(v) => operand_text(ctx, func, *v),
                })
                .collect();
            format!("gep {}, {}, {}", type_name(ctx, *base_ty), operand_text(ctx, func, *ptr), idx_text.join(", "))
        }
        InstKind::InsertValue { aggregate, value, indices } => {
            format!("insertvalue {}, {}, {:?}", operand_text(ctx, func, *aggregate), operand_text(ctx, func, *value), indices)
        }
        InstKind::ExtractValue { aggregate, indices } => format!("extractvalue {}, {:?}", operand_text(ctx, func, *aggregate), indices),
        InstKind::Arithmetic { op, lhs, rhs } => format!("{} {}, {}", op.mnemonic(), operand_text(ctx, func, *lhs), operand_text(ctx, func, *rhs)),
        InstKind::UnaryArithmetic { op, operand } => format!("{} {}", op.mnemonic(), operand_text(ctx, func, *operand)),
        InstKind::Conversion { op, operand, target_ty } => format!("{} {} to {}", op.mnemonic(), operand_text(ctx, func, *operand), type_name(ctx, *target_ty)),
        InstKind::Compare { mode, op, lhs, rhs } => {
            let mode_mnemonic = match mode {
                CompareMode::Signed => "scmp",
                CompareMode::Unsigned => "ucmp",
                CompareMode::Float => "fcmp",
            };
            format!("{} {} {}, {}", mode_mnemonic, op.mnemonic(), operand_text(ctx, func, *lhs), operand_text(ctx, func, *rhs))
        }
        InstKind::Goto { target } => format!("goto label {}", block_label(func, *target)),
        InstKind::Branch { cond, if_true, if_false } => {
            format!("branch {}, label {}, label {}", operand_text(ctx, func, *cond), block_label(func, *if_true), block_label(func, *if_false))
        }
        InstKind::Return { value } => match value {
            Some(v) => format!("return {}", operand_text(ctx, func, *v)),
            None => "return void".to_string(),
        },
        InstKind::Unreachable => "unreachable".to_string(),
        InstKind::Phi { incoming } => {
            let entries: Vec<String> = incoming.iter().map(|(pred, v)| format!("({}, {})", block_label(func, *pred), operand_text(ctx, func, *v))).collect();
            format!("phi {} {}", type_name(ctx, inst.ty), entries.join(", "))
        }
        InstKind::Call { callee, args } => {
            let name = match callee {
                Callee::Function(fid) => module.function(*fid).name.clone(),
                Callee::Foreign { slot, index } => format!("foreign.{slot}.{index}"),
            };
            let arg_text: Vec<String> = args.iter().map(|a| operand_text(ctx, func, *a)).collect();
            format!("call {} @{}({})", type_name(ctx, inst.ty), name, arg_text.join(", "))
        }
    };
    let _ = writeln!(out, "  {prefix}{line}");
}

fn block_label(func: &crate::module::Function, id: BlockId) -> String {
    func.block(id).name.clone().unwrap_or_else(|| format!("bb{}", id.index()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_trivial_identity_function() {
        let mut ctx = Context::new();
        let text = "func @id(i64) -> i64 {\nentry:\n  return %arg0\n}\n";
        let module = parse(&mut ctx, text).expect("parses");
        let printed = print(&ctx, &module);
        let reparsed = parse(&mut ctx, &printed).expect("reparses its own output");
        assert_eq!(reparsed.functions.len(), 1);
        assert_eq!(module.functions[0].name, "id");
    }

    #[test]
    fn parses_arithmetic_and_branch() {
        let mut ctx = Context::new();
        let text = "func @max(i64, i64) -> i64 {\nentry:\n  %0 = scmp grt i64 %arg0, %arg1\n  branch %0, label then, label els\nthen:\n  goto label merge\nels:\n  goto label merge\nmerge:\n  %1 = phi i64 (then, %arg0), (els, %arg1)\n  return %1\n}\n";
        let module = parse(&mut ctx, text).expect("parses");
        let func = &module.functions[0];
        assert_eq!(func.block_order().len(), 4);
    }

    #[test]
    fn unterminated_brace_reports_an_error() {
        let mut ctx = Context::new();
        let err = parse(&mut ctx, "func @f() -> void {\nentry:\n  return void\n").unwrap_err();
        assert!(err.message.contains("unterminated"));
    }
}
