//! XML dumps of the Jack analyzer: the flat `<tokens>` stream and the
//! parse tree written while a class is compiled.
use std::fmt::Write;

use crate::error::LexError;
use crate::scanner::{Scanner, Token, TokenKind};

fn tag(kind: TokenKind) -> &'static str {
    match kind {
        TokenKind::Keyword => "keyword",
        TokenKind::Identifier => "identifier",
        TokenKind::IntConst => "integerConstant",
        TokenKind::StringConst => "stringConstant",
        TokenKind::Symbol => "symbol",
        TokenKind::EOF => unreachable!(),
    }
}

fn escape(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
}

fn write_token(tok: &Token, out: &mut String) {
    let tag = tag(tok.kind());
    let _ = write!(out, "<{}> ", tag);
    escape(&tok.lexeme(), out);
    let _ = writeln!(out, " </{}>", tag);
}

pub fn tokens_xml(source: &[u8]) -> Result<String, LexError> {
    let mut out = String::from("<tokens>\n");
    for tok in Scanner::new(source) {
        let (_, tok) = tok?;
        write_token(&tok, &mut out);
    }
    out.push_str("</tokens>\n");
    Ok(out)
}

/// Parse tree sink: one element per grammar rule, one leaf per consumed
/// token, indented by two spaces per level.
#[derive(Debug, Default)]
pub struct TreeWriter {
    out: String,
    depth: usize,
}

impl TreeWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn indent(&mut self) {
        for _ in 0..self.depth {
            self.out.push_str("  ");
        }
    }

    pub fn open(&mut self, rule: &str) {
        self.indent();
        let _ = writeln!(self.out, "<{}>", rule);
        self.depth += 1;
    }

    pub fn close(&mut self, rule: &str) {
        self.depth = self.depth.saturating_sub(1);
        self.indent();
        let _ = writeln!(self.out, "</{}>", rule);
    }

    pub fn token(&mut self, tok: &Token) {
        if *tok == Token::EOF {
            return;
        }
        self.indent();
        write_token(tok, &mut self.out);
    }

    pub fn finish(self) -> String {
        self.out
    }
}
