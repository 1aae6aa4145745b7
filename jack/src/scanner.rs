use std::borrow::Cow;
use std::collections::HashMap;

use crate::error::{LexError, Pos};

/// Largest value `push constant` can carry.
pub const MAX_INT: u16 = 32767;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    EOF,
    Ident(String),
    IntLit(u16),
    StringLit(String),
    LParen,
    RParen,
    LBrack,
    RBrack,
    LBrace,
    RBrace,
    Comma,
    Semicolon,
    Equal,
    Period,
    Plus,
    Minus,
    Asterisk,
    Slash,
    And,
    Or,
    Tilde,
    Lt,
    Gt,
    Class,
    Constructor,
    Method,
    Function,
    Int,
    Boolean,
    Char,
    Void,
    Var,
    Static,
    Field,
    Let,
    Do,
    If,
    Else,
    While,
    Return,
    True,
    False,
    Null,
    This,
}

/// Lexical category of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Keyword,
    Identifier,
    IntConst,
    StringConst,
    Symbol,
    EOF,
}

impl Token {
    pub fn as_str(&self) -> &'static str {
        match self {
            Token::EOF => "EOF",
            Token::Ident(_) => "identifier",
            Token::IntLit(_) => "integer",
            Token::StringLit(_) => "string",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBrack => "[",
            Token::RBrack => "]",
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::Comma => ",",
            Token::Semicolon => ";",
            Token::Equal => "=",
            Token::Period => ".",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Asterisk => "*",
            Token::Slash => "/",
            Token::And => "&",
            Token::Or => "|",
            Token::Tilde => "~",
            Token::Lt => "<",
            Token::Gt => ">",
            Token::Class => "class",
            Token::Constructor => "constructor",
            Token::Method => "method",
            Token::Function => "function",
            Token::Int => "int",
            Token::Boolean => "boolean",
            Token::Char => "char",
            Token::Void => "void",
            Token::Var => "var",
            Token::Static => "static",
            Token::Field => "field",
            Token::Let => "let",
            Token::Do => "do",
            Token::If => "if",
            Token::Else => "else",
            Token::While => "while",
            Token::Return => "return",
            Token::True => "true",
            Token::False => "false",
            Token::Null => "null",
            Token::This => "this",
        }
    }

    pub fn kind(&self) -> TokenKind {
        match self {
            Token::EOF => TokenKind::EOF,
            Token::Ident(_) => TokenKind::Identifier,
            Token::IntLit(_) => TokenKind::IntConst,
            Token::StringLit(_) => TokenKind::StringConst,
            Token::LParen
            | Token::RParen
            | Token::LBrack
            | Token::RBrack
            | Token::LBrace
            | Token::RBrace
            | Token::Comma
            | Token::Semicolon
            | Token::Equal
            | Token::Period
            | Token::Plus
            | Token::Minus
            | Token::Asterisk
            | Token::Slash
            | Token::And
            | Token::Or
            | Token::Tilde
            | Token::Lt
            | Token::Gt => TokenKind::Symbol,
            _ => TokenKind::Keyword,
        }
    }

    /// Literal text of the token as it appeared in the source (string
    /// literals without their quotes).
    pub fn lexeme(&self) -> Cow<'_, str> {
        match self {
            Token::Ident(s) | Token::StringLit(s) => Cow::Borrowed(s),
            Token::IntLit(n) => Cow::Owned(n.to_string()),
            Token::EOF => Cow::Borrowed(""),
            tok => Cow::Borrowed(tok.as_str()),
        }
    }

    /// Name used in diagnostics: the lexeme, or `EOF`.
    pub fn describe(&self) -> String {
        match self {
            Token::EOF => "EOF".to_string(),
            Token::StringLit(s) => format!("\"{}\"", s),
            tok => tok.lexeme().into_owned(),
        }
    }
}

fn utf8_width(b: u8) -> usize {
    match b {
        0xC2..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF4 => 4,
        _ => 0,
    }
}

/// Pull-based tokenizer over one source file.
pub struct Scanner<'a> {
    s: &'a [u8],
    p: usize,
    scan_pos: Pos,
    tok_pos: Pos,
    failed: bool,
    keywords: HashMap<&'static str, Token>,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &'a [u8]) -> Self {
        let keywords = {
            let mut m = HashMap::new();
            m.insert("class", Token::Class);
            m.insert("constructor", Token::Constructor);
            m.insert("method", Token::Method);
            m.insert("function", Token::Function);
            m.insert("int", Token::Int);
            m.insert("boolean", Token::Boolean);
            m.insert("char", Token::Char);
            m.insert("void", Token::Void);
            m.insert("var", Token::Var);
            m.insert("static", Token::Static);
            m.insert("field", Token::Field);
            m.insert("let", Token::Let);
            m.insert("do", Token::Do);
            m.insert("if", Token::If);
            m.insert("else", Token::Else);
            m.insert("while", Token::While);
            m.insert("return", Token::Return);
            m.insert("true", Token::True);
            m.insert("false", Token::False);
            m.insert("null", Token::Null);
            m.insert("this", Token::This);
            m
        };

        Self {
            s: source,
            p: 0,
            scan_pos: Pos::START,
            tok_pos: Pos::START,
            failed: false,
            keywords,
        }
    }

    /// Rewinds to the start of `source`.
    pub fn init(&mut self, source: &'a [u8]) {
        self.s = source;
        self.p = 0;
        self.scan_pos = Pos::START;
        self.tok_pos = Pos::START;
        self.failed = false;
    }

    /// Position of the first character of the last scanned token.
    pub fn pos(&self) -> Pos {
        self.tok_pos
    }

    fn peek(&self) -> Result<Option<(char, usize)>, LexError> {
        let b = match self.s.get(self.p) {
            Some(&b) => b,
            None => return Ok(None),
        };
        match b {
            0 => Err(LexError::NullByte(self.scan_pos)),
            b if b.is_ascii() => Ok(Some((b as char, 1))),
            b => {
                let width = utf8_width(b);
                self.s
                    .get(self.p..self.p + width)
                    .and_then(|bytes| std::str::from_utf8(bytes).ok())
                    .and_then(|s| s.chars().next())
                    .map(|c| Some((c, width)))
                    .ok_or(LexError::InvalidUtf8(self.scan_pos))
            }
        }
    }

    fn mov_p(&mut self, c: char, width: usize) {
        if c == '\n' {
            self.scan_pos.ln += 1;
            self.scan_pos.col = 1;
        } else {
            self.scan_pos.col += 1;
        }
        self.p += width;
    }

    fn scan_while(&mut self, mut accept: impl FnMut(char) -> bool) -> Result<&'a str, LexError> {
        let b = self.p;
        while let Some((c, width)) = self.peek()? {
            if !accept(c) {
                break;
            }
            self.mov_p(c, width);
        }
        std::str::from_utf8(&self.s[b..self.p]).map_err(|_| LexError::InvalidUtf8(self.scan_pos))
    }

    fn skip_line_comment(&mut self) -> Result<(), LexError> {
        self.scan_while(|c| c != '\n')?;
        self.scan_while(|c| c == '\n').map(|_| ())
    }

    fn skip_block_comment(&mut self) -> Result<(), LexError> {
        self.p += 2;
        self.scan_pos.col += 2;
        let mut prev = '\0';
        let mut closed = false;
        self.scan_while(|c| {
            if closed {
                return false;
            }
            closed = prev == '*' && c == '/';
            prev = c;
            true
        })
        .map(|_| ())
    }

    fn skip_trivia(&mut self) -> Result<(), LexError> {
        loop {
            self.scan_while(|c| c.is_ascii_whitespace())?;
            match (self.s.get(self.p), self.s.get(self.p + 1)) {
                (Some(b'/'), Some(b'/')) => self.skip_line_comment()?,
                (Some(b'/'), Some(b'*')) => self.skip_block_comment()?,
                _ => return Ok(()),
            }
        }
    }

    fn next_string(&mut self) -> Result<Token, LexError> {
        self.mov_p('"', 1);
        let s = self.scan_while(|c| c != '"')?;
        if let Some(c) = s.chars().find(|&c| c as u32 > u32::from(MAX_INT)) {
            return Err(LexError::CharOutOfRange(self.tok_pos, c));
        }
        // an unterminated string runs to the end of input
        if self.p < self.s.len() {
            self.mov_p('"', 1);
        }
        Ok(Token::StringLit(s.to_string()))
    }

    fn next_int(&mut self) -> Result<Token, LexError> {
        let digits = self.scan_while(|c| c.is_ascii_digit())?;
        digits
            .parse::<u16>()
            .ok()
            .filter(|&n| n <= MAX_INT)
            .map(Token::IntLit)
            .ok_or_else(|| LexError::IntegerOverflow(self.tok_pos, digits.to_string()))
    }

    fn next_ident_or_keyword(&mut self) -> Result<Token, LexError> {
        let s = self.scan_while(|c| c.is_ascii_alphanumeric() || c == '_')?;
        Ok(self
            .keywords
            .get(s)
            .cloned()
            .unwrap_or_else(|| Token::Ident(s.to_string())))
    }

    fn next_symbol(&mut self, sym: Token) -> Result<Token, LexError> {
        self.p += 1;
        self.scan_pos.col += 1;
        Ok(sym)
    }

    /// Returns the next token, skipping whitespace and comments. Once the
    /// input is exhausted every call returns [`Token::EOF`].
    pub fn scan_token(&mut self) -> Result<Token, LexError> {
        self.skip_trivia()?;
        self.tok_pos = self.scan_pos;
        let c = match self.peek()? {
            Some((c, _)) => c,
            None => return Ok(Token::EOF),
        };
        match c {
            '(' => self.next_symbol(Token::LParen),
            ')' => self.next_symbol(Token::RParen),
            '[' => self.next_symbol(Token::LBrack),
            ']' => self.next_symbol(Token::RBrack),
            '{' => self.next_symbol(Token::LBrace),
            '}' => self.next_symbol(Token::RBrace),
            ',' => self.next_symbol(Token::Comma),
            ';' => self.next_symbol(Token::Semicolon),
            '=' => self.next_symbol(Token::Equal),
            '.' => self.next_symbol(Token::Period),
            '+' => self.next_symbol(Token::Plus),
            '-' => self.next_symbol(Token::Minus),
            '*' => self.next_symbol(Token::Asterisk),
            '/' => self.next_symbol(Token::Slash),
            '&' => self.next_symbol(Token::And),
            '|' => self.next_symbol(Token::Or),
            '~' => self.next_symbol(Token::Tilde),
            '<' => self.next_symbol(Token::Lt),
            '>' => self.next_symbol(Token::Gt),
            '"' => self.next_string(),
            c if c.is_ascii_digit() => self.next_int(),
            c if c.is_ascii_alphabetic() || c == '_' => self.next_ident_or_keyword(),
            c => Err(LexError::UnexpectedChar(self.scan_pos, c)),
        }
    }
}

impl<'a> Iterator for Scanner<'a> {
    type Item = Result<(Pos, Token), LexError>;

    /// Yields tokens with their positions up to, but not including, EOF.
    /// Iteration stops after the first error.
    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.scan_token() {
            Ok(Token::EOF) => None,
            Ok(tok) => Some(Ok((self.tok_pos, tok))),
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static EXAMPLE_1: &[u8] = br#"
//
// line comment
/**/
/* block comment */
/** doc
 * comment */
class List {
    field int data;
    static List _next2;

    method int getData() {
        return data * 3 / (2 - 1);
    }
}
"#;

    fn tokens(source: &[u8]) -> Vec<Token> {
        Scanner::new(source)
            .map(|r| r.map(|(_, tok)| tok))
            .collect::<Result<_, _>>()
            .unwrap()
    }

    #[test]
    fn test_lex() {
        let toks = tokens(EXAMPLE_1);
        assert_eq!(
            &toks[..6],
            &[
                Token::Class,
                Token::Ident("List".to_string()),
                Token::LBrace,
                Token::Field,
                Token::Int,
                Token::Ident("data".to_string()),
            ]
        );
        assert!(toks.contains(&Token::Ident("_next2".to_string())));
        assert!(toks.contains(&Token::IntLit(3)));
        assert_eq!(toks.last(), Some(&Token::RBrace));
    }

    #[test]
    fn test_positions() {
        let mut scanner = Scanner::new(b"class\n  Main {");
        assert_eq!(scanner.scan_token().unwrap(), Token::Class);
        assert_eq!(scanner.pos(), Pos { ln: 1, col: 1 });
        assert_eq!(scanner.scan_token().unwrap(), Token::Ident("Main".to_string()));
        assert_eq!(scanner.pos(), Pos { ln: 2, col: 3 });
        assert_eq!(scanner.scan_token().unwrap(), Token::LBrace);
        assert_eq!(scanner.pos(), Pos { ln: 2, col: 8 });
    }

    #[test]
    fn test_eof_is_sticky() {
        let mut scanner = Scanner::new(b"  // nothing here");
        assert_eq!(scanner.scan_token().unwrap(), Token::EOF);
        assert_eq!(scanner.scan_token().unwrap(), Token::EOF);
    }

    #[test]
    fn test_strings() {
        assert_eq!(
            tokens(br#""hello, world" x"#),
            vec![
                Token::StringLit("hello, world".to_string()),
                Token::Ident("x".to_string())
            ]
        );
        assert_eq!(
            tokens("\"caf\u{e9} // not a comment".as_bytes()),
            vec![Token::StringLit("caf\u{e9} // not a comment".to_string())]
        );
    }

    #[test]
    fn test_slash_is_a_symbol() {
        assert_eq!(
            tokens(b"a/b"),
            vec![
                Token::Ident("a".to_string()),
                Token::Slash,
                Token::Ident("b".to_string())
            ]
        );
    }

    #[test]
    fn test_unterminated_block_comment() {
        assert_eq!(tokens(b"let /* never closed"), vec![Token::Let]);
    }

    #[test]
    fn test_lexical_errors() {
        let mut scanner = Scanner::new(b"let x\0");
        scanner.scan_token().unwrap();
        scanner.scan_token().unwrap();
        assert_eq!(
            scanner.scan_token(),
            Err(LexError::NullByte(Pos { ln: 1, col: 6 }))
        );

        let mut scanner = Scanner::new(b"// \xff\xfe");
        assert_eq!(
            scanner.scan_token(),
            Err(LexError::InvalidUtf8(Pos { ln: 1, col: 4 }))
        );

        let mut scanner = Scanner::new(b"32768");
        assert_eq!(
            scanner.scan_token(),
            Err(LexError::IntegerOverflow(Pos::START, "32768".to_string()))
        );

        let mut scanner = Scanner::new(b"#");
        assert_eq!(
            scanner.scan_token(),
            Err(LexError::UnexpectedChar(Pos::START, '#'))
        );
    }

    #[test]
    fn test_string_chars_beyond_vm_range() {
        let mut scanner = Scanner::new("let s = \"ok \u{1F600}\";".as_bytes());
        for _ in 0..3 {
            scanner.scan_token().unwrap();
        }
        assert_eq!(
            scanner.scan_token(),
            Err(LexError::CharOutOfRange(Pos { ln: 1, col: 9 }, '\u{1F600}'))
        );
        assert_eq!(
            tokens("\"\u{7FFF}\"".as_bytes()),
            vec![Token::StringLit("\u{7FFF}".to_string())]
        );
    }

    #[test]
    fn test_iteration_stops_after_error() {
        let mut scanner = Scanner::new(b"do # while");
        assert_eq!(scanner.next(), Some(Ok((Pos::START, Token::Do))));
        assert_eq!(
            scanner.next(),
            Some(Err(LexError::UnexpectedChar(Pos { ln: 1, col: 4 }, '#')))
        );
        assert_eq!(scanner.next(), None);
        assert_eq!(scanner.next(), None);
    }

    #[test]
    fn test_init_rewinds() {
        let mut scanner = Scanner::new(b"do");
        assert_eq!(scanner.scan_token().unwrap(), Token::Do);
        scanner.init(b"while");
        assert_eq!(scanner.scan_token().unwrap(), Token::While);
        assert_eq!(scanner.pos(), Pos::START);
    }

    #[test]
    fn test_token_kinds() {
        assert_eq!(Token::Let.kind(), TokenKind::Keyword);
        assert_eq!(Token::Lt.kind(), TokenKind::Symbol);
        assert_eq!(Token::IntLit(7).lexeme(), "7");
        assert_eq!(Token::StringLit("a b".to_string()).describe(), "\"a b\"");
    }
}
