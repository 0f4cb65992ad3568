//! Line normalization and directive tokenization.
//!
//! Source text is first folded into logical lines: backslash-newline
//! continuations are joined and comments are replaced by a single space.
//! String and character literals are copied verbatim, so comment markers
//! inside them survive. Directive text is then split into [`Token`]s.

use std::ops::Range;

/// A line after continuation joining and comment removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalLine {
    /// 1-based number of the physical line the logical line starts on.
    pub number: usize,
    pub text: String,
}

/// Fold `contents` into logical lines, skipping blank ones.
pub fn logical_lines(contents: &str) -> Vec<LogicalLine> {
    LineFolder::new(contents).run()
}

struct LineFolder {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    start: usize,
    current: String,
    out: Vec<LogicalLine>,
}

impl LineFolder {
    fn new(contents: &str) -> Self {
        Self {
            chars: contents.chars().collect(),
            pos: 0,
            line: 1,
            start: 1,
            current: String::new(),
            out: Vec::new(),
        }
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    /// Consume a backslash-newline pair at the cursor, if any.
    fn skip_continuation(&mut self) -> bool {
        if self.peek(0) != Some('\\') {
            return false;
        }
        match (self.peek(1), self.peek(2)) {
            (Some('\n'), _) => self.pos += 2,
            (Some('\r'), Some('\n')) => self.pos += 3,
            _ => return false,
        }
        self.line += 1;
        true
    }

    fn run(mut self) -> Vec<LogicalLine> {
        while let Some(c) = self.peek(0) {
            if self.skip_continuation() {
                continue;
            }
            match c {
                '\n' => {
                    self.pos += 1;
                    self.finish_line();
                    self.line += 1;
                    self.start = self.line;
                }
                '\r' => self.pos += 1,
                '/' if self.peek(1) == Some('/') => self.skip_line_comment(),
                '/' if self.peek(1) == Some('*') => self.skip_block_comment(),
                '"' | '\'' => self.copy_literal(c),
                _ => {
                    self.current.push(c);
                    self.pos += 1;
                }
            }
        }
        self.finish_line();
        self.out
    }

    fn finish_line(&mut self) {
        let text = std::mem::take(&mut self.current);
        if !text.trim().is_empty() {
            self.out.push(LogicalLine {
                number: self.start,
                text,
            });
        }
    }

    fn skip_line_comment(&mut self) {
        // A continuation extends a line comment onto the next physical line.
        while let Some(c) = self.peek(0) {
            if self.skip_continuation() {
                continue;
            }
            if c == '\n' {
                break;
            }
            self.pos += 1;
        }
    }

    fn skip_block_comment(&mut self) {
        self.pos += 2;
        while let Some(c) = self.peek(0) {
            if c == '*' && self.peek(1) == Some('/') {
                self.pos += 2;
                break;
            }
            if c == '\n' {
                self.line += 1;
            }
            self.pos += 1;
        }
        self.current.push(' ');
    }

    fn copy_literal(&mut self, quote: char) {
        self.current.push(quote);
        self.pos += 1;
        while let Some(c) = self.peek(0) {
            if self.skip_continuation() {
                continue;
            }
            match c {
                '\n' => break,
                '\\' => {
                    self.current.push(c);
                    self.pos += 1;
                    if let Some(escaped) = self.peek(0).filter(|e| *e != '\n') {
                        self.current.push(escaped);
                        self.pos += 1;
                    }
                }
                _ => {
                    self.current.push(c);
                    self.pos += 1;
                    if c == quote {
                        break;
                    }
                }
            }
        }
    }
}

/// Kind of a directive token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    String,
    Char,
    Number,
    Hash,
    HashHash,
    LParen,
    RParen,
    Comma,
    Ellipsis,
    Less,
    Greater,
    Other,
}

/// A token of directive text with its byte span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub span: Range<usize>,
}

impl Token {
    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }
}

/// Split directive text into tokens. Whitespace is dropped.
pub fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let kind = if c.is_ascii_alphabetic() || c == '_' || c == '$' {
            eat_while(&mut chars, |c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
            TokenKind::Ident
        } else if c.is_ascii_digit() {
            eat_while(&mut chars, |c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
            TokenKind::Number
        } else if c == '"' || c == '\'' {
            chars.next();
            let mut escaped = false;
            for (_, next) in chars.by_ref() {
                if escaped {
                    escaped = false;
                } else if next == '\\' {
                    escaped = true;
                } else if next == c {
                    break;
                }
            }
            if c == '"' { TokenKind::String } else { TokenKind::Char }
        } else {
            chars.next();
            match c {
                '#' => {
                    if chars.next_if(|&(_, n)| n == '#').is_some() {
                        TokenKind::HashHash
                    } else {
                        TokenKind::Hash
                    }
                }
                '(' => TokenKind::LParen,
                ')' => TokenKind::RParen,
                ',' => TokenKind::Comma,
                '<' => TokenKind::Less,
                '>' => TokenKind::Greater,
                '.' if text[start..].starts_with("...") => {
                    chars.next();
                    chars.next();
                    TokenKind::Ellipsis
                }
                _ => TokenKind::Other,
            }
        };

        let end = chars.peek().map_or(text.len(), |&(i, _)| i);
        tokens.push(Token {
            kind,
            text: text[start..end].to_string(),
            span: start..end,
        });
    }

    tokens
}

fn eat_while<I>(chars: &mut std::iter::Peekable<I>, accept: impl Fn(char) -> bool)
where
    I: Iterator<Item = (usize, char)>,
{
    while chars.next_if(|&(_, c)| accept(c)).is_some() {}
}
