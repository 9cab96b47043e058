use crate::diagnostics::{Diagnostic, DiagnosticKind, SourceSpan};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Var,
    Const,
    Function,
    Class,
    Extends,
    Constructor,
    Private,
    Public,
    Static,
    Struct,
    Enum,
    Library,
    Namespace,
    Import,
    As,
    New,
    This,
    If,
    Else,
    While,
    Do,
    For,
    Switch,
    Case,
    Default,
    Break,
    Continue,
    Return,
    Try,
    Catch,
    Finally,
    Throw,
    True,
    False,
    Null,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    Integer,
    Double,
    String,
    Keyword(Keyword),
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Colon,
    Semicolon,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    PlusPlus,
    MinusMinus,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Ampersand,
    DoubleAmpersand,
    DoublePipe,
    Bang,
    BangEqual,
    EqualEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub span: SourceSpan,
}

pub struct Lexer<'a> {
    source: &'a str,
    chars: std::str::CharIndices<'a>,
    current: usize,
    peeked: Option<(usize, char)>,
    line: u32,
    column: u32,
    token_line: u32,
    token_column: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices(),
            current: 0,
            peeked: None,
            line: 1,
            column: 1,
            token_line: 1,
            token_column: 1,
        }
    }

    fn bump(&mut self) -> Option<(usize, char)> {
        let next = match self.peeked.take() {
            Some(pair) => Some(pair),
            None => self.chars.next(),
        };
        let (idx, ch) = next?;
        self.current = idx + ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some((idx, ch))
    }

    fn peek(&mut self) -> Option<(usize, char)> {
        if self.peeked.is_none() {
            self.peeked = self.chars.next();
        }
        self.peeked
    }

    /// Character after the peeked one.
    fn peek_second(&mut self) -> Option<char> {
        self.peek();
        self.chars.clone().next().map(|(_, ch)| ch)
    }

    fn match_next(&mut self, expected: char) -> bool {
        match self.peek() {
            Some((_, ch)) if ch == expected => {
                self.bump();
                true
            }
            _ => false,
        }
    }

    fn here(&self) -> SourceSpan {
        SourceSpan::new(self.current, self.current, self.line, self.column)
    }

    fn span_from(&self, start: usize) -> SourceSpan {
        SourceSpan::new(start, self.current, self.token_line, self.token_column)
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), Diagnostic> {
        loop {
            match self.peek() {
                Some((_, ch)) if ch.is_whitespace() => {
                    self.bump();
                }
                Some((_, '#')) if self.peek_second() == Some('#') => {
                    while let Some((_, ch)) = self.peek() {
                        if ch == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some((_, '/')) if self.peek_second() == Some('#') => {
                    let opened = self.here();
                    self.bump();
                    self.bump();
                    let mut depth = 1;
                    while depth > 0 {
                        match self.bump() {
                            Some((_, '/')) if self.match_next('#') => depth += 1,
                            Some((_, '#')) if self.match_next('/') => depth -= 1,
                            Some(_) => {}
                            None => {
                                return Err(Diagnostic::new(
                                    DiagnosticKind::SyntaxError,
                                    "unterminated block comment",
                                )
                                .with_span(opened));
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn identifier_or_keyword(&mut self, start: usize) -> Token {
        while let Some((_, ch)) = self.peek() {
            if ch.is_alphanumeric() || ch == '_' {
                self.bump();
            } else {
                break;
            }
        }
        let lexeme = self.source[start..self.current].to_string();
        let kind = keyword_for(&lexeme).unwrap_or(TokenKind::Identifier);
        Token {
            kind,
            lexeme,
            span: self.span_from(start),
        }
    }

    fn number_literal(&mut self, start: usize) -> Token {
        let mut seen_dot = false;
        while let Some((_, ch)) = self.peek() {
            match ch {
                '0'..='9' => {
                    self.bump();
                }
                '.' if !seen_dot && self.peek_second().is_some_and(|c| c.is_ascii_digit()) => {
                    seen_dot = true;
                    self.bump();
                }
                _ => break,
            }
        }
        Token {
            kind: if seen_dot {
                TokenKind::Double
            } else {
                TokenKind::Integer
            },
            lexeme: self.source[start..self.current].to_string(),
            span: self.span_from(start),
        }
    }

    fn string_literal(&mut self, start: usize) -> Result<Token, Diagnostic> {
        let mut value = String::new();
        loop {
            let escape_at = self.here();
            match self.bump() {
                Some((_, '"')) => {
                    return Ok(Token {
                        kind: TokenKind::String,
                        lexeme: value,
                        span: self.span_from(start),
                    });
                }
                Some((_, '\\')) => match self.bump() {
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, 'r')) => value.push('\r'),
                    Some((_, 't')) => value.push('\t'),
                    Some((_, '"')) => value.push('"'),
                    Some((_, '\'')) => value.push('\''),
                    Some((_, '\\')) => value.push('\\'),
                    Some((_, other)) => {
                        return Err(Diagnostic::new(
                            DiagnosticKind::SyntaxError,
                            format!("invalid escape sequence `\\{other}`"),
                        )
                        .with_span(escape_at));
                    }
                    None => {
                        return Err(Diagnostic::new(
                            DiagnosticKind::SyntaxError,
                            "unterminated escape sequence",
                        )
                        .with_span(escape_at));
                    }
                },
                Some((_, ch)) => value.push(ch),
                None => break,
            }
        }
        Err(
            Diagnostic::new(DiagnosticKind::SyntaxError, "unterminated string literal")
                .with_span(self.span_from(start)),
        )
    }

    fn simple_token(&mut self, start: usize, kind: TokenKind) -> Token {
        Token {
            kind,
            lexeme: self.source[start..self.current].to_string(),
            span: self.span_from(start),
        }
    }

    /// Picks `compound` when the next character is `next`, else `single`.
    fn either(&mut self, start: usize, next: char, compound: TokenKind, single: TokenKind) -> Token {
        if self.match_next(next) {
            self.simple_token(start, compound)
        } else {
            self.simple_token(start, single)
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, Diagnostic> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace_and_comments()?;
            self.token_line = self.line;
            self.token_column = self.column;
            let Some((start, ch)) = self.bump() else {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    lexeme: String::new(),
                    span: self.here(),
                });
                break;
            };

            let token = match ch {
                'a'..='z' | 'A'..='Z' | '_' => self.identifier_or_keyword(start),
                '0'..='9' => self.number_literal(start),
                '"' => self.string_literal(start)?,
                '(' => self.simple_token(start, TokenKind::LParen),
                ')' => self.simple_token(start, TokenKind::RParen),
                '{' => self.simple_token(start, TokenKind::LBrace),
                '}' => self.simple_token(start, TokenKind::RBrace),
                '[' => self.simple_token(start, TokenKind::LBracket),
                ']' => self.simple_token(start, TokenKind::RBracket),
                ',' => self.simple_token(start, TokenKind::Comma),
                '.' => self.simple_token(start, TokenKind::Dot),
                ';' => self.simple_token(start, TokenKind::Semicolon),
                ':' => self.simple_token(start, TokenKind::Colon),
                '+' => {
                    if self.match_next('+') {
                        self.simple_token(start, TokenKind::PlusPlus)
                    } else {
                        self.either(start, '=', TokenKind::PlusAssign, TokenKind::Plus)
                    }
                }
                '-' => {
                    if self.match_next('-') {
                        self.simple_token(start, TokenKind::MinusMinus)
                    } else {
                        self.either(start, '=', TokenKind::MinusAssign, TokenKind::Minus)
                    }
                }
                '*' => self.either(start, '=', TokenKind::StarAssign, TokenKind::Star),
                '/' => self.either(start, '=', TokenKind::SlashAssign, TokenKind::Slash),
                '%' => self.either(start, '=', TokenKind::PercentAssign, TokenKind::Percent),
                '=' => self.either(start, '=', TokenKind::EqualEqual, TokenKind::Assign),
                '!' => self.either(start, '=', TokenKind::BangEqual, TokenKind::Bang),
                '<' => self.either(start, '=', TokenKind::LessEqual, TokenKind::Less),
                '>' => self.either(start, '=', TokenKind::GreaterEqual, TokenKind::Greater),
                '&' => self.either(start, '&', TokenKind::DoubleAmpersand, TokenKind::Ampersand),
                '|' if self.match_next('|') => self.simple_token(start, TokenKind::DoublePipe),
                other => {
                    return Err(Diagnostic::new(
                        DiagnosticKind::SyntaxError,
                        format!("unexpected character `{other}`"),
                    )
                    .with_span(self.span_from(start)));
                }
            };
            tokens.push(token);
        }
        Ok(tokens)
    }
}

fn keyword_for(ident: &str) -> Option<TokenKind> {
    use self::Keyword as Kw;
    let keyword = match ident {
        "var" => Kw::Var,
        "const" => Kw::Const,
        "function" => Kw::Function,
        "class" => Kw::Class,
        "extends" => Kw::Extends,
        "constructor" => Kw::Constructor,
        "private" => Kw::Private,
        "public" => Kw::Public,
        "static" => Kw::Static,
        "struct" => Kw::Struct,
        "enum" => Kw::Enum,
        "library" => Kw::Library,
        "namespace" => Kw::Namespace,
        "import" => Kw::Import,
        "as" => Kw::As,
        "new" => Kw::New,
        "this" => Kw::This,
        "if" => Kw::If,
        "else" => Kw::Else,
        "while" => Kw::While,
        "do" => Kw::Do,
        "for" => Kw::For,
        "switch" => Kw::Switch,
        "case" => Kw::Case,
        "default" => Kw::Default,
        "break" => Kw::Break,
        "continue" => Kw::Continue,
        "return" => Kw::Return,
        "try" => Kw::Try,
        "catch" => Kw::Catch,
        "finally" => Kw::Finally,
        "throw" => Kw::Throw,
        "true" => Kw::True,
        "false" => Kw::False,
        "null" => Kw::Null,
        _ => return None,
    };
    Some(TokenKind::Keyword(keyword))
}
