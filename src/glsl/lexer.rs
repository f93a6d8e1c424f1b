//! Tokenizer for GLSL ES source text.
//!
//! Preprocessor directives are whole-line constructs; the lexer captures a
//! directive line as a single [`Token::Directive`] whose body is tokenized
//! recursively.

use super::ParseError;

#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    Ident(String),
    Int(i64),
    Uint(u64),
    Float(f64),
    Bool(bool),
    Kw(Kw),
    Punct(Punct),
    Directive(Directive),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Directive {
    pub name: String,
    pub tokens: Vec<Spanned>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Kw {
    Attribute,
    Varying,
    Uniform,
    Const,
    In,
    Out,
    InOut,
    Precision,
    Struct,
    Return,
    If,
    Else,
    For,
    Discard,
    Break,
    Continue,
    Layout,
    Highp,
    Mediump,
    Lowp,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Punct {
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Semi,
    Comma,
    Dot,
    Question,
    Colon,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Tilde,
    Lt,
    Gt,
    Le,
    Ge,
    EqEq,
    Ne,
    Eq,
    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,
    PercentEq,
    AndAnd,
    OrOr,
    Inc,
    Dec,
    Amp,
    Pipe,
    Caret,
    Shl,
    Shr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub line: u32,
}

pub fn tokenize(input: &str) -> Result<Vec<Spanned>, ParseError> {
    let mut cursor = Cursor::new(input);
    let mut tokens = Vec::new();

    loop {
        cursor.skip_trivia();
        let Some(char) = cursor.peek() else {
            break;
        };

        if char == '#' && cursor.at_line_start {
            tokens.push(cursor.directive()?);
            continue;
        }

        let line = cursor.line;
        let token = if char.is_ascii_alphabetic() || char == '_' {
            cursor.ident()
        } else if char.is_ascii_digit() || (char == '.' && cursor.peek_second_is_digit()) {
            cursor.number()?
        } else {
            cursor.punct()?
        };

        tokens.push(Spanned { token, line });
    }

    Ok(tokens)
}

struct Cursor<'a> {
    input: &'a str,
    line: u32,
    at_line_start: bool,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            line: 1,
            at_line_start: true,
        }
    }

    fn peek(&self) -> Option<char> {
        self.input.chars().next()
    }

    fn peek_second_is_digit(&self) -> bool {
        self.input
            .chars()
            .nth(1)
            .is_some_and(|c| c.is_ascii_digit())
    }

    fn consume(&mut self) -> Option<char> {
        let char = self.input.chars().next()?;
        self.input = &self.input[char.len_utf8()..];
        if char == '\n' {
            self.line += 1;
            self.at_line_start = true;
        } else if !char.is_ascii_whitespace() {
            self.at_line_start = false;
        }
        Some(char)
    }

    fn consume_if(&mut self, prefix: &str) -> bool {
        if self.input.starts_with(prefix) {
            for _ in 0..prefix.chars().count() {
                self.consume();
            }
            true
        } else {
            false
        }
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_ascii_whitespace() => {
                    self.consume();
                }
                Some('/') if self.input.starts_with("//") => {
                    while let Some(c) = self.consume() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                Some('/') if self.input.starts_with("/*") => {
                    self.consume();
                    self.consume();
                    loop {
                        if self.input.starts_with("*/") {
                            self.consume();
                            self.consume();
                            break;
                        }
                        if self.consume().is_none() {
                            break;
                        }
                    }
                }
                _ => break,
            }
        }
    }

    fn ident(&mut self) -> Token {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                name.push(c);
                self.consume();
            } else {
                break;
            }
        }

        match name.as_str() {
            "true" => Token::Bool(true),
            "false" => Token::Bool(false),
            "attribute" => Token::Kw(Kw::Attribute),
            "varying" => Token::Kw(Kw::Varying),
            "uniform" => Token::Kw(Kw::Uniform),
            "const" => Token::Kw(Kw::Const),
            "in" => Token::Kw(Kw::In),
            "out" => Token::Kw(Kw::Out),
            "inout" => Token::Kw(Kw::InOut),
            "precision" => Token::Kw(Kw::Precision),
            "struct" => Token::Kw(Kw::Struct),
            "return" => Token::Kw(Kw::Return),
            "if" => Token::Kw(Kw::If),
            "else" => Token::Kw(Kw::Else),
            "for" => Token::Kw(Kw::For),
            "discard" => Token::Kw(Kw::Discard),
            "break" => Token::Kw(Kw::Break),
            "continue" => Token::Kw(Kw::Continue),
            "layout" => Token::Kw(Kw::Layout),
            "highp" => Token::Kw(Kw::Highp),
            "mediump" => Token::Kw(Kw::Mediump),
            "lowp" => Token::Kw(Kw::Lowp),
            _ => Token::Ident(name),
        }
    }

    fn number(&mut self) -> Result<Token, ParseError> {
        let line = self.line;
        let mut text = String::new();
        let mut is_float = false;

        if self.input.starts_with("0x") || self.input.starts_with("0X") {
            self.consume();
            self.consume();
            while let Some(c) = self.peek() {
                if c.is_ascii_hexdigit() {
                    text.push(c);
                    self.consume();
                } else {
                    break;
                }
            }
            let value = i64::from_str_radix(&text, 16)
                .map_err(|_| ParseError::new(line, format!("bad hex literal 0x{text}")))?;
            return Ok(Token::Int(value));
        }

        while let Some(c) = self.peek() {
            match c {
                '0'..='9' => {
                    text.push(c);
                    self.consume();
                }
                '.' => {
                    is_float = true;
                    text.push(c);
                    self.consume();
                }
                'e' | 'E' => {
                    is_float = true;
                    text.push(c);
                    self.consume();
                    if let Some(sign @ ('+' | '-')) = self.peek() {
                        text.push(sign);
                        self.consume();
                    }
                }
                _ => break,
            }
        }

        // Type suffixes: `u` marks unsigned, `f` marks float.
        if self.consume_if("u") || self.consume_if("U") {
            let value = text
                .parse::<u64>()
                .map_err(|_| ParseError::new(line, format!("bad uint literal {text}")))?;
            return Ok(Token::Uint(value));
        }
        if self.consume_if("f") || self.consume_if("F") {
            is_float = true;
        }

        if is_float {
            let value = text
                .parse::<f64>()
                .map_err(|_| ParseError::new(line, format!("bad float literal {text}")))?;
            Ok(Token::Float(value))
        } else {
            let value = text
                .parse::<i64>()
                .map_err(|_| ParseError::new(line, format!("bad int literal {text}")))?;
            Ok(Token::Int(value))
        }
    }

    fn punct(&mut self) -> Result<Token, ParseError> {
        for (punct, text) in [
            (Punct::Shl, "<<"),
            (Punct::Shr, ">>"),
            (Punct::Le, "<="),
            (Punct::Ge, ">="),
            (Punct::EqEq, "=="),
            (Punct::Ne, "!="),
            (Punct::AndAnd, "&&"),
            (Punct::OrOr, "||"),
            (Punct::Inc, "++"),
            (Punct::Dec, "--"),
            (Punct::PlusEq, "+="),
            (Punct::MinusEq, "-="),
            (Punct::StarEq, "*="),
            (Punct::SlashEq, "/="),
            (Punct::PercentEq, "%="),
            (Punct::LParen, "("),
            (Punct::RParen, ")"),
            (Punct::LBrace, "{"),
            (Punct::RBrace, "}"),
            (Punct::LBracket, "["),
            (Punct::RBracket, "]"),
            (Punct::Semi, ";"),
            (Punct::Comma, ","),
            (Punct::Dot, "."),
            (Punct::Question, "?"),
            (Punct::Colon, ":"),
            (Punct::Plus, "+"),
            (Punct::Minus, "-"),
            (Punct::Star, "*"),
            (Punct::Slash, "/"),
            (Punct::Percent, "%"),
            (Punct::Bang, "!"),
            (Punct::Tilde, "~"),
            (Punct::Lt, "<"),
            (Punct::Gt, ">"),
            (Punct::Eq, "="),
            (Punct::Amp, "&"),
            (Punct::Pipe, "|"),
            (Punct::Caret, "^"),
        ] {
            if self.consume_if(text) {
                return Ok(Token::Punct(punct));
            }
        }

        let char = self.peek().unwrap_or('\0');
        Err(ParseError::new(
            self.line,
            format!("unexpected character {char:?}"),
        ))
    }

    fn directive(&mut self) -> Result<Spanned, ParseError> {
        let line = self.line;
        // `#`
        self.consume();

        let mut body = String::new();
        loop {
            match self.peek() {
                // Line continuation.
                Some('\\') if self.input.starts_with("\\\n") => {
                    self.consume();
                    self.consume();
                    body.push(' ');
                }
                Some('\n') | None => break,
                Some(c) => {
                    body.push(c);
                    self.consume();
                }
            }
        }

        let mut parts = body.trim().splitn(2, char::is_whitespace);
        let name = parts.next().unwrap_or("").to_owned();
        let rest = parts.next().unwrap_or("");
        let tokens = tokenize(rest)?;

        Ok(Spanned {
            token: Token::Directive(Directive { name, tokens }),
            line,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{tokenize, Kw, Punct, Token};

    fn toks(input: &str) -> Vec<Token> {
        tokenize(input)
            .unwrap()
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    #[test]
    fn lexes_declaration() {
        assert_eq!(
            toks("attribute vec2 a_pos;"),
            vec![
                Token::Kw(Kw::Attribute),
                Token::Ident("vec2".into()),
                Token::Ident("a_pos".into()),
                Token::Punct(Punct::Semi),
            ],
        );
    }

    #[test]
    fn lexes_numbers() {
        assert_eq!(
            toks("1 2.5 .5 1e3 3u 0x1F"),
            vec![
                Token::Int(1),
                Token::Float(2.5),
                Token::Float(0.5),
                Token::Float(1000.0),
                Token::Uint(3),
                Token::Int(31),
            ],
        );
    }

    #[test]
    fn comments_are_trivia() {
        assert_eq!(
            toks("a // comment\n/* block\nspanning */ b"),
            vec![Token::Ident("a".into()), Token::Ident("b".into())],
        );
    }

    #[test]
    fn directive_captures_whole_line() {
        let tokens = toks("#define PI 3.14\nfloat x;");
        let Token::Directive(directive) = &tokens[0] else {
            panic!("expected directive, got {:?}", tokens[0]);
        };
        assert_eq!(directive.name, "define");
        assert_eq!(directive.tokens.len(), 2);
        assert_eq!(tokens.len(), 4);
    }

    #[test]
    fn two_char_operators_win_over_single() {
        assert_eq!(
            toks("a <= b == c && d++"),
            vec![
                Token::Ident("a".into()),
                Token::Punct(Punct::Le),
                Token::Ident("b".into()),
                Token::Punct(Punct::EqEq),
                Token::Ident("c".into()),
                Token::Punct(Punct::AndAnd),
                Token::Ident("d".into()),
                Token::Punct(Punct::Inc),
            ],
        );
    }
}
