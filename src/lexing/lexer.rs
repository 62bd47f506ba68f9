use std::any::Any;
use std::collections::HashMap;
use std::io;
use std::sync::mpsc::{channel, Receiver, RecvError, SendError};
use std::thread::{self, JoinHandle};

use crate::common::multiphase::{self, LumenString};
use crate::common::peekable_buffer::PeekableBuffer;
use crate::lexing::char_escapes;
use crate::lexing::keywords;
use crate::lexing::tokens::{Literal, Token};
use crate::source::in_memory::Source;
use crate::source::Position;

const LEXER_THREAD_NAME: &str = "lumenc lexer";

/// A lexed token that remembers its position and "trivia" (whitespace and
/// comments on either side), so tooling could pull source apart and put it
/// back together without losing formatting.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LexedToken {
    pub position: Position,
    pub trivia: Option<String>,
    pub token: Token,
}

#[derive(Debug)]
pub enum ErrorDescription {
    Described(String),
    Expected(char),
    Unexpected(char),
    PrematureEof,
    ChannelFailure(String),
    MalformedNumber(String),
}

#[derive(Debug)]
pub struct Error {
    pub position: Position,
    pub description: ErrorDescription,
}

#[derive(Debug)]
pub enum LexerTaskError {
    Lexer(Error),
    Task(Box<dyn Any + Send + 'static>),
}

type TokenResult = Result<Token, Error>;
type LexedTokenResult = Result<LexedToken, Error>;

/// The task that lexes and emits a token stream over a channel: a lexed
/// token channel combined with a join handle on the underlying thread.
pub struct LexerTask {
    pub tokens: Receiver<LexedToken>,
    lexer_handle: JoinHandle<Result<(), Error>>,
}

impl LexerTask {
    pub fn join(self) -> Result<(), LexerTaskError> {
        match self.lexer_handle.join() {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(LexerTaskError::Lexer(err)),
            Err(err) => Err(LexerTaskError::Task(err)),
        }
    }

    pub fn recv(&self) -> Result<LexedToken, RecvError> {
        self.tokens.recv()
    }
}

/// A lexer used by a `LexerTask` to produce a stream of tokens, holding
/// the source to lex plus the character-escape and keyword tables it
/// consults while doing so.
pub struct Lexer {
    source: Source,
    char_escapes: HashMap<char, char>,
    keywords: HashMap<&'static str, Token>,
}

impl From<Source> for Lexer {
    fn from(source: Source) -> Self {
        Self {
            source,
            char_escapes: char_escapes::new(),
            keywords: keywords::new(),
        }
    }
}

impl Lexer {
    fn fail<T>(&self, description: impl Into<String>) -> Result<T, Error> {
        Err(Error {
            description: ErrorDescription::Described(description.into()),
            position: self.source.position,
        })
    }

    fn expect<T>(&self, expected: char) -> Result<T, Error> {
        Err(Error {
            description: ErrorDescription::Expected(expected),
            position: self.source.position,
        })
    }

    fn expect_and_discard(&mut self, expected: char) -> Result<(), Error> {
        match self.source.read() {
            Some(c) if c == expected => Ok(()),
            Some(_) => self.expect(expected),
            None => Err(self.premature_eof()),
        }
    }

    fn premature_eof(&self) -> Error {
        Error {
            description: ErrorDescription::PrematureEof,
            position: self.source.position,
        }
    }

    fn error(&self, description: ErrorDescription) -> Error {
        Error {
            description,
            position: self.source.position,
        }
    }

    fn send_error<T>(&self, token: &LexedToken, err: &SendError<T>) -> Error {
        Error {
            position: self.source.position,
            description: ErrorDescription::ChannelFailure(format!(
                "the token channel failed to send token {:?}: {}",
                token, err
            )),
        }
    }

    fn lex_multi_line_comment(&mut self, buffer: &mut String) -> Option<Error> {
        self.source.discard_many(2);

        let mut nesting_level: usize = 1;
        while 1 <= nesting_level {
            match self.source.read() {
                Some(c) => {
                    if (c == '/') && self.source.next_is('*') {
                        buffer.push('/');
                        buffer.push('*');
                        self.source.discard();
                        nesting_level += 1;
                    } else if (c == '*') && self.source.next_is('/') {
                        if 1 < nesting_level {
                            buffer.push('*');
                            buffer.push('/');
                        }
                        self.source.discard();
                        nesting_level -= 1;
                    } else {
                        buffer.push(c);
                    }
                }
                None => break,
            }
        }

        if 1 <= nesting_level {
            Some(self.premature_eof())
        } else {
            None
        }
    }

    fn lex_single_line_comment(&mut self, buffer: &mut String) {
        self.source.discard_many(2);
        while let Some(c) = self.source.read() {
            if (c == '\n') || ((c == '\r') && !self.source.next_is('\n')) {
                break;
            } else if (c == '\r') && self.source.next_is('\n') {
                self.source.discard();
                break;
            } else {
                buffer.push(c);
            }
        }
    }

    fn lex_trivia(&mut self) -> Result<Option<String>, Error> {
        let is_empty = match self.source.peek().cloned() {
            Some('/') => !(self.source.nth_is(1, '*') || self.source.nth_is(1, '/')),
            Some(c) => !c.is_whitespace(),
            None => true,
        };

        if is_empty {
            return Ok(None);
        }

        let mut trivia = String::new();
        loop {
            let next_char = self.source.peek().cloned();
            if (next_char == Some('/')) && self.source.nth_is(1, '*') {
                if let Some(err) = self.lex_multi_line_comment(&mut trivia) {
                    break Err(err);
                }
            } else if (next_char == Some('/')) && self.source.nth_is(1, '/') {
                self.lex_single_line_comment(&mut trivia);
            } else if let Some((c, true)) = next_char.map(|x| (x, x.is_whitespace())) {
                trivia.push(c);
                self.source.discard();
            } else {
                break Ok(Some(trivia));
            }
        }
    }

    fn lex_number(&mut self) -> TokenResult {
        match self.source.read() {
            Some(c) if c.is_ascii_digit() => {
                let mut integer_part = String::new();
                integer_part.push(c);
                let mut fractional_part = String::new();
                let mut saw_decimal_point = false;

                loop {
                    match self.source.peek().cloned() {
                        Some('.') if !saw_decimal_point && self.source.match_nth(1, |c| c.is_ascii_digit()) => {
                            saw_decimal_point = true;
                            self.source.discard();
                        }
                        Some(c) if c.is_ascii_digit() => {
                            if saw_decimal_point {
                                fractional_part.push(c);
                            } else {
                                integer_part.push(c);
                            }
                            self.source.discard();
                        }
                        _ => break,
                    }
                }

                if saw_decimal_point {
                    format!("{}.{}", integer_part, fractional_part)
                        .parse::<f64>()
                        .map(|value| Token::Literal(Literal::Float(value)))
                        .map_err(|err| self.error(ErrorDescription::MalformedNumber(err.to_string())))
                } else {
                    integer_part
                        .parse::<i64>()
                        .map(|value| Token::Literal(Literal::Int(value)))
                        .map_err(|err| self.error(ErrorDescription::MalformedNumber(err.to_string())))
                }
            }
            _ => Err(self.premature_eof()),
        }
    }

    fn lex_rest_of_word(&mut self, buffer: &mut String) {
        loop {
            match self.source.peek() {
                Some(&c) if c.is_alphanumeric() || c == '_' => {
                    self.source.discard();
                    buffer.push(c);
                }
                _ => break,
            }
        }
    }

    fn lex_identifier(&mut self) -> multiphase::Identifier {
        let mut word = String::new();
        self.lex_rest_of_word(&mut word);
        multiphase::Identifier::from(word)
    }

    fn lex_escape_char(&mut self) -> Result<char, Error> {
        self.source.discard();
        match self.source.read() {
            Some(escaped) => self
                .char_escapes
                .get(&escaped)
                .copied()
                .map_or(self.fail(format!("invalid escape: {}", escaped)), Ok),
            None => Err(self.premature_eof()),
        }
    }

    fn lex_string(&mut self) -> TokenResult {
        self.source.discard();
        let mut content = String::new();
        loop {
            match self.source.peek() {
                Some(&'"') => {
                    self.source.discard();
                    break Ok(Token::Literal(Literal::String(LumenString::from(content))));
                }
                Some(&'\\') => content.push(self.lex_escape_char()?),
                Some(&c) => {
                    content.push(c);
                    self.source.discard();
                }
                None => break Err(self.premature_eof()),
            }
        }
    }

    fn lex_char(&mut self) -> TokenResult {
        self.source.discard();
        match self.source.peek() {
            Some(&c) => {
                let result = if c == '\\' {
                    self.lex_escape_char().map(Literal::Char).map(Token::Literal)
                } else {
                    self.source.discard();
                    Ok(Token::Literal(Literal::Char(c)))
                };
                self.expect_and_discard('\'')?;
                result
            }
            None => Err(self.premature_eof()),
        }
    }

    fn lex_boolean_or_keyword_or_identifier(&self, word: String) -> Token {
        match &word[..] {
            "true" => Token::Literal(Literal::Bool(true)),
            "false" => Token::Literal(Literal::Bool(false)),
            _ => self
                .keywords
                .get(&word[..])
                .cloned()
                .unwrap_or_else(|| Token::Identifier(multiphase::Identifier::from(word))),
        }
    }

    fn lex_with_leading_dot(&mut self) -> Token {
        if self.source.next_is('.') {
            self.source.discard();
            Token::DotDot
        } else {
            Token::Dot
        }
    }

    fn lex_with_leading_minus(&mut self) -> Token {
        if self.source.next_is('>') {
            self.source.discard();
            Token::Arrow
        } else if self.source.next_is('=') {
            self.source.discard();
            Token::SubtractAssign
        } else {
            Token::Subtract
        }
    }

    fn lex_with_leading_equals(&mut self) -> Token {
        if self.source.next_is('=') {
            self.source.discard();
            Token::Equal
        } else {
            Token::Assign
        }
    }

    fn lex_with_leading_exclamation_mark(&mut self) -> Token {
        if self.source.next_is('=') {
            self.source.discard();
            Token::NotEqual
        } else {
            Token::Not
        }
    }

    fn lex_with_leading_left_angle_bracket(&mut self) -> Token {
        if self.source.next_is('=') {
            self.source.discard();
            Token::LessThanOrEqual
        } else {
            Token::LeftAngleBracket
        }
    }

    fn lex_with_leading_right_angle_bracket(&mut self) -> Token {
        if self.source.next_is('=') {
            self.source.discard();
            Token::GreaterThanOrEqual
        } else {
            Token::RightAngleBracket
        }
    }

    fn lex_with_leading_ampersand(&mut self) -> TokenResult {
        if self.source.next_is('&') {
            self.source.discard();
            Ok(Token::And)
        } else {
            self.fail("`&` is only valid as part of `&&`")
        }
    }

    fn lex_with_leading_vertical_bar(&mut self) -> TokenResult {
        if self.source.next_is('|') {
            self.source.discard();
            Ok(Token::Or)
        } else {
            Ok(Token::Pipe)
        }
    }

    fn lex_with_leading_plus(&mut self) -> Token {
        if self.source.next_is('=') {
            self.source.discard();
            Token::AddAssign
        } else {
            Token::Add
        }
    }

    fn lex_with_leading_star(&mut self) -> Token {
        if self.source.next_is('=') {
            self.source.discard();
            Token::MultiplyAssign
        } else {
            Token::Multiply
        }
    }

    fn lex_with_leading_slash(&mut self) -> Token {
        if self.source.next_is('=') {
            self.source.discard();
            Token::DivideAssign
        } else {
            Token::Divide
        }
    }

    fn lex_symbolic(&mut self) -> TokenResult {
        match self.source.read() {
            Some(c) => match c {
                '!' => Ok(self.lex_with_leading_exclamation_mark()),
                '>' => Ok(self.lex_with_leading_right_angle_bracket()),
                '.' => Ok(self.lex_with_leading_dot()),
                '<' => Ok(self.lex_with_leading_left_angle_bracket()),
                '=' => Ok(self.lex_with_leading_equals()),
                '|' => self.lex_with_leading_vertical_bar(),
                '&' => self.lex_with_leading_ampersand(),
                ',' => Ok(Token::Comma),
                ':' => Ok(Token::Colon),
                '+' => Ok(self.lex_with_leading_plus()),
                '-' => Ok(self.lex_with_leading_minus()),
                '*' => Ok(self.lex_with_leading_star()),
                '/' => Ok(self.lex_with_leading_slash()),
                '%' => Ok(Token::Modulo),
                '{' => Ok(Token::OpenBrace),
                '}' => Ok(Token::CloseBrace),
                '(' => Ok(Token::OpenParentheses),
                ')' => Ok(Token::CloseParentheses),
                '[' => Ok(Token::OpenSquareBracket),
                ']' => Ok(Token::CloseSquareBracket),
                unknown => self.fail(format!("unknown operator: {}", unknown)),
            },
            None => self.fail("file ended before an operator could be read"),
        }
    }

    fn lex_non_trivia(&mut self) -> TokenResult {
        match self.source.peek().cloned() {
            None => Ok(Token::Eof),
            Some('"') => self.lex_string(),
            Some('\'') => self.lex_char(),
            Some(c) if (c == '_') && !self.source.match_nth(1, |c| c.is_alphanumeric() || *c == '_') => {
                self.source.discard();
                Ok(Token::Placeholder)
            }
            Some(c) if c.is_alphabetic() || c == '_' => {
                let mut word = String::new();
                self.lex_rest_of_word(&mut word);
                Ok(self.lex_boolean_or_keyword_or_identifier(word))
            }
            Some(c) if c.is_ascii_digit() => self.lex_number(),
            Some(_) => self.lex_symbolic(),
        }
    }

    pub fn lex_next(&mut self) -> LexedTokenResult {
        let trivia = self.lex_trivia()?;
        let position = self.source.position;
        self.lex_non_trivia().map(|token| LexedToken { token, position, trivia })
    }

    /// Start lexing from the top of the source, returning a task running
    /// concurrently on another thread and feeding tokens through a channel
    /// as it goes.
    pub fn lex(mut self) -> io::Result<LexerTask> {
        let (tx, rx) = channel();
        let thread = thread::Builder::new().name(LEXER_THREAD_NAME.to_string());

        let handle = thread.spawn(move || loop {
            match self.lex_next() {
                Ok(token) => {
                    let is_eof = token.token == Token::Eof;
                    tx.send(token.clone()).map_err(|err| self.send_error(&token, &err))?;
                    if is_eof {
                        break Ok(());
                    }
                }
                Err(e) => break Err(e),
            }
        });

        handle.map(|h| LexerTask {
            tokens: rx,
            lexer_handle: h,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::common::multiphase::Identifier;

    use super::*;

    fn test_lexer(s: &str) -> Lexer {
        let source_chars = s.chars().collect::<Vec<char>>();
        Lexer::from(Source::from(source_chars))
    }

    fn assert_next(lexer: &mut Lexer, token: &Token) {
        match lexer.lex_next() {
            Ok(LexedToken { token: t, .. }) => assert_eq!(t, *token),
            Err(e) => panic!("{:?}", e),
        }
    }

    #[test]
    fn empty() {
        let mut lexer = test_lexer("    \t  \n      ");
        assert_next(&mut lexer, &Token::Eof);
    }

    #[test]
    fn identifiers_and_placeholder() {
        let mut lexer = test_lexer("  foobar324  \t  \r      _  abc");
        assert_next(&mut lexer, &Token::Identifier(Identifier::from("foobar324")));
        assert_next(&mut lexer, &Token::Placeholder);
        assert_next(&mut lexer, &Token::Identifier(Identifier::from("abc")));
    }

    #[test]
    fn keywords() {
        let mut lexer = test_lexer("class interface enum match fun process message defer");
        assert_next(&mut lexer, &Token::Class);
        assert_next(&mut lexer, &Token::Interface);
        assert_next(&mut lexer, &Token::Enum);
        assert_next(&mut lexer, &Token::Match);
        assert_next(&mut lexer, &Token::Fun);
        assert_next(&mut lexer, &Token::Process);
        assert_next(&mut lexer, &Token::Message);
        assert_next(&mut lexer, &Token::Defer);
    }

    #[test]
    fn numbers() {
        let mut lexer = test_lexer("  23   0.5  123123123");
        assert_next(&mut lexer, &Token::Literal(Literal::Int(23)));
        assert_next(&mut lexer, &Token::Literal(Literal::Float(0.5)));
        assert_next(&mut lexer, &Token::Literal(Literal::Int(123_123_123)));
    }

    #[test]
    fn chars_and_strings() {
        let mut lexer = test_lexer(r#"  'a' '\n' "hello\tworld" "#);
        assert_next(&mut lexer, &Token::Literal(Literal::Char('a')));
        assert_next(&mut lexer, &Token::Literal(Literal::Char('\n')));
        assert_next(&mut lexer, &Token::Literal(Literal::String(LumenString::from("hello\tworld"))));
    }

    #[test]
    fn operators() {
        let mut lexer = test_lexer("   <= >= == != && || += -= *= /= -> | ..  ");
        assert_next(&mut lexer, &Token::LessThanOrEqual);
        assert_next(&mut lexer, &Token::GreaterThanOrEqual);
        assert_next(&mut lexer, &Token::Equal);
        assert_next(&mut lexer, &Token::NotEqual);
        assert_next(&mut lexer, &Token::And);
        assert_next(&mut lexer, &Token::Or);
        assert_next(&mut lexer, &Token::AddAssign);
        assert_next(&mut lexer, &Token::SubtractAssign);
        assert_next(&mut lexer, &Token::MultiplyAssign);
        assert_next(&mut lexer, &Token::DivideAssign);
        assert_next(&mut lexer, &Token::Arrow);
        assert_next(&mut lexer, &Token::Pipe);
        assert_next(&mut lexer, &Token::DotDot);
    }

    #[test]
    fn comments_are_trivia() {
        let mut lexer = test_lexer("      //    //  abc   \n /* nested /* comment */ */ true");
        assert_next(&mut lexer, &Token::Literal(Literal::Bool(true)));
    }

    #[test]
    fn generic_angle_brackets() {
        let mut lexer = test_lexer("List<int>");
        assert_next(&mut lexer, &Token::Identifier(Identifier::from("List")));
        assert_next(&mut lexer, &Token::LeftAngleBracket);
        assert_next(&mut lexer, &Token::Identifier(Identifier::from("int")));
        assert_next(&mut lexer, &Token::RightAngleBracket);
    }
}
