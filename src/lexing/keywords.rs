//! Reserved words the lexer returns as their own token rather than as a
//! plain `Identifier`.

use std::collections::HashMap;

use crate::lexing::tokens::Token;

pub fn new() -> HashMap<&'static str, Token> {
    let mut map = HashMap::new();
    map.extend(vec![
        ("class", Token::Class),
        ("interface", Token::Interface),
        ("enum", Token::Enum),
        ("process", Token::Process),
        ("message", Token::Message),
        ("fun", Token::Fun),
        ("match", Token::Match),
        ("if", Token::If),
        ("else", Token::Else),
        ("for", Token::For),
        ("while", Token::While),
        ("break", Token::Break),
        ("continue", Token::Continue),
        ("return", Token::Return),
        ("defer", Token::Defer),
        ("new", Token::New),
        ("var", Token::Var),
        ("this", Token::This),
        ("base", Token::Base),
    ]);
    map
}
