//! # Parsing
//!
//! Recursive descent straight from a drained token stream into
//! `ast::definitions`/`ast::statements`/`ast::expressions`/
//! `patterns::PatternNode`: there is no intermediate concrete syntax tree.
//!
//! Unlike the lexer, the parser does not operate directly over the
//! channel-backed `Tokens` buffer. A top-level class can be referenced by
//! name before its own declaration is reached (a field of type `List`
//! inside `List` itself, or two classes naming each other as bases), and
//! `Tokens`'s fixed five-token lookahead cannot support the arbitrary
//! lookahead that forward reference needs. So `Parser::drain` reads the
//! whole stream up front into a `Vec` and parses by indexing into it,
//! trading the lexer's streaming property for unlimited backtracking.
//!
//! `Parser` owns the definition arena directly (`definitions: Vec<Definition>`)
//! rather than building a separate pre-arena tree: every `ClassDefinition`,
//! `MethodDefinition`, and `DataMemberDefinition` needs a `DefinitionId` the
//! moment it's created (`enclosing`/`enclosing_class` are not optional on
//! most of them), so the arena has to exist while parsing, not after it. A
//! first pass over the drained tokens allocates a placeholder
//! `ClassDefinition` for every top-level `class`/`interface`/`enum`/
//! `process`/`message` name before any bodies are parsed, exactly the
//! forward-declaration trick generic self-reference already needs; a second
//! pass fills each one in. Everything a class body's members point at
//! outside that class (field types, base names, parameter types) is left as
//! an unresolved `Type::named`/`unresolved_parents` entry for the pass
//! driver to bind later.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::ast::definitions::{
    ClassDefinition, ClassProperties, DataMemberDefinition, Definition, GenericTypeParameterDefinition, MethodDefinition,
};
use crate::ast::expressions::{
    AnonymousFunction, ArrayAllocation, BinaryOperator, Expression, HeapAllocation, Lambda, Literal as ExprLiteral, Match, MatchCase, MethodCall, Subscript,
    UnaryOperator,
};
use crate::ast::statements::{Block, DeferStatement, ForStatement, IfStatement, Statement, VariableDeclaration, VariableDeclarationKind, WhileStatement};
use crate::common::multiphase::Identifier;
use crate::common::peekable_buffer::PeekableBuffer;
use crate::diagnostics::SourceLocation;
use crate::lexing::lexer::{Error as LexerError, LexedToken, LexerTaskError};
use crate::lexing::tokens::{Literal as TokenLiteral, Token};
use crate::lexing::Tokens;
use crate::model::bindings::NameBindings;
use crate::model::ids::{DefinitionId, LocalId};
use crate::model::types::{BuiltInKind, FunctionSignature, Type};
use crate::patterns::PatternNode;

#[derive(Debug)]
pub enum ParserErrorDescription {
    Expected(Token),
    Unexpected(Token),
    PrematureEof,
    Described(String),
}

impl fmt::Display for ParserErrorDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParserErrorDescription::Expected(token) => write!(f, "expected {:?}", token),
            ParserErrorDescription::Unexpected(token) => write!(f, "unexpected {:?}", token),
            ParserErrorDescription::PrematureEof => write!(f, "unexpected end of file"),
            ParserErrorDescription::Described(message) => write!(f, "{}", message),
        }
    }
}

#[derive(Debug)]
pub struct ParserError {
    pub location: SourceLocation,
    pub description: ParserErrorDescription,
}

impl fmt::Display for ParserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.description)
    }
}

#[derive(Debug)]
pub enum Error {
    Lexer(LexerError),
    Parser(ParserError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Lexer(err) => write!(f, "{:?}", err),
            Error::Parser(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for Error {}

impl From<LexerTaskError> for Error {
    fn from(err: LexerTaskError) -> Self {
        match err {
            LexerTaskError::Lexer(lexer_error) => Error::Lexer(lexer_error),
            LexerTaskError::Task(_) => Error::Parser(ParserError {
                location: SourceLocation::generated(),
                description: ParserErrorDescription::Described("the lexer thread panicked".to_string()),
            }),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Everything a file contributes: its arena of definitions and the ids of
/// the top-level ones, in source order.
pub struct ParsedModule {
    pub definitions: Vec<Definition>,
    pub top_level: Vec<DefinitionId>,
    /// How many `LocalId`s this module's bodies already allocated, so a
    /// caller merging it into a larger arena can keep handing out locals
    /// starting past this point instead of colliding with them.
    pub local_count: usize,
}

/// Parses one source file's worth of tokens into a [`ParsedModule`].
/// Joining several files' arenas together is the pass driver's job, not
/// this one's.
pub fn parse(tokens: Tokens, file: impl Into<Arc<str>>) -> Result<ParsedModule> {
    let mut parser = Parser::drain(tokens, file.into())?;
    parser.prescan_top_level();

    let mut top_level = Vec::new();
    while !parser.next_is(Token::Eof) {
        top_level.push(parser.parse_top_level_definition()?);
    }

    Ok(ParsedModule {
        definitions: parser.definitions,
        top_level,
        local_count: parser.next_local,
    })
}

struct Parser {
    tokens: Vec<LexedToken>,
    pos: usize,
    file: Arc<str>,
    definitions: Vec<Definition>,
    next_local: usize,
    top_level_names: HashMap<Identifier, DefinitionId>,
}

impl Parser {
    fn drain(tokens: Tokens, file: Arc<str>) -> Result<Self> {
        let mut tokens = tokens;
        let mut drained = Vec::new();
        while let Some(lexed) = tokens.read() {
            let is_eof = lexed.token == Token::Eof;
            drained.push(lexed);
            if is_eof {
                break;
            }
        }
        tokens.join_lexer_thread()?;

        Ok(Self {
            tokens: drained,
            pos: 0,
            file,
            definitions: Vec::new(),
            next_local: 0,
            top_level_names: HashMap::new(),
        })
    }

    // -- token access --------------------------------------------------

    fn peek_token(&self) -> Token {
        self.tokens.get(self.pos).map(|lexed| lexed.token.clone()).unwrap_or(Token::Eof)
    }

    fn peek_nth_token(&self, n: usize) -> Token {
        self.tokens.get(self.pos + n).map(|lexed| lexed.token.clone()).unwrap_or(Token::Eof)
    }

    fn next_is(&self, token: Token) -> bool {
        self.peek_token() == token
    }

    fn next_is_identifier(&self) -> bool {
        matches!(self.peek_token(), Token::Identifier(_))
    }

    fn advance(&mut self) -> Token {
        let token = self.peek_token();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn location(&self) -> SourceLocation {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|lexed| lexed.position.to_location(&self.file))
            .unwrap_or_else(SourceLocation::generated)
    }

    fn fail<T>(&self, message: impl Into<String>) -> Result<T> {
        Err(Error::Parser(ParserError {
            location: self.location(),
            description: ParserErrorDescription::Described(message.into()),
        }))
    }

    fn expected<T>(&self, token: Token) -> Result<T> {
        Err(Error::Parser(ParserError {
            location: self.location(),
            description: ParserErrorDescription::Expected(token),
        }))
    }

    fn unexpected<T>(&self) -> Result<T> {
        Err(Error::Parser(ParserError {
            location: self.location(),
            description: ParserErrorDescription::Unexpected(self.peek_token()),
        }))
    }

    fn premature_eof<T>(&self) -> Result<T> {
        Err(Error::Parser(ParserError {
            location: self.location(),
            description: ParserErrorDescription::PrematureEof,
        }))
    }

    fn expect_and_discard(&mut self, token: Token) -> Result<()> {
        if self.peek_token() == Token::Eof && token != Token::Eof {
            return self.premature_eof();
        }
        if self.next_is(token.clone()) {
            self.advance();
            Ok(())
        } else {
            self.expected(token)
        }
    }

    fn expect_and_read(&mut self) -> Result<Token> {
        if self.peek_token() == Token::Eof {
            self.premature_eof()
        } else {
            Ok(self.advance())
        }
    }

    fn read_identifier(&mut self) -> Result<Identifier> {
        match self.expect_and_read()? {
            Token::Identifier(name) => Ok(name),
            _ => self.unexpected(),
        }
    }

    // -- arena ------------------------------------------------------------

    fn alloc_definition(&mut self, definition: Definition) -> DefinitionId {
        let id = DefinitionId(self.definitions.len());
        self.definitions.push(definition);
        id
    }

    fn alloc_local(&mut self) -> LocalId {
        let id = LocalId(self.next_local);
        self.next_local += 1;
        id
    }

    fn class_mut(&mut self, id: DefinitionId) -> &mut ClassDefinition {
        self.definitions[id.index()]
            .as_class_mut()
            .expect("top-level definition slot is a class placeholder")
    }

    /// Registers a forward-declared placeholder for every top-level
    /// `class`/`interface`/`enum`/`process`/`message` name, walking brace
    /// depth so nested braces inside a body don't get mistaken for another
    /// top-level header.
    fn prescan_top_level(&mut self) {
        let mut depth: i32 = 0;
        for i in 0..self.tokens.len() {
            let token = self.tokens[i].token.clone();
            if depth == 0 && matches!(token, Token::Class | Token::Interface | Token::Enum | Token::Process | Token::Message) {
                if let Some(LexedToken { token: Token::Identifier(name), position, .. }) = self.tokens.get(i + 1).cloned() {
                    let location = position.to_location(&self.file);
                    let id = self.alloc_definition(Definition::Class(ClassDefinition::new(name.clone(), location, None)));
                    self.top_level_names.insert(name, id);
                }
            }
            match token {
                Token::OpenBrace => depth += 1,
                Token::CloseBrace => depth -= 1,
                _ => {}
            }
        }
    }

    // -- top level ----------------------------------------------------

    fn parse_top_level_definition(&mut self) -> Result<DefinitionId> {
        let kind = self.expect_and_read()?;
        let mut properties = ClassProperties::default();
        match kind {
            Token::Class => {}
            Token::Interface => properties.is_interface = true,
            Token::Enum => properties.is_enumeration = true,
            Token::Process => properties.is_process = true,
            Token::Message => properties.is_message = true,
            _ => return self.unexpected(),
        }

        let name = self.read_identifier()?;
        let id = *self.top_level_names.get(&name).ok_or_else(|| {
            Error::Parser(ParserError {
                location: self.location(),
                description: ParserErrorDescription::Described(format!("no forward-declared slot for `{}`", name)),
            })
        })?;

        let is_enumeration = properties.is_enumeration;
        self.class_mut(id).properties = properties;

        self.parse_class_header(id)?;
        if is_enumeration {
            self.parse_enum_body(id)?;
        } else {
            self.parse_class_body(id)?;
        }
        Ok(id)
    }

    /// Generic parameters, an optional primary constructor parameter list,
    /// and an optional `:`-introduced parent list. Shared by classes,
    /// interfaces, and enums, since all three can carry any of the three.
    fn parse_class_header(&mut self, class_id: DefinitionId) -> Result<()> {
        if self.next_is(Token::LeftAngleBracket) {
            self.advance();
            loop {
                let location = self.location();
                let name = self.read_identifier()?;
                let param_id = self.alloc_definition(Definition::GenericTypeParameter(GenericTypeParameterDefinition::new(
                    name,
                    location,
                    Some(class_id),
                )));
                self.class_mut(class_id).generic_type_parameters.push(param_id);
                if self.next_is(Token::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
            self.expect_and_discard(Token::RightAngleBracket)?;
        }

        if self.next_is(Token::OpenParentheses) {
            self.advance();
            let mut ctor_arguments = Vec::new();
            if !self.next_is(Token::CloseParentheses) {
                loop {
                    let location = self.location();
                    let is_stored = self.next_is(Token::Var);
                    if is_stored {
                        self.advance();
                    }
                    let name = self.read_identifier()?;
                    self.expect_and_discard(Token::Colon)?;
                    let declared_type = self.parse_type()?;

                    let mut member = DataMemberDefinition::new(name, location, class_id, declared_type);
                    member.is_primary_ctor_argument = true;
                    let member_id = self.alloc_definition(Definition::DataMember(member));
                    if is_stored {
                        self.class_mut(class_id).add_primary_ctor_arg_data_member(member_id);
                    }
                    ctor_arguments.push(member_id);

                    if self.next_is(Token::Comma) {
                        self.advance();
                    } else {
                        break;
                    }
                }
            }
            self.expect_and_discard(Token::CloseParentheses)?;

            let class_name = self.definitions[class_id.index()].name().clone();
            let location = self.definitions[class_id.index()].location().clone();
            let mut constructor = MethodDefinition::new(
                MethodDefinition::constructor_name(&class_name),
                location,
                class_id,
                Type::built_in(BuiltInKind::Void),
            );
            constructor.is_constructor = true;
            constructor.is_primary_constructor = true;
            constructor.arguments = ctor_arguments;
            // A primary constructor's `var` parameters already *are* the
            // stored fields; there is nothing left to assign in its body.
            constructor.body = Some(Block::new(NameBindings::new()));
            let constructor_id = self.alloc_definition(Definition::Method(constructor));

            let class = self.class_mut(class_id);
            class.add_method(constructor_id);
            class.has_constructor = true;
        }

        if self.next_is(Token::Colon) {
            self.advance();
            loop {
                let parent_name = self.read_identifier()?;
                if self.next_is(Token::LeftAngleBracket) {
                    self.skip_balanced_angle_brackets()?;
                }
                self.class_mut(class_id).unresolved_parents.push(parent_name);
                if self.next_is(Token::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }

        Ok(())
    }

    fn skip_balanced_angle_brackets(&mut self) -> Result<()> {
        self.expect_and_discard(Token::LeftAngleBracket)?;
        let mut depth = 1;
        while depth > 0 {
            match self.peek_token() {
                Token::LeftAngleBracket => {
                    depth += 1;
                    self.advance();
                }
                Token::RightAngleBracket => {
                    depth -= 1;
                    self.advance();
                }
                Token::Eof => return self.premature_eof(),
                _ => {
                    self.advance();
                }
            }
        }
        Ok(())
    }

    fn parse_class_body(&mut self, class_id: DefinitionId) -> Result<()> {
        self.expect_and_discard(Token::OpenBrace)?;
        while !self.next_is(Token::CloseBrace) {
            if self.next_is(Token::Fun) {
                self.parse_method(class_id)?;
            } else {
                self.parse_data_member(class_id)?;
            }
        }
        self.expect_and_discard(Token::CloseBrace)?;
        Ok(())
    }

    fn parse_data_member(&mut self, class_id: DefinitionId) -> Result<()> {
        let location = self.location();
        let declared_type = self.parse_type()?;
        let name = self.read_identifier()?;

        let mut member = DataMemberDefinition::new(name, location, class_id, declared_type);
        if self.next_is(Token::Assign) {
            self.advance();
            member.initializer = Some(self.parse_expression()?);
        }
        let member_id = self.alloc_definition(Definition::DataMember(member));
        self.class_mut(class_id).add_data_member(member_id);
        Ok(())
    }

    /// `enum Shape { Square(int), Rectangle(int,int), Circle(int), Point }`:
    /// each comma-separated variant becomes a static constructor method on
    /// the enum's class, its field list becoming that method's arguments.
    /// The tag/parallel-class machinery a variant lowers to is built later,
    /// by the enum generator, from exactly this shape.
    fn parse_enum_body(&mut self, class_id: DefinitionId) -> Result<()> {
        self.expect_and_discard(Token::OpenBrace)?;
        let class_name = self.definitions[class_id.index()].name().clone();

        while !self.next_is(Token::CloseBrace) {
            let variant_location = self.location();
            let variant_name = self.read_identifier()?;

            let mut field_types = Vec::new();
            if self.next_is(Token::OpenParentheses) {
                self.advance();
                if !self.next_is(Token::CloseParentheses) {
                    loop {
                        field_types.push(self.parse_type()?);
                        if self.next_is(Token::Comma) {
                            self.advance();
                        } else {
                            break;
                        }
                    }
                }
                self.expect_and_discard(Token::CloseParentheses)?;
            }

            let mut arguments = Vec::new();
            for (index, field_type) in field_types.into_iter().enumerate() {
                let argument_id = self.alloc_definition(Definition::DataMember(DataMemberDefinition::new(
                    Identifier::from(format!("${}", index)),
                    variant_location.clone(),
                    class_id,
                    field_type,
                )));
                arguments.push(argument_id);
            }

            let mut constructor = MethodDefinition::new(variant_name, variant_location, class_id, Type::named(class_name.clone()));
            constructor.is_static = true;
            constructor.is_enum_constructor = true;
            constructor.arguments = arguments;
            let constructor_id = self.alloc_definition(Definition::Method(constructor));
            self.class_mut(class_id).add_method(constructor_id);

            if self.next_is(Token::Comma) {
                self.advance();
            } else {
                break;
            }
        }

        self.expect_and_discard(Token::CloseBrace)?;
        Ok(())
    }

    /// `fun [ReturnType[(ArgTypes)]] name(args) [= expr | { block }]`.
    ///
    /// A return type followed immediately by `(` is ambiguous between "the
    /// method takes no declared return type and this is its name, followed
    /// by its own parameter list" and "the declared return type is itself a
    /// function type, written `Type(ArgTypes)`, with the real name and
    /// parameter list still to come". `parse_method_return_type_and_name`
    /// resolves it by looking past the matching `)` for a second `name(`.
    fn parse_method(&mut self, class_id: DefinitionId) -> Result<()> {
        let location = self.location();
        self.expect_and_discard(Token::Fun)?;
        let (return_type, name) = self.parse_method_return_type_and_name()?;

        self.expect_and_discard(Token::OpenParentheses)?;
        let mut arguments = Vec::new();
        if !self.next_is(Token::CloseParentheses) {
            loop {
                let arg_location = self.location();
                let arg_type = self.parse_type()?;
                let arg_name = self.read_identifier()?;
                let arg_id = self.alloc_definition(Definition::DataMember(DataMemberDefinition::new(
                    arg_name,
                    arg_location,
                    class_id,
                    arg_type,
                )));
                arguments.push(arg_id);
                if self.next_is(Token::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect_and_discard(Token::CloseParentheses)?;

        let mut method = MethodDefinition::new(name, location, class_id, return_type);
        method.arguments = arguments;

        if self.next_is(Token::Assign) {
            self.advance();
            let expr = self.parse_expression()?;
            method.body = Some(Self::wrap_expression_as_return_block(expr));
        } else if self.next_is(Token::OpenBrace) {
            method.body = Some(self.parse_block()?);
        }
        // Neither `=` nor `{`: an abstract interface method, left bodyless.

        let method_id = self.alloc_definition(Definition::Method(method));
        self.class_mut(class_id).add_method(method_id);
        Ok(())
    }

    fn parse_method_return_type_and_name(&mut self) -> Result<(Type, Identifier)> {
        let return_type_candidate = self.parse_type()?;

        if self.next_is(Token::OpenParentheses) {
            let open_index = self.pos;
            if let Some(close_index) = self.matching_close_parenthesis(open_index) {
                let after = self.tokens.get(close_index + 1).map(|lexed| lexed.token.clone());
                let after_after = self.tokens.get(close_index + 2).map(|lexed| lexed.token.clone());
                if matches!(after, Some(Token::Identifier(_))) && matches!(after_after, Some(Token::OpenParentheses)) {
                    self.advance();
                    let mut argument_types = Vec::new();
                    if !self.next_is(Token::CloseParentheses) {
                        loop {
                            argument_types.push(self.parse_type()?);
                            if self.next_is(Token::Comma) {
                                self.advance();
                            } else {
                                break;
                            }
                        }
                    }
                    self.expect_and_discard(Token::CloseParentheses)?;
                    let name = self.read_identifier()?;
                    let signature = FunctionSignature::new(return_type_candidate, argument_types);
                    let return_type = Type::built_in(BuiltInKind::Function).with_function_signature(signature);
                    return Ok((return_type, name));
                }
            }
            // No lambda signature after all: `return_type_candidate` was a
            // bare identifier standing in for the method's own name.
            let name = Identifier::from(return_type_candidate.name().to_string());
            return Ok((Type::built_in(BuiltInKind::Void), name));
        }

        let name = self.read_identifier()?;
        Ok((return_type_candidate, name))
    }

    fn matching_close_parenthesis(&self, open_index: usize) -> Option<usize> {
        let mut depth = 0i32;
        for i in open_index..self.tokens.len() {
            match self.tokens[i].token {
                Token::OpenParentheses => depth += 1,
                Token::CloseParentheses => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            }
        }
        None
    }

    fn wrap_expression_as_return_block(expr: Expression) -> Block {
        let mut block = Block::new(NameBindings::new());
        block.add_statement(Statement::Return(Some(expr)));
        block
    }

    fn parse_type(&mut self) -> Result<Type> {
        let name = self.read_identifier()?;
        let mut declared_type = Type::named(name);

        if self.next_is(Token::LeftAngleBracket) {
            self.advance();
            let mut arguments = Vec::new();
            if !self.next_is(Token::RightAngleBracket) {
                loop {
                    arguments.push(self.parse_type()?);
                    if self.next_is(Token::Comma) {
                        self.advance();
                    } else {
                        break;
                    }
                }
            }
            self.expect_and_discard(Token::RightAngleBracket)?;
            declared_type = declared_type.with_generic_type_arguments(arguments);
        }

        if self.next_is(Token::OpenSquareBracket) {
            self.advance();
            self.expect_and_discard(Token::CloseSquareBracket)?;
            declared_type = declared_type.with_array(true);
        }

        Ok(declared_type)
    }

    // -- statements -----------------------------------------------------

    fn parse_block(&mut self) -> Result<Block> {
        self.expect_and_discard(Token::OpenBrace)?;
        let mut block = Block::new(NameBindings::new());
        while !self.next_is(Token::CloseBrace) {
            block.add_statement(self.parse_statement()?);
        }
        self.expect_and_discard(Token::CloseBrace)?;
        Ok(block)
    }

    fn parse_statement(&mut self) -> Result<Statement> {
        match self.peek_token() {
            Token::OpenBrace => Ok(Statement::Block(self.parse_block()?)),
            Token::Var => self.parse_var_declaration(),
            Token::If => self.parse_if(),
            Token::While => self.parse_while(),
            Token::For => self.parse_for(),
            Token::Return => {
                self.advance();
                if self.next_is(Token::CloseBrace) {
                    Ok(Statement::Return(None))
                } else {
                    Ok(Statement::Return(Some(self.parse_expression()?)))
                }
            }
            Token::Defer => {
                self.advance();
                let body = Box::new(self.parse_statement()?);
                Ok(Statement::Defer(DeferStatement { body }))
            }
            Token::Break => {
                self.advance();
                Ok(Statement::Break)
            }
            Token::Continue => {
                self.advance();
                Ok(Statement::Continue)
            }
            Token::Eof => self.premature_eof(),
            _ => Ok(Statement::Expression(self.parse_expression()?)),
        }
    }

    fn parse_var_declaration(&mut self) -> Result<Statement> {
        self.expect_and_discard(Token::Var)?;
        let name = self.read_identifier()?;

        let kind = if self.next_is(Token::Colon) {
            self.advance();
            VariableDeclarationKind::Typed(self.parse_type()?)
        } else {
            VariableDeclarationKind::Implicit
        };

        let initializer = if self.next_is(Token::Assign) {
            self.advance();
            Some(self.parse_expression()?)
        } else {
            None
        };

        let local = self.alloc_local();
        Ok(Statement::VarDeclaration(VariableDeclaration {
            local,
            name,
            kind,
            initializer,
            constant: false,
            resolved_type: None,
        }))
    }

    fn parse_if(&mut self) -> Result<Statement> {
        self.expect_and_discard(Token::If)?;
        let condition = self.parse_expression()?;
        let then_branch = Box::new(self.parse_statement()?);
        let else_branch = if self.next_is(Token::Else) {
            self.advance();
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(Statement::If(IfStatement {
            condition,
            then_branch,
            else_branch,
        }))
    }

    fn parse_while(&mut self) -> Result<Statement> {
        self.expect_and_discard(Token::While)?;
        let condition = self.parse_expression()?;
        let body = Box::new(self.parse_statement()?);
        Ok(Statement::While(WhileStatement {
            condition,
            body,
            never_falls_through: false,
        }))
    }

    /// `for x: xs { ... }`. There is no `in` keyword; the loop variable and
    /// the iterable are separated with `:`, the same token a primary
    /// constructor parameter uses between its name and its type.
    fn parse_for(&mut self) -> Result<Statement> {
        self.expect_and_discard(Token::For)?;
        let name = self.read_identifier()?;
        self.expect_and_discard(Token::Colon)?;
        let iterable = self.parse_expression()?;
        let local = self.alloc_local();

        let mut body = self.parse_statement()?;
        if let Statement::Block(block) = &mut body {
            block.bindings.insert_local_object(name, local);
        }

        Ok(Statement::For(ForStatement {
            variable: local,
            iterable,
            body: Box::new(body),
        }))
    }

    // -- expressions ------------------------------------------------------

    fn parse_expression(&mut self) -> Result<Expression> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<Expression> {
        let left = self.parse_or()?;
        let operator = match self.peek_token() {
            Token::Assign => BinaryOperator::Assign,
            Token::AddAssign => BinaryOperator::AddAssign,
            Token::SubtractAssign => BinaryOperator::SubtractAssign,
            Token::MultiplyAssign => BinaryOperator::MultiplyAssign,
            Token::DivideAssign => BinaryOperator::DivideAssign,
            _ => return Ok(left),
        };
        self.advance();
        let right = self.parse_assignment()?;
        Ok(Expression::Binary {
            operator,
            left: Box::new(left),
            right: Box::new(right),
            result_type: None,
        })
    }

    fn parse_or(&mut self) -> Result<Expression> {
        let mut left = self.parse_and()?;
        while self.next_is(Token::Or) {
            self.advance();
            let right = self.parse_and()?;
            left = Self::binary(BinaryOperator::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expression> {
        let mut left = self.parse_equality()?;
        while self.next_is(Token::And) {
            self.advance();
            let right = self.parse_equality()?;
            left = Self::binary(BinaryOperator::And, left, right);
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expression> {
        let mut left = self.parse_relational()?;
        loop {
            let operator = match self.peek_token() {
                Token::Equal => BinaryOperator::Equal,
                Token::NotEqual => BinaryOperator::NotEqual,
                _ => break,
            };
            self.advance();
            let right = self.parse_relational()?;
            left = Self::binary(operator, left, right);
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> Result<Expression> {
        let mut left = self.parse_range()?;
        loop {
            let operator = match self.peek_token() {
                Token::LeftAngleBracket => BinaryOperator::LessThan,
                Token::LessThanOrEqual => BinaryOperator::LessThanOrEqual,
                Token::RightAngleBracket => BinaryOperator::GreaterThan,
                Token::GreaterThanOrEqual => BinaryOperator::GreaterThanOrEqual,
                _ => break,
            };
            self.advance();
            let right = self.parse_range()?;
            left = Self::binary(operator, left, right);
        }
        Ok(left)
    }

    fn parse_range(&mut self) -> Result<Expression> {
        let left = self.parse_additive()?;
        if self.next_is(Token::DotDot) {
            self.advance();
            let right = self.parse_additive()?;
            Ok(Self::binary(BinaryOperator::Range, left, right))
        } else {
            Ok(left)
        }
    }

    fn parse_additive(&mut self) -> Result<Expression> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let operator = match self.peek_token() {
                Token::Add => BinaryOperator::Add,
                Token::Subtract => BinaryOperator::Subtract,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Self::binary(operator, left, right);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expression> {
        let mut left = self.parse_unary()?;
        loop {
            let operator = match self.peek_token() {
                Token::Multiply => BinaryOperator::Multiply,
                Token::Divide => BinaryOperator::Divide,
                Token::Modulo => BinaryOperator::Modulo,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Self::binary(operator, left, right);
        }
        Ok(left)
    }

    fn binary(operator: BinaryOperator, left: Expression, right: Expression) -> Expression {
        Expression::Binary {
            operator,
            left: Box::new(left),
            right: Box::new(right),
            result_type: None,
        }
    }

    fn parse_unary(&mut self) -> Result<Expression> {
        let operator = match self.peek_token() {
            Token::Subtract => UnaryOperator::Negate,
            Token::Not => UnaryOperator::Not,
            _ => return self.parse_postfix(),
        };
        self.advance();
        let operand = Box::new(self.parse_unary()?);
        Ok(Expression::Unary {
            operator,
            operand,
            result_type: None,
        })
    }

    fn parse_postfix(&mut self) -> Result<Expression> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek_token() {
                Token::Dot => {
                    self.advance();
                    let name = self.read_identifier()?;
                    if self.next_is(Token::OpenParentheses) {
                        let mut arguments = self.parse_call_arguments()?;
                        self.maybe_attach_trailing_lambda(&mut arguments)?;
                        expr = Expression::MethodCall(MethodCall {
                            receiver: Some(Box::new(expr)),
                            name,
                            arguments,
                            resolved_method: None,
                            result_type: None,
                        });
                    } else if self.looks_like_trailing_lambda() {
                        let lambda = self.parse_lambda()?;
                        expr = Expression::MethodCall(MethodCall {
                            receiver: Some(Box::new(expr)),
                            name,
                            arguments: vec![lambda],
                            resolved_method: None,
                            result_type: None,
                        });
                    } else {
                        expr = Expression::MemberSelector {
                            object: Box::new(expr),
                            member: Box::new(Expression::Name(name)),
                        };
                    }
                }
                Token::OpenSquareBracket => {
                    self.advance();
                    let index = self.parse_expression()?;
                    self.expect_and_discard(Token::CloseSquareBracket)?;
                    expr = Expression::Subscript(Subscript {
                        array: Box::new(expr),
                        index: Box::new(index),
                        element_type: None,
                    });
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_call_arguments(&mut self) -> Result<Vec<Expression>> {
        self.expect_and_discard(Token::OpenParentheses)?;
        let mut arguments = Vec::new();
        if !self.next_is(Token::CloseParentheses) {
            loop {
                arguments.push(self.parse_expression()?);
                if self.next_is(Token::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect_and_discard(Token::CloseParentheses)?;
        Ok(arguments)
    }

    /// `xs.each |x| { sum += x }`: a call with no parentheses at all, its
    /// sole argument being the lambda written straight after the name.
    fn looks_like_trailing_lambda(&self) -> bool {
        matches!(self.peek_token(), Token::Pipe | Token::Or)
    }

    fn maybe_attach_trailing_lambda(&mut self, arguments: &mut Vec<Expression>) -> Result<()> {
        if self.looks_like_trailing_lambda() {
            arguments.push(self.parse_lambda()?);
        }
        Ok(())
    }

    /// `|params|` or `||`. A parameter may carry a leading type
    /// (`|int m|`), which is parsed and discarded: `Lambda::parameters` is
    /// names only, since the signature itself is inferred from the call
    /// site once closure conversion runs.
    fn parse_lambda_params(&mut self) -> Result<Vec<Identifier>> {
        if self.next_is(Token::Or) {
            self.advance();
            return Ok(Vec::new());
        }
        self.expect_and_discard(Token::Pipe)?;
        let mut names = Vec::new();
        if !self.next_is(Token::Pipe) {
            loop {
                let has_leading_type = self.next_is_identifier() && matches!(self.peek_nth_token(1), Token::Identifier(_));
                if has_leading_type {
                    self.advance();
                }
                names.push(self.read_identifier()?);
                if self.next_is(Token::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect_and_discard(Token::Pipe)?;
        Ok(names)
    }

    fn parse_lambda_body(&mut self) -> Result<Box<Statement>> {
        if self.next_is(Token::OpenBrace) {
            Ok(Box::new(Statement::Block(self.parse_block()?)))
        } else {
            let expr = self.parse_expression()?;
            Ok(Box::new(Statement::Return(Some(expr))))
        }
    }

    fn parse_lambda(&mut self) -> Result<Expression> {
        let parameters = self.parse_lambda_params()?;
        let body = self.parse_lambda_body()?;
        Ok(Expression::Lambda(Lambda {
            parameters,
            body,
            inferred_type: None,
        }))
    }

    /// A `{ |a, b| ... }` block appearing as a value rather than inlined at
    /// a lambda-signature call site: `fun int(int) add(int n) = { |int m| m + n }`.
    /// Shares `parse_lambda_params`/`parse_lambda_body` with `parse_lambda`,
    /// but builds an `AnonymousFunction` so closure conversion lifts it into
    /// a generated capturing class instead of inlining it.
    fn parse_anonymous_function(&mut self) -> Result<Expression> {
        let parameters = self.parse_lambda_params()?;
        let body = self.parse_lambda_body()?;
        Ok(Expression::AnonymousFunction(AnonymousFunction {
            parameters,
            body,
            inferred_type: None,
        }))
    }

    fn parse_new(&mut self) -> Result<Expression> {
        self.expect_and_discard(Token::New)?;
        let class_name = self.read_identifier()?;

        let mut generic_type_arguments = Vec::new();
        if self.next_is(Token::LeftAngleBracket) {
            self.advance();
            if !self.next_is(Token::RightAngleBracket) {
                loop {
                    generic_type_arguments.push(self.parse_type()?);
                    if self.next_is(Token::Comma) {
                        self.advance();
                    } else {
                        break;
                    }
                }
            }
            self.expect_and_discard(Token::RightAngleBracket)?;
        }

        let arguments = self.parse_call_arguments()?;
        let constructor_call = Expression::MethodCall(MethodCall {
            receiver: None,
            name: MethodDefinition::constructor_name(&class_name),
            arguments,
            resolved_method: None,
            result_type: None,
        });

        Ok(Expression::New(HeapAllocation {
            class_name,
            generic_type_arguments,
            constructor_call: Box::new(constructor_call),
            result_type: None,
        }))
    }

    fn parse_match(&mut self) -> Result<Expression> {
        self.expect_and_discard(Token::Match)?;
        let subject = Box::new(self.parse_expression()?);
        self.expect_and_discard(Token::OpenBrace)?;

        let mut cases = Vec::new();
        while !self.next_is(Token::CloseBrace) {
            let pattern = self.parse_pattern()?;
            let guard = if self.next_is(Token::If) {
                self.advance();
                Some(self.parse_expression()?)
            } else {
                None
            };
            self.expect_and_discard(Token::Arrow)?;
            let body = if self.next_is(Token::OpenBrace) {
                Box::new(Statement::Block(self.parse_block()?))
            } else {
                Box::new(Statement::Expression(self.parse_expression()?))
            };
            cases.push(MatchCase { pattern, guard, body });
            if self.next_is(Token::Comma) {
                self.advance();
            }
        }
        self.expect_and_discard(Token::CloseBrace)?;

        Ok(Expression::Match(Match {
            subject,
            cases,
            result_type: None,
        }))
    }

    fn parse_array_literal(&mut self) -> Result<Expression> {
        self.expect_and_discard(Token::OpenSquareBracket)?;
        let mut elements = Vec::new();
        if !self.next_is(Token::CloseSquareBracket) {
            loop {
                elements.push(self.parse_expression()?);
                if self.next_is(Token::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect_and_discard(Token::CloseSquareBracket)?;
        let count = elements.len() as i64;
        Ok(Expression::NewArray(ArrayAllocation {
            element_type: Type::placeholder(),
            capacity: Box::new(Expression::Literal(ExprLiteral::Int(count))),
            literal_elements: Some(elements),
        }))
    }

    fn parse_primary(&mut self) -> Result<Expression> {
        match self.peek_token() {
            Token::Literal(TokenLiteral::Bool(value)) => {
                self.advance();
                Ok(Expression::Literal(ExprLiteral::Bool(value)))
            }
            Token::Literal(TokenLiteral::Int(value)) => {
                self.advance();
                Ok(Expression::Literal(ExprLiteral::Int(value)))
            }
            Token::Literal(TokenLiteral::Float(value)) => {
                self.advance();
                Ok(Expression::Literal(ExprLiteral::Float(value)))
            }
            Token::Literal(TokenLiteral::Char(value)) => {
                self.advance();
                Ok(Expression::Literal(ExprLiteral::Char(value)))
            }
            Token::Literal(TokenLiteral::String(value)) => {
                self.advance();
                Ok(Expression::Literal(ExprLiteral::String(value)))
            }
            Token::This => {
                self.advance();
                Ok(Expression::This)
            }
            // A delegating `base(...)`/member-access constructor call is
            // out of scope here; `base` resolves like any other name.
            Token::Base => {
                self.advance();
                Ok(Expression::Name(Identifier::from("base")))
            }
            Token::New => self.parse_new(),
            Token::Match => self.parse_match(),
            Token::OpenSquareBracket => self.parse_array_literal(),
            Token::OpenParentheses => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect_and_discard(Token::CloseParentheses)?;
                Ok(expr)
            }
            Token::OpenBrace if matches!(self.peek_nth_token(1), Token::Pipe | Token::Or) => {
                self.advance();
                let anonymous_function = self.parse_anonymous_function()?;
                self.expect_and_discard(Token::CloseBrace)?;
                Ok(anonymous_function)
            }
            Token::Identifier(name) => {
                self.advance();
                if self.next_is(Token::OpenParentheses) {
                    let mut arguments = self.parse_call_arguments()?;
                    self.maybe_attach_trailing_lambda(&mut arguments)?;
                    Ok(Expression::MethodCall(MethodCall {
                        receiver: None,
                        name,
                        arguments,
                        resolved_method: None,
                        result_type: None,
                    }))
                } else {
                    Ok(Expression::Name(name))
                }
            }
            Token::Eof => self.premature_eof(),
            _ => self.unexpected(),
        }
    }

    // -- patterns -----------------------------------------------------

    fn parse_pattern(&mut self) -> Result<PatternNode> {
        match self.peek_token() {
            Token::Placeholder => {
                self.advance();
                Ok(PatternNode::Placeholder)
            }
            Token::Literal(TokenLiteral::Bool(value)) => {
                self.advance();
                Ok(PatternNode::Literal(ExprLiteral::Bool(value)))
            }
            Token::Literal(TokenLiteral::Int(value)) => {
                self.advance();
                Ok(PatternNode::Literal(ExprLiteral::Int(value)))
            }
            Token::Literal(TokenLiteral::Float(value)) => {
                self.advance();
                Ok(PatternNode::Literal(ExprLiteral::Float(value)))
            }
            Token::Literal(TokenLiteral::Char(value)) => {
                self.advance();
                Ok(PatternNode::Literal(ExprLiteral::Char(value)))
            }
            Token::Literal(TokenLiteral::String(value)) => {
                self.advance();
                Ok(PatternNode::Literal(ExprLiteral::String(value)))
            }
            Token::OpenSquareBracket => self.parse_array_pattern(),
            Token::Identifier(name) => {
                self.advance();
                if self.next_is(Token::OpenParentheses) {
                    self.advance();
                    let mut members = Vec::new();
                    let mut index = 0usize;
                    if !self.next_is(Token::CloseParentheses) {
                        loop {
                            let member_pattern = self.parse_pattern()?;
                            members.push((Identifier::from(format!("${}", index)), member_pattern));
                            index += 1;
                            if self.next_is(Token::Comma) {
                                self.advance();
                            } else {
                                break;
                            }
                        }
                    }
                    self.expect_and_discard(Token::CloseParentheses)?;
                    // Whether `name` actually names an enum variant or a
                    // plain class is unknown until the pass driver resolves
                    // it against its bindings; this guess is corrected then.
                    Ok(PatternNode::ClassDecomposition {
                        type_name: name.clone(),
                        members,
                        enum_variant: Some(name),
                    })
                } else if self.next_is_identifier() {
                    let binding = self.read_identifier()?;
                    Ok(PatternNode::Typed {
                        type_name: name,
                        binding: Some(binding),
                    })
                } else {
                    Ok(PatternNode::Binding(name))
                }
            }
            Token::Eof => self.premature_eof(),
            _ => self.unexpected(),
        }
    }

    fn parse_array_pattern(&mut self) -> Result<PatternNode> {
        self.expect_and_discard(Token::OpenSquareBracket)?;
        let mut elements = Vec::new();
        let mut wildcard_index = None;
        if !self.next_is(Token::CloseSquareBracket) {
            loop {
                if self.next_is(Token::DotDot) {
                    self.advance();
                    wildcard_index = Some(elements.len());
                } else {
                    elements.push(self.parse_pattern()?);
                }
                if self.next_is(Token::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect_and_discard(Token::CloseSquareBracket)?;
        Ok(PatternNode::Array { elements, wildcard_index })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexing::lexer::Lexer;
    use crate::source::in_memory::Source;

    fn parse_str(source: &str) -> ParsedModule {
        let chars = source.chars().collect::<Vec<char>>();
        let tokens = Tokens::from(Lexer::from(Source::from(chars))).unwrap();
        parse(tokens, "test.lm").unwrap()
    }

    fn class_at<'a>(module: &'a ParsedModule, index: usize) -> &'a ClassDefinition {
        module.definitions[module.top_level[index].index()].as_class().unwrap()
    }

    #[test]
    fn primary_constructor_with_var_argument_becomes_a_stored_data_member() {
        let module = parse_str("class Counter(var count: int) { }");
        let class = class_at(&module, 0);

        assert_eq!(class.name, Identifier::from("Counter"));
        assert!(class.has_constructor);
        assert_eq!(class.data_members.len(), 1);
        let member = module.definitions[class.data_members[0].index()].as_data_member().unwrap();
        assert_eq!(member.name, Identifier::from("count"));
    }

    #[test]
    fn primary_constructor_argument_without_var_is_not_a_data_member() {
        let module = parse_str("class Adder(n: int) { }");
        let class = class_at(&module, 0);
        assert!(class.data_members.is_empty());
        assert!(class.has_constructor);
    }

    #[test]
    fn generic_class_records_its_type_parameter() {
        let module = parse_str("class Box<T>(var value: T) { }");
        let class = class_at(&module, 0);
        assert!(class.is_generic());
        assert_eq!(class.generic_type_parameters.len(), 1);
    }

    #[test]
    fn parent_list_is_recorded_as_unresolved_names() {
        let module = parse_str("class Circle: Shape { }");
        let class = class_at(&module, 0);
        assert_eq!(class.unresolved_parents, vec![Identifier::from("Shape")]);
    }

    #[test]
    fn forward_reference_to_a_later_class_resolves_to_the_same_placeholder() {
        let module = parse_str("class Node(var next: Node) { }");
        assert_eq!(module.top_level.len(), 1);
    }

    #[test]
    fn enum_variant_becomes_a_static_constructor_method() {
        let module = parse_str("enum Shape { Square(int), Circle(int), Point }");
        let class = class_at(&module, 0);
        assert_eq!(class.methods.len(), 3);

        let square = module.definitions[class.methods[0].index()].as_method().unwrap();
        assert!(square.is_static);
        assert!(square.is_enum_constructor);
        assert_eq!(square.arguments.len(), 1);

        let point = module.definitions[class.methods[2].index()].as_method().unwrap();
        assert!(point.arguments.is_empty());
    }

    #[test]
    fn method_with_lambda_signature_return_type_parses_its_own_name() {
        let module = parse_str("class Adders { fun int(int) make(int n) = { |int m| m + n } }");
        let class = class_at(&module, 0);
        let method = module.definitions[class.methods[0].index()].as_method().unwrap();
        assert_eq!(method.name, Identifier::from("make"));
        assert!(method.return_type.is_function());
    }

    #[test]
    fn match_expression_with_a_guard_parses_its_cases() {
        let module = parse_str(
            "class Classifier { fun string describe(int n) { return match n { 0 -> \"zero\", x if x > 0 -> \"positive\", _ -> \"negative\" } } }",
        );
        let class = class_at(&module, 0);
        let method = module.definitions[class.methods[0].index()].as_method().unwrap();
        assert!(method.body.is_some());
    }

    #[test]
    fn for_loop_binds_its_variable_in_the_body_scope() {
        let module = parse_str("class Summer { fun int sum(int[] xs) { var total: int = 0 for x: xs { total += x } return total } }");
        let class = class_at(&module, 0);
        let method = module.definitions[class.methods[0].index()].as_method().unwrap();
        let body = method.body.as_ref().unwrap();
        assert!(matches!(body.statements[1], Statement::For(_)));
    }
}
