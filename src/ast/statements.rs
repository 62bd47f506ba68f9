//! # Statements
//!
//! `Block` is the only statement that owns a scope; every other statement
//! either introduces a binding into its enclosing block's scope (a
//! declaration or a label) or has no naming effect at all.

use crate::ast::expressions::Expression;
use crate::common::multiphase::Identifier;
use crate::model::bindings::NameBindings;
use crate::model::ids::{DefinitionId, LocalId};
use crate::model::types::Type;

/// How a local was introduced. `Pattern` declarations hold the subject
/// expression until the pattern engine replaces the declaration with the
/// bindings the pattern emits.
#[derive(Clone, Debug)]
pub enum VariableDeclarationKind {
    Typed(Type),
    Implicit,
    Pattern(crate::patterns::PatternNode),
}

#[derive(Clone, Debug)]
pub struct VariableDeclaration {
    pub local: LocalId,
    pub name: Identifier,
    pub kind: VariableDeclarationKind,
    pub initializer: Option<Expression>,
    pub constant: bool,
    pub resolved_type: Option<Type>,
}

impl VariableDeclaration {
    pub fn is_implicit(&self) -> bool {
        matches!(self.kind, VariableDeclarationKind::Implicit)
    }

    pub fn is_pattern_binding(&self) -> bool {
        matches!(self.kind, VariableDeclarationKind::Pattern(_))
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConstructorCallTarget {
    Base(DefinitionId),
    ThisClass,
}

#[derive(Clone, Debug)]
pub struct ConstructorCallStatement {
    pub target: ConstructorCallTarget,
    pub arguments: Vec<Expression>,
}

#[derive(Clone, Debug)]
pub struct IfStatement {
    pub condition: Expression,
    pub then_branch: Box<Statement>,
    pub else_branch: Option<Box<Statement>>,
}

#[derive(Clone, Debug)]
pub struct WhileStatement {
    pub condition: Expression,
    pub body: Box<Statement>,
    /// Set once `CheckReturnStatements`-style analysis notices an
    /// unconditional `while(true)` with no reachable `break`.
    pub never_falls_through: bool,
}

#[derive(Clone, Debug)]
pub struct ForStatement {
    pub variable: LocalId,
    pub iterable: Expression,
    pub body: Box<Statement>,
}

#[derive(Clone, Debug)]
pub struct DeferStatement {
    pub body: Box<Statement>,
}

#[derive(Clone, Debug, Default)]
pub struct Block {
    pub bindings: NameBindings,
    pub statements: Vec<Statement>,
}

impl Block {
    pub fn new(bindings: NameBindings) -> Self {
        Self {
            bindings,
            statements: Vec::new(),
        }
    }

    /// Adds a statement to the block, inserting into the block's scope the
    /// binding it introduces, if any. Pattern-binding declarations defer
    /// their own insertion until the pattern engine has produced the
    /// concrete bindings to insert instead.
    pub fn add_statement(&mut self, statement: Statement) {
        match &statement {
            Statement::VarDeclaration(declaration) if !declaration.is_pattern_binding() => {
                self.bindings
                    .insert_local_object(declaration.name.clone(), declaration.local);
            }
            Statement::Label(name) => {
                self.bindings.insert_label(name.clone());
            }
            _ => {}
        }
        self.statements.push(statement);
    }
}

#[derive(Clone, Debug)]
pub enum Statement {
    Block(Block),
    VarDeclaration(VariableDeclaration),
    Expression(Expression),
    If(IfStatement),
    While(WhileStatement),
    For(ForStatement),
    Return(Option<Expression>),
    Defer(DeferStatement),
    ConstructorCall(ConstructorCallStatement),
    Label(Identifier),
    Goto(Identifier),
    Break,
    Continue,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(n: usize) -> LocalId {
        LocalId(n)
    }

    #[test]
    fn adding_a_typed_declaration_inserts_its_binding() {
        let mut block = Block::new(NameBindings::new());
        block.add_statement(Statement::VarDeclaration(VariableDeclaration {
            local: local(0),
            name: Identifier::from("count"),
            kind: VariableDeclarationKind::Typed(Type::built_in(crate::model::types::BuiltInKind::Int)),
            initializer: None,
            constant: false,
            resolved_type: None,
        }));

        assert!(block.bindings.lookup_local(&Identifier::from("count")).is_some());
    }

    #[test]
    fn adding_a_pattern_declaration_defers_insertion() {
        let mut block = Block::new(NameBindings::new());
        block.add_statement(Statement::VarDeclaration(VariableDeclaration {
            local: local(0),
            name: Identifier::from("ignored"),
            kind: VariableDeclarationKind::Pattern(crate::patterns::PatternNode::Placeholder),
            initializer: None,
            constant: false,
            resolved_type: None,
        }));

        assert!(block.bindings.lookup_local(&Identifier::from("ignored")).is_none());
    }

    #[test]
    fn adding_a_label_inserts_it() {
        let mut block = Block::new(NameBindings::new());
        block.add_statement(Statement::Label(Identifier::from("retry")));
        assert!(block.bindings.lookup_local(&Identifier::from("retry")).is_some());
    }
}
