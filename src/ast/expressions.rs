//! # Expressions
//!
//! The expression tree as it exists mid-lowering: literals and names as the
//! parser produced them, plus the handful of synthetic forms
//! (`Temporary`, `WrappedStatement`, `LocalVariableReference`) that earlier
//! passes introduce to splice generated statements into expression
//! position.

use crate::ast::statements::Statement;
use crate::common::multiphase::{Identifier, LumenString};
use crate::diagnostics::SourceLocation;
use crate::model::ids::{DefinitionId, LocalId};
use crate::model::types::Type;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    And,
    Or,
    Range,
    Assign,
    AddAssign,
    SubtractAssign,
    MultiplyAssign,
    DivideAssign,
}

impl BinaryOperator {
    pub fn is_compound_assignment(self) -> bool {
        matches!(
            self,
            BinaryOperator::AddAssign
                | BinaryOperator::SubtractAssign
                | BinaryOperator::MultiplyAssign
                | BinaryOperator::DivideAssign
        )
    }

    /// The non-assigning operator a compound assignment decomposes into,
    /// e.g. `+=` decomposes `left op= right` into `left = left op right`.
    pub fn decomposed(self) -> Option<BinaryOperator> {
        match self {
            BinaryOperator::AddAssign => Some(BinaryOperator::Add),
            BinaryOperator::SubtractAssign => Some(BinaryOperator::Subtract),
            BinaryOperator::MultiplyAssign => Some(BinaryOperator::Multiply),
            BinaryOperator::DivideAssign => Some(BinaryOperator::Divide),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UnaryOperator {
    Negate,
    Not,
}

#[derive(Clone, Debug)]
pub enum Literal {
    Void,
    Null,
    Bool(bool),
    Byte(u8),
    Char(char),
    Int(i64),
    Float(f64),
    String(LumenString),
}

/// A lambda expression as written at its use site: `{ |a, b| ... }`,
/// appearing where a method's declared lambda signature expects it
/// (a trailing argument after a bare call name, or a call argument list).
/// Always inlined at its call site; never becomes a first-class value.
#[derive(Clone, Debug)]
pub struct Lambda {
    pub parameters: Vec<Identifier>,
    pub body: Box<Statement>,
    pub inferred_type: Option<Type>,
}

/// A `{ |a, b| ... }` block used as a value rather than inlined at a
/// lambda-signature call site. Closure conversion rewrites it into
/// `Expression::New` of a generated capturing class implementing the
/// closure interface derived from its signature.
#[derive(Clone, Debug)]
pub struct AnonymousFunction {
    pub parameters: Vec<Identifier>,
    pub body: Box<Statement>,
    pub inferred_type: Option<Type>,
}

#[derive(Clone, Debug)]
pub struct MethodCall {
    pub receiver: Option<Box<Expression>>,
    pub name: Identifier,
    pub arguments: Vec<Expression>,
    /// Filled in once overload resolution (and any generic inference it
    /// triggered) has picked a concrete method.
    pub resolved_method: Option<DefinitionId>,
    pub result_type: Option<Type>,
}

#[derive(Clone, Debug)]
pub struct HeapAllocation {
    pub class_name: Identifier,
    pub generic_type_arguments: Vec<Type>,
    pub constructor_call: Box<Expression>,
    pub result_type: Option<Type>,
}

#[derive(Clone, Debug)]
pub struct ArrayAllocation {
    pub element_type: Type,
    pub capacity: Box<Expression>,
    pub literal_elements: Option<Vec<Expression>>,
}

#[derive(Clone, Debug)]
pub struct Subscript {
    pub array: Box<Expression>,
    pub index: Box<Expression>,
    pub element_type: Option<Type>,
}

#[derive(Clone, Debug)]
pub struct TypeCast {
    pub target: Type,
    pub operand: Box<Expression>,
    /// Set once the cast kind has been determined: upcasts, identical
    /// types, and object/interface conversions are static; everything
    /// else that's still legal is a dynamic cast checked at runtime.
    pub is_static: Option<bool>,
}

#[derive(Clone, Debug)]
pub struct MatchCase {
    pub pattern: crate::patterns::PatternNode,
    pub guard: Option<Expression>,
    pub body: Box<Statement>,
}

#[derive(Clone, Debug)]
pub struct Match {
    pub subject: Box<Expression>,
    pub cases: Vec<MatchCase>,
    pub result_type: Option<Type>,
}

/// A statement spliced into expression position, produced when a void
/// method call is inlined (`a.sideEffectingCall()` used as a statement).
#[derive(Clone, Debug)]
pub struct WrappedStatement {
    pub statement: Box<Statement>,
}

/// A reference to a `Temporary` this pass introduced, e.g. the synthetic
/// local that holds a match subject or an inlined call's return value.
#[derive(Clone, Debug)]
pub struct Temporary {
    pub local: LocalId,
    pub declaration: Box<Statement>,
    pub inner_type: Type,
}

#[derive(Clone, Debug)]
pub enum Expression {
    Literal(Literal),
    /// A bare name: resolved against the current scope by the pass that
    /// encounters it into a local, data member, or static reference.
    Name(Identifier),
    LocalVariableReference(LocalId),
    DataMemberReference { object: Option<Box<Expression>>, member: DefinitionId },
    MemberSelector { object: Box<Expression>, member: Box<Expression> },
    MethodCall(MethodCall),
    New(HeapAllocation),
    NewArray(ArrayAllocation),
    Subscript(Subscript),
    TypeCast(TypeCast),
    Binary { operator: BinaryOperator, left: Box<Expression>, right: Box<Expression>, result_type: Option<Type> },
    Unary { operator: UnaryOperator, operand: Box<Expression>, result_type: Option<Type> },
    Lambda(Lambda),
    AnonymousFunction(AnonymousFunction),
    Match(Match),
    Yield(Option<Box<Expression>>),
    WrappedStatement(WrappedStatement),
    Temporary(Temporary),
    This,
}

impl Expression {
    pub fn is_wrapped_statement_or_temporary(&self) -> bool {
        matches!(self, Expression::WrappedStatement(_) | Expression::Temporary(_))
    }

    pub fn location_placeholder() -> SourceLocation {
        SourceLocation::generated()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compound_assignment_decomposes_to_its_base_operator() {
        assert_eq!(BinaryOperator::AddAssign.decomposed(), Some(BinaryOperator::Add));
        assert_eq!(BinaryOperator::Equal.decomposed(), None);
    }

    #[test]
    fn wrapped_statement_and_temporary_are_detected() {
        let wrapped = Expression::WrappedStatement(WrappedStatement {
            statement: Box::new(Statement::Break),
        });
        assert!(wrapped.is_wrapped_statement_or_temporary());
        assert!(!Expression::This.is_wrapped_statement_or_temporary());
    }
}
