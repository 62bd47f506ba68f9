//! # Diagnostics
//!
//! Every fatal error the compiler can produce, together with the source
//! location it happened at. There is no local recovery: the first error
//! encountered during parsing or type-checking is returned up the call
//! stack and terminates the run.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::common::multiphase::Identifier;

/// A `filename:line:column` triple, attached to every diagnostic.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SourceLocation {
    pub file: Arc<str>,
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    pub fn new(file: impl Into<Arc<str>>, line: u32, column: u32) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }

    /// A location used for compiler-generated AST that was never read from
    /// source text, e.g. a generated clone method or closure class.
    pub fn generated() -> Self {
        Self {
            file: Arc::from("<generated>"),
            line: 0,
            column: 0,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// Every variant here is fatal; the compiler aborts on the first one.
#[derive(Debug, Error)]
pub enum CompileErrorKind {
    #[error("unknown identifier `{0}`")]
    UnknownIdentifier(Identifier),

    #[error("unknown type `{0}`")]
    UnknownType(Identifier),

    #[error("cannot infer a concrete type for generic method `{0}`")]
    CannotInferGenericArguments(Identifier),

    #[error("`{0}` is already declared in this scope")]
    AlreadyDeclared(Identifier),

    #[error("no overload of `{0}` accepts the given argument types")]
    NoMatchingOverload(Identifier),

    #[error("cannot initialize a value of type `{expected}` from `{actual}`")]
    TypeMismatch { expected: String, actual: String },

    #[error("operator `{operator}` is not defined for `{left}` and `{right}`")]
    IncompatibleOperands {
        operator: String,
        left: String,
        right: String,
    },

    #[error("condition must be boolean or numeric, found `{0}`")]
    ConditionNotBooleanOrNumeric(String),

    #[error("enumerations cannot be compared with `==`; use `match` instead")]
    EnumerationCompared,

    #[error("class `{0}` has more than one concrete base class")]
    MultipleConcreteBases(Identifier),

    #[error("interface `{0}` cannot inherit from a concrete class")]
    InterfaceInheritsConcrete(Identifier),

    #[error("method `{0}` does not return on every path")]
    MissingReturn(Identifier),

    #[error("`break`/`continue` used outside of a loop")]
    JumpOutsideLoop,

    #[error("constructors cannot declare a return type")]
    ConstructorHasReturnType,

    #[error("static context `{0}` cannot access a non-static member")]
    StaticContextAccessesInstanceMember(Identifier),

    #[error("constant `{0}` cannot be mutated here")]
    ConstantMutated(Identifier),

    #[error("abstract method `{0}` has no implementation on an instantiated class")]
    AbstractMethodOnInstantiatedClass(Identifier),

    #[error("match is not exhaustive; add a case for the remaining values")]
    NonExhaustiveMatch,

    #[error("unreachable match case after an exhaustive case")]
    UnreachableCase,

    #[error("`{0}` is only bound in some match alternatives")]
    VariableBoundInSomeAlternatives(Identifier),

    #[error("wildcard `..` used twice in the same pattern")]
    DuplicateWildcard,

    #[error("pattern expected to always match did not")]
    RefutablePatternExpectedIrrefutable,

    #[error("data member `{member}` of message class `{class}` is not itself a primitive or a message")]
    NonMessageDataMemberInMessageClass {
        class: Identifier,
        member: Identifier,
    },

    #[error("message class `{0}`'s base class is not itself a message")]
    MessageBaseNotMessage(Identifier),

    #[error("closure return type does not match the lambda signature it is supplied to")]
    ClosureReturnTypeMismatch,

    #[error("internal error in {0}: {1}")]
    Internal(&'static str, String),
}

#[derive(Debug, Error)]
#[error("{location}: {kind}")]
pub struct CompileError {
    pub location: SourceLocation,
    pub kind: CompileErrorKind,
}

impl CompileError {
    pub fn new(location: SourceLocation, kind: CompileErrorKind) -> Self {
        Self { location, kind }
    }

    pub fn internal(location: SourceLocation, context: &'static str, message: impl Into<String>) -> Self {
        Self::new(location, CompileErrorKind::Internal(context, message.into()))
    }
}

pub type Result<T> = std::result::Result<T, CompileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_as_filename_line_column() {
        let error = CompileError::new(
            SourceLocation::new("main.lm", 12, 5),
            CompileErrorKind::UnknownIdentifier(Identifier::from("foo")),
        );
        assert_eq!(
            error.to_string(),
            "main.lm:12:5: unknown identifier `foo`"
        );
    }

    #[test]
    fn generated_location_is_distinguishable() {
        let location = SourceLocation::generated();
        assert_eq!(location.line, 0);
        assert_eq!(location.to_string(), "<generated>:0:0");
    }
}
