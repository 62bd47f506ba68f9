//! Immutable types that cross over multiple phases unaltered.
//!
//! Identifiers are interned behind an `Arc<str>` rather than cloned as
//! owned `String`s because the same name is copied into name-binding
//! scopes, definitions, and types many times over during lowering; an
//! `Arc` keeps that cheap.

use std::fmt;
use std::sync::Arc;

macro_rules! multiphase_string_type {
    ( $( $(#[$meta:meta])* $type:ident ),* $(,)? ) => {
        $(
            $(#[$meta])*
            #[derive(Clone, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
            pub struct $type(pub Arc<str>);

            impl From<String> for $type {
                fn from(string: String) -> Self {
                    $type(Arc::from(string))
                }
            }

            impl From<&str> for $type {
                fn from(string: &str) -> Self {
                    $type(Arc::from(string))
                }
            }

            impl fmt::Display for $type {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.0)
                }
            }

            impl AsRef<str> for $type {
                fn as_ref(&self) -> &str {
                    &self.0
                }
            }
        )*
    }
}

multiphase_string_type![
    /// A name bound in some scope: a class, method, data member, generic
    /// parameter, label, or local variable.
    Identifier,
    /// A string literal, preserved as written from lexer to lowered AST.
    LumenString,
];
