//! The lowered AST: definitions (`definitions`), statements (`statements`),
//! and expressions (`expressions`), all addressed across passes through
//! the `model::ids` handle types rather than direct ownership.

pub mod definitions;
pub mod expressions;
pub mod statements;
