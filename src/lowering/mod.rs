//! # Lowering generators
//!
//! Free functions the pass driver ([`crate::tree::Tree`]) calls during
//! `GenerateCloneMethods`/`ConvertClosureTypes`/enum and defer lowering to
//! synthesize the members a source-level construct implies but never
//! spells out: a clone method, a closure's capture class, a tagged
//! union's discriminant, a deferred call's closure allocation.
//!
//! These are plain functions over `&mut Tree` rather than methods on
//! `Tree` itself, so each concern stays in its own file instead of
//! growing the pass driver's own `impl` block without bound.

pub mod captures;
pub mod clone_gen;
pub mod closure_gen;
pub mod defer_gen;
pub mod enum_gen;
pub mod match_gen;
