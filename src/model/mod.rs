//! The semantic data model shared by every later pass: the type system
//! (`types`) and the scoped symbol tables built on top of it (`bindings`).

pub mod bindings;
pub mod ids;
pub mod types;
