//! # Back-end contract
//!
//! What a lowered [`crate::tree::Tree`] promises an emitter, without
//! implementing the emitter itself (no text/IL output is produced here):
//! name mangling and the header/implementation partition a consumer needs
//! to turn a `Tree` into two translation units.

use crate::ast::definitions::Definition;
use crate::model::ids::DefinitionId;

/// Replaces every character an emitted name cannot carry (`, < > $ ( )` and
/// spaces) with `_`. Applied to generated names like `List<int>_init` or
/// `fun int(int)` so they are valid identifiers in a target with no
/// generics or operator characters in its own name syntax.
pub fn mangle(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            ',' | '<' | '>' | '$' | '(' | ')' | ' ' => '_',
            other => other,
        })
        .collect()
}

/// A lowered module partitioned the way an emitter consumes it: the
/// declarations a dependent module's header needs to see, and everything
/// else. `header`/`implementation` hold ids rather than borrowed
/// definitions so the partition can outlive any one borrow of the arena.
pub struct LoweredModule {
    pub name: String,
    pub dependencies: Vec<String>,
    pub header: Vec<DefinitionId>,
    pub implementation: Vec<DefinitionId>,
}

impl LoweredModule {
    /// Partitions `top_level` into header (classes, interfaces, and method
    /// signatures other modules can reference) and implementation (method
    /// bodies and everything internal). A definition with no body at all
    /// (an interface method, a forward declaration) is header-only; a
    /// class definition is needed in both, since a dependent module must
    /// see its shape but this module still emits its members.
    pub fn partition(name: impl Into<String>, dependencies: Vec<String>, definitions: &[Definition], top_level: &[DefinitionId]) -> Self {
        let mut header = Vec::new();
        let mut implementation = Vec::new();

        for &id in top_level {
            match &definitions[id.index()] {
                Definition::Class(_) | Definition::ForwardDeclaration(_) => {
                    header.push(id);
                    implementation.push(id);
                }
                Definition::Method(method) if method.is_abstract() => header.push(id),
                Definition::Method(_) | Definition::DataMember(_) | Definition::GenericTypeParameter(_) => implementation.push(id),
            }
        }

        Self {
            name: name.into(),
            dependencies,
            header,
            implementation,
        }
    }

    /// The renamed entry point the runtime's own `main` delegates to, per
    /// the contract that only one `main` per emitted program may exist.
    pub fn entry_point_name(original: &str) -> String {
        format!("_{}_", original)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mangle_replaces_the_fixed_alphabet() {
        assert_eq!(mangle("List<int, string>"), "List_int__string_");
        assert_eq!(mangle("fun int(int)"), "fun_int_int_");
    }

    #[test]
    fn mangle_is_injective_on_already_clean_names() {
        assert_eq!(mangle("Counter_init"), "Counter_init");
    }

    #[test]
    fn main_is_renamed_with_surrounding_underscores() {
        assert_eq!(LoweredModule::entry_point_name("main"), "_main_");
    }
}
