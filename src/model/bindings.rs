//! # Name Bindings
//!
//! A scope is a map from identifier to `Binding`, chained to its enclosing
//! scope. Lookup walks outward until it finds a match or runs out of
//! scopes, giving the usual shadowing behaviour for nested blocks, method
//! bodies, and class bodies.
//!
//! Unlike the later arena-indexed definitions, a `Binding` can point at
//! three different kinds of thing depending on what it names, so it is
//! modelled as an enum rather than a struct with optional fields.

use std::collections::BTreeMap;

use crate::common::multiphase::Identifier;
use crate::model::ids::{DefinitionId, LocalId};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ReferencedEntity {
    LocalObject,
    Class,
    Method,
    DataMember,
    Parameter,
    GenericTypeParameter,
    Label,
}

#[derive(Clone, Debug)]
pub enum Binding {
    LocalObject(LocalId),
    Class(DefinitionId),
    /// A name bound to one or more overloads; starts with one method and
    /// grows as `overload_method` appends more.
    Method(Vec<DefinitionId>),
    DataMember(DefinitionId),
    /// A method/constructor argument, bound by name inside its own body.
    /// Distinct from `DataMember` because a bare reference to one resolves
    /// to `DataMemberReference { object: None, .. }`, not `this.member`.
    Parameter(DefinitionId),
    GenericTypeParameter(DefinitionId),
    Label,
}

impl Binding {
    pub fn referenced_entity(&self) -> ReferencedEntity {
        match self {
            Binding::LocalObject(_) => ReferencedEntity::LocalObject,
            Binding::Class(_) => ReferencedEntity::Class,
            Binding::Method(_) => ReferencedEntity::Method,
            Binding::DataMember(_) => ReferencedEntity::DataMember,
            Binding::Parameter(_) => ReferencedEntity::Parameter,
            Binding::GenericTypeParameter(_) => ReferencedEntity::GenericTypeParameter,
            Binding::Label => ReferencedEntity::Label,
        }
    }

    /// `true` for bindings that can appear where a type name is expected:
    /// classes and generic type parameters.
    pub fn is_referencing_type(&self) -> bool {
        matches!(self, Binding::Class(_) | Binding::GenericTypeParameter(_))
    }

    pub fn local_object(&self) -> Option<LocalId> {
        match self {
            Binding::LocalObject(id) => Some(*id),
            _ => None,
        }
    }

    pub fn definition(&self) -> Option<DefinitionId> {
        match self {
            Binding::Class(id) | Binding::DataMember(id) | Binding::Parameter(id) | Binding::GenericTypeParameter(id) => Some(*id),
            Binding::Method(overloads) => overloads.first().copied(),
            Binding::LocalObject(_) | Binding::Label => None,
        }
    }

    pub fn methods(&self) -> &[DefinitionId] {
        match self {
            Binding::Method(overloads) => overloads,
            _ => &[],
        }
    }
}

/// A lexical scope: the bindings introduced directly within it, plus the
/// scope it is nested inside. The root scope (the bootstrap namespace) has
/// no enclosing scope.
#[derive(Clone, Debug, Default)]
pub struct NameBindings {
    enclosing: Option<Box<NameBindings>>,
    bindings: BTreeMap<Identifier, Binding>,
}

impl NameBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nested_in(enclosing: NameBindings) -> Self {
        Self {
            enclosing: Some(Box::new(enclosing)),
            bindings: BTreeMap::new(),
        }
    }

    pub fn enclosing(&self) -> Option<&NameBindings> {
        self.enclosing.as_deref()
    }

    pub fn into_enclosing(self) -> Option<NameBindings> {
        self.enclosing.map(|boxed| *boxed)
    }

    /// Walks outward through enclosing scopes until a binding for `name`
    /// is found.
    pub fn lookup(&self, name: &Identifier) -> Option<&Binding> {
        self.bindings
            .get(name)
            .or_else(|| self.enclosing.as_deref().and_then(|enclosing| enclosing.lookup(name)))
    }

    /// As `lookup`, but only for bindings that resolve to a type.
    pub fn lookup_type(&self, name: &Identifier) -> Option<DefinitionId> {
        match self.bindings.get(name) {
            Some(binding) if binding.is_referencing_type() => binding.definition(),
            _ => self.enclosing.as_deref().and_then(|enclosing| enclosing.lookup_type(name)),
        }
    }

    /// Looks up `name` in this scope only, without walking outward.
    pub fn lookup_local(&self, name: &Identifier) -> Option<&Binding> {
        self.bindings.get(name)
    }

    pub fn insert_local_object(&mut self, name: Identifier, local: LocalId) -> bool {
        self.try_insert(name, Binding::LocalObject(local))
    }

    /// Drops local-object bindings whose key no longer matches the name the
    /// object itself carries, which happens once a pattern-bound variable
    /// is renamed during lowering.
    pub fn remove_obsolete_local_bindings(&mut self, current_name: impl Fn(LocalId) -> Identifier) {
        self.bindings.retain(|key, binding| match binding {
            Binding::LocalObject(id) => *key == current_name(*id),
            _ => true,
        });
    }

    pub fn insert_class(&mut self, name: Identifier, class: DefinitionId) -> bool {
        self.try_insert(name, Binding::Class(class))
    }

    pub fn insert_data_member(&mut self, name: Identifier, data_member: DefinitionId) -> bool {
        self.try_insert(name, Binding::DataMember(data_member))
    }

    pub fn insert_parameter(&mut self, name: Identifier, parameter: DefinitionId) -> bool {
        self.try_insert(name, Binding::Parameter(parameter))
    }

    pub fn remove_data_member(&mut self, name: &Identifier) -> bool {
        match self.bindings.get(name) {
            Some(Binding::DataMember(_)) => {
                self.bindings.remove(name);
                true
            }
            _ => false,
        }
    }

    pub fn insert_method(&mut self, name: Identifier, method: DefinitionId) -> bool {
        self.try_insert(name, Binding::Method(vec![method]))
    }

    /// Appends to an existing `Method` binding, or creates a fresh one if
    /// this is the first overload seen.
    pub fn overload_method(&mut self, name: Identifier, method: DefinitionId) -> bool {
        match self.bindings.get_mut(&name) {
            None => self.insert_method(name, method),
            Some(Binding::Method(overloads)) => {
                overloads.push(method);
                true
            }
            Some(_) => false,
        }
    }

    pub fn update_method_name(&mut self, old_name: &Identifier, new_name: Identifier) -> bool {
        match self.bindings.get(old_name) {
            Some(Binding::Method(_)) => {
                let binding = self.bindings.remove(old_name).expect("checked above");
                self.bindings.insert(new_name, binding).is_none()
            }
            _ => false,
        }
    }

    pub fn remove_last_overloaded_method(&mut self, name: &Identifier) -> bool {
        match self.bindings.get_mut(name) {
            Some(Binding::Method(overloads)) => overloads.pop().is_some(),
            _ => false,
        }
    }

    pub fn insert_generic_type_parameter(&mut self, name: Identifier, parameter: DefinitionId) -> bool {
        self.try_insert(name, Binding::GenericTypeParameter(parameter))
    }

    pub fn insert_label(&mut self, label: Identifier) -> bool {
        if self.lookup(&label).is_some() {
            return false;
        }
        self.bindings.insert(label, Binding::Label);
        true
    }

    /// Copies every binding from `from` into `self`, for bootstrapping a
    /// class scope from the bindings its base class already collected.
    pub fn copy_from(&mut self, from: &NameBindings) {
        for (name, binding) in &from.bindings {
            self.bindings.insert(name.clone(), binding.clone());
        }
    }

    /// Imports only the bindings a `using`/module-import style directive
    /// should bring in: classes, methods, and data members, never locals,
    /// generic parameters, or labels.
    pub fn use_namespace(&mut self, used: &NameBindings) {
        for (name, binding) in &used.bindings {
            if matches!(
                binding.referenced_entity(),
                ReferencedEntity::Class | ReferencedEntity::Method | ReferencedEntity::DataMember
            ) {
                self.bindings.insert(name.clone(), binding.clone());
            }
        }
    }

    fn try_insert(&mut self, name: Identifier, binding: Binding) -> bool {
        match self.bindings.entry(name) {
            std::collections::btree_map::Entry::Occupied(_) => false,
            std::collections::btree_map::Entry::Vacant(entry) => {
                entry.insert(binding);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: usize) -> DefinitionId {
        DefinitionId(n)
    }

    fn local(n: usize) -> LocalId {
        LocalId(n)
    }

    #[test]
    fn lookup_walks_out_through_enclosing_scopes() {
        let mut outer = NameBindings::new();
        outer.insert_class(Identifier::from("Widget"), id(1));

        let inner = NameBindings::nested_in(outer);
        assert!(matches!(inner.lookup(&Identifier::from("Widget")), Some(Binding::Class(_))));
    }

    #[test]
    fn lookup_local_does_not_see_enclosing_scope() {
        let mut outer = NameBindings::new();
        outer.insert_class(Identifier::from("Widget"), id(1));
        let inner = NameBindings::nested_in(outer);

        assert!(inner.lookup_local(&Identifier::from("Widget")).is_none());
    }

    #[test]
    fn duplicate_insertion_is_rejected() {
        let mut scope = NameBindings::new();
        assert!(scope.insert_class(Identifier::from("Widget"), id(1)));
        assert!(!scope.insert_class(Identifier::from("Widget"), id(2)));
    }

    #[test]
    fn overload_method_appends_to_existing_binding() {
        let mut scope = NameBindings::new();
        let name = Identifier::from("render");
        assert!(scope.overload_method(name.clone(), id(1)));
        assert!(scope.overload_method(name.clone(), id(2)));

        match scope.lookup_local(&name) {
            Some(Binding::Method(overloads)) => assert_eq!(overloads, &[id(1), id(2)]),
            other => panic!("expected a method binding, got {:?}", other),
        }
    }

    #[test]
    fn remove_obsolete_local_bindings_drops_stale_renames() {
        let mut scope = NameBindings::new();
        scope.insert_local_object(Identifier::from("x"), local(0));

        scope.remove_obsolete_local_bindings(|_| Identifier::from("y"));
        assert!(scope.lookup_local(&Identifier::from("x")).is_none());
    }

    #[test]
    fn insert_label_rejects_names_already_visible() {
        let mut outer = NameBindings::new();
        outer.insert_label(Identifier::from("done"));
        let mut inner = NameBindings::nested_in(outer);

        assert!(!inner.insert_label(Identifier::from("done")));
    }

    #[test]
    fn use_namespace_imports_classes_but_not_locals() {
        let mut used = NameBindings::new();
        used.insert_class(Identifier::from("Widget"), id(1));
        used.insert_local_object(Identifier::from("tmp"), local(0));

        let mut importer = NameBindings::new();
        importer.use_namespace(&used);

        assert!(importer.lookup_local(&Identifier::from("Widget")).is_some());
        assert!(importer.lookup_local(&Identifier::from("tmp")).is_none());
    }
}
