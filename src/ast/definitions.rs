//! # Definitions
//!
//! A `Definition` is anything a name can bind to at the top level or
//! inside a class: a class itself, a method, a data member, a generic type
//! parameter, or a forward declaration the pass driver emits ahead of a
//! recursive generic instantiation.
//!
//! Every cross-reference between definitions (a method's enclosing class,
//! a class's base, a generic parameter's resolved type) is a
//! [`DefinitionId`] rather than a pointer, since `Tree` owns the arena
//! these live in and later passes mutate it while earlier definitions are
//! still being read.

use crate::ast::statements::Block;
use crate::common::multiphase::Identifier;
use crate::diagnostics::SourceLocation;
use crate::model::ids::DefinitionId;
use crate::model::types::{FunctionSignature, Type};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AccessLevel {
    Public,
    Private,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ClassProperties {
    pub is_interface: bool,
    pub is_process: bool,
    pub is_message: bool,
    pub is_closure: bool,
    pub is_generated: bool,
    pub is_enumeration: bool,
    pub is_enumeration_variant: bool,
}

#[derive(Clone, Debug)]
pub struct ClassDefinition {
    pub name: Identifier,
    pub location: SourceLocation,
    pub enclosing: Option<DefinitionId>,
    pub base_class: Option<DefinitionId>,
    pub parent_classes: Vec<DefinitionId>,
    pub generic_type_parameters: Vec<DefinitionId>,
    pub members: Vec<DefinitionId>,
    pub methods: Vec<DefinitionId>,
    pub data_members: Vec<DefinitionId>,
    pub primary_ctor_arg_data_members: Vec<DefinitionId>,
    pub properties: ClassProperties,
    pub has_constructor: bool,
    pub is_recursive: bool,
    pub imported: bool,
    /// Base/parent names as the parser read them, before the pass driver's
    /// name-binding lookup turns them into `base_class`/`parent_classes`.
    pub unresolved_parents: Vec<Identifier>,
}

impl ClassDefinition {
    pub fn new(name: Identifier, location: SourceLocation, enclosing: Option<DefinitionId>) -> Self {
        Self {
            name,
            location,
            enclosing,
            base_class: None,
            parent_classes: Vec::new(),
            generic_type_parameters: Vec::new(),
            members: Vec::new(),
            methods: Vec::new(),
            data_members: Vec::new(),
            primary_ctor_arg_data_members: Vec::new(),
            properties: ClassProperties::default(),
            has_constructor: false,
            is_recursive: false,
            imported: false,
            unresolved_parents: Vec::new(),
        }
    }

    pub fn is_generic(&self) -> bool {
        !self.generic_type_parameters.is_empty()
    }

    /// `true` when this class lists a process interface among its parents
    /// but is not itself a process, interface, or generated class — the
    /// condition under which `MessageHandler` is auto-added.
    pub fn should_auto_gain_message_handler(&self, a_parent_is_process_interface: bool) -> bool {
        a_parent_is_process_interface && !self.properties.is_process && !self.properties.is_interface && !self.properties.is_generated
    }

    /// `true` when this class should auto-gain `Cloneable`: a non-enum
    /// message class that doesn't already inherit it.
    pub fn should_auto_gain_cloneable(&self, already_inherits_cloneable: bool) -> bool {
        self.properties.is_message && !self.properties.is_enumeration && !already_inherits_cloneable
    }

    /// Demotes a concrete class into an interface: drops constructors,
    /// private methods, and data members, leaving only abstract method
    /// stubs behind. The caller is responsible for actually clearing the
    /// dropped definitions out of the arena; this only flips the flag and
    /// empties the bookkeeping lists that would otherwise describe a
    /// concrete class.
    pub fn transform_into_interface(&mut self) {
        self.properties.is_interface = true;
        self.has_constructor = false;
        self.data_members.clear();
        self.primary_ctor_arg_data_members.clear();
    }

    pub fn add_primary_ctor_arg_data_member(&mut self, data_member: DefinitionId) {
        self.primary_ctor_arg_data_members.push(data_member);
        self.data_members.push(data_member);
        self.members.push(data_member);
    }

    pub fn add_method(&mut self, method: DefinitionId) {
        self.methods.push(method);
        self.members.push(method);
    }

    pub fn add_data_member(&mut self, data_member: DefinitionId) {
        self.data_members.push(data_member);
        self.members.push(data_member);
    }
}

#[derive(Clone, Debug)]
pub struct MethodDefinition {
    pub name: Identifier,
    pub location: SourceLocation,
    pub enclosing_class: DefinitionId,
    pub return_type: Type,
    pub arguments: Vec<DefinitionId>,
    pub access: AccessLevel,
    pub is_static: bool,
    pub body: Option<Block>,
    pub lambda_signature: Option<FunctionSignature>,
    pub is_constructor: bool,
    pub is_primary_constructor: bool,
    pub is_enum_constructor: bool,
    pub is_enum_copy_constructor: bool,
    pub is_function: bool,
    pub is_virtual: bool,
    pub is_generated: bool,
    pub has_been_type_checked_and_transformed: bool,
}

impl MethodDefinition {
    pub fn new(name: Identifier, location: SourceLocation, enclosing_class: DefinitionId, return_type: Type) -> Self {
        Self {
            name,
            location,
            enclosing_class,
            return_type,
            arguments: Vec::new(),
            access: AccessLevel::Public,
            is_static: false,
            body: None,
            lambda_signature: None,
            is_constructor: false,
            is_primary_constructor: false,
            is_enum_constructor: false,
            is_enum_copy_constructor: false,
            is_function: false,
            is_virtual: false,
            is_generated: false,
            has_been_type_checked_and_transformed: false,
        }
    }

    pub fn is_abstract(&self) -> bool {
        self.body.is_none()
    }

    /// The rewritten name a constructor carries from the point it's parsed
    /// onward: `<ClassName>_init`.
    pub fn constructor_name(class_name: &Identifier) -> Identifier {
        Identifier::from(format!("{}_init", class_name))
    }

    /// Whether two methods of the same name collide under the
    /// argument-types-only overload rule.
    pub fn has_same_arguments(&self, argument_types: &[Type]) -> bool {
        self.arguments.len() == argument_types.len()
    }
}

#[derive(Clone, Debug)]
pub struct DataMemberDefinition {
    pub name: Identifier,
    pub location: SourceLocation,
    pub enclosing_class: DefinitionId,
    pub declared_type: Type,
    pub access: AccessLevel,
    pub is_static: bool,
    pub is_primary_ctor_argument: bool,
    pub initializer: Option<crate::ast::expressions::Expression>,
    pub has_been_type_checked_and_transformed: bool,
}

impl DataMemberDefinition {
    pub fn new(name: Identifier, location: SourceLocation, enclosing_class: DefinitionId, declared_type: Type) -> Self {
        Self {
            name,
            location,
            enclosing_class,
            declared_type,
            access: AccessLevel::Public,
            is_static: false,
            is_primary_ctor_argument: false,
            initializer: None,
            has_been_type_checked_and_transformed: false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct GenericTypeParameterDefinition {
    pub name: Identifier,
    pub location: SourceLocation,
    pub enclosing: Option<DefinitionId>,
    pub concrete_type: Option<Type>,
}

impl GenericTypeParameterDefinition {
    pub fn new(name: Identifier, location: SourceLocation, enclosing: Option<DefinitionId>) -> Self {
        Self {
            name,
            location,
            enclosing,
            concrete_type: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ForwardDeclarationDefinition {
    pub name: Identifier,
    pub location: SourceLocation,
    pub target: Option<DefinitionId>,
}

#[derive(Clone, Debug)]
pub enum Definition {
    Class(ClassDefinition),
    Method(MethodDefinition),
    DataMember(DataMemberDefinition),
    GenericTypeParameter(GenericTypeParameterDefinition),
    ForwardDeclaration(ForwardDeclarationDefinition),
}

impl Definition {
    pub fn name(&self) -> &Identifier {
        match self {
            Definition::Class(class) => &class.name,
            Definition::Method(method) => &method.name,
            Definition::DataMember(data_member) => &data_member.name,
            Definition::GenericTypeParameter(parameter) => &parameter.name,
            Definition::ForwardDeclaration(forward) => &forward.name,
        }
    }

    pub fn location(&self) -> &SourceLocation {
        match self {
            Definition::Class(class) => &class.location,
            Definition::Method(method) => &method.location,
            Definition::DataMember(data_member) => &data_member.location,
            Definition::GenericTypeParameter(parameter) => &parameter.location,
            Definition::ForwardDeclaration(forward) => &forward.location,
        }
    }

    pub fn as_class(&self) -> Option<&ClassDefinition> {
        match self {
            Definition::Class(class) => Some(class),
            _ => None,
        }
    }

    pub fn as_class_mut(&mut self) -> Option<&mut ClassDefinition> {
        match self {
            Definition::Class(class) => Some(class),
            _ => None,
        }
    }

    pub fn as_method(&self) -> Option<&MethodDefinition> {
        match self {
            Definition::Method(method) => Some(method),
            _ => None,
        }
    }

    pub fn as_method_mut(&mut self) -> Option<&mut MethodDefinition> {
        match self {
            Definition::Method(method) => Some(method),
            _ => None,
        }
    }

    pub fn as_data_member(&self) -> Option<&DataMemberDefinition> {
        match self {
            Definition::DataMember(data_member) => Some(data_member),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location() -> SourceLocation {
        SourceLocation::generated()
    }

    #[test]
    fn constructor_name_appends_init() {
        assert_eq!(
            MethodDefinition::constructor_name(&Identifier::from("Point")).to_string(),
            "Point_init"
        );
    }

    #[test]
    fn message_handler_only_auto_gained_for_plain_concrete_classes() {
        let mut class = ClassDefinition::new(Identifier::from("Worker"), location(), None);
        assert!(class.should_auto_gain_message_handler(true));
        class.properties.is_interface = true;
        assert!(!class.should_auto_gain_message_handler(true));
    }

    #[test]
    fn cloneable_only_auto_gained_for_non_enum_messages() {
        let mut class = ClassDefinition::new(Identifier::from("Envelope"), location(), None);
        class.properties.is_message = true;
        assert!(class.should_auto_gain_cloneable(false));
        class.properties.is_enumeration = true;
        assert!(!class.should_auto_gain_cloneable(false));
    }

    #[test]
    fn transforming_into_interface_clears_data_members() {
        let mut class = ClassDefinition::new(Identifier::from("Shape"), location(), None);
        class.add_data_member(DefinitionId(7));
        class.has_constructor = true;

        class.transform_into_interface();

        assert!(class.properties.is_interface);
        assert!(class.data_members.is_empty());
        assert!(!class.has_constructor);
    }
}
