//! # The Type Model
//!
//! Every type used during and after type-checking is represented by a
//! single `Type` record: a built-in kind, an optional reference to the
//! class it names, its generic type arguments, an optional function
//! signature, and the `constant`/`reference`/`array` flags.
//!
//! Type equality, initializability, assignability, and the conversion
//! tables below are the load-bearing algorithms of the whole compiler:
//! every later pass asks `Type` whether two values are compatible rather
//! than re-deriving the rule itself.

use std::fmt;

use crate::common::multiphase::Identifier;
use crate::model::ids::DefinitionId;

/// The built-in type kinds. `long` is accepted by the lexer and the parser
/// but, per the open question this is grounded on, is treated identically
/// to `Int` in every conversion and equality rule below until a caller
/// demonstrates it needs its own width.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum BuiltInKind {
    NotBuiltIn,
    Void,
    Null,
    Placeholder,
    Object,
    Implicit,
    Byte,
    Char,
    Int,
    Long,
    Float,
    Bool,
    String,
    Lambda,
    Function,
    Enumeration,
}

impl BuiltInKind {
    /// Built-in kinds that are heap references by default, mirroring
    /// `Type::isReferenceType` in the original.
    fn defaults_to_reference(self) -> bool {
        matches!(
            self,
            BuiltInKind::String | BuiltInKind::Lambda | BuiltInKind::Function | BuiltInKind::Object
        )
    }
}

/// A method or closure/function-type signature: an ordered argument list
/// and a return type.
#[derive(Clone, Debug, PartialEq)]
pub struct FunctionSignature {
    pub return_type: Box<Type>,
    pub arguments: Vec<Type>,
}

impl FunctionSignature {
    pub fn new(return_type: Type, arguments: Vec<Type>) -> Self {
        Self {
            return_type: Box::new(return_type),
            arguments,
        }
    }

    /// Structural signature equality, used both for `fun` type equality and
    /// for checking a closure's `call` method implements its interface.
    pub fn equals(&self, other: &FunctionSignature) -> bool {
        Type::equals(&self.return_type, &other.return_type, true)
            && self.arguments.len() == other.arguments.len()
            && self
                .arguments
                .iter()
                .zip(other.arguments.iter())
                .all(|(a, b)| Type::equals(a, b, true))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Type {
    kind: BuiltInKind,
    name: Identifier,
    generic_type_arguments: Vec<Type>,
    function_signature: Option<FunctionSignature>,
    definition: Option<DefinitionId>,
    constant: bool,
    reference: bool,
    array: bool,
}

impl Type {
    /// Build a fresh built-in type. Mirrors `Type::create(BuiltInType)`.
    pub fn built_in(kind: BuiltInKind) -> Self {
        let name = Identifier::from(match kind {
            BuiltInKind::Void => "void",
            BuiltInKind::Null => "null",
            BuiltInKind::Placeholder => "_",
            BuiltInKind::Implicit => "var",
            BuiltInKind::Byte => "byte",
            BuiltInKind::Char => "char",
            BuiltInKind::Int => "int",
            BuiltInKind::Long => "long",
            BuiltInKind::Float => "float",
            BuiltInKind::Bool => "bool",
            BuiltInKind::String => "string",
            BuiltInKind::Lambda => "lambda",
            BuiltInKind::Function => "fun",
            BuiltInKind::Object => "object",
            BuiltInKind::Enumeration | BuiltInKind::NotBuiltIn => "",
        });
        Self {
            kind,
            reference: kind.defaults_to_reference(),
            constant: true,
            array: false,
            name,
            generic_type_arguments: Vec::new(),
            function_signature: None,
            definition: None,
        }
    }

    /// Build a type from a source-level name: resolves the built-in
    /// keywords (`var` maps to `Implicit`); anything else starts out
    /// `NotBuiltIn` until a later pass resolves it against a class
    /// definition. Mirrors `Type::create(const Identifier&)`.
    pub fn named(name: Identifier) -> Self {
        match name.0.as_ref() {
            "void" => Self::built_in(BuiltInKind::Void),
            "var" => Self::built_in(BuiltInKind::Implicit),
            "byte" => Self::built_in(BuiltInKind::Byte),
            "char" => Self::built_in(BuiltInKind::Char),
            "int" => Self::built_in(BuiltInKind::Int),
            "long" => Self::built_in(BuiltInKind::Long),
            "float" => Self::built_in(BuiltInKind::Float),
            "bool" => Self::built_in(BuiltInKind::Bool),
            "string" => Self::built_in(BuiltInKind::String),
            "object" => Self::built_in(BuiltInKind::Object),
            _ => Self {
                kind: BuiltInKind::NotBuiltIn,
                name,
                generic_type_arguments: Vec::new(),
                function_signature: None,
                definition: None,
                constant: true,
                reference: true,
                array: false,
            },
        }
    }

    pub fn placeholder() -> Self {
        Self::built_in(BuiltInKind::Placeholder)
    }

    pub fn null() -> Self {
        Self::built_in(BuiltInKind::Null)
    }

    pub fn with_array(mut self, array: bool) -> Self {
        self.set_array(array);
        self
    }

    pub fn with_constant(mut self, constant: bool) -> Self {
        self.constant = constant;
        self
    }

    pub fn with_generic_type_arguments(mut self, args: Vec<Type>) -> Self {
        self.generic_type_arguments = args;
        self
    }

    pub fn with_function_signature(mut self, signature: FunctionSignature) -> Self {
        self.function_signature = Some(signature);
        self
    }

    pub fn set_array(&mut self, array: bool) {
        self.array = array;
        if array {
            self.reference = true;
        }
    }

    pub fn set_reference(&mut self, reference: bool) {
        self.reference = reference;
    }

    pub fn set_constant(&mut self, constant: bool) {
        self.constant = constant;
    }

    /// Attach the class this type names. Enumeration classes flip the
    /// built-in kind to `Enumeration` and, unless arrayed, make the type a
    /// value rather than a reference; enum *variant* classes are always
    /// value types. Mirrors `Type::setDefinition`.
    pub fn set_definition(&mut self, id: DefinitionId, is_enumeration: bool, is_enumeration_variant: bool) {
        self.definition = Some(id);
        if is_enumeration {
            self.kind = BuiltInKind::Enumeration;
            if !self.array {
                self.reference = false;
            }
        }
        if is_enumeration_variant {
            self.reference = false;
        }
    }

    pub fn definition(&self) -> Option<DefinitionId> {
        self.definition
    }

    pub fn kind(&self) -> BuiltInKind {
        self.kind
    }

    pub fn name(&self) -> &Identifier {
        &self.name
    }

    pub fn is_constant(&self) -> bool {
        self.constant
    }

    pub fn is_reference(&self) -> bool {
        self.reference
    }

    pub fn is_array(&self) -> bool {
        self.array
    }

    pub fn is_built_in(&self) -> bool {
        self.kind != BuiltInKind::NotBuiltIn
    }

    pub fn is_void(&self) -> bool {
        self.kind == BuiltInKind::Void
    }

    pub fn is_null(&self) -> bool {
        self.kind == BuiltInKind::Null
    }

    pub fn is_placeholder(&self) -> bool {
        self.kind == BuiltInKind::Placeholder
    }

    pub fn is_object(&self) -> bool {
        self.kind == BuiltInKind::Object
    }

    pub fn is_function(&self) -> bool {
        self.kind == BuiltInKind::Function
    }

    pub fn is_enumeration(&self) -> bool {
        self.kind == BuiltInKind::Enumeration
    }

    pub fn is_number(&self) -> bool {
        matches!(
            self.kind,
            BuiltInKind::Byte | BuiltInKind::Char | BuiltInKind::Int | BuiltInKind::Long | BuiltInKind::Float
        )
    }

    pub fn is_integer_number(&self) -> bool {
        matches!(
            self.kind,
            BuiltInKind::Byte | BuiltInKind::Char | BuiltInKind::Int | BuiltInKind::Long
        )
    }

    pub fn is_boolean(&self) -> bool {
        self.kind == BuiltInKind::Bool
    }

    pub fn is_primitive(&self) -> bool {
        !self.reference && self.is_built_in() && !matches!(self.kind, BuiltInKind::Void | BuiltInKind::Null)
    }

    pub fn function_signature(&self) -> Option<&FunctionSignature> {
        self.function_signature.as_ref()
    }

    pub fn generic_type_arguments(&self) -> &[Type] {
        &self.generic_type_arguments
    }

    pub fn add_generic_type_argument(&mut self, argument: Type) {
        self.generic_type_arguments.push(argument);
    }

    pub fn has_generic_type_arguments(&self) -> bool {
        !self.generic_type_arguments.is_empty()
    }

    /// `true` for interfaces; left to the caller since `Type` alone cannot
    /// see `ClassDefinition::isInterface` without a `Tree` to resolve
    /// `definition` against. Exposed here as the hook the rest of the
    /// compiler calls through; see `tree::Tree::type_is_interface`.
    pub fn is_interface_hint(&self, is_interface: impl FnOnce(DefinitionId) -> bool) -> bool {
        self.definition.is_some_and(is_interface)
    }

    /// Deep clone, including the function signature and generic arguments.
    /// `Clone` already does this structurally; kept as a named operation to
    /// match the vocabulary of the rest of the pass driver.
    pub fn cloned(&self) -> Type {
        self.clone()
    }

    /// Structural equality ignoring `constant`. Placeholders compare equal
    /// to anything of matching arrayness. Mirrors `areEqualNoConstCheck`.
    pub fn equals(left: &Type, right: &Type, check_type_arguments: bool) -> bool {
        if left.is_placeholder() || right.is_placeholder() {
            return left.array == right.array;
        }

        if left.kind == right.kind && left.name == right.name && left.reference == right.reference && left.array == right.array {
            if left.is_function() {
                match (&left.function_signature, &right.function_signature) {
                    (Some(a), Some(b)) if !a.equals(b) => return false,
                    (Some(_), Some(_)) => {}
                    _ => return false,
                }
            }
            if check_type_arguments {
                return left.generic_type_arguments_match(right);
            }
            true
        } else {
            false
        }
    }

    fn generic_type_arguments_match(&self, other: &Type) -> bool {
        self.generic_type_arguments.len() == other.generic_type_arguments.len()
            && self
                .generic_type_arguments
                .iter()
                .zip(other.generic_type_arguments.iter())
                .all(|(a, b)| Type::equals(a, b, true))
    }

    /// `true` iff the class hierarchy `right` is convertible to `left`:
    /// identical names with matching type arguments, object accepting an
    /// interface, or subclass-of. `is_subclass_of` is supplied by the
    /// caller (typically `Tree`) because `Type` has no hierarchy traversal
    /// of its own. Mirrors `areConvertable`.
    pub fn are_convertable(left: &Type, right: &Type, is_subclass_of: impl Fn(DefinitionId, DefinitionId) -> bool) -> bool {
        if left.name == right.name && left.generic_type_arguments_match(right) {
            return true;
        }
        if left.is_object() && !right.is_object() {
            return true;
        }
        match (left.definition, right.definition) {
            (Some(left_def), Some(right_def)) => is_subclass_of(right_def, left_def),
            _ => false,
        }
    }

    /// Mirrors `areInitializable`.
    pub fn are_initializable(left: &Type, right: &Type, is_subclass_of: impl Fn(DefinitionId, DefinitionId) -> bool) -> bool {
        if left.is_placeholder() || right.is_placeholder() {
            return left.array == right.array;
        }
        if left.is_reference() && right.is_null() {
            return true;
        }

        let compatible = if left.is_enumeration() && right.is_enumeration() {
            left.name == right.name && left.generic_type_arguments_match(right)
        } else if left.is_function() && right.is_function() {
            match (&left.function_signature, &right.function_signature) {
                (Some(a), Some(b)) => a.equals(b),
                _ => false,
            }
        } else if left.is_built_in() && right.is_built_in() {
            left.kind == right.kind || Self::are_built_ins_implicitly_convertable(right.kind, left.kind)
        } else {
            Self::are_convertable(left, right, is_subclass_of)
        };

        compatible && left.array == right.array
    }

    pub fn are_assignable(left: &Type, right: &Type, is_subclass_of: impl Fn(DefinitionId, DefinitionId) -> bool) -> bool {
        !left.is_constant() && Self::are_initializable(left, right, is_subclass_of)
    }

    /// Like `are_initializable`, but additionally narrows an integer
    /// literal with value `<= 255` to `byte`. `literal_int_value` is
    /// `Some` only when the right-hand expression is an integer literal.
    pub fn is_initializable_by_expression(
        left: &Type,
        right: &Type,
        literal_int_value: Option<i64>,
        is_subclass_of: impl Fn(DefinitionId, DefinitionId) -> bool,
    ) -> bool {
        let narrowed;
        let right = match literal_int_value {
            Some(value) if (0..=255).contains(&value) => {
                narrowed = Type::built_in(BuiltInKind::Byte);
                &narrowed
            }
            _ => right,
        };
        Self::are_initializable(left, right, is_subclass_of)
    }

    /// Mirrors `isUpcast`: interface accepting an object reference counts
    /// as an upcast alongside genuine subclass-of-base relationships.
    pub fn is_upcast(&self, target: &Type, is_subclass_of: impl Fn(DefinitionId, DefinitionId) -> bool, target_is_interface: bool, self_is_interface: bool) -> bool {
        if self_is_interface && target.is_object() {
            return true;
        }
        match (self.definition, target.definition) {
            (Some(from), Some(to)) => is_subclass_of(from, to),
            _ => {
                let _ = target_is_interface;
                false
            }
        }
    }

    pub fn is_downcast(&self, target: &Type, is_subclass_of: impl Fn(DefinitionId, DefinitionId) -> bool, self_is_interface: bool, target_is_interface: bool) -> bool {
        if self.is_object() && target_is_interface {
            return true;
        }
        match (self.definition, target.definition) {
            (Some(from), Some(to)) => is_subclass_of(to, from),
            _ => {
                let _ = self_is_interface;
                false
            }
        }
    }

    /// The explicit conversion table: every implicit conversion plus the
    /// widening/narrowing reverse directions among numeric built-ins.
    /// Mirrors `areBuiltInsConvertable`.
    pub fn are_built_ins_convertable(from: BuiltInKind, to: BuiltInKind) -> bool {
        if from == to {
            return true;
        }
        use BuiltInKind::*;
        matches!(
            (from, to),
            (String, Object)
                | (Byte, Char)
                | (Byte, Int)
                | (Byte, Float)
                | (Char, Byte)
                | (Char, Int)
                | (Char, Float)
                | (Int, Byte)
                | (Int, Char)
                | (Int, Float)
                | (Long, Byte)
                | (Long, Char)
                | (Long, Int)
                | (Long, Float)
        )
    }

    /// The implicit subset of the table above, used by `are_initializable`.
    /// Mirrors `areBuiltInsImplicitlyConvertable`.
    fn are_built_ins_implicitly_convertable(from: BuiltInKind, to: BuiltInKind) -> bool {
        use BuiltInKind::*;
        matches!(
            (from, to),
            (String, Object) | (Byte, Char) | (Byte, Int) | (Byte, Float) | (Char, Byte) | (Char, Int) | (Char, Float)
        )
    }

    /// Unifies the element types of an array literal or the arms of a
    /// match. Mirrors `calculateCommonType`.
    pub fn calculate_common_type(previous: Option<&Type>, current: &Type, is_subclass_of: impl Fn(DefinitionId, DefinitionId) -> bool) -> Option<Type> {
        let previous = match previous {
            None => return Some(current.clone()),
            Some(previous) => previous,
        };

        if current.is_null() && previous.is_reference() {
            return Some(previous.clone());
        }
        if previous.is_null() && current.is_reference() {
            return Some(current.clone());
        }

        if !Self::are_initializable(previous, current, &is_subclass_of) {
            return None;
        }

        if previous.is_enumeration() && current.is_enumeration() {
            let prefers_current = previous
                .generic_type_arguments
                .iter()
                .zip(current.generic_type_arguments.iter())
                .any(|(p, c)| p.is_placeholder() && !c.is_placeholder());
            if prefers_current {
                return Some(current.clone());
            }
        }

        Some(previous.clone())
    }

    /// The generic-instantiation display name, e.g. `List<int,string>`.
    /// Mirrors `getFullConstructedName`.
    pub fn full_constructed_name(&self) -> String {
        if self.generic_type_arguments.is_empty() {
            return self.name.to_string();
        }
        let args = self
            .generic_type_arguments
            .iter()
            .map(|t| t.full_constructed_name())
            .collect::<Vec<_>>()
            .join(",");
        format!("{}<{}>", self.name, args)
    }

    /// The generated closure-interface name, e.g. `fun int(int,int)`.
    /// Mirrors `getClosureInterfaceName`.
    pub fn closure_interface_name(&self) -> String {
        let signature = self
            .function_signature
            .as_ref()
            .expect("closure_interface_name called on a non-function type");
        let args = signature
            .arguments
            .iter()
            .map(|t| t.full_constructed_name())
            .collect::<Vec<_>>()
            .join(",");
        format!("fun {}({})", signature.return_type.full_constructed_name(), args)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_constructed_name())?;
        if self.array {
            write!(f, "[]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_subclasses(_: DefinitionId, _: DefinitionId) -> bool {
        false
    }

    #[test]
    fn array_implies_reference() {
        let array_of_int = Type::built_in(BuiltInKind::Int).with_array(true);
        assert!(array_of_int.is_reference());
    }

    #[test]
    fn clone_then_equal_ignores_constant() {
        let a = Type::built_in(BuiltInKind::Int).with_constant(true);
        let b = a.cloned().with_constant(false);
        assert!(Type::equals(&a, &b, true));
    }

    #[test]
    fn placeholders_match_only_on_arrayness() {
        let placeholder_array = Type::placeholder().with_array(true);
        let int_array = Type::built_in(BuiltInKind::Int).with_array(true);
        let int_scalar = Type::built_in(BuiltInKind::Int);
        assert!(Type::equals(&placeholder_array, &int_array, true));
        assert!(!Type::equals(&placeholder_array, &int_scalar, true));
    }

    #[test]
    fn null_is_assignable_to_any_reference() {
        let string_type = Type::built_in(BuiltInKind::String);
        assert!(Type::are_initializable(&string_type, &Type::null(), no_subclasses));
    }

    #[test]
    fn byte_narrowing_applies_only_up_to_255() {
        let byte = Type::built_in(BuiltInKind::Byte);
        let int = Type::built_in(BuiltInKind::Int);
        assert!(Type::is_initializable_by_expression(&byte, &int, Some(255), no_subclasses));
        assert!(!Type::is_initializable_by_expression(&byte, &int, Some(256), no_subclasses));
    }

    #[test]
    fn string_converts_to_object_but_not_back_implicitly() {
        assert!(Type::are_built_ins_convertable(BuiltInKind::String, BuiltInKind::Object));
        assert!(!Type::are_built_ins_implicitly_convertable(BuiltInKind::Object, BuiltInKind::String));
        assert!(Type::are_built_ins_convertable(BuiltInKind::Object, BuiltInKind::String));
    }

    #[test]
    fn common_type_of_reference_and_null_is_the_reference() {
        let string_type = Type::built_in(BuiltInKind::String);
        let common = Type::calculate_common_type(Some(&string_type), &Type::null(), no_subclasses).unwrap();
        assert!(Type::equals(&common, &string_type, true));
    }

    #[test]
    fn common_type_prefers_concrete_enum_type_argument_over_placeholder() {
        let mut previous = Type::named(Identifier::from("Option")).with_array(false);
        previous.set_definition(DefinitionId(0), true, false);
        previous.add_generic_type_argument(Type::placeholder());

        let mut current = previous.clone();
        current.generic_type_arguments.clear();
        current.add_generic_type_argument(Type::built_in(BuiltInKind::Int));

        let common = Type::calculate_common_type(Some(&previous), &current, no_subclasses).unwrap();
        assert!(!common.generic_type_arguments[0].is_placeholder());
    }

    #[test]
    fn idempotent_common_type() {
        let int = Type::built_in(BuiltInKind::Int);
        let first = Type::calculate_common_type(Some(&int), &int, no_subclasses).unwrap();
        let second = Type::calculate_common_type(Some(&first), &first, no_subclasses).unwrap();
        assert!(Type::equals(&first, &second, true));
    }
}
