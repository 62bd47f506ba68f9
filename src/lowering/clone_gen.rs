//! Generates the copy constructor and `clone()` method a message class
//! needs to cross a process boundary by value instead of by reference.
//!
//! Each data member is copied according to its own kind: primitives and
//! enumerations (value types) are assigned directly; reference-typed
//! members recurse through their own `clone()`. A concrete base class
//! (other than `object`) has its copy constructor chained first, mirroring
//! ordinary constructor chaining.

use crate::ast::definitions::MethodDefinition;
use crate::ast::expressions::{BinaryOperator, Expression, HeapAllocation, MethodCall};
use crate::ast::statements::{Block, ConstructorCallStatement, ConstructorCallTarget, Statement};
use crate::diagnostics::SourceLocation;
use crate::model::bindings::NameBindings;
use crate::model::ids::DefinitionId;
use crate::model::types::{BuiltInKind, Type};
use crate::tree::Tree;

/// `other.member`: a field read off the synthesized `other` parameter,
/// which (like every constructor argument) is itself a `DataMember`
/// reference with no receiver object.
fn parameter_member_access(other_param: DefinitionId, member: DefinitionId) -> Expression {
    Expression::DataMemberReference {
        object: Some(Box::new(Expression::DataMemberReference { object: None, member: other_param })),
        member,
    }
}

fn this_member_access(member: DefinitionId) -> Expression {
    Expression::DataMemberReference {
        object: Some(Box::new(Expression::This)),
        member,
    }
}

fn assign(target: Expression, value: Expression) -> Statement {
    Statement::Expression(Expression::Binary {
        operator: BinaryOperator::Assign,
        left: Box::new(target),
        right: Box::new(value),
        result_type: None,
    })
}

fn clone_call(receiver: Expression) -> Expression {
    Expression::MethodCall(MethodCall {
        receiver: Some(Box::new(receiver)),
        name: crate::common::multiphase::Identifier::from("clone"),
        arguments: Vec::new(),
        resolved_method: None,
        result_type: None,
    })
}

/// The per-member copy statements shared by both the ordinary
/// reference-class copy constructor and an enumeration's value copy:
/// primitive and enumeration members copy by value, everything else
/// recurses through `clone()`.
fn copy_member_statements(tree: &Tree, class_id: DefinitionId, other_param: DefinitionId) -> Vec<Statement> {
    tree.class(class_id)
        .data_members
        .iter()
        .map(|&member_id| {
            let declared_type = tree.data_member(member_id).declared_type.clone();
            let source = parameter_member_access(other_param, member_id);
            let value = if declared_type.is_primitive() || declared_type.is_enumeration() {
                source
            } else {
                clone_call(source)
            };
            assign(this_member_access(member_id), value)
        })
        .collect()
}

/// Builds the copy constructor and `clone()` method for a concrete message
/// class, chaining the base class's own copy constructor first unless the
/// base is `object`.
pub fn generate_clone_and_copy_constructor(tree: &mut Tree, class_id: DefinitionId) {
    let class_name = tree.class(class_id).name.clone();
    let self_type = {
        let mut ty = Type::named(class_name.clone());
        ty.set_definition(class_id, false, false);
        ty
    };
    let other_param = tree.declare_data_member(class_id, "other", self_type.clone());

    let mut statements = Vec::new();
    if let Some(base_id) = tree.class(class_id).base_class {
        if base_id != tree.object_class {
            statements.push(Statement::ConstructorCall(ConstructorCallStatement {
                target: ConstructorCallTarget::Base(base_id),
                arguments: vec![Expression::DataMemberReference { object: None, member: other_param }],
            }));
        }
    }
    statements.extend(copy_member_statements(tree, class_id, other_param));

    let ctor_id = declare_constructor(tree, class_id, &class_name, other_param, statements);
    declare_clone_method(tree, class_id, &class_name, self_type, ctor_id);
}

/// As `generate_clone_and_copy_constructor`, but never chains a base copy
/// constructor: value-typed enumerations have no concrete base to chain.
pub fn generate_deep_copy(tree: &mut Tree, class_id: DefinitionId) {
    let class_name = tree.class(class_id).name.clone();
    let mut self_type = Type::named(class_name.clone());
    self_type.set_definition(class_id, true, false);
    let other_param = tree.declare_data_member(class_id, "other", self_type.clone());

    let statements = copy_member_statements(tree, class_id, other_param);
    let ctor_id = declare_constructor(tree, class_id, &class_name, other_param, statements);
    declare_clone_method(tree, class_id, &class_name, self_type, ctor_id);
}

fn declare_constructor(
    tree: &mut Tree,
    class_id: DefinitionId,
    class_name: &crate::common::multiphase::Identifier,
    other_param: DefinitionId,
    statements: Vec<Statement>,
) -> DefinitionId {
    let mut body = Block::new(NameBindings::new());
    for statement in statements {
        body.add_statement(statement);
    }

    let mut ctor = MethodDefinition::new(MethodDefinition::constructor_name(class_name), SourceLocation::generated(), class_id, Type::built_in(BuiltInKind::Void));
    ctor.arguments = vec![other_param];
    ctor.is_constructor = true;
    ctor.is_generated = true;
    ctor.body = Some(body);
    ctor.has_been_type_checked_and_transformed = true;

    let ctor_id = tree.alloc_method(ctor);
    tree.class_mut(class_id).add_method(ctor_id);
    ctor_id
}

fn declare_clone_method(tree: &mut Tree, class_id: DefinitionId, class_name: &crate::common::multiphase::Identifier, self_type: Type, ctor_id: DefinitionId) {
    let constructor_call = Expression::MethodCall(MethodCall {
        receiver: None,
        name: MethodDefinition::constructor_name(class_name),
        arguments: vec![Expression::This],
        resolved_method: Some(ctor_id),
        result_type: None,
    });
    let allocation = Expression::New(HeapAllocation {
        class_name: class_name.clone(),
        generic_type_arguments: Vec::new(),
        constructor_call: Box::new(constructor_call),
        result_type: Some(self_type.clone()),
    });

    let mut body = Block::new(NameBindings::new());
    body.add_statement(Statement::Return(Some(allocation)));

    let mut clone_method = MethodDefinition::new(crate::common::multiphase::Identifier::from("clone"), SourceLocation::generated(), class_id, self_type);
    clone_method.body = Some(body);
    clone_method.is_generated = true;
    clone_method.has_been_type_checked_and_transformed = true;

    let method_id = tree.alloc_method(clone_method);
    tree.class_mut(class_id).add_method(method_id);
}
