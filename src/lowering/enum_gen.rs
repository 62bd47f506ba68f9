//! Lowers an enumeration's parsed variant constructors (plain static
//! methods returning the enum's own type, built by the parser) into the
//! tagged-union shape a variant actually needs at runtime: a `$tag`
//! discriminant, one `$<Variant>Tag` constant per variant, a nested
//! `$<Variant>Data` class holding that variant's own fields, and one
//! `$<Variant>` instance member per variant pointing at that payload
//! (null on every instance but the one whose tag matches).
//!
//! A variant's fields get their own class instead of sharing positional
//! slots across variants: two variants with a field at the same position
//! but different types used to share one slot, typed after whichever
//! variant's constructor ran first and silently wrong for the other.

use crate::ast::definitions::ClassProperties;
use crate::ast::expressions::{BinaryOperator, Expression, HeapAllocation, Literal, MethodCall};
use crate::ast::statements::{Block, Statement, VariableDeclaration, VariableDeclarationKind};
use crate::ast::definitions::MethodDefinition;
use crate::common::multiphase::Identifier;
use crate::model::bindings::NameBindings;
use crate::model::ids::DefinitionId;
use crate::model::types::{BuiltInKind, Type};
use crate::tree::Tree;

fn assign(target: Expression, value: Expression) -> Statement {
    Statement::Expression(Expression::Binary {
        operator: BinaryOperator::Assign,
        left: Box::new(target),
        right: Box::new(value),
        result_type: None,
    })
}

pub fn generate(tree: &mut Tree, class_id: DefinitionId) {
    if !tree.class(class_id).properties.is_enumeration {
        return;
    }

    let variant_ids = tree
        .class(class_id)
        .methods
        .iter()
        .copied()
        .filter(|&id| tree.method(id).is_enum_constructor)
        .collect::<Vec<_>>();
    if variant_ids.is_empty() {
        return;
    }

    let tag_member = tree.declare_data_member(class_id, "$tag", Type::built_in(BuiltInKind::Int));
    tree.class_mut(class_id).add_data_member(tag_member);

    let class_name = tree.class(class_id).name.clone();
    let mut self_type = Type::named(class_name);
    self_type.set_definition(class_id, true, false);

    for (tag, &variant_id) in variant_ids.iter().enumerate() {
        let variant_name = tree.method(variant_id).name.clone();
        let arguments = tree.method(variant_id).arguments.clone();

        let tag_constant = tree.declare_data_member(class_id, &format!("${}Tag", variant_name), Type::built_in(BuiltInKind::Int));
        tree.data_member_mut(tag_constant).is_static = true;
        tree.data_member_mut(tag_constant).initializer = Some(Expression::Literal(Literal::Int(tag as i64)));
        tree.class_mut(class_id).add_data_member(tag_constant);

        let data_class_name = Identifier::from(format!("${}Data", variant_name));
        let data_class_id = tree.declare_nested_class(class_id, data_class_name.clone(), ClassProperties { is_generated: true, ..Default::default() });
        let payload_members = arguments
            .iter()
            .map(|&argument_id| {
                let name = tree.data_member(argument_id).name.clone();
                let declared_type = tree.data_member(argument_id).declared_type.clone();
                let member_id = tree.declare_data_member(data_class_id, name.as_ref(), declared_type);
                tree.class_mut(data_class_id).add_data_member(member_id);
                member_id
            })
            .collect::<Vec<_>>();
        let data_ctor_id = tree.declare_no_arg_constructor(data_class_id, &data_class_name);

        let mut data_type = Type::named(data_class_name.clone());
        data_type.set_definition(data_class_id, false, false);
        let variant_member = tree.declare_data_member(class_id, &format!("${}", variant_name), data_type.clone());
        tree.class_mut(class_id).add_data_member(variant_member);

        let retval = tree.alloc_local();
        let data_local = tree.alloc_local();

        let mut body = Block::new(NameBindings::new());
        body.add_statement(Statement::VarDeclaration(VariableDeclaration {
            local: retval,
            name: Identifier::from("retval"),
            kind: VariableDeclarationKind::Typed(self_type.clone()),
            initializer: None,
            constant: false,
            resolved_type: Some(self_type.clone()),
        }));
        body.add_statement(assign(
            Expression::DataMemberReference {
                object: Some(Box::new(Expression::LocalVariableReference(retval))),
                member: tag_member,
            },
            Expression::Literal(Literal::Int(tag as i64)),
        ));

        let data_constructor_call = Expression::MethodCall(MethodCall {
            receiver: None,
            name: MethodDefinition::constructor_name(&data_class_name),
            arguments: Vec::new(),
            resolved_method: Some(data_ctor_id),
            result_type: None,
        });
        body.add_statement(Statement::VarDeclaration(VariableDeclaration {
            local: data_local,
            name: Identifier::from("data"),
            kind: VariableDeclarationKind::Typed(data_type.clone()),
            initializer: Some(Expression::New(HeapAllocation {
                class_name: data_class_name,
                generic_type_arguments: Vec::new(),
                constructor_call: Box::new(data_constructor_call),
                result_type: None,
            })),
            constant: false,
            resolved_type: Some(data_type),
        }));
        for (&payload_member, &argument_id) in payload_members.iter().zip(arguments.iter()) {
            body.add_statement(assign(
                Expression::DataMemberReference {
                    object: Some(Box::new(Expression::LocalVariableReference(data_local))),
                    member: payload_member,
                },
                Expression::DataMemberReference { object: None, member: argument_id },
            ));
        }
        body.add_statement(assign(
            Expression::DataMemberReference {
                object: Some(Box::new(Expression::LocalVariableReference(retval))),
                member: variant_member,
            },
            Expression::LocalVariableReference(data_local),
        ));
        body.add_statement(Statement::Return(Some(Expression::LocalVariableReference(retval))));

        tree.method_mut(variant_id).body = Some(body);
        tree.method_mut(variant_id).has_been_type_checked_and_transformed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::definitions::MethodDefinition as Method;
    use crate::diagnostics::SourceLocation;

    #[test]
    fn each_variant_gets_its_own_payload_class_and_slot() {
        let mut tree = Tree::new();
        let class_id = tree.start_class(Identifier::from("Shape"), ClassProperties { is_enumeration: true, ..Default::default() });

        let int_type = Type::built_in(BuiltInKind::Int);
        let circle_radius = tree.declare_data_member(class_id, "radius", int_type.clone());
        let mut circle = Method::new(Identifier::from("Circle"), SourceLocation::generated(), class_id, Type::named(Identifier::from("Shape")));
        circle.is_enum_constructor = true;
        circle.arguments = vec![circle_radius];
        let circle_id = tree.alloc_method(circle);
        tree.class_mut(class_id).add_method(circle_id);

        let square_side = tree.declare_data_member(class_id, "side", Type::built_in(BuiltInKind::Float));
        let mut square = Method::new(Identifier::from("Square"), SourceLocation::generated(), class_id, Type::named(Identifier::from("Shape")));
        square.is_enum_constructor = true;
        square.arguments = vec![square_side];
        let square_id = tree.alloc_method(square);
        tree.class_mut(class_id).add_method(square_id);

        tree.end_class();
        generate(&mut tree, class_id);

        let circle_data = tree.find_data_member(class_id, "$CircleData").is_some();
        assert!(!circle_data, "the payload class is nested, not a member of the enum itself");
        assert!(tree.class(class_id).members.iter().any(|&id| tree.class(id).name == Identifier::from("$CircleData")));
        assert!(tree.class(class_id).members.iter().any(|&id| tree.class(id).name == Identifier::from("$SquareData")));
        assert!(tree.find_data_member(class_id, "$Circle").is_some());
        assert!(tree.find_data_member(class_id, "$Square").is_some());
        assert!(tree.method(circle_id).body.is_some());
        assert!(tree.method(square_id).body.is_some());
    }
}
