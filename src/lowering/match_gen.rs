//! Lowers a `match` expression into the `if`/`else-if` chain it actually
//! runs as: one condition per refutable pattern, a binding declaration per
//! name the pattern captures, and (if any arm is a bare expression rather
//! than a block) a synthetic local the chosen arm's value is assigned
//! into.

use crate::ast::expressions::{BinaryOperator, Expression, Match, MatchCase, Subscript, TypeCast};
use crate::ast::statements::{Block, IfStatement, Statement, VariableDeclaration, VariableDeclarationKind};
use crate::common::multiphase::Identifier;
use crate::diagnostics::{CompileError, CompileErrorKind, Result as CompileResult, SourceLocation};
use crate::model::bindings::NameBindings;
use crate::model::ids::DefinitionId;
use crate::model::types::{BuiltInKind, Type};
use crate::patterns::{self, MatchCoverage, PatternNode};
use crate::tree::Tree;

pub fn lower(tree: &mut Tree, match_expression: Match, class_scope: &NameBindings, scope: &NameBindings, location: &SourceLocation) -> CompileResult<Expression> {
    let subject_type = tree.expression_type(&match_expression.subject);
    let subject_local = tree.alloc_local();
    if let Some(ty) = &subject_type {
        tree.set_local_type(subject_local, ty.clone());
    }
    let subject_declaration = Statement::VarDeclaration(VariableDeclaration {
        local: subject_local,
        name: Identifier::from("$matchSubject"),
        kind: subject_type.clone().map_or(VariableDeclarationKind::Implicit, VariableDeclarationKind::Typed),
        initializer: Some(*match_expression.subject),
        constant: true,
        resolved_type: subject_type.clone(),
    });
    let subject_reference = Expression::LocalVariableReference(subject_local);
    let subject_class = subject_type.as_ref().and_then(Type::definition);

    let yields_value = match_expression.cases.iter().any(|case| matches!(*case.body, Statement::Expression(_)));
    let result_local = tree.alloc_local();

    let mut coverage = match &subject_type {
        Some(ty) if ty.kind() == BuiltInKind::Bool => MatchCoverage::for_boolean(),
        _ => match subject_class {
            Some(class_id) if tree.class(class_id).properties.is_enumeration => MatchCoverage::for_enumeration(variant_names(tree, class_id)),
            _ => MatchCoverage::opaque(),
        },
    };

    let mut exhausted = false;
    let mut lowered_cases = Vec::with_capacity(match_expression.cases.len());
    let mut tail_types = Vec::new();

    for case in match_expression.cases {
        if exhausted {
            return Err(CompileError::new(location.clone(), CompileErrorKind::UnreachableCase));
        }

        let mut pattern = case.pattern;
        normalize_variant(tree, &mut pattern, subject_class);
        exhausted = patterns::is_match_exhaustive(&pattern, &mut coverage, case.guard.is_some());

        let case_scope = NameBindings::nested_in(scope.clone());
        let mut bindings = Vec::new();
        collect_bindings(tree, &pattern, &subject_reference, subject_type.as_ref(), &mut bindings);

        let mut case_scope = case_scope;
        let mut binding_statements = Vec::with_capacity(bindings.len());
        for (name, source, declared_type) in bindings {
            let local = tree.alloc_local();
            case_scope.insert_local_object(name.clone(), local);
            if let Some(ty) = &declared_type {
                tree.set_local_type(local, ty.clone());
            }
            binding_statements.push(Statement::VarDeclaration(VariableDeclaration {
                local,
                name,
                kind: declared_type.clone().map_or(VariableDeclarationKind::Implicit, VariableDeclarationKind::Typed),
                initializer: Some(source),
                constant: true,
                resolved_type: declared_type,
            }));
        }

        let mut condition = match (&pattern, subject_class) {
            (PatternNode::ClassDecomposition { enum_variant: Some(variant), .. }, Some(enum_class)) => tag_comparison(tree, enum_class, variant, &subject_reference),
            _ => patterns::generate_comparison_expression(&pattern, &subject_reference),
        };
        if let Some(guard) = case.guard {
            condition = Some(match condition {
                Some(pattern_condition) => Expression::Binary {
                    operator: BinaryOperator::And,
                    left: Box::new(pattern_condition),
                    right: Box::new(guard),
                    result_type: None,
                },
                None => guard,
            });
        }
        if let Some(condition) = &mut condition {
            tree.resolve_expression(condition, class_scope_or(class_scope), &case_scope, location)?;
        }

        let mut body = *case.body;
        tree.resolve_statement(&mut body, class_scope_or(class_scope), &case_scope, location)?;

        let tail_type = if yields_value {
            match &body {
                Statement::Expression(tail) => tree.expression_type(tail),
                _ => None,
            }
        } else {
            None
        };
        tail_types.push(tail_type);

        let body = if yields_value {
            match body {
                Statement::Expression(tail) => Statement::Expression(Expression::Binary {
                    operator: BinaryOperator::Assign,
                    left: Box::new(Expression::LocalVariableReference(result_local)),
                    right: Box::new(tail),
                    result_type: None,
                }),
                other => other,
            }
        } else {
            body
        };

        let mut case_block = Block::default();
        for statement in binding_statements {
            case_block.statements.push(statement);
        }
        case_block.statements.push(body);

        lowered_cases.push((condition, Statement::Block(case_block)));
    }

    if !exhausted {
        return Err(CompileError::new(location.clone(), CompileErrorKind::NonExhaustiveMatch));
    }

    let mut result_type: Option<Type> = None;
    for tail_type in tail_types.into_iter().flatten() {
        result_type = Type::calculate_common_type(result_type.as_ref(), &tail_type, |a, b| tree.is_subclass_of(a, b));
    }
    let result_type = result_type.unwrap_or_else(|| Type::built_in(BuiltInKind::Void));
    if yields_value {
        tree.set_local_type(result_local, result_type.clone());
    }

    let mut chain: Option<Statement> = None;
    for (condition, body) in lowered_cases.into_iter().rev() {
        chain = Some(match condition {
            Some(condition) => Statement::If(IfStatement {
                condition,
                then_branch: Box::new(body),
                else_branch: chain.map(Box::new),
            }),
            None => body,
        });
    }
    let chain = chain.expect("a match always has at least one case once parsed");

    let mut block = Block::default();
    block.statements.push(subject_declaration);
    if yields_value {
        block.statements.push(Statement::VarDeclaration(VariableDeclaration {
            local: result_local,
            name: Identifier::from("$matchResult"),
            kind: VariableDeclarationKind::Typed(result_type.clone()),
            initializer: None,
            constant: false,
            resolved_type: Some(result_type.clone()),
        }));
    }
    block.statements.push(chain);

    if yields_value {
        Ok(Expression::Temporary(crate::ast::expressions::Temporary {
            local: result_local,
            declaration: Box::new(Statement::Block(block)),
            inner_type: result_type,
        }))
    } else {
        Ok(Expression::WrappedStatement(crate::ast::expressions::WrappedStatement {
            statement: Box::new(Statement::Block(block)),
        }))
    }
}

/// `resolve_expression`/`resolve_statement` take `class_scope` as a plain
/// reference; this just spells out that a case's pattern bindings live in
/// `scope`, not `class_scope`, keeping the call sites above readable.
fn class_scope_or(class_scope: &NameBindings) -> &NameBindings {
    class_scope
}

/// The parser guesses every `Name(...)` pattern names an enum variant
/// constructor, since it can't yet resolve `Name` against the subject's
/// class; this corrects that guess once the subject's type is known.
fn normalize_variant(tree: &Tree, pattern: &mut PatternNode, subject_class: Option<DefinitionId>) {
    let demote = match (&*pattern, subject_class) {
        (PatternNode::ClassDecomposition { enum_variant: Some(variant), .. }, Some(class_id)) => {
            !tree.class(class_id).methods.iter().any(|&id| tree.method(id).is_enum_constructor && tree.method(id).name == *variant)
        }
        _ => false,
    };
    if demote {
        if let PatternNode::ClassDecomposition { enum_variant, .. } = pattern {
            *enum_variant = None;
        }
    }
}

/// `$tag == $<Variant>Tag`, built directly against the member ids
/// `enum_gen` declared rather than through a bare `Name` comparison: the
/// generic resolver has no notion of a static member access, only
/// instance fields reached through `this` or an explicit receiver, so a
/// synthesized reference to a variant's tag constant has to be built
/// pre-resolved like this instead of resolved after the fact.
fn tag_comparison(tree: &Tree, enum_class: DefinitionId, variant: &Identifier, subject: &Expression) -> Option<Expression> {
    let tag_member = tree.find_data_member(enum_class, "$tag")?;
    let tag_constant = tree.find_data_member(enum_class, &format!("${}Tag", variant))?;
    Some(Expression::Binary {
        operator: BinaryOperator::Equal,
        left: Box::new(Expression::DataMemberReference {
            object: Some(Box::new(subject.clone())),
            member: tag_member,
        }),
        right: Box::new(Expression::DataMemberReference { object: None, member: tag_constant }),
        result_type: None,
    })
}

fn variant_names(tree: &Tree, enum_class: DefinitionId) -> Vec<Identifier> {
    tree.class(enum_class)
        .methods
        .iter()
        .copied()
        .filter(|&id| tree.method(id).is_enum_constructor)
        .map(|id| tree.method(id).name.clone())
        .collect()
}

/// Walks `pattern` collecting the `(name, source expression, declared
/// type)` triples it binds, `source` rooted at `subject`. Shared enum
/// payload storage (`$0`, `$1`, ...) is looked up directly on the
/// subject's class; a future per-variant payload class only changes where
/// this looks those fields up, not this function's shape.
fn collect_bindings(tree: &mut Tree, pattern: &PatternNode, subject: &Expression, subject_type: Option<&Type>, bindings: &mut Vec<(Identifier, Expression, Option<Type>)>) {
    match pattern {
        PatternNode::Placeholder | PatternNode::Literal(_) => {}
        PatternNode::Binding(name) => {
            bindings.push((name.clone(), subject.clone(), subject_type.cloned()));
        }
        PatternNode::Typed { type_name, binding } => {
            let target_class = tree.global_bindings.lookup_type(type_name);
            let mut target_type = Type::named(type_name.clone());
            if let Some(class_id) = target_class {
                let properties = tree.class(class_id).properties;
                target_type.set_definition(class_id, properties.is_enumeration, properties.is_enumeration_variant);
            }
            let cast = Expression::TypeCast(TypeCast {
                target: target_type.clone(),
                operand: Box::new(subject.clone()),
                is_static: Some(false),
            });
            if let Some(name) = binding {
                bindings.push((name.clone(), cast, Some(target_type)));
            }
        }
        PatternNode::Array { elements, wildcard_index } => {
            let length_call = Expression::MethodCall(crate::ast::expressions::MethodCall {
                receiver: Some(Box::new(subject.clone())),
                name: Identifier::from("length"),
                arguments: Vec::new(),
                resolved_method: None,
                result_type: Some(Type::built_in(BuiltInKind::Int)),
            });
            for (index, element) in elements.iter().enumerate() {
                let index_expr = patterns::array_element_index(index, *wildcard_index, elements.len(), length_call.clone());
                let element_source = Expression::Subscript(Subscript {
                    array: Box::new(subject.clone()),
                    index: Box::new(index_expr),
                    element_type: None,
                });
                collect_bindings(tree, element, &element_source, None, bindings);
            }
        }
        PatternNode::ClassDecomposition {
            type_name: _,
            members,
            enum_variant: Some(variant),
        } => {
            // `enum_gen` stores a variant's fields on a nested
            // `$<Variant>Data` instance reached through a `$<Variant>`
            // member on the enum itself, rather than directly on the enum
            // class, so a payload field is two hops from the subject:
            // `subject.$<Variant>.<field>`.
            let enum_class = subject_type.and_then(Type::definition);
            let variant_member = enum_class.and_then(|class_id| tree.find_data_member(class_id, &format!("${}", variant)));
            let payload_access = variant_member.map(|member_id| Expression::DataMemberReference {
                object: Some(Box::new(subject.clone())),
                member: member_id,
            });
            let data_class = variant_member.and_then(|member_id| tree.data_member(member_id).declared_type.definition());
            let payload_fields = data_class.map(|class_id| tree.class(class_id).data_members.clone()).unwrap_or_default();

            for (index, (_, member_pattern)) in members.iter().enumerate() {
                let field_member = payload_fields.get(index).copied();
                let field_type = field_member.map(|id| tree.data_member(id).declared_type.clone());
                let field_access = match (&payload_access, field_member) {
                    (Some(payload), Some(member_id)) => Expression::DataMemberReference {
                        object: Some(Box::new(payload.clone())),
                        member: member_id,
                    },
                    _ => subject.clone(),
                };
                collect_bindings(tree, member_pattern, &field_access, field_type.as_ref(), bindings);
            }
        }
        PatternNode::ClassDecomposition { type_name, members, enum_variant: None } => {
            let target_class = tree.global_bindings.lookup_type(type_name);
            let mut target_type = Type::named(type_name.clone());
            if let Some(class_id) = target_class {
                let properties = tree.class(class_id).properties;
                target_type.set_definition(class_id, properties.is_enumeration, properties.is_enumeration_variant);
            }
            let cast = Expression::TypeCast(TypeCast {
                target: target_type,
                operand: Box::new(subject.clone()),
                is_static: Some(false),
            });
            let ctor_args = target_class.map(|class_id| tree.class(class_id).primary_ctor_arg_data_members.clone()).unwrap_or_default();
            for (index, (_, member_pattern)) in members.iter().enumerate() {
                let field_member = ctor_args.get(index).copied();
                let field_type = field_member.map(|id| tree.data_member(id).declared_type.clone());
                let field_access = match field_member {
                    Some(member_id) => Expression::DataMemberReference {
                        object: Some(Box::new(cast.clone())),
                        member: member_id,
                    },
                    None => cast.clone(),
                };
                collect_bindings(tree, member_pattern, &field_access, field_type.as_ref(), bindings);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::definitions::ClassProperties;
    use crate::ast::expressions::Literal;

    fn location() -> SourceLocation {
        SourceLocation::generated()
    }

    #[test]
    fn a_boolean_match_with_both_arms_lowers_to_an_if_else() {
        let mut tree = Tree::new();
        let subject = Expression::Literal(Literal::Bool(true));
        let match_expression = Match {
            subject: Box::new(subject),
            cases: vec![
                MatchCase {
                    pattern: PatternNode::Literal(Literal::Bool(true)),
                    guard: None,
                    body: Box::new(Statement::Expression(Expression::Literal(Literal::Int(1)))),
                },
                MatchCase {
                    pattern: PatternNode::Literal(Literal::Bool(false)),
                    guard: None,
                    body: Box::new(Statement::Expression(Expression::Literal(Literal::Int(2)))),
                },
            ],
            result_type: None,
        };

        let class_scope = NameBindings::new();
        let scope = NameBindings::new();
        let result = lower(&mut tree, match_expression, &class_scope, &scope, &location()).unwrap();
        assert!(matches!(result, Expression::Temporary(_)));
    }

    #[test]
    fn a_non_exhaustive_boolean_match_is_rejected() {
        let mut tree = Tree::new();
        let match_expression = Match {
            subject: Box::new(Expression::Literal(Literal::Bool(true))),
            cases: vec![MatchCase {
                pattern: PatternNode::Literal(Literal::Bool(true)),
                guard: None,
                body: Box::new(Statement::Expression(Expression::Literal(Literal::Int(1)))),
            }],
            result_type: None,
        };

        let class_scope = NameBindings::new();
        let scope = NameBindings::new();
        let err = lower(&mut tree, match_expression, &class_scope, &scope, &location()).unwrap_err();
        assert!(matches!(err.kind, CompileErrorKind::NonExhaustiveMatch));
    }

    #[test]
    fn a_case_after_an_irrefutable_binding_is_unreachable() {
        let mut tree = Tree::new();
        let match_expression = Match {
            subject: Box::new(Expression::Literal(Literal::Int(1))),
            cases: vec![
                MatchCase {
                    pattern: PatternNode::Binding(Identifier::from("x")),
                    guard: None,
                    body: Box::new(Statement::Expression(Expression::Literal(Literal::Int(1)))),
                },
                MatchCase {
                    pattern: PatternNode::Literal(Literal::Int(2)),
                    guard: None,
                    body: Box::new(Statement::Expression(Expression::Literal(Literal::Int(2)))),
                },
            ],
            result_type: None,
        };

        let class_scope = NameBindings::new();
        let scope = NameBindings::new();
        let err = lower(&mut tree, match_expression, &class_scope, &scope, &location()).unwrap_err();
        assert!(matches!(err.kind, CompileErrorKind::UnreachableCase));
    }

    #[test]
    fn enum_variant_decomposition_binds_its_payload() {
        let mut tree = Tree::new();
        let enum_class = tree.start_class(
            Identifier::from("Option"),
            ClassProperties {
                is_enumeration: true,
                ..Default::default()
            },
        );
        let mut some_ctor = crate::ast::definitions::MethodDefinition::new(Identifier::from("Some"), location(), enum_class, Type::named(Identifier::from("Option")));
        some_ctor.is_enum_constructor = true;
        let some_id = tree.alloc_method(some_ctor);
        tree.class_mut(enum_class).add_method(some_id);
        tree.end_class();

        // Mirrors the layout `enum_gen::generate` builds: a nested
        // `$SomeData` class holding the field, and a `$Some` member on
        // the enum itself pointing at it.
        let data_class = tree.declare_nested_class(enum_class, Identifier::from("$SomeData"), ClassProperties { is_generated: true, ..Default::default() });
        let payload = tree.declare_data_member(data_class, "value", Type::built_in(BuiltInKind::Int));
        tree.class_mut(data_class).add_data_member(payload);
        let mut data_type = Type::named(Identifier::from("$SomeData"));
        data_type.set_definition(data_class, false, false);
        let variant_member = tree.declare_data_member(enum_class, "$Some", data_type);
        tree.class_mut(enum_class).add_data_member(variant_member);

        let mut subject_type = Type::named(Identifier::from("Option"));
        subject_type.set_definition(enum_class, true, false);

        let pattern = PatternNode::ClassDecomposition {
            type_name: Identifier::from("Some"),
            members: vec![(Identifier::from("$0"), PatternNode::Binding(Identifier::from("value")))],
            enum_variant: Some(Identifier::from("Some")),
        };
        let mut bindings = Vec::new();
        collect_bindings(&mut tree, &pattern, &Expression::LocalVariableReference(crate::model::ids::LocalId::at(0)), Some(&subject_type), &mut bindings);

        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].0, Identifier::from("value"));
    }
}
