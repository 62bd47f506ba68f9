//! The capture mechanism shared by `closure_gen` and `defer_gen`: a
//! generated closure's body runs inside a fresh class, detached from the
//! method it was written in, so any outer local or parameter it still
//! refers to has to come along as a constructor-assigned data member
//! instead.

use std::collections::HashSet;

use crate::ast::definitions::MethodDefinition;
use crate::ast::expressions::Expression;
use crate::ast::statements::{Block, Statement, VariableDeclarationKind};
use crate::common::multiphase::Identifier;
use crate::diagnostics::SourceLocation;
use crate::model::ids::DefinitionId;
use crate::model::types::{BuiltInKind, Type};
use crate::patterns::PatternNode;
use crate::tree::Tree;

/// The free names `body` references, in first-use order: every bare
/// `Name` it reaches that isn't one of `excluded` (the closure's own
/// parameters) or a local/label `body` declares for itself. Conservative
/// about shadowing: a name declared anywhere inside `body` is treated as
/// non-free everywhere in `body`, which only ever over-excludes, never
/// under-excludes, a genuine capture.
pub fn free_names(body: &Statement, excluded: &[Identifier]) -> Vec<Identifier> {
    let mut declared: HashSet<Identifier> = excluded.iter().cloned().collect();
    collect_declared_in_statement(body, &mut declared);

    let mut seen = HashSet::new();
    let mut free = Vec::new();
    collect_referenced_in_statement(body, &declared, &mut seen, &mut free);
    free
}

/// Declares a placeholder-typed data member per captured name and
/// registers each as a primary constructor argument, in `names`' order.
pub fn declare_captured_members(tree: &mut Tree, class_id: DefinitionId, names: &[Identifier]) -> Vec<DefinitionId> {
    names
        .iter()
        .map(|name| {
            let member_id = tree.declare_data_member(class_id, name.as_ref(), Type::built_in(BuiltInKind::Placeholder));
            tree.class_mut(class_id).add_primary_ctor_arg_data_member(member_id);
            member_id
        })
        .collect()
}

/// Builds `class_name`'s constructor: one argument per entry in
/// `captured_members`, each assigned straight into the matching data
/// member. Mirrors `clone_gen::declare_constructor`'s idiom of building an
/// already-resolved body directly rather than deferring to name
/// resolution, since every expression here is synthesized, not authored.
pub fn declare_capturing_constructor(tree: &mut Tree, class_id: DefinitionId, class_name: &Identifier, captured_members: &[DefinitionId]) -> DefinitionId {
    let mut body = Block::default();
    let mut arguments = Vec::with_capacity(captured_members.len());

    for &member_id in captured_members {
        let name = tree.data_member(member_id).name.clone();
        let declared_type = tree.data_member(member_id).declared_type.clone();
        let argument_id = tree.declare_data_member(class_id, name.as_ref(), declared_type);
        body.add_statement(Statement::Expression(Expression::Binary {
            operator: crate::ast::expressions::BinaryOperator::Assign,
            left: Box::new(Expression::DataMemberReference {
                object: Some(Box::new(Expression::This)),
                member: member_id,
            }),
            right: Box::new(Expression::DataMemberReference { object: None, member: argument_id }),
            result_type: None,
        }));
        arguments.push(argument_id);
    }

    let mut ctor = MethodDefinition::new(MethodDefinition::constructor_name(class_name), SourceLocation::generated(), class_id, Type::built_in(BuiltInKind::Void));
    ctor.arguments = arguments;
    ctor.is_constructor = true;
    ctor.is_generated = true;
    ctor.body = Some(body);
    ctor.has_been_type_checked_and_transformed = true;

    let ctor_id = tree.alloc_method(ctor);
    tree.class_mut(class_id).add_method(ctor_id);
    ctor_id
}

fn collect_declared_in_statement(statement: &Statement, declared: &mut HashSet<Identifier>) {
    match statement {
        Statement::Block(block) => {
            for statement in &block.statements {
                collect_declared_in_statement(statement, declared);
            }
        }
        Statement::VarDeclaration(declaration) => {
            declared.insert(declaration.name.clone());
            if let VariableDeclarationKind::Pattern(pattern) = &declaration.kind {
                collect_declared_in_pattern(pattern, declared);
            }
            if let Some(initializer) = &declaration.initializer {
                collect_declared_in_expression(initializer, declared);
            }
        }
        Statement::If(if_statement) => {
            collect_declared_in_statement(&if_statement.then_branch, declared);
            if let Some(else_branch) = &if_statement.else_branch {
                collect_declared_in_statement(else_branch, declared);
            }
        }
        Statement::While(while_statement) => collect_declared_in_statement(&while_statement.body, declared),
        Statement::For(for_statement) => collect_declared_in_statement(&for_statement.body, declared),
        Statement::Defer(defer_statement) => collect_declared_in_statement(&defer_statement.body, declared),
        Statement::Expression(expression) => collect_declared_in_expression(expression, declared),
        Statement::Return(Some(expression)) => collect_declared_in_expression(expression, declared),
        Statement::Return(None) | Statement::ConstructorCall(_) | Statement::Label(_) | Statement::Goto(_) | Statement::Break | Statement::Continue => {}
    }
}

fn collect_declared_in_pattern(pattern: &PatternNode, declared: &mut HashSet<Identifier>) {
    match pattern {
        PatternNode::Binding(name) => {
            declared.insert(name.clone());
        }
        PatternNode::Typed { binding: Some(name), .. } => {
            declared.insert(name.clone());
        }
        PatternNode::Array { elements, .. } => {
            for element in elements {
                collect_declared_in_pattern(element, declared);
            }
        }
        PatternNode::ClassDecomposition { members, .. } => {
            for (_, member_pattern) in members {
                collect_declared_in_pattern(member_pattern, declared);
            }
        }
        PatternNode::Placeholder | PatternNode::Literal(_) | PatternNode::Typed { binding: None, .. } => {}
    }
}

/// Only needs to walk into expression forms that carry their own nested
/// statement/pattern bodies; plain value expressions (binary, calls,
/// casts, ...) declare nothing, so they're left to the referenced-name
/// walk below.
fn collect_declared_in_expression(expression: &Expression, declared: &mut HashSet<Identifier>) {
    match expression {
        Expression::Lambda(lambda) => {
            declared.extend(lambda.parameters.iter().cloned());
            collect_declared_in_statement(&lambda.body, declared);
        }
        Expression::AnonymousFunction(anonymous) => {
            declared.extend(anonymous.parameters.iter().cloned());
        }
        Expression::Match(match_expression) => {
            for case in &match_expression.cases {
                collect_declared_in_pattern(&case.pattern, declared);
                collect_declared_in_statement(&case.body, declared);
            }
        }
        _ => {}
    }
}

fn collect_referenced_in_statement(statement: &Statement, declared: &HashSet<Identifier>, seen: &mut HashSet<Identifier>, free: &mut Vec<Identifier>) {
    match statement {
        Statement::Block(block) => {
            for statement in &block.statements {
                collect_referenced_in_statement(statement, declared, seen, free);
            }
        }
        Statement::VarDeclaration(declaration) => {
            if let Some(initializer) = &declaration.initializer {
                collect_referenced_in_expression(initializer, declared, seen, free);
            }
        }
        Statement::Expression(expression) => collect_referenced_in_expression(expression, declared, seen, free),
        Statement::If(if_statement) => {
            collect_referenced_in_expression(&if_statement.condition, declared, seen, free);
            collect_referenced_in_statement(&if_statement.then_branch, declared, seen, free);
            if let Some(else_branch) = &if_statement.else_branch {
                collect_referenced_in_statement(else_branch, declared, seen, free);
            }
        }
        Statement::While(while_statement) => {
            collect_referenced_in_expression(&while_statement.condition, declared, seen, free);
            collect_referenced_in_statement(&while_statement.body, declared, seen, free);
        }
        Statement::For(for_statement) => {
            collect_referenced_in_expression(&for_statement.iterable, declared, seen, free);
            collect_referenced_in_statement(&for_statement.body, declared, seen, free);
        }
        Statement::Return(Some(expression)) => collect_referenced_in_expression(expression, declared, seen, free),
        Statement::Defer(defer_statement) => collect_referenced_in_statement(&defer_statement.body, declared, seen, free),
        Statement::ConstructorCall(call) => {
            for argument in &call.arguments {
                collect_referenced_in_expression(argument, declared, seen, free);
            }
        }
        Statement::Return(None) | Statement::Label(_) | Statement::Goto(_) | Statement::Break | Statement::Continue => {}
    }
}

fn collect_referenced_in_expression(expression: &Expression, declared: &HashSet<Identifier>, seen: &mut HashSet<Identifier>, free: &mut Vec<Identifier>) {
    match expression {
        Expression::Name(name) => {
            if !declared.contains(name) && seen.insert(name.clone()) {
                free.push(name.clone());
            }
        }
        Expression::MethodCall(call) => {
            if let Some(receiver) = &call.receiver {
                collect_referenced_in_expression(receiver, declared, seen, free);
            }
            for argument in &call.arguments {
                collect_referenced_in_expression(argument, declared, seen, free);
            }
        }
        Expression::New(allocation) => collect_referenced_in_expression(&allocation.constructor_call, declared, seen, free),
        Expression::NewArray(allocation) => {
            collect_referenced_in_expression(&allocation.capacity, declared, seen, free);
            if let Some(elements) = &allocation.literal_elements {
                for element in elements {
                    collect_referenced_in_expression(element, declared, seen, free);
                }
            }
        }
        Expression::Subscript(subscript) => {
            collect_referenced_in_expression(&subscript.array, declared, seen, free);
            collect_referenced_in_expression(&subscript.index, declared, seen, free);
        }
        Expression::TypeCast(cast) => collect_referenced_in_expression(&cast.operand, declared, seen, free),
        Expression::Binary { left, right, .. } => {
            collect_referenced_in_expression(left, declared, seen, free);
            collect_referenced_in_expression(right, declared, seen, free);
        }
        Expression::Unary { operand, .. } => collect_referenced_in_expression(operand, declared, seen, free),
        Expression::Lambda(lambda) => collect_referenced_in_statement(&lambda.body, declared, seen, free),
        Expression::AnonymousFunction(anonymous) => collect_referenced_in_statement(&anonymous.body, declared, seen, free),
        Expression::Match(match_expression) => {
            collect_referenced_in_expression(&match_expression.subject, declared, seen, free);
            for case in &match_expression.cases {
                if let Some(guard) = &case.guard {
                    collect_referenced_in_expression(guard, declared, seen, free);
                }
                collect_referenced_in_statement(&case.body, declared, seen, free);
            }
        }
        Expression::MemberSelector { object, .. } => collect_referenced_in_expression(object, declared, seen, free),
        Expression::WrappedStatement(wrapped) => collect_referenced_in_statement(&wrapped.statement, declared, seen, free),
        Expression::Literal(_)
        | Expression::LocalVariableReference(_)
        | Expression::DataMemberReference { .. }
        | Expression::Yield(_)
        | Expression::Temporary(_)
        | Expression::This => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::statements::VariableDeclaration;
    use crate::model::ids::LocalId;

    #[test]
    fn a_bare_reference_to_an_outer_name_is_captured() {
        let body = Statement::Expression(Expression::Binary {
            operator: crate::ast::expressions::BinaryOperator::Add,
            left: Box::new(Expression::Name(Identifier::from("total"))),
            right: Box::new(Expression::Literal(crate::ast::expressions::Literal::Int(1))),
            result_type: None,
        });

        assert_eq!(free_names(&body, &[]), vec![Identifier::from("total")]);
    }

    #[test]
    fn a_locally_declared_name_is_not_captured() {
        let mut block = Block::default();
        block.add_statement(Statement::VarDeclaration(VariableDeclaration {
            local: LocalId::at(0),
            name: Identifier::from("total"),
            kind: VariableDeclarationKind::Implicit,
            initializer: Some(Expression::Literal(crate::ast::expressions::Literal::Int(0))),
            constant: false,
            resolved_type: None,
        }));
        block.add_statement(Statement::Expression(Expression::Name(Identifier::from("total"))));

        assert!(free_names(&Statement::Block(block), &[]).is_empty());
    }

    #[test]
    fn a_closures_own_parameter_is_excluded() {
        let body = Statement::Expression(Expression::Name(Identifier::from("x")));
        assert!(free_names(&body, &[Identifier::from("x")]).is_empty());
    }
}
