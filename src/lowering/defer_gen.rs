//! Rewrites a `defer { ... }` statement into a call that hands the
//! deferred block, wrapped in a generated no-argument closure, to the
//! enclosing class's `Defer` queue: `$defer.addClosure(new $Closure$N())`.

use crate::ast::definitions::{ClassProperties, MethodDefinition};
use crate::ast::expressions::{Expression, HeapAllocation, MethodCall};
use crate::ast::statements::{Block, Statement};
use crate::common::multiphase::Identifier;
use crate::diagnostics::SourceLocation;
use crate::lowering::captures;
use crate::model::bindings::NameBindings;
use crate::model::ids::DefinitionId;
use crate::model::types::{BuiltInKind, Type};
use crate::tree::Tree;

/// Lowers a `defer { ... }` statement's body into its own generated
/// no-argument closure class and returns the `addClosure` call that
/// replaces the `defer` statement. The deferred block still runs after the
/// method it was written in has returned, so any outer local or parameter
/// it reaches has to travel along as a constructor-assigned data member
/// rather than stay a name resolved against the enclosing method's scope.
pub fn lower(tree: &mut Tree, enclosing_class: DefinitionId, body: Statement) -> Statement {
    let closure_name = Identifier::from(format!("$Closure${}", tree.next_closure_id()));
    let closure_class = tree.start_class(
        closure_name.clone(),
        ClassProperties {
            is_closure: true,
            is_generated: true,
            ..Default::default()
        },
    );
    let no_arg_closure_interface = tree.no_arg_closure_interface;
    tree.class_mut(closure_class).parent_classes.push(no_arg_closure_interface);

    let captured_names = captures::free_names(&body, &[]);
    let captured_members = captures::declare_captured_members(tree, closure_class, &captured_names);

    let call_body = match body {
        Statement::Block(block) => block,
        other => {
            let mut block = Block::default();
            block.add_statement(other);
            block
        }
    };
    let call_id = tree.declare_method(closure_class, "call", Type::built_in(BuiltInKind::Void), Vec::new(), call_body);

    let class_scope = tree.build_class_scope(closure_class);
    let location = SourceLocation::generated();
    let mut call_body = tree.method_mut(call_id).body.take();
    if let Some(block) = &mut call_body {
        tree.resolve_block(block, &class_scope, &location).expect("a generated closure body only reaches names its own captures declared");
    }
    tree.method_mut(call_id).body = call_body;
    tree.method_mut(call_id).has_been_type_checked_and_transformed = true;

    let ctor_id = captures::declare_capturing_constructor(tree, closure_class, &closure_name, &captured_members);
    tree.end_class();
    tree.record_generated_root(closure_class);

    let constructor_call = Expression::MethodCall(MethodCall {
        receiver: None,
        name: MethodDefinition::constructor_name(&closure_name),
        arguments: captured_names.into_iter().map(Expression::Name).collect(),
        resolved_method: Some(ctor_id),
        result_type: None,
    });
    let allocation = Expression::New(HeapAllocation {
        class_name: closure_name,
        generic_type_arguments: Vec::new(),
        constructor_call: Box::new(constructor_call),
        result_type: None,
    });

    let defer_member = tree.ensure_defer_member(enclosing_class);
    Statement::Expression(Expression::MethodCall(MethodCall {
        receiver: Some(Box::new(Expression::DataMemberReference {
            object: Some(Box::new(Expression::This)),
            member: defer_member,
        })),
        name: Identifier::from("addClosure"),
        arguments: vec![allocation],
        resolved_method: None,
        result_type: None,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::definitions::ClassProperties as Props;

    #[test]
    fn defer_lowers_to_an_add_closure_call_on_the_defer_member() {
        let mut tree = Tree::new();
        let class_id = tree.start_class(Identifier::from("Worker"), Props::default());
        tree.end_class();

        let deferred_body = Statement::Break;
        let rewritten = lower(&mut tree, class_id, deferred_body);

        match rewritten {
            Statement::Expression(Expression::MethodCall(call)) => {
                assert_eq!(call.name, Identifier::from("addClosure"));
                assert_eq!(call.arguments.len(), 1);
            }
            other => panic!("expected a method call statement, got {:?}", other),
        }
        assert!(tree.class(class_id).data_members.iter().any(|&id| tree.data_member(id).name == Identifier::from("$defer")));

        let closure_class = tree
            .definitions
            .iter()
            .filter_map(crate::ast::definitions::Definition::as_class)
            .find(|class| class.name.to_string().starts_with("$Closure$"))
            .expect("generated closure class");
        assert!(closure_class.methods.iter().any(|&id| tree.method(id).is_constructor));
    }
}
