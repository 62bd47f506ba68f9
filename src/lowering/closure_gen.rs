//! Generates, once per distinct signature, the interface a `fun R(A,B,...)`
//! type is converted into. Every data member, argument, and return type
//! that names a function type ends up pointing at one of these instead,
//! since the back end has no first-class function types of its own:
//! closures are call-site-rewritten into an instance of a generated class
//! implementing this interface's single abstract `call` method.

use crate::ast::expressions::{AnonymousFunction, Expression, HeapAllocation, MethodCall};
use crate::ast::definitions::MethodDefinition;
use crate::common::multiphase::Identifier;
use crate::diagnostics::{Result as CompileResult, SourceLocation};
use crate::lowering::captures;
use crate::model::bindings::NameBindings;
use crate::model::ids::DefinitionId;
use crate::model::types::{FunctionSignature, Type};
use crate::tree::Tree;

/// Returns the interface class generated for `signature`, generating and
/// caching it on first use.
pub fn ensure_interface(tree: &mut Tree, signature: &FunctionSignature) -> DefinitionId {
    let key = Type::built_in(crate::model::types::BuiltInKind::Function)
        .with_function_signature(signature.clone())
        .closure_interface_name();

    if let Some(&existing) = tree.closure_interfaces.get(&key) {
        return existing;
    }

    let class_name = crate::backend_contract::mangle(&key);
    let interface_id = tree.start_class(
        Identifier::from(class_name),
        crate::ast::definitions::ClassProperties {
            is_interface: true,
            is_closure: true,
            ..Default::default()
        },
    );

    let arguments = signature
        .arguments
        .iter()
        .enumerate()
        .map(|(index, argument_type)| tree.declare_data_member(interface_id, &format!("arg{}", index), argument_type.clone()))
        .collect::<Vec<_>>();
    let call = tree.declare_abstract_method(interface_id, "call", (*signature.return_type).clone(), &arguments);
    tree.class_mut(interface_id).add_method(call);
    tree.end_class();

    tree.closure_interfaces.insert(key, interface_id);
    tree.record_generated_root(interface_id);
    interface_id
}

/// Converts an `AnonymousFunction` literal into a `new` of a freshly
/// generated class implementing its signature's closure interface: a
/// data member per name the body still reaches outside its own
/// parameters and locals, a constructor assigning them, and a `call`
/// method holding the body itself, resolved against the new class's own
/// scope so captured names become `this.name` rather than dangling
/// `Name`s.
pub fn convert_anonymous_function(
    tree: &mut Tree,
    anonymous: AnonymousFunction,
    class_scope: &NameBindings,
    scope: &NameBindings,
    location: &SourceLocation,
) -> CompileResult<Expression> {
    // No inference pass yet derives `inferred_type` from the literal's
    // assignment/argument context (see DESIGN.md), so a literal without
    // one gets a placeholder-shaped signature keyed by its arity alone.
    let signature = anonymous
        .inferred_type
        .as_ref()
        .and_then(Type::function_signature)
        .cloned()
        .unwrap_or_else(|| FunctionSignature::new(Type::built_in(crate::model::types::BuiltInKind::Placeholder), anonymous.parameters.iter().map(|_| Type::built_in(crate::model::types::BuiltInKind::Placeholder)).collect()));

    let captured_names = captures::free_names(&anonymous.body, &anonymous.parameters);

    let closure_name = Identifier::from(format!("$Closure${}", tree.next_closure_id()));
    let closure_class = tree.start_class(
        closure_name.clone(),
        crate::ast::definitions::ClassProperties {
            is_closure: true,
            is_generated: true,
            ..Default::default()
        },
    );
    let interface_id = ensure_interface(tree, &signature);
    tree.class_mut(closure_class).parent_classes.push(interface_id);

    let captured_members = captures::declare_captured_members(tree, closure_class, &captured_names);
    let call_parameters: Vec<DefinitionId> = anonymous
        .parameters
        .iter()
        .zip(signature.arguments.iter())
        .map(|(name, argument_type)| tree.declare_data_member(closure_class, name.as_ref(), argument_type.clone()))
        .collect();

    let call_body = match *anonymous.body {
        crate::ast::statements::Statement::Block(block) => block,
        other => {
            let mut block = crate::ast::statements::Block::default();
            block.add_statement(other);
            block
        }
    };
    let call_id = tree.declare_method(closure_class, "call", (*signature.return_type).clone(), call_parameters.clone(), call_body);

    let call_class_scope = tree.build_class_scope(closure_class);
    let mut call_parameter_scope = NameBindings::nested_in(call_class_scope);
    for (name, &parameter_id) in anonymous.parameters.iter().zip(&call_parameters) {
        call_parameter_scope.insert_parameter(name.clone(), parameter_id);
    }
    let mut call_body = tree.method_mut(call_id).body.take();
    if let Some(block) = &mut call_body {
        tree.resolve_block(block, &call_parameter_scope, location)?;
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
    let mut allocation = Expression::New(HeapAllocation {
        class_name: closure_name,
        generic_type_arguments: Vec::new(),
        constructor_call: Box::new(constructor_call),
        result_type: None,
    });
    tree.resolve_expression(&mut allocation, class_scope, scope, location)?;
    Ok(allocation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_same_signature_is_only_ever_generated_once() {
        let mut tree = Tree::new();
        let signature = FunctionSignature::new(Type::built_in(crate::model::types::BuiltInKind::Int), vec![Type::built_in(crate::model::types::BuiltInKind::Int)]);

        let first = ensure_interface(&mut tree, &signature);
        let second = ensure_interface(&mut tree, &signature);

        assert_eq!(first, second);
        assert!(tree.class(first).properties.is_closure);
        assert_eq!(tree.class(first).methods.len(), 1);
    }
}
