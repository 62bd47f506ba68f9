//! Drives source text all the way through `Tree::merge_source` and
//! `Tree::lower`, the same two calls the CLI driver makes, and inspects
//! the resulting arena for the shapes each lowering pass promises.

use lumenc::ast::definitions::Definition;
use lumenc::ast::expressions::Expression;
use lumenc::ast::statements::Statement;
use lumenc::common::multiphase::Identifier;
use lumenc::tree::Tree;

fn lower(source: &str) -> Tree {
    let mut tree = Tree::new();
    let top_level = tree.merge_source(source, "test.lumen").expect("merge_source");
    tree.lower(&top_level).expect("lower");
    tree
}

#[test]
fn generic_instantiation_is_shared_across_two_call_sites() {
    let source = r#"
        class List<T>(var head: T, var tail: List<T>) {}
        class Pair(var first: List<int>, var second: List<int>) {}
    "#;
    let tree = lower(source);

    let pair = tree
        .definitions
        .iter()
        .find_map(Definition::as_class)
        .filter(|class| class.name == Identifier::from("Pair"))
        .expect("Pair class");

    let first = tree.data_member(pair.data_members[0]);
    let second = tree.data_member(pair.data_members[1]);

    let first_target = first.declared_type.definition().expect("instantiated List<int>");
    let second_target = second.declared_type.definition().expect("instantiated List<int>");
    assert_eq!(first_target, second_target, "the same List<int> instantiation should be reused");

    let instantiated = tree.class(first_target);
    assert!(!instantiated.is_generic());
    assert_eq!(instantiated.data_members.len(), 2);
}

#[test]
fn enum_variants_lower_to_a_shared_tag_and_constructor_bodies() {
    let source = r#"
        enum Shape {
            Square(int),
            Rectangle(int, int),
            Point
        }
    "#;
    let tree = lower(source);
    let shape = tree
        .definitions
        .iter()
        .filter_map(Definition::as_class)
        .find(|class| class.name == Identifier::from("Shape"))
        .expect("Shape class");

    assert!(shape.data_members.iter().any(|&id| tree.data_member(id).name == Identifier::from("$tag")));
    assert!(shape.data_members.iter().any(|&id| tree.data_member(id).name == Identifier::from("$SquareTag")));
    assert!(shape.data_members.iter().any(|&id| tree.data_member(id).name == Identifier::from("$RectangleTag")));

    let square = shape
        .methods
        .iter()
        .map(|&id| tree.method(id))
        .find(|method| method.name == Identifier::from("Square"))
        .expect("Square constructor");
    let body = square.body.as_ref().expect("Square body was synthesized");
    assert!(matches!(body.statements.last(), Some(Statement::Return(Some(Expression::LocalVariableReference(_))))));
}

#[test]
fn a_function_typed_member_is_converted_to_a_generated_closure_interface() {
    let source = r#"
        class Holder {
            fun int(int) callback
        }
    "#;
    let tree = lower(source);
    let holder = tree
        .definitions
        .iter()
        .filter_map(Definition::as_class)
        .find(|class| class.name == Identifier::from("Holder"))
        .expect("Holder class");
    let callback = tree.data_member(holder.data_members[0]);

    let interface_id = callback.declared_type.definition().expect("converted to a closure interface");
    let interface = tree.class(interface_id);
    assert!(interface.properties.is_closure);
    assert!(interface.properties.is_interface);
    assert_eq!(interface.methods.len(), 1);
}

#[test]
fn defer_is_rewritten_into_an_add_closure_call_on_a_generated_defer_member() {
    let source = r#"
        class Worker {
            fun void run() {
                defer { return }
            }
        }
    "#;
    let tree = lower(source);
    let worker = tree
        .definitions
        .iter()
        .filter_map(Definition::as_class)
        .find(|class| class.name == Identifier::from("Worker"))
        .expect("Worker class");
    assert!(worker.data_members.iter().any(|&id| tree.data_member(id).name == Identifier::from("$defer")));

    let run = worker
        .methods
        .iter()
        .map(|&id| tree.method(id))
        .find(|method| method.name == Identifier::from("run"))
        .expect("run method");
    let body = run.body.as_ref().unwrap();
    match &body.statements[0] {
        Statement::Expression(Expression::MethodCall(call)) => {
            assert_eq!(call.name, Identifier::from("addClosure"));
        }
        other => panic!("expected the defer statement to rewrite to an addClosure call, got {:?}", other),
    }

    assert!(tree.definitions.iter().any(|definition| matches!(
        definition.as_class(),
        Some(class) if class.name.to_string().starts_with("$Closure$")
    )));
}

#[test]
fn a_data_member_reference_inside_a_method_body_resolves_to_this() {
    let source = r#"
        class Counter(var value: int) {
            fun int get() {
                return value
            }
        }
    "#;
    let tree = lower(source);
    let counter = tree
        .definitions
        .iter()
        .filter_map(Definition::as_class)
        .find(|class| class.name == Identifier::from("Counter"))
        .expect("Counter class");
    let get = counter
        .methods
        .iter()
        .map(|&id| tree.method(id))
        .find(|method| method.name == Identifier::from("get"))
        .expect("get method");

    let body = get.body.as_ref().unwrap();
    match &body.statements[0] {
        Statement::Return(Some(Expression::DataMemberReference { object: Some(object), member })) => {
            assert!(matches!(**object, Expression::This));
            assert_eq!(tree.data_member(*member).name, Identifier::from("value"));
        }
        other => panic!("expected a this-qualified data member reference, got {:?}", other),
    }
}

#[test]
fn a_missing_return_in_a_non_void_method_is_rejected() {
    let source = r#"
        class Broken {
            fun int get() {
                var x = 1
            }
        }
    "#;
    let mut tree = Tree::new();
    let top_level = tree.merge_source(source, "broken.lumen").expect("merge_source");
    let error = tree.lower(&top_level).expect_err("a body that never returns should be rejected");
    assert!(matches!(error.kind, lumenc::diagnostics::CompileErrorKind::MissingReturn(_)));
}
