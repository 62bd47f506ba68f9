//! # Pattern Matching
//!
//! A `PatternNode` is the parsed shape of one `match` case or one
//! `VariableDeclarationKind::Pattern` binding. `MatchCoverage` tracks which
//! values a chain of cases has accounted for so far, and each pattern
//! contributes a comparison expression plus zero or more bindings when the
//! match engine lowers it into an `if`-tree.

use std::collections::BTreeSet;

use crate::ast::expressions::{BinaryOperator, Expression, Literal};
use crate::common::multiphase::Identifier;
use crate::model::ids::LocalId;
use crate::model::types::Type;

#[derive(Clone, Debug)]
pub enum PatternNode {
    /// `_`: matches anything, binds nothing.
    Placeholder,
    /// A boolean, numeric, or string literal compared with `==`.
    Literal(Literal),
    /// A bare name that isn't a known static data member: binds the
    /// subject (or the decomposed member) to a fresh local.
    Binding(Identifier),
    /// `[a, b, .., z]`; `wildcard_index` is the position of `..`, if any.
    Array {
        elements: Vec<PatternNode>,
        wildcard_index: Option<usize>,
    },
    /// `Point(x, y)` or, for an enum, `Some(value)`.
    ClassDecomposition {
        type_name: Identifier,
        members: Vec<(Identifier, PatternNode)>,
        enum_variant: Option<Identifier>,
    },
    /// `T name`: a type test that also binds `name` on success.
    Typed { type_name: Identifier, binding: Option<Identifier> },
}

impl PatternNode {
    /// `true` for patterns that always succeed once their subject's type
    /// has been confirmed: placeholders, plain bindings, and (recursively)
    /// class decompositions whose every member pattern is irrefutable.
    pub fn is_irrefutable(&self) -> bool {
        match self {
            PatternNode::Placeholder | PatternNode::Binding(_) => true,
            PatternNode::Typed { .. } => true,
            PatternNode::ClassDecomposition { members, enum_variant, .. } => {
                enum_variant.is_none() && members.iter().all(|(_, pattern)| pattern.is_irrefutable())
            }
            PatternNode::Literal(_) | PatternNode::Array { .. } => false,
        }
    }

    pub fn has_wildcard(&self) -> bool {
        matches!(self, PatternNode::Array { wildcard_index: Some(_), .. })
    }
}

/// The pool of cases a chain of match arms must exhaust.
#[derive(Clone, Debug)]
pub enum MatchCoverage {
    Boolean { true_remaining: bool, false_remaining: bool },
    Enumeration { remaining: BTreeSet<Identifier> },
    /// Any other subject type: only a final irrefutable pattern exhausts it.
    Opaque { exhausted: bool },
}

impl MatchCoverage {
    pub fn for_boolean() -> Self {
        MatchCoverage::Boolean {
            true_remaining: true,
            false_remaining: true,
        }
    }

    pub fn for_enumeration(variant_constructor_names: impl IntoIterator<Item = Identifier>) -> Self {
        MatchCoverage::Enumeration {
            remaining: variant_constructor_names.into_iter().collect(),
        }
    }

    pub fn opaque() -> Self {
        MatchCoverage::Opaque { exhausted: false }
    }

    pub fn is_case_covered(&self, case_name: &Identifier) -> bool {
        match self {
            MatchCoverage::Boolean { true_remaining, false_remaining } => match case_name.as_ref() {
                "true" => !true_remaining,
                "false" => !false_remaining,
                _ => false,
            },
            MatchCoverage::Enumeration { remaining } => !remaining.contains(case_name),
            MatchCoverage::Opaque { exhausted } => *exhausted,
        }
    }

    pub fn are_all_cases_covered(&self) -> bool {
        match self {
            MatchCoverage::Boolean { true_remaining, false_remaining } => !true_remaining && !false_remaining,
            MatchCoverage::Enumeration { remaining } => remaining.is_empty(),
            MatchCoverage::Opaque { exhausted } => *exhausted,
        }
    }

    pub fn mark_case_as_covered(&mut self, case_name: &Identifier) {
        match self {
            MatchCoverage::Boolean { true_remaining, false_remaining } => match case_name.as_ref() {
                "true" => *true_remaining = false,
                "false" => *false_remaining = false,
                _ => {}
            },
            MatchCoverage::Enumeration { remaining } => {
                remaining.remove(case_name);
            }
            MatchCoverage::Opaque { exhausted } => *exhausted = true,
        }
    }

    /// Marks this case's contribution to the coverage pool (the literal it
    /// matches, or the enum variant it decomposes), or, if it is
    /// irrefutable, marks the pool fully exhausted.
    fn mark_covered_by(&mut self, pattern: &PatternNode) {
        if pattern.is_irrefutable() {
            match self {
                MatchCoverage::Boolean { true_remaining, false_remaining } => {
                    *true_remaining = false;
                    *false_remaining = false;
                }
                MatchCoverage::Enumeration { remaining } => remaining.clear(),
                MatchCoverage::Opaque { exhausted } => *exhausted = true,
            }
            return;
        }
        match pattern {
            PatternNode::Literal(Literal::Bool(value)) => {
                self.mark_case_as_covered(&Identifier::from(if *value { "true" } else { "false" }));
            }
            PatternNode::ClassDecomposition { enum_variant: Some(variant), .. } => {
                self.mark_case_as_covered(variant);
            }
            _ => {}
        }
    }
}

/// `true` iff this case alone (with no guard) leaves `coverage` empty, or
/// the pattern is irrefutable.
pub fn is_match_exhaustive(pattern: &PatternNode, coverage: &mut MatchCoverage, guard_present: bool) -> bool {
    if guard_present {
        return false;
    }
    if pattern.is_irrefutable() {
        coverage.mark_covered_by(pattern);
        return true;
    }
    coverage.mark_covered_by(pattern);
    coverage.are_all_cases_covered()
}

/// A binding a pattern emits: a fresh local initialized from some access
/// path rooted at the subject (`subject`, `subject[i]`, `subject.member`,
/// or `subject.$variant.$field`).
#[derive(Clone, Debug)]
pub struct PatternBinding {
    pub local: LocalId,
    pub name: Identifier,
    pub source: Expression,
    pub declared_type: Type,
}

/// Builds the boolean comparison expression a pattern lowers to, per the
/// shape each pattern kind contributes:
/// - a literal compares the subject with `==`;
/// - an array pattern compares `subject.length()` against its element
///   count (`==` with no wildcard, `>=` with one);
/// - a class decomposition casts the subject and checks the cast succeeded
///   (or, for an enum variant, compares `subject.$tag` against the
///   variant's static tag constant);
/// - a typed pattern reduces to the same cast check.
///
/// Binding and placeholder patterns have no comparison of their own: the
/// caller should skip emitting an `if` around a case built purely from
/// irrefutable sub-patterns.
pub fn generate_comparison_expression(pattern: &PatternNode, subject: &Expression) -> Option<Expression> {
    match pattern {
        PatternNode::Placeholder | PatternNode::Binding(_) | PatternNode::Typed { .. } => None,
        PatternNode::Literal(literal) => Some(Expression::Binary {
            operator: BinaryOperator::Equal,
            left: Box::new(subject.clone()),
            right: Box::new(Expression::Literal(literal.clone())),
            result_type: None,
        }),
        PatternNode::Array { elements, wildcard_index } => {
            let length_call = Expression::MethodCall(crate::ast::expressions::MethodCall {
                receiver: Some(Box::new(subject.clone())),
                name: Identifier::from("length"),
                arguments: Vec::new(),
                resolved_method: None,
                result_type: None,
            });
            let operator = if wildcard_index.is_some() {
                BinaryOperator::GreaterThanOrEqual
            } else {
                BinaryOperator::Equal
            };
            Some(Expression::Binary {
                operator,
                left: Box::new(length_call),
                right: Box::new(Expression::Literal(Literal::Int(elements.len() as i64))),
                result_type: None,
            })
        }
        PatternNode::ClassDecomposition { enum_variant: Some(variant), .. } => {
            let tag_access = Expression::MemberSelector {
                object: Box::new(subject.clone()),
                member: Box::new(Expression::Name(Identifier::from("$tag"))),
            };
            let variant_tag = Expression::Name(Identifier::from(format!("${}Tag", variant)));
            Some(Expression::Binary {
                operator: BinaryOperator::Equal,
                left: Box::new(tag_access),
                right: Box::new(variant_tag),
                result_type: None,
            })
        }
        PatternNode::ClassDecomposition { type_name, .. } => Some(Expression::Binary {
            operator: BinaryOperator::NotEqual,
            left: Box::new(Expression::TypeCast(crate::ast::expressions::TypeCast {
                target: Type::named(type_name.clone()),
                operand: Box::new(subject.clone()),
                is_static: Some(false),
            })),
            right: Box::new(Expression::Literal(Literal::Null)),
            result_type: None,
        }),
    }
}

/// The array-index expression for element `i` of an array pattern: `i`
/// before the wildcard, `length - reverseIndex` after it.
pub fn array_element_index(i: usize, wildcard_index: Option<usize>, element_count: usize, length: Expression) -> Expression {
    match wildcard_index {
        Some(wildcard) if i > wildcard => {
            let reverse_index = element_count - i;
            Expression::Binary {
                operator: BinaryOperator::Subtract,
                left: Box::new(length),
                right: Box::new(Expression::Literal(Literal::Int(reverse_index as i64))),
                result_type: None,
            }
        }
        _ => Expression::Literal(Literal::Int(i as i64)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boolean_coverage_requires_both_arms() {
        let mut coverage = MatchCoverage::for_boolean();
        assert!(!coverage.are_all_cases_covered());
        assert!(is_match_exhaustive(&PatternNode::Literal(Literal::Bool(true)), &mut coverage, false));
        assert!(!coverage.are_all_cases_covered());
        assert!(is_match_exhaustive(&PatternNode::Literal(Literal::Bool(false)), &mut coverage, false));
        assert!(coverage.are_all_cases_covered());
    }

    #[test]
    fn enum_coverage_needs_every_variant() {
        let mut coverage = MatchCoverage::for_enumeration([Identifier::from("Some"), Identifier::from("None")]);
        let some = PatternNode::ClassDecomposition {
            type_name: Identifier::from("Option"),
            members: Vec::new(),
            enum_variant: Some(Identifier::from("Some")),
        };
        assert!(!is_match_exhaustive(&some, &mut coverage, false));
        let none = PatternNode::ClassDecomposition {
            type_name: Identifier::from("Option"),
            members: Vec::new(),
            enum_variant: Some(Identifier::from("None")),
        };
        assert!(is_match_exhaustive(&none, &mut coverage, false));
    }

    #[test]
    fn a_guard_never_makes_a_case_exhaustive() {
        let mut coverage = MatchCoverage::for_boolean();
        assert!(!is_match_exhaustive(&PatternNode::Placeholder, &mut coverage, true));
    }

    #[test]
    fn irrefutable_pattern_exhausts_opaque_coverage() {
        let mut coverage = MatchCoverage::opaque();
        assert!(is_match_exhaustive(&PatternNode::Binding(Identifier::from("x")), &mut coverage, false));
    }

    #[test]
    fn array_pattern_with_wildcard_compares_with_at_least() {
        let pattern = PatternNode::Array {
            elements: vec![PatternNode::Placeholder, PatternNode::Placeholder],
            wildcard_index: Some(1),
        };
        let comparison = generate_comparison_expression(&pattern, &Expression::Name(Identifier::from("subject"))).unwrap();
        match comparison {
            Expression::Binary { operator, .. } => assert_eq!(operator, BinaryOperator::GreaterThanOrEqual),
            other => panic!("expected a binary comparison, got {:?}", other),
        }
    }

    #[test]
    fn indices_after_the_wildcard_count_from_the_end() {
        let length = Expression::Name(Identifier::from("__match_subject_length"));
        let index = array_element_index(3, Some(1), 4, length);
        match index {
            Expression::Binary { operator, right, .. } => {
                assert_eq!(operator, BinaryOperator::Subtract);
                match *right {
                    Expression::Literal(Literal::Int(n)) => assert_eq!(n, 1),
                    other => panic!("expected a literal reverse index, got {:?}", other),
                }
            }
            other => panic!("expected a binary expression, got {:?}", other),
        }
    }
}
