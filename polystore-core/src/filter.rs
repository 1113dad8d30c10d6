//! The boolean filter algebra and its backend-compiler contract.
//!
//! Filters are immutable predicate trees over one entity type. The local
//! evaluator ([`Filter::matches`]) exists for validation and testing; real
//! query execution goes through each backend's [`FilterCompiler`], which
//! must produce a native query equivalent to the evaluator restricted to
//! the base-type collection and the stored type tag.

use crate::meta::{EntityMeta, PropertyMeta};
use crate::record::Record;
use crate::value::Value;
use std::cmp::Ordering;

/// Comparison operators.
///
/// Both bounds are closed: `Gt(v)` matches values `>= v` and `Lt(v)`
/// matches values `<= v`. A missing or null value matches either — null is
/// "unbounded", so comparisons never exclude it. This boundary behavior is
/// load-bearing; do not tighten it to strict inequality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Gt,
    Lt,
}

/// One node of a filter tree.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterNode {
    /// Matches everything.
    All,
    /// Matches nothing.
    None,
    /// Every child matches. Children are flattened on construction: an
    /// `And` never directly contains an `And`.
    And(Vec<FilterNode>),
    /// Any child matches. Flattened like `And`.
    Or(Vec<FilterNode>),
    /// Closed-bound comparison on a scalar property.
    Compare {
        property: PropertyMeta,
        op: Op,
        bound: Value,
    },
    /// The entity has (or, negated, has no) relation target matching the
    /// inner filter.
    HasRelation {
        property: PropertyMeta,
        inner: Box<Filter>,
        negate: bool,
    },
}

impl FilterNode {
    /// Conjunction with like-kind children flattened into one list.
    pub fn and_of(operands: Vec<FilterNode>) -> FilterNode {
        let mut children = Vec::with_capacity(operands.len());
        for operand in operands {
            match operand {
                FilterNode::And(inner) => children.extend(inner),
                other => children.push(other),
            }
        }
        FilterNode::And(children)
    }

    /// Disjunction with like-kind children flattened into one list.
    pub fn or_of(operands: Vec<FilterNode>) -> FilterNode {
        let mut children = Vec::with_capacity(operands.len());
        for operand in operands {
            match operand {
                FilterNode::Or(inner) => children.extend(inner),
                other => children.push(other),
            }
        }
        FilterNode::Or(children)
    }

    /// The structural inverse. Involutive: `n.inverse().inverse() == n`.
    pub fn inverse(&self) -> FilterNode {
        match self {
            FilterNode::All => FilterNode::None,
            FilterNode::None => FilterNode::All,
            FilterNode::And(children) => {
                FilterNode::Or(children.iter().map(FilterNode::inverse).collect())
            }
            FilterNode::Or(children) => {
                FilterNode::And(children.iter().map(FilterNode::inverse).collect())
            }
            FilterNode::Compare { property, op, bound } => FilterNode::Compare {
                property: *property,
                op: match op {
                    Op::Gt => Op::Lt,
                    Op::Lt => Op::Gt,
                },
                bound: bound.clone(),
            },
            FilterNode::HasRelation {
                property,
                inner,
                negate,
            } => FilterNode::HasRelation {
                property: *property,
                inner: inner.clone(),
                negate: !negate,
            },
        }
    }

    /// Structural search over this node and everything below it,
    /// including the inner filters of relation nodes.
    pub fn contains<F: Fn(&FilterNode) -> bool>(&self, pred: &F) -> bool {
        if pred(self) {
            return true;
        }
        match self {
            FilterNode::And(children) | FilterNode::Or(children) => {
                children.iter().any(|child| child.contains(pred))
            }
            FilterNode::HasRelation { inner, .. } => inner.node.contains(pred),
            _ => false,
        }
    }

    fn matches(&self, record: &Record, lookup: &dyn RecordLookup) -> bool {
        match self {
            FilterNode::All => true,
            FilterNode::None => false,
            FilterNode::And(children) => {
                children.iter().all(|child| child.matches(record, lookup))
            }
            FilterNode::Or(children) => children.iter().any(|child| child.matches(record, lookup)),
            FilterNode::Compare { property, op, bound } => {
                match record.value(property.name()) {
                    // Missing and null are "unbounded": never excluded.
                    None => true,
                    Some(value) if value.is_null() => true,
                    Some(value) => match (op, bound.compare(value)) {
                        (Op::Gt, Some(Ordering::Less | Ordering::Equal)) => true,
                        (Op::Lt, Some(Ordering::Greater | Ordering::Equal)) => true,
                        _ => false,
                    },
                }
            }
            FilterNode::HasRelation {
                property,
                inner,
                negate,
            } => {
                let hit = record.outgoing(property.name()).iter().any(|edge| {
                    lookup
                        .record(&edge.to_type, &edge.to_id)
                        .map(|target| inner.matches_with(&target, lookup))
                        .unwrap_or(false)
                });
                hit != *negate
            }
        }
    }
}

/// An immutable filter over one entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    meta: &'static EntityMeta,
    node: FilterNode,
}

impl Filter {
    pub fn new(meta: &'static EntityMeta, node: FilterNode) -> Self {
        Filter { meta, node }
    }

    /// Matches every instance of the type.
    pub fn all(meta: &'static EntityMeta) -> Self {
        Filter::new(meta, FilterNode::All)
    }

    /// Matches no instance.
    pub fn none(meta: &'static EntityMeta) -> Self {
        Filter::new(meta, FilterNode::None)
    }

    /// `property >= bound` (closed bound; null always matches). Panics on
    /// an unknown property name.
    pub fn gt(meta: &'static EntityMeta, property: &str, bound: impl Into<Value>) -> Self {
        Filter::new(
            meta,
            FilterNode::Compare {
                property: *meta.require_property(property),
                op: Op::Gt,
                bound: bound.into(),
            },
        )
    }

    /// `property <= bound` (closed bound; null always matches). Panics on
    /// an unknown property name.
    pub fn lt(meta: &'static EntityMeta, property: &str, bound: impl Into<Value>) -> Self {
        Filter::new(
            meta,
            FilterNode::Compare {
                property: *meta.require_property(property),
                op: Op::Lt,
                bound: bound.into(),
            },
        )
    }

    /// The entity has a target of `property` matching `inner`. Panics on a
    /// non-relation property.
    pub fn has_relation(meta: &'static EntityMeta, property: &str, inner: Filter) -> Self {
        let prop = *meta.require_property(property);
        prop.expect_relation();
        Filter::new(
            meta,
            FilterNode::HasRelation {
                property: prop,
                inner: Box::new(inner),
                negate: false,
            },
        )
    }

    /// No target of `property` matches `inner`.
    pub fn has_no_relation(meta: &'static EntityMeta, property: &str, inner: Filter) -> Self {
        Filter::has_relation(meta, property, inner).inverse()
    }

    pub fn meta(&self) -> &'static EntityMeta {
        self.meta
    }

    pub fn node(&self) -> &FilterNode {
        &self.node
    }

    /// Conjunction; nested `And`s on either side flatten into one list.
    pub fn and(self, other: Filter) -> Filter {
        Filter {
            meta: self.meta,
            node: FilterNode::and_of(vec![self.node, other.node]),
        }
    }

    /// Disjunction; nested `Or`s on either side flatten into one list.
    pub fn or(self, other: Filter) -> Filter {
        Filter {
            meta: self.meta,
            node: FilterNode::or_of(vec![self.node, other.node]),
        }
    }

    /// The structural inverse; its own inverse.
    pub fn inverse(&self) -> Filter {
        Filter {
            meta: self.meta,
            node: self.node.inverse(),
        }
    }

    /// Local, in-memory evaluation without relation resolution. Relation
    /// nodes see no targets; use [`matches_with`](Self::matches_with) when
    /// they must resolve.
    pub fn matches(&self, record: &Record) -> bool {
        self.matches_with(record, &NoLookup)
    }

    /// Local evaluation resolving relation targets through `lookup`.
    pub fn matches_with(&self, record: &Record, lookup: &dyn RecordLookup) -> bool {
        self.node.matches(record, lookup)
    }

    /// Structural search, e.g. "does this filter reference a relation?".
    pub fn contains<F: Fn(&FilterNode) -> bool>(&self, pred: F) -> bool {
        self.node.contains(&pred)
    }
}

/// Resolves the records relation filters traverse into.
pub trait RecordLookup {
    fn record(&self, type_name: &str, id: &Value) -> Option<Record>;
}

/// A lookup that resolves nothing; relation targets never match.
pub struct NoLookup;

impl RecordLookup for NoLookup {
    fn record(&self, _type_name: &str, _id: &Value) -> Option<Record> {
        None
    }
}

/// The per-backend filter compiler.
///
/// `compile` must be pure, and the native query it produces must select
/// exactly `{e | filter.matches(e)}` within the filter type's base
/// collection, additionally constrained on the stored type tag
/// ([`Record::is_instance_of`] the filter's concrete type) — all subtypes
/// share one physical collection, so a subtype filter has to narrow on the
/// tag. `All` compiles to always-true, `None` to always-false; the closed
/// [`FilterNode`] enum makes skipping a variant a compile-time error.
pub trait FilterCompiler {
    /// The backend's native query representation.
    type Native;

    fn compile(&self, filter: &Filter) -> Self::Native;
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::ScalarKind;
    use crate::record::Record;
    use proptest::prelude::*;

    static PERSON: EntityMeta = EntityMeta {
        name: "Person",
        parent: None,
        id_type: PropertyMeta::id(ScalarKind::Long),
        id_generated: true,
        properties: &[
            PropertyMeta::scalar("name", ScalarKind::Text, false),
            PropertyMeta::scalar("age", ScalarKind::Int, true),
            PropertyMeta::single_relation("spouse", person, true),
        ],
    };

    fn person() -> &'static EntityMeta {
        &PERSON
    }

    fn person_record(age: Option<i64>) -> Record {
        let mut record = Record::new(person());
        record.set_value("name", Value::Text("djuric".into()));
        if let Some(age) = age {
            record.set_value("age", Value::Int(age));
        }
        record
    }

    #[test]
    fn test_gt_closed_bound_and_null() {
        let filter = Filter::gt(person(), "age", 4);
        assert!(filter.matches(&person_record(None)), "null always matches");
        assert!(filter.matches(&person_record(Some(4))), "bound is closed");
        assert!(filter.matches(&person_record(Some(10))));
        assert!(!filter.matches(&person_record(Some(3))));
    }

    #[test]
    fn test_lt_closed_bound_and_null() {
        let filter = Filter::lt(person(), "age", 4);
        assert!(filter.matches(&person_record(None)));
        assert!(filter.matches(&person_record(Some(4))));
        assert!(filter.matches(&person_record(Some(1))));
        assert!(!filter.matches(&person_record(Some(10))));
    }

    #[test]
    fn test_compare_mismatched_kind_never_matches() {
        let filter = Filter::gt(person(), "name", 4);
        assert!(!filter.matches(&person_record(Some(3))));
    }

    #[test]
    fn test_and_flattens() {
        let f = Filter::gt(person(), "age", 1)
            .and(Filter::gt(person(), "age", 2))
            .and(Filter::lt(person(), "age", 9));
        match f.node() {
            FilterNode::And(children) => {
                assert_eq!(children.len(), 3);
                assert!(children
                    .iter()
                    .all(|c| !matches!(c, FilterNode::And(_) | FilterNode::Or(_))));
            }
            other => panic!("expected flattened And, got {other:?}"),
        }
    }

    #[test]
    fn test_or_flattens_from_either_side() {
        let left = Filter::gt(person(), "age", 4).or(Filter::gt(person(), "age", 10));
        let right = Filter::lt(person(), "age", 1).or(Filter::lt(person(), "age", 2));
        let f = left.or(right);
        match f.node() {
            FilterNode::Or(children) => assert_eq!(children.len(), 4),
            other => panic!("expected flattened Or, got {other:?}"),
        }
    }

    #[test]
    fn test_inverse_mapping() {
        assert_eq!(
            Filter::all(person()).inverse().node(),
            &FilterNode::None
        );
        assert_eq!(Filter::none(person()).inverse().node(), &FilterNode::All);

        let gt = Filter::gt(person(), "age", 4);
        match gt.inverse().node() {
            FilterNode::Compare { op, .. } => assert_eq!(*op, Op::Lt),
            other => panic!("expected Compare, got {other:?}"),
        }

        let and = Filter::gt(person(), "age", 1).and(Filter::lt(person(), "age", 9));
        match and.inverse().node() {
            FilterNode::Or(children) => assert_eq!(children.len(), 2),
            other => panic!("expected Or, got {other:?}"),
        }
    }

    #[test]
    fn test_has_relation_inverse_flips_negation() {
        let f = Filter::has_relation(person(), "spouse", Filter::all(person()));
        match f.inverse().node() {
            FilterNode::HasRelation { negate, .. } => assert!(negate),
            other => panic!("expected HasRelation, got {other:?}"),
        }
        assert_eq!(f.inverse().inverse(), f);
    }

    #[test]
    fn test_contains_finds_relation_nodes() {
        let inner = Filter::gt(person(), "age", 18);
        let f = Filter::gt(person(), "age", 1)
            .and(Filter::has_relation(person(), "spouse", inner));
        assert!(f.contains(|n| matches!(n, FilterNode::HasRelation { .. })));
        assert!(!Filter::gt(person(), "age", 1)
            .contains(|n| matches!(n, FilterNode::HasRelation { .. })));
    }

    #[test]
    fn test_scenario_query_bounds() {
        // age 3 fails GT(4) OR GT(10); age 10 satisfies it.
        let filter = Filter::gt(person(), "age", 4).or(Filter::gt(person(), "age", 10));
        assert!(!filter.matches(&person_record(Some(3))));
        assert!(filter.matches(&person_record(Some(10))));
    }

    // --- property-based checks -------------------------------------------

    fn arb_node() -> impl Strategy<Value = FilterNode> {
        let leaf = prop_oneof![
            Just(FilterNode::All),
            Just(FilterNode::None),
            (any::<i64>(), any::<bool>()).prop_map(|(bound, gt)| FilterNode::Compare {
                property: *PERSON.properties.iter().find(|p| p.name() == "age").unwrap(),
                op: if gt { Op::Gt } else { Op::Lt },
                bound: Value::Int(bound),
            }),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(FilterNode::and_of),
                prop::collection::vec(inner, 0..4).prop_map(FilterNode::or_of),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_double_inverse_is_structural_identity(node in arb_node()) {
            prop_assert_eq!(node.inverse().inverse(), node);
        }

        #[test]
        fn prop_double_inverse_evaluates_identically(node in arb_node(), age in proptest::option::of(any::<i64>())) {
            let filter = Filter::new(person(), node);
            let record = person_record(age);
            prop_assert_eq!(
                filter.matches(&record),
                filter.inverse().inverse().matches(&record)
            );
        }

        #[test]
        fn prop_constructed_trees_stay_flat(node in arb_node()) {
            fn flat(n: &FilterNode) -> bool {
                match n {
                    FilterNode::And(children) => children
                        .iter()
                        .all(|c| !matches!(c, FilterNode::And(_)) && flat(c)),
                    FilterNode::Or(children) => children
                        .iter()
                        .all(|c| !matches!(c, FilterNode::Or(_)) && flat(c)),
                    _ => true,
                }
            }
            prop_assert!(flat(&node));
        }
    }
}
