//! Declarative where-clauses.
//!
//! A [`Filter`] is what a `FilterClause` access result carries and what the
//! storage collaborator receives in [`crate::QueryArgs::where_`]. Two
//! combinators matter to the engine:
//!
//! - [`Filter::and`] merges an access filter into a storage query (logical AND).
//! - [`Filter::id_constraint`] extracts the id restrictions of the top-level
//!   conjunction so a requested id (or id set) can be narrowed in memory before
//!   any storage round trip.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

use crate::id::ItemId;
use crate::item::{value_as_id, Item};

/// A where-clause over item fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    /// Matches every item.
    All,
    Id(ItemId),
    IdNot(ItemId),
    IdIn(BTreeSet<ItemId>),
    IdNotIn(BTreeSet<ItemId>),
    Eq { field: String, value: Value },
    Ne { field: String, value: Value },
    In { field: String, values: Vec<Value> },
    /// Array membership for to-many fields, substring match for strings.
    Contains { field: String, value: Value },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Default for Filter {
    fn default() -> Self {
        Filter::All
    }
}

impl Filter {
    pub fn id(id: impl Into<ItemId>) -> Self {
        Filter::Id(id.into())
    }

    pub fn id_in<I, T>(ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<ItemId>,
    {
        Filter::IdIn(ids.into_iter().map(Into::into).collect())
    }

    pub fn id_not_in<I, T>(ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<ItemId>,
    {
        Filter::IdNotIn(ids.into_iter().map(Into::into).collect())
    }

    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn contains(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Contains {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Logical AND of two filters, flattening nested conjunctions.
    pub fn and(self, other: Filter) -> Filter {
        match (self, other) {
            (Filter::All, f) | (f, Filter::All) => f,
            (Filter::And(mut left), Filter::And(right)) => {
                left.extend(right);
                Filter::And(left)
            }
            (Filter::And(mut left), f) => {
                left.push(f);
                Filter::And(left)
            }
            (f, Filter::And(mut right)) => {
                right.insert(0, f);
                Filter::And(right)
            }
            (left, right) => Filter::And(vec![left, right]),
        }
    }

    /// Evaluate the filter against an item.
    pub fn matches(&self, item: &Item) -> bool {
        match self {
            Filter::All => true,
            Filter::Id(id) => &item.id == id,
            Filter::IdNot(id) => &item.id != id,
            Filter::IdIn(ids) => ids.contains(&item.id),
            Filter::IdNotIn(ids) => !ids.contains(&item.id),
            Filter::Eq { field, value } => item.get(field).unwrap_or(Value::Null) == *value,
            Filter::Ne { field, value } => item.get(field).unwrap_or(Value::Null) != *value,
            Filter::In { field, values } => {
                let current = item.get(field).unwrap_or(Value::Null);
                values.contains(&current)
            }
            Filter::Contains { field, value } => match (item.get(field), value) {
                (Some(Value::Array(entries)), needle) => {
                    let needle_id = value_as_id(needle);
                    entries.iter().any(|entry| {
                        entry == needle || (needle_id.is_some() && value_as_id(entry) == needle_id)
                    })
                }
                (Some(Value::String(haystack)), Value::String(needle)) => {
                    haystack.contains(needle.as_str())
                }
                _ => false,
            },
            Filter::And(filters) => filters.iter().all(|f| f.matches(item)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(item)),
            Filter::Not(inner) => !inner.matches(item),
        }
    }

    /// Id restrictions implied by the top-level conjunction.
    ///
    /// Only `Id`/`IdIn`/`IdNot`/`IdNotIn` reachable through nested `And`s are
    /// considered; other clauses can only narrow further, at the storage layer.
    pub fn id_constraint(&self) -> IdConstraint {
        let mut constraint = IdConstraint::unconstrained();
        self.collect_id_constraint(&mut constraint);
        constraint
    }

    fn collect_id_constraint(&self, constraint: &mut IdConstraint) {
        match self {
            Filter::Id(id) => constraint.restrict(std::iter::once(id.clone())),
            Filter::IdIn(ids) => constraint.restrict(ids.iter().cloned()),
            Filter::IdNot(id) => constraint.exclude(std::iter::once(id.clone())),
            Filter::IdNotIn(ids) => constraint.exclude(ids.iter().cloned()),
            Filter::And(filters) => {
                for filter in filters {
                    filter.collect_id_constraint(constraint);
                }
            }
            _ => {}
        }
    }
}

/// Allowed / disallowed id sets extracted from a filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdConstraint {
    /// `None` means any id may pass.
    allowed: Option<BTreeSet<ItemId>>,
    disallowed: BTreeSet<ItemId>,
}

impl IdConstraint {
    pub fn unconstrained() -> Self {
        Self::default()
    }

    pub fn is_unconstrained(&self) -> bool {
        self.allowed.is_none() && self.disallowed.is_empty()
    }

    fn restrict(&mut self, ids: impl IntoIterator<Item = ItemId>) {
        let incoming: BTreeSet<ItemId> = ids.into_iter().collect();
        self.allowed = Some(match self.allowed.take() {
            None => incoming,
            Some(current) => current.intersection(&incoming).cloned().collect(),
        });
    }

    fn exclude(&mut self, ids: impl IntoIterator<Item = ItemId>) {
        self.disallowed.extend(ids);
    }

    /// Could an item with this id pass the filter?
    pub fn admits(&self, id: &ItemId) -> bool {
        if self.disallowed.contains(id) {
            return false;
        }
        self.allowed
            .as_ref()
            .map(|allowed| allowed.contains(id))
            .unwrap_or(true)
    }

    /// Deduplicate `ids` (first occurrence wins) and keep the admitted ones.
    pub fn narrow(&self, ids: &[ItemId]) -> Vec<ItemId> {
        let mut seen = BTreeSet::new();
        ids.iter()
            .filter(|id| seen.insert((*id).clone()))
            .filter(|id| self.admits(id))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::FieldMap;
    use proptest::prelude::*;
    use serde_json::json;

    fn item(id: &str, fields: Value) -> Item {
        Item::new(id, fields.as_object().cloned().unwrap_or_else(FieldMap::new))
    }

    #[test]
    fn and_flattens_and_drops_all() {
        let merged = Filter::All.and(Filter::equals("a", 1));
        assert_eq!(merged, Filter::equals("a", 1));

        let merged = Filter::equals("a", 1)
            .and(Filter::equals("b", 2))
            .and(Filter::And(vec![Filter::equals("c", 3)]));
        match merged {
            Filter::And(parts) => assert_eq!(parts.len(), 3),
            other => panic!("expected conjunction, got {other:?}"),
        }
    }

    #[test]
    fn matches_field_clauses() {
        let post = item(
            "p1",
            json!({ "status": "published", "tags": ["t1", "t2"], "title": "Hello world" }),
        );

        assert!(Filter::equals("status", "published").matches(&post));
        assert!(!Filter::equals("status", "draft").matches(&post));
        assert!(Filter::equals("missing", Value::Null).matches(&post));
        assert!(Filter::contains("tags", "t2").matches(&post));
        assert!(Filter::contains("title", "world").matches(&post));
        assert!(!Filter::Not(Box::new(Filter::id("p1"))).matches(&post));
        assert!(Filter::Or(vec![Filter::id("x"), Filter::id("p1")]).matches(&post));
        assert!(Filter::In {
            field: "status".into(),
            values: vec![json!("draft"), json!("published")],
        }
        .matches(&post));
    }

    #[test]
    fn id_constraint_intersects_and_excludes() {
        let filter = Filter::id_in(["a", "b", "c"])
            .and(Filter::id_in(["b", "c", "d"]))
            .and(Filter::IdNot("c".into()))
            .and(Filter::equals("owner", "u1"));
        let constraint = filter.id_constraint();

        assert!(constraint.admits(&"b".into()));
        assert!(!constraint.admits(&"a".into()));
        assert!(!constraint.admits(&"c".into()));
        assert!(!constraint.admits(&"d".into()));
    }

    #[test]
    fn id_constraint_ignores_disjunctions() {
        let filter = Filter::Or(vec![Filter::id("a"), Filter::id("b")]);
        assert!(filter.id_constraint().is_unconstrained());
    }

    #[test]
    fn narrow_deduplicates_in_request_order() {
        let constraint = Filter::id_not_in(["b"]).id_constraint();
        let ids: Vec<ItemId> = ["c", "a", "b", "c"].into_iter().map(ItemId::from).collect();
        assert_eq!(
            constraint.narrow(&ids),
            vec![ItemId::from("c"), ItemId::from("a")]
        );
    }

    fn arb_id() -> impl Strategy<Value = ItemId> {
        "[a-e]".prop_map(ItemId::from)
    }

    fn arb_id_filter() -> impl Strategy<Value = Filter> {
        let leaf = prop_oneof![
            arb_id().prop_map(Filter::Id),
            arb_id().prop_map(Filter::IdNot),
            prop::collection::btree_set(arb_id(), 0..4).prop_map(Filter::IdIn),
            prop::collection::btree_set(arb_id(), 0..4).prop_map(Filter::IdNotIn),
        ];
        prop::collection::vec(leaf, 1..5).prop_map(Filter::And)
    }

    proptest! {
        /// For id-only conjunctions the in-memory narrowing agrees with evaluation.
        #[test]
        fn admits_agrees_with_matches(filter in arb_id_filter(), id in arb_id()) {
            let candidate = item(id.as_str(), json!({}));
            prop_assert_eq!(filter.id_constraint().admits(&id), filter.matches(&candidate));
        }

        /// Narrowing never invents ids and never keeps a rejected one.
        #[test]
        fn narrow_is_a_filtered_subset(
            filter in arb_id_filter(),
            ids in prop::collection::vec(arb_id(), 0..8),
        ) {
            let constraint = filter.id_constraint();
            let narrowed = constraint.narrow(&ids);
            for id in &narrowed {
                prop_assert!(ids.contains(id));
                prop_assert!(constraint.admits(id));
            }
            let unique: BTreeSet<_> = narrowed.iter().collect();
            prop_assert_eq!(unique.len(), narrowed.len());
        }
    }
}
