//! Pure, side-effect-free reconciliation of line items and discount codes
//! against a desired full state (§4.3).
//!
//! Nothing here performs I/O; every function is a deterministic
//! transformation of its inputs (property 2, §8).

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A line item as it currently exists upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentLineItem {
    /// Canonical product id.
    pub product_id: String,
    /// The per-backend handle needed to address this line for remove/update.
    pub backend_id: String,
    /// Variant id, if the product is variant-scoped.
    pub variant_id: Option<String>,
    /// Current quantity.
    pub quantity: u32,
}

/// A line item in the caller's desired full state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredLineItem {
    /// Canonical product id.
    pub product_id: String,
    /// Variant id, if the product is variant-scoped.
    pub variant_id: Option<String>,
    /// Desired quantity.
    pub quantity: u32,
}

/// Composite key used to match current and desired line items:
/// `product_id[:variant_id]` (§4.3).
fn line_key(product_id: &str, variant_id: Option<&str>) -> String {
    match variant_id {
        Some(v) => format!("{product_id}:{v}"),
        None => product_id.to_string(),
    }
}

impl CurrentLineItem {
    fn key(&self) -> String {
        line_key(&self.product_id, self.variant_id.as_deref())
    }
}

impl DesiredLineItem {
    fn key(&self) -> String {
        line_key(&self.product_id, self.variant_id.as_deref())
    }
}

/// A line present in current but absent from desired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveLineItem {
    /// Backend id to address for the remove mutation.
    pub backend_id: String,
}

/// A line present in both, with a differing quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateLineItem {
    /// Backend id to address for the update mutation.
    pub backend_id: String,
    /// Quantity before the update (informational only).
    pub old_quantity: u32,
    /// Quantity to set.
    pub new_quantity: u32,
}

/// A line present in desired but absent from current.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddLineItem {
    /// Canonical product id.
    pub product_id: String,
    /// Variant id, if the product is variant-scoped.
    pub variant_id: Option<String>,
    /// Quantity to add.
    pub quantity: u32,
}

/// The ordered mutation plan produced by [`diff_line_items`].
///
/// **Execution order is always `to_remove` → `to_update` → `to_add`**
/// (§4.3): this forbids the class of bugs where an update addresses a
/// line the backend has just deleted out from under the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemPlan {
    /// Lines to remove, in `current`'s order.
    pub to_remove: Vec<RemoveLineItem>,
    /// Lines to update, in `current`'s order.
    pub to_update: Vec<UpdateLineItem>,
    /// Lines to add, in `desired`'s order.
    pub to_add: Vec<AddLineItem>,
}

impl LineItemPlan {
    /// Whether applying this plan is a no-op. Adapters must treat an empty
    /// plan as a no-op and skip issuing any upstream round trip (§4.3).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_remove.is_empty() && self.to_update.is_empty() && self.to_add.is_empty()
    }
}

/// Diff `current` against `desired`, producing the ordered plan described
/// in §4.3. Items are matched by the composite `product_id[:variant_id]`
/// key; when more than one current item shares a key, only the first
/// match is paired and the remainder are left in `to_remove`.
#[must_use]
pub fn diff_line_items(current: &[CurrentLineItem], desired: &[DesiredLineItem]) -> LineItemPlan {
    let mut matched_desired: HashSet<usize> = HashSet::new();
    let mut to_remove = Vec::new();
    let mut to_update = Vec::new();

    for c in current {
        let key = c.key();
        let hit = desired
            .iter()
            .enumerate()
            .find(|(i, d)| !matched_desired.contains(i) && d.key() == key);
        match hit {
            None => to_remove.push(RemoveLineItem {
                backend_id: c.backend_id.clone(),
            }),
            Some((i, d)) => {
                matched_desired.insert(i);
                if d.quantity != c.quantity {
                    to_update.push(UpdateLineItem {
                        backend_id: c.backend_id.clone(),
                        old_quantity: c.quantity,
                        new_quantity: d.quantity,
                    });
                }
            }
        }
    }

    let to_add = desired
        .iter()
        .enumerate()
        .filter(|(i, _)| !matched_desired.contains(i))
        .map(|(_, d)| AddLineItem {
            product_id: d.product_id.clone(),
            variant_id: d.variant_id.clone(),
            quantity: d.quantity,
        })
        .collect();

    LineItemPlan {
        to_remove,
        to_update,
        to_add,
    }
}

/// The ordered plan produced by [`diff_discount_codes`]: symmetric
/// set-difference on the code strings (§4.3).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountPlan {
    /// Codes currently applied that are not in the desired set.
    pub to_remove: Vec<String>,
    /// Codes in the desired set that are not currently applied.
    pub to_apply: Vec<String>,
}

impl DiscountPlan {
    /// Whether applying this plan is a no-op.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_remove.is_empty() && self.to_apply.is_empty()
    }
}

/// Diff `current` discount codes against `desired`. An empty `desired`
/// slice removes every applied code (§4.6 PUT semantics).
#[must_use]
pub fn diff_discount_codes(current: &[String], desired: &[String]) -> DiscountPlan {
    let desired_set: HashSet<&str> = desired.iter().map(String::as_str).collect();
    let current_set: HashSet<&str> = current.iter().map(String::as_str).collect();

    let to_remove = current
        .iter()
        .filter(|c| !desired_set.contains(c.as_str()))
        .cloned()
        .collect();
    let to_apply = desired
        .iter()
        .filter(|d| !current_set.contains(d.as_str()))
        .cloned()
        .collect();

    DiscountPlan { to_remove, to_apply }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cur(product_id: &str, backend_id: &str, qty: u32) -> CurrentLineItem {
        CurrentLineItem {
            product_id: product_id.into(),
            backend_id: backend_id.into(),
            variant_id: None,
            quantity: qty,
        }
    }

    fn des(product_id: &str, qty: u32) -> DesiredLineItem {
        DesiredLineItem {
            product_id: product_id.into(),
            variant_id: None,
            quantity: qty,
        }
    }

    #[test]
    fn update_reconciliation_scenario_from_spec() {
        let current = vec![cur("p1", "line-1", 2), cur("p2", "line-2", 1)];
        let desired = vec![des("p2", 5), des("p3", 1)];

        let plan = diff_line_items(&current, &desired);

        assert_eq!(plan.to_remove, vec![RemoveLineItem { backend_id: "line-1".into() }]);
        assert_eq!(
            plan.to_update,
            vec![UpdateLineItem {
                backend_id: "line-2".into(),
                old_quantity: 1,
                new_quantity: 5,
            }]
        );
        assert_eq!(
            plan.to_add,
            vec![AddLineItem {
                product_id: "p3".into(),
                variant_id: None,
                quantity: 1,
            }]
        );
    }

    #[test]
    fn identical_multisets_yield_empty_plan() {
        let current = vec![cur("p1", "line-1", 2), cur("p2", "line-2", 3)];
        let desired = vec![des("p1", 2), des("p2", 3)];
        let plan = diff_line_items(&current, &desired);
        assert!(plan.is_empty());
    }

    #[test]
    fn variant_scoped_products_are_distinct_keys() {
        let mut c1 = cur("p1", "line-1", 1);
        c1.variant_id = Some("red".into());
        let mut c2 = cur("p1", "line-2", 1);
        c2.variant_id = Some("blue".into());
        let mut d = des("p1", 1);
        d.variant_id = Some("red".into());

        let plan = diff_line_items(&[c1, c2], &[d]);
        assert_eq!(plan.to_remove, vec![RemoveLineItem { backend_id: "line-2".into() }]);
        assert!(plan.to_update.is_empty());
        assert!(plan.to_add.is_empty());
    }

    #[test]
    fn discount_empty_desired_removes_all() {
        let plan = diff_discount_codes(&["SAVE10".into(), "SAVE20".into()], &[]);
        assert_eq!(plan.to_remove, vec!["SAVE10".to_string(), "SAVE20".to_string()]);
        assert!(plan.to_apply.is_empty());
    }

    #[test]
    fn discount_failure_is_symmetric_difference() {
        let plan = diff_discount_codes(&["KEEP".into()], &["KEEP".into(), "NEW".into()]);
        assert!(plan.to_remove.is_empty());
        assert_eq!(plan.to_apply, vec!["NEW".to_string()]);
    }

    fn arb_quantity() -> impl Strategy<Value = u32> {
        1u32..20
    }

    proptest! {
        #[test]
        fn prop_reconciliation_converges_to_desired_multiset(
            qtys in proptest::collection::vec(arb_quantity(), 1..6)
        ) {
            let current: Vec<CurrentLineItem> = qtys
                .iter()
                .enumerate()
                .map(|(i, &q)| cur(&format!("p{i}"), &format!("line-{i}"), q))
                .collect();
            // Desired: drop the first item, bump the rest by one, add a new one.
            let mut desired: Vec<DesiredLineItem> = qtys
                .iter()
                .enumerate()
                .skip(1)
                .map(|(i, &q)| des(&format!("p{i}"), q + 1))
                .collect();
            desired.push(des("p-new", 1));

            let plan = diff_line_items(&current, &desired);

            // Simulate applying remove -> update -> add to `current`'s keys.
            let mut keys: Vec<String> = current.iter().map(CurrentLineItem::key).collect();
            for r in &plan.to_remove {
                let idx = current.iter().position(|c| &c.backend_id == &r.backend_id).unwrap();
                let key = current[idx].key();
                let pos = keys.iter().position(|k| k == &key).unwrap();
                keys.remove(pos);
            }
            // updates don't change keys, adds append new keys
            for a in &plan.to_add {
                keys.push(line_key(&a.product_id, a.variant_id.as_deref()));
            }

            let mut desired_keys: Vec<String> = desired.iter().map(DesiredLineItem::key).collect();
            keys.sort();
            desired_keys.sort();
            prop_assert_eq!(keys, desired_keys);
        }
    }
}
