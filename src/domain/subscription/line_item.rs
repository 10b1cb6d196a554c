//! Line items and the edits that can be applied to them.

use serde::{Deserialize, Serialize};

use crate::domain::billing::BillingError;
use crate::domain::foundation::{PlanRef, ValidationError};

/// One priced plan on a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub plan_ref: PlanRef,
    pub quantity: u32,
    pub unit_amount_cents: i64,
}

impl LineItem {
    /// Creates a line item; quantity must be positive and the unit amount non-negative.
    pub fn new(plan_ref: PlanRef, quantity: u32, unit_amount_cents: i64) -> Result<Self, ValidationError> {
        if quantity == 0 {
            return Err(ValidationError::out_of_range("quantity", 1, i64::from(u32::MAX), 0));
        }
        if unit_amount_cents < 0 {
            return Err(ValidationError::out_of_range(
                "unit_amount_cents",
                0,
                i64::MAX,
                unit_amount_cents,
            ));
        }
        Ok(Self {
            plan_ref,
            quantity,
            unit_amount_cents,
        })
    }

    /// `quantity * unit_amount_cents`, or `None` on overflow.
    pub fn amount_cents(&self) -> Option<i64> {
        self.unit_amount_cents.checked_mul(i64::from(self.quantity))
    }
}

/// Sum of all line item amounts.
///
/// An overflowing total is a `Validation` error on `line_items`: it can only
/// come from requested quantities and prices.
pub fn total_of(items: &[LineItem]) -> Result<i64, BillingError> {
    items.iter().try_fold(0i64, |acc, item| {
        item.amount_cents()
            .and_then(|amount| acc.checked_add(amount))
            .ok_or_else(|| BillingError::validation("line_items", "line item total overflows i64"))
    })
}

/// A requested edit to a subscription's line items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum LineItemChange {
    /// Adds the plan, or replaces the existing item for it in place.
    Set {
        plan_ref: PlanRef,
        quantity: u32,
        unit_amount_cents: i64,
    },
    /// Removes the item for the plan.
    Remove { plan_ref: PlanRef },
}

/// Applies `changes` in order to a copy of `items`.
///
/// Rejects an empty change list, removal of an absent plan, invalid
/// quantities or amounts, and a result with no line items left.
pub fn apply_changes(items: &[LineItem], changes: &[LineItemChange]) -> Result<Vec<LineItem>, BillingError> {
    if changes.is_empty() {
        return Err(BillingError::validation("line_item_changes", "at least one change is required"));
    }

    let mut result = items.to_vec();
    for change in changes {
        match change {
            LineItemChange::Set {
                plan_ref,
                quantity,
                unit_amount_cents,
            } => {
                let item = LineItem::new(plan_ref.clone(), *quantity, *unit_amount_cents)?;
                match result.iter_mut().find(|existing| existing.plan_ref == *plan_ref) {
                    Some(existing) => *existing = item,
                    None => result.push(item),
                }
            }
            LineItemChange::Remove { plan_ref } => {
                let before = result.len();
                result.retain(|existing| existing.plan_ref != *plan_ref);
                if result.len() == before {
                    return Err(BillingError::validation(
                        "line_item_changes",
                        format!("plan '{}' is not on the subscription", plan_ref),
                    ));
                }
            }
        }
    }

    if result.is_empty() {
        return Err(BillingError::validation(
            "line_item_changes",
            "a subscription must keep at least one line item",
        ));
    }
    total_of(&result).map_err(|_| {
        BillingError::validation("line_item_changes", "resulting line item total overflows i64")
    })?;
    Ok(result)
}
