use crate::aggregator::{aggregate, BudgetSummary};
use crate::budget::{Budget, BudgetLineItem};
use crate::error::Result;
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A single structural or price edit to a budget, as sent by an editor UI.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum BudgetEdit {
    AddSection {
        name: String,
    },

    RemoveSection {
        name: String,
    },

    RenameSection {
        #[schemars(description = "The exact current name of the section.")]
        target: String,
        new_name: String,
    },

    /// Append an item; the section is created when missing.
    AddItem {
        section: String,
        item: BudgetLineItem,
    },

    RemoveItem {
        item_id: String,
    },

    SetQuantity {
        item_id: String,
        quantity: f64,
    },

    SetUnitPrice {
        item_id: String,
        unit_price: f64,
    },

    MoveItem {
        item_id: String,
        #[schemars(description = "Existing section that receives the item at its end.")]
        target_section: String,
    },
}

impl BudgetEdit {
    pub fn apply_to(&self, budget: &mut Budget) -> Result<()> {
        match self {
            BudgetEdit::AddSection { name } => budget.add_section(name),
            BudgetEdit::RemoveSection { name } => budget.remove_section(name).map(|_| ()),
            BudgetEdit::RenameSection { target, new_name } => {
                budget.rename_section(target, new_name)
            }
            BudgetEdit::AddItem { section, item } => budget.add_item(section, item.clone()),
            BudgetEdit::RemoveItem { item_id } => budget.remove_item(item_id).map(|_| ()),
            BudgetEdit::SetQuantity { item_id, quantity } => {
                budget.set_quantity(item_id, *quantity)
            }
            BudgetEdit::SetUnitPrice {
                item_id,
                unit_price,
            } => budget.set_unit_price(item_id, *unit_price),
            BudgetEdit::MoveItem {
                item_id,
                target_section,
            } => budget.move_item(item_id, target_section),
        }
    }
}

/// Holds a budget together with its aggregation and keeps them in step:
/// every successful edit recomputes the figures of every section.
#[derive(Debug, Clone)]
pub struct BudgetEditor {
    budget: Budget,
    summary: BudgetSummary,
}

impl BudgetEditor {
    pub fn new(budget: Budget) -> Self {
        let summary = aggregate(&budget);
        Self { budget, summary }
    }

    pub fn budget(&self) -> &Budget {
        &self.budget
    }

    pub fn summary(&self) -> &BudgetSummary {
        &self.summary
    }

    /// Applies `edit` to a working copy so a failed edit leaves both the
    /// budget and the summary untouched.
    pub fn apply(&mut self, edit: &BudgetEdit) -> Result<&BudgetSummary> {
        let mut working = self.budget.clone();
        edit.apply_to(&mut working)?;

        self.budget = working;
        self.summary = aggregate(&self.budget);
        debug!(
            "Applied {:?} to budget {}; grand total now {:.2}",
            edit, self.budget.id, self.summary.grand_total
        );
        Ok(&self.summary)
    }

    /// Applies edits in order, stopping at the first failure. Edits before
    /// the failure stay applied.
    pub fn apply_all(&mut self, edits: &[BudgetEdit]) -> Result<&BudgetSummary> {
        for edit in edits {
            self.apply(edit)?;
        }
        Ok(&self.summary)
    }

    pub fn into_budget(self) -> Budget {
        self.budget
    }
}
