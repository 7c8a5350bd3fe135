use crate::arithmetic::{share_percent, FULL_PERCENT};
use crate::budget::Budget;
use crate::error::{CertificationError, Result};
use log::debug;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionSummary {
    pub name: String,
    pub total: f64,
    /// Share of the grand total.
    pub rubro: f64,
    /// Running sum of `rubro` up to and including this section.
    pub iacum: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSummary {
    pub item_id: String,
    pub section: String,
    pub total: f64,
    /// Share of the grand total.
    pub parcial: f64,
}

/// Derived figures for a whole budget. Every percentage is relative to the
/// grand total, so any edit invalidates all of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BudgetSummary {
    pub grand_total: f64,
    pub sections: Vec<SectionSummary>,
    pub items: Vec<ItemSummary>,
    pub iacum: Vec<f64>,
}

impl BudgetSummary {
    pub fn section(&self, name: &str) -> Option<&SectionSummary> {
        self.sections.iter().find(|s| s.name == name)
    }

    pub fn item(&self, item_id: &str) -> Option<&ItemSummary> {
        self.items.iter().find(|i| i.item_id == item_id)
    }

    pub fn rubro_sum(&self) -> f64 {
        self.sections.iter().map(|s| s.rubro).sum()
    }
}

pub fn aggregate(budget: &Budget) -> BudgetSummary {
    let grand_total = budget.grand_total();

    let mut sections = Vec::with_capacity(budget.sections.len());
    let mut items = Vec::with_capacity(budget.item_count());
    let mut iacum = Vec::with_capacity(budget.sections.len());
    let mut running = 0.0;

    for section in &budget.sections {
        let section_total = section.total();
        let rubro = share_percent(section_total, grand_total);
        running += rubro;

        for item in &section.items {
            let total = item.total();
            items.push(ItemSummary {
                item_id: item.id.clone(),
                section: section.name.clone(),
                total,
                parcial: share_percent(total, grand_total),
            });
        }

        sections.push(SectionSummary {
            name: section.name.clone(),
            total: section_total,
            rubro,
            iacum: running,
        });
        iacum.push(running);
    }

    debug!(
        "Aggregated budget {} ({}): grand total {:.2} across {} sections and {} items",
        budget.id,
        budget.name,
        grand_total,
        sections.len(),
        items.len()
    );

    BudgetSummary {
        grand_total,
        sections,
        items,
        iacum,
    }
}

/// Section shares must close at 100% whenever there is something to share,
/// and the last cumulative share must reach 100%.
pub fn verify_percentage_closure(summary: &BudgetSummary, tolerance: f64) -> Result<()> {
    if summary.grand_total <= 0.0 {
        let total = summary.rubro_sum();
        if total != 0.0 {
            return Err(CertificationError::PercentageClosureViolation { total });
        }
        return Ok(());
    }

    let total = summary.rubro_sum();
    if (total - FULL_PERCENT).abs() > tolerance {
        return Err(CertificationError::PercentageClosureViolation { total });
    }

    if let Some(&last) = summary.iacum.last() {
        if (last - FULL_PERCENT).abs() > tolerance {
            return Err(CertificationError::PercentageClosureViolation { total: last });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::BudgetLineItem;

    fn two_section_budget() -> Budget {
        let mut budget = Budget::new(1, "Test");
        budget
            .add_item("A", BudgetLineItem::new("a1", "Item A", "u", 2.0, 100.0))
            .unwrap();
        budget
            .add_item("B", BudgetLineItem::new("b1", "Item B", "u", 1.0, 800.0))
            .unwrap();
        budget
    }

    #[test]
    fn test_rubro_and_iacum() {
        let summary = aggregate(&two_section_budget());
        assert_eq!(summary.grand_total, 1000.0);
        assert!((summary.section("A").unwrap().rubro - 20.0).abs() < 1e-9);
        assert!((summary.section("B").unwrap().rubro - 80.0).abs() < 1e-9);
        assert!((summary.iacum[0] - 20.0).abs() < 1e-9);
        assert!((summary.iacum[1] - 100.0).abs() < 1e-9);
        assert!((summary.item("b1").unwrap().parcial - 80.0).abs() < 1e-9);
        assert!(verify_percentage_closure(&summary, 1e-6).is_ok());
    }

    #[test]
    fn test_empty_budget() {
        let summary = aggregate(&Budget::new(1, "Empty"));
        assert_eq!(summary.grand_total, 0.0);
        assert!(summary.sections.is_empty());
        assert!(summary.items.is_empty());
        assert!(summary.iacum.is_empty());
        assert!(verify_percentage_closure(&summary, 1e-6).is_ok());
    }

    #[test]
    fn test_zero_total_has_no_nan() {
        let mut budget = Budget::new(1, "Zero");
        budget
            .add_item("A", BudgetLineItem::new("a1", "Item", "u", 0.0, 100.0))
            .unwrap();
        budget.add_section("Vacía").unwrap();

        let summary = aggregate(&budget);
        assert_eq!(summary.sections.len(), 2);
        for section in &summary.sections {
            assert_eq!(section.rubro, 0.0);
            assert_eq!(section.iacum, 0.0);
        }
        assert_eq!(summary.item("a1").unwrap().parcial, 0.0);
    }

    #[test]
    fn test_empty_section_still_listed() {
        let mut budget = two_section_budget();
        budget.add_section("C").unwrap();
        let summary = aggregate(&budget);
        let c = summary.section("C").unwrap();
        assert_eq!(c.total, 0.0);
        assert_eq!(c.rubro, 0.0);
        assert!((c.iacum - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_closure_violation_detected() {
        let mut summary = aggregate(&two_section_budget());
        summary.sections[0].rubro = 25.0;
        assert!(matches!(
            verify_percentage_closure(&summary, 1e-6),
            Err(CertificationError::PercentageClosureViolation { .. })
        ));
    }
}
