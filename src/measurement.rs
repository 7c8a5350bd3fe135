//! Measurement ("medición") engine.
//!
//! A measurement records, per budget item, how much of the work was done
//! before the period (`anterior`), during it (`presente`) and in total
//! (`acumulado`). New measurements are seeded from the nearest earlier one so
//! that completion never regresses across periods.

use crate::arithmetic::{amount_at_percent, share_percent, FULL_PERCENT, PERCENT_EPSILON};
use crate::budget::Budget;
use crate::error::{CertificationError, Result};
use crate::period::Period;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementItem {
    pub id: String,
    pub anterior: f64,
    pub presente: f64,
    pub acumulado: f64,
}

impl MeasurementItem {
    fn seeded(id: &str, anterior: f64) -> Self {
        Self {
            id: id.to_string(),
            anterior,
            presente: 0.0,
            acumulado: anterior,
        }
    }

    /// Checks `0 <= anterior <= acumulado <= 100` and
    /// `acumulado == anterior + presente`.
    pub fn check_bounds(&self, tolerance: f64) -> Result<()> {
        for value in [self.anterior, self.presente, self.acumulado] {
            if !value.is_finite() {
                return Err(CertificationError::InvalidPercentage {
                    item_id: self.id.clone(),
                    value,
                });
            }
        }
        if self.anterior < -tolerance || self.anterior > FULL_PERCENT + tolerance {
            return Err(CertificationError::InvalidPercentage {
                item_id: self.id.clone(),
                value: self.anterior,
            });
        }
        if self.presente < -tolerance {
            return Err(CertificationError::NegativePresente {
                item_id: self.id.clone(),
                presente: self.presente,
            });
        }
        if self.acumulado > FULL_PERCENT + tolerance {
            return Err(CertificationError::AcumuladoExceedsLimit {
                item_id: self.id.clone(),
                anterior: self.anterior,
                presente: self.presente,
            });
        }
        if (self.acumulado - (self.anterior + self.presente)).abs() > tolerance {
            return Err(CertificationError::validation(
                &self.id,
                format!(
                    "acumulado {} is not anterior {} + presente {}",
                    self.acumulado, self.anterior, self.presente
                ),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementSection {
    pub name: String,
    pub items: Vec<MeasurementItem>,
}

/// A saved, historical measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub id: u64,
    pub budget_id: u64,
    pub period: Period,
    pub sections: Vec<MeasurementSection>,
}

impl Measurement {
    pub fn items(&self) -> impl Iterator<Item = &MeasurementItem> {
        self.sections.iter().flat_map(|s| s.items.iter())
    }

    pub fn item(&self, item_id: &str) -> Option<&MeasurementItem> {
        self.items().find(|i| i.id == item_id)
    }

    pub fn progress(&self, budget: &Budget) -> MeasurementProgress {
        MeasurementProgress::compute(budget, &self.sections)
    }

    pub fn validate(&self, tolerance: f64) -> Result<()> {
        for item in self.items() {
            item.check_bounds(tolerance)?;
        }
        Ok(())
    }
}

/// A measurement being filled in. Only `presente` can change; `anterior` is
/// fixed at seeding time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DraftMeasurement {
    budget_id: u64,
    period: Period,
    sections: Vec<MeasurementSection>,
}

impl DraftMeasurement {
    pub fn budget_id(&self) -> u64 {
        self.budget_id
    }

    pub fn period(&self) -> Period {
        self.period
    }

    pub fn sections(&self) -> &[MeasurementSection] {
        &self.sections
    }

    pub fn item(&self, item_id: &str) -> Option<&MeasurementItem> {
        self.sections
            .iter()
            .flat_map(|s| s.items.iter())
            .find(|i| i.id == item_id)
    }

    /// Records this period's completion for one item. Out-of-range values
    /// are rejected, never clamped, and leave the draft untouched.
    pub fn apply_presente(&mut self, item_id: &str, presente: f64) -> Result<()> {
        let item = self
            .sections
            .iter_mut()
            .flat_map(|s| s.items.iter_mut())
            .find(|i| i.id == item_id)
            .ok_or_else(|| CertificationError::ItemNotFound(item_id.to_string()))?;

        if !presente.is_finite() {
            return Err(CertificationError::InvalidPercentage {
                item_id: item_id.to_string(),
                value: presente,
            });
        }
        if presente < 0.0 {
            return Err(CertificationError::NegativePresente {
                item_id: item_id.to_string(),
                presente,
            });
        }

        let acumulado = item.anterior + presente;
        if acumulado > FULL_PERCENT + PERCENT_EPSILON {
            return Err(CertificationError::AcumuladoExceedsLimit {
                item_id: item_id.to_string(),
                anterior: item.anterior,
                presente,
            });
        }

        item.presente = presente;
        item.acumulado = acumulado.min(FULL_PERCENT);
        Ok(())
    }

    pub fn has_progress(&self) -> bool {
        self.sections
            .iter()
            .flat_map(|s| s.items.iter())
            .any(|i| i.presente > 0.0)
    }

    pub fn validate_for_save(&self) -> Result<()> {
        if !self.has_progress() {
            return Err(CertificationError::EmptyMeasurement {
                period: self.period,
            });
        }
        Ok(())
    }

    /// Turns the draft into a historical record under `id`.
    pub fn finalize(self, id: u64) -> Result<Measurement> {
        self.validate_for_save()?;
        Ok(Measurement {
            id,
            budget_id: self.budget_id,
            period: self.period,
            sections: self.sections,
        })
    }

    pub fn progress(&self, budget: &Budget) -> MeasurementProgress {
        MeasurementProgress::compute(budget, &self.sections)
    }
}

/// Builds a draft mirroring the budget's sections. Each item carries forward
/// the matching item's `acumulado` from `previous` (matched by id, wherever
/// it sits), or 0 when there is no previous measurement or no match.
pub fn seed_measurement(
    budget: &Budget,
    previous: Option<&Measurement>,
    period: Period,
) -> DraftMeasurement {
    let carried: HashMap<&str, f64> = previous
        .map(|m| m.items().map(|i| (i.id.as_str(), i.acumulado)).collect())
        .unwrap_or_default();

    let sections = budget
        .sections
        .iter()
        .map(|section| MeasurementSection {
            name: section.name.clone(),
            items: section
                .items
                .iter()
                .map(|item| {
                    let anterior = carried.get(item.id.as_str()).copied().unwrap_or(0.0);
                    MeasurementItem::seeded(&item.id, anterior)
                })
                .collect(),
        })
        .collect();

    debug!(
        "Seeded measurement for budget {} at {} from {}",
        budget.id,
        period,
        previous
            .map(|m| m.period.to_string())
            .unwrap_or_else(|| "nothing".to_string())
    );

    DraftMeasurement {
        budget_id: budget.id,
        period,
        sections,
    }
}

/// Monetary and percentage advancement of a measurement against its budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MeasurementProgress {
    pub budget_total: f64,
    pub previous_amount: f64,
    pub current_amount: f64,
    pub accumulated_amount: f64,
    pub previous_percent: f64,
    pub current_percent: f64,
    pub accumulated_percent: f64,
}

impl MeasurementProgress {
    /// Measurement items with no budget counterpart contribute nothing.
    pub fn compute(budget: &Budget, sections: &[MeasurementSection]) -> Self {
        let totals: HashMap<&str, f64> = budget
            .items()
            .map(|(_, item)| (item.id.as_str(), item.total()))
            .collect();
        let budget_total = budget.grand_total();

        let mut previous_amount = 0.0;
        let mut current_amount = 0.0;
        let mut accumulated_amount = 0.0;

        for item in sections.iter().flat_map(|s| s.items.iter()) {
            let Some(&total) = totals.get(item.id.as_str()) else {
                debug!("Measurement item '{}' has no budget item; skipped", item.id);
                continue;
            };
            previous_amount += amount_at_percent(total, item.anterior);
            current_amount += amount_at_percent(total, item.presente);
            accumulated_amount += amount_at_percent(total, item.acumulado);
        }

        Self {
            budget_total,
            previous_amount,
            current_amount,
            accumulated_amount,
            previous_percent: share_percent(previous_amount, budget_total),
            current_percent: share_percent(current_amount, budget_total),
            accumulated_percent: share_percent(accumulated_amount, budget_total),
        }
    }
}

/// Verifies a budget's measurement history: each item's bounds hold and
/// its `anterior` equals the `acumulado` of the immediately preceding
/// measurement (or 0 for the first one it appears in).
pub fn verify_measurement_sequence(measurements: &[Measurement], tolerance: f64) -> Result<()> {
    let mut ordered: Vec<&Measurement> = measurements.iter().collect();
    ordered.sort_by_key(|m| m.period);

    let mut previous: Option<&Measurement> = None;
    for measurement in ordered {
        for item in measurement.items() {
            item.check_bounds(tolerance)?;

            let expected = previous
                .and_then(|p| p.item(&item.id))
                .map(|p| p.acumulado)
                .unwrap_or(0.0);
            if (item.anterior - expected).abs() > tolerance {
                return Err(CertificationError::CarryForwardMismatch {
                    item_id: item.id.clone(),
                    period: measurement.period,
                    anterior: item.anterior,
                    expected,
                });
            }
        }
        previous = Some(measurement);
    }

    Ok(())
}
