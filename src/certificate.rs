use crate::aggregator::aggregate;
use crate::arithmetic::{amount_at_percent, share_percent};
use crate::budget::Budget;
use crate::error::{CertificationError, Result};
use crate::measurement::Measurement;
use crate::period::Period;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertifiedItem {
    pub item_id: String,
    pub section: String,
    pub item_total: f64,
    pub acumulado: f64,
    /// `item_total * acumulado / 100`
    pub certified_amount: f64,
}

/// A payment certificate ("certificado"). Carries a snapshot of the budget
/// and measurement it was generated from so later budget edits do not alter
/// what was certified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Certificate {
    pub id: u64,
    pub budget_id: u64,
    pub measurement_id: u64,
    pub period: Period,
    pub grand_total: f64,
    pub items: Vec<CertifiedItem>,
    pub total_certified: f64,
    /// Share of the budget grand total certified to date.
    pub certified_percent: f64,
    /// `total_certified` minus the predecessor's; `None` for a chain head.
    pub delta: Option<f64>,
    pub budget_snapshot: Budget,
    pub measurement_snapshot: Measurement,
}

impl Certificate {
    /// Computes amounts without linking. Budget items absent from the
    /// measurement certify 0; measurement items absent from the budget are
    /// ignored.
    pub fn compute(id: u64, budget: &Budget, measurement: &Measurement) -> Result<Self> {
        if budget.id != measurement.budget_id {
            return Err(CertificationError::validation(
                format!("measurement {}", measurement.id),
                format!(
                    "belongs to budget {}, not budget {}",
                    measurement.budget_id, budget.id
                ),
            ));
        }

        let summary = aggregate(budget);
        let acumulados: HashMap<&str, f64> = measurement
            .items()
            .map(|i| (i.id.as_str(), i.acumulado))
            .collect();

        let items: Vec<CertifiedItem> = summary
            .items
            .iter()
            .map(|item| {
                let acumulado = acumulados.get(item.item_id.as_str()).copied().unwrap_or_else(|| {
                    debug!(
                        "Budget item '{}' missing from measurement {}; certifying 0",
                        item.item_id, measurement.id
                    );
                    0.0
                });
                CertifiedItem {
                    item_id: item.item_id.clone(),
                    section: item.section.clone(),
                    item_total: item.total,
                    acumulado,
                    certified_amount: amount_at_percent(item.total, acumulado),
                }
            })
            .collect();

        let total_certified = items.iter().map(|i| i.certified_amount).sum();

        Ok(Self {
            id,
            budget_id: budget.id,
            measurement_id: measurement.id,
            period: measurement.period,
            grand_total: summary.grand_total,
            items,
            total_certified,
            certified_percent: share_percent(total_certified, summary.grand_total),
            delta: None,
            budget_snapshot: budget.clone(),
            measurement_snapshot: measurement.clone(),
        })
    }

    pub fn item(&self, item_id: &str) -> Option<&CertifiedItem> {
        self.items.iter().find(|i| i.item_id == item_id)
    }

    /// Amount certified in this certificate's period alone.
    pub fn period_amount(&self) -> f64 {
        self.delta.unwrap_or(self.total_certified)
    }

    pub(crate) fn link_after(&mut self, previous: Option<&Certificate>) {
        self.delta = previous.map(|p| self.total_certified - p.total_certified);
    }
}

/// Issues a certificate for `measurement`, following `previous` when given.
/// The measurement period must be strictly after the predecessor's.
pub fn certify(
    id: u64,
    budget: &Budget,
    measurement: &Measurement,
    previous: Option<&Certificate>,
) -> Result<Certificate> {
    if let Some(prev) = previous {
        check_sequence(measurement.period, prev.period)?;
    }

    let mut certificate = Certificate::compute(id, budget, measurement)?;
    certificate.link_after(previous);
    Ok(certificate)
}

pub(crate) fn check_sequence(period: Period, tail_period: Period) -> Result<()> {
    if period <= tail_period {
        return Err(CertificationError::OutOfSequence {
            period,
            tail_period,
        });
    }
    Ok(())
}
