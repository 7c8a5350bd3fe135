//! # Obra Certification
//!
//! A library for tracking construction-work progress against a priced budget
//! and issuing the periodic progress certificates ("certificados") that a
//! contractor bills from.
//!
//! ## Core Concepts
//!
//! - **Budget**: Ordered sections of priced line items. Every edit recomputes
//!   each section's share of the grand total (`rubro`), the running share
//!   (`iacum`) and each item's share of the grand total (`parcial`)
//! - **Measurement**: Per-item completion for one month, split into what was
//!   done before (`anterior`), this period (`presente`) and in total
//!   (`acumulado`). New measurements are seeded from the nearest earlier one
//! - **Certificate**: The monetary value of a measurement, snapshotted at
//!   issue time and linked to its predecessor so the period delta is known
//! - **Integrity**: Shares close to 100%, completion never regresses and no
//!   item ever exceeds 100%
//!
//! ## Example
//!
//! ```rust,ignore
//! use obra_certification::*;
//!
//! let mut budget = Budget::new(1, "Escuela N° 12");
//! budget.add_item("Estructura", BudgetLineItem::new("1.1", "Hormigón", "m3", 20.0, 850.0))?;
//! budget.add_item("Terminaciones", BudgetLineItem::new("2.1", "Pintura", "m2", 400.0, 12.5))?;
//!
//! let mut ledger = ObraLedger::new(LedgerConfig::default())?;
//! ledger.register_budget(budget)?;
//!
//! let period = Period::parse("2024-03")?;
//! let mut draft = ledger.draft_measurement(1, period)?;
//! draft.apply_presente("1.1", 40.0)?;
//! let measurement_id = ledger.save_measurement(draft)?.id;
//!
//! let certificate = ledger.certify(1, measurement_id)?;
//! println!("{}", format_currency(certificate.total_certified));
//! ```

pub mod aggregator;
pub mod arithmetic;
pub mod budget;
pub mod certificate;
pub mod chain;
pub mod config;
pub mod edits;
pub mod error;
pub mod history;
pub mod ledger;
pub mod measurement;
pub mod period;
pub mod progress;
pub mod report;
pub mod schema;

pub use aggregator::{
    aggregate, verify_percentage_closure, BudgetSummary, ItemSummary, SectionSummary,
};
pub use budget::{Budget, BudgetLineItem, BudgetSection};
pub use certificate::{certify, Certificate, CertifiedItem};
pub use chain::{CertificateChain, ChainLinks};
pub use config::{DeletionPolicy, LedgerConfig, SequencePolicy};
pub use edits::{BudgetEdit, BudgetEditor};
pub use error::{CertificationError, ErrorKind, Result};
pub use history::{find_nearest_following, find_nearest_prior, seed_for_period};
pub use ledger::ObraLedger;
pub use measurement::{
    seed_measurement, verify_measurement_sequence, DraftMeasurement, Measurement,
    MeasurementItem, MeasurementProgress, MeasurementSection,
};
pub use period::{months_in_range, Period};
pub use progress::{build_progress_curve, CurveOrigin, CurvePoint, ProgressCurve};
pub use report::{format_currency, format_number, format_percentage, CertificateReport, ReportRow};
pub use schema::*;

use log::{debug, info};

pub struct CertificationProcessor;

impl CertificationProcessor {
    /// Loads a stored budget and its measurement history into a fresh
    /// ledger and certifies every measurement in period order.
    pub fn process(
        budget: &BudgetInput,
        measurements: &[MeasurementInput],
        config: &LedgerConfig,
    ) -> Result<ObraLedger> {
        let budget = budget.resolve()?;
        let budget_id = budget.id;

        info!(
            "Processing certification history for budget {} ({})",
            budget_id, budget.name
        );
        debug!(
            "Budget has {} items; {} stored measurements",
            budget.item_count(),
            measurements.len()
        );

        let mut ledger = ObraLedger::new(config.clone())?;
        ledger.register_budget(budget)?;

        for input in measurements {
            let measurement = input.resolve()?;
            if measurement.budget_id != budget_id {
                return Err(CertificationError::validation(
                    format!("measurement {}", measurement.id),
                    format!("belongs to budget {}, not {}", measurement.budget_id, budget_id),
                ));
            }
            ledger.import_measurement(measurement)?;
        }

        let ids: Vec<u64> = ledger.measurements(budget_id)?.iter().map(|m| m.id).collect();
        for measurement_id in ids {
            ledger.certify(budget_id, measurement_id)?;
        }

        Ok(ledger)
    }

    pub fn process_with_verification(
        budget: &BudgetInput,
        measurements: &[MeasurementInput],
        config: &LedgerConfig,
    ) -> Result<ObraLedger> {
        let ledger = Self::process(budget, measurements, config)?;
        ledger.verify(budget.id)?;
        Ok(ledger)
    }
}

pub fn process_certification_history(
    budget: &BudgetInput,
    measurements: &[MeasurementInput],
    config: &LedgerConfig,
) -> Result<ObraLedger> {
    CertificationProcessor::process(budget, measurements, config)
}

pub fn process_with_verification(
    budget: &BudgetInput,
    measurements: &[MeasurementInput],
    config: &LedgerConfig,
) -> Result<ObraLedger> {
    CertificationProcessor::process_with_verification(budget, measurements, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn budget_input() -> BudgetInput {
        serde_json::from_str(
            r#"{
                "id": 9,
                "name": "Centro de salud",
                "sections": [
                    {"name": "Estructura", "items": [
                        {"id": "E1", "name": "Hormigón", "unit": "m3", "quantity": 10, "unit_price": 200}
                    ]},
                    {"name": "Instalaciones", "items": [
                        {"id": "I1", "name": "Cañerías", "unit": "ml", "quantity": 100, "unit_price": 80}
                    ]}
                ]
            }"#,
        )
        .unwrap()
    }

    fn measurement_input(id: u64, period: &str, e1: (f64, f64), i1: (f64, f64)) -> MeasurementInput {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "budget_id": 9,
            "period": period,
            "sections": [
                {"name": "Estructura", "items": [{"id": "E1", "anterior": e1.0, "presente": e1.1}]},
                {"name": "Instalaciones", "items": [{"id": "I1", "anterior": i1.0, "presente": i1.1}]}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_end_to_end_processing() {
        let measurements = vec![
            measurement_input(2, "2024-02", (50.0, 30.0), (10.0, 10.0)),
            measurement_input(1, "2024-01", (0.0, 50.0), (0.0, 10.0)),
        ];

        let ledger =
            process_with_verification(&budget_input(), &measurements, &LedgerConfig::default())
                .unwrap();

        let chain = ledger.certificates(9).unwrap();
        assert_eq!(chain.len(), 2);

        let head = chain.head().unwrap();
        assert_eq!(head.measurement_id, 1);
        // 50% of 2000 + 10% of 8000
        assert!((head.total_certified - 1800.0).abs() < 1e-9);

        let tail = chain.tail().unwrap();
        // 80% of 2000 + 20% of 8000
        assert!((tail.total_certified - 3200.0).abs() < 1e-9);
        assert!((tail.delta.unwrap() - 1400.0).abs() < 1e-9);
    }

    #[test]
    fn test_foreign_measurement_rejected() {
        let mut stray = measurement_input(1, "2024-01", (0.0, 10.0), (0.0, 0.0));
        stray.budget_id = 3;
        let result =
            process_certification_history(&budget_input(), &[stray], &LedgerConfig::default());
        assert!(result.is_err());
    }
}
