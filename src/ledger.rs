use crate::aggregator::{verify_percentage_closure, BudgetSummary};
use crate::arithmetic::approx_eq;
use crate::budget::Budget;
use crate::certificate::Certificate;
use crate::chain::{CertificateChain, ChainLinks};
use crate::config::LedgerConfig;
use crate::edits::{BudgetEdit, BudgetEditor};
use crate::error::{CertificationError, Result};
use crate::history::{find_nearest_prior, seed_for_period};
use crate::measurement::{verify_measurement_sequence, DraftMeasurement, Measurement};
use crate::period::Period;
use crate::progress::{build_progress_curve, ProgressCurve};
use crate::report::CertificateReport;
use log::{debug, info};
use std::collections::BTreeMap;

struct ObraRecord {
    editor: BudgetEditor,
    /// Sorted by period, at most one per period.
    measurements: Vec<Measurement>,
    chain: CertificateChain,
}

impl ObraRecord {
    fn measurement(&self, measurement_id: u64) -> Result<&Measurement> {
        self.measurements
            .iter()
            .find(|m| m.id == measurement_id)
            .ok_or(CertificationError::MeasurementNotFound(measurement_id))
    }

    fn check_insertable(&self, budget_id: u64, period: Period) -> Result<()> {
        if self.measurements.iter().any(|m| m.period == period) {
            return Err(CertificationError::DuplicatePeriod { budget_id, period });
        }
        if let Some(later) = self.measurements.iter().find(|m| m.period > period) {
            return Err(CertificationError::validation(
                format!("measurement for {}", period),
                format!(
                    "measurement {} for {} already follows it; its anterior values would no longer match",
                    later.id, later.period
                ),
            ));
        }
        Ok(())
    }
}

/// Budgets, their measurement history and certificate chains, keyed by
/// budget id.
///
/// Callers must serialize writes per budget; the ledger itself holds no
/// locks.
pub struct ObraLedger {
    config: LedgerConfig,
    records: BTreeMap<u64, ObraRecord>,
    next_measurement_id: u64,
    next_certificate_id: u64,
}

impl Default for ObraLedger {
    fn default() -> Self {
        Self {
            config: LedgerConfig::default(),
            records: BTreeMap::new(),
            next_measurement_id: 1,
            next_certificate_id: 1,
        }
    }
}

impl ObraLedger {
    pub fn new(config: LedgerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ..Self::default()
        })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn budget_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.records.keys().copied()
    }

    pub fn register_budget(&mut self, budget: Budget) -> Result<&BudgetSummary> {
        budget.validate()?;
        if self.records.contains_key(&budget.id) {
            return Err(CertificationError::validation(
                format!("budget {}", budget.id),
                "already registered",
            ));
        }

        let budget_id = budget.id;
        info!(
            "Registering budget {} ({}) with {} sections",
            budget_id,
            budget.name,
            budget.sections.len()
        );
        let record = ObraRecord {
            editor: BudgetEditor::new(budget),
            measurements: Vec::new(),
            chain: CertificateChain::new(budget_id),
        };
        Ok(self.records.entry(budget_id).or_insert(record).editor.summary())
    }

    pub fn budget(&self, budget_id: u64) -> Result<&Budget> {
        Ok(self.record(budget_id)?.editor.budget())
    }

    pub fn summary(&self, budget_id: u64) -> Result<&BudgetSummary> {
        Ok(self.record(budget_id)?.editor.summary())
    }

    pub fn edit_budget(&mut self, budget_id: u64, edit: &BudgetEdit) -> Result<&BudgetSummary> {
        self.record_mut(budget_id)?.editor.apply(edit)
    }

    /// Seeds a draft for `period` from the nearest earlier saved measurement.
    pub fn draft_measurement(&self, budget_id: u64, period: Period) -> Result<DraftMeasurement> {
        let record = self.record(budget_id)?;
        Ok(seed_for_period(
            record.editor.budget(),
            &record.measurements,
            period,
        ))
    }

    /// Saves a draft as a historical measurement. The draft must still be
    /// consistent with the history: a measurement saved for an earlier
    /// period after the draft was seeded makes it stale.
    pub fn save_measurement(&mut self, draft: DraftMeasurement) -> Result<&Measurement> {
        let budget_id = draft.budget_id();
        let period = draft.period();
        let id = self.next_measurement_id;
        let record = self
            .records
            .get_mut(&budget_id)
            .ok_or(CertificationError::BudgetNotFound(budget_id))?;

        record.check_insertable(budget_id, period)?;
        draft.validate_for_save()?;

        let prior = find_nearest_prior(&record.measurements, period);
        for item in draft.sections().iter().flat_map(|s| s.items.iter()) {
            let expected = prior
                .and_then(|p| p.item(&item.id))
                .map(|p| p.acumulado)
                .unwrap_or(0.0);
            if !approx_eq(item.anterior, expected, self.config.tolerance) {
                return Err(CertificationError::CarryForwardMismatch {
                    item_id: item.id.clone(),
                    period,
                    anterior: item.anterior,
                    expected,
                });
            }
        }

        let measurement = draft.finalize(id)?;
        self.next_measurement_id += 1;
        info!(
            "Saved measurement {} for budget {} ({})",
            measurement.id, budget_id, period
        );

        record.measurements.push(measurement);
        record.measurements.sort_by_key(|m| m.period);
        record.measurement(id)
    }

    /// Loads an already-persisted measurement, keeping its id. Bounds are
    /// checked; carry-forward is not, since legacy rows predate it.
    pub fn import_measurement(&mut self, measurement: Measurement) -> Result<&Measurement> {
        let budget_id = measurement.budget_id;
        measurement.validate(self.config.tolerance)?;

        let record = self
            .records
            .get_mut(&budget_id)
            .ok_or(CertificationError::BudgetNotFound(budget_id))?;
        if record.measurements.iter().any(|m| m.id == measurement.id) {
            return Err(CertificationError::validation(
                format!("measurement {}", measurement.id),
                "id already present",
            ));
        }
        if record.measurements.iter().any(|m| m.period == measurement.period) {
            return Err(CertificationError::DuplicatePeriod {
                budget_id,
                period: measurement.period,
            });
        }

        let id = measurement.id;
        debug!(
            "Imported measurement {} for budget {} ({})",
            id, budget_id, measurement.period
        );
        self.next_measurement_id = self.next_measurement_id.max(id + 1);
        record.measurements.push(measurement);
        record.measurements.sort_by_key(|m| m.period);
        record.measurement(id)
    }

    /// Measurements in period order.
    pub fn measurements(&self, budget_id: u64) -> Result<&[Measurement]> {
        Ok(&self.record(budget_id)?.measurements)
    }

    pub fn measurement(&self, budget_id: u64, measurement_id: u64) -> Result<&Measurement> {
        self.record(budget_id)?.measurement(measurement_id)
    }

    /// Only the latest measurement can be removed, and only while no
    /// certificate references it.
    pub fn delete_measurement(&mut self, budget_id: u64, measurement_id: u64) -> Result<Measurement> {
        let record = self.record_mut(budget_id)?;
        let pos = record
            .measurements
            .iter()
            .position(|m| m.id == measurement_id)
            .ok_or(CertificationError::MeasurementNotFound(measurement_id))?;

        if let Some(certificate) = record.chain.by_measurement(measurement_id) {
            return Err(CertificationError::MeasurementInUse {
                measurement_id,
                certificate_id: certificate.id,
            });
        }
        if pos + 1 != record.measurements.len() {
            return Err(CertificationError::validation(
                format!("measurement {}", measurement_id),
                "later measurements carry its values forward",
            ));
        }

        let removed = record.measurements.remove(pos);
        info!(
            "Deleted measurement {} from budget {} ({})",
            removed.id, budget_id, removed.period
        );
        Ok(removed)
    }

    pub fn certify(&mut self, budget_id: u64, measurement_id: u64) -> Result<&Certificate> {
        let id = self.next_certificate_id;
        let policy = self.config.sequence_policy;
        let record = self
            .records
            .get_mut(&budget_id)
            .ok_or(CertificationError::BudgetNotFound(budget_id))?;

        let measurement = record
            .measurements
            .iter()
            .find(|m| m.id == measurement_id)
            .ok_or(CertificationError::MeasurementNotFound(measurement_id))?;

        let certificate = record
            .chain
            .issue(id, record.editor.budget(), measurement, policy)?;
        self.next_certificate_id += 1;
        Ok(certificate)
    }

    pub fn certificates(&self, budget_id: u64) -> Result<&CertificateChain> {
        Ok(&self.record(budget_id)?.chain)
    }

    pub fn certificate(&self, budget_id: u64, certificate_id: u64) -> Result<&Certificate> {
        self.record(budget_id)?
            .chain
            .get(certificate_id)
            .ok_or(CertificationError::CertificateNotFound(certificate_id))
    }

    pub fn links(&self, budget_id: u64, certificate_id: u64) -> Result<ChainLinks> {
        self.record(budget_id)?.chain.links(certificate_id)
    }

    pub fn delete_certificate(&mut self, budget_id: u64, certificate_id: u64) -> Result<Certificate> {
        let policy = self.config.deletion_policy;
        self.record_mut(budget_id)?.chain.remove(certificate_id, policy)
    }

    pub fn report(&self, budget_id: u64, certificate_id: u64) -> Result<CertificateReport> {
        let certificate = self.certificate(budget_id, certificate_id)?;
        let links = self.links(budget_id, certificate_id)?;
        Ok(CertificateReport::from_certificate(certificate, Some(links)))
    }

    pub fn progress_curve(
        &self,
        budget_id: u64,
        start: Period,
        end: Period,
        plan: &BTreeMap<Period, f64>,
    ) -> Result<ProgressCurve> {
        let record = self.record(budget_id)?;
        build_progress_curve(
            &record.chain,
            record.editor.summary().grand_total,
            start,
            end,
            plan,
        )
    }

    /// Runs every consistency check for one budget.
    pub fn verify(&self, budget_id: u64) -> Result<()> {
        let record = self.record(budget_id)?;
        let tolerance = self.config.tolerance;
        verify_percentage_closure(record.editor.summary(), tolerance)?;
        verify_measurement_sequence(&record.measurements, tolerance)?;
        record.chain.verify(tolerance)
    }

    fn record(&self, budget_id: u64) -> Result<&ObraRecord> {
        self.records
            .get(&budget_id)
            .ok_or(CertificationError::BudgetNotFound(budget_id))
    }

    fn record_mut(&mut self, budget_id: u64) -> Result<&mut ObraRecord> {
        self.records
            .get_mut(&budget_id)
            .ok_or(CertificationError::BudgetNotFound(budget_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::BudgetLineItem;
    use crate::config::{DeletionPolicy, SequencePolicy};
    use crate::error::ErrorKind;

    fn p(year: i32, month: u32) -> Period {
        Period::new(year, month).unwrap()
    }

    fn ledger() -> ObraLedger {
        let mut budget = Budget::new(1, "Hospital");
        budget
            .add_item("A", BudgetLineItem::new("X", "Item X", "u", 1.0, 1000.0))
            .unwrap();
        let mut ledger = ObraLedger::default();
        ledger.register_budget(budget).unwrap();
        ledger
    }

    fn save(ledger: &mut ObraLedger, period: Period, presente: f64) -> u64 {
        let mut draft = ledger.draft_measurement(1, period).unwrap();
        draft.apply_presente("X", presente).unwrap();
        ledger.save_measurement(draft).unwrap().id
    }

    #[test]
    fn test_register_twice_rejected() {
        let mut ledger = ledger();
        assert!(ledger.register_budget(Budget::new(1, "Again")).is_err());
        assert!(matches!(
            ledger.budget(2),
            Err(CertificationError::BudgetNotFound(2))
        ));
    }

    #[test]
    fn test_duplicate_and_backdated_periods_rejected() {
        let mut ledger = ledger();
        save(&mut ledger, p(2024, 3), 10.0);

        let mut draft = ledger.draft_measurement(1, p(2024, 3)).unwrap();
        draft.apply_presente("X", 5.0).unwrap();
        assert!(matches!(
            ledger.save_measurement(draft),
            Err(CertificationError::DuplicatePeriod { .. })
        ));

        let mut draft = ledger.draft_measurement(1, p(2024, 1)).unwrap();
        draft.apply_presente("X", 5.0).unwrap();
        assert_eq!(
            ledger.save_measurement(draft).unwrap_err().kind(),
            ErrorKind::Validation
        );
    }

    #[test]
    fn test_stale_draft_rejected() {
        let mut ledger = ledger();
        let mut stale = ledger.draft_measurement(1, p(2024, 2)).unwrap();
        stale.apply_presente("X", 5.0).unwrap();

        save(&mut ledger, p(2024, 1), 10.0);

        assert!(matches!(
            ledger.save_measurement(stale),
            Err(CertificationError::CarryForwardMismatch { .. })
        ));
    }

    #[test]
    fn test_measurement_deletion_rules() {
        let mut ledger = ledger();
        let first = save(&mut ledger, p(2024, 1), 10.0);
        let second = save(&mut ledger, p(2024, 2), 10.0);

        assert!(ledger.delete_measurement(1, first).is_err());

        ledger.certify(1, second).unwrap();
        assert!(matches!(
            ledger.delete_measurement(1, second),
            Err(CertificationError::MeasurementInUse { .. })
        ));
    }

    #[test]
    fn test_certificate_deletion_follows_config() {
        let mut budget = Budget::new(1, "Hospital");
        budget
            .add_item("A", BudgetLineItem::new("X", "Item X", "u", 1.0, 1000.0))
            .unwrap();
        let config = LedgerConfig {
            deletion_policy: DeletionPolicy::Relink,
            sequence_policy: SequencePolicy::Strict,
            ..LedgerConfig::default()
        };
        let mut ledger = ObraLedger::new(config).unwrap();
        ledger.register_budget(budget).unwrap();

        let m1 = save(&mut ledger, p(2024, 1), 10.0);
        let m2 = save(&mut ledger, p(2024, 2), 20.0);
        let m3 = save(&mut ledger, p(2024, 3), 30.0);
        let c1 = ledger.certify(1, m1).unwrap().id;
        let c2 = ledger.certify(1, m2).unwrap().id;
        let c3 = ledger.certify(1, m3).unwrap().id;

        ledger.delete_certificate(1, c2).unwrap();
        let links = ledger.links(1, c3).unwrap();
        assert_eq!(links.previous_id, Some(c1));
        assert!(ledger.verify(1).is_ok());
    }

    #[test]
    fn test_import_keeps_ids_and_advances_counter() {
        let mut ledger = ledger();
        let imported = Measurement {
            id: 40,
            budget_id: 1,
            period: p(2023, 12),
            sections: vec![],
        };
        ledger.import_measurement(imported).unwrap();
        let id = save(&mut ledger, p(2024, 1), 10.0);
        assert_eq!(id, 41);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = LedgerConfig {
            tolerance: f64::INFINITY,
            ..LedgerConfig::default()
        };
        assert!(ObraLedger::new(config).is_err());
    }
}
