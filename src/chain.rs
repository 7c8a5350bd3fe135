//! Per-budget certificate chain.
//!
//! Certificates are kept in a vector sorted by period. "Previous" and "next"
//! are positions in that vector rather than stored references, so removing
//! a certificate can never leave a dangling link.

use crate::budget::Budget;
use crate::certificate::{certify, Certificate};
use crate::config::{DeletionPolicy, SequencePolicy};
use crate::error::{CertificationError, Result};
use crate::measurement::Measurement;
use log::{info, warn};
use serde::{Deserialize, Serialize};

/// Neighbour ids of one certificate, derived from the chain order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainLinks {
    pub certificate_id: u64,
    pub previous_id: Option<u64>,
    pub next_id: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CertificateChain {
    budget_id: u64,
    certificates: Vec<Certificate>,
}

impl CertificateChain {
    pub fn new(budget_id: u64) -> Self {
        Self {
            budget_id,
            certificates: Vec::new(),
        }
    }

    pub fn budget_id(&self) -> u64 {
        self.budget_id
    }

    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }

    /// Certificates in period order.
    pub fn iter(&self) -> impl Iterator<Item = &Certificate> {
        self.certificates.iter()
    }

    pub fn head(&self) -> Option<&Certificate> {
        self.certificates.first()
    }

    pub fn tail(&self) -> Option<&Certificate> {
        self.certificates.last()
    }

    pub fn get(&self, certificate_id: u64) -> Option<&Certificate> {
        self.certificates.iter().find(|c| c.id == certificate_id)
    }

    pub fn by_measurement(&self, measurement_id: u64) -> Option<&Certificate> {
        self.certificates
            .iter()
            .find(|c| c.measurement_id == measurement_id)
    }

    pub fn previous_of(&self, certificate_id: u64) -> Option<&Certificate> {
        let pos = self.position(certificate_id).ok()?;
        pos.checked_sub(1).and_then(|p| self.certificates.get(p))
    }

    pub fn next_of(&self, certificate_id: u64) -> Option<&Certificate> {
        let pos = self.position(certificate_id).ok()?;
        self.certificates.get(pos + 1)
    }

    pub fn links(&self, certificate_id: u64) -> Result<ChainLinks> {
        self.position(certificate_id)?;
        Ok(ChainLinks {
            certificate_id,
            previous_id: self.previous_of(certificate_id).map(|c| c.id),
            next_id: self.next_of(certificate_id).map(|c| c.id),
        })
    }

    /// Certifies `measurement` and places the certificate in the chain.
    pub fn issue(
        &mut self,
        id: u64,
        budget: &Budget,
        measurement: &Measurement,
        policy: SequencePolicy,
    ) -> Result<&Certificate> {
        if budget.id != self.budget_id {
            return Err(CertificationError::validation(
                format!("budget {}", budget.id),
                format!("chain belongs to budget {}", self.budget_id),
            ));
        }
        if let Some(existing) = self.by_measurement(measurement.id) {
            return Err(CertificationError::AlreadyCertified {
                measurement_id: measurement.id,
                certificate_id: existing.id,
            });
        }

        let pos = match policy {
            SequencePolicy::Strict => {
                let certificate = certify(id, budget, measurement, self.tail())?;
                self.certificates.push(certificate);
                self.certificates.len() - 1
            }
            SequencePolicy::Lenient => {
                if let Some(existing) = self
                    .certificates
                    .iter()
                    .find(|c| c.period == measurement.period)
                {
                    return Err(CertificationError::PeriodAlreadyCertified {
                        period: measurement.period,
                        certificate_id: existing.id,
                    });
                }
                let certificate = certify(id, budget, measurement, None)?;
                let pos = self
                    .certificates
                    .iter()
                    .position(|c| c.period > certificate.period)
                    .unwrap_or(self.certificates.len());
                if let Some(tail) = self.tail() {
                    if certificate.period <= tail.period {
                        warn!(
                            "Accepting certificate for {} on budget {} although the chain already reaches {}",
                            certificate.period, self.budget_id, tail.period
                        );
                    }
                }
                self.certificates.insert(pos, certificate);
                self.relink_from(pos);
                pos
            }
        };

        let certificate = &self.certificates[pos];
        info!(
            "Issued certificate {} for budget {} ({}): total {:.2}",
            certificate.id, self.budget_id, certificate.period, certificate.total_certified
        );
        Ok(certificate)
    }

    /// Removes a certificate under `policy`, re-deriving the successor's
    /// delta from its new predecessor.
    pub fn remove(&mut self, certificate_id: u64, policy: DeletionPolicy) -> Result<Certificate> {
        let pos = self.position(certificate_id)?;

        if policy == DeletionPolicy::TailOnly {
            if let Some(successor) = self.certificates.get(pos + 1) {
                return Err(CertificationError::CertificateNotTail {
                    certificate_id,
                    successor_id: successor.id,
                });
            }
        }

        let removed = self.certificates.remove(pos);
        self.relink_from(pos);
        info!(
            "Deleted certificate {} from budget {} ({})",
            removed.id, self.budget_id, removed.period
        );
        Ok(removed)
    }

    /// Checks that periods strictly increase and every delta matches its
    /// predecessor.
    pub fn verify(&self, tolerance: f64) -> Result<()> {
        for (i, certificate) in self.certificates.iter().enumerate() {
            let previous = i.checked_sub(1).map(|p| &self.certificates[p]);
            match previous {
                Some(prev) => {
                    if certificate.period <= prev.period {
                        return Err(CertificationError::OutOfSequence {
                            period: certificate.period,
                            tail_period: prev.period,
                        });
                    }
                    let expected = certificate.total_certified - prev.total_certified;
                    let delta_ok = certificate
                        .delta
                        .map(|d| (d - expected).abs() <= tolerance)
                        .unwrap_or(false);
                    if !delta_ok {
                        return Err(CertificationError::validation(
                            format!("certificate {}", certificate.id),
                            format!("delta {:?} does not match {}", certificate.delta, expected),
                        ));
                    }
                }
                None => {
                    if certificate.delta.is_some() {
                        return Err(CertificationError::validation(
                            format!("certificate {}", certificate.id),
                            "chain head cannot carry a delta",
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    fn position(&self, certificate_id: u64) -> Result<usize> {
        self.certificates
            .iter()
            .position(|c| c.id == certificate_id)
            .ok_or(CertificationError::CertificateNotFound(certificate_id))
    }

    fn relink_from(&mut self, start: usize) {
        for i in start..self.certificates.len() {
            let previous_total = i
                .checked_sub(1)
                .map(|p| self.certificates[p].total_certified);
            let certificate = &mut self.certificates[i];
            let total = certificate.total_certified;
            certificate.delta = previous_total.map(|p| total - p);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::BudgetLineItem;
    use crate::measurement::{MeasurementItem, MeasurementSection};
    use crate::period::Period;

    fn budget() -> Budget {
        let mut budget = Budget::new(4, "Chain");
        budget
            .add_item("A", BudgetLineItem::new("a1", "Item", "u", 10.0, 100.0))
            .unwrap();
        budget
    }

    fn measurement(id: u64, month: u32, acumulado: f64) -> Measurement {
        Measurement {
            id,
            budget_id: 4,
            period: Period::new(2024, month).unwrap(),
            sections: vec![MeasurementSection {
                name: "A".to_string(),
                items: vec![MeasurementItem {
                    id: "a1".to_string(),
                    anterior: 0.0,
                    presente: acumulado,
                    acumulado,
                }],
            }],
        }
    }

    fn chain_of_three() -> CertificateChain {
        let budget = budget();
        let mut chain = CertificateChain::new(4);
        chain
            .issue(1, &budget, &measurement(10, 1, 10.0), SequencePolicy::Strict)
            .unwrap();
        chain
            .issue(2, &budget, &measurement(11, 2, 30.0), SequencePolicy::Strict)
            .unwrap();
        chain
            .issue(3, &budget, &measurement(12, 3, 60.0), SequencePolicy::Strict)
            .unwrap();
        chain
    }

    #[test]
    fn test_links_are_derived_from_order() {
        let chain = chain_of_three();
        assert_eq!(chain.head().unwrap().id, 1);
        assert_eq!(chain.tail().unwrap().id, 3);

        let links = chain.links(2).unwrap();
        assert_eq!(links.previous_id, Some(1));
        assert_eq!(links.next_id, Some(3));

        let head = chain.links(1).unwrap();
        assert_eq!(head.previous_id, None);
        assert_eq!(chain.links(3).unwrap().next_id, None);
        assert!(chain.links(99).is_err());

        assert!((chain.get(3).unwrap().delta.unwrap() - 300.0).abs() < 1e-9);
        assert!(chain.verify(1e-6).is_ok());
    }

    #[test]
    fn test_strict_rejects_out_of_order_and_duplicates() {
        let budget = budget();
        let mut chain = chain_of_three();

        let err = chain
            .issue(4, &budget, &measurement(13, 2, 70.0), SequencePolicy::Strict)
            .unwrap_err();
        assert!(matches!(err, CertificationError::OutOfSequence { .. }));

        let err = chain
            .issue(4, &budget, &measurement(12, 4, 70.0), SequencePolicy::Strict)
            .unwrap_err();
        assert!(matches!(err, CertificationError::AlreadyCertified { .. }));
        assert_eq!(chain.len(), 3);
    }

    #[test]
    fn test_lenient_inserts_by_period() {
        let budget = budget();
        let mut chain = CertificateChain::new(4);
        chain
            .issue(1, &budget, &measurement(10, 1, 10.0), SequencePolicy::Lenient)
            .unwrap();
        chain
            .issue(2, &budget, &measurement(12, 5, 60.0), SequencePolicy::Lenient)
            .unwrap();
        chain
            .issue(3, &budget, &measurement(11, 3, 30.0), SequencePolicy::Lenient)
            .unwrap();

        let order: Vec<u64> = chain.iter().map(|c| c.id).collect();
        assert_eq!(order, vec![1, 3, 2]);
        assert!((chain.get(2).unwrap().delta.unwrap() - 300.0).abs() < 1e-9);
        assert!(chain.verify(1e-6).is_ok());
    }

    #[test]
    fn test_lenient_rejects_certified_period() {
        let budget = budget();
        let mut chain = CertificateChain::new(4);
        chain
            .issue(1, &budget, &measurement(10, 3, 30.0), SequencePolicy::Lenient)
            .unwrap();

        let err = chain
            .issue(2, &budget, &measurement(11, 3, 40.0), SequencePolicy::Lenient)
            .unwrap_err();
        assert!(matches!(
            err,
            CertificationError::PeriodAlreadyCertified {
                certificate_id: 1,
                ..
            }
        ));
        assert_eq!(err.kind(), crate::error::ErrorKind::Sequence);
        assert_eq!(chain.len(), 1);
        assert!(chain.verify(1e-6).is_ok());
    }

    #[test]
    fn test_tail_only_deletion() {
        let mut chain = chain_of_three();
        let err = chain.remove(2, DeletionPolicy::TailOnly).unwrap_err();
        assert!(matches!(
            err,
            CertificationError::CertificateNotTail { successor_id: 3, .. }
        ));

        chain.remove(3, DeletionPolicy::TailOnly).unwrap();
        assert_eq!(chain.tail().unwrap().id, 2);
        assert_eq!(chain.links(2).unwrap().next_id, None);
    }

    #[test]
    fn test_relink_deletion_closes_gap() {
        let mut chain = chain_of_three();
        chain.remove(2, DeletionPolicy::Relink).unwrap();

        let links = chain.links(3).unwrap();
        assert_eq!(links.previous_id, Some(1));
        assert!((chain.get(3).unwrap().delta.unwrap() - 500.0).abs() < 1e-9);
        assert!(chain.verify(1e-6).is_ok());

        chain.remove(1, DeletionPolicy::Relink).unwrap();
        assert_eq!(chain.head().unwrap().delta, None);
    }

    #[test]
    fn test_wrong_budget_rejected() {
        let mut chain = CertificateChain::new(77);
        assert!(chain
            .issue(1, &budget(), &measurement(10, 1, 10.0), SequencePolicy::Strict)
            .is_err());
    }
}
