use crate::arithmetic::share_percent;
use crate::chain::CertificateChain;
use crate::error::{CertificationError, Result};
use crate::period::{months_in_range, Period};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CurveOrigin {
    /// At least one certificate was issued for this month.
    Certified,
    /// No certificate this month; the last certified total carries over.
    CarriedForward,
    /// Nothing certified yet.
    Pending,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    pub planned_percent: f64,
    /// Amount certified in this month alone.
    pub certified_amount: f64,
    pub cumulative_amount: f64,
    pub cumulative_percent: f64,
    pub origin: CurveOrigin,
}

pub type ProgressCurve = BTreeMap<Period, CurvePoint>;

/// Expands the sparse certificate chain into one point per month of the
/// contract window `start..=end`. `plan` holds the planned cumulative
/// percentage per month; months without a plan entry get 0. Certificates
/// before `start` seed the cumulative figures; those after `end` are
/// ignored.
pub fn build_progress_curve(
    chain: &CertificateChain,
    grand_total: f64,
    start: Period,
    end: Period,
    plan: &BTreeMap<Period, f64>,
) -> Result<ProgressCurve> {
    if end < start {
        return Err(CertificationError::InvalidPeriod(format!(
            "contract end {} is before start {}",
            end, start
        )));
    }

    let mut certified_by_month: BTreeMap<Period, f64> = BTreeMap::new();
    let mut cumulative_by_month: BTreeMap<Period, f64> = BTreeMap::new();
    for certificate in chain.iter() {
        *certified_by_month.entry(certificate.period).or_insert(0.0) += certificate.period_amount();
        // Chain order is period order, so the last write per month wins.
        cumulative_by_month.insert(certificate.period, certificate.total_certified);
    }

    let mut cumulative_amount = cumulative_by_month
        .range(..start)
        .next_back()
        .map(|(_, total)| *total);

    let mut curve = ProgressCurve::new();
    for month in months_in_range(start, end) {
        let certified_amount = certified_by_month.get(&month).copied();
        if let Some(total) = cumulative_by_month.get(&month) {
            cumulative_amount = Some(*total);
        }

        let origin = match (certified_amount, cumulative_amount) {
            (Some(_), _) => CurveOrigin::Certified,
            (None, Some(_)) => CurveOrigin::CarriedForward,
            (None, None) => CurveOrigin::Pending,
        };
        let cumulative = cumulative_amount.unwrap_or(0.0);

        curve.insert(
            month,
            CurvePoint {
                planned_percent: plan.get(&month).copied().unwrap_or(0.0),
                certified_amount: certified_amount.unwrap_or(0.0),
                cumulative_amount: cumulative,
                cumulative_percent: share_percent(cumulative, grand_total),
                origin,
            },
        );
    }

    Ok(curve)
}
