use crate::budget::Budget;
use crate::measurement::{seed_measurement, DraftMeasurement, Measurement};
use crate::period::Period;

/// The measurement strictly before `target` that is closest to it in whole
/// months. Insertion order of `measurements` is irrelevant; a measurement in
/// the same month as `target` is not "prior".
pub fn find_nearest_prior<'a, I>(measurements: I, target: Period) -> Option<&'a Measurement>
where
    I: IntoIterator<Item = &'a Measurement>,
{
    measurements
        .into_iter()
        .filter(|m| m.period < target)
        .min_by_key(|m| m.period.months_until(target))
}

/// The earliest measurement strictly after `target`, if any.
pub fn find_nearest_following<'a, I>(measurements: I, target: Period) -> Option<&'a Measurement>
where
    I: IntoIterator<Item = &'a Measurement>,
{
    measurements
        .into_iter()
        .filter(|m| m.period > target)
        .min_by_key(|m| target.months_until(m.period))
}

/// Seeds a draft for `period` from the nearest prior measurement in
/// `history`.
pub fn seed_for_period<'a, I>(budget: &Budget, history: I, period: Period) -> DraftMeasurement
where
    I: IntoIterator<Item = &'a Measurement>,
{
    let previous = find_nearest_prior(history, period);
    seed_measurement(budget, previous, period)
}
