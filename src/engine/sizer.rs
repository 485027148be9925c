use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::common::types::InstrumentSpec;

/// How a raw size is snapped to the volume step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeRounding {
    /// Truncate toward zero, never risking more than the budget
    #[default]
    Floor,
    /// Round half away from zero
    Nearest,
}

/// Sizing failure, reported instead of silently clamping
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SizingError {
    #[error("Trade volume is less than minimum tradable amount: [Amount: {size}, MinTradableAmount: {min}]")]
    SizeBelowMinimum { size: Decimal, min: Decimal },

    #[error("Trade volume is greater than maximum tradable amount: [Amount: {size}, MaxTradableAmount: {max}]")]
    SizeAboveMaximum { size: Decimal, max: Decimal },

    #[error("Stop distance must be positive: [StopDistance: {0}]")]
    NonPositiveStopDistance(Decimal),

    #[error("Trade volume is out of the representable range")]
    Overflow,
}

/// Converts a risk budget and a stop distance into a tradable volume
///
/// `raw = budget / (stop_pips * pip_value)`, snapped to `volume_step` and then
/// checked against `[min_volume, max_volume]`. The instrument must already be
/// validated (positive pip size, pip value and step).
#[derive(Debug, Clone)]
pub struct RiskSizer {
    spec: InstrumentSpec,
    rounding: SizeRounding,
}

impl RiskSizer {
    pub fn new(spec: InstrumentSpec, rounding: SizeRounding) -> Self {
        Self { spec, rounding }
    }

    /// Price distance expressed in pips
    pub fn stop_distance_in_pips(&self, stop_distance: Decimal) -> Result<Decimal, SizingError> {
        stop_distance
            .abs()
            .checked_div(self.spec.pip_size)
            .ok_or(SizingError::Overflow)
    }

    /// Unrounded volume for a budget and a stop distance in price units
    pub fn raw_size(&self, risk_budget: Decimal, stop_distance: Decimal) -> Result<Decimal, SizingError> {
        self.raw_size_for_pips(risk_budget, self.stop_distance_in_pips(stop_distance)?)
    }

    /// Unrounded volume for a budget and a stop distance already in pips
    pub fn raw_size_for_pips(&self, risk_budget: Decimal, stop_pips: Decimal) -> Result<Decimal, SizingError> {
        let risk_per_unit = stop_pips
            .checked_mul(self.spec.pip_value)
            .ok_or(SizingError::Overflow)?;
        if risk_per_unit <= Decimal::ZERO {
            return Err(SizingError::NonPositiveStopDistance(stop_pips));
        }
        risk_budget
            .checked_div(risk_per_unit)
            .ok_or(SizingError::Overflow)
    }

    /// Snap a raw volume to a multiple of the volume step
    pub fn round_to_step(&self, raw_size: Decimal) -> Result<Decimal, SizingError> {
        let steps = raw_size
            .checked_div(self.spec.volume_step)
            .ok_or(SizingError::Overflow)?;
        let steps = match self.rounding {
            SizeRounding::Floor => steps.trunc(),
            SizeRounding::Nearest => steps.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero),
        };
        steps
            .checked_mul(self.spec.volume_step)
            .map(|size| size.normalize())
            .ok_or(SizingError::Overflow)
    }

    /// Check a rounded volume against the tradable bounds
    pub fn check_bounds(&self, size: Decimal) -> Result<Decimal, SizingError> {
        if size < self.spec.min_volume {
            return Err(SizingError::SizeBelowMinimum {
                size,
                min: self.spec.min_volume,
            });
        }
        if size > self.spec.max_volume {
            return Err(SizingError::SizeAboveMaximum {
                size,
                max: self.spec.max_volume,
            });
        }
        Ok(size)
    }

    /// Full pipeline: raw size, step rounding, bounds
    pub fn size(&self, risk_budget: Decimal, stop_distance: Decimal) -> Result<Decimal, SizingError> {
        let raw = self.raw_size(risk_budget, stop_distance)?;
        self.check_bounds(self.round_to_step(raw)?)
    }

    /// Margin the platform will lock for a position: notional / leverage
    pub fn expected_margin(&self, size: Decimal, price: Decimal) -> Result<Decimal, SizingError> {
        size.checked_mul(price)
            .and_then(|notional| notional.checked_div(self.spec.leverage))
            .ok_or(SizingError::Overflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn spec(step: Decimal, min: Decimal, max: Decimal) -> InstrumentSpec {
        InstrumentSpec {
            pip_size: dec!(1),
            pip_value: dec!(1),
            volume_step: step,
            min_volume: min,
            max_volume: max,
            leverage: dec!(30),
        }
    }

    #[test]
    fn test_exact_size_within_bounds() {
        let sizer = RiskSizer::new(spec(dec!(0.01), dec!(0.01), dec!(10)), SizeRounding::Floor);
        let raw = sizer.raw_size_for_pips(dec!(100), dec!(50)).unwrap();
        assert_eq!(raw, dec!(2));
        assert_eq!(sizer.size(dec!(100), dec!(50)).unwrap(), dec!(2.0));
    }

    #[test]
    fn test_size_above_maximum_is_reported() {
        let sizer = RiskSizer::new(spec(dec!(0.01), dec!(0.01), dec!(1.5)), SizeRounding::Floor);
        let err = sizer.size(dec!(100), dec!(50)).unwrap_err();
        assert_eq!(
            err,
            SizingError::SizeAboveMaximum {
                size: dec!(2),
                max: dec!(1.5)
            }
        );
    }

    #[test]
    fn test_floor_never_rounds_up() {
        let sizer = RiskSizer::new(spec(dec!(0.1), dec!(0.1), dec!(100)), SizeRounding::Floor);
        // 100 / 30 = 3.333.. -> 3.3
        assert_eq!(sizer.size(dec!(100), dec!(30)).unwrap(), dec!(3.3));
        // 100 / 14 = 7.142.. -> 7.1
        assert_eq!(sizer.size(dec!(100), dec!(14)).unwrap(), dec!(7.1));
    }

    #[test]
    fn test_nearest_rounding_policy() {
        let sizer = RiskSizer::new(spec(dec!(0.1), dec!(0.1), dec!(100)), SizeRounding::Nearest);
        // 100 / 14 = 7.142.. -> 7.1, 100 / 15.5 = 6.45.. -> 6.5
        assert_eq!(sizer.size(dec!(100), dec!(14)).unwrap(), dec!(7.1));
        assert_eq!(sizer.size(dec!(100), dec!(15.5)).unwrap(), dec!(6.5));
    }

    #[test]
    fn test_below_minimum_when_budget_too_small() {
        let sizer = RiskSizer::new(spec(dec!(1000), dec!(1000), dec!(1000000)), SizeRounding::Floor);
        let err = sizer.size(dec!(10), dec!(50)).unwrap_err();
        assert!(matches!(err, SizingError::SizeBelowMinimum { size, .. } if size.is_zero()));
    }

    #[test]
    fn test_zero_stop_distance_is_error() {
        let sizer = RiskSizer::new(spec(dec!(1), dec!(1), dec!(10)), SizeRounding::Floor);
        assert!(matches!(
            sizer.size(dec!(100), Decimal::ZERO),
            Err(SizingError::NonPositiveStopDistance(_))
        ));
    }

    #[test]
    fn test_size_is_step_multiple_and_monotonic_in_distance() {
        let step = dec!(0.01);
        let sizer = RiskSizer::new(spec(step, Decimal::ZERO, dec!(1000000)), SizeRounding::Floor);
        let budget = dec!(250);
        let mut previous: Option<Decimal> = None;

        // Shrinking stop distances must never grow the size beyond budget / distance
        for distance in [dec!(400), dec!(123.4), dec!(77), dec!(50), dec!(12.5), dec!(3), dec!(0.7)] {
            let size = sizer.size(budget, distance).unwrap();
            assert!(size >= Decimal::ZERO);
            assert_eq!(size % step, Decimal::ZERO);
            assert!(size * distance <= budget);
            if let Some(prev) = previous {
                assert!(size >= prev);
            }
            previous = Some(size);
        }
    }

    #[test]
    fn test_pips_conversion_uses_pip_size() {
        let mut s = spec(dec!(1000), dec!(1000), dec!(10000000));
        s.pip_size = dec!(0.0001);
        s.pip_value = dec!(0.0001);
        let sizer = RiskSizer::new(s, SizeRounding::Floor);
        assert_eq!(sizer.stop_distance_in_pips(dec!(-0.0050)), Ok(dec!(50)));
        // 500 / (50 * 0.0001) = 100000
        assert_eq!(sizer.size(dec!(500), dec!(0.0050)).unwrap(), dec!(100000));
    }

    #[test]
    fn test_expected_margin() {
        let sizer = RiskSizer::new(spec(dec!(1), dec!(1), dec!(10)), SizeRounding::Floor);
        assert_eq!(sizer.expected_margin(dec!(3), dec!(100)), Ok(dec!(10)));
    }

    #[test]
    fn test_overflow_is_reported_not_panicking() {
        let mut s = spec(dec!(0.01), dec!(0.01), Decimal::MAX);
        s.pip_size = dec!(0.0001);
        let sizer = RiskSizer::new(s, SizeRounding::Floor);

        assert_eq!(sizer.stop_distance_in_pips(Decimal::MAX), Err(SizingError::Overflow));
        assert_eq!(sizer.size(Decimal::MAX, dec!(0.0001)), Err(SizingError::Overflow));
        assert_eq!(sizer.expected_margin(Decimal::MAX, dec!(100)), Err(SizingError::Overflow));
    }
}
