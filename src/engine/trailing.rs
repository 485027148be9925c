use rust_decimal::Decimal;

use crate::common::types::{Bar, Direction};
use crate::engine::types::TrailingLevel;

/// Maps "price crossed level k" to "move the stop to level k's price"
///
/// Borrowed view over a plan's levels plus the index already applied. Only the
/// highest level a bar reaches is reported, so a bar spanning several levels
/// skips the intermediate stops.
#[derive(Debug, Clone, Copy)]
pub struct TrailingStopManager<'a> {
    levels: &'a [TrailingLevel],
    direction: Direction,
    applied: Option<usize>,
}

impl<'a> TrailingStopManager<'a> {
    pub fn new(levels: &'a [TrailingLevel], direction: Direction, applied: Option<usize>) -> Self {
        Self {
            levels,
            direction,
            applied,
        }
    }

    /// First index not yet applied
    fn next_index(&self) -> usize {
        self.applied.map_or(0, |i| i + 1)
    }

    /// Highest not-yet-applied level whose trigger the bar reached
    pub fn evaluate(&self, bar: &Bar) -> Option<usize> {
        let start = self.next_index();
        let pending = self.levels.get(start..)?;
        pending
            .iter()
            .rposition(|level| bar.extends_to(level.trigger_price, self.direction))
            .map(|offset| start + offset)
    }

    /// Record that `index` was applied; refuses to go backwards
    pub fn commit(&mut self, index: usize) -> bool {
        if index >= self.levels.len() || index < self.next_index() {
            return false;
        }
        self.applied = Some(index);
        true
    }

    pub fn level(&self, index: usize) -> Option<&TrailingLevel> {
        self.levels.get(index)
    }

    pub fn applied(&self) -> Option<usize> {
        self.applied
    }

    /// True once the last level has been applied (vacuously false with no levels)
    pub fn is_complete(&self) -> bool {
        !self.levels.is_empty() && self.applied == Some(self.levels.len() - 1)
    }

    /// Stop implied by the applied levels, or `initial` if none applied yet
    pub fn current_stop(&self, initial: Decimal) -> Decimal {
        self.applied
            .and_then(|i| self.levels.get(i))
            .map_or(initial, |level| level.new_stop_price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn long_levels() -> Vec<TrailingLevel> {
        vec![
            TrailingLevel {
                trigger_price: dec!(105),
                new_stop_price: dec!(92),
            },
            TrailingLevel {
                trigger_price: dec!(107),
                new_stop_price: dec!(100),
            },
        ]
    }

    fn bar(high: Decimal, low: Decimal) -> Bar {
        Bar::new(low, high, low, high, Utc::now())
    }

    #[test]
    fn test_nothing_reached() {
        let levels = long_levels();
        let manager = TrailingStopManager::new(&levels, Direction::Long, None);
        assert_eq!(manager.evaluate(&bar(dec!(104.99), dec!(100))), None);
    }

    #[test]
    fn test_first_level_then_second() {
        let levels = long_levels();
        let mut manager = TrailingStopManager::new(&levels, Direction::Long, None);

        assert_eq!(manager.evaluate(&bar(dec!(105), dec!(101))), Some(0));
        assert!(manager.commit(0));
        assert_eq!(manager.current_stop(dec!(90)), dec!(92));

        // same bar again: already applied
        assert_eq!(manager.evaluate(&bar(dec!(105), dec!(101))), None);

        assert_eq!(manager.evaluate(&bar(dec!(107.5), dec!(104))), Some(1));
        assert!(manager.commit(1));
        assert!(manager.is_complete());
        assert_eq!(manager.evaluate(&bar(dec!(120), dec!(110))), None);
    }

    #[test]
    fn test_wide_bar_applies_only_highest_level() {
        let levels = long_levels();
        let manager = TrailingStopManager::new(&levels, Direction::Long, None);
        assert_eq!(manager.evaluate(&bar(dec!(108), dec!(99))), Some(1));
    }

    #[test]
    fn test_commit_is_monotonic() {
        let levels = long_levels();
        let mut manager = TrailingStopManager::new(&levels, Direction::Long, Some(1));
        assert!(!manager.commit(0));
        assert!(!manager.commit(1));
        assert!(!manager.commit(2));
        assert_eq!(manager.applied(), Some(1));
    }

    #[test]
    fn test_short_levels() {
        let levels = vec![
            TrailingLevel {
                trigger_price: dec!(95),
                new_stop_price: dec!(108),
            },
            TrailingLevel {
                trigger_price: dec!(93),
                new_stop_price: dec!(100),
            },
        ];
        let manager = TrailingStopManager::new(&levels, Direction::Short, None);
        assert_eq!(manager.evaluate(&bar(dec!(99), dec!(95.01))), None);
        assert_eq!(manager.evaluate(&bar(dec!(99), dec!(94))), Some(0));
        assert_eq!(manager.evaluate(&bar(dec!(99), dec!(93))), Some(1));
    }

    #[test]
    fn test_no_levels_never_triggers() {
        let manager = TrailingStopManager::new(&[], Direction::Long, None);
        assert_eq!(manager.evaluate(&bar(dec!(1000), dec!(1))), None);
        assert!(!manager.is_complete());
        assert_eq!(manager.current_stop(dec!(90)), dec!(90));
    }
}
