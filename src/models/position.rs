//! Single-direction leveraged position.
//!
//! Exactly one instance exists per traded symbol, owned by the position
//! manager and mutated only on confirmed fills. Invariants: `size >= 0` and
//! `size == 0` iff `direction == None`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::opinion::Direction;
use super::signal::FillResult;

/// Side of the held position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    None,
    Long,
    Short,
}

impl PositionSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Long => "long",
            Self::Short => "short",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(Self::None),
            "long" => Some(Self::Long),
            "short" => Some(Self::Short),
            _ => None,
        }
    }

    pub fn matches(&self, direction: Direction) -> bool {
        matches!(
            (self, direction),
            (Self::Long, Direction::Long) | (Self::Short, Direction::Short)
        )
    }

    pub fn from_direction(direction: Direction) -> Self {
        match direction {
            Direction::Long => Self::Long,
            Direction::Short => Self::Short,
            Direction::Flat => Self::None,
        }
    }
}

/// Current holding in the traded instrument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub direction: PositionSide,
    /// Base units held, never negative.
    pub size: Decimal,
    /// Cost-basis average entry price.
    pub entry_price: Decimal,
    pub unrealized_pnl: Decimal,
    /// Quote notional spent building the position; the sizing cap compares
    /// against this.
    pub accumulated_cost: Decimal,
}

impl Position {
    pub fn flat() -> Self {
        Self {
            direction: PositionSide::None,
            size: Decimal::ZERO,
            entry_price: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            accumulated_cost: Decimal::ZERO,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.direction == PositionSide::None
    }

    /// Quote notional currently committed.
    pub fn notional(&self) -> Decimal {
        self.accumulated_cost
    }

    /// Open a fresh position from a confirmed fill.
    pub fn open(direction: Direction, fill: &FillResult) -> Self {
        let mut position = Self {
            direction: PositionSide::from_direction(direction),
            size: fill.filled_size,
            entry_price: fill.avg_price,
            unrealized_pnl: Decimal::ZERO,
            accumulated_cost: fill.filled_size * fill.avg_price,
        };
        position.update_price(fill.avg_price);
        position
    }

    /// Pyramid into the existing direction, averaging the entry price.
    pub fn add_fill(&mut self, fill: &FillResult) {
        let added_cost = fill.filled_size * fill.avg_price;
        let new_size = self.size + fill.filled_size;
        if !new_size.is_zero() {
            self.entry_price = (self.accumulated_cost + added_cost) / new_size;
        }
        self.size = new_size;
        self.accumulated_cost += added_cost;
        self.update_price(fill.avg_price);
    }

    /// Shed part of the position. Returns realized P&L for the reduced slice.
    /// Reducing to zero resets the position to flat.
    pub fn reduce_fill(&mut self, fill: &FillResult) -> Decimal {
        let reduced = fill.filled_size.min(self.size);
        let realized = match self.direction {
            PositionSide::Long => reduced * (fill.avg_price - self.entry_price),
            PositionSide::Short => reduced * (self.entry_price - fill.avg_price),
            PositionSide::None => Decimal::ZERO,
        };

        self.size -= reduced;
        self.accumulated_cost = self.size * self.entry_price;
        if self.size.is_zero() {
            *self = Self::flat();
        } else {
            self.update_price(fill.avg_price);
        }
        realized
    }

    /// Full close on a confirmed fill.
    pub fn close_out(&mut self) {
        *self = Self::flat();
    }

    /// Refresh unrealized P&L against the latest price.
    pub fn update_price(&mut self, price: Decimal) {
        self.unrealized_pnl = match self.direction {
            PositionSide::Long => (price - self.entry_price) * self.size,
            PositionSide::Short => (self.entry_price - price) * self.size,
            PositionSide::None => Decimal::ZERO,
        };
    }

    /// Signed return fraction against entry. Positive means in profit.
    pub fn pnl_fraction(&self, price: Decimal) -> Decimal {
        if self.entry_price.is_zero() {
            return Decimal::ZERO;
        }
        let change = (price - self.entry_price) / self.entry_price;
        match self.direction {
            PositionSide::Long => change,
            PositionSide::Short => -change,
            PositionSide::None => Decimal::ZERO,
        }
    }

    /// Structural invariants, checked after every apply.
    pub fn invariants_hold(&self) -> bool {
        self.size >= Decimal::ZERO
            && (self.size.is_zero() == (self.direction == PositionSide::None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn fill(size: Decimal, price: Decimal) -> FillResult {
        FillResult {
            filled_size: size,
            avg_price: price,
        }
    }

    #[test]
    fn open_and_average_in() {
        let mut pos = Position::open(Direction::Long, &fill(dec!(2), dec!(100)));
        assert_eq!(pos.accumulated_cost, dec!(200));
        assert_eq!(pos.entry_price, dec!(100));

        pos.add_fill(&fill(dec!(2), dec!(110)));
        assert_eq!(pos.size, dec!(4));
        assert_eq!(pos.entry_price, dec!(105));
        assert_eq!(pos.accumulated_cost, dec!(420));
        assert!(pos.invariants_hold());
    }

    #[test]
    fn reduce_to_zero_resets_flat() {
        let mut pos = Position::open(Direction::Short, &fill(dec!(3), dec!(50)));
        let realized = pos.reduce_fill(&fill(dec!(3), dec!(40)));
        // Short from 50, bought back at 40.
        assert_eq!(realized, dec!(30));
        assert!(pos.is_flat());
        assert_eq!(pos.size, Decimal::ZERO);
        assert!(pos.invariants_hold());
    }

    #[test]
    fn short_pnl_sign_convention() {
        let mut pos = Position::open(Direction::Short, &fill(dec!(1), dec!(100)));
        pos.update_price(dec!(90));
        assert_eq!(pos.unrealized_pnl, dec!(10));
        assert_eq!(pos.pnl_fraction(dec!(90)), dec!(0.1));

        pos.update_price(dec!(120));
        assert_eq!(pos.unrealized_pnl, dec!(-20));
    }

    #[test]
    fn oversized_reduce_is_clamped() {
        let mut pos = Position::open(Direction::Long, &fill(dec!(1), dec!(100)));
        pos.reduce_fill(&fill(dec!(5), dec!(100)));
        assert!(pos.is_flat());
        assert!(pos.invariants_hold());
    }
}
