//! Position manager: turns the fused signal into a bounded order intent and
//! applies confirmed fills to the owned position.
//!
//! Stop-loss/take-profit checks run before any sizing logic and force a
//! close regardless of the new signal. A flat signal is a hold, not an exit.

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::models::{
    Direction, FillResult, FusedSignal, OrderAction, OrderIntent, Position,
};

use super::config::SizingConfig;

pub struct PositionManager {
    config: SizingConfig,
}

impl PositionManager {
    pub fn new(config: SizingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SizingConfig {
        &self.config
    }

    /// Decide this cycle's order intents.
    ///
    /// Returns one intent in the common case; a reversal produces
    /// `[Close, Open]` which the gateway executes sequentially, close
    /// confirmed before the open is attempted.
    pub fn decide(
        &self,
        signal: &FusedSignal,
        position: &Position,
        equity: Decimal,
        price: Decimal,
        trend_strength: f64,
    ) -> Vec<OrderIntent> {
        // Protective exits take priority over all sizing logic.
        if let Some(close) = self.protective_close(position, price) {
            return vec![close];
        }

        if signal.direction == Direction::Flat {
            debug!("flat signal, holding current position");
            return vec![OrderIntent::noop()];
        }

        let sized = self.sized_notional(signal.confidence, trend_strength);

        if position.is_flat() {
            return vec![self.entry_intent(OrderAction::Open, signal.direction, sized, Decimal::ZERO, equity)];
        }

        if position.direction.matches(signal.direction) {
            // Pyramiding: add in the same direction, clipped to the cap.
            return vec![self.entry_intent(
                OrderAction::Add,
                signal.direction,
                sized,
                position.notional(),
                equity,
            )];
        }

        // Opposite signal: full reversal only above the threshold, otherwise
        // a partial de-risk to dampen whipsaw flip-flopping.
        if signal.confidence >= self.config.reversal_threshold {
            let close = OrderIntent::close(direction_of(position), position.notional());
            let open = self.entry_intent(
                OrderAction::Open,
                signal.direction,
                sized,
                Decimal::ZERO,
                equity,
            );
            if open.is_noop() {
                return vec![close];
            }
            info!(
                confidence = signal.confidence,
                "reversal: close then open opposite"
            );
            return vec![close, open];
        }

        let shed = (position.notional() * self.config.reduce_fraction).min(position.notional());
        debug!(
            confidence = signal.confidence,
            threshold = self.config.reversal_threshold,
            "opposite signal below reversal threshold, reducing"
        );
        vec![OrderIntent::reduce(direction_of(position), shed)]
    }

    /// Apply a confirmed fill to the owned position. Never called
    /// optimistically; execution must have succeeded first.
    pub fn apply(
        &self,
        position: &mut Position,
        intent: &OrderIntent,
        fill: &FillResult,
    ) -> Result<(), EngineError> {
        match intent.action {
            OrderAction::Noop => {}
            OrderAction::Open => *position = Position::open(intent.direction, fill),
            OrderAction::Add => position.add_fill(fill),
            OrderAction::Reduce => {
                position.reduce_fill(fill);
            }
            OrderAction::Close => position.close_out(),
        }

        if !position.invariants_hold() {
            return Err(EngineError::Execution(format!(
                "position invariant violated after {}: size={} direction={}",
                intent.action.as_str(),
                position.size,
                position.direction.as_str()
            )));
        }
        Ok(())
    }

    /// Stop-loss / take-profit, evaluated against entry and the live price.
    fn protective_close(&self, position: &Position, price: Decimal) -> Option<OrderIntent> {
        if position.is_flat() || price <= Decimal::ZERO {
            return None;
        }
        let pnl = position.pnl_fraction(price);
        if pnl <= -self.config.stop_loss_pct {
            warn!(pnl = %pnl, "stop-loss breached, closing position");
            return Some(OrderIntent::close(direction_of(position), position.notional()));
        }
        if pnl >= self.config.take_profit_pct {
            info!(pnl = %pnl, "take-profit reached, closing position");
            return Some(OrderIntent::close(direction_of(position), position.notional()));
        }
        None
    }

    /// Base order notional scaled by confidence bucket and trend strength.
    fn sized_notional(&self, confidence: f64, trend_strength: f64) -> Decimal {
        self.config.base_amount
            * self.config.confidence_multiplier(confidence)
            * self.config.trend_multiplier(trend_strength)
    }

    /// Build an open/add intent with the cap clip and the leverage ceiling
    /// applied. Excess is clipped, never rejected; a saturated cap or a
    /// ceiling breach yields a noop.
    fn entry_intent(
        &self,
        action: OrderAction,
        direction: Direction,
        sized: Decimal,
        current_notional: Decimal,
        equity: Decimal,
    ) -> OrderIntent {
        let remaining = self.config.position_cap() - current_notional;
        let clipped = sized.min(remaining.max(Decimal::ZERO));

        if clipped < self.config.min_order_size {
            debug!(
                sized = %sized,
                remaining = %remaining,
                "position cap saturated or order below minimum"
            );
            return OrderIntent::noop();
        }

        // Hard leverage ceiling: recoverable risk violation, forced noop.
        let ceiling = equity * self.config.max_leverage;
        if current_notional + clipped > ceiling {
            let violation = EngineError::RiskViolation(format!(
                "notional {} + {} exceeds equity ceiling {}",
                current_notional, clipped, ceiling
            ));
            warn!(error = %violation, "sizing rejected");
            return OrderIntent::noop();
        }

        match action {
            OrderAction::Open => OrderIntent::open(direction, clipped),
            _ => OrderIntent::add(direction, clipped),
        }
    }
}

fn direction_of(position: &Position) -> Direction {
    match position.direction {
        crate::models::PositionSide::Long => Direction::Long,
        crate::models::PositionSide::Short => Direction::Short,
        crate::models::PositionSide::None => Direction::Flat,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PositionSide;
    use rust_decimal_macros::dec;

    fn manager() -> PositionManager {
        PositionManager::new(SizingConfig::default())
    }

    fn signal(direction: Direction, confidence: f64) -> FusedSignal {
        FusedSignal {
            direction,
            confidence,
            weighted_score: direction.sign() * confidence,
        }
    }

    fn long_position(size: Decimal, entry: Decimal) -> Position {
        Position {
            direction: PositionSide::Long,
            size,
            entry_price: entry,
            unrealized_pnl: Decimal::ZERO,
            accumulated_cost: size * entry,
        }
    }

    #[test]
    fn flat_signal_is_noop_regardless_of_position() {
        let mgr = manager();
        let sig = signal(Direction::Flat, 0.0);

        let intents = mgr.decide(&sig, &Position::flat(), dec!(1000), dec!(100), 0.5);
        assert_eq!(intents[0].action, OrderAction::Noop);

        let pos = long_position(dec!(0.05), dec!(100));
        let intents = mgr.decide(&sig, &pos, dec!(1000), dec!(100), 0.5);
        assert_eq!(intents[0].action, OrderAction::Noop);
    }

    #[test]
    fn opens_with_sized_notional() {
        let mgr = manager();
        let sig = signal(Direction::Long, 0.9);
        let intents = mgr.decide(&sig, &Position::flat(), dec!(1000), dec!(100), 0.5);

        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].action, OrderAction::Open);
        assert_eq!(intents[0].direction, Direction::Long);
        // 5 * 1.2 (high confidence) * 1.0 (neutral trend) = 6
        assert_eq!(intents[0].size_delta, dec!(6.0));
    }

    #[test]
    fn pyramiding_saturated_cap_is_noop() {
        // Existing notional 10 == base 5 * ratio 2; computed add of 6 clips
        // to zero and the cycle is a noop, not a rejection.
        let mgr = manager();
        let sig = signal(Direction::Long, 0.9);
        let pos = long_position(dec!(0.1), dec!(100)); // notional 10

        let intents = mgr.decide(&sig, &pos, dec!(1000), dec!(100), 0.5);
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].action, OrderAction::Noop);
    }

    #[test]
    fn pyramiding_clips_to_cap() {
        let mgr = manager();
        let sig = signal(Direction::Long, 0.9);
        let pos = long_position(dec!(0.06), dec!(100)); // notional 6, cap 10

        let intents = mgr.decide(&sig, &pos, dec!(1000), dec!(100), 0.5);
        assert_eq!(intents[0].action, OrderAction::Add);
        // Sized 6 clipped to the remaining 4.
        assert_eq!(intents[0].size_delta, dec!(4));
    }

    #[test]
    fn weak_opposite_signal_reduces_instead_of_closing() {
        let mgr = manager();
        let sig = signal(Direction::Short, 0.4); // below reversal threshold 0.6
        let pos = long_position(dec!(0.08), dec!(100));

        let intents = mgr.decide(&sig, &pos, dec!(1000), dec!(100), 0.5);
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].action, OrderAction::Reduce);
        assert_eq!(intents[0].size_delta, dec!(4.00)); // half of notional 8
    }

    #[test]
    fn strong_opposite_signal_closes_then_opens() {
        let mgr = manager();
        let sig = signal(Direction::Short, 0.8);
        let pos = long_position(dec!(0.08), dec!(100));

        let intents = mgr.decide(&sig, &pos, dec!(1000), dec!(100), 0.5);
        assert_eq!(intents.len(), 2);
        assert_eq!(intents[0].action, OrderAction::Close);
        assert_eq!(intents[0].direction, Direction::Long);
        assert_eq!(intents[1].action, OrderAction::Open);
        assert_eq!(intents[1].direction, Direction::Short);
    }

    #[test]
    fn stop_loss_overrides_same_direction_add() {
        let mgr = manager();
        let sig = signal(Direction::Long, 0.9);
        let pos = long_position(dec!(0.05), dec!(100));

        // Price down 3% > stop_loss_pct 2%.
        let intents = mgr.decide(&sig, &pos, dec!(1000), dec!(97), 0.5);
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].action, OrderAction::Close);
    }

    #[test]
    fn take_profit_forces_close() {
        let mgr = manager();
        let sig = signal(Direction::Long, 0.9);
        let pos = long_position(dec!(0.05), dec!(100));

        // Up 6% > take_profit_pct 5%.
        let intents = mgr.decide(&sig, &pos, dec!(1000), dec!(106), 0.5);
        assert_eq!(intents[0].action, OrderAction::Close);
    }

    #[test]
    fn leverage_ceiling_forces_noop() {
        let mgr = manager();
        let sig = signal(Direction::Long, 0.9);

        // Equity 0.5 with max_leverage 10 allows 5 of notional; sized 6
        // would breach the hard ceiling.
        let intents = mgr.decide(&sig, &Position::flat(), dec!(0.5), dec!(100), 0.5);
        assert_eq!(intents[0].action, OrderAction::Noop);
    }

    #[test]
    fn apply_maintains_invariants() {
        let mgr = manager();
        let mut pos = Position::flat();

        let open = OrderIntent::open(Direction::Long, dec!(6));
        let fill = FillResult {
            filled_size: dec!(0.06),
            avg_price: dec!(100),
        };
        mgr.apply(&mut pos, &open, &fill).unwrap();
        assert!(pos.invariants_hold());
        assert_eq!(pos.direction, PositionSide::Long);
        assert_eq!(pos.accumulated_cost, dec!(6.00));

        let reduce = OrderIntent::reduce(Direction::Long, dec!(3));
        let fill = FillResult {
            filled_size: dec!(0.03),
            avg_price: dec!(100),
        };
        mgr.apply(&mut pos, &reduce, &fill).unwrap();
        assert!(pos.invariants_hold());
        assert_eq!(pos.size, dec!(0.03));

        let close = OrderIntent::close(Direction::Long, pos.notional());
        let fill = FillResult {
            filled_size: pos.size,
            avg_price: dec!(100),
        };
        mgr.apply(&mut pos, &close, &fill).unwrap();
        assert!(pos.is_flat());
        assert!(pos.invariants_hold());
    }
}
