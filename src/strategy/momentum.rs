use crate::domain::{Action, ExitReason};
use crate::risk::{change, Thresholds};
use crate::state::PositionState;
use crate::strategy::window::SignalWindow;

/// Outcome of one evaluation: the action to dispatch and the state to commit
/// once that action is confirmed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub action: Action,
    pub next: PositionState,
}

/// Breakout entry with trailing-stop and stop-loss exits.
#[derive(Debug, Clone)]
pub struct MomentumBreakout {
    pub thresholds: Thresholds,
}

impl MomentumBreakout {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    /// `window` must already contain `price` as its newest element.
    ///
    /// Exits check the trailing stop before the stop loss; the first match wins.
    pub fn evaluate(&self, price: u64, window: &SignalWindow, position: &PositionState) -> Decision {
        match *position {
            PositionState::Flat => self.evaluate_entry(price, window),
            PositionState::Holding { .. } => self.evaluate_exit(price, position.observe_high(price)),
        }
    }

    fn evaluate_entry(&self, price: u64, window: &SignalWindow) -> Decision {
        let hold = Decision { action: Action::None, next: PositionState::Flat };

        let Some(low) = window.recent_low() else {
            return hold;
        };
        if low == 0 {
            return hold;
        }

        let rise = change(price, low);
        if rise >= self.thresholds.buy_threshold {
            Decision {
                action: Action::Enter { price, change: rise },
                next: PositionState::open(price),
            }
        } else {
            hold
        }
    }

    fn evaluate_exit(&self, price: u64, held: PositionState) -> Decision {
        let PositionState::Holding { entry_price, high_water_price } = held else {
            return Decision { action: Action::None, next: held };
        };

        let drop_from_high = change(price, high_water_price);
        if drop_from_high <= self.thresholds.trailing_stop_threshold {
            return Decision {
                action: Action::Exit {
                    price,
                    change: drop_from_high,
                    reason: ExitReason::TrailingStop,
                },
                next: PositionState::Flat,
            };
        }

        let drop_from_entry = change(price, entry_price);
        if drop_from_entry <= self.thresholds.stop_loss_threshold {
            return Decision {
                action: Action::Exit {
                    price,
                    change: drop_from_entry,
                    reason: ExitReason::StopLoss,
                },
                next: PositionState::Flat,
            };
        }

        Decision { action: Action::None, next: held }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn engine() -> MomentumBreakout {
        MomentumBreakout::new(Thresholds::default())
    }

    fn window_with(prices: &[u64]) -> SignalWindow {
        prices.iter().copied().collect()
    }

    #[test]
    fn breakout_over_recent_low_enters() {
        // low of the preceding four is 98; +2.04% clears the 0.5% bar
        let w = window_with(&[100, 101, 99, 98, 100]);
        let d = engine().evaluate(100, &w, &PositionState::Flat);
        assert!(matches!(d.action, Action::Enter { price: 100, .. }));
        assert_eq!(d.next, PositionState::Holding { entry_price: 100, high_water_price: 100 });
    }

    #[test]
    fn single_observation_never_enters() {
        let w = window_with(&[100]);
        let d = engine().evaluate(100, &w, &PositionState::Flat);
        assert_eq!(d.action, Action::None);
        assert_eq!(d.next, PositionState::Flat);
    }

    #[test]
    fn small_rise_stays_flat() {
        // 1000 -> 1004 is +0.4%
        let w = window_with(&[1000, 1004]);
        let d = engine().evaluate(1004, &w, &PositionState::Flat);
        assert_eq!(d.action, Action::None);
        assert_eq!(d.next, PositionState::Flat);
    }

    #[test]
    fn trailing_stop_locks_in_profit() {
        let pos = PositionState::Holding { entry_price: 100, high_water_price: 110 };
        let w = window_with(&[105, 110, 109]);
        let d = engine().evaluate(109, &w, &pos);
        match d.action {
            Action::Exit { reason, .. } => assert_eq!(reason, ExitReason::TrailingStop),
            other => panic!("expected exit, got {other:?}"),
        }
        assert_eq!(d.next, PositionState::Flat);
    }

    #[test]
    fn trailing_stop_wins_when_high_equals_entry() {
        // -1.1% from both entry and high: both rules match, trailing stop is reported
        let pos = PositionState::Holding { entry_price: 1000, high_water_price: 1000 };
        let w = window_with(&[1000, 989]);
        let d = engine().evaluate(989, &w, &pos);
        match d.action {
            Action::Exit { reason, .. } => assert_eq!(reason, ExitReason::TrailingStop),
            other => panic!("expected exit, got {other:?}"),
        }
    }

    #[test]
    fn stop_loss_fires_when_trailing_is_looser() {
        let t = Thresholds {
            buy_threshold: 0.005,
            stop_loss_threshold: -0.01,
            trailing_stop_threshold: -0.05,
        };
        let pos = PositionState::Holding { entry_price: 1000, high_water_price: 1010 };
        let w = window_with(&[1010, 985]);
        let d = MomentumBreakout::new(t).evaluate(985, &w, &pos);
        match d.action {
            Action::Exit { reason, .. } => assert_eq!(reason, ExitReason::StopLoss),
            other => panic!("expected exit, got {other:?}"),
        }
    }

    #[test]
    fn new_high_is_carried_without_action() {
        let pos = PositionState::Holding { entry_price: 100, high_water_price: 100 };
        let w = window_with(&[100, 104]);
        let d = engine().evaluate(104, &w, &pos);
        assert_eq!(d.action, Action::None);
        assert_eq!(d.next, PositionState::Holding { entry_price: 100, high_water_price: 104 });
    }

    #[test]
    fn evaluation_does_not_depend_on_call_count() {
        let pos = PositionState::Holding { entry_price: 100, high_water_price: 110 };
        let w = window_with(&[110, 109]);
        let e = engine();
        let first = e.evaluate(109, &w, &pos);
        let second = e.evaluate(109, &w, &pos);
        assert_eq!(first, second);
        assert_eq!(pos, PositionState::Holding { entry_price: 100, high_water_price: 110 });
    }

    fn arb_price() -> impl Strategy<Value = u64> {
        1_000u64..200_000
    }

    proptest! {
        #[test]
        fn enters_iff_rise_over_low_clears_threshold(
            history in prop::collection::vec(arb_price(), 1..5),
            price in arb_price(),
        ) {
            let mut w: SignalWindow = history.iter().copied().collect();
            w.observe(price);
            let prior: Vec<u64> = w.iter().copied().take(w.len() - 1).collect();
            let low = *prior.iter().min().unwrap();
            let expected = (price as f64 - low as f64) / low as f64 >= 0.005;

            let d = engine().evaluate(price, &w, &PositionState::Flat);
            prop_assert_eq!(matches!(d.action, Action::Enter { .. }), expected);
            prop_assert_eq!(d.next.is_holding(), expected);
        }

        #[test]
        fn high_water_is_monotone_while_holding(
            entry in arb_price(),
            path in prop::collection::vec(arb_price(), 1..40),
        ) {
            let e = engine();
            let mut pos = PositionState::open(entry);
            let mut w = SignalWindow::new();
            w.observe(entry);
            for price in path {
                w.observe(price);
                let before = pos.high_water_price().unwrap();
                let d = e.evaluate(price, &w, &pos);
                if !d.next.is_holding() {
                    break;
                }
                let after = d.next.high_water_price().unwrap();
                prop_assert!(after >= before);
                prop_assert!(after >= d.next.entry_price().unwrap());
                pos = d.next;
            }
        }

        #[test]
        fn trailing_stop_takes_precedence(
            entry in arb_price(),
            bump in 0u64..5_000,
            drop_pct in 0.011f64..0.5,
        ) {
            let high = entry + bump;
            let price = ((entry as f64) * (1.0 - drop_pct)).floor() as u64;
            prop_assume!(price > 0);
            let pos = PositionState::Holding { entry_price: entry, high_water_price: high };
            let w = window_with(&[high, price]);
            let d = engine().evaluate(price, &w, &pos);
            let is_trailing = matches!(d.action, Action::Exit { reason: ExitReason::TrailingStop, .. });
            prop_assert!(is_trailing);
        }
    }
}
