use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::domain::{Action, ExitReason, Instrument, OrderIntent, PriceTick};
use crate::engine::Engine;
use crate::error::{Result, TraderError};
use crate::risk::RunLedger;
use crate::source::{PriceSource, ReplaySource};
use crate::state::PositionState;
use crate::strategy::{MomentumBreakout, SignalWindow};

/// Everything the scheduler tracks for one instrument.
#[derive(Debug, Clone)]
pub struct InstrumentBook {
    pub instrument: Instrument,
    pub window: SignalWindow,
    pub position: PositionState,
}

#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    /// Pause between replay steps, only so the log can be followed.
    pub replay_step: Duration,
    /// Live polling cadence.
    pub live_poll: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Unavailable,
    NoAction,
    Entered { order_id: String },
    Exited { order_id: String, reason: ExitReason, pnl: i64 },
    OrderFailed { uncertain: bool },
}

pub struct Scheduler {
    books: BTreeMap<String, InstrumentBook>,
    strategy: MomentumBreakout,
    engine: Engine,
    ledger: RunLedger,
    pacing: Pacing,
    shutdown: watch::Receiver<bool>,
}

impl Scheduler {
    pub fn new(
        instruments: &[Instrument],
        strategy: MomentumBreakout,
        engine: Engine,
        pacing: Pacing,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let books = instruments
            .iter()
            .map(|i| {
                let book = InstrumentBook {
                    instrument: i.clone(),
                    window: SignalWindow::new(),
                    position: PositionState::Flat,
                };
                (i.code.clone(), book)
            })
            .collect();
        Self {
            books,
            strategy,
            engine,
            ledger: RunLedger::new(),
            pacing,
            shutdown,
        }
    }

    #[cfg(test)]
    pub fn book(&self, code: &str) -> Option<&InstrumentBook> {
        self.books.get(code)
    }

    #[cfg(test)]
    pub fn ledger(&self) -> &RunLedger {
        &self.ledger
    }

    fn is_cancelled(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Sleeps for `d` unless shutdown is requested first. Returns whether to stop.
    async fn pause(&mut self, d: Duration) -> bool {
        if !d.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(d) => {}
                Ok(()) = self.shutdown.changed() => {}
            }
        }
        self.is_cancelled()
    }

    /// Replays every dataset step by step. Instruments without data are dropped.
    pub async fn run_replay(&mut self, source: &ReplaySource) -> Result<()> {
        self.books.retain(|code, _| {
            let keep = source.contains(code);
            if !keep {
                warn!(code = %code, "scheduler.instrument_excluded");
            }
            keep
        });
        if self.books.is_empty() {
            return Err(TraderError::EmptyReplay);
        }

        let total = source.steps();
        info!(steps = total, instruments = self.books.len(), dry_run = self.engine.is_dry_run(), "scheduler.replay_start");

        for step in 0..total {
            if self.is_cancelled() {
                info!(step, "scheduler.cancelled");
                break;
            }
            debug!(step = step + 1, total, "scheduler.step");
            self.tick(source, step as u64).await;

            if step + 1 < total && self.pause(self.pacing.replay_step).await {
                info!(step = step + 1, "scheduler.cancelled");
                break;
            }
        }

        self.log_summary();
        Ok(())
    }

    /// Polls until the shutdown signal flips.
    pub async fn run_live(&mut self, source: &dyn PriceSource) -> Result<()> {
        info!(
            instruments = self.books.len(),
            poll_secs = self.pacing.live_poll.as_secs_f64(),
            dry_run = self.engine.is_dry_run(),
            "scheduler.live_start"
        );

        let mut seq = 0u64;
        while !self.is_cancelled() {
            self.tick(source, seq).await;
            seq += 1;
            if self.pause(self.pacing.live_poll).await {
                break;
            }
        }

        info!(ticks = seq, "scheduler.cancelled");
        self.log_summary();
        Ok(())
    }

    /// One pass over all instruments in code order.
    pub async fn tick(&mut self, source: &dyn PriceSource, seq: u64) -> Vec<(String, TickOutcome)> {
        let mut outcomes = Vec::with_capacity(self.books.len());

        for (code, book) in self.books.iter_mut() {
            let price = match source.current_price(code, seq).await {
                Ok(Some(p)) if p > 0 => p,
                Ok(_) => {
                    warn!(code = %code, seq, "{}", TraderError::DataUnavailable(code.clone()));
                    outcomes.push((code.clone(), TickOutcome::Unavailable));
                    continue;
                }
                Err(e) => {
                    warn!(code = %code, seq, error = %e, "scheduler.price_failed");
                    outcomes.push((code.clone(), TickOutcome::Unavailable));
                    continue;
                }
            };

            let tick = PriceTick { code: code.clone(), price, seq };
            let outcome = step_instrument(book, &tick, &self.strategy, &self.engine, &mut self.ledger).await;
            outcomes.push((code.clone(), outcome));
        }

        outcomes
    }

    fn log_summary(&self) {
        for (code, pnl) in self.ledger.instruments() {
            info!(
                code = %code,
                round_trips = pnl.round_trips,
                trailing_stops = pnl.trailing_stops,
                stop_losses = pnl.stop_losses,
                realized = pnl.realized,
                "scheduler.summary"
            );
        }
        let holding: Vec<&str> = self
            .books
            .values()
            .filter(|b| b.position.is_holding())
            .map(|b| b.instrument.code.as_str())
            .collect();
        info!(
            realized = self.ledger.total_realized(),
            failed_orders = self.ledger.failed_orders(),
            still_holding = ?holding,
            "scheduler.done"
        );
    }
}

/// Observe, evaluate, dispatch; the new position is committed only after the
/// order is confirmed.
async fn step_instrument(
    book: &mut InstrumentBook,
    tick: &PriceTick,
    strategy: &MomentumBreakout,
    engine: &Engine,
    ledger: &mut RunLedger,
) -> TickOutcome {
    book.window.observe(tick.price);
    debug!(code = %tick.code, price = tick.price, seq = tick.seq, "scheduler.price");

    let decision = strategy.evaluate(tick.price, &book.window, &book.position);

    let Some(side) = decision.action.side() else {
        if decision.next.high_water_price() > book.position.high_water_price() {
            debug!(code = %tick.code, high = tick.price, "scheduler.new_high");
        }
        book.position = decision.next;
        return TickOutcome::NoAction;
    };
    let reason = match decision.action {
        Action::Exit { price, change, reason } => {
            info!(code = %tick.code, price, change_pct = change * 100.0, ?reason, "signal.exit");
            Some(reason)
        }
        Action::Enter { price, change } => {
            info!(code = %tick.code, price, change_pct = change * 100.0, "signal.breakout");
            None
        }
        Action::None => None,
    };

    let intent = OrderIntent {
        code: tick.code.clone(),
        side,
        quantity: book.instrument.quantity,
        signal_price: tick.price,
        reason,
    };

    match engine.execute(&intent).await {
        Ok(ack) => {
            let previous = book.position;
            book.position = decision.next;
            match (reason, previous.entry_price()) {
                (Some(reason), Some(entry)) => {
                    let pnl = ledger.register_close(&tick.code, intent.quantity, entry, tick.price, reason);
                    info!(code = %tick.code, entry, exit = tick.price, pnl, "position.closed");
                    TickOutcome::Exited { order_id: ack.order_id, reason, pnl }
                }
                _ => {
                    info!(code = %tick.code, entry = tick.price, quantity = intent.quantity, "position.opened");
                    TickOutcome::Entered { order_id: ack.order_id }
                }
            }
        }
        Err(e) => {
            ledger.register_failed_order();
            TickOutcome::OrderFailed {
                uncertain: matches!(e, TraderError::StateUncertain { .. }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Bar, OrderAck, Side};
    use crate::engine::tests::ScriptedGateway;
    use crate::notifier::Notifier;
    use crate::risk::Thresholds;
    use crate::source::ReplayDataset;
    use async_trait::async_trait;
    use chrono::NaiveTime;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    fn instruments(codes: &[(&str, u64)]) -> Vec<Instrument> {
        codes
            .iter()
            .map(|(c, q)| Instrument { code: c.to_string(), quantity: *q })
            .collect()
    }

    fn dataset(code: &str, prices: &[u64]) -> ReplayDataset {
        ReplayDataset {
            code: code.to_string(),
            bars: prices
                .iter()
                .enumerate()
                .map(|(i, p)| Bar {
                    code: code.to_string(),
                    time: NaiveTime::from_hms_opt(9, i as u32, 0).unwrap(),
                    price: *p,
                })
                .collect(),
        }
    }

    fn pacing() -> Pacing {
        Pacing { replay_step: Duration::ZERO, live_poll: Duration::from_secs(2) }
    }

    fn scheduler(
        universe: &[Instrument],
        gw: Arc<ScriptedGateway>,
    ) -> (Scheduler, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        let account = crate::domain::Account { number: "12345678".into(), product_code: "01".into() };
        let engine = Engine::new(gw, account, Notifier::disabled());
        let s = Scheduler::new(universe, MomentumBreakout::new(Thresholds::default()), engine, pacing(), rx);
        (s, tx)
    }

    /// Per-step prices where `None` simulates a failed quote.
    struct GappySource {
        prices: BTreeMap<String, Vec<Option<u64>>>,
        calls: AtomicU64,
    }

    #[async_trait]
    impl PriceSource for GappySource {
        async fn current_price(&self, code: &str, step: u64) -> Result<Option<u64>> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Ok(self
                .prices
                .get(code)
                .and_then(|p| p.get(step as usize).copied().flatten()))
        }

        async fn historical_page(&self, _code: &str, _end: NaiveTime) -> Result<Vec<Bar>> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn replay_runs_breakout_then_trailing_exit() {
        let gw = Arc::new(ScriptedGateway::new(vec![]));
        let (mut s, _tx) = scheduler(&instruments(&[("005930", 2)]), gw.clone());
        let src = ReplaySource::new(vec![dataset(
            "005930",
            &[1000, 1002, 1001, 1000, 1020, 1030, 1024],
        )])
        .unwrap();

        s.run_replay(&src).await.unwrap();

        assert_eq!(
            gw.submitted(),
            vec![(Side::Buy, "005930".to_string(), 2), (Side::Sell, "005930".to_string(), 2)]
        );
        let pnl = s.ledger().instrument("005930").unwrap();
        assert_eq!(pnl.round_trips, 1);
        assert_eq!(pnl.trailing_stops, 1);
        assert_eq!(pnl.realized, 8);
        assert_eq!(s.book("005930").unwrap().position, PositionState::Flat);
    }

    #[tokio::test]
    async fn holding_ratchets_high_water_between_orders() {
        let gw = Arc::new(ScriptedGateway::new(vec![]));
        let (mut s, _tx) = scheduler(&instruments(&[("005930", 1)]), gw.clone());
        let src = ReplaySource::new(vec![dataset("005930", &[1000, 1002, 1001, 1000, 1020, 1030])])
            .unwrap();

        s.run_replay(&src).await.unwrap();

        assert_eq!(gw.submitted(), vec![(Side::Buy, "005930".to_string(), 1)]);
        assert_eq!(
            s.book("005930").unwrap().position,
            PositionState::Holding { entry_price: 1020, high_water_price: 1030 }
        );
    }

    #[tokio::test]
    async fn rejected_buy_leaves_position_flat() {
        let gw = Arc::new(ScriptedGateway::new(vec![Err(TraderError::Broker {
            code: "APBK0919".into(),
            message: "insufficient cash".into(),
        })]));
        let (mut s, _tx) = scheduler(&instruments(&[("005930", 1)]), gw.clone());
        let src = GappySource {
            prices: BTreeMap::from([("005930".to_string(), vec![Some(1000), Some(1020), Some(1040)])]),
            calls: AtomicU64::new(0),
        };

        s.tick(&src, 0).await;
        let out = s.tick(&src, 1).await;
        assert_eq!(out[0].1, TickOutcome::OrderFailed { uncertain: false });
        assert_eq!(s.book("005930").unwrap().position, PositionState::Flat);
        assert_eq!(s.ledger().failed_orders(), 1);

        // next breakout tick tries again and succeeds
        let out = s.tick(&src, 2).await;
        assert!(matches!(out[0].1, TickOutcome::Entered { .. }));
        assert_eq!(
            s.book("005930").unwrap().position,
            PositionState::Holding { entry_price: 1040, high_water_price: 1040 }
        );
    }

    #[tokio::test]
    async fn uncertain_sell_keeps_holding() {
        let gw = Arc::new(ScriptedGateway::new(vec![
            Ok(OrderAck { order_id: "b1".into() }),
            Err(TraderError::Timeout { operation: "order_cash", elapsed_ms: 5000 }),
        ]));
        let (mut s, _tx) = scheduler(&instruments(&[("005930", 1)]), gw);
        let src = GappySource {
            prices: BTreeMap::from([("005930".to_string(), vec![Some(1000), Some(1020), Some(1000)])]),
            calls: AtomicU64::new(0),
        };

        s.tick(&src, 0).await;
        s.tick(&src, 1).await;
        let out = s.tick(&src, 2).await;
        assert_eq!(out[0].1, TickOutcome::OrderFailed { uncertain: true });
        assert!(s.book("005930").unwrap().position.is_holding());
    }

    #[tokio::test]
    async fn missing_price_leaves_instrument_untouched() {
        let gw = Arc::new(ScriptedGateway::new(vec![]));
        let (mut s, _tx) = scheduler(&instruments(&[("000660", 1), ("005930", 1)]), gw);
        let src = GappySource {
            prices: BTreeMap::from([
                ("000660".to_string(), vec![Some(500), Some(501), Some(502)]),
                ("005930".to_string(), vec![Some(1000), None, Some(1001)]),
            ]),
            calls: AtomicU64::new(0),
        };

        s.tick(&src, 0).await;
        let before = s.book("005930").unwrap().clone();
        let out = s.tick(&src, 1).await;
        assert_eq!(out[0].1, TickOutcome::NoAction);
        assert_eq!(out[1].1, TickOutcome::Unavailable);
        let after = s.book("005930").unwrap();
        assert_eq!(after.window, before.window);
        assert_eq!(after.position, before.position);

        let out = s.tick(&src, 2).await;
        assert_eq!(out[1].1, TickOutcome::NoAction);
        assert_eq!(s.book("005930").unwrap().window.len(), 2);
    }

    #[tokio::test]
    async fn replay_drops_instruments_without_data() {
        let gw = Arc::new(ScriptedGateway::new(vec![]));
        let (mut s, _tx) = scheduler(&instruments(&[("000660", 1), ("005930", 1)]), gw);
        let src = ReplaySource::new(vec![dataset("005930", &[1000, 1001]), dataset("000660", &[])]).unwrap();
        s.run_replay(&src).await.unwrap();
        assert!(s.book("000660").is_none());
        assert_eq!(s.book("005930").unwrap().window.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn live_loop_stops_on_shutdown() {
        let gw = Arc::new(ScriptedGateway::new(vec![]));
        let (mut s, tx) = scheduler(&instruments(&[("005930", 1)]), gw);
        let src = GappySource {
            prices: BTreeMap::from([("005930".to_string(), vec![Some(1000); 100])]),
            calls: AtomicU64::new(0),
        };

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            let _ = tx.send(true);
        });

        let start = tokio::time::Instant::now();
        s.run_live(&src).await.unwrap();
        // ticks at t=0, 2, 4; the sleep after the third tick is cut short at t=5
        assert_eq!(src.calls.load(Ordering::Relaxed), 3);
        assert!(start.elapsed() < Duration::from_secs(6));
    }
}
