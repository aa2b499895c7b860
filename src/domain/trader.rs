//! Pairs trading loop.
//!
//! Once a day, at or after the configured trade time and while the market is
//! open, every fitted pair is scored against live prices:
//! - an open pair closes once its deviation crosses back through zero,
//! - a flat pair opens when the deviation is beyond +/- tolerance.
//! Failures are isolated to the pair that raised them.

use crate::domain::cancellation::CancellationToken;
use crate::domain::error::EastwoodError;
use crate::domain::pair::CointegratedPair;
use crate::domain::position::{is_pair_open, size_legs, LegQuantities, PositionDirection};
use crate::domain::price_panel::PricePanel;
use crate::domain::strategy::{HistoryWindow, PairsStrategy};
use crate::ports::account_port::AccountPort;
use crate::ports::price_history_port::PriceHistoryPort;
use chrono::{Local, NaiveTime};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

#[derive(Debug, Clone, PartialEq)]
pub enum PairAction {
    Closed(PositionDirection),
    Opened {
        direction: PositionDirection,
        long_qty: i64,
        short_qty: i64,
    },
    /// Entry signal, but the capital left could not buy a share of each leg.
    InsufficientCapital,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PairEvaluation {
    pub deviation: f64,
    pub actions: Vec<PairAction>,
}

/// Result of evaluating one pair during a tick.
#[derive(Debug)]
pub struct TickOutcome {
    pub pair: String,
    pub result: Result<PairEvaluation, EastwoodError>,
}

#[derive(Debug)]
pub enum PollOutcome {
    Traded(Vec<TickOutcome>),
    MarketClosed,
    AlreadyTraded,
    Waiting,
}

pub struct PairsTrader<A: AccountPort> {
    account: A,
    pairs: Vec<CointegratedPair>,
    trade_time: NaiveTime,
    tolerance: f64,
    poll_interval: Duration,
    open_positions: usize,
    has_traded: bool,
}

impl<A: AccountPort> PairsTrader<A> {
    pub fn new(account: A, pairs: Vec<CointegratedPair>, strategy: &PairsStrategy) -> Self {
        let trader = Self {
            account,
            pairs,
            trade_time: strategy.trade_time,
            tolerance: strategy.tolerance,
            poll_interval: strategy.poll_interval,
            open_positions: 0,
            has_traded: false,
        };
        log::info!("Ready to trade: {}", trader);
        trader
    }

    /// Fit every configured pair on `panel`. Any pair that cannot be fitted
    /// fails construction.
    pub fn from_history(
        account: A,
        strategy: &PairsStrategy,
        panel: &PricePanel,
    ) -> Result<Self, EastwoodError> {
        let pairs = strategy
            .pairs
            .iter()
            .map(|p| CointegratedPair::select(&p.first, &p.second, panel))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(account, pairs, strategy))
    }

    pub fn from_source(
        account: A,
        strategy: &PairsStrategy,
        source: &dyn PriceHistoryPort,
        window: &HistoryWindow,
    ) -> Result<Self, EastwoodError> {
        let pairs = strategy
            .pairs
            .iter()
            .map(|p| CointegratedPair::from_source(&p.first, &p.second, source, window))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(account, pairs, strategy))
    }

    pub fn account(&self) -> &A {
        &self.account
    }

    pub fn pairs(&self) -> &[CointegratedPair] {
        &self.pairs
    }

    pub fn trade_time(&self) -> NaiveTime {
        self.trade_time
    }

    pub fn set_trade_time(&mut self, trade_time: NaiveTime) {
        self.trade_time = trade_time;
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Pairs believed open as of the last count or order.
    pub fn open_positions(&self) -> usize {
        self.open_positions
    }

    pub fn has_traded(&self) -> bool {
        self.has_traded
    }

    pub fn add_pair(&mut self, ticker1: &str, ticker2: &str, panel: &PricePanel) -> Result<(), EastwoodError> {
        let pair = CointegratedPair::select(ticker1, ticker2, panel)?;
        log::info!("Added {}", pair);
        self.pairs.push(pair);
        Ok(())
    }

    /// Remove the pair made of these two tickers, in either order.
    pub fn remove_pair(&mut self, ticker1: &str, ticker2: &str) -> bool {
        let before = self.pairs.len();
        self.pairs.retain(|p| !p.involves(ticker1, ticker2));
        let removed = self.pairs.len() != before;
        if removed {
            log::info!("Removed {}/{}", ticker1, ticker2);
        }
        removed
    }

    pub fn is_open(&self, pair: &CointegratedPair) -> Result<bool, EastwoodError> {
        let positions = self.account.get_positions()?;
        Ok(is_pair_open(&positions, pair.dependent(), pair.independent()))
    }

    /// Recount open pairs from the account.
    pub fn check_pairs(&mut self) -> Result<usize, EastwoodError> {
        let positions = self.account.get_positions()?;
        self.open_positions = self
            .pairs
            .iter()
            .filter(|p| is_pair_open(&positions, p.dependent(), p.independent()))
            .count();
        Ok(self.open_positions)
    }

    pub fn decide_quantities(&self, long: &str, short: &str) -> Result<Option<LegQuantities>, EastwoodError> {
        let buying_power = self.account.get_buying_power()?;
        let long_price = self.account.get_latest_price(long)?;
        let short_price = self.account.get_latest_price(short)?;
        Ok(size_legs(
            buying_power,
            self.pairs.len(),
            self.open_positions,
            long_price,
            short_price,
        ))
    }

    /// Buy the long leg, then short the other.
    pub fn open_position(
        &mut self,
        long: &str,
        short: &str,
        long_qty: i64,
        short_qty: i64,
    ) -> Result<(), EastwoodError> {
        self.account.buy(long, long_qty)?;
        self.account.short(short, short_qty)?;
        self.open_positions += 1;
        log::info!(
            "Opened: long {} {}, short {} {}",
            long_qty,
            long,
            short_qty,
            short
        );
        Ok(())
    }

    pub fn close_position(&mut self, ticker1: &str, ticker2: &str) -> Result<(), EastwoodError> {
        self.account.close_position(ticker1)?;
        self.account.close_position(ticker2)?;
        self.open_positions = self.open_positions.saturating_sub(1);
        log::info!("Closed {}/{}", ticker1, ticker2);
        Ok(())
    }

    pub fn close_all_positions(&mut self) -> Result<(), EastwoodError> {
        match self.account.close_all_positions() {
            Ok(()) => {
                self.open_positions = 0;
                log::info!("All positions closed");
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to close all positions: {}", e);
                Err(EastwoodError::CloseAllFailed {
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Evaluate every pair once against the account's latest prices.
    pub fn trade_tick(&mut self) -> Result<Vec<TickOutcome>, EastwoodError> {
        self.check_pairs()?;
        let mut outcomes = Vec::with_capacity(self.pairs.len());
        for idx in 0..self.pairs.len() {
            let name = self.pairs[idx].to_string();
            let result = self.evaluate_pair(idx);
            match &result {
                Ok(eval) => log::debug!("{}: deviation {:.4}", name, eval.deviation),
                Err(e) => log::warn!("{}: skipped this tick: {}", name, e),
            }
            outcomes.push(TickOutcome { pair: name, result });
        }
        Ok(outcomes)
    }

    fn evaluate_pair(&mut self, idx: usize) -> Result<PairEvaluation, EastwoodError> {
        let (dependent, independent, deviation) = {
            let pair = &self.pairs[idx];
            let prices = self.live_prices(pair.dependent(), pair.independent())?;
            let deviation = pair.score(&prices)?.value();
            (
                pair.dependent().to_string(),
                pair.independent().to_string(),
                deviation,
            )
        };

        let mut actions = Vec::new();
        let positions = self.account.get_positions()?;
        if is_pair_open(&positions, &dependent, &independent) {
            let held = positions.get(&dependent).copied().unwrap_or(0);
            let direction = PositionDirection::from_dependent_quantity(held);
            if direction.should_close(deviation) {
                self.close_position(&dependent, &independent)?;
                actions.push(PairAction::Closed(direction));
            }
        }

        let positions = self.account.get_positions()?;
        if !is_pair_open(&positions, &dependent, &independent) {
            if let Some(direction) = PositionDirection::for_entry(deviation, self.tolerance) {
                let (long, short) = direction.legs(&dependent, &independent);
                match self.decide_quantities(long, short)? {
                    Some(q) => {
                        self.open_position(long, short, q.long_qty, q.short_qty)?;
                        actions.push(PairAction::Opened {
                            direction,
                            long_qty: q.long_qty,
                            short_qty: q.short_qty,
                        });
                    }
                    None => {
                        log::info!(
                            "{}/{}: {} signal but not enough capital",
                            dependent,
                            independent,
                            direction
                        );
                        actions.push(PairAction::InsufficientCapital);
                    }
                }
            }
        }

        Ok(PairEvaluation { deviation, actions })
    }

    fn live_prices(&self, first: &str, second: &str) -> Result<HashMap<String, f64>, EastwoodError> {
        let mut prices = HashMap::with_capacity(2);
        for ticker in [first, second] {
            prices.insert(ticker.to_string(), self.account.get_latest_price(ticker)?);
        }
        Ok(prices)
    }

    /// One pass of the daily gate at local time `now`.
    pub fn poll(&mut self, now: NaiveTime) -> Result<PollOutcome, EastwoodError> {
        if now < self.trade_time {
            self.has_traded = false;
            return Ok(PollOutcome::Waiting);
        }
        if self.has_traded {
            log::info!("Already traded today");
            return Ok(PollOutcome::AlreadyTraded);
        }
        if !self.account.is_market_open()? {
            self.has_traded = true;
            log::info!("Market closed today");
            return Ok(PollOutcome::MarketClosed);
        }

        let outcomes = self.trade_tick()?;
        self.has_traded = true;
        let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
        log::info!(
            "Traded {} pairs ({} failed), {} open",
            outcomes.len(),
            failed,
            self.open_positions
        );
        Ok(PollOutcome::Traded(outcomes))
    }

    /// Poll every `poll_interval` until `token` is cancelled, then close every
    /// position.
    pub async fn run(&mut self, token: &CancellationToken) -> Result<(), EastwoodError> {
        log::info!(
            "Trading {} pairs daily at {}, polling every {:?}",
            self.pairs.len(),
            self.trade_time,
            self.poll_interval
        );
        let mut polls = tokio::time::interval(self.poll_interval.max(Duration::from_millis(1)));
        polls.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = polls.tick() => {
                    if let Err(e) = self.poll(Local::now().time()) {
                        log::warn!("Poll failed: {}", e);
                    }
                }
            }
        }
        log::info!("Shutdown requested, closing all positions");
        self.close_all_positions()
    }
}

impl<A: AccountPort> fmt::Display for PairsTrader<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.pairs.iter().map(|p| p.to_string()).collect();
        write!(f, "PairsTrader([{}])", names.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::paper_account::PaperAccount;
    use crate::domain::cointegration::fit_relationship;
    use crate::domain::universe::TickerPair;
    use approx::assert_relative_eq;

    fn pair(dep: &str, indep: &str) -> CointegratedPair {
        let x = [10.0, 11.0, 12.0, 13.0, 14.0, 15.0];
        let y = [20.5, 21.5, 24.5, 25.5, 28.5, 29.5];
        CointegratedPair::new(dep, indep, false, fit_relationship(&y, &x).unwrap(), 0.01)
    }

    fn strategy() -> PairsStrategy {
        PairsStrategy::new(vec![TickerPair::new("A", "B")])
    }

    /// Quote A so that A/B scores `deviation` with B at `b_price`.
    fn quote_for(trader: &PairsTrader<PaperAccount>, deviation: f64, b_price: f64) {
        let p = &trader.pairs()[0];
        let a_price = p.relationship().predict(b_price) + deviation * p.residual_std();
        trader.account().set_quote("A", a_price);
        trader.account().set_quote("B", b_price);
    }

    fn trader(cash: f64) -> PairsTrader<PaperAccount> {
        PairsTrader::new(PaperAccount::new(cash), vec![pair("A", "B")], &strategy())
    }

    #[test]
    fn rich_dependent_opens_short_spread() {
        let mut t = trader(10_000.0);
        quote_for(&t, 1.0, 50.0);
        let outcomes = t.trade_tick().unwrap();
        let eval = outcomes[0].result.as_ref().unwrap();
        assert_relative_eq!(eval.deviation, 1.0, epsilon = 1e-9);
        assert!(matches!(
            eval.actions[..],
            [PairAction::Opened {
                direction: PositionDirection::ShortSpread,
                long_qty: 100,
                ..
            }]
        ));
        assert_eq!(t.account().get_position("B").unwrap(), 100);
        assert!(t.account().get_position("A").unwrap() < 0);
        assert_eq!(t.open_positions(), 1);
    }

    #[test]
    fn cheap_dependent_opens_long_spread() {
        let mut t = trader(10_000.0);
        quote_for(&t, -1.0, 50.0);
        t.trade_tick().unwrap();
        assert!(t.account().get_position("A").unwrap() > 0);
        assert_eq!(t.account().get_position("B").unwrap(), -100);
    }

    #[test]
    fn inside_tolerance_does_nothing() {
        let mut t = trader(10_000.0);
        quote_for(&t, 0.2, 50.0);
        let outcomes = t.trade_tick().unwrap();
        assert!(outcomes[0].result.as_ref().unwrap().actions.is_empty());
        assert!(t.account().fills().is_empty());
    }

    #[test]
    fn open_short_spread_closes_at_zero() {
        let mut t = trader(10_000.0);
        quote_for(&t, 1.0, 50.0);
        t.trade_tick().unwrap();

        quote_for(&t, 0.5, 50.0);
        let outcomes = t.trade_tick().unwrap();
        assert!(outcomes[0].result.as_ref().unwrap().actions.is_empty());
        assert!(t.is_open(&t.pairs()[0]).unwrap());

        quote_for(&t, -0.1, 50.0);
        let outcomes = t.trade_tick().unwrap();
        assert_eq!(
            outcomes[0].result.as_ref().unwrap().actions,
            vec![PairAction::Closed(PositionDirection::ShortSpread)]
        );
        assert!(!t.is_open(&t.pairs()[0]).unwrap());
        assert_eq!(t.open_positions(), 0);
    }

    #[test]
    fn close_then_reopen_in_same_tick() {
        let mut t = trader(10_000.0);
        quote_for(&t, 1.0, 50.0);
        t.trade_tick().unwrap();

        quote_for(&t, -1.0, 50.0);
        let outcomes = t.trade_tick().unwrap();
        let actions = &outcomes[0].result.as_ref().unwrap().actions;
        assert_eq!(actions[0], PairAction::Closed(PositionDirection::ShortSpread));
        assert!(matches!(
            actions[1],
            PairAction::Opened {
                direction: PositionDirection::LongSpread,
                ..
            }
        ));
        assert!(t.account().get_position("A").unwrap() > 0);
    }

    #[test]
    fn insufficient_capital_places_no_order() {
        let mut t = trader(50.0);
        quote_for(&t, 1.0, 50.0);
        let outcomes = t.trade_tick().unwrap();
        assert_eq!(
            outcomes[0].result.as_ref().unwrap().actions,
            vec![PairAction::InsufficientCapital]
        );
        assert!(t.account().fills().is_empty());
    }

    #[test]
    fn missing_quote_fails_only_that_pair() {
        let mut t = PairsTrader::new(
            PaperAccount::new(10_000.0),
            vec![pair("A", "B"), pair("C", "D")],
            &strategy(),
        );
        quote_for(&t, 1.0, 50.0);
        let outcomes = t.trade_tick().unwrap();
        assert!(outcomes[0].result.is_ok());
        assert!(matches!(
            outcomes[1].result,
            Err(EastwoodError::Account { .. })
        ));
        assert_eq!(outcomes[1].pair, "CointegratedPair(C, D, false)");
    }

    #[test]
    fn poll_gates_on_trade_time_and_market() {
        let mut t = trader(10_000.0);
        t.set_trade_time(NaiveTime::from_hms_opt(15, 0, 0).unwrap());
        quote_for(&t, 1.0, 50.0);

        let morning = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let evening = NaiveTime::from_hms_opt(16, 0, 0).unwrap();

        assert!(matches!(t.poll(morning).unwrap(), PollOutcome::Waiting));
        assert!(matches!(t.poll(evening).unwrap(), PollOutcome::Traded(_)));
        assert!(matches!(t.poll(evening).unwrap(), PollOutcome::AlreadyTraded));

        // next day, market shut
        assert!(matches!(t.poll(morning).unwrap(), PollOutcome::Waiting));
        assert!(!t.has_traded());
        t.account().set_market_open(false);
        assert!(matches!(t.poll(evening).unwrap(), PollOutcome::MarketClosed));
        assert!(t.has_traded());
    }

    #[test]
    fn remove_pair_ignores_order() {
        let mut t = trader(10_000.0);
        assert!(!t.remove_pair("A", "C"));
        assert!(t.remove_pair("B", "A"));
        assert!(t.pairs().is_empty());
    }

    #[tokio::test]
    async fn run_closes_everything_on_cancel() {
        let mut t = trader(10_000.0);
        quote_for(&t, 1.0, 50.0);
        t.trade_tick().unwrap();
        let token = CancellationToken::new();
        token.cancel();
        t.run(&token).await.unwrap();
        assert!(t.account().get_positions().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancel_interrupts_the_wait_between_polls() {
        let mut t = trader(10_000.0);
        quote_for(&t, 1.0, 50.0);
        t.trade_tick().unwrap();
        let token = CancellationToken::new();
        let stop = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        };
        let finished = tokio::time::timeout(Duration::from_secs(5), async {
            let (result, ()) = tokio::join!(t.run(&token), stop);
            result
        })
        .await;
        assert!(finished.unwrap().is_ok());
        assert!(t.account().get_positions().unwrap().is_empty());
    }

    #[test]
    fn display_lists_pairs() {
        let t = trader(10_000.0);
        assert_eq!(t.to_string(), "PairsTrader([CointegratedPair(A, B, false)])");
    }
}
