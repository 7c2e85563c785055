//! In-memory paper-trading ledger.
//!
//! Each outcome has a pool of staked USDC and its price is that pool's share
//! of the total. This is bookkeeping for a simulated market, not a pricing
//! model.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use super::{
    Market, MarketBackend, MarketError, MarketStatus, NewMarket, Outcome, PlatformStats,
    TradeReceipt, TxReceipt,
};

const MAX_DURATION_DAYS: u32 = 3650;
const MAX_QUESTION_LEN: usize = 300;

struct PaperEntry {
    market: Market,
    yes_pool: f64,
    no_pool: f64,
    positions: HashMap<Outcome, f64>,
}

impl PaperEntry {
    fn yes_price(&self) -> f64 {
        self.yes_pool / (self.yes_pool + self.no_pool)
    }

    fn price(&self, outcome: Outcome) -> f64 {
        match outcome {
            Outcome::Yes => self.yes_price(),
            Outcome::No => 1.0 - self.yes_price(),
        }
    }

    fn pool_mut(&mut self, outcome: Outcome) -> &mut f64 {
        match outcome {
            Outcome::Yes => &mut self.yes_pool,
            Outcome::No => &mut self.no_pool,
        }
    }

    fn refresh(&mut self) {
        self.market.yes_price = self.yes_price();
        self.market.liquidity_usdc = self.yes_pool + self.no_pool;
        if self.market.status == MarketStatus::Open && Utc::now() >= self.market.closes_at {
            self.market.status = MarketStatus::Closed;
        }
    }
}

#[derive(Default)]
struct Ledger {
    markets: Vec<PaperEntry>,
    trades: u64,
}

impl Ledger {
    fn entry_mut(&mut self, market_id: &str) -> Result<&mut PaperEntry, MarketError> {
        let entry = self
            .markets
            .iter_mut()
            .find(|e| e.market.market_id == market_id)
            .ok_or_else(|| MarketError::NotFound(market_id.to_string()))?;
        entry.refresh();
        Ok(entry)
    }
}

/// A market backend that never leaves the process.
pub struct PaperMarket {
    network: String,
    ledger: Mutex<Ledger>,
}

impl PaperMarket {
    pub fn new() -> Self {
        Self::with_network("paper")
    }

    pub fn with_network(network: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            ledger: Mutex::new(Ledger::default()),
        }
    }

    fn tx_ref() -> String {
        format!("paper:0x{}", Uuid::new_v4().simple())
    }
}

impl Default for PaperMarket {
    fn default() -> Self {
        Self::new()
    }
}

fn positive(value: f64, what: &str) -> Result<f64, MarketError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(MarketError::InvalidRequest(format!("{what} must be positive")))
    }
}

#[async_trait]
impl MarketBackend for PaperMarket {
    fn network(&self) -> &str {
        &self.network
    }

    async fn create_market(&self, new: NewMarket) -> Result<(Market, TxReceipt), MarketError> {
        let question = new.question.trim();
        if question.is_empty() {
            return Err(MarketError::InvalidRequest("question must not be empty".into()));
        }
        if question.chars().count() > MAX_QUESTION_LEN {
            return Err(MarketError::InvalidRequest(format!(
                "question must be at most {MAX_QUESTION_LEN} characters"
            )));
        }
        if new.duration_days == 0 || new.duration_days > MAX_DURATION_DAYS {
            return Err(MarketError::InvalidRequest(format!(
                "durationDays must be between 1 and {MAX_DURATION_DAYS}"
            )));
        }
        let liquidity = positive(new.liquidity_usdc, "liquidityUsdc")?;

        let now = Utc::now();
        let market_id = format!("mkt-{}", &Uuid::new_v4().simple().to_string()[..12]);
        let market = Market {
            market_id: market_id.clone(),
            question: question.to_string(),
            status: MarketStatus::Open,
            created_at: now,
            closes_at: now + Duration::days(i64::from(new.duration_days)),
            liquidity_usdc: liquidity,
            volume_usdc: 0.0,
            yes_price: 0.5,
        };
        let receipt = TxReceipt {
            market_id,
            tx_ref: Self::tx_ref(),
        };

        info!(market_id = %market.market_id, "Paper market created");
        self.ledger.lock().await.markets.push(PaperEntry {
            market: market.clone(),
            yes_pool: liquidity / 2.0,
            no_pool: liquidity / 2.0,
            positions: HashMap::new(),
        });

        Ok((market, receipt))
    }

    async fn list_markets(
        &self,
        status: Option<MarketStatus>,
        limit: usize,
    ) -> Result<Vec<Market>, MarketError> {
        let mut ledger = self.ledger.lock().await;
        Ok(ledger
            .markets
            .iter_mut()
            .rev()
            .map(|e| {
                e.refresh();
                e.market.clone()
            })
            .filter(|m| status.is_none_or(|s| m.status == s))
            .take(limit)
            .collect())
    }

    async fn get_market(&self, market_id: &str) -> Result<Market, MarketError> {
        let mut ledger = self.ledger.lock().await;
        Ok(ledger.entry_mut(market_id)?.market.clone())
    }

    async fn stats(&self) -> Result<PlatformStats, MarketError> {
        let mut ledger = self.ledger.lock().await;
        let trades = ledger.trades;
        let mut stats = PlatformStats {
            trades,
            ..PlatformStats::default()
        };
        for entry in ledger.markets.iter_mut() {
            entry.refresh();
            stats.total_markets += 1;
            if entry.market.status == MarketStatus::Open {
                stats.open_markets += 1;
            }
            stats.total_volume_usdc += entry.market.volume_usdc;
            stats.total_liquidity_usdc += entry.market.liquidity_usdc;
        }
        Ok(stats)
    }

    async fn buy(
        &self,
        market_id: &str,
        outcome: Outcome,
        amount_usdc: f64,
    ) -> Result<TradeReceipt, MarketError> {
        let amount = positive(amount_usdc, "amountUsdc")?;
        let mut ledger = self.ledger.lock().await;
        let entry = ledger.entry_mut(market_id)?;
        if entry.market.status == MarketStatus::Closed {
            return Err(MarketError::Closed(market_id.to_string()));
        }

        let price = entry.price(outcome);
        let shares = amount / price;
        *entry.pool_mut(outcome) += amount;
        *entry.positions.entry(outcome).or_insert(0.0) += shares;
        entry.market.volume_usdc += amount;
        entry.refresh();
        ledger.trades += 1;

        Ok(TradeReceipt {
            market_id: market_id.to_string(),
            tx_ref: Self::tx_ref(),
            outcome,
            shares,
            amount_usdc: amount,
            price,
        })
    }

    async fn sell(
        &self,
        market_id: &str,
        outcome: Outcome,
        shares: f64,
    ) -> Result<TradeReceipt, MarketError> {
        let shares = positive(shares, "shares")?;
        let mut ledger = self.ledger.lock().await;
        let entry = ledger.entry_mut(market_id)?;
        if entry.market.status == MarketStatus::Closed {
            return Err(MarketError::Closed(market_id.to_string()));
        }

        let held = entry.positions.get(&outcome).copied().unwrap_or(0.0);
        if shares > held + f64::EPSILON {
            return Err(MarketError::InsufficientShares {
                held,
                requested: shares,
            });
        }

        let price = entry.price(outcome);
        let proceeds = (shares * price).min(*entry.pool_mut(outcome));
        *entry.pool_mut(outcome) -= proceeds;
        entry.positions.insert(outcome, (held - shares).max(0.0));
        entry.market.volume_usdc += proceeds;
        entry.refresh();
        ledger.trades += 1;

        Ok(TradeReceipt {
            market_id: market_id.to_string(),
            tx_ref: Self::tx_ref(),
            outcome,
            shares,
            amount_usdc: proceeds,
            price,
        })
    }
}
