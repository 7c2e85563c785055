//! Prediction-market tools and the backend they talk to.
//!
//! The tools only translate model input into [`MarketBackend`] calls and
//! shape the replies. Transaction construction, signing and settlement
//! belong to the backend. [`PaperMarket`] is an in-memory ledger with the
//! same surface, used by default and in tests.

mod paper;
mod tools;

pub use paper::PaperMarket;
pub use tools::{
    BuySharesTool, CreateMarketTool, GetMarketTool, ListMarketsTool, MarketStatsTool,
    SellSharesTool,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One side of a binary market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Yes,
    No,
}

impl std::str::FromStr for Outcome {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yes" | "y" => Ok(Self::Yes),
            "no" | "n" => Ok(Self::No),
            other => Err(MarketError::InvalidRequest(format!(
                "outcome must be 'yes' or 'no', got '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketStatus {
    Open,
    Closed,
}

/// A market as reported by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Market {
    pub market_id: String,
    pub question: String,
    pub status: MarketStatus,
    pub created_at: DateTime<Utc>,
    pub closes_at: DateTime<Utc>,
    pub liquidity_usdc: f64,
    pub volume_usdc: f64,
    /// Implied probability of `Yes`, in [0, 1]
    pub yes_price: f64,
}

/// Parameters for a new market.
#[derive(Debug, Clone)]
pub struct NewMarket {
    pub question: String,
    pub duration_days: u32,
    pub liquidity_usdc: f64,
}

/// Receipt of a state-changing backend call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub market_id: String,
    pub tx_ref: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeReceipt {
    pub market_id: String,
    pub tx_ref: String,
    pub outcome: Outcome,
    pub shares: f64,
    pub amount_usdc: f64,
    pub price: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformStats {
    pub total_markets: usize,
    pub open_markets: usize,
    pub total_volume_usdc: f64,
    pub total_liquidity_usdc: f64,
    pub trades: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum MarketError {
    #[error("market not found: {0}")]
    NotFound(String),

    #[error("market {0} is closed")]
    Closed(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("insufficient shares: hold {held:.4}, tried to sell {requested:.4}")]
    InsufficientShares { held: f64, requested: f64 },

    #[error("backend error: {0}")]
    Backend(String),
}

/// The market protocol as the tools see it.
#[async_trait]
pub trait MarketBackend: Send + Sync {
    /// Network label (e.g. "paper", "base-sepolia").
    fn network(&self) -> &str;

    async fn create_market(&self, market: NewMarket) -> Result<(Market, TxReceipt), MarketError>;

    async fn list_markets(&self, status: Option<MarketStatus>, limit: usize)
    -> Result<Vec<Market>, MarketError>;

    async fn get_market(&self, market_id: &str) -> Result<Market, MarketError>;

    async fn stats(&self) -> Result<PlatformStats, MarketError>;

    async fn buy(
        &self,
        market_id: &str,
        outcome: Outcome,
        amount_usdc: f64,
    ) -> Result<TradeReceipt, MarketError>;

    async fn sell(
        &self,
        market_id: &str,
        outcome: Outcome,
        shares: f64,
    ) -> Result<TradeReceipt, MarketError>;
}
