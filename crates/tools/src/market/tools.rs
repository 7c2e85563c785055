use std::sync::Arc;

use async_trait::async_trait;
use augur_core::error::ToolError;
use augur_core::tool::Tool;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use super::{MarketBackend, MarketError, MarketStatus, NewMarket, Outcome};
use crate::parse_input;

const DEFAULT_LIST_LIMIT: usize = 10;
const MAX_LIST_LIMIT: usize = 100;

fn backend_error(tool: &str, e: MarketError) -> ToolError {
    match e {
        MarketError::InvalidRequest(reason) => ToolError::InvalidArguments(reason),
        other => ToolError::failed(tool, other),
    }
}

fn parse_outcome(raw: &str) -> Result<Outcome, ToolError> {
    raw.parse::<Outcome>()
        .map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

/// Open a new binary market.
pub struct CreateMarketTool {
    backend: Arc<dyn MarketBackend>,
    default_duration_days: u32,
    default_liquidity_usdc: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateMarketInput {
    question: String,
    duration_days: Option<u32>,
    liquidity_usdc: Option<f64>,
}

impl CreateMarketTool {
    pub fn new(
        backend: Arc<dyn MarketBackend>,
        default_duration_days: u32,
        default_liquidity_usdc: f64,
    ) -> Self {
        Self {
            backend,
            default_duration_days,
            default_liquidity_usdc,
        }
    }
}

#[async_trait]
impl Tool for CreateMarketTool {
    fn name(&self) -> &str {
        "create_market"
    }

    fn description(&self) -> &str {
        "Create a new yes/no prediction market. The question should be unambiguous and resolvable by a specific date."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "question": {
                    "type": "string",
                    "description": "The yes/no question the market resolves on"
                },
                "durationDays": {
                    "type": "integer",
                    "description": "Days until the market closes",
                    "minimum": 1
                },
                "liquidityUsdc": {
                    "type": "number",
                    "description": "Initial liquidity in USDC"
                }
            },
            "required": ["question"]
        })
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let input: CreateMarketInput = parse_input(input)?;
        let request = NewMarket {
            question: input.question,
            duration_days: input.duration_days.unwrap_or(self.default_duration_days),
            liquidity_usdc: input.liquidity_usdc.unwrap_or(self.default_liquidity_usdc),
        };

        let (market, receipt) = self
            .backend
            .create_market(request)
            .await
            .map_err(|e| backend_error(self.name(), e))?;
        info!(market_id = %market.market_id, "Market created");

        Ok(json!({
            "marketId": market.market_id,
            "txRef": receipt.tx_ref,
            "question": market.question,
            "closesAt": market.closes_at,
            "liquidityUsdc": market.liquidity_usdc,
            "network": self.backend.network(),
        }))
    }
}

/// List markets, newest first.
pub struct ListMarketsTool {
    backend: Arc<dyn MarketBackend>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ListMarketsInput {
    status: Option<MarketStatus>,
    limit: Option<usize>,
}

impl ListMarketsTool {
    pub fn new(backend: Arc<dyn MarketBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for ListMarketsTool {
    fn name(&self) -> &str {
        "list_markets"
    }

    fn description(&self) -> &str {
        "List prediction markets with their current yes price, volume and status."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "status": {
                    "type": "string",
                    "enum": ["open", "closed"],
                    "description": "Only return markets with this status"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of markets (default 10)"
                }
            }
        })
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let input: ListMarketsInput = if input.is_null() {
            ListMarketsInput::default()
        } else {
            parse_input(input)?
        };
        let limit = input
            .limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT);

        let markets = self
            .backend
            .list_markets(input.status, limit)
            .await
            .map_err(|e| backend_error(self.name(), e))?;

        Ok(json!({
            "count": markets.len(),
            "markets": markets,
            "network": self.backend.network(),
        }))
    }
}

/// Fetch a single market.
pub struct GetMarketTool {
    backend: Arc<dyn MarketBackend>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetMarketInput {
    market_id: String,
}

impl GetMarketTool {
    pub fn new(backend: Arc<dyn MarketBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for GetMarketTool {
    fn name(&self) -> &str {
        "get_market"
    }

    fn description(&self) -> &str {
        "Get the details of one market by id."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "marketId": { "type": "string", "description": "The market id" }
            },
            "required": ["marketId"]
        })
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let input: GetMarketInput = parse_input(input)?;
        let market = self
            .backend
            .get_market(&input.market_id)
            .await
            .map_err(|e| backend_error(self.name(), e))?;
        Ok(json!({ "market": market }))
    }
}

/// Platform-wide totals.
pub struct MarketStatsTool {
    backend: Arc<dyn MarketBackend>,
}

impl MarketStatsTool {
    pub fn new(backend: Arc<dyn MarketBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for MarketStatsTool {
    fn name(&self) -> &str {
        "market_stats"
    }

    fn description(&self) -> &str {
        "Get platform statistics: market counts, total volume and liquidity, trade count."
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _input: Value) -> Result<Value, ToolError> {
        let stats = self
            .backend
            .stats()
            .await
            .map_err(|e| backend_error(self.name(), e))?;

        let mut value = serde_json::to_value(stats)
            .map_err(|e| ToolError::failed(self.name(), e))?;
        value["network"] = json!(self.backend.network());
        Ok(value)
    }
}

/// Buy outcome shares with USDC.
pub struct BuySharesTool {
    backend: Arc<dyn MarketBackend>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuyInput {
    market_id: String,
    outcome: String,
    amount_usdc: f64,
}

impl BuySharesTool {
    pub fn new(backend: Arc<dyn MarketBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for BuySharesTool {
    fn name(&self) -> &str {
        "buy_shares"
    }

    fn description(&self) -> &str {
        "Buy yes or no shares in a market, spending the given amount of USDC."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "marketId": { "type": "string" },
                "outcome": { "type": "string", "enum": ["yes", "no"] },
                "amountUsdc": { "type": "number", "description": "USDC to spend" }
            },
            "required": ["marketId", "outcome", "amountUsdc"]
        })
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let input: BuyInput = parse_input(input)?;
        let outcome = parse_outcome(&input.outcome)?;
        let receipt = self
            .backend
            .buy(&input.market_id, outcome, input.amount_usdc)
            .await
            .map_err(|e| backend_error(self.name(), e))?;
        serde_json::to_value(receipt).map_err(|e| ToolError::failed(self.name(), e))
    }
}

/// Sell previously bought shares.
pub struct SellSharesTool {
    backend: Arc<dyn MarketBackend>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SellInput {
    market_id: String,
    outcome: String,
    shares: f64,
}

impl SellSharesTool {
    pub fn new(backend: Arc<dyn MarketBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for SellSharesTool {
    fn name(&self) -> &str {
        "sell_shares"
    }

    fn description(&self) -> &str {
        "Sell yes or no shares in a market back for USDC."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "marketId": { "type": "string" },
                "outcome": { "type": "string", "enum": ["yes", "no"] },
                "shares": { "type": "number", "description": "Number of shares to sell" }
            },
            "required": ["marketId", "outcome", "shares"]
        })
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let input: SellInput = parse_input(input)?;
        let outcome = parse_outcome(&input.outcome)?;
        let receipt = self
            .backend
            .sell(&input.market_id, outcome, input.shares)
            .await
            .map_err(|e| backend_error(self.name(), e))?;
        serde_json::to_value(receipt).map_err(|e| ToolError::failed(self.name(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::PaperMarket;

    fn backend() -> Arc<dyn MarketBackend> {
        Arc::new(PaperMarket::new())
    }

    #[tokio::test]
    async fn create_market_applies_defaults() {
        let backend = backend();
        let tool = CreateMarketTool::new(backend.clone(), 30, 1.0);
        let result = tool
            .execute(json!({"question": "Will BTC close above $100k on Dec 31?"}))
            .await
            .unwrap();

        assert!(result["marketId"].as_str().unwrap().starts_with("mkt-"));
        assert_eq!(result["liquidityUsdc"], 1.0);
        assert_eq!(result["network"], "paper");
        assert_eq!(backend.stats().await.unwrap().total_markets, 1);
    }

    #[tokio::test]
    async fn create_market_requires_question() {
        let tool = CreateMarketTool::new(backend(), 30, 1.0);
        let err = tool.execute(json!({"durationDays": 3})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));

        let err = tool.execute(json!({"question": "  "})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn trade_round() {
        let backend = backend();
        let (market, _) = backend
            .create_market(NewMarket {
                question: "Q?".into(),
                duration_days: 7,
                liquidity_usdc: 4.0,
            })
            .await
            .unwrap();

        let buy = BuySharesTool::new(backend.clone());
        let bought = buy
            .execute(json!({"marketId": market.market_id, "outcome": "YES", "amountUsdc": 2.0}))
            .await
            .unwrap();
        assert_eq!(bought["outcome"], "yes");
        let shares = bought["shares"].as_f64().unwrap();

        let sell = SellSharesTool::new(backend.clone());
        let sold = sell
            .execute(json!({"marketId": market.market_id, "outcome": "yes", "shares": shares}))
            .await
            .unwrap();
        assert!(sold["amountUsdc"].as_f64().unwrap() > 0.0);

        let stats = MarketStatsTool::new(backend).execute(json!({})).await.unwrap();
        assert_eq!(stats["trades"], 2);
    }

    #[tokio::test]
    async fn bad_outcome_is_invalid_arguments() {
        let tool = BuySharesTool::new(backend());
        let err = tool
            .execute(json!({"marketId": "mkt-x", "outcome": "maybe", "amountUsdc": 1.0}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn missing_market_is_execution_failure() {
        let tool = GetMarketTool::new(backend());
        let err = tool.execute(json!({"marketId": "mkt-nope"})).await.unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
    }

    #[tokio::test]
    async fn list_accepts_empty_input() {
        let tool = ListMarketsTool::new(backend());
        let result = tool.execute(json!({})).await.unwrap();
        assert_eq!(result["count"], 0);
        let result = tool.execute(Value::Null).await.unwrap();
        assert_eq!(result["count"], 0);
    }
}
