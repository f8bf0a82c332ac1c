//! Subgraph GraphQL client
//!
//! # Feeds
//! - `marketCreateds` - default window: last 14 days
//! - `marketSettleds` - zero-address winners excluded
//! - `marketParticipations`
//! - `withdrawBalances` - filterable by user
//! - `ownershipTransferreds`

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use super::{queries, EventFilter};
use crate::error::RektError;
use crate::market::MarketHistory;
use crate::types::{
    Address, MarketCreatedEvent, MarketParticipationEvent, MarketSettledEvent,
    OwnershipTransferredEvent, WithdrawBalanceEvent,
};
use crate::{HTTP_TIMEOUT_SECS, SUBGRAPH_LOOKBACK_SECS};

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<Map<String, Value>>,
    #[serde(default)]
    errors: Option<Vec<GraphQlError>>,
}

/// GraphQL client for the REKT subgraph
#[derive(Clone)]
pub struct SubgraphClient {
    client: Client,
    url: String,
}

impl SubgraphClient {
    pub fn new(url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client, url: url.trim_end_matches('/').to_string() })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// POST a document and decode the list under `field`
    async fn query<T: DeserializeOwned>(
        &self,
        document: &str,
        variables: Value,
        field: &str,
    ) -> Result<Vec<T>> {
        debug!("GraphQL {} {} -> {}", field, variables, self.url);

        let response = self
            .client
            .post(&self.url)
            .json(&json!({ "query": document, "variables": variables }))
            .send()
            .await
            .context("Subgraph request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("HTTP {} for {}: {}", status, self.url, body);
        }

        let parsed: GraphQlResponse =
            response.json().await.context("Failed to parse GraphQL response")?;
        if let Some(errors) = parsed.errors.filter(|e| !e.is_empty()) {
            let joined = errors.into_iter().map(|e| e.message).collect::<Vec<_>>().join("; ");
            return Err(RektError::Subgraph(joined).into());
        }

        let rows = parsed
            .data
            .and_then(|mut data| data.remove(field))
            .ok_or_else(|| RektError::Subgraph(format!("response has no `{}` field", field)))?;

        serde_json::from_value(rows).with_context(|| format!("Failed to parse {}", field))
    }

    /// Markets created inside the filter window (default: last 14 days)
    pub async fn market_createds(&self, filter: &EventFilter) -> Result<Vec<MarketCreatedEvent>> {
        let mut filter = filter.clone();
        if filter.since.is_none() && filter.market_id.is_none() {
            filter.since = Some(Utc::now().timestamp() - SUBGRAPH_LOOKBACK_SECS);
        }
        self.query(queries::MARKET_CREATEDS, filter.variables(Map::new()), "marketCreateds").await
    }

    /// Creation event for one market, regardless of age
    pub async fn market_created(&self, market_id: u64) -> Result<Option<MarketCreatedEvent>> {
        let filter = EventFilter::new().market(market_id).first(1);
        let variables = filter.variables(Map::new());
        let events: Vec<MarketCreatedEvent> =
            self.query(queries::MARKET_CREATEDS, variables, "marketCreateds").await?;
        Ok(events.into_iter().next())
    }

    /// Settlements with a real winner
    pub async fn market_settleds(&self, filter: &EventFilter) -> Result<Vec<MarketSettledEvent>> {
        let mut base = Map::new();
        base.insert("winner_not".into(), Value::String(Address::ZERO.to_string()));
        self.query(queries::MARKET_SETTLEDS, filter.variables(base), "marketSettleds").await
    }

    pub async fn market_participations(
        &self,
        filter: &EventFilter,
    ) -> Result<Vec<MarketParticipationEvent>> {
        let variables = filter.variables(Map::new());
        self.query(queries::MARKET_PARTICIPATIONS, variables, "marketParticipations").await
    }

    pub async fn withdraw_balances(
        &self,
        filter: &EventFilter,
    ) -> Result<Vec<WithdrawBalanceEvent>> {
        let variables = filter.variables(Map::new());
        self.query(queries::WITHDRAW_BALANCES, variables, "withdrawBalances").await
    }

    pub async fn ownership_transferreds(
        &self,
        filter: &EventFilter,
    ) -> Result<Vec<OwnershipTransferredEvent>> {
        let variables = filter.variables(Map::new());
        self.query(queries::OWNERSHIP_TRANSFERREDS, variables, "ownershipTransferreds").await
    }

    /// Connectivity check with a one-row query
    pub async fn test_connectivity(&self) -> Result<()> {
        info!("Testing connectivity to {}", self.url);
        self.ownership_transferreds(&EventFilter::new().first(1)).await?;
        info!("Subgraph connectivity: OK");
        Ok(())
    }
}

#[async_trait]
impl MarketHistory for SubgraphClient {
    async fn created_at(&self, market_id: u64) -> Result<Option<i64>> {
        Ok(self.market_created(market_id).await?.and_then(|e| e.block_timestamp_secs()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn created(id: &str, market_id: &str, ts: &str) -> Value {
        json!({
            "id": id,
            "marketId": market_id,
            "startTime": "0",
            "deadline": "1717003600",
            "blockTimestamp": ts,
            "blockNumber": "120",
            "transactionHash": "0xabc"
        })
    }

    #[tokio::test]
    async fn test_market_createds_applies_lookback() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"variables": {"first": 10, "skip": 0}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"marketCreateds": [created("0x01", "4", "1717000000")]}
            })))
            .mount(&server)
            .await;

        let client = SubgraphClient::new(&server.uri()).unwrap();
        let events = client.market_createds(&EventFilter::new().first(10)).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].market_id.as_deref(), Some("4"));

        let requests = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        let since: i64 =
            body["variables"]["where"]["blockTimestamp_gt"].as_str().unwrap().parse().unwrap();
        let expected = Utc::now().timestamp() - SUBGRAPH_LOOKBACK_SECS;
        assert!((since - expected).abs() < 60);
    }

    #[tokio::test]
    async fn test_settled_feed_excludes_zero_winner() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "variables": {"where": {
                    "marketId": "2",
                    "winner_not": "0x0000000000000000000000000000000000000000"
                }}
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"data": {"marketSettleds": []}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = SubgraphClient::new(&server.uri()).unwrap();
        let events = client.market_settleds(&EventFilter::new().market(2)).await.unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_graphql_errors_become_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errors": [{"message": "indexing error"}, {"message": "store unavailable"}]
            })))
            .mount(&server)
            .await;

        let client = SubgraphClient::new(&server.uri()).unwrap();
        let err = client.withdraw_balances(&EventFilter::new()).await.unwrap_err();
        match err.downcast_ref::<RektError>() {
            Some(RektError::Subgraph(msg)) => assert_eq!(msg, "indexing error; store unavailable"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_history_created_at() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"variables": {"first": 1, "where": {"marketId": "9"}}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"marketCreateds": [created("0x09", "9", "1717000123")]}
            })))
            .mount(&server)
            .await;

        let client = SubgraphClient::new(&server.uri()).unwrap();
        assert_eq!(client.created_at(9).await.unwrap(), Some(1_717_000_123));

        let requests = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert!(body["variables"]["where"].get("blockTimestamp_gt").is_none());
    }

    #[tokio::test]
    async fn test_missing_data_field() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {}})))
            .mount(&server)
            .await;

        let client = SubgraphClient::new(&server.uri()).unwrap();
        let err = client.ownership_transferreds(&EventFilter::new()).await.unwrap_err();
        assert!(err.to_string().contains("ownershipTransferreds"));
    }
}
