//! Typed bindings for the REKT prediction-market contract

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::abi::{self, Decoder, Token};
use super::rpc::JsonRpcClient;
use super::signatures;
use crate::config::{ConfirmConfig, RektConfig};
use crate::error::RektError;
use crate::market::MarketReader;
use crate::types::{Address, Market, MarketPhase, PlayerData};

/// Arguments of `createMarket`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMarketParams {
    pub market_id: u64,
    pub start_time: i64,
    pub deadline: i64,
    /// Wei
    pub participation_fee: u128,
    pub name: String,
}

/// Mined transaction
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub tx_hash: String,
    pub block_number: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_used: Option<u64>,
}

/// REKT contract client
#[derive(Clone)]
pub struct RektContract {
    rpc: JsonRpcClient,
    address: Address,
    from: Option<Address>,
    confirm: ConfirmConfig,
}

impl RektContract {
    /// Build from adapter configuration
    pub fn new(config: &RektConfig) -> Result<Self> {
        let rpc = JsonRpcClient::new(&config.rpc.url)?;
        Ok(Self::with_rpc(
            rpc,
            config.rpc.contract_address,
            config.rpc.from,
            config.confirm.clone(),
        ))
    }

    pub fn with_rpc(
        rpc: JsonRpcClient,
        address: Address,
        from: Option<Address>,
        confirm: ConfirmConfig,
    ) -> Self {
        Self { rpc, address, from, confirm }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn sender(&self) -> Option<Address> {
        self.from
    }

    pub fn rpc(&self) -> &JsonRpcClient {
        &self.rpc
    }

    async fn call(&self, signature: &str, args: &[Token]) -> Result<Vec<u8>> {
        let data = abi::to_hex(&abi::encode_call(signature, args));
        let params = json!([{ "to": self.address.to_string(), "data": data }, "latest"]);
        let raw = self
            .rpc
            .request_str("eth_call", params)
            .await
            .with_context(|| format!("eth_call {} failed", signature))?;
        Ok(abi::from_hex(&raw)?)
    }

    /// `markets(marketId)`
    pub async fn market(&self, market_id: u64) -> Result<Market> {
        let data = self.call(signatures::MARKETS, &[Token::Uint(market_id.into())]).await?;
        let mut d = Decoder::new(&data);
        let market = Market {
            market_id,
            start_time: d.timestamp()?,
            deadline: d.timestamp()?,
            entrance_fee: d.uint()?,
            final_price: d.uint()?,
            total_amount: d.uint()?,
            settled: d.bool()?,
            name: d.string()?,
        };
        debug!("markets({}) -> {:?}", market_id, market);
        Ok(market)
    }

    /// `getMarketPhase(marketId)`
    pub async fn market_phase(&self, market_id: u64) -> Result<MarketPhase> {
        let data = self.call(signatures::GET_MARKET_PHASE, &[Token::Uint(market_id.into())]).await?;
        let code = Decoder::new(&data).uint()?;
        u8::try_from(code)
            .ok()
            .and_then(MarketPhase::from_code)
            .with_context(|| format!("Unknown market phase code {} for market {}", code, market_id))
    }

    /// `getPlayers(marketId)`
    pub async fn players(&self, market_id: u64) -> Result<Vec<Address>> {
        let data = self.call(signatures::GET_PLAYERS, &[Token::Uint(market_id.into())]).await?;
        Ok(Decoder::new(&data).address_array()?)
    }

    /// `getPlayerData(marketId, player)`
    pub async fn player_data(&self, market_id: u64, player: Address) -> Result<PlayerData> {
        let args = [Token::Uint(market_id.into()), Token::Address(player)];
        let data = self.call(signatures::GET_PLAYER_DATA, &args).await?;
        let mut d = Decoder::new(&data);
        let prediction_price = d.uint()?;
        let timestamp = d.timestamp()?;
        let extra = d.bytes32()?;
        Ok(PlayerData {
            player,
            prediction_price,
            timestamp,
            data: abi::to_hex(&extra),
            has_participated: timestamp != 0,
        })
    }

    async fn send(&self, data: Vec<u8>, value: u128) -> Result<String> {
        let from = self.from.ok_or(RektError::MissingSender)?;
        let mut tx = json!({
            "from": from.to_string(),
            "to": self.address.to_string(),
            "data": abi::to_hex(&data),
        });
        if value > 0 {
            tx["value"] = Value::String(abi::to_quantity(value));
        }
        let hash = self.rpc.request_str("eth_sendTransaction", json!([tx])).await?;
        info!("Submitted transaction {}", hash);
        Ok(hash)
    }

    /// `createMarket(marketId, startTime, deadline, participationFee, name)`
    pub async fn create_market(&self, params: &CreateMarketParams) -> Result<String> {
        let data = abi::encode_call(
            signatures::CREATE_MARKET,
            &[
                Token::Uint(params.market_id.into()),
                Token::Uint(params.start_time.max(0) as u128),
                Token::Uint(params.deadline.max(0) as u128),
                Token::Uint(params.participation_fee),
                Token::String(params.name.clone()),
            ],
        );
        self.send(data, 0).await.context("createMarket failed")
    }

    /// `participateInMarket(marketId, predictionPrice, data)`, paying `value` wei
    pub async fn participate_in_market(
        &self,
        market_id: u64,
        prediction_price: u128,
        data: [u8; 32],
        value: u128,
    ) -> Result<String> {
        let call = abi::encode_call(
            signatures::PARTICIPATE_IN_MARKET,
            &[
                Token::Uint(market_id.into()),
                Token::Uint(prediction_price),
                Token::FixedBytes(data),
            ],
        );
        self.send(call, value).await.context("participateInMarket failed")
    }

    /// `settleMarket(marketId, finalPrice)`
    pub async fn settle_market(&self, market_id: u64, final_price: u128) -> Result<String> {
        let call = abi::encode_call(
            signatures::SETTLE_MARKET,
            &[Token::Uint(market_id.into()), Token::Uint(final_price)],
        );
        self.send(call, 0).await.context("settleMarket failed")
    }

    /// Poll for the receipt until mined or the confirmation timeout passes
    pub async fn wait_for_receipt(&self, tx_hash: &str) -> Result<TxReceipt> {
        let started = tokio::time::Instant::now();
        loop {
            let receipt = self.rpc.request("eth_getTransactionReceipt", json!([tx_hash])).await?;
            if !receipt.is_null() {
                return parse_receipt(tx_hash, &receipt);
            }

            let waited = started.elapsed();
            if waited >= self.confirm.timeout {
                warn!("Transaction {} still pending after {:?}", tx_hash, waited);
                return Err(RektError::ConfirmationTimeout {
                    tx_hash: tx_hash.to_string(),
                    waited_secs: waited.as_secs(),
                }
                .into());
            }
            debug!("Receipt for {} not available yet", tx_hash);
            tokio::time::sleep(self.confirm.poll_interval.min(Duration::from_secs(30))).await;
        }
    }
}

fn parse_receipt(tx_hash: &str, receipt: &Value) -> Result<TxReceipt> {
    let quantity = |field: &str| -> Result<Option<u64>> {
        match receipt.get(field).and_then(Value::as_str) {
            Some(raw) => Ok(Some(abi::parse_quantity(raw)?)),
            None => Ok(None),
        }
    };

    if quantity("status")? == Some(0) {
        return Err(RektError::Reverted { tx_hash: tx_hash.to_string() }.into());
    }

    let block_number = quantity("blockNumber")?.context("Receipt is missing blockNumber")?;
    info!("Transaction {} confirmed in block {}", tx_hash, block_number);
    Ok(TxReceipt { tx_hash: tx_hash.to_string(), block_number, gas_used: quantity("gasUsed")? })
}

#[async_trait]
impl MarketReader for RektContract {
    async fn market(&self, market_id: u64) -> Result<Market> {
        RektContract::market(self, market_id).await
    }

    async fn chain_phase(&self, market_id: u64) -> Result<MarketPhase> {
        self.market_phase(market_id).await
    }

    async fn players(&self, market_id: u64) -> Result<Vec<Address>> {
        RektContract::players(self, market_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::testing::{rpc_result, CallTo, RpcMethod};
    use wiremock::{Mock, MockServer};

    const CONTRACT: &str = "0x5fbdb2315678afecb367f032d93f642f64180aa3";
    const PLAYER: &str = "0x70997970c51812dc3a010c7d01b50e0d17dc79c8";

    fn contract(server: &MockServer, from: Option<Address>) -> RektContract {
        let confirm = ConfirmConfig {
            poll_interval: Duration::from_millis(10),
            timeout: Duration::from_millis(200),
        };
        RektContract::with_rpc(
            JsonRpcClient::new(&server.uri()).unwrap(),
            CONTRACT.parse().unwrap(),
            from,
            confirm,
        )
    }

    fn market_return() -> String {
        abi::to_hex(&abi::encode(&[
            Token::Uint(1000),
            Token::Uint(2000),
            Token::Uint(10_000_000_000_000_000),
            Token::Uint(0),
            Token::Uint(20_000_000_000_000_000),
            Token::Bool(false),
            Token::String("ETH gas forecast".to_string()),
        ]))
    }

    #[tokio::test]
    async fn test_market_read() {
        let server = MockServer::start().await;
        Mock::given(RpcMethod("eth_call"))
            .and(CallTo(signatures::MARKETS))
            .respond_with(rpc_result(json!(market_return())))
            .mount(&server)
            .await;

        let market = contract(&server, None).market(3).await.unwrap();
        assert_eq!(market.market_id, 3);
        assert_eq!(market.start_time, 1000);
        assert_eq!(market.deadline, 2000);
        assert_eq!(market.entrance_fee, 10_000_000_000_000_000);
        assert_eq!(market.total_amount, 20_000_000_000_000_000);
        assert!(!market.settled);
        assert_eq!(market.name, "ETH gas forecast");
    }

    #[tokio::test]
    async fn test_phase_players_and_player_data() {
        let server = MockServer::start().await;
        let player: Address = PLAYER.parse().unwrap();

        Mock::given(CallTo(signatures::GET_MARKET_PHASE))
            .respond_with(rpc_result(json!(abi::to_hex(&abi::encode(&[Token::Uint(1)])))))
            .mount(&server)
            .await;

        let mut players = abi::encode(&[Token::Uint(0x20), Token::Uint(1)]);
        players.extend_from_slice(&abi::encode(&[Token::Address(player)]));
        Mock::given(CallTo(signatures::GET_PLAYERS))
            .respond_with(rpc_result(json!(abi::to_hex(&players))))
            .mount(&server)
            .await;

        Mock::given(CallTo(signatures::GET_PLAYER_DATA))
            .respond_with(rpc_result(json!(abi::to_hex(&abi::encode(&[
                Token::Uint(65_000),
                Token::Uint(1500),
                Token::FixedBytes([0u8; 32]),
            ])))))
            .mount(&server)
            .await;

        let rekt = contract(&server, None);
        assert_eq!(rekt.market_phase(3).await.unwrap(), MarketPhase::Locked);
        assert_eq!(rekt.players(3).await.unwrap(), vec![player]);

        let data = rekt.player_data(3, player).await.unwrap();
        assert_eq!(data.prediction_price, 65_000);
        assert!(data.has_participated);
        assert_eq!(data.data, format!("0x{}", "0".repeat(64)));
    }

    #[tokio::test]
    async fn test_write_requires_sender() {
        let server = MockServer::start().await;
        let err = contract(&server, None).settle_market(1, 5).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<RektError>(), Some(RektError::MissingSender)));
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn test_participate_sends_value_and_confirms() {
        let server = MockServer::start().await;
        Mock::given(RpcMethod("eth_sendTransaction"))
            .and(CallTo(signatures::PARTICIPATE_IN_MARKET))
            .respond_with(rpc_result(json!("0xfeed")))
            .mount(&server)
            .await;
        Mock::given(RpcMethod("eth_getTransactionReceipt"))
            .respond_with(rpc_result(json!({
                "status": "0x1",
                "blockNumber": "0x2a",
                "gasUsed": "0x5208"
            })))
            .mount(&server)
            .await;

        let rekt = contract(&server, Some(PLAYER.parse().unwrap()));
        let hash =
            rekt.participate_in_market(3, 65_000, [0u8; 32], 0x2386f26fc10000).await.unwrap();
        assert_eq!(hash, "0xfeed");

        let receipt = rekt.wait_for_receipt(&hash).await.unwrap();
        assert_eq!(receipt.block_number, 42);
        assert_eq!(receipt.gas_used, Some(21000));

        let requests = server.received_requests().await.unwrap();
        let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(sent["params"][0]["value"], json!("0x2386f26fc10000"));
        assert_eq!(sent["params"][0]["from"], json!(PLAYER));
    }

    #[tokio::test]
    async fn test_reverted_receipt() {
        let server = MockServer::start().await;
        Mock::given(RpcMethod("eth_getTransactionReceipt"))
            .respond_with(rpc_result(json!({"status": "0x0", "blockNumber": "0x2a"})))
            .mount(&server)
            .await;

        let err = contract(&server, None).wait_for_receipt("0xdead").await.unwrap_err();
        assert!(matches!(err.downcast_ref::<RektError>(), Some(RektError::Reverted { .. })));
    }

    #[tokio::test]
    async fn test_confirmation_timeout() {
        let server = MockServer::start().await;
        Mock::given(RpcMethod("eth_getTransactionReceipt"))
            .respond_with(rpc_result(Value::Null))
            .mount(&server)
            .await;

        let err = contract(&server, None).wait_for_receipt("0xslow").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RektError>(),
            Some(RektError::ConfirmationTimeout { .. })
        ));
    }
}
