//! Write flows
//!
//! Each flow validates against a fresh resolution before touching the chain,
//! submits one transaction and awaits its receipt. Nothing is retried.
//!
//! # Flows
//! - `participate`: pay the entrance fee, then post a prediction chat in a
//!   detached task (chat failures are logged, never rolled back)
//! - `settle`: only when the market is in settlement and unsettled
//! - `create_market`: rejects ids already seen by the subgraph, then
//!   mirrors the record to the chat service best effort

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::chat::ChatClient;
use crate::config::RektConfig;
use crate::contract::{CreateMarketParams, RektContract, TxReceipt};
use crate::error::RektError;
use crate::market::{MarketStateResolver, MarketWatcher, ResolvedMarket};
use crate::subgraph::SubgraphClient;
use crate::types::{NewChat, NewMarketRecord};

/// A prediction to submit
#[derive(Clone, Debug)]
pub struct ParticipateRequest {
    pub market_id: u64,
    pub prediction_price: u128,
    /// Opaque `bytes32` argument forwarded to the contract
    pub data: [u8; 32],
    pub image_url: Option<String>,
}

impl ParticipateRequest {
    pub fn new(market_id: u64, prediction_price: u128) -> Self {
        Self { market_id, prediction_price, data: [0u8; 32], image_url: None }
    }
}

#[derive(Debug)]
pub struct ParticipateOutcome {
    /// Resolution the write was validated against
    pub resolved: ResolvedMarket,
    pub fee_paid: u128,
    pub receipt: TxReceipt,
    /// Detached chat post; await only to observe completion
    pub chat_post: Option<JoinHandle<()>>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleOutcome {
    pub market_id: u64,
    pub final_price: u128,
    pub receipt: TxReceipt,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMarketOutcome {
    pub params: CreateMarketParams,
    pub receipt: TxReceipt,
    /// Record stored in the chat service
    pub mirrored: bool,
}

/// Write flows over the contract and its collaborators
#[derive(Clone)]
pub struct MarketFlows {
    contract: RektContract,
    resolver: MarketStateResolver,
    subgraph: Option<SubgraphClient>,
    chat: Option<ChatClient>,
}

impl MarketFlows {
    pub fn new(contract: RektContract, resolver: MarketStateResolver) -> Self {
        Self { contract, resolver, subgraph: None, chat: None }
    }

    /// Contract, subgraph (when configured) and chat client from one config
    pub fn from_config(config: &RektConfig) -> Result<Self> {
        let contract = RektContract::new(config)?;
        let subgraph = config.subgraph_url.as_deref().map(SubgraphClient::new).transpose()?;

        let mut resolver = MarketStateResolver::new(Arc::new(contract.clone()));
        if let Some(subgraph) = &subgraph {
            resolver = resolver.with_history(Arc::new(subgraph.clone()));
        }

        let chat = ChatClient::with_base_url(&config.chat_api_url)?;
        let mut flows = Self::new(contract, resolver).with_chat(chat);
        flows.subgraph = subgraph;
        Ok(flows)
    }

    pub fn with_subgraph(mut self, subgraph: SubgraphClient) -> Self {
        self.subgraph = Some(subgraph);
        self
    }

    pub fn with_chat(mut self, chat: ChatClient) -> Self {
        self.chat = Some(chat);
        self
    }

    pub fn resolver(&self) -> &MarketStateResolver {
        &self.resolver
    }

    pub fn contract(&self) -> &RektContract {
        &self.contract
    }

    pub async fn participate(
        &self,
        request: ParticipateRequest,
        watcher: Option<&MarketWatcher>,
    ) -> Result<ParticipateOutcome> {
        let market_id = request.market_id;
        if market_id == 0 {
            return Err(RektError::InvalidMarketId(market_id).into());
        }
        let sender = self.contract.sender().ok_or(RektError::MissingSender)?;

        let resolved = self.resolver.resolve(market_id, Utc::now().timestamp()).await?;
        if !resolved.state.can_participate {
            return Err(RektError::NotParticipable { market_id, phase: resolved.phase() }.into());
        }

        let fee = resolved.market.entrance_fee;
        info!(
            "Participating in market {} at price {} (fee {} wei)",
            market_id, request.prediction_price, fee
        );
        let receipt = self
            .submit(async {
                let hash = self
                    .contract
                    .participate_in_market(market_id, request.prediction_price, request.data, fee)
                    .await?;
                self.contract.wait_for_receipt(&hash).await
            })
            .await?;

        if let Some(watcher) = watcher {
            watcher.refresh().await;
        }

        let chat_post = self.chat.as_ref().and_then(|chat| {
            let now = Utc::now().timestamp();
            let message = NewChat::prediction(sender, market_id, request.prediction_price, now);
            post_prediction_chat(chat, message, request.image_url)
        });

        Ok(ParticipateOutcome { resolved, fee_paid: fee, receipt, chat_post })
    }

    pub async fn settle(
        &self,
        market_id: u64,
        final_price: u128,
        watcher: Option<&MarketWatcher>,
    ) -> Result<SettleOutcome> {
        if market_id == 0 {
            return Err(RektError::InvalidMarketId(market_id).into());
        }
        let resolved = self.resolver.resolve(market_id, Utc::now().timestamp()).await?;
        if !resolved.state.can_settle {
            return Err(RektError::NotSettleable {
                market_id,
                phase: resolved.phase(),
                settled: resolved.state.is_settled,
            }
            .into());
        }

        info!("Settling market {} at final price {}", market_id, final_price);
        let receipt = self
            .submit(async {
                let hash = self.contract.settle_market(market_id, final_price).await?;
                self.contract.wait_for_receipt(&hash).await
            })
            .await?;

        if let Some(watcher) = watcher {
            watcher.refresh().await;
        }
        Ok(SettleOutcome { market_id, final_price, receipt })
    }

    pub async fn create_market(&self, params: CreateMarketParams) -> Result<CreateMarketOutcome> {
        validate_create(&params)?;

        if let Some(subgraph) = &self.subgraph {
            if subgraph.market_created(params.market_id).await?.is_some() {
                return Err(RektError::MarketExists(params.market_id).into());
            }
        }

        info!("Creating market {} \"{}\"", params.market_id, params.name);
        let receipt = self
            .submit(async {
                let hash = self.contract.create_market(&params).await?;
                self.contract.wait_for_receipt(&hash).await
            })
            .await?;

        let mirrored = match &self.chat {
            Some(chat) => {
                let record = NewMarketRecord {
                    market_id: Some(params.market_id),
                    start_time: Some(params.start_time),
                    deadline: Some(params.deadline),
                    participation_fee: Some(params.participation_fee),
                    name: Some(params.name.clone()),
                };
                match chat.create_market_record(&record).await {
                    Ok(_) => true,
                    Err(e) => {
                        warn!(
                            "Market {} created on-chain but not mirrored: {:#}",
                            params.market_id, e
                        );
                        false
                    }
                }
            }
            None => false,
        };

        Ok(CreateMarketOutcome { params, receipt, mirrored })
    }

    async fn submit<F>(&self, write: F) -> Result<TxReceipt>
    where
        F: std::future::Future<Output = Result<TxReceipt>>,
    {
        write.await.map_err(|e| {
            error!("Write failed: {:#}", e);
            e
        })
    }
}

fn validate_create(params: &CreateMarketParams) -> Result<()> {
    if params.market_id == 0 {
        return Err(RektError::InvalidMarketId(0).into());
    }
    if params.start_time >= params.deadline {
        return Err(RektError::Validation(format!(
            "start time {} must be before deadline {}",
            params.start_time, params.deadline
        ))
        .into());
    }
    if params.name.trim().is_empty() {
        return Err(RektError::Validation("market name is empty".to_string()).into());
    }
    Ok(())
}

/// Post the chat for a confirmed prediction; an encoding failure skips the post
fn post_prediction_chat(
    chat: &ChatClient,
    message: serde_json::Result<NewChat>,
    image_url: Option<String>,
) -> Option<JoinHandle<()>> {
    match message {
        Ok(mut message) => {
            message.image_url = image_url;
            Some(spawn_chat_post(chat.clone(), message))
        }
        Err(e) => {
            warn!("Prediction chat not encoded, skipping post (transaction stands): {}", e);
            None
        }
    }
}

fn spawn_chat_post(chat: ChatClient, message: NewChat) -> JoinHandle<()> {
    tokio::spawn(async move {
        match chat.create_chat(&message).await {
            Ok(created) => debug!("Prediction chat {} stored", created.id),
            Err(e) => warn!("Prediction chat not stored (transaction stands): {:#}", e),
        }
    })
}
