//! Chat service REST client
//!
//! # Endpoints
//! - GET /api/chats - page of chats (`userAddress`, `marketId`, `limit`, `offset`)
//! - GET /api/chats?id= - single chat
//! - POST /api/chats - create
//! - PUT /api/chats?id= - partial update
//! - DELETE /api/chats?id= - delete
//! - GET/POST /api/markets - off-chain market records

use anyhow::{Context, Result};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::types::{ChatMessage, ChatPage, ErrorBody, MarketRecord, NewChat, NewMarketRecord};
use crate::{DEFAULT_CHAT_API_BASE, HTTP_TIMEOUT_SECS};

/// Filters for `GET /api/chats`
#[derive(Clone, Debug, Default)]
pub struct ChatQuery {
    pub user_address: Option<String>,
    pub market_id: Option<u64>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl ChatQuery {
    fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(user) = &self.user_address {
            params.push(("userAddress", user.clone()));
        }
        if let Some(id) = self.market_id {
            params.push(("marketId", id.to_string()));
        }
        if let Some(limit) = self.limit {
            params.push(("limit", limit.to_string()));
        }
        if let Some(offset) = self.offset {
            params.push(("offset", offset.to_string()));
        }
        params
    }
}

/// Chat service REST client
#[derive(Clone)]
pub struct ChatClient {
    client: Client,
    base_url: String,
}

impl ChatClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url(DEFAULT_CHAT_API_BASE)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string() })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST /api/chats
    pub async fn create_chat(&self, chat: &NewChat) -> Result<ChatMessage> {
        let url = format!("{}/api/chats", self.base_url);
        debug!("POST {}", url);

        let response =
            self.client.post(&url).json(chat).send().await.context("HTTP request failed")?;
        decode(response, &url).await
    }

    /// GET /api/chats
    pub async fn list_chats(&self, query: &ChatQuery) -> Result<ChatPage> {
        let url = format!("{}/api/chats", self.base_url);
        debug!("GET {} {:?}", url, query);

        let response = self
            .client
            .get(&url)
            .query(&query.params())
            .send()
            .await
            .context("HTTP request failed")?;
        decode(response, &url).await
    }

    /// GET /api/chats?id= - None on 404
    pub async fn get_chat(&self, id: &str) -> Result<Option<ChatMessage>> {
        let url = format!("{}/api/chats", self.base_url);
        debug!("GET {}?id={}", url, id);

        let response = self
            .client
            .get(&url)
            .query(&[("id", id)])
            .send()
            .await
            .context("HTTP request failed")?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        decode(response, &url).await.map(Some)
    }

    /// PUT /api/chats?id= - None on 404
    pub async fn update_chat(&self, id: &str, changes: &NewChat) -> Result<Option<ChatMessage>> {
        let url = format!("{}/api/chats", self.base_url);
        debug!("PUT {}?id={}", url, id);

        let response = self
            .client
            .put(&url)
            .query(&[("id", id)])
            .json(changes)
            .send()
            .await
            .context("HTTP request failed")?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        decode(response, &url).await.map(Some)
    }

    /// DELETE /api/chats?id= - false on 404
    pub async fn delete_chat(&self, id: &str) -> Result<bool> {
        let url = format!("{}/api/chats", self.base_url);
        debug!("DELETE {}?id={}", url, id);

        let response = self
            .client
            .delete(&url)
            .query(&[("id", id)])
            .send()
            .await
            .context("HTTP request failed")?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        let _: serde_json::Value = decode(response, &url).await?;
        Ok(true)
    }

    /// POST /api/markets
    pub async fn create_market_record(&self, record: &NewMarketRecord) -> Result<MarketRecord> {
        let url = format!("{}/api/markets", self.base_url);
        debug!("POST {}", url);

        let response =
            self.client.post(&url).json(record).send().await.context("HTTP request failed")?;
        decode(response, &url).await
    }

    /// GET /api/markets?marketId= - None on 404
    pub async fn get_market_record(&self, market_id: u64) -> Result<Option<MarketRecord>> {
        let url = format!("{}/api/markets", self.base_url);
        debug!("GET {}?marketId={}", url, market_id);

        let response = self
            .client
            .get(&url)
            .query(&[("marketId", market_id.to_string())])
            .send()
            .await
            .context("HTTP request failed")?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        decode(response, &url).await.map(Some)
    }

    /// Connectivity check with a one-row page
    pub async fn test_connectivity(&self) -> Result<()> {
        info!("Testing connectivity to {}", self.base_url);
        let page = self.list_chats(&ChatQuery { limit: Some(1), ..Default::default() }).await?;
        info!("Chat service connectivity: OK ({} chats)", page.pagination.total);
        Ok(())
    }
}

async fn decode<T: DeserializeOwned>(response: Response, url: &str) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body).map(|e| e.error).unwrap_or(body);
        anyhow::bail!("HTTP {} for {}: {}", status, url, message);
    }
    response.json().await.with_context(|| format!("Failed to parse response from {}", url))
}
