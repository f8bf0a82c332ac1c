//! SQLite persistence for chats, market records and users
//!
//! Big integers that do not fit SQLite's INTEGER (`participation_fee`) are
//! stored as decimal text. `chat_data` is stored as JSON text and decoded
//! back into the versioned payload on read.

use chrono::{DateTime, Utc};
use rekt_adapter::{ChatMessage, ChatPayload, MarketRecord, UserRecord};
use sqlx::sqlite::{Sqlite, SqlitePool};
use sqlx::{FromRow, QueryBuilder};

use crate::error::{ApiError, ApiResult};

const CHAT_COLUMNS: &str =
    "SELECT id, chat_data, image_url, timestamp, user_address, market_id, created_at FROM chats";

const MARKET_COLUMNS: &str =
    "SELECT market_id, start_time, deadline, participation_fee, name, created_at FROM markets";

#[derive(FromRow)]
struct ChatRow {
    id: String,
    chat_data: String,
    image_url: Option<String>,
    timestamp: i64,
    user_address: String,
    market_id: Option<i64>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ChatRow> for ChatMessage {
    type Error = ApiError;

    fn try_from(row: ChatRow) -> ApiResult<Self> {
        let value: serde_json::Value = serde_json::from_str(&row.chat_data)
            .map_err(|e| ApiError::Corrupt(format!("chat {}: {}", row.id, e)))?;
        let chat_data = ChatPayload::from_value(value)
            .map_err(|e| ApiError::Corrupt(format!("chat {}: {}", row.id, e)))?;
        Ok(ChatMessage {
            id: row.id,
            chat_data,
            image_url: row.image_url,
            timestamp: row.timestamp,
            user_address: row.user_address,
            market_id: row.market_id.map(|id| id as u64),
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct MarketRow {
    market_id: i64,
    start_time: i64,
    deadline: i64,
    participation_fee: String,
    name: String,
    created_at: DateTime<Utc>,
}

impl MarketRow {
    fn into_record(self, chats: Vec<ChatMessage>) -> ApiResult<MarketRecord> {
        let participation_fee = self.participation_fee.parse().map_err(|_| {
            ApiError::Corrupt(format!("market {} fee '{}'", self.market_id, self.participation_fee))
        })?;
        Ok(MarketRecord {
            market_id: self.market_id as u64,
            start_time: self.start_time,
            deadline: self.deadline,
            participation_fee,
            name: self.name,
            created_at: self.created_at,
            chats,
        })
    }
}

#[derive(FromRow)]
struct UserRow {
    wallet_address: String,
    created_at: DateTime<Utc>,
}

/// Validated chat ready for insertion
#[derive(Clone, Debug)]
pub struct ChatInsert {
    pub id: String,
    pub chat_data: ChatPayload,
    pub image_url: Option<String>,
    pub timestamp: i64,
    pub user_address: String,
}

/// Fields to change on an existing chat
#[derive(Clone, Debug, Default)]
pub struct ChatChanges {
    pub chat_data: Option<ChatPayload>,
    pub image_url: Option<String>,
    pub timestamp: Option<i64>,
    pub user_address: Option<String>,
}

impl ChatChanges {
    pub fn is_empty(&self) -> bool {
        self.chat_data.is_none()
            && self.image_url.is_none()
            && self.timestamp.is_none()
            && self.user_address.is_none()
    }
}

#[derive(Clone, Debug, Default)]
pub struct ChatFilter {
    pub user_address: Option<String>,
    pub market_id: Option<u64>,
    pub limit: u32,
    pub offset: u32,
}

#[derive(Clone, Debug)]
pub struct MarketInsert {
    pub market_id: u64,
    pub start_time: i64,
    pub deadline: i64,
    pub participation_fee: u128,
    pub name: String,
}

#[derive(Clone, Debug, Default)]
pub struct MarketChanges {
    pub start_time: Option<i64>,
    pub deadline: Option<i64>,
    pub participation_fee: Option<u128>,
    pub name: Option<String>,
}

fn db_id(id: u64) -> ApiResult<i64> {
    i64::try_from(id).map_err(|_| ApiError::BadRequest(format!("id {} is out of range", id)))
}

fn encode_payload(payload: &ChatPayload) -> ApiResult<String> {
    serde_json::to_string(payload).map_err(|e| ApiError::Corrupt(e.to_string()))
}

/// Maps a unique-key violation to 400 with `message`
fn duplicate(err: sqlx::Error, message: &str) -> ApiError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            ApiError::BadRequest(message.to_string())
        }
        _ => ApiError::Database(err),
    }
}

fn push_chat_filter<'a>(qb: &mut QueryBuilder<'a, Sqlite>, filter: &ChatFilter) -> ApiResult<()> {
    let mut sep = " WHERE ";
    if let Some(user) = &filter.user_address {
        qb.push(sep).push("user_address = ").push_bind(user.clone());
        sep = " AND ";
    }
    if let Some(market_id) = filter.market_id {
        qb.push(sep).push("market_id = ").push_bind(db_id(market_id)?);
    }
    Ok(())
}

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ---------------------------------------------------------------- chats

    pub async fn insert_chat(&self, chat: ChatInsert) -> ApiResult<ChatMessage> {
        let market_id = chat.chat_data.market_id().map(db_id).transpose()?;
        sqlx::query(
            "INSERT INTO chats
                 (id, chat_data, image_url, timestamp, user_address, market_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&chat.id)
        .bind(encode_payload(&chat.chat_data)?)
        .bind(&chat.image_url)
        .bind(chat.timestamp)
        .bind(&chat.user_address)
        .bind(market_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| duplicate(e, "Chat with this ID already exists"))?;

        self.get_chat(&chat.id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Chat not found".to_string()))
    }

    pub async fn get_chat(&self, id: &str) -> ApiResult<Option<ChatMessage>> {
        let row: Option<ChatRow> = sqlx::query_as(&format!("{} WHERE id = ?", CHAT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(ChatMessage::try_from).transpose()
    }

    /// Page ordered by timestamp (newest first) plus the filtered total
    pub async fn list_chats(&self, filter: &ChatFilter) -> ApiResult<(Vec<ChatMessage>, u64)> {
        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM chats");
        push_chat_filter(&mut count, filter)?;
        let total: i64 = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut page = QueryBuilder::<Sqlite>::new(CHAT_COLUMNS);
        push_chat_filter(&mut page, filter)?;
        page.push(" ORDER BY timestamp DESC, created_at DESC LIMIT ")
            .push_bind(i64::from(filter.limit))
            .push(" OFFSET ")
            .push_bind(i64::from(filter.offset));
        let rows: Vec<ChatRow> = page.build_query_as::<ChatRow>().fetch_all(&self.pool).await?;

        let chats = rows.into_iter().map(ChatMessage::try_from).collect::<ApiResult<Vec<_>>>()?;
        Ok((chats, total.max(0) as u64))
    }

    pub async fn update_chat(
        &self,
        id: &str,
        changes: ChatChanges,
    ) -> ApiResult<Option<ChatMessage>> {
        if changes.is_empty() {
            return self.get_chat(id).await;
        }

        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE chats SET ");
        {
            let mut set = qb.separated(", ");
            if let Some(payload) = &changes.chat_data {
                set.push("chat_data = ").push_bind_unseparated(encode_payload(payload)?);
                let market_id = payload.market_id().map(db_id).transpose()?;
                set.push("market_id = ").push_bind_unseparated(market_id);
            }
            if let Some(url) = changes.image_url {
                set.push("image_url = ").push_bind_unseparated(url);
            }
            if let Some(ts) = changes.timestamp {
                set.push("timestamp = ").push_bind_unseparated(ts);
            }
            if let Some(user) = changes.user_address {
                set.push("user_address = ").push_bind_unseparated(user);
            }
        }
        qb.push(" WHERE id = ").push_bind(id.to_string());

        let result = qb.build().execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_chat(id).await
    }

    pub async fn delete_chat(&self, id: &str) -> ApiResult<bool> {
        let result =
            sqlx::query("DELETE FROM chats WHERE id = ?").bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count_chats(&self) -> ApiResult<u64> {
        let total: i64 = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM chats")
            .fetch_one(&self.pool)
            .await?;
        Ok(total.max(0) as u64)
    }

    async fn chats_for_market(&self, market_id: i64) -> ApiResult<Vec<ChatMessage>> {
        let sql = format!("{} WHERE market_id = ? ORDER BY timestamp DESC", CHAT_COLUMNS);
        let rows: Vec<ChatRow> =
            sqlx::query_as(&sql).bind(market_id).fetch_all(&self.pool).await?;
        rows.into_iter().map(ChatMessage::try_from).collect()
    }

    async fn chats_for_user(&self, user_address: &str) -> ApiResult<Vec<ChatMessage>> {
        let sql = format!("{} WHERE user_address = ? ORDER BY timestamp DESC", CHAT_COLUMNS);
        let rows: Vec<ChatRow> =
            sqlx::query_as(&sql).bind(user_address).fetch_all(&self.pool).await?;
        rows.into_iter().map(ChatMessage::try_from).collect()
    }

    // -------------------------------------------------------------- markets

    pub async fn insert_market(&self, market: MarketInsert) -> ApiResult<MarketRecord> {
        let id = db_id(market.market_id)?;
        sqlx::query(
            "INSERT INTO markets
                 (market_id, start_time, deadline, participation_fee, name, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(market.start_time)
        .bind(market.deadline)
        .bind(market.participation_fee.to_string())
        .bind(&market.name)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| duplicate(e, "Market with this ID already exists"))?;

        self.get_market(market.market_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Market not found".to_string()))
    }

    /// Market record with its chats
    pub async fn get_market(&self, market_id: u64) -> ApiResult<Option<MarketRecord>> {
        let row: Option<MarketRow> =
            sqlx::query_as(&format!("{} WHERE market_id = ?", MARKET_COLUMNS))
                .bind(db_id(market_id)?)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some(row) => {
                let chats = self.chats_for_market(row.market_id).await?;
                row.into_record(chats).map(Some)
            }
            None => Ok(None),
        }
    }

    pub async fn list_markets(&self) -> ApiResult<Vec<MarketRecord>> {
        let rows: Vec<MarketRow> =
            sqlx::query_as(&format!("{} ORDER BY market_id", MARKET_COLUMNS))
                .fetch_all(&self.pool)
                .await?;

        let mut markets = Vec::with_capacity(rows.len());
        for row in rows {
            let chats = self.chats_for_market(row.market_id).await?;
            markets.push(row.into_record(chats)?);
        }
        Ok(markets)
    }

    pub async fn update_market(
        &self,
        market_id: u64,
        changes: MarketChanges,
    ) -> ApiResult<Option<MarketRecord>> {
        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE markets SET ");
        let mut any = false;
        {
            let mut set = qb.separated(", ");
            if let Some(ts) = changes.start_time {
                set.push("start_time = ").push_bind_unseparated(ts);
                any = true;
            }
            if let Some(ts) = changes.deadline {
                set.push("deadline = ").push_bind_unseparated(ts);
                any = true;
            }
            if let Some(fee) = changes.participation_fee {
                set.push("participation_fee = ").push_bind_unseparated(fee.to_string());
                any = true;
            }
            if let Some(name) = changes.name {
                set.push("name = ").push_bind_unseparated(name);
                any = true;
            }
        }
        if !any {
            return self.get_market(market_id).await;
        }
        qb.push(" WHERE market_id = ").push_bind(db_id(market_id)?);

        let result = qb.build().execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_market(market_id).await
    }

    pub async fn delete_market(&self, market_id: u64) -> ApiResult<bool> {
        let result = sqlx::query("DELETE FROM markets WHERE market_id = ?")
            .bind(db_id(market_id)?)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ---------------------------------------------------------------- users

    pub async fn insert_user(&self, wallet_address: &str) -> ApiResult<UserRecord> {
        sqlx::query("INSERT INTO users (wallet_address, created_at) VALUES (?, ?)")
            .bind(wallet_address)
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(|e| duplicate(e, "User with this wallet address already exists"))?;

        self.get_user(wallet_address)
            .await?
            .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
    }

    /// User with their chats
    pub async fn get_user(&self, wallet_address: &str) -> ApiResult<Option<UserRecord>> {
        let row: Option<UserRow> =
            sqlx::query_as("SELECT wallet_address, created_at FROM users WHERE wallet_address = ?")
                .bind(wallet_address)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some(row) => {
                let chats = self.chats_for_user(&row.wallet_address).await?;
                Ok(Some(UserRecord {
                    wallet_address: row.wallet_address,
                    created_at: row.created_at,
                    chats,
                }))
            }
            None => Ok(None),
        }
    }

    pub async fn list_users(&self) -> ApiResult<Vec<UserRecord>> {
        let rows: Vec<UserRow> =
            sqlx::query_as("SELECT wallet_address, created_at FROM users ORDER BY created_at")
                .fetch_all(&self.pool)
                .await?;

        let mut users = Vec::with_capacity(rows.len());
        for row in rows {
            let chats = self.chats_for_user(&row.wallet_address).await?;
            users.push(UserRecord {
                wallet_address: row.wallet_address,
                created_at: row.created_at,
                chats,
            });
        }
        Ok(users)
    }

    /// Rename a wallet address
    pub async fn update_user(
        &self,
        wallet_address: &str,
        new_address: &str,
    ) -> ApiResult<Option<UserRecord>> {
        let result = sqlx::query("UPDATE users SET wallet_address = ? WHERE wallet_address = ?")
            .bind(new_address)
            .bind(wallet_address)
            .execute(&self.pool)
            .await
            .map_err(|e| duplicate(e, "User with this wallet address already exists"))?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_user(new_address).await
    }

    pub async fn delete_user(&self, wallet_address: &str) -> ApiResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE wallet_address = ?")
            .bind(wallet_address)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::memory_store;

    fn chat(id: &str, market_id: u64, ts: i64, user: &str) -> ChatInsert {
        ChatInsert {
            id: id.to_string(),
            chat_data: ChatPayload::PredictionV1 {
                market_id,
                prediction_price: 65_000,
                timestamp: ts,
            },
            image_url: None,
            timestamp: ts,
            user_address: user.to_string(),
        }
    }

    #[tokio::test]
    async fn test_chat_crud() {
        let store = memory_store().await;
        let created = store.insert_chat(chat("a", 1, 100, "0xaa")).await.unwrap();
        assert_eq!(created.market_id, Some(1));

        let err = store.insert_chat(chat("a", 1, 100, "0xaa")).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));

        let changes =
            ChatChanges { image_url: Some("https://img".to_string()), ..Default::default() };
        let updated = store.update_chat("a", changes).await.unwrap().unwrap();
        assert_eq!(updated.image_url.as_deref(), Some("https://img"));
        assert_eq!(updated.timestamp, 100);

        let changes = ChatChanges { timestamp: Some(1), ..Default::default() };
        assert!(store.update_chat("missing", changes).await.unwrap().is_none());
        assert!(store.delete_chat("a").await.unwrap());
        assert!(!store.delete_chat("a").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_filters_and_order() {
        let store = memory_store().await;
        store.insert_chat(chat("a", 1, 100, "0xaa")).await.unwrap();
        store.insert_chat(chat("b", 2, 300, "0xaa")).await.unwrap();
        store.insert_chat(chat("c", 1, 200, "0xbb")).await.unwrap();

        let all = ChatFilter { limit: 50, ..Default::default() };
        let (chats, total) = store.list_chats(&all).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(chats.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(), ["b", "c", "a"]);

        let by_market = ChatFilter { market_id: Some(1), limit: 1, ..Default::default() };
        let (chats, total) = store.list_chats(&by_market).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(chats[0].id, "c");

        let by_user = ChatFilter {
            user_address: Some("0xaa".to_string()),
            limit: 50,
            offset: 1,
            ..Default::default()
        };
        let (chats, total) = store.list_chats(&by_user).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(chats[0].id, "a");
    }

    #[tokio::test]
    async fn test_market_with_chats_and_big_fee() {
        let store = memory_store().await;
        let fee = 340_282_366_920_938_463_463_374_607_431_768_211_455u128;
        store
            .insert_market(MarketInsert {
                market_id: 1,
                start_time: 1000,
                deadline: 2000,
                participation_fee: fee,
                name: "BTC".to_string(),
            })
            .await
            .unwrap();
        store.insert_chat(chat("a", 1, 100, "0xaa")).await.unwrap();
        store.insert_chat(chat("b", 2, 100, "0xaa")).await.unwrap();

        let market = store.get_market(1).await.unwrap().unwrap();
        assert_eq!(market.participation_fee, fee);
        assert_eq!(market.chats.len(), 1);

        let changes = MarketChanges { name: Some("BTC/USD".to_string()), ..Default::default() };
        let renamed = store.update_market(1, changes).await.unwrap().unwrap();
        assert_eq!(renamed.name, "BTC/USD");
        assert!(store.delete_market(1).await.unwrap());
        assert!(store.get_market(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_user_rename() {
        let store = memory_store().await;
        store.insert_user("0xaa").await.unwrap();
        store.insert_chat(chat("a", 1, 100, "0xbb")).await.unwrap();

        let user = store.update_user("0xaa", "0xbb").await.unwrap().unwrap();
        assert_eq!(user.wallet_address, "0xbb");
        assert_eq!(user.chats.len(), 1);
        assert!(store.get_user("0xaa").await.unwrap().is_none());
        assert_eq!(store.list_users().await.unwrap().len(), 1);
    }
}
