//! Subgraph client - historical contract events over GraphQL
//!
//! Every feed is ordered by `blockTimestamp desc` and paged with
//! `first`/`skip`. Filters are passed as a typed `where` variable.

mod client;
pub mod queries;

pub use client::SubgraphClient;

use serde_json::{Map, Value};

use crate::types::Address;

/// Default page size for feeds
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Paging and filtering for one feed request
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventFilter {
    pub first: Option<u32>,
    pub skip: Option<u32>,
    pub market_id: Option<u64>,
    /// Exclusive lower bound on `blockTimestamp`
    pub since: Option<i64>,
    /// Exclusive upper bound on `blockTimestamp`
    pub until: Option<i64>,
    pub user: Option<Address>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn first(mut self, first: u32) -> Self {
        self.first = Some(first);
        self
    }

    pub fn skip(mut self, skip: u32) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn market(mut self, market_id: u64) -> Self {
        self.market_id = Some(market_id);
        self
    }

    pub fn since(mut self, ts: i64) -> Self {
        self.since = Some(ts);
        self
    }

    pub fn until(mut self, ts: i64) -> Self {
        self.until = Some(ts);
        self
    }

    pub fn user(mut self, user: Address) -> Self {
        self.user = Some(user);
        self
    }

    /// GraphQL `where` object; subgraph BigInt/Bytes filters are strings
    pub fn where_clause(&self) -> Map<String, Value> {
        let mut clause = Map::new();
        if let Some(id) = self.market_id {
            clause.insert("marketId".into(), Value::String(id.to_string()));
        }
        if let Some(ts) = self.since {
            clause.insert("blockTimestamp_gt".into(), Value::String(ts.to_string()));
        }
        if let Some(ts) = self.until {
            clause.insert("blockTimestamp_lt".into(), Value::String(ts.to_string()));
        }
        if let Some(user) = self.user {
            clause.insert("user".into(), Value::String(user.to_string()));
        }
        clause
    }

    /// Full variables object for a feed query
    pub fn variables(&self, mut clause: Map<String, Value>) -> Value {
        for (k, v) in self.where_clause() {
            clause.insert(k, v);
        }
        serde_json::json!({
            "first": self.first.unwrap_or(DEFAULT_PAGE_SIZE),
            "skip": self.skip.unwrap_or(0),
            "where": Value::Object(clause),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_filter_defaults() {
        let vars = EventFilter::new().variables(Map::new());
        assert_eq!(vars, json!({"first": 100, "skip": 0, "where": {}}));
    }

    #[test]
    fn test_where_clause_fields() {
        let user: Address = "0x00000000000000000000000000000000000000aa".parse().unwrap();
        let filter =
            EventFilter::new().first(5).skip(10).market(3).since(100).until(200).user(user);
        let vars = filter.variables(Map::new());

        assert_eq!(vars["first"], 5);
        assert_eq!(vars["skip"], 10);
        assert_eq!(vars["where"]["marketId"], "3");
        assert_eq!(vars["where"]["blockTimestamp_gt"], "100");
        assert_eq!(vars["where"]["blockTimestamp_lt"], "200");
        assert_eq!(vars["where"]["user"], "0x00000000000000000000000000000000000000aa");
    }

    #[test]
    fn test_base_clause_preserved() {
        let mut base = Map::new();
        base.insert("winner_not".into(), json!(Address::ZERO.to_string()));
        let vars = EventFilter::new().market(1).variables(base);
        assert_eq!(vars["where"]["winner_not"], "0x0000000000000000000000000000000000000000");
        assert_eq!(vars["where"]["marketId"], "1");
    }
}
