//! `/api/markets` - off-chain mirror of created markets

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rekt_adapter::{MarketRecord, NewMarketRecord};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::{json_body, parse_param, present};
use crate::error::{ApiError, ApiResult};
use crate::store::{MarketChanges, MarketInsert, Store};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketParams {
    market_id: Option<String>,
}

fn require_market_id(params: &MarketParams) -> ApiResult<u64> {
    parse_param::<u64>("marketId", params.market_id.as_deref())?
        .ok_or_else(|| ApiError::BadRequest("Market ID is required".to_string()))
}

fn not_found() -> ApiError {
    ApiError::NotFound("Market not found".to_string())
}

pub async fn get(
    State(store): State<Store>,
    Query(params): Query<MarketParams>,
) -> ApiResult<Response> {
    match parse_param::<u64>("marketId", params.market_id.as_deref())? {
        Some(id) => {
            let market = store.get_market(id).await?.ok_or_else(not_found)?;
            Ok(Json(market).into_response())
        }
        None => Ok(Json(store.list_markets().await?).into_response()),
    }
}

pub async fn create(
    State(store): State<Store>,
    body: Result<Json<NewMarketRecord>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<MarketRecord>)> {
    let body = json_body(body)?;
    let (Some(market_id), Some(start_time), Some(deadline), Some(participation_fee), Some(name)) =
        (body.market_id, body.start_time, body.deadline, body.participation_fee, present(body.name))
    else {
        return Err(ApiError::BadRequest("Missing required fields".to_string()));
    };

    let insert = MarketInsert { market_id, start_time, deadline, participation_fee, name };
    let market = store.insert_market(insert).await?;
    info!("Market record {} created", market.market_id);
    Ok((StatusCode::CREATED, Json(market)))
}

pub async fn update(
    State(store): State<Store>,
    Query(params): Query<MarketParams>,
    body: Result<Json<NewMarketRecord>, JsonRejection>,
) -> ApiResult<Json<MarketRecord>> {
    let market_id = require_market_id(&params)?;
    let body = json_body(body)?;

    let changes = MarketChanges {
        start_time: body.start_time,
        deadline: body.deadline,
        participation_fee: body.participation_fee,
        name: present(body.name),
    };
    let market = store.update_market(market_id, changes).await?.ok_or_else(not_found)?;
    Ok(Json(market))
}

pub async fn remove(
    State(store): State<Store>,
    Query(params): Query<MarketParams>,
) -> ApiResult<Json<Value>> {
    let market_id = require_market_id(&params)?;
    if !store.delete_market(market_id).await? {
        return Err(not_found());
    }
    info!("Market record {} deleted", market_id);
    Ok(Json(json!({ "message": "Market deleted successfully" })))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::testing::{app, send};

    fn market(id: &str) -> serde_json::Value {
        json!({
            "marketId": id,
            "startTime": "1717000000",
            "deadline": "1717086400",
            "participationFee": "10000000000000000",
            "name": "BTC above 70k"
        })
    }

    #[tokio::test]
    async fn test_create_and_fetch_with_chats() {
        let (app, _) = app().await;
        let (status, created) = send(&app, "POST", "/api/markets", Some(market("3"))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["participationFee"], "10000000000000000");
        assert_eq!(created["marketId"], "3");

        let chat = json!({
            "chatData": {
                "schema": "prediction/v1",
                "marketId": 3,
                "predictionPrice": "70100",
                "timestamp": "1717000100"
            },
            "timestamp": "1717000100",
            "userAddress": "0xaa"
        });
        send(&app, "POST", "/api/chats", Some(chat)).await;

        let (status, fetched) = send(&app, "GET", "/api/markets?marketId=3", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["chats"].as_array().unwrap().len(), 1);

        let (_, all) = send(&app, "GET", "/api/markets", None).await;
        assert_eq!(all.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_validation_and_duplicates() {
        let (app, _) = app().await;
        let mut partial = market("4");
        partial.as_object_mut().unwrap().remove("name");
        let (status, resp) = send(&app, "POST", "/api/markets", Some(partial)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(resp["error"], "Missing required fields");

        send(&app, "POST", "/api/markets", Some(market("4"))).await;
        let (status, resp) = send(&app, "POST", "/api/markets", Some(market("4"))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(resp["error"], "Market with this ID already exists");

        let (status, _) = send(&app, "GET", "/api/markets?marketId=x", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let (app, _) = app().await;
        send(&app, "POST", "/api/markets", Some(market("5"))).await;

        let changes = json!({"deadline": "1717990000"});
        let (status, updated) = send(&app, "PUT", "/api/markets?marketId=5", Some(changes)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["deadline"], "1717990000");
        assert_eq!(updated["name"], "BTC above 70k");

        let (status, _) =
            send(&app, "PUT", "/api/markets?marketId=99", Some(json!({"name": "x"}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, "DELETE", "/api/markets?marketId=5", None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, "GET", "/api/markets?marketId=5", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
