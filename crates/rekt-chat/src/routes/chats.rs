//! `/api/chats`

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rekt_adapter::{ChatMessage, ChatPage, ChatPayload, NewChat, Pagination};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{json_body, parse_param, present};
use crate::error::{ApiError, ApiResult};
use crate::store::{ChatChanges, ChatFilter, ChatInsert, Store};
use crate::{DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatParams {
    id: Option<String>,
    user_address: Option<String>,
    market_id: Option<String>,
    limit: Option<String>,
    offset: Option<String>,
}

fn parse_payload(value: Value) -> ApiResult<ChatPayload> {
    ChatPayload::from_value(value)
        .map_err(|e| ApiError::BadRequest(format!("Invalid chatData: {}", e)))
}

fn require_id(id: Option<String>) -> ApiResult<String> {
    present(id).ok_or_else(|| ApiError::BadRequest("Chat ID is required".to_string()))
}

fn not_found() -> ApiError {
    ApiError::NotFound("Chat not found".to_string())
}

/// Single chat by `id`, otherwise a page newest first
pub async fn get(
    State(store): State<Store>,
    Query(params): Query<ChatParams>,
) -> ApiResult<Response> {
    if let Some(id) = present(params.id) {
        let chat = store.get_chat(&id).await?.ok_or_else(not_found)?;
        return Ok(Json(chat).into_response());
    }

    let limit = parse_param::<u32>("limit", params.limit.as_deref())?
        .unwrap_or(DEFAULT_PAGE_LIMIT)
        .min(MAX_PAGE_LIMIT);
    let offset = parse_param::<u32>("offset", params.offset.as_deref())?.unwrap_or(0);
    let market_id = parse_param::<u64>("marketId", params.market_id.as_deref())?;

    let filter =
        ChatFilter { user_address: present(params.user_address), market_id, limit, offset };
    let (chats, total) = store.list_chats(&filter).await?;
    debug!("Listed {} of {} chats ({:?})", chats.len(), total, filter);

    Ok(Json(ChatPage { chats, pagination: Pagination { total, limit, offset } }).into_response())
}

pub async fn create(
    State(store): State<Store>,
    body: Result<Json<NewChat>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ChatMessage>)> {
    let body = json_body(body)?;
    let (Some(chat_data), Some(timestamp), Some(user_address)) =
        (body.chat_data.filter(|v| !v.is_null()), body.timestamp, present(body.user_address))
    else {
        return Err(ApiError::BadRequest("Missing required fields".to_string()));
    };

    let insert = ChatInsert {
        id: present(body.id).unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        chat_data: parse_payload(chat_data)?,
        image_url: present(body.image_url),
        timestamp,
        user_address,
    };
    let chat = store.insert_chat(insert).await?;
    info!("Chat {} created by {}", chat.id, chat.user_address);
    Ok((StatusCode::CREATED, Json(chat)))
}

/// Partial update of the supplied fields
pub async fn update(
    State(store): State<Store>,
    Query(params): Query<ChatParams>,
    body: Result<Json<NewChat>, JsonRejection>,
) -> ApiResult<Json<ChatMessage>> {
    let id = require_id(params.id)?;
    let body = json_body(body)?;

    let changes = ChatChanges {
        chat_data: body.chat_data.filter(|v| !v.is_null()).map(parse_payload).transpose()?,
        image_url: present(body.image_url),
        timestamp: body.timestamp,
        user_address: present(body.user_address),
    };
    let chat = store.update_chat(&id, changes).await?.ok_or_else(not_found)?;
    Ok(Json(chat))
}

pub async fn remove(
    State(store): State<Store>,
    Query(params): Query<ChatParams>,
) -> ApiResult<Json<Value>> {
    let id = require_id(params.id)?;
    if !store.delete_chat(&id).await? {
        return Err(not_found());
    }
    info!("Chat {} deleted", id);
    Ok(Json(json!({ "message": "Chat deleted successfully" })))
}
