//! `/api/users`

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rekt_adapter::{NewUser, UserRecord};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::{json_body, present};
use crate::error::{ApiError, ApiResult};
use crate::store::Store;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserParams {
    wallet_address: Option<String>,
}

fn require_address(value: Option<String>) -> ApiResult<String> {
    present(value).ok_or_else(|| ApiError::BadRequest("Wallet address is required".to_string()))
}

fn not_found() -> ApiError {
    ApiError::NotFound("User not found".to_string())
}

pub async fn get(
    State(store): State<Store>,
    Query(params): Query<UserParams>,
) -> ApiResult<Response> {
    match present(params.wallet_address) {
        Some(address) => {
            let user = store.get_user(&address).await?.ok_or_else(not_found)?;
            Ok(Json(user).into_response())
        }
        None => Ok(Json(store.list_users().await?).into_response()),
    }
}

pub async fn create(
    State(store): State<Store>,
    body: Result<Json<NewUser>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<UserRecord>)> {
    let address = require_address(json_body(body)?.wallet_address)?;
    let user = store.insert_user(&address).await?;
    info!("User {} created", user.wallet_address);
    Ok((StatusCode::CREATED, Json(user)))
}

/// Rename a wallet address
pub async fn update(
    State(store): State<Store>,
    Query(params): Query<UserParams>,
    body: Result<Json<NewUser>, JsonRejection>,
) -> ApiResult<Json<UserRecord>> {
    let address = require_address(params.wallet_address)?;
    let body = json_body(body)?;

    let user = match present(body.wallet_address) {
        Some(new_address) => store.update_user(&address, &new_address).await?,
        None => store.get_user(&address).await?,
    };
    Ok(Json(user.ok_or_else(not_found)?))
}

pub async fn remove(
    State(store): State<Store>,
    Query(params): Query<UserParams>,
) -> ApiResult<Json<Value>> {
    let address = require_address(params.wallet_address)?;
    if !store.delete_user(&address).await? {
        return Err(not_found());
    }
    info!("User {} deleted", address);
    Ok(Json(json!({ "message": "User deleted successfully" })))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::testing::{app, send};

    #[tokio::test]
    async fn test_user_lifecycle() {
        let (app, _) = app().await;
        let (status, resp) = send(&app, "POST", "/api/users", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(resp["error"], "Wallet address is required");

        let user = json!({"walletAddress": "0xaa"});
        let (status, created) = send(&app, "POST", "/api/users", Some(user.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["walletAddress"], "0xaa");

        let (status, resp) = send(&app, "POST", "/api/users", Some(user)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(resp["error"], "User with this wallet address already exists");

        let rename = json!({"walletAddress": "0xbb"});
        let (status, renamed) =
            send(&app, "PUT", "/api/users?walletAddress=0xaa", Some(rename)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(renamed["walletAddress"], "0xbb");

        let (status, _) = send(&app, "GET", "/api/users?walletAddress=0xaa", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, all) = send(&app, "GET", "/api/users", None).await;
        assert_eq!(all.as_array().unwrap().len(), 1);

        let (status, resp) = send(&app, "DELETE", "/api/users?walletAddress=0xbb", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(resp["message"], "User deleted successfully");
    }

    #[tokio::test]
    async fn test_malformed_body_is_json_error() {
        let (app, _) = app().await;
        let (status, resp) = send(&app, "POST", "/api/users", Some(json!("not an object"))).await;
        assert!(status.is_client_error());
        assert!(resp["error"].is_string());
    }
}
