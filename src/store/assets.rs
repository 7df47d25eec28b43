//! Asset service messages: reward, deduct and balance query

use async_trait::async_trait;
use serde::Serialize;

use crate::settlement::AssetLedger;

use super::api::{ApiClient, ApiError, ApiMessage};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardAssetMessage {
    #[serde(rename = "userID")]
    pub user_id: String,
    pub reward_amount: i64,
}

impl ApiMessage for RewardAssetMessage {
    const NAME: &'static str = "RewardAssetMessage";
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeductAssetMessage {
    #[serde(rename = "userID")]
    pub user_id: String,
    pub deduct_amount: i64,
}

impl ApiMessage for DeductAssetMessage {
    const NAME: &'static str = "DeductAssetMessage";
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryAssetStatusMessage {
    #[serde(rename = "userID")]
    pub user_id: String,
}

impl ApiMessage for QueryAssetStatusMessage {
    const NAME: &'static str = "QueryAssetStatusMessage";
}

/// Asset service ledger over the request/response client
#[derive(Clone)]
pub struct AssetClient {
    api: ApiClient,
}

impl AssetClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl AssetLedger for AssetClient {
    async fn reward(&self, user_id: &str, amount: i64) -> Result<(), ApiError> {
        let message = RewardAssetMessage {
            user_id: user_id.to_string(),
            reward_amount: amount,
        };
        self.api.send(&message).await.map(|_| ())
    }

    async fn deduct(&self, user_id: &str, amount: i64) -> Result<(), ApiError> {
        let message = DeductAssetMessage {
            user_id: user_id.to_string(),
            deduct_amount: amount,
        };
        self.api.send(&message).await.map(|_| ())
    }

    async fn query_balance(&self, user_id: &str) -> Result<i64, ApiError> {
        let message = QueryAssetStatusMessage {
            user_id: user_id.to_string(),
        };
        let body = self.api.send(&message).await?;
        parse_balance(&body)
    }
}

/// Balance arrives as a JSON number or a JSON-quoted number
fn parse_balance(body: &str) -> Result<i64, ApiError> {
    let value: serde_json::Value =
        serde_json::from_str(body.trim()).map_err(|e| ApiError::Parse(e.to_string()))?;

    match &value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .ok_or_else(|| ApiError::Parse(format!("not a balance: {body}")))
}
