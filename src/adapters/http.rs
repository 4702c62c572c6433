//! HTTP-backed result source
//!
//! Polls the ranking/persistence service over plain JSON endpoints:
//! - `GET ranking_url` returns an array of opportunity records, best first
//! - `GET balance_url` returns the latest balance object, or nothing yet

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::debug;

use crate::adapters::errors::{SourceError, SourceResult};
use crate::adapters::traits::ResultSource;
use crate::config::SourceConfig;
use crate::core::types::{BalanceSnapshot, OpportunityRecord};

/// Connect timeout, kept well under the request timeout
const HTTP_CONNECT_TIMEOUT_MS: u64 = 1000;

pub struct HttpResultSource {
    client: reqwest::Client,
    ranking_url: String,
    balance_url: String,
    ranking_limit: usize,
}

impl HttpResultSource {
    pub fn new(
        ranking_url: impl Into<String>,
        balance_url: impl Into<String>,
        ranking_limit: usize,
        timeout: Duration,
    ) -> SourceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_millis(HTTP_CONNECT_TIMEOUT_MS)))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| SourceError::Unavailable(format!("HTTP client build failed: {}", e)))?;

        Ok(Self {
            client,
            ranking_url: ranking_url.into(),
            balance_url: balance_url.into(),
            ranking_limit,
        })
    }

    /// Build the source for one configured channel.
    pub fn from_config(config: &SourceConfig) -> SourceResult<Self> {
        Self::new(
            config.ranking_url.clone(),
            config.balance_url.clone(),
            config.ranking_limit,
            Duration::from_millis(config.timeout_ms),
        )
    }
}

#[async_trait]
impl ResultSource for HttpResultSource {
    async fn ranking(&self) -> SourceResult<Vec<OpportunityRecord>> {
        let response = self.client.get(&self.ranking_url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Unavailable(format!(
                "ranking endpoint returned {}",
                status
            )));
        }

        let records: Vec<OpportunityRecord> = response.json().await?;
        let fetched = records.len();
        let ranking: Vec<OpportunityRecord> = records
            .into_iter()
            .take(self.ranking_limit)
            .map(OpportunityRecord::normalize)
            .collect();

        debug!(
            url = %self.ranking_url,
            fetched,
            kept = ranking.len(),
            "Ranking fetched"
        );
        Ok(ranking)
    }

    async fn latest_balance(&self) -> SourceResult<Option<BalanceSnapshot>> {
        let response = self.client.get(&self.balance_url).send().await?;

        match response.status() {
            StatusCode::NO_CONTENT | StatusCode::NOT_FOUND => return Ok(None),
            status if !status.is_success() => {
                return Err(SourceError::Unavailable(format!(
                    "balance endpoint returned {}",
                    status
                )));
            }
            _ => {}
        }

        let body: Value = response.json().await?;
        match body {
            Value::Null => Ok(None),
            Value::Object(_) => {
                Ok(BalanceSnapshot::from_value(body).filter(|snapshot| !snapshot.is_empty()))
            }
            other => Err(SourceError::InvalidPayload(format!(
                "expected balance object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    fn source_name(&self) -> &'static str {
        "http"
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source_for(server: &mockito::ServerGuard, limit: usize) -> HttpResultSource {
        HttpResultSource::new(
            format!("{}/ranking", server.url()),
            format!("{}/balance", server.url()),
            limit,
            Duration::from_millis(500),
        )
        .unwrap()
    }

    const RANKING_BODY: &str = r#"[
        {"symbol":"BTC/USDT","profitPercentage":"1.5","buySide":{"exchange":"binance","price":100.0},"sellSide":{"exchange":"kucoin","price":101.5}},
        {"id":"eth-1","symbol":"ETH/USDT","profitPercentage":0.8,"buySide":{"exchange":"okx","price":10.0},"sellSide":{"exchangeName":"gate","price":10.08}},
        {"symbol":"SOL/USDT","profitPercentage":"n/a","buySide":{"exchange":"bybit","price":1.0},"sellSide":{"exchange":"mexc","price":1.01}}
    ]"#;

    #[tokio::test]
    async fn test_ranking_normalizes_records() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/ranking")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(RANKING_BODY)
            .create_async()
            .await;

        let source = source_for(&server, 20);
        let ranking = source.ranking().await.unwrap();

        assert_eq!(ranking.len(), 3);
        assert_eq!(ranking[0].id, "BTC/USDT");
        assert_eq!(ranking[0].profit_percentage, Some(1.5));
        assert_eq!(ranking[1].id, "eth-1");
        assert_eq!(ranking[1].sell_side.exchange, "gate");
        assert_eq!(ranking[2].profit_percentage, None);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_ranking_truncated_to_limit() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/ranking")
            .with_status(200)
            .with_body(RANKING_BODY)
            .create_async()
            .await;

        let source = source_for(&server, 2);
        let ranking = source.ranking().await.unwrap();

        assert_eq!(ranking.len(), 2);
        assert_eq!(ranking[1].symbol, "ETH/USDT");
    }

    #[tokio::test]
    async fn test_ranking_server_error_is_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/ranking")
            .with_status(500)
            .create_async()
            .await;

        let source = source_for(&server, 20);
        match source.ranking().await {
            Err(SourceError::Unavailable(msg)) => assert!(msg.contains("500")),
            other => panic!("Expected Unavailable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_ranking_non_array_is_invalid_payload() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/ranking")
            .with_status(200)
            .with_body(r#"{"not":"a list"}"#)
            .create_async()
            .await;

        let source = source_for(&server, 20);
        assert!(matches!(
            source.ranking().await,
            Err(SourceError::InvalidPayload(_))
        ));
    }

    #[tokio::test]
    async fn test_balance_snapshot_returned() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/balance")
            .with_status(200)
            .with_body(r#"{"USDT": 1520.5, "BTC": 0.02}"#)
            .create_async()
            .await;

        let source = source_for(&server, 20);
        let snapshot = source.latest_balance().await.unwrap().unwrap();
        assert_eq!(snapshot.fields()["USDT"], 1520.5);
    }

    #[tokio::test]
    async fn test_balance_no_data_shapes_are_none() {
        for (status, body) in [(204, ""), (404, ""), (200, "null"), (200, "{}")] {
            let mut server = mockito::Server::new_async().await;
            server
                .mock("GET", "/balance")
                .with_status(status)
                .with_body(body)
                .create_async()
                .await;

            let source = source_for(&server, 20);
            let latest = source.latest_balance().await.unwrap();
            assert!(latest.is_none(), "status {} body {:?}", status, body);
        }
    }

    #[tokio::test]
    async fn test_balance_failure_status_is_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/balance")
            .with_status(503)
            .create_async()
            .await;

        let source = source_for(&server, 20);
        assert!(matches!(
            source.latest_balance().await,
            Err(SourceError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_balance_array_is_invalid_payload() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/balance")
            .with_status(200)
            .with_body("[1,2,3]")
            .create_async()
            .await;

        let source = source_for(&server, 20);
        match source.latest_balance().await {
            Err(SourceError::InvalidPayload(msg)) => assert!(msg.contains("array")),
            other => panic!("Expected InvalidPayload, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_balance_scalar_or_garbage_is_invalid_payload() {
        let mut scalar = mockito::Server::new_async().await;
        scalar
            .mock("GET", "/balance")
            .with_status(200)
            .with_body("\"ok\"")
            .create_async()
            .await;
        match source_for(&scalar, 20).latest_balance().await {
            Err(SourceError::InvalidPayload(msg)) => assert!(msg.contains("string")),
            other => panic!("Expected InvalidPayload, got {:?}", other),
        }

        let mut truncated = mockito::Server::new_async().await;
        truncated
            .mock("GET", "/balance")
            .with_status(200)
            .with_body("{\"USDT\": ")
            .create_async()
            .await;
        assert!(matches!(
            source_for(&truncated, 20).latest_balance().await,
            Err(SourceError::InvalidPayload(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_unavailable() {
        let source = HttpResultSource::new(
            "http://127.0.0.1:1/ranking",
            "http://127.0.0.1:1/balance",
            20,
            Duration::from_millis(200),
        )
        .unwrap();

        assert!(matches!(
            source.ranking().await,
            Err(SourceError::Unavailable(_))
        ));
        assert!(matches!(
            source.latest_balance().await,
            Err(SourceError::Unavailable(_))
        ));
    }
}
