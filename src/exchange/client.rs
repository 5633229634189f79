//! Bitfinex v2 REST API client.

use crate::config::BitfinexConfig;
use crate::exchange::traits::{FundingAccount, MarketData, OfferSubmitter};
use crate::exchange::types::*;
use crate::exchange::ExchangeError;
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use sha2::Sha384;
use tracing::{debug, instrument, warn};

use crate::utils::decimal::fmt_fixed;

const BASE_URL: &str = "https://api.bitfinex.com";

/// Bitfinex API client for public funding market data and authenticated
/// funding-wallet operations.
pub struct BitfinexClient {
    http: Client,
    api_key: String,
    api_secret: String,
    base_url: String,
}

impl BitfinexClient {
    /// Create a new Bitfinex client from configuration.
    pub fn new(config: &BitfinexConfig) -> Result<Self, ExchangeError> {
        Self::with_base_url(config, BASE_URL)
    }

    /// Create a client against a custom base URL.
    pub fn with_base_url(config: &BitfinexConfig, base_url: &str) -> Result<Self, ExchangeError> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn nonce() -> String {
        Utc::now().timestamp_millis().to_string()
    }

    /// HMAC-SHA384 signature over `"/api/" + path + nonce + raw_body`.
    fn sign(&self, path: &str, raw_body: &str, nonce: &str) -> String {
        let payload = format!("/api/{}{}{}", path, nonce, raw_body);
        let mut mac = Hmac::<Sha384>::new_from_slice(self.api_secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// POST a signed private request; `path` carries no leading slash.
    async fn post_private(&self, path: &str, body: Value) -> Result<Value, ExchangeError> {
        if self.api_key.is_empty() || self.api_secret.is_empty() {
            return Err(ExchangeError::MissingCredentials);
        }

        let nonce = Self::nonce();
        let mut body = body;
        body["nonce"] = Value::String(nonce.clone());
        let raw_body = body.to_string();
        let signature = self.sign(path, &raw_body, &nonce);

        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .header("bfx-nonce", &nonce)
            .header("bfx-apikey", &self.api_key)
            .header("bfx-signature", &signature)
            .header("content-type", "application/json")
            .body(raw_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExchangeError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }

    /// GET a public endpoint; `path` carries a leading slash.
    async fn get_public(&self, path: &str) -> Result<Value, ExchangeError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.http.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExchangeError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }

    async fn submit_offer_with_symbol(
        &self,
        symbol: &str,
        amount: Decimal,
        rate: Decimal,
        period_days: u8,
        kind: OfferKind,
        auto_renew: bool,
    ) -> Result<SubmittedOffer, ExchangeError> {
        let flags = if auto_renew { FLAG_AUTO_RENEW } else { 0 };
        let body = json!({
            "type": kind.as_wire(),
            "symbol": symbol,
            "amount": fmt_fixed(amount),
            "rate": fmt_fixed(rate),
            "period": period_days,
            "flags": flags,
        });

        debug!(%symbol, %amount, %rate, period_days, kind = kind.as_wire(), "Submitting funding offer");

        let payload = self
            .post_private("v2/auth/w/funding/offer/submit", body)
            .await?;
        let ack = SubmittedOffer::from_notification(&payload);
        if ack.is_rejected() {
            return Err(ExchangeError::Rejected(
                ack.text.unwrap_or_else(|| "no reason given".to_string()),
            ));
        }
        Ok(ack)
    }
}

#[async_trait]
impl MarketData for BitfinexClient {
    #[instrument(skip(self))]
    async fn funding_book(&self, symbol: &str) -> Result<Vec<BookRow>, ExchangeError> {
        let payload = self
            .get_public(&format!("/v2/book/funding/{}/R0?len=25", symbol))
            .await?;
        let rows = payload
            .as_array()
            .ok_or_else(|| ExchangeError::Shape("funding book is not an array".to_string()))?;

        Ok(rows.iter().filter_map(BookRow::from_row).collect())
    }

    #[instrument(skip(self))]
    async fn reference_rate(&self, symbol: &str) -> Result<Option<Decimal>, ExchangeError> {
        let payload = self
            .get_public(&format!("/v2/funding/stats/{}/last", symbol))
            .await?;
        Ok(reference_rate_from_payload(&payload))
    }

    #[instrument(skip(self))]
    async fn funding_ticker(&self, symbol: &str) -> Result<FundingTicker, ExchangeError> {
        let payload = self.get_public(&format!("/v2/ticker/{}", symbol)).await?;
        FundingTicker::from_payload(&payload)
            .ok_or_else(|| ExchangeError::Shape("ticker row too short".to_string()))
    }

    #[instrument(skip(self))]
    async fn last_trade(&self, symbol: &str) -> Result<Option<FundingTrade>, ExchangeError> {
        let payload = self
            .get_public(&format!("/v2/trades/{}/hist?limit=1", symbol))
            .await?;
        let rows = payload
            .as_array()
            .ok_or_else(|| ExchangeError::Shape("trade history is not an array".to_string()))?;

        Ok(rows.first().and_then(FundingTrade::from_row))
    }
}

#[async_trait]
impl FundingAccount for BitfinexClient {
    #[instrument(skip(self))]
    async fn wallets(&self) -> Result<Vec<Wallet>, ExchangeError> {
        let payload = self.post_private("v2/auth/r/wallets", json!({})).await?;
        let rows = payload
            .as_array()
            .ok_or_else(|| ExchangeError::Shape("wallets response is not an array".to_string()))?;

        Ok(rows.iter().filter_map(Wallet::from_row).collect())
    }

    #[instrument(skip(self))]
    async fn cancel_all_offers(&self, asset_code: &str) -> Result<(), ExchangeError> {
        let body = json!({ "symbol": asset_code });
        let ack = self
            .post_private("v2/auth/w/funding/offer/cancel/all", body)
            .await?;
        debug!(%asset_code, ?ack, "Canceled open funding offers");
        Ok(())
    }
}

#[async_trait]
impl OfferSubmitter for BitfinexClient {
    async fn submit_offer(
        &self,
        ctx: &MarketContext,
        amount: Decimal,
        rate: Decimal,
        period_days: u8,
        kind: OfferKind,
        auto_renew: bool,
    ) -> Result<SubmittedOffer, ExchangeError> {
        match self
            .submit_offer_with_symbol(&ctx.preferred_symbol, amount, rate, period_days, kind, auto_renew)
            .await
        {
            Ok(ack) => Ok(ack),
            Err(e) => {
                warn!(
                    preferred = %ctx.preferred_symbol,
                    fallback = %ctx.fallback_symbol,
                    error = %e,
                    "Submit with preferred symbol failed, retrying with fallback"
                );
                self.submit_offer_with_symbol(
                    &ctx.fallback_symbol,
                    amount,
                    rate,
                    period_days,
                    kind,
                    auto_renew,
                )
                .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(base_url: &str) -> BitfinexClient {
        BitfinexClient::with_base_url(
            &BitfinexConfig {
                api_key: "key".to_string(),
                api_secret: "secret".to_string(),
            },
            base_url,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_funding_book_parses_rows() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/book/funding/fUSDT/R0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                [1, 0.0003, 1000.0, 2],
                [2, 0.0006, -500.0, 2],
                [3, "junk"]
            ])))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let rows = client.funding_book("fUSDT").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(best_bid_ask(&rows), (Some(dec!(0.0003)), Some(dec!(0.0006))));
    }

    #[tokio::test]
    async fn test_reference_rate_http_error_propagates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/funding/stats/fUSDT/last"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client.reference_rate("fUSDT").await.unwrap_err();
        assert!(matches!(err, ExchangeError::Api { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_submit_retries_once_with_fallback_symbol() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v2/auth/w/funding/offer/submit"))
            .and(body_string_contains("fUSDT"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/v2/auth/w/funding/offer/submit"))
            .and(body_string_contains("fUST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                1700000000000i64,
                "fon-req",
                null,
                null,
                [42, "fUST"],
                null,
                "SUCCESS",
                "Submitting funding offer"
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let ctx = MarketContext::for_asset("USDT");
        let ack = client
            .submit_offer(&ctx, dec!(500), dec!(0.0004), 2, OfferKind::FrrDelta, true)
            .await
            .unwrap();
        assert_eq!(ack.offer_id, Some(42));
    }

    #[tokio::test]
    async fn test_submit_sends_signed_headers_and_fixed_point_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/auth/w/funding/offer/submit"))
            .and(body_string_contains("\"amount\":\"500.000000\""))
            .and(body_string_contains("\"rate\":\"0.000400\""))
            .and(wiremock::matchers::header_exists("bfx-nonce"))
            .and(wiremock::matchers::header_exists("bfx-signature"))
            .and(wiremock::matchers::header("bfx-apikey", "key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                1700000000000i64,
                "fon-req",
                null,
                null,
                [7, "fUSDT"],
                null,
                "SUCCESS",
                "ok"
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let ctx = MarketContext::for_asset("USDT");
        let ack = client
            .submit_offer(&ctx, dec!(500), dec!(0.0004), 2, OfferKind::FrrDelta, false)
            .await
            .unwrap();
        assert_eq!(ack.offer_id, Some(7));
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_before_any_request() {
        let client = BitfinexClient::with_base_url(
            &BitfinexConfig {
                api_key: String::new(),
                api_secret: String::new(),
            },
            "http://127.0.0.1:1",
        )
        .unwrap();

        let err = client.wallets().await.unwrap_err();
        assert!(matches!(err, ExchangeError::MissingCredentials));
    }

    #[tokio::test]
    async fn test_api_level_rejection_maps_to_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/auth/w/funding/offer/submit"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                1700000000000i64,
                "fon-req",
                null,
                null,
                null,
                null,
                "ERROR",
                "amount: invalid"
            ])))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let ctx = MarketContext::for_asset("USDT");
        let err = client
            .submit_offer(&ctx, dec!(10), dec!(0.0004), 2, OfferKind::Limit, false)
            .await
            .unwrap_err();
        // both symbols were tried; the last rejection propagates
        assert!(matches!(err, ExchangeError::Rejected(_)));
    }
}
