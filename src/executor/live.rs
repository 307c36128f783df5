//! Live Order Executor: resolves the outcome token for a side,
//! reads the top of book, places a fill-or-kill order against the
//! prediction market's CLOB. Credentials are held in an explicit
//! `AuthSession` constructed once and threaded down — no process-wide
//! lazy singleton (Design Notes §9).

use super::{Fill, OrderExecutor};
use crate::domain::{MarketSnapshot, Side};
use crate::error::{BotError, Result};
use crate::http::HttpFetcher;
use crate::providers::PredictionMarketProvider;
use crate::signing::{
    build_clob_auth_signature, build_signed_order, ApiCredentials, HmacAuth, NonceManager, OrderData, Wallet,
};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

/// Address, derived L2 api key/secret/passphrase, and the underlying
/// signer, held by the executor for its lifetime.
pub struct AuthSession {
    wallet: Wallet,
    address_hex: String,
    hmac: HmacAuth,
}

#[derive(Debug, Deserialize)]
struct ApiKeyResponse {
    #[serde(rename = "apiKey")]
    api_key: String,
    secret: String,
    passphrase: String,
}

impl AuthSession {
    /// Derive an L2 API key via an EIP-712 typed-data signature over a
    /// fixed attestation message, then hold the resulting credentials for
    /// per-request HMAC signing.
    pub async fn derive(wallet: Wallet, fetcher: &HttpFetcher, clob_base_url: &str) -> Result<Self> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;
        let nonce = 0u64;

        let (_, signature) = build_clob_auth_signature(&wallet, timestamp, nonce).await?;
        let address_hex = format!("{:?}", wallet.address());

        let mut headers = HeaderMap::new();
        headers.insert(
            "POLY_ADDRESS",
            HeaderValue::from_str(&address_hex)
                .map_err(|e| BotError::Internal(format!("invalid address header: {e}")))?,
        );
        headers.insert(
            "POLY_SIGNATURE",
            HeaderValue::from_str(&signature)
                .map_err(|e| BotError::Internal(format!("invalid signature header: {e}")))?,
        );
        headers.insert(
            "POLY_TIMESTAMP",
            HeaderValue::from_str(&timestamp.to_string())
                .map_err(|e| BotError::Internal(format!("invalid timestamp header: {e}")))?,
        );
        headers.insert(
            "POLY_NONCE",
            HeaderValue::from_str(&nonce.to_string())
                .map_err(|e| BotError::Internal(format!("invalid nonce header: {e}")))?,
        );

        let url = format!("{clob_base_url}/auth/derive-api-key");
        let response: ApiKeyResponse = fetcher.get_json_with_headers(&url, headers).await?;

        let credentials = ApiCredentials::new(response.api_key, response.secret, response.passphrase);
        let hmac = HmacAuth::new(credentials, address_hex.clone());

        Ok(Self {
            wallet,
            address_hex,
            hmac,
        })
    }
}

#[derive(Debug, Deserialize)]
struct OrderPlacementResponse {
    #[serde(default, rename = "orderID")]
    order_id: Option<String>,
    #[serde(default)]
    success: bool,
}

pub struct LiveExecutor {
    auth: AuthSession,
    markets: Arc<dyn PredictionMarketProvider>,
    fetcher: HttpFetcher,
    clob_base_url: String,
    nonces: NonceManager,
}

impl LiveExecutor {
    pub fn new(
        auth: AuthSession,
        markets: Arc<dyn PredictionMarketProvider>,
        fetcher: HttpFetcher,
        clob_base_url: String,
    ) -> Self {
        Self {
            auth,
            markets,
            fetcher,
            clob_base_url,
            nonces: NonceManager::new(),
        }
    }
}

#[async_trait]
impl OrderExecutor for LiveExecutor {
    async fn submit(&self, snapshot: &MarketSnapshot, side: Side, notional: Decimal) -> Result<Fill> {
        let token_id = snapshot.token_id_for_side(side);

        if side == Side::Short {
            warn!(
                market_id = %snapshot.claim.market_id,
                "submitting short: using best ask on the NO token, which in practice is not exactly 1 - ask(YES)"
            );
        }

        let book = self.markets.order_book(token_id).await?;
        let best_ask = book
            .best_ask()
            .ok_or_else(|| BotError::InvalidMarketData(format!("no ask liquidity for token {token_id}")))?;

        let shares = (notional / best_ask)
            .round_dp(0)
            .to_u64()
            .ok_or_else(|| BotError::Validation(format!("notional {notional} / ask {best_ask} out of range")))?;
        if shares == 0 {
            return Err(BotError::Validation("notional too small to buy a whole share".to_string()));
        }

        let nonce = self.nonces.allocate();
        let maker = self.auth.wallet.address();
        let order = OrderData::new_buy(maker, maker, token_id, best_ask, shares, nonce)?;
        let signed = build_signed_order(&self.auth.wallet, order, false).await?;
        let body = signed.to_json()?;

        let path = "/order";
        let headers = self.auth.hmac.build_headers("POST", path, Some(body.as_str()))?;
        let url = format!("{}{}", self.clob_base_url, path);

        let response: OrderPlacementResponse = self.fetcher.post_json(&url, headers, &body).await?;
        if !response.success {
            return Err(BotError::ExecutorFailed(format!(
                "order rejected for market {}",
                snapshot.claim.market_id
            )));
        }
        let order_id = response
            .order_id
            .unwrap_or_else(|| format!("unknown-{}", uuid::Uuid::new_v4()));

        info!(order_id = %order_id, address = %self.auth.address_hex, "live order submitted");

        Ok(Fill {
            order_id,
            filled_price: best_ask,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shares_round_to_nearest_whole_share() {
        let notional = Decimal::new(500, 1); // 50.0
        let ask = Decimal::new(4, 1); // 0.4
        let shares = (notional / ask).round_dp(0).to_u64().unwrap();
        assert_eq!(shares, 125);
    }
}
