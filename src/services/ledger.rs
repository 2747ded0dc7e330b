//! HTTP client for the ledger gateway
//!
//! The gateway holds the chain node connection; this client only speaks its
//! JSON API. Address syntax is checked locally (base58check, mainnet prefix).

use super::{LedgerError, LedgerService, TransferOutcome};
use crate::utils::truncate_str;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{debug, warn};

const BASE58_ALPHABET: &[u8; 58] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
const TRON_ADDRESS_PREFIX: u8 = 0x41;
const TRON_ADDRESS_LEN: usize = 34;
const REQUEST_TIMEOUT_SECS: u64 = 20;

#[derive(Deserialize)]
struct BalanceResponse {
    balance: u64,
}

#[derive(Serialize)]
struct TransferRequest<'a> {
    private_key: &'a str,
    to: &'a str,
    amount: u64,
}

#[derive(Deserialize)]
struct TransferResponse {
    result: bool,
    txid: Option<String>,
    message: Option<String>,
}

/// Ledger gateway client
pub struct HttpLedgerClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpLedgerClient {
    /// Create a client for the gateway at `base_url`
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self, LedgerError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let req = self
            .client
            .request(method, format!("{}{path}", self.base_url));
        match &self.api_key {
            Some(key) => req.header("TRON-PRO-API-KEY", key),
            None => req,
        }
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, LedgerError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(LedgerError::Status {
            status: status.as_u16(),
            body: truncate_str(body, 200),
        })
    }
}

#[async_trait]
impl LedgerService for HttpLedgerClient {
    async fn get_balance(&self, address: &str) -> Result<u64, LedgerError> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/accounts/{address}/balance"),
            )
            .send()
            .await?;
        let body: BalanceResponse = Self::check_status(response).await?.json().await?;
        debug!(address, balance = body.balance, "Fetched balance");
        Ok(body.balance)
    }

    async fn send_transfer(
        &self,
        secret: &str,
        to_address: &str,
        amount_sun: u64,
    ) -> Result<TransferOutcome, LedgerError> {
        let response = self
            .request(reqwest::Method::POST, "/transfers")
            .json(&TransferRequest {
                private_key: secret,
                to: to_address,
                amount: amount_sun,
            })
            .send()
            .await?;
        let body: TransferResponse = Self::check_status(response).await?.json().await?;

        match (body.result, body.txid) {
            (true, Some(transfer_id)) => Ok(TransferOutcome::Sent { transfer_id }),
            (true, None) => {
                warn!("Ledger accepted a transfer without returning a txid");
                Ok(TransferOutcome::Sent {
                    transfer_id: String::new(),
                })
            }
            (false, _) => Ok(TransferOutcome::Rejected {
                reason: body
                    .message
                    .unwrap_or_else(|| "Transaction failed".to_string()),
            }),
        }
    }

    fn validate_address(&self, value: &str) -> bool {
        is_valid_tron_address(value)
    }
}

/// Checks a base58check TRON address: 34 characters, `0x41` prefix byte and a
/// valid double-SHA256 checksum.
#[must_use]
pub fn is_valid_tron_address(value: &str) -> bool {
    if value.len() != TRON_ADDRESS_LEN || !value.starts_with('T') {
        return false;
    }
    let Some(bytes) = base58_decode(value) else {
        return false;
    };
    if bytes.len() != 25 || bytes[0] != TRON_ADDRESS_PREFIX {
        return false;
    }
    let (payload, checksum) = bytes.split_at(21);
    let digest = Sha256::digest(Sha256::digest(payload));
    digest[..4] == *checksum
}

fn base58_decode(value: &str) -> Option<Vec<u8>> {
    // Big-endian base-256 accumulator
    let mut bytes: Vec<u8> = Vec::with_capacity(value.len());
    for c in value.bytes() {
        let mut carry = u32::try_from(BASE58_ALPHABET.iter().position(|&a| a == c)?).ok()?;
        for byte in bytes.iter_mut().rev() {
            carry += u32::from(*byte) * 58;
            *byte = (carry & 0xff) as u8;
            carry >>= 8;
        }
        while carry > 0 {
            bytes.insert(0, (carry & 0xff) as u8);
            carry >>= 8;
        }
    }
    let leading_zeros = value.bytes().take_while(|&c| c == b'1').count();
    let mut decoded = vec![0u8; leading_zeros];
    decoded.extend(bytes);
    Some(decoded)
}
