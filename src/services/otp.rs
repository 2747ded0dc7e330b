//! Time-based one-time codes (RFC 6238, HMAC-SHA256)

use super::{OtpError, OtpService};
use crate::config::{OTP_DIGITS, OTP_PERIOD_SECS, OTP_SECRET_BYTES, OTP_SKEW_STEPS};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};

type HmacSha256 = Hmac<Sha256>;

const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// TOTP implementation of [`OtpService`]
pub struct TotpService {
    issuer: String,
}

impl TotpService {
    /// Create a service whose provisioning URIs carry `issuer`
    #[must_use]
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
        }
    }

    /// Verify `code` at an explicit unix time
    ///
    /// # Errors
    ///
    /// Returns an error if the secret cannot be decoded.
    pub fn verify_at(&self, secret: &str, code: &str, unix_secs: u64) -> Result<bool, OtpError> {
        let key = base32_decode(secret).ok_or(OtpError::MalformedSecret)?;
        let counter = i64::try_from(unix_secs / OTP_PERIOD_SECS).unwrap_or(i64::MAX);

        for skew in -OTP_SKEW_STEPS..=OTP_SKEW_STEPS {
            let Ok(step) = u64::try_from(counter.saturating_add(skew)) else {
                continue;
            };
            if hotp(&key, step)? == code {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl OtpService for TotpService {
    fn generate_secret(&self) -> String {
        let mut bytes = [0u8; OTP_SECRET_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        base32_encode(&bytes)
    }

    fn provisioning_uri(&self, secret: &str, account: &str) -> String {
        let issuer = encode_uri_component(&self.issuer);
        format!(
            "otpauth://totp/{issuer}:{account}?secret={secret}&issuer={issuer}&algorithm=SHA256&digits={OTP_DIGITS}&period={OTP_PERIOD_SECS}",
            account = encode_uri_component(account),
        )
    }

    fn verify(&self, secret: &str, code: &str) -> Result<bool, OtpError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        self.verify_at(secret, code, now)
    }
}

/// Whether `code` has the shape of a one-time code (exactly six ASCII digits)
#[must_use]
pub fn is_code_format(code: &str) -> bool {
    code.len() == OTP_DIGITS && code.bytes().all(|b| b.is_ascii_digit())
}

fn hotp(key: &[u8], counter: u64) -> Result<String, OtpError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| OtpError::InvalidKey)?;
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    // Dynamic truncation
    let offset = usize::from(digest[digest.len() - 1] & 0x0f);
    let binary = u32::from_be_bytes([
        digest[offset] & 0x7f,
        digest[offset + 1],
        digest[offset + 2],
        digest[offset + 3],
    ]);
    let modulus = 10u32.pow(u32::try_from(OTP_DIGITS).unwrap_or(6));
    Ok(format!("{:0width$}", binary % modulus, width = OTP_DIGITS))
}

/// RFC 4648 base32 without padding
#[must_use]
pub fn base32_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len().div_ceil(5) * 8);
    let mut buffer: u32 = 0;
    let mut bits = 0;
    for &byte in bytes {
        buffer = (buffer << 8) | u32::from(byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(char::from(BASE32_ALPHABET[((buffer >> bits) & 0x1f) as usize]));
        }
    }
    if bits > 0 {
        out.push(char::from(BASE32_ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize]));
    }
    out
}

fn base32_decode(value: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(value.len() * 5 / 8);
    let mut buffer: u32 = 0;
    let mut bits = 0;
    for c in value.trim_end_matches('=').bytes() {
        let c = c.to_ascii_uppercase();
        let index = BASE32_ALPHABET.iter().position(|&a| a == c)?;
        buffer = (buffer << 5) | u32::try_from(index).ok()?;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push(((buffer >> bits) & 0xff) as u8);
        }
    }
    if out.is_empty() {
        return None;
    }
    Some(out)
}

fn encode_uri_component(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const RFC_KEY: &[u8] = b"12345678901234567890123456789012";

    #[test]
    fn test_rfc6238_sha256_vectors() -> Result<(), OtpError> {
        let service = TotpService::new("Test");
        let secret = base32_encode(RFC_KEY);

        assert!(service.verify_at(&secret, "119246", 59)?);
        assert!(service.verify_at(&secret, "084774", 1_111_111_109)?);
        assert!(!service.verify_at(&secret, "000000", 1_111_111_109)?);
        Ok(())
    }

    #[test]
    fn test_skew_tolerance() -> Result<(), OtpError> {
        let service = TotpService::new("Test");
        let secret = base32_encode(RFC_KEY);
        let code = hotp(RFC_KEY, 1000)?;
        let period = OTP_PERIOD_SECS;

        assert!(service.verify_at(&secret, &code, 1000 * period)?);
        assert!(service.verify_at(&secret, &code, 1002 * period)?);
        assert!(service.verify_at(&secret, &code, 998 * period)?);
        assert!(!service.verify_at(&secret, &code, 1003 * period)?);
        Ok(())
    }

    #[test]
    fn test_generated_secret_round_trips() {
        let service = TotpService::new("Test");
        let secret = service.generate_secret();

        assert_eq!(secret.len(), 32);
        assert_eq!(base32_decode(&secret).map(|b| b.len()), Some(OTP_SECRET_BYTES));
    }

    #[test]
    fn test_malformed_secret() {
        let service = TotpService::new("Test");
        assert!(matches!(
            service.verify_at("not base32!", "123456", 0),
            Err(OtpError::MalformedSecret)
        ));
    }

    #[test]
    fn test_provisioning_uri_encodes_issuer() {
        let service = TotpService::new("TRON Wallet");
        let uri = service.provisioning_uri("ABC", "42");
        assert_eq!(
            uri,
            "otpauth://totp/TRON%20Wallet:42?secret=ABC&issuer=TRON%20Wallet&algorithm=SHA256&digits=6&period=30"
        );
    }

    #[test]
    fn test_code_format() {
        assert!(is_code_format("012345"));
        assert!(!is_code_format("12345"));
        assert!(!is_code_format("1234567"));
        assert!(!is_code_format("12a456"));
        assert!(!is_code_format("١٢٣٤٥٦"));
    }
}
