//! Testing helpers and mock utilities.
//!
//! Provides fixture wallets and constructors for mocked collaborators wired
//! to an in-memory store.

use crate::flow::Services;
use crate::services::{MockLedgerService, MockOtpService, WalletRecord};
use crate::storage::MemoryStorage;
use chrono::Utc;
use std::sync::Arc;

/// Address of the fixture source wallet
pub const SOURCE_ADDRESS: &str = "TFyBPFdoS9tzSBcATFtiLKJrn7GeNrA5mt";
/// A valid address distinct from [`SOURCE_ADDRESS`]
pub const DEST_ADDRESS: &str = "TCeVhfAhndGaAUrGjnJeNdkeDF6Qeu69D7";

/// Wallet `id` owned by `user_id` at [`SOURCE_ADDRESS`]
#[must_use]
pub fn wallet_record(id: i64, user_id: i64) -> WalletRecord {
    WalletRecord {
        id,
        user_id,
        address: SOURCE_ADDRESS.to_string(),
        private_key: "11".repeat(32),
        label: Some("Main".to_string()),
        created_at: Utc::now(),
    }
}

/// Create a mock ledger that reports `balance_sun` for every address and
/// accepts any address starting with `T`.
#[must_use]
pub fn mock_ledger_with_balance(balance_sun: u64) -> MockLedgerService {
    let mut mock = MockLedgerService::new();
    mock.expect_get_balance().returning(move |_| Ok(balance_sun));
    mock.expect_validate_address()
        .returning(|value| value.len() == 34 && value.starts_with('T'));
    mock
}

/// Services backed by `storage` with the given ledger and an OTP mock that
/// expects no calls
#[must_use]
pub fn services_with(storage: &Arc<MemoryStorage>, ledger: MockLedgerService) -> Services {
    services_with_otp(storage, ledger, MockOtpService::new())
}

/// Services backed by `storage` with the given ledger and OTP mocks
#[must_use]
pub fn services_with_otp(
    storage: &Arc<MemoryStorage>,
    ledger: MockLedgerService,
    otp: MockOtpService,
) -> Services {
    Services::with_storage(Arc::clone(storage), Arc::new(ledger), Arc::new(otp))
}
