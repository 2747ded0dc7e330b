use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tron_wallet_bot::flow::{
    Command, DeleteState, FlowAction, FlowEngine, FlowEvent, FlowKind, FlowState, LabelState,
    Prompt, Services, WithdrawalState, WithdrawalStep,
};
use tron_wallet_bot::rate_limit::RateLimiter;
use tron_wallet_bot::services::{
    LedgerError, LedgerService, OtpError, OtpService, TransferOutcome, TwoFactorRecord,
    TwoFactorStore, WalletDirectory, WalletRecord,
};
use tron_wallet_bot::storage::{MemoryStorage, PendingStateStore, SessionStore};

const USER: i64 = 42;
const WALLET: i64 = 1;
const SOURCE: &str = "TFyBPFdoS9tzSBcATFtiLKJrn7GeNrA5mt";
const DEST: &str = "TCeVhfAhndGaAUrGjnJeNdkeDF6Qeu69D7";

/// Transfer as seen by the ledger, with the snapshots present at that moment
#[derive(Debug, Clone)]
struct SentTransfer {
    to_address: String,
    amount_sun: u64,
    pending_at_send: Vec<FlowKind>,
}

struct FakeLedger {
    balance_sun: u64,
    storage: Arc<MemoryStorage>,
    sent: Mutex<Vec<SentTransfer>>,
    balance_calls: AtomicUsize,
}

impl FakeLedger {
    fn new(balance_sun: u64, storage: &Arc<MemoryStorage>) -> Self {
        Self {
            balance_sun,
            storage: Arc::clone(storage),
            sent: Mutex::new(Vec::new()),
            balance_calls: AtomicUsize::new(0),
        }
    }

    fn balance_calls(&self) -> usize {
        self.balance_calls.load(Ordering::SeqCst)
    }

    fn sent(&self) -> Vec<SentTransfer> {
        self.sent.lock().expect("ledger log poisoned").clone()
    }
}

#[async_trait]
impl LedgerService for FakeLedger {
    async fn get_balance(&self, _address: &str) -> Result<u64, LedgerError> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.balance_sun)
    }

    async fn send_transfer(
        &self,
        _secret: &str,
        to_address: &str,
        amount_sun: u64,
    ) -> Result<TransferOutcome, LedgerError> {
        let pending_at_send = self.storage.pending_kinds(USER).await;
        self.sent.lock().expect("ledger log poisoned").push(SentTransfer {
            to_address: to_address.to_string(),
            amount_sun,
            pending_at_send,
        });
        Ok(TransferOutcome::Sent {
            transfer_id: "tx-1".to_string(),
        })
    }

    fn validate_address(&self, value: &str) -> bool {
        value.len() == 34 && value.starts_with('T')
    }
}

/// Hands out a new secret per call and accepts `123456` for any of them
#[derive(Default)]
struct CountingOtp {
    generated: AtomicUsize,
}

impl CountingOtp {
    fn generated(&self) -> usize {
        self.generated.load(Ordering::SeqCst)
    }
}

impl OtpService for CountingOtp {
    fn generate_secret(&self) -> String {
        let n = self.generated.fetch_add(1, Ordering::SeqCst);
        format!("SECRET{n}")
    }

    fn provisioning_uri(&self, secret: &str, account: &str) -> String {
        format!("otpauth://totp/Test:{account}?secret={secret}")
    }

    fn verify(&self, _secret: &str, code: &str) -> Result<bool, OtpError> {
        Ok(code == "123456")
    }
}

fn main_wallet() -> WalletRecord {
    WalletRecord {
        id: WALLET,
        user_id: USER,
        address: SOURCE.to_string(),
        private_key: "11".repeat(32),
        label: Some("Main".to_string()),
        created_at: Utc::now(),
    }
}

/// Ledger whose balance lookup waits until the test lets it go
struct GatedLedger {
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl LedgerService for GatedLedger {
    async fn get_balance(&self, _address: &str) -> Result<u64, LedgerError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(10_000_000)
    }

    async fn send_transfer(
        &self,
        _secret: &str,
        _to_address: &str,
        _amount_sun: u64,
    ) -> Result<TransferOutcome, LedgerError> {
        Ok(TransferOutcome::Rejected {
            reason: "not used".to_string(),
        })
    }

    fn validate_address(&self, value: &str) -> bool {
        value.len() == 34 && value.starts_with('T')
    }
}

struct Harness {
    storage: Arc<MemoryStorage>,
    ledger: Arc<FakeLedger>,
    otp: Arc<CountingOtp>,
    engine: FlowEngine,
}

impl Harness {
    async fn new(balance_sun: u64) -> Self {
        let storage = Arc::new(MemoryStorage::new());
        storage.insert_wallet(main_wallet()).await;
        let ledger = Arc::new(FakeLedger::new(balance_sun, &storage));
        let otp = Arc::new(CountingOtp::default());
        let engine = Self::engine(
            &storage,
            Arc::clone(&ledger) as Arc<dyn LedgerService>,
            &otp,
            RateLimiter::new(1000, 10_000, 15_000),
        );
        Self {
            storage,
            ledger,
            otp,
            engine,
        }
    }

    fn engine(
        storage: &Arc<MemoryStorage>,
        ledger: Arc<dyn LedgerService>,
        otp: &Arc<CountingOtp>,
        limiter: RateLimiter,
    ) -> FlowEngine {
        let services = Services::with_storage(
            Arc::clone(storage),
            ledger,
            Arc::clone(otp) as Arc<dyn OtpService>,
        );
        FlowEngine::new(services, limiter)
    }

    /// Drop the in-memory session and build a new engine on the same storage
    async fn restart(&mut self) {
        self.storage
            .delete_session(USER)
            .await
            .expect("session delete failed");
        self.engine = Self::engine(
            &self.storage,
            Arc::clone(&self.ledger) as Arc<dyn LedgerService>,
            &self.otp,
            RateLimiter::new(1000, 10_000, 15_000),
        );
    }

    async fn text(&self, text: &str) -> Vec<Prompt> {
        self.engine
            .handle(USER, FlowEvent::Text(text.to_string()))
            .await
    }

    async fn press(&self, action: FlowAction) -> Vec<Prompt> {
        self.engine.handle(USER, FlowEvent::Action(action)).await
    }

    async fn start(&self, kind: FlowKind) -> Vec<Prompt> {
        self.press(FlowAction::Start {
            kind,
            wallet_id: Some(WALLET),
        })
        .await
    }

    async fn withdrawal_at_amount_step(&self) -> Vec<Prompt> {
        self.start(FlowKind::Withdrawal).await;
        self.text(DEST).await
    }
}

#[tokio::test]
async fn test_resume_after_restart_rerenders_last_prompt() {
    let mut h = Harness::new(10_000_000).await;
    let before_restart = h.withdrawal_at_amount_step().await;
    assert!(matches!(before_restart.as_slice(), [Prompt::WithdrawAmount { .. }]));

    h.restart().await;

    // The first event after a restart is consumed by the re-render
    let replies = h.text("whatever").await;
    assert_eq!(replies, before_restart);
    assert!(h.ledger.sent().is_empty());

    let replies = h.text("1.5").await;
    assert!(matches!(
        replies.as_slice(),
        [Prompt::WithdrawSuccess { amount_sun: 1_500_000, .. }]
    ));
}

#[tokio::test]
async fn test_restoration_prefers_withdrawal_over_label() {
    let h = Harness::new(10_000_000).await;
    let wallet = WalletRecord {
        id: WALLET,
        user_id: USER,
        address: SOURCE.to_string(),
        private_key: String::new(),
        label: Some("Main".to_string()),
        created_at: Utc::now(),
    }
    .snapshot();
    let label = FlowState::Label(LabelState {
        wallet: wallet.clone(),
    });
    let withdrawal = FlowState::Withdrawal(WithdrawalState {
        step: WithdrawalStep::Address,
        wallet,
        balance_sun: 10_000_000,
        to_address: None,
    });
    h.storage.set_pending(USER, &label).await.expect("store");
    h.storage.set_pending(USER, &withdrawal).await.expect("store");

    let replies = h.text("hello").await;

    assert!(matches!(replies.as_slice(), [Prompt::WithdrawAddress { .. }]));
    assert_eq!(
        h.storage
            .get_pending(USER, FlowKind::Label)
            .await
            .expect("load"),
        Some(label)
    );
}

#[tokio::test]
async fn test_rate_limit_through_engine() {
    let h = Harness::new(10_000_000).await;
    let engine = Harness::engine(
        &h.storage,
        Arc::clone(&h.ledger) as Arc<dyn LedgerService>,
        &h.otp,
        RateLimiter::new(8, 10_000, 15_000),
    );

    for _ in 0..8 {
        let replies = engine.handle(USER, FlowEvent::Command(Command::Start)).await;
        assert!(matches!(replies.as_slice(), [Prompt::MainMenu { .. }]));
    }
    assert_eq!(
        engine.handle(USER, FlowEvent::Command(Command::Start)).await,
        vec![Prompt::TooManyRequests]
    );
    assert_eq!(
        engine.handle(USER, FlowEvent::Command(Command::Start)).await,
        vec![Prompt::SlowDown]
    );

    // Other users are unaffected
    let replies = engine.handle(USER + 1, FlowEvent::Command(Command::Start)).await;
    assert!(matches!(replies.as_slice(), [Prompt::MainMenu { .. }]));
}

#[tokio::test]
async fn test_withdrawal_amount_boundaries() {
    let h = Harness::new(10_000_000).await;
    h.withdrawal_at_amount_step().await;

    assert_eq!(
        h.text("8.000001").await,
        vec![Prompt::InsufficientBalance {
            wallet_id: WALLET,
            max_sun: 8_000_000
        }]
    );
    assert_eq!(
        h.text("0").await,
        vec![Prompt::InvalidAmount { wallet_id: WALLET }]
    );
    assert_eq!(
        h.text("-1").await,
        vec![Prompt::InvalidAmount { wallet_id: WALLET }]
    );
    assert!(h.ledger.sent().is_empty());

    let replies = h.text("8.000000").await;
    assert_eq!(
        replies,
        vec![Prompt::WithdrawSuccess {
            amount_sun: 8_000_000,
            to_address: DEST.to_string(),
            transfer_id: "tx-1".to_string(),
        }]
    );
    let sent = h.ledger.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to_address, DEST);
    assert_eq!(sent[0].amount_sun, 8_000_000);
}

#[tokio::test]
async fn test_snapshot_cleared_before_transfer() {
    let h = Harness::new(10_000_000).await;
    h.withdrawal_at_amount_step().await;
    assert_eq!(h.storage.pending_kinds(USER).await, vec![FlowKind::Withdrawal]);

    h.text("2").await;

    let sent = h.ledger.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].pending_at_send.is_empty());

    // A repeated amount after completion reaches the menu, not the ledger
    let replies = h.text("2").await;
    assert!(matches!(replies.as_slice(), [Prompt::MainMenu { .. }]));
    assert_eq!(h.ledger.sent().len(), 1);
}

#[tokio::test]
async fn test_same_address_rejected_case_insensitively() {
    let h = Harness::new(10_000_000).await;
    h.start(FlowKind::Withdrawal).await;

    let replies = h.text(&SOURCE.to_lowercase()).await;

    assert_eq!(replies, vec![Prompt::SameAddress { wallet_id: WALLET }]);
    assert_eq!(h.storage.pending_kinds(USER).await, vec![FlowKind::Withdrawal]);
}

#[tokio::test]
async fn test_label_normalized_and_empty_rejected() {
    let h = Harness::new(10_000_000).await;
    h.start(FlowKind::Label).await;

    assert_eq!(
        h.text(" \t\u{7} ").await,
        vec![Prompt::LabelEmpty { wallet_id: WALLET }]
    );
    let unchanged = h.storage.get_wallet(WALLET).await.expect("load");
    assert_eq!(unchanged.and_then(|w| w.label), Some("Main".to_string()));

    assert_eq!(
        h.text("  My Wallet!!\t").await,
        vec![Prompt::LabelUpdated {
            label: "My Wallet!!".to_string()
        }]
    );
    let renamed = h.storage.get_wallet(WALLET).await.expect("load");
    assert_eq!(renamed.and_then(|w| w.label), Some("My Wallet!!".to_string()));
    assert!(h.storage.pending_kinds(USER).await.is_empty());
}

#[tokio::test]
async fn test_mismatched_delete_confirmation_clears_snapshot() {
    let h = Harness::new(10_000_000).await;
    let replies = h.start(FlowKind::Delete).await;
    assert!(matches!(
        replies.as_slice(),
        [Prompt::DeleteConfirm { balance_sun: 10_000_000, .. }]
    ));

    assert_eq!(h.text("not main").await, vec![Prompt::DeleteNotConfirmed]);
    assert!(h.storage.pending_kinds(USER).await.is_empty());
    assert!(h.storage.get_wallet(WALLET).await.expect("load").is_some());
}

#[tokio::test]
async fn test_matching_delete_confirmation_is_case_insensitive() {
    let h = Harness::new(0).await;
    h.start(FlowKind::Delete).await;

    let replies = h.text("  MAIN ").await;

    assert!(matches!(replies.as_slice(), [Prompt::WalletDeleted { .. }]));
    assert!(h.storage.get_wallet(WALLET).await.expect("load").is_none());
}

#[tokio::test]
async fn test_cancel_with_nothing_in_progress() {
    let h = Harness::new(10_000_000).await;

    assert_eq!(
        h.press(FlowAction::cancel(FlowKind::Withdrawal, Some(WALLET))).await,
        vec![Prompt::NothingToCancel]
    );
}

#[tokio::test]
async fn test_cancel_suspended_flow_after_restart() {
    let mut h = Harness::new(10_000_000).await;
    h.start(FlowKind::Label).await;
    h.restart().await;

    assert_eq!(
        h.press(FlowAction::cancel(FlowKind::Label, Some(WALLET))).await,
        vec![Prompt::Cancelled(FlowKind::Label)]
    );
    assert!(h.storage.pending_kinds(USER).await.is_empty());
}

#[tokio::test]
async fn test_start_command_abandons_active_flow() {
    let h = Harness::new(10_000_000).await;
    h.start(FlowKind::Withdrawal).await;

    let replies = h
        .engine
        .handle(USER, FlowEvent::Command(Command::Start))
        .await;

    assert!(matches!(replies.as_slice(), [Prompt::MainMenu { .. }]));
    assert!(h.storage.pending_kinds(USER).await.is_empty());
    let session = h.storage.load_session(USER).await.expect("load");
    assert_eq!(session.and_then(|s| s.active), None);
}

#[tokio::test]
async fn test_two_factor_enable_round() {
    let h = Harness::new(10_000_000).await;
    let replies = h
        .press(FlowAction::Start {
            kind: FlowKind::Enable2fa,
            wallet_id: None,
        })
        .await;
    assert!(matches!(replies.as_slice(), [Prompt::TwoFactorQr { .. }]));

    assert_eq!(
        h.press(FlowAction::TwoFactorNext).await,
        vec![Prompt::TwoFactorVerify]
    );
    assert_eq!(
        h.text("12345").await,
        vec![Prompt::InvalidCodeFormat(FlowKind::Enable2fa)]
    );
    assert_eq!(
        h.text("000000").await,
        vec![Prompt::InvalidCode(FlowKind::Enable2fa)]
    );
    assert_eq!(h.text("123456").await, vec![Prompt::TwoFactorEnabled]);

    let replies = h
        .engine
        .handle(USER, FlowEvent::Command(Command::Start))
        .await;
    assert!(matches!(
        replies.as_slice(),
        [Prompt::MainMenu {
            two_factor_enabled: true,
            ..
        }]
    ));
}

#[tokio::test]
async fn test_foreign_wallet_is_refused() {
    let h = Harness::new(10_000_000).await;

    let replies = h
        .engine
        .handle(
            USER + 1,
            FlowEvent::Action(FlowAction::Start {
                kind: FlowKind::Withdrawal,
                wallet_id: Some(WALLET),
            }),
        )
        .await;

    assert_eq!(replies, vec![Prompt::AccessDenied]);
    assert!(h.storage.pending_kinds(USER + 1).await.is_empty());
}

#[tokio::test]
async fn test_resume_of_deleted_wallet_is_refused() {
    let h = Harness::new(10_000_000).await;
    let wallet = main_wallet().snapshot();
    h.storage
        .set_pending(USER, &FlowState::Label(LabelState { wallet: wallet.clone() }))
        .await
        .expect("store");
    h.storage
        .set_pending(
            USER,
            &FlowState::Delete(DeleteState {
                wallet,
                balance_sun: 10_000_000,
            }),
        )
        .await
        .expect("store");
    assert!(h.storage.delete_wallet(WALLET).await.expect("delete"));

    assert_eq!(h.text("hello").await, vec![Prompt::AccessDenied]);
    // Lower-priority snapshots wait for their own turn
    assert_eq!(h.storage.pending_kinds(USER).await, vec![FlowKind::Delete]);

    assert_eq!(h.text("hello").await, vec![Prompt::AccessDenied]);
    assert!(h.storage.pending_kinds(USER).await.is_empty());

    let replies = h.text("hello").await;
    assert!(matches!(
        replies.as_slice(),
        [Prompt::MainMenu { wallets, .. }] if wallets.is_empty()
    ));
}

#[tokio::test]
async fn test_two_factor_resume_keeps_secret() {
    let mut h = Harness::new(0).await;
    let replies = h
        .press(FlowAction::Start {
            kind: FlowKind::Enable2fa,
            wallet_id: None,
        })
        .await;
    let [Prompt::TwoFactorQr { secret, .. }] = replies.as_slice() else {
        panic!("expected the QR prompt, got {replies:?}");
    };
    let secret = secret.clone();

    h.restart().await;
    let replies = h.text("hi").await;
    assert!(matches!(
        replies.as_slice(),
        [Prompt::TwoFactorQr { secret: shown, .. }] if *shown == secret
    ));
    assert_eq!(
        h.press(FlowAction::TwoFactorNext).await,
        vec![Prompt::TwoFactorVerify]
    );

    h.restart().await;
    assert_eq!(h.text("hi").await, vec![Prompt::TwoFactorVerify]);
    assert_eq!(h.otp.generated(), 1);
    assert_eq!(
        h.storage.get_two_factor(USER).await.expect("load"),
        Some(TwoFactorRecord {
            secret: secret.clone(),
            enabled: false
        })
    );

    assert_eq!(h.text("123456").await, vec![Prompt::TwoFactorEnabled]);
    assert_eq!(
        h.storage.get_two_factor(USER).await.expect("load"),
        Some(TwoFactorRecord {
            secret,
            enabled: true
        })
    );
}

#[tokio::test]
async fn test_delete_resume_does_not_refetch_balance() {
    let mut h = Harness::new(7_000_000).await;
    let before_restart = h.start(FlowKind::Delete).await;
    assert_eq!(h.ledger.balance_calls(), 1);

    h.restart().await;

    assert_eq!(h.text("hi").await, before_restart);
    assert_eq!(h.ledger.balance_calls(), 1);
}

#[tokio::test]
async fn test_events_of_one_user_are_serialized() {
    let storage = Arc::new(MemoryStorage::new());
    storage.insert_wallet(main_wallet()).await;
    let ledger = Arc::new(GatedLedger {
        entered: Notify::new(),
        release: Notify::new(),
    });
    let engine = Arc::new(Harness::engine(
        &storage,
        Arc::clone(&ledger) as Arc<dyn LedgerService>,
        &Arc::new(CountingOtp::default()),
        RateLimiter::new(1000, 10_000, 15_000),
    ));

    let start = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move {
            engine
                .handle(
                    USER,
                    FlowEvent::Action(FlowAction::Start {
                        kind: FlowKind::Withdrawal,
                        wallet_id: Some(WALLET),
                    }),
                )
                .await
        }
    });
    // The start event now holds the user's section, parked in the balance lookup
    ledger.entered.notified().await;

    let text = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move {
            engine
                .handle(USER, FlowEvent::Text(DEST.to_string()))
                .await
        }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!text.is_finished(), "second event ran inside the first one's section");

    ledger.release.notify_one();
    let started = start.await.expect("start task panicked");
    let answered = text.await.expect("text task panicked");

    assert!(matches!(started.as_slice(), [Prompt::WithdrawAddress { .. }]));
    assert!(matches!(
        answered.as_slice(),
        [Prompt::WithdrawAmount { to_address, .. }] if to_address == DEST
    ));
}
