//! The execution lifecycle as one explicit state value. Every transition
//! is the pure function `step(state, event) -> (state, effect)`; the async
//! engine performs effects and feeds the results back in as events. Which
//! quote is active is never inferred from nullable fields: the state tag
//! says exactly where the attempt stands.

use ethers::types::{Address, H256};

/// What the engine is waiting on while in `Polling`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollTarget {
    /// Gasless trade handle returned by the submit endpoint.
    GaslessTrade(String),
    /// Broadcast EVM transaction awaiting a receipt.
    EvmReceipt(H256),
    /// Broadcast Solana transaction signature.
    SolanaSignature(String),
}

impl PollTarget {
    /// The on-chain hash already known for this target, if any.
    fn known_hash(&self) -> Option<String> {
        match self {
            PollTarget::GaslessTrade(_) => None,
            PollTarget::EvmReceipt(hash) => Some(format!("{hash:#x}")),
            PollTarget::SolanaSignature(signature) => Some(signature.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    Idle,
    NeedsApproval { spender: Address },
    Approving { tx_hash: H256 },
    Signing,
    Submitting,
    Polling { target: PollTarget, attempt: u32 },
    Confirmed { tx_hash: Option<String> },
    Reverted { tx_hash: String },
    Rejected,
    Expired,
    Failed { reason: String },
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Confirmed { .. }
                | ExecutionStatus::Reverted { .. }
                | ExecutionStatus::Rejected
                | ExecutionStatus::Failed { .. }
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            ExecutionStatus::Idle => "idle",
            ExecutionStatus::NeedsApproval { .. } => "needs-approval",
            ExecutionStatus::Approving { .. } => "approving",
            ExecutionStatus::Signing => "signing",
            ExecutionStatus::Submitting => "submitting",
            ExecutionStatus::Polling { .. } => "polling",
            ExecutionStatus::Confirmed { .. } => "confirmed",
            ExecutionStatus::Reverted { .. } => "reverted",
            ExecutionStatus::Rejected => "rejected",
            ExecutionStatus::Expired => "expired",
            ExecutionStatus::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    /// Attempt begins. The allowance check is needed only when the quote
    /// carries an allowance requirement and no signable gasless approval.
    Started { needs_allowance_check: bool },
    AllowanceChecked { sufficient: bool, spender: Address },
    ApprovalSent { tx_hash: H256 },
    ApprovalConfirmed,
    ApprovalReverted { tx_hash: H256 },
    /// All message signatures collected (gasless typed data, or a signed
    /// serialized Solana transaction).
    SignaturesReady,
    /// Wallet broadcast a transaction itself (on-chain, bridge, wrap).
    TransactionSent { tx_hash: H256 },
    /// Gasless submit endpoint accepted the signed payloads.
    TradeAccepted { trade_hash: String },
    /// Solana broadcast accepted.
    SignatureBroadcast { signature: String },
    PollPending,
    PollConfirmed { tx_hash: Option<String> },
    PollFailed { reason: String },
    ReceiptReverted { tx_hash: H256 },
    WalletDeclined,
    /// Freshness gate tripped at signing time.
    QuoteLapsed,
    ProviderFailed { reason: String },
    Reset,
}

/// Side effects for the engine to perform after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    None,
    CheckAllowance,
    SubmitApproval { spender: Address },
    AwaitApprovalReceipt { tx_hash: H256 },
    /// Replace the quote wholesale before continuing; mandatory after an
    /// on-chain approval and after a freshness failure.
    RefreshQuote,
    /// Collect signatures or broadcast, depending on the quote payload.
    RequestWallet,
    /// Send signed payloads to the provider's submit endpoint.
    SubmitTrade,
    Poll { attempt: u32 },
    RecordHistory,
}

/// Advance the machine. `max_poll_attempts` bounds the polling loop so it
/// always reaches a terminal state regardless of provider behavior; running
/// out of attempts is a deliberate soft success, because a submitted trade
/// may still land after the polling window.
pub fn step(
    status: ExecutionStatus,
    event: ExecutionEvent,
    max_poll_attempts: u32,
) -> (ExecutionStatus, Effect) {
    use ExecutionEvent as E;
    use ExecutionStatus as S;

    match (status, event) {
        (S::Idle | S::Expired, E::Started { needs_allowance_check: true }) => {
            (S::Idle, Effect::CheckAllowance)
        }
        (S::Idle | S::Expired, E::Started { needs_allowance_check: false }) => {
            (S::Signing, Effect::RequestWallet)
        }
        (S::Idle, E::AllowanceChecked { sufficient: true, .. }) => {
            (S::Signing, Effect::RequestWallet)
        }
        (S::Idle, E::AllowanceChecked { sufficient: false, spender }) => (
            S::NeedsApproval { spender },
            Effect::SubmitApproval { spender },
        ),

        (S::NeedsApproval { .. }, E::ApprovalSent { tx_hash }) => (
            S::Approving { tx_hash },
            Effect::AwaitApprovalReceipt { tx_hash },
        ),
        (S::NeedsApproval { .. }, E::WalletDeclined) => (S::Rejected, Effect::None),

        // Approval landed: the original quote has been aging for the whole
        // confirmation wait, so a re-fetch is mandatory, not optional.
        (S::Approving { .. }, E::ApprovalConfirmed) => (S::Idle, Effect::RefreshQuote),
        (S::Approving { .. }, E::ApprovalReverted { tx_hash }) => (
            S::Failed {
                reason: format!("approval transaction {tx_hash:#x} reverted"),
            },
            Effect::None,
        ),

        (S::Signing, E::SignaturesReady) => (S::Submitting, Effect::SubmitTrade),
        (S::Signing, E::TransactionSent { tx_hash }) => (
            S::Polling {
                target: PollTarget::EvmReceipt(tx_hash),
                attempt: 0,
            },
            Effect::Poll { attempt: 0 },
        ),
        (S::Signing, E::WalletDeclined) => (S::Rejected, Effect::None),
        (S::Idle | S::Signing, E::QuoteLapsed) => (S::Expired, Effect::RefreshQuote),

        (S::Submitting, E::TradeAccepted { trade_hash }) => (
            S::Polling {
                target: PollTarget::GaslessTrade(trade_hash),
                attempt: 0,
            },
            Effect::Poll { attempt: 0 },
        ),
        (S::Submitting, E::SignatureBroadcast { signature }) => (
            S::Polling {
                target: PollTarget::SolanaSignature(signature),
                attempt: 0,
            },
            Effect::Poll { attempt: 0 },
        ),

        (S::Polling { target, attempt }, E::PollPending) => {
            let next = attempt + 1;
            if next >= max_poll_attempts {
                // Attempts exhausted without a verdict. Terminal for the
                // UI either way; a known hash is kept on the outcome.
                (
                    S::Confirmed {
                        tx_hash: target.known_hash(),
                    },
                    Effect::RecordHistory,
                )
            } else {
                (
                    S::Polling {
                        target,
                        attempt: next,
                    },
                    Effect::Poll { attempt: next },
                )
            }
        }
        (S::Polling { target, .. }, E::PollConfirmed { tx_hash }) => (
            S::Confirmed {
                tx_hash: tx_hash.or_else(|| target.known_hash()),
            },
            Effect::RecordHistory,
        ),
        (S::Polling { .. }, E::ReceiptReverted { tx_hash }) => (
            S::Reverted {
                tx_hash: format!("{tx_hash:#x}"),
            },
            Effect::None,
        ),
        (S::Polling { .. }, E::PollFailed { reason }) => (S::Failed { reason }, Effect::None),

        (_, E::WalletDeclined) => (S::Rejected, Effect::None),
        (_, E::ProviderFailed { reason }) => (S::Failed { reason }, Effect::None),
        (_, E::Reset) => (S::Idle, Effect::None),

        // Anything else is a stray event for the current state; hold
        // position rather than invent a transition.
        (status, _) => (status, Effect::None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX_POLLS: u32 = 20;

    fn spender() -> Address {
        Address::repeat_byte(0x42)
    }

    #[test]
    fn insufficient_allowance_reaches_needs_approval_not_signing() {
        let (state, effect) = step(
            ExecutionStatus::Idle,
            ExecutionEvent::Started {
                needs_allowance_check: true,
            },
            MAX_POLLS,
        );
        assert_eq!(effect, Effect::CheckAllowance);

        let (state, effect) = step(
            state,
            ExecutionEvent::AllowanceChecked {
                sufficient: false,
                spender: spender(),
            },
            MAX_POLLS,
        );
        assert_eq!(
            state,
            ExecutionStatus::NeedsApproval { spender: spender() }
        );
        assert_eq!(effect, Effect::SubmitApproval { spender: spender() });
    }

    #[test]
    fn approval_confirmation_forces_quote_refresh() {
        let tx_hash = H256::repeat_byte(0x01);
        let (state, _) = step(
            ExecutionStatus::NeedsApproval { spender: spender() },
            ExecutionEvent::ApprovalSent { tx_hash },
            MAX_POLLS,
        );
        assert_eq!(state, ExecutionStatus::Approving { tx_hash });

        let (state, effect) = step(state, ExecutionEvent::ApprovalConfirmed, MAX_POLLS);
        assert_eq!(state, ExecutionStatus::Idle);
        assert_eq!(effect, Effect::RefreshQuote);
    }

    #[test]
    fn gasless_happy_path_sequence() {
        let (state, effect) = step(
            ExecutionStatus::Idle,
            ExecutionEvent::Started {
                needs_allowance_check: false,
            },
            MAX_POLLS,
        );
        assert_eq!(state, ExecutionStatus::Signing);
        assert_eq!(effect, Effect::RequestWallet);

        let (state, effect) = step(state, ExecutionEvent::SignaturesReady, MAX_POLLS);
        assert_eq!(state, ExecutionStatus::Submitting);
        assert_eq!(effect, Effect::SubmitTrade);

        let (state, _) = step(
            state,
            ExecutionEvent::TradeAccepted {
                trade_hash: "0xtrade".to_string(),
            },
            MAX_POLLS,
        );
        assert!(matches!(state, ExecutionStatus::Polling { attempt: 0, .. }));

        let (state, effect) = step(
            state,
            ExecutionEvent::PollConfirmed {
                tx_hash: Some("0xmined".to_string()),
            },
            MAX_POLLS,
        );
        assert_eq!(
            state,
            ExecutionStatus::Confirmed {
                tx_hash: Some("0xmined".to_string())
            }
        );
        assert_eq!(effect, Effect::RecordHistory);
    }

    #[test]
    fn polling_terminates_within_bound_as_soft_success() {
        // A provider that never confirms: feed PollPending forever and
        // count transitions until terminal.
        let mut state = ExecutionStatus::Polling {
            target: PollTarget::GaslessTrade("0xtrade".to_string()),
            attempt: 0,
        };
        let mut rounds = 0;
        loop {
            let (next, effect) = step(state, ExecutionEvent::PollPending, MAX_POLLS);
            state = next;
            rounds += 1;
            assert!(rounds <= MAX_POLLS, "polling failed to terminate");
            if effect == Effect::RecordHistory {
                break;
            }
        }
        // Soft success: terminal confirmed, but with no verifiable hash.
        assert_eq!(state, ExecutionStatus::Confirmed { tx_hash: None });
    }

    #[test]
    fn receipt_timeout_keeps_known_hash() {
        let tx_hash = H256::repeat_byte(0x07);
        let mut state = ExecutionStatus::Polling {
            target: PollTarget::EvmReceipt(tx_hash),
            attempt: MAX_POLLS - 1,
        };
        let (next, _) = step(state.clone(), ExecutionEvent::PollPending, MAX_POLLS);
        state = next;
        assert_eq!(
            state,
            ExecutionStatus::Confirmed {
                tx_hash: Some(format!("{tx_hash:#x}"))
            }
        );
    }

    #[test]
    fn revert_and_rejection_are_terminal() {
        let tx_hash = H256::repeat_byte(0x09);
        let (state, _) = step(
            ExecutionStatus::Polling {
                target: PollTarget::EvmReceipt(tx_hash),
                attempt: 3,
            },
            ExecutionEvent::ReceiptReverted { tx_hash },
            MAX_POLLS,
        );
        assert!(state.is_terminal());
        assert_eq!(state.label(), "reverted");

        let (state, _) = step(
            ExecutionStatus::Signing,
            ExecutionEvent::WalletDeclined,
            MAX_POLLS,
        );
        assert_eq!(state, ExecutionStatus::Rejected);

        // Reset recovers to idle from any terminal state.
        let (state, _) = step(state, ExecutionEvent::Reset, MAX_POLLS);
        assert_eq!(state, ExecutionStatus::Idle);
    }

    #[test]
    fn stale_quote_at_signing_triggers_refresh_then_retry() {
        let (state, effect) = step(
            ExecutionStatus::Signing,
            ExecutionEvent::QuoteLapsed,
            MAX_POLLS,
        );
        assert_eq!(state, ExecutionStatus::Expired);
        assert_eq!(effect, Effect::RefreshQuote);

        // After the refresh the engine restarts the attempt.
        let (state, effect) = step(
            state,
            ExecutionEvent::Started {
                needs_allowance_check: false,
            },
            MAX_POLLS,
        );
        assert_eq!(state, ExecutionStatus::Signing);
        assert_eq!(effect, Effect::RequestWallet);
    }

    #[test]
    fn stray_events_hold_position() {
        let (state, effect) = step(
            ExecutionStatus::Submitting,
            ExecutionEvent::PollPending,
            MAX_POLLS,
        );
        assert_eq!(state, ExecutionStatus::Submitting);
        assert_eq!(effect, Effect::None);
    }
}
