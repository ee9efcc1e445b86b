//! Point balance mutations with a non-negativity policy.
//!
//! A batch of postings is applied in two phases. Staging reads every affected
//! balance once and computes the outcome of each posting in order, failing the
//! whole batch if a strict debit cannot be covered. Commit then writes the new
//! balances. If a write fails partway, the balances already written are put
//! back before the error is returned, so a batch is all-or-nothing as long as
//! every balance write goes through the same [`Ledger`].
//!
//! A batch holds the locks of the accounts it touches, taken in id order.
//! Batches over disjoint accounts run in parallel.

use crate::environment::AccountDirectory;
use crate::error::CallError;
use crate::locks::AccountLocks;
use crate::types::{Direction, EntryKind, LedgerEntry, Points, UserId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// How a debit behaves when the balance cannot cover it
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DebitPolicy {
    /// Fail the batch with `InsufficientBalance`
    Strict,
    /// Take what is there and stop at zero
    ClampAtZero,
}

/// One requested balance movement
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Posting {
    /// Account to move
    pub account: UserId,
    /// Reason for the movement
    pub kind: EntryKind,
    /// Debit or credit
    pub direction: Direction,
    /// Only consulted for debits
    pub policy: DebitPolicy,
    /// Requested amount
    pub amount: Points,
}

impl Posting {
    /// Strict debit of the participant price at start
    #[must_use]
    pub const fn reservation(account: UserId, amount: Points) -> Self {
        Self::debit(account, EntryKind::Reservation, DebitPolicy::Strict, amount)
    }

    /// Clamped debit for a participant who did not attend
    #[must_use]
    pub const fn no_show_penalty(account: UserId, amount: Points) -> Self {
        Self::debit(account, EntryKind::NoShowPenalty, DebitPolicy::ClampAtZero, amount)
    }

    /// Clamped debit of the learn-together owner charge
    #[must_use]
    pub const fn learn_together_charge(account: UserId, amount: Points) -> Self {
        Self::debit(
            account,
            EntryKind::LearnTogetherCharge,
            DebitPolicy::ClampAtZero,
            amount,
        )
    }

    /// Credit of teaching revenue to the owner
    #[must_use]
    pub const fn teaching_revenue(account: UserId, amount: Points) -> Self {
        Self::credit(account, EntryKind::TeachingRevenue, amount)
    }

    /// Credit returning a reservation
    #[must_use]
    pub const fn refund(account: UserId, amount: Points) -> Self {
        Self::credit(account, EntryKind::Refund, amount)
    }

    /// Inverse movement of an applied entry
    #[must_use]
    pub const fn reversal_of(entry: &LedgerEntry) -> Self {
        match entry.direction {
            Direction::Debit => Self::credit(entry.account, EntryKind::Reversal, entry.applied),
            Direction::Credit => Self::debit(
                entry.account,
                EntryKind::Reversal,
                DebitPolicy::ClampAtZero,
                entry.applied,
            ),
        }
    }

    const fn debit(account: UserId, kind: EntryKind, policy: DebitPolicy, amount: Points) -> Self {
        Self {
            account,
            kind,
            direction: Direction::Debit,
            policy,
            amount,
        }
    }

    const fn credit(account: UserId, kind: EntryKind, amount: Points) -> Self {
        Self {
            account,
            kind,
            direction: Direction::Credit,
            policy: DebitPolicy::Strict,
            amount,
        }
    }
}

/// Balance state of one account while a batch is staged
#[derive(Clone, Copy, Debug)]
struct StagedBalance {
    original: Points,
    current: Points,
}

/// Serialized access to account balances
pub struct Ledger {
    accounts: Arc<dyn AccountDirectory>,
    locks: AccountLocks,
}

impl Ledger {
    /// Creates a ledger over an account directory
    #[must_use]
    pub fn new(accounts: Arc<dyn AccountDirectory>) -> Self {
        Self {
            accounts,
            locks: AccountLocks::new(),
        }
    }

    /// Current balance of an account
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown account, `Persistence` on backend failure.
    pub async fn balance(&self, account: UserId) -> Result<Points, CallError> {
        self.accounts
            .balance(account)
            .await?
            .ok_or_else(|| CallError::account_not_found(account))
    }

    /// Apply a batch of postings, all or nothing
    ///
    /// Returns one entry per posting, in posting order.
    ///
    /// # Errors
    ///
    /// - `InsufficientBalance` if a strict debit cannot be covered
    /// - `NotFound` if an account does not exist
    /// - `Persistence` if a balance write fails (earlier writes are restored)
    #[tracing::instrument(skip(self, postings), fields(postings = postings.len()))]
    pub async fn apply(&self, postings: &[Posting]) -> Result<Vec<LedgerEntry>, CallError> {
        if postings.is_empty() {
            return Ok(Vec::new());
        }

        let _guards = self
            .locks
            .acquire_all(postings.iter().map(|posting| posting.account))
            .await;

        let (order, staged, entries) = self.stage(postings).await?;
        self.commit(&order, &staged).await?;

        debug!(entries = entries.len(), "ledger batch committed");
        Ok(entries)
    }

    /// Undo entries that were applied but could not be recorded
    ///
    /// Credits are taken back with a clamped debit, so an account that spent
    /// the credit in the meantime ends at zero rather than failing.
    ///
    /// # Errors
    ///
    /// Same as [`Ledger::apply`].
    pub async fn revert(&self, entries: &[LedgerEntry]) -> Result<Vec<LedgerEntry>, CallError> {
        let postings: Vec<Posting> = entries
            .iter()
            .rev()
            .filter(|entry| !entry.applied.is_zero())
            .map(Posting::reversal_of)
            .collect();

        warn!(entries = postings.len(), "reverting ledger entries");
        metrics::counter!("ledger.compensations").increment(1);
        self.apply(&postings).await
    }

    async fn stage(
        &self,
        postings: &[Posting],
    ) -> Result<(Vec<UserId>, HashMap<UserId, StagedBalance>, Vec<LedgerEntry>), CallError> {
        let mut order = Vec::new();
        let mut staged: HashMap<UserId, StagedBalance> = HashMap::new();
        let mut entries = Vec::with_capacity(postings.len());

        for posting in postings {
            if !staged.contains_key(&posting.account) {
                let original = self.balance(posting.account).await?;
                order.push(posting.account);
                staged.insert(
                    posting.account,
                    StagedBalance {
                        original,
                        current: original,
                    },
                );
            }
            let Some(balance) = staged.get_mut(&posting.account) else {
                continue;
            };

            let applied = match (posting.direction, posting.policy) {
                (Direction::Debit, DebitPolicy::Strict) => {
                    balance.current = balance.current.checked_sub(posting.amount).ok_or(
                        CallError::InsufficientBalance {
                            account: posting.account,
                            balance: balance.current,
                            required: posting.amount,
                        },
                    )?;
                    posting.amount
                },
                (Direction::Debit, DebitPolicy::ClampAtZero) => {
                    let taken = posting.amount.min(balance.current);
                    balance.current = balance.current.saturating_sub(taken);
                    taken
                },
                (Direction::Credit, _) => {
                    balance.current = balance.current.checked_add(posting.amount).ok_or_else(
                        || CallError::Persistence(format!("balance overflow on {}", posting.account)),
                    )?;
                    posting.amount
                },
            };

            entries.push(LedgerEntry {
                account: posting.account,
                kind: posting.kind,
                direction: posting.direction,
                requested: posting.amount,
                applied,
                balance_after: balance.current,
            });
        }

        Ok((order, staged, entries))
    }

    async fn commit(
        &self,
        order: &[UserId],
        staged: &HashMap<UserId, StagedBalance>,
    ) -> Result<(), CallError> {
        let mut written: Vec<(UserId, Points)> = Vec::with_capacity(order.len());

        for account in order {
            let Some(balance) = staged.get(account) else {
                continue;
            };
            if balance.current == balance.original {
                continue;
            }
            if let Err(error) = self.accounts.set_balance(*account, balance.current).await {
                warn!(%account, %error, restored = written.len(), "balance write failed, restoring batch");
                self.restore(&written).await;
                return Err(error.into());
            }
            written.push((*account, balance.original));
        }

        Ok(())
    }

    async fn restore(&self, written: &[(UserId, Points)]) {
        metrics::counter!("ledger.compensations").increment(1);
        for (account, original) in written.iter().rev() {
            if let Err(error) = self.accounts.set_balance(*account, *original).await {
                error!(%account, %original, %error, "failed to restore balance");
            }
        }
    }
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger").finish_non_exhaustive()
    }
}
