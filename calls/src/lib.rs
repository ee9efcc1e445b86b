//! # Skillswap Calls
//!
//! Call lifecycle and ledger engine for peer-to-peer skill-exchange sessions.
//!
//! An owner schedules a call from an offering. Participants enroll while it is
//! scheduled. When the owner starts it, every participant pays the
//! participant price, all or nothing. Completion charges absentees a no-show
//! penalty and settles the owner's side: teaching calls earn revenue per
//! attendee, learn-together calls charge the owner. A background sweeper
//! completes calls whose time slot is over.
//!
//! ## Architecture
//!
//! ```text
//! request ─▶ CallEngine ─lock(call)─▶ load ─▶ CallReducer ─▶ Effect ─▶ Ledger
//!                                             ▲                         │
//!                                             └──── FundsReserved ◀─────┘
//!                                                   SettlementApplied
//!                                                        │
//!                                                        ▼
//!                                                  CallRecordStore::save
//! ```
//!
//! - [`reducer`]: pure transition rules
//! - [`settlement`]: which balances move for each step
//! - [`ledger`]: all-or-nothing balance batches
//! - [`engine`]: locking, persistence and compensation
//! - [`sweeper`]: time-driven completion
//! - [`memory`]: in-memory collaborators

pub mod config;
pub mod engine;
pub mod environment;
pub mod error;
pub mod ledger;
pub mod locks;
pub mod memory;
pub mod policy;
pub mod reducer;
pub mod settlement;
pub mod sweeper;
pub mod types;

pub use config::Config;
pub use engine::{CallEngine, Collaborators};
pub use environment::{
    AccountDirectory, CallEnvironment, CallRecordStore, MeetingProvisioner, MeetingRequest,
    OfferingCatalog,
};
pub use error::{AccountError, CallError, CatalogError, ProvisioningError, StoreError};
pub use ledger::{Ledger, Posting};
pub use reducer::{CallAction, CallReducer, CallState};
pub use sweeper::{LifecycleSweeper, SweepReport};
pub use types::{
    Call, CallId, CallKind, CallStatus, LedgerEntry, MeetingDetails, OfferingId, Points,
    ScheduleCall, UserId,
};
