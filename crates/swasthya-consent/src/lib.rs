//! Swasthya Consent
//!
//! Patient-controlled consent grants. A doctor requests access by patient
//! email, the patient approves or denies, and an approved grant authorizes
//! access until it expires or the patient revokes it.
//!
//! ```text
//! pending ──approve──▶ approved ──revoke──▶ revoked
//!    │                    │
//!    └──deny──▶ denied    └──(window closes)──▶ expired
//! ```
//!
//! Approvals and revocations are appended to the ledger through
//! [`swasthya_ledger::TransactionLog`]; denials are not.

pub mod directory;
pub mod grant;
pub mod store;

pub use directory::{InMemoryDirectory, UserDirectory, UserRecord};
pub use grant::{ConsentGrant, ConsentStatus};
pub use store::{ConsentRequest, ConsentStore};
