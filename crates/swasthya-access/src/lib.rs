//! Swasthya Access
//!
//! Record access control for the consent core. [`Authorizer`] is the one
//! place that decides whether a principal may read or write a patient's
//! records, consulting ownership, role, treatment relationships and the
//! consent store, and auditing non-owner access to the ledger.

pub mod authorizer;
pub mod relations;

pub use authorizer::{AccessBasis, Authorizer, Decision, NO_PERMISSION};
pub use relations::{
    Appointment, AppointmentBook, AppointmentRelation, AppointmentStatus, RelationshipSource,
};
