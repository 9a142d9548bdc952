//! facegate-core: access control domain logic.
//!
//! Holds the entity types shared by the store and the daemon, input
//! validation for operator forms, time-window rule evaluation and the
//! access decision that combines a face-service result with zone policy.

pub mod decision;
pub mod notify;
pub mod password;
pub mod rules;
pub mod schedule;
pub mod secret;
pub mod settings;
pub mod types;
pub mod validate;

pub use decision::{decide, AccessContext, Candidate, Thresholds, Verdict};
pub use rules::RuleOutcome;
pub use schedule::TimeOfDay;
pub use settings::ZoneSettings;
pub use types::{AccessRule, AlertKind, AuditAction, Decision, EvidenceKind, NotificationStatus};
pub use validate::{FieldError, ValidationError};
