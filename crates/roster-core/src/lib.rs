//! roster-core: Domain model for the Roster personnel client.
//!
//! Face descriptors and enrollment records, the API response envelope,
//! schedule notifiers and the schema-driven resource registry. Nothing in
//! this crate performs I/O.

pub mod envelope;
pub mod face;
pub mod notifier;
pub mod resource;
pub mod schedule;
pub mod table;
pub mod types;

pub use envelope::{ApiEnvelope, EnvelopeError};
pub use face::{DescriptorPayload, EnrollmentStatus, FaceBackend, VerifiedIdentity, VerifyOutcome};
pub use notifier::{Alert, AssignmentNotifier, Milestone, ReminderNotifier, ReminderWindow};
pub use resource::{FieldKind, FieldSpec, ResourceKind, ResourceSchema};
pub use schedule::{Reminder, SuguanAssignment};
pub use table::{Page, ResourceTable};
pub use types::{BoundingBox, FaceDescriptor, Record, RecordId};
