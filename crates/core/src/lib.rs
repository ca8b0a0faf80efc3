//! clinic-core: application entities and their FHIR resource mappings
//!
//! Everything in this crate is pure shape translation: an application
//! payload goes in, the FHIR resource JSON the Medplum backend expects
//! comes out, and back again. No I/O happens here.

pub mod appointment;
pub mod billing;
pub mod bundle;
pub mod consultation;
pub mod error;
pub mod fhir;
pub mod imaging;
pub mod inventory;
pub mod lab;
pub mod outcome;
pub mod patient;
pub mod referral;

pub use bundle::{Bundle, BundleEntry, BundleLink, BundleType};
pub use error::MappingError;
pub use outcome::{IssueSeverity, IssueType, OperationOutcome, OperationOutcomeIssue};
