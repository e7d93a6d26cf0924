//! Business collaborators used by production agents: the side-table
//! store and the clearinghouse.

mod clearinghouse;
pub mod memory;
mod store;

pub use clearinghouse::{
    Accumulator, Clearinghouse, ClearinghouseError, CoverageResponse, CoverageStatus,
    EligibilityInquiry, HttpClearinghouse, InquiryPatient, InquiryPayer, InquiryProvider,
    SubmissionReceipt, SubmissionStatus,
};
pub use store::{BusinessStore, PgBusinessStore};
