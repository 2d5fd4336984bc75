pub mod apartment;
pub mod vote;

pub use apartment::{ApartmentChoice, ApartmentListing};
pub use vote::VoteRecord;
