//! Domain value objects shared across components.

pub mod requester;

pub use requester::RequesterId;
