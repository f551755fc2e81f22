pub mod adapter;
pub mod collection;
pub mod dashboard;
pub mod error;
pub mod import;
pub mod pagination;
pub mod registry;
pub mod store;
