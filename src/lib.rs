pub mod constants;
pub mod data;
pub mod env;
pub mod error;
pub mod history;
pub mod policy;
pub mod types;
