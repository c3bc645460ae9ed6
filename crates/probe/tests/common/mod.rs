pub mod mocks;

#[allow(unused_imports)]
pub use mocks::{ScriptedStore, limit_error, not_found_error, other_error};
