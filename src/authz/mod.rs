//! Role/permission authorization: policy tuples, the write-through enforcer
//! and the HTTP extractors that consult it.

pub mod catalog;
pub mod enforcer;
pub mod errors;
pub mod gates;
pub mod store;
pub mod types;
pub mod web;

pub use enforcer::Enforcer;

/// Policy subject for a user account.
pub fn subject(user_id: i32) -> String {
    user_id.to_string()
}
