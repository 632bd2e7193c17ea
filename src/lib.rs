//! cdattg - attendance sessions and role/permission authorization for a
//! vocational training back-office.
//!
//! The binary wires these modules together; they are public for the
//! integration tests.

pub mod attendance;
pub mod authz;
pub mod dashboard;
pub mod entities;
pub mod errors;
pub mod report;
pub mod settings;
pub mod shift;
pub mod storage;
pub mod token;
pub mod web;
