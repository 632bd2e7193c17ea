pub mod app;
pub mod builders;
pub mod db;

pub use app::TestApp;
pub use builders::{ClassBuilder, PersonBuilder, ShiftBuilder, UserBuilder};
pub use db::TestDb;
