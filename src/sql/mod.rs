//! Parameterized SQL lowering for the PostgreSQL driver.

mod builder;
mod params;

pub use builder::{lower, QueryBuf};
pub use params::PgBindValue;
