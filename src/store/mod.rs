//! Store drivers: the contract the engine requires from a relational backend,
//! and the PostgreSQL implementation.

mod driver;
mod postgres;

pub use driver::{FieldViolation, Row, StoreDriver, StoreError, StoreOp, StoreQuery};
pub use postgres::PgStore;
