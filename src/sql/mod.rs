//! SQL generation: dialect abstraction and the IR-to-text emitter.

pub mod dialect;
pub mod gen;

pub use dialect::{
    BigQuery, Dialect, DialectField, DialectResult, DuckDb, Postgres, SqlDialect,
    UnsupportedCapability,
};
pub use gen::SqlGenerator;
