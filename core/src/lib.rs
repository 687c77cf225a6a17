//! qcompiler-core: dialect-agnostic query compiler and row-reducer engine.
//!
//! Compiles structured query descriptions into parameterized SQL for
//! PostgreSQL and SQLite and reshapes flat joined rows back into nested
//! object graphs. The only dialect-specific code lives behind
//! [`dialect::DialectAdapter`]; every other module here is shared between
//! `qcompiler-sqlite` and `qcompiler-postgres`.

pub mod aggregate;
pub mod api;
pub mod batch;
pub mod cache;
pub mod dialect;
pub mod error;
pub mod ident;
pub mod model;
pub mod operators;
pub mod params;
pub mod planner;
pub mod reduce;
pub mod request;
pub mod stats;
pub mod where_compiler;
pub mod where_in;

mod tracing;
mod value;

#[cfg(test)]
mod test_support;

pub use api::{compile, CompiledQuery};
pub use dialect::{Dialect, DialectAdapter};
pub use error::{CompileError, ErrorKind};
pub use model::{Cardinality, Field, FieldType, Model, ModelIndex, RelationInfo, SchemaCache};
pub use params::{Binding, ParamSnapshot, ParamStore};
pub use planner::{IncludePlan, PlannerThresholds, RelationPlan, RelationStrategy, WhereInSegment};
pub use request::{Method, QueryRequest};
pub use stats::{RelationStat, RelationStats};
pub use value::Value;
