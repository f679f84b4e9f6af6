mod error;

pub mod filter;
pub mod jql;

pub use error::{Error, Result};
pub use filter::{AssigneeFilter, DateRange, FilterSpec, RecordKind, ScopeId, TimeWindow};
pub use jql::{Query, QueryBuilder};
