//! # navql
//!
//! Compiles association-aware relational queries into flat query trees.
//!
//! ## Architecture
//!
//! Queries are written against a schema model: they navigate associations
//! (`author.name`), read structured elements (`dims`), nest projections
//! (`books { title }`) and test for related rows (`exists books`). The
//! compiler turns them into queries over plain tables:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │          CQL text / CQN JSON  (cql, cqn::json)           │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [parser]
//! ┌─────────────────────────────────────────────────────────┐
//! │                 Query tree (cqn)                         │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [infer]        ◀── Model (CSN)
//! ┌─────────────────────────────────────────────────────────┐
//! │        Resolved tree + join tree + alias scope           │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [transform]
//! ┌─────────────────────────────────────────────────────────┐
//! │   Flat tree: alias.column refs, left joins, exists and   │
//! │   expand subqueries                                      │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Rendering SQL text from the flat tree is left to the caller.

pub mod config;
pub mod cql;
pub mod cqn;
pub mod error;
pub mod infer;
pub mod model;
pub mod search;
pub mod transform;

pub use error::{TransformError, TransformResult};
pub use transform::{transform, Transformer};

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::config::Settings;
    pub use crate::cql::{parse, parse_select};
    pub use crate::cqn::{Column, ColumnKind, Expr, Query, Ref, Select, Source};
    pub use crate::error::{TransformError, TransformResult};
    pub use crate::model::Model;
    pub use crate::search::{DefaultSearchColumns, SearchColumns};
    pub use crate::transform::{transform, Transformer};
}
