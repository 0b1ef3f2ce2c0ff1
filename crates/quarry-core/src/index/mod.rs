//! Retrieval indexes
//!
//! Dense vector and BM25 keyword indexes. Both reference chunks by id only.

mod keyword;
mod tokenize;
mod vector;

pub use keyword::*;
pub use tokenize::*;
pub use vector::*;
