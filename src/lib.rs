//   Copyright (c) 2024-2026 Anton Kundenko <singaraiona@gmail.com>
//   All rights reserved.
//
//   Permission is hereby granted, free of charge, to any person obtaining a copy
//   of this software and associated documentation files (the "Software"), to deal
//   in the Software without restriction, including without limitation the rights
//   to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
//   copies of the Software, and to permit persons to whom the Software is
//   furnished to do so, subject to the following conditions:
//
//   The above copyright notice and this permission notice shall be included in all
//   copies or substantial portions of the Software.
//
//   THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
//   IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
//   FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
//   AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
//   LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
//   OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
//   SOFTWARE.

//! SQL-queryable access to a corpus of bibliographic metadata stored as
//! compressed JSON containers.
//!
//! The corpus is exposed as a handful of SQLite virtual tables
//! (`schema`, `vtab`), each backed by an LRU cache over decoded
//! containers (`container`). Queries run either directly against the
//! virtual tables (`exec::Executor::stream`) or partitioned per
//! container to avoid cross-container join pessimism
//! (`exec::Executor::partitioned`). `populate` and `normalize`
//! implement the two post-processing passes that turn ad hoc query
//! results into a standalone, indexed, normalized SQLite database.

pub mod container;
pub mod csvout;
pub mod engine;
pub mod error;
pub mod exec;
pub mod introspect;
pub mod normalize;
pub mod orcid;
pub mod perf;
pub mod populate;
pub mod sample;
pub mod schema;
pub mod tsort;
pub mod vtab;

pub use engine::Corpus;
pub use error::{Error, Result};
