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

//! C4: static introspection of a query's table/column reads, without
//! running it.
//!
//! `original_source` installs an `apsw` authorizer to record every
//! `(table, column)` pair a query touches, and an exec-trace callback
//! that aborts execution so the probing query never actually produces
//! rows (the abort shows up there as a caught `apsw.ExecTraceAbort`).
//! SQLite's authorizer fires during `sqlite3_prepare`, before a single
//! row is fetched, so the abort-via-exception dance is unnecessary here:
//! this module prepares the statement, lets the authorizer observe it,
//! and finalizes the statement without ever calling `step`. Per spec.md
//! §9's re-architecture note, the outcome is returned as a plain value
//! rather than propagated as a control-flow exception.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;
use std::sync::Arc;

use rusqlite::{AuthAction, Authorization, Connection};

use crate::container::FileCache;
use crate::error::Result;
use crate::schema::Catalog;

/// The result of analyzing a query's table/column reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisOutcome {
    /// Every `(table, column)` pair SQLite's authorizer reported as a
    /// read while compiling the statement.
    pub columns: BTreeSet<(String, String)>,
    /// Every table named in a read, regardless of which columns.
    pub tables: BTreeSet<String>,
}

impl AnalysisOutcome {
    pub fn columns_of(&self, table: &str) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|(t, _)| t == table)
            .map(|(_, c)| c.as_str())
            .collect()
    }
}

/// A connection dedicated to introspecting queries against the same
/// virtual-table namespace a query connection sees, via a named
/// shared-cache in-memory database (spec.md §2/§4.1).
pub struct Introspector {
    conn: Connection,
}

impl Introspector {
    /// `shared_cache_uri` must be the same `file:<name>?mode=memory&cache=shared`
    /// URI the query connection was opened with, so both connections
    /// see the same set of `CREATE VIRTUAL TABLE` registrations in
    /// `sqlite_master`. A module registration is per-connection state,
    /// not part of the shared schema, though: this connection must
    /// register `corpus_source` itself (with the same catalog/cache the
    /// query connection uses) before SQLite can resolve those virtual
    /// tables while preparing a statement against them here.
    pub fn open(shared_cache_uri: &str, catalog: Arc<Catalog>, cache: Arc<FileCache>) -> Result<Self> {
        let conn = Connection::open(shared_cache_uri)?;
        crate::vtab::register(&conn, catalog, cache)?;
        Ok(Introspector { conn })
    }

    /// Compile `sql` far enough for SQLite's authorizer to enumerate its
    /// table/column reads, then discard the prepared statement without
    /// executing it.
    pub fn analyze(&self, sql: &str) -> Result<AnalysisOutcome> {
        let outcome = Rc::new(RefCell::new(AnalysisOutcome::default()));
        {
            let outcome = outcome.clone();
            self.conn.authorizer(Some(move |ctx: rusqlite::hooks::AuthContext<'_>| {
                if let AuthAction::Read { table_name, column_name, .. } = ctx.action {
                    let mut o = outcome.borrow_mut();
                    o.tables.insert(table_name.to_string());
                    if !column_name.is_empty() {
                        o.columns.insert((table_name.to_string(), column_name.to_string()));
                    }
                }
                Authorization::Allow
            }));
        }
        let prepare_result = self.conn.prepare(sql);
        self.conn.authorizer::<fn(rusqlite::hooks::AuthContext<'_>) -> Authorization>(None);
        // Dropping the prepared statement (rather than stepping it) is
        // the abort: no row is ever produced.
        drop(prepare_result?);
        Ok(Rc::try_unwrap(outcome)
            .map(RefCell::into_inner)
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::CacheBound;
    use crate::schema::Catalog;

    struct EmptySource;
    impl crate::container::ContainerSource for EmptySource {
        fn file_id_iterator(&self) -> Vec<i64> {
            vec![]
        }
        fn records(&self, _table: &str, _container_id: i64) -> Result<Vec<crate::container::Row>> {
            Ok(vec![])
        }
    }

    fn empty_cache() -> Arc<FileCache> {
        Arc::new(FileCache::new(Arc::new(EmptySource), CacheBound::Count(1)))
    }

    #[test]
    fn analyze_records_table_and_columns_without_executing() {
        let uri = "file:introspect_test?mode=memory&cache=shared";
        let conn = Connection::open(uri).unwrap();
        conn.execute_batch("CREATE TABLE works (doi TEXT, title TEXT, published_year INTEGER)")
            .unwrap();
        let introspector = Introspector::open(uri, Arc::new(Catalog::bibliographic()), empty_cache()).unwrap();
        let outcome = introspector
            .analyze("SELECT doi, title FROM works WHERE published_year = 2020")
            .unwrap();
        assert!(outcome.tables.contains("works"));
        assert!(outcome.columns.contains(&("works".to_string(), "doi".to_string())));
        assert!(outcome.columns.contains(&("works".to_string(), "title".to_string())));
    }
}
