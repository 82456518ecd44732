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

//! The engine: ties C1–C8 together into one safe handle over a corpus.
//!
//! `Corpus` owns the two connections spec.md §2/§4.1 call for — a
//! query-facing connection with the virtual tables registered, and an
//! introspection connection opened onto the same named shared-cache
//! in-memory database — plus the schema catalog and the file cache they
//! both sit on top of.

use std::sync::Arc;

use rusqlite::Connection;

use crate::container::{CacheBound, ContainerSource, FileCache};
use crate::error::Result;
use crate::exec::{Executor, ResultRow};
use crate::introspect::{AnalysisOutcome, Introspector};
use crate::populate::{populate, ColumnSpec, IndexSpec, PopulationPlan};
use crate::sample::SamplePredicate;
use crate::schema::Catalog;
use crate::vtab;

static NEXT_DB_ID: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);

fn shared_cache_uri() -> String {
    let id = NEXT_DB_ID.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    format!("file:a3k_corpus_{id}?mode=memory&cache=shared")
}

/// A corpus: a schema catalog backed by a `FileCache` over a
/// `ContainerSource`, exposed through SQLite virtual tables.
pub struct Corpus {
    catalog: Arc<Catalog>,
    cache: Arc<FileCache>,
    query_conn: Connection,
    /// Keeps the shared in-memory database alive: SQLite drops a shared
    /// in-memory database's contents once its last connection closes,
    /// so the `Introspector`'s later connection needs this one to still
    /// be open.
    _anchor_conn: Connection,
    uri: String,
}

impl Corpus {
    /// Open a corpus: register every catalog table as a virtual table
    /// on a fresh named shared-cache in-memory connection.
    pub fn open(
        catalog: Catalog,
        source: Arc<dyn ContainerSource>,
        bound: CacheBound,
    ) -> Result<Self> {
        let catalog = Arc::new(catalog);
        let cache = Arc::new(FileCache::new(source, bound));
        let uri = shared_cache_uri();
        let anchor_conn = Connection::open(&uri)?;
        let query_conn = Connection::open(&uri)?;
        vtab::register(&query_conn, catalog.clone(), cache.clone())?;
        vtab::create_all_tables(&query_conn, &catalog)?;
        Ok(Corpus {
            catalog,
            cache,
            query_conn,
            _anchor_conn: anchor_conn,
            uri,
        })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn file_reads(&self) -> u64 {
        self.cache.file_reads()
    }

    /// C4: analyze `sql`'s table/column reads without running it.
    pub fn analyze(&self, sql: &str) -> Result<AnalysisOutcome> {
        let introspector = Introspector::open(&self.uri, self.catalog.clone(), self.cache.clone())?;
        introspector.analyze(sql)
    }

    /// C6: run `sql` directly against the virtual tables.
    pub fn query(&self, sql: &str, sample: Option<(&SamplePredicate, usize)>) -> Result<Vec<ResultRow>> {
        let executor = Executor::new(&self.query_conn);
        executor.stream(sql, sample)
    }

    /// C6: run `sql` once per container, against materialized temp
    /// copies of the tables it reads. The table set and each table's
    /// needed-column projection both come from C4 (`analyze`) rather
    /// than from the caller, so a partitioned run never pulls a column
    /// `sql` doesn't reference.
    pub fn query_partitioned(&self, sql: &str) -> Result<Vec<ResultRow>> {
        let outcome = self.analyze(sql)?;
        let tables: Vec<(String, Vec<String>)> = outcome
            .tables
            .iter()
            .map(|t| {
                let columns = outcome.columns_of(t).into_iter().map(str::to_string).collect();
                (t.clone(), columns)
            })
            .collect();
        let executor = Executor::new(&self.query_conn);
        executor.partitioned(&self.cache, &tables, sql)
    }

    /// C7 planning (spec.md §4.7 steps 1–3): expand `requested_columns`
    /// and, if `condition` is given, discover the `(table, column)`
    /// pairs it reads by running C4 on the synthetic probing query
    /// `SELECT DISTINCT 1 FROM <all catalog tables> WHERE <condition>`,
    /// then compute the join closure over both.
    pub fn plan_population(
        &self,
        requested_columns: &[ColumnSpec],
        condition: Option<&str>,
    ) -> Result<PopulationPlan> {
        let condition_columns: Vec<(String, String)> = match condition {
            Some(cond) => {
                let probe = format!(
                    "SELECT DISTINCT 1 FROM {} WHERE {}",
                    self.catalog.table_names().join(", "),
                    cond
                );
                let outcome = self.analyze(&probe)?;
                outcome.columns.into_iter().collect()
            }
            None => Vec::new(),
        };
        PopulationPlan::build(&self.catalog, requested_columns, &condition_columns)
    }

    /// C7: populate `output_path` with the requested columns, under an
    /// optional row-selection `condition` and optional indexes. `plan`
    /// should come from `plan_population` so its join closure already
    /// accounts for `condition`'s own column reads.
    pub fn populate(
        &self,
        output_path: &str,
        plan: &PopulationPlan,
        condition: Option<&str>,
        indexes: &[IndexSpec],
    ) -> Result<()> {
        let container_ids = self.cache.source().file_id_iterator();
        populate(
            &self.query_conn,
            &self.catalog,
            &container_ids,
            output_path,
            plan,
            condition,
            indexes,
        )
    }

    /// C8: normalize a populated database at `output_path` in place.
    pub fn normalize(&self, output_path: &str, affiliations: bool, subjects: bool) -> Result<()> {
        let conn = Connection::open(output_path)?;
        if affiliations {
            crate::normalize::normalize_affiliations(&conn)?;
        }
        if subjects {
            crate::normalize::normalize_subjects(&conn)?;
        }
        Ok(())
    }
}

impl Drop for Corpus {
    fn drop(&mut self) {
        tracing::debug!(file_reads = self.cache.file_reads(), "closing corpus");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{write_fixture_corpus, GzJsonSource};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn fixture() -> (tempfile::TempDir, Corpus) {
        let dir = tempdir().unwrap();
        write_fixture_corpus(
            dir.path(),
            &[(
                0,
                "{\"doi\":\"10.1/a\",\"title\":\"On Testing\",\"published_year\":2020,\"authors\":[{\"id\":1,\"given\":\"Ada\",\"family\":\"Lovelace\",\"orcid\":null,\"affiliations\":[\"Analytical Engines Ltd\"]}]}\n",
            )],
        )
        .unwrap();
        let source: Arc<dyn ContainerSource> = Arc::new(GzJsonSource::new(dir.path()));
        let corpus = Corpus::open(Catalog::bibliographic(), source, CacheBound::Count(8)).unwrap();
        (dir, corpus)
    }

    #[test]
    fn query_returns_rows_from_fixture() {
        let (_dir, corpus) = fixture();
        let rows = corpus.query("SELECT doi, title FROM works", None).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn analyze_reports_column_reads() {
        let (_dir, corpus) = fixture();
        let outcome = corpus
            .analyze("SELECT title FROM works WHERE published_year = 2020")
            .unwrap();
        assert!(outcome.tables.contains("works"));
    }
}
