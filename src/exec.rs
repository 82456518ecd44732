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

//! C6: query execution, direct and partitioned.
//!
//! A query against the virtual tables directly (`stream`) works for
//! single-table and small queries, but SQLite's planner has no notion
//! that every virtual table is implicitly partitioned by
//! `container_id`; a join across two large tables gets planned as if
//! both were arbitrarily large relations, even though in practice each
//! `container_id` slice joins cheaply against its own siblings.
//! `partitioned` works around this the way `original_source::query`
//! does: for each container, copy that container's rows into real
//! temp tables and run the query against those instead.

use std::collections::HashMap;

use rusqlite::types::Value;
use rusqlite::Connection;

use crate::container::FileCache;
use crate::error::Result;
use crate::sample::SamplePredicate;

/// One result row, column values in `SELECT` order.
pub type ResultRow = Vec<Value>;

pub struct Executor<'conn> {
    conn: &'conn Connection,
}

impl<'conn> Executor<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Executor { conn }
    }

    /// Run `sql` once against the virtual tables as SQLite sees them,
    /// optionally post-filtering rows with a sample predicate applied
    /// to the value in `sample_column` (0-based index into the result
    /// row). See DESIGN.md for why sampling is a post-filter here
    /// rather than something `populate` understands.
    pub fn stream(
        &self,
        sql: &str,
        sample: Option<(&SamplePredicate, usize)>,
    ) -> Result<Vec<ResultRow>> {
        let mut stmt = self.conn.prepare(sql)?;
        let ncols = stmt.column_count();
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let values: Vec<Value> = (0..ncols)
                .map(|i| row.get::<_, Value>(i))
                .collect::<rusqlite::Result<_>>()?;
            if let Some((predicate, col)) = sample {
                let word = match &values[col] {
                    Value::Text(s) => s.clone(),
                    other => format!("{other:?}"),
                };
                if !predicate.matches(&word) {
                    continue;
                }
            }
            out.push(values);
        }
        Ok(out)
    }

    /// Run `sql` once per container, scoped to that container's slice
    /// of `tables`, materialized into `temp_<table>` tables first. `sql`
    /// must refer to tables by their bare catalog names; this rewrites
    /// those references to the per-container temp copies.
    ///
    /// `tables` carries, per referenced table, exactly the columns C4
    /// found `sql` reading (from `AnalysisOutcome::columns_of`) — the
    /// caller is expected to have run `analyze` first rather than handing
    /// this the full catalog table list with an implicit `SELECT *`.
    pub fn partitioned(
        &self,
        cache: &FileCache,
        tables: &[(String, Vec<String>)],
        sql: &str,
    ) -> Result<Vec<ResultRow>> {
        let names: Vec<&str> = tables.iter().map(|(t, _)| t.as_str()).collect();
        let mut all_rows = Vec::new();
        for container_id in cache.source().file_id_iterator() {
            self.materialize_container(tables, container_id)?;
            let rewritten = rewrite_table_refs(sql, &names);
            let mut stmt = self.conn.prepare(&rewritten)?;
            let ncols = stmt.column_count();
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let values: Vec<Value> = (0..ncols)
                    .map(|i| row.get::<_, Value>(i))
                    .collect::<rusqlite::Result<_>>()?;
                all_rows.push(values);
            }
            drop(stmt);
            self.drop_temp_tables(&names)?;
        }
        Ok(all_rows)
    }

    fn materialize_container(&self, tables: &[(String, Vec<String>)], container_id: i64) -> Result<()> {
        for (table, columns) in tables {
            // A query that only aggregates a table (`count(*)`) reads no
            // named column from it; `container_id` is always present and
            // keeps the `CREATE TABLE AS SELECT` from needing a dummy.
            let projection = if columns.is_empty() {
                "container_id".to_string()
            } else {
                columns.join(", ")
            };
            self.conn.execute_batch(&format!(
                "CREATE TEMP TABLE temp_{table} AS SELECT {projection} FROM {table} WHERE container_id = {container_id}"
            ))?;
        }
        Ok(())
    }

    fn drop_temp_tables(&self, tables: &[&str]) -> Result<()> {
        for table in tables {
            self.conn
                .execute_batch(&format!("DROP TABLE IF EXISTS temp_{table}"))?;
        }
        Ok(())
    }
}

/// Replace whole-word references to any name in `tables` with its
/// `temp_<name>` counterpart. Deliberately simple (word-boundary
/// substring replace) rather than a full SQL rewrite — adequate for the
/// queries this crate generates internally for `populate`, not meant as
/// a general-purpose SQL rewriter. Quote-aware: text inside `'...'`
/// string literals is copied through untouched, so a literal that
/// happens to spell a table name as a whole word (`WHERE name = 'works'`)
/// is never rewritten.
fn rewrite_table_refs(sql: &str, tables: &[&str]) -> String {
    let mut map = HashMap::new();
    for &t in tables {
        map.insert(t, format!("temp_{t}"));
    }
    let mut out = String::with_capacity(sql.len());
    let mut word = String::new();
    let flush = |word: &mut String, out: &mut String, map: &HashMap<&str, String>| {
        if let Some(replacement) = map.get(word.as_str()) {
            out.push_str(replacement);
        } else {
            out.push_str(word);
        }
        word.clear();
    };
    let mut chars = sql.chars().peekable();
    let mut in_string = false;
    while let Some(ch) = chars.next() {
        if in_string {
            out.push(ch);
            if ch == '\'' {
                // SQL escapes an embedded quote as `''`; a doubled quote
                // stays inside the literal rather than closing it.
                if chars.peek() == Some(&'\'') {
                    out.push(chars.next().unwrap());
                } else {
                    in_string = false;
                }
            }
            continue;
        }
        if ch == '\'' {
            flush(&mut word, &mut out, &map);
            in_string = true;
            out.push(ch);
        } else if ch.is_alphanumeric() || ch == '_' {
            word.push(ch);
        } else {
            flush(&mut word, &mut out, &map);
            out.push(ch);
        }
    }
    flush(&mut word, &mut out, &map);
    out
}
