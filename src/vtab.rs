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

//! C3: the virtual-table module that exposes the corpus to SQL.
//!
//! One SQLite module, `corpus_source`, backs every logical table named
//! in the schema catalog (`CREATE VIRTUAL TABLE <name> USING
//! corpus_source()`, mirroring `original_source`'s single
//! `vdb.createmodule("filesource", data_source)` shared across every
//! `CREATE VIRTUAL TABLE ... USING filesource()` statement). `BestIndex`
//! pushes down a `container_id = ?` equality and, at most, one further
//! column equality — enough to cover primary/foreign-key point lookups
//! (spec.md §4.3) without special-casing which column it is.

use std::os::raw::c_int;
use std::sync::Arc;

use rusqlite::types::Value;
use rusqlite::vtab::{
    Context, CreateVTab, IndexInfo, VTab, VTabConnection, VTabCursor, VTabKind, Values,
};
use rusqlite::Error as SqliteError;

use crate::container::FileCache;
use crate::schema::{Catalog, TableDef};

/// Shared state handed to every table instance the module creates:
/// the catalog (to resolve a table's column layout from its name) and
/// the file cache (to fetch decoded rows).
pub struct CorpusAux {
    pub catalog: Arc<Catalog>,
    pub cache: Arc<FileCache>,
}

#[repr(C)]
pub struct CorpusTab {
    /// Must be the first field; SQLite's vtab machinery casts through it.
    base: rusqlite::vtab::sqlite3_vtab,
    table: TableDef,
    aux: Arc<CorpusAux>,
}

unsafe impl<'vtab> VTab<'vtab> for CorpusTab {
    type Aux = Arc<CorpusAux>;
    type Cursor = CorpusCursor<'vtab>;

    fn connect(
        _db: &mut VTabConnection,
        aux: Option<&Arc<CorpusAux>>,
        args: &[&[u8]],
    ) -> rusqlite::Result<(String, Self)> {
        let aux = aux
            .cloned()
            .ok_or_else(|| SqliteError::ModuleError("corpus_source requires aux data".into()))?;
        // args[0] = module name, args[1] = database name, args[2] = the
        // table name given in `CREATE VIRTUAL TABLE <name> USING corpus_source()`.
        let table_name = std::str::from_utf8(args[2])
            .map_err(|e| SqliteError::ModuleError(e.to_string()))?
            .trim_matches('"')
            .to_string();
        let table = aux
            .catalog
            .get(&table_name)
            .map_err(|e| SqliteError::ModuleError(e.to_string()))?
            .clone();
        let mut cols: Vec<String> = table
            .columns
            .iter()
            .map(|c| format!("{} {}", c.name, c.sql_type.as_sql()))
            .collect();
        cols.push("container_id INTEGER".to_string());
        let sql = format!("CREATE TABLE x({})", cols.join(", "));
        let vtab = CorpusTab {
            base: rusqlite::vtab::sqlite3_vtab::default(),
            table,
            aux,
        };
        Ok((sql, vtab))
    }

    fn best_index(&self, info: &mut IndexInfo) -> rusqlite::Result<()> {
        // Column index layout: 0..columns.len() are declared columns,
        // columns.len() is container_id.
        let container_id_col = self.table.columns.len() as i32;
        let mut argv = 1;
        let mut used_container_id = false;
        let mut extra_col: Option<i32> = None;
        for (i, constraint) in info.constraints().iter().enumerate() {
            if !constraint.is_usable() || constraint.operator() != rusqlite::vtab::IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_EQ {
                continue;
            }
            if constraint.column() == container_id_col && !used_container_id {
                info.constraint_usage(i).set_argv_index(argv);
                info.constraint_usage(i).set_omit(true);
                argv += 1;
                used_container_id = true;
            } else if constraint.column() != container_id_col && extra_col.is_none() {
                info.constraint_usage(i).set_argv_index(argv);
                info.constraint_usage(i).set_omit(false);
                argv += 1;
                extra_col = Some(constraint.column());
            }
        }
        // Record exactly which column index the accepted "extra" equality
        // constraint binds, so `filter` doesn't have to guess it back from
        // the bound value's runtime type — two columns of the same SQL
        // type (e.g. `work_authors.family`/`work_authors.work_doi`, both
        // TEXT) would otherwise be indistinguishable there.
        if let Some(col) = extra_col {
            info.set_idx_str(&col.to_string());
        }
        info.set_idx_num(if used_container_id { 1 } else { 0 } | if extra_col.is_some() { 2 } else { 0 });
        info.set_estimated_cost(if used_container_id { 10.0 } else { 1_000_000.0 });
        Ok(())
    }

    fn open(&'vtab mut self) -> rusqlite::Result<CorpusCursor<'vtab>> {
        Ok(CorpusCursor::new(&self.table, &self.aux))
    }
}

impl CreateVTab<'_> for CorpusTab {
    const KIND: VTabKind = VTabKind::Default;
}

pub struct CorpusCursor<'vtab> {
    table: &'vtab TableDef,
    aux: &'vtab Arc<CorpusAux>,
    containers: Vec<i64>,
    container_idx: usize,
    rows: Vec<Vec<Value>>,
    row_idx: usize,
    extra_filter: Option<(usize, Value)>,
    rowid: i64,
    eof: bool,
}

impl<'vtab> CorpusCursor<'vtab> {
    fn new(table: &'vtab TableDef, aux: &'vtab Arc<CorpusAux>) -> Self {
        CorpusCursor {
            table,
            aux,
            containers: Vec::new(),
            container_idx: 0,
            rows: Vec::new(),
            row_idx: 0,
            extra_filter: None,
            rowid: 0,
            eof: false,
        }
    }

    fn load_current_container(&mut self) -> rusqlite::Result<()> {
        loop {
            if self.container_idx >= self.containers.len() {
                self.eof = true;
                return Ok(());
            }
            let container_id = self.containers[self.container_idx];
            let decoded = self
                .aux
                .cache
                .get(container_id)
                .map_err(|e| SqliteError::ModuleError(e.to_string()))?;
            let mut rows = decoded
                .tables
                .get(&self.table.name)
                .cloned()
                .unwrap_or_default();
            if let Some((col, ref want)) = self.extra_filter {
                rows.retain(|r| value_eq(&r[col], want));
            }
            self.rows = rows;
            self.row_idx = 0;
            if self.rows.is_empty() {
                self.container_idx += 1;
                continue;
            }
            return Ok(());
        }
    }

    fn advance_within_container(&mut self) -> rusqlite::Result<()> {
        self.row_idx += 1;
        if self.row_idx >= self.rows.len() {
            self.container_idx += 1;
            self.load_current_container()?;
        }
        Ok(())
    }
}

unsafe impl VTabCursor for CorpusCursor<'_> {
    fn filter(&mut self, idx_num: c_int, idx_str: Option<&str>, args: &Values<'_>) -> rusqlite::Result<()> {
        let mut values = args.iter();
        let mut container_filter = None;
        if idx_num & 1 != 0 {
            if let Some(v) = values.next() {
                container_filter = v.as_i64().ok();
            }
        }
        self.extra_filter = None;
        if idx_num & 2 != 0 {
            if let Some(v) = values.next() {
                let value = sql_value_to_rusqlite(&v)?;
                // `best_index` encoded the accepted constraint's column
                // index verbatim in `idx_str`; decode it rather than
                // guessing from the bound value's runtime type, which is
                // ambiguous whenever a table has more than one column of
                // the same SQL type.
                let col = idx_str
                    .and_then(|s| s.parse::<usize>().ok())
                    .filter(|&c| c < self.table.columns.len())
                    .ok_or_else(|| {
                        SqliteError::ModuleError(
                            "corpus_source: missing idx_str for pushed-down equality".into(),
                        )
                    })?;
                self.extra_filter = Some((col, value));
            }
        }
        self.containers = match container_filter {
            Some(id) => vec![id],
            None => self.aux.cache.source().file_id_iterator(),
        };
        self.container_idx = 0;
        self.rowid = 0;
        self.eof = false;
        self.load_current_container()
    }

    fn next(&mut self) -> rusqlite::Result<()> {
        self.rowid += 1;
        self.advance_within_container()
    }

    fn eof(&self) -> bool {
        self.eof
    }

    fn column(&self, ctx: &mut Context, col: c_int) -> rusqlite::Result<()> {
        let col = col as usize;
        if col == self.table.columns.len() {
            return ctx.set_result(&self.containers[self.container_idx]);
        }
        let row = &self.rows[self.row_idx];
        match &row[col] {
            Value::Null => ctx.set_result(&Option::<i64>::None),
            Value::Integer(i) => ctx.set_result(i),
            Value::Real(r) => ctx.set_result(r),
            Value::Text(s) => ctx.set_result(s),
            Value::Blob(b) => ctx.set_result(b),
        }
    }

    fn rowid(&self) -> rusqlite::Result<i64> {
        Ok(self.rowid)
    }
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => x == y,
        (Value::Real(x), Value::Real(y)) => x == y,
        (Value::Text(x), Value::Text(y)) => x == y,
        (Value::Blob(x), Value::Blob(y)) => x == y,
        (Value::Null, Value::Null) => true,
        _ => false,
    }
}

fn sql_value_to_rusqlite(v: &rusqlite::types::ValueRef<'_>) -> rusqlite::Result<Value> {
    Ok(match v {
        rusqlite::types::ValueRef::Null => Value::Null,
        rusqlite::types::ValueRef::Integer(i) => Value::Integer(*i),
        rusqlite::types::ValueRef::Real(r) => Value::Real(*r),
        rusqlite::types::ValueRef::Text(t) => {
            Value::Text(String::from_utf8_lossy(t).into_owned())
        }
        rusqlite::types::ValueRef::Blob(b) => Value::Blob(b.to_vec()),
    })
}

/// Register the `corpus_source` module on `conn`, backed by `catalog`
/// and `cache`. Every `CREATE VIRTUAL TABLE <name> USING corpus_source()`
/// issued afterwards resolves `<name>` against `catalog`.
pub fn register(conn: &rusqlite::Connection, catalog: Arc<Catalog>, cache: Arc<FileCache>) -> rusqlite::Result<()> {
    let module = rusqlite::vtab::read_only_module::<CorpusTab>();
    conn.create_module("corpus_source", module, Some(Arc::new(CorpusAux { catalog, cache })))
}

/// Issue `CREATE VIRTUAL TABLE <name> USING corpus_source()` for every
/// table in `catalog`.
pub fn create_all_tables(conn: &rusqlite::Connection, catalog: &Catalog) -> rusqlite::Result<()> {
    for table in catalog.tables() {
        conn.execute_batch(&format!(
            "CREATE VIRTUAL TABLE {0} USING corpus_source()",
            table.name
        ))?;
    }
    Ok(())
}
