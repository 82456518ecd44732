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

//! C2: the schema catalog.
//!
//! A pure-data description of the logical tables that make up the
//! bibliographic corpus: their columns, and their parent/primary-key/
//! foreign-key relations. The catalog's *content* (which tables exist
//! for Crossref-shaped data) is a concrete default this crate ships so
//! it is runnable and testable end to end; a deployment backed by a
//! different corpus would supply its own `Catalog`.

use std::collections::HashMap;

use crate::error::{Error, Result};

/// A column's declared SQL storage type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Integer,
    Text,
    Real,
}

impl SqlType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SqlType::Integer => "INTEGER",
            SqlType::Text => "TEXT",
            SqlType::Real => "REAL",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub name: String,
    pub sql_type: SqlType,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        ColumnDef {
            name: name.into(),
            sql_type,
        }
    }
}

/// A logical table: its columns, and optionally its parent table plus the
/// primary/foreign key pair that links it to that parent.
///
/// `container_id` and `rowid` are implicit per spec.md §3 and are not
/// listed in `columns` — they are added by the virtual-table module and
/// by SQLite respectively.
#[derive(Debug, Clone)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub parent: Option<String>,
    pub primary_key: Option<String>,
    pub foreign_key: Option<String>,
}

impl TableDef {
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Emit `CREATE TABLE <prefix><name> (...)` text restricted to the
    /// given subset of columns (C2's schema-emission operation, used by
    /// C7 when creating persistent output tables). `container_id` is
    /// always appended so per-container provenance survives population.
    /// An empty `subset` emits every declared column.
    pub fn create_table_sql(&self, prefix: &str, subset: &[String]) -> String {
        let wanted: Vec<&ColumnDef> = if subset.is_empty() {
            self.columns.iter().collect()
        } else {
            self.columns
                .iter()
                .filter(|c| subset.iter().any(|s| s == &c.name))
                .collect()
        };
        let mut cols: Vec<String> = wanted
            .iter()
            .map(|c| format!("{} {}", c.name, c.sql_type.as_sql()))
            .collect();
        if !cols.iter().any(|c| c.starts_with("container_id ")) {
            cols.push("container_id INTEGER".to_string());
        }
        format!(
            "CREATE TABLE {}{} ({})",
            prefix,
            self.name,
            cols.join(", ")
        )
    }
}

/// Static description of all logical tables and their relations.
pub struct Catalog {
    tables: Vec<TableDef>,
    by_name: HashMap<String, usize>,
}

impl Catalog {
    pub fn new(tables: Vec<TableDef>) -> Self {
        let by_name = tables
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.clone(), i))
            .collect();
        Catalog { tables, by_name }
    }

    pub fn tables(&self) -> &[TableDef] {
        &self.tables
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Result<&TableDef> {
        self.by_name
            .get(name)
            .map(|&i| &self.tables[i])
            .ok_or_else(|| Error::UnknownTable(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// `original_source`'s `crossref` module, restated as data: the
    /// bibliographic schema used by this crate's tests, fixtures, and
    /// CLI default. `works` is the forest root; every other table is a
    /// child or grandchild of it.
    pub fn bibliographic() -> Self {
        use SqlType::*;
        Catalog::new(vec![
            TableDef {
                name: "works".into(),
                columns: vec![
                    ColumnDef::new("doi", Text),
                    ColumnDef::new("title", Text),
                    ColumnDef::new("published_year", Integer),
                ],
                parent: None,
                primary_key: Some("doi".into()),
                foreign_key: None,
            },
            TableDef {
                name: "work_authors".into(),
                columns: vec![
                    ColumnDef::new("id", Integer),
                    ColumnDef::new("work_doi", Text),
                    ColumnDef::new("given", Text),
                    ColumnDef::new("family", Text),
                    ColumnDef::new("orcid", Text),
                ],
                parent: Some("works".into()),
                primary_key: Some("id".into()),
                foreign_key: Some("work_doi".into()),
            },
            TableDef {
                name: "work_references".into(),
                columns: vec![
                    ColumnDef::new("work_doi", Text),
                    ColumnDef::new("doi", Text),
                ],
                parent: Some("works".into()),
                primary_key: None,
                foreign_key: Some("work_doi".into()),
            },
            TableDef {
                name: "work_subjects".into(),
                columns: vec![
                    ColumnDef::new("work_doi", Text),
                    ColumnDef::new("name", Text),
                ],
                parent: Some("works".into()),
                primary_key: None,
                foreign_key: Some("work_doi".into()),
            },
            TableDef {
                name: "author_affiliations".into(),
                columns: vec![
                    ColumnDef::new("author_id", Integer),
                    ColumnDef::new("name", Text),
                ],
                parent: Some("work_authors".into()),
                primary_key: None,
                foreign_key: Some("author_id".into()),
            },
            TableDef {
                name: "work_funders".into(),
                columns: vec![
                    ColumnDef::new("id", Integer),
                    ColumnDef::new("work_doi", Text),
                    ColumnDef::new("name", Text),
                    ColumnDef::new("doi", Text),
                ],
                parent: Some("works".into()),
                primary_key: Some("id".into()),
                foreign_key: Some("work_doi".into()),
            },
            TableDef {
                name: "funder_awards".into(),
                columns: vec![
                    ColumnDef::new("funder_id", Integer),
                    ColumnDef::new("award", Text),
                ],
                parent: Some("work_funders".into()),
                primary_key: None,
                foreign_key: Some("funder_id".into()),
            },
        ])
    }
}

/// Print every table's `CREATE TABLE` text (the out-of-scope
/// "schema-listing utility" of spec.md §1, implemented here as a trivial
/// wrapper over C2's emission operation).
pub fn schema_list(catalog: &Catalog) {
    for table in catalog.tables() {
        println!("{};", table.create_table_sql("", &[]));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bibliographic_catalog_has_works_root() {
        let cat = Catalog::bibliographic();
        let works = cat.get("works").unwrap();
        assert!(works.parent.is_none());
        assert_eq!(works.primary_key.as_deref(), Some("doi"));
    }

    #[test]
    fn unknown_table_errors() {
        let cat = Catalog::bibliographic();
        assert!(cat.get("no_such_table").is_err());
    }

    #[test]
    fn create_table_sql_restricts_columns_and_keeps_container_id() {
        let cat = Catalog::bibliographic();
        let authors = cat.get("work_authors").unwrap();
        let sql = authors.create_table_sql("populated.", &["family".to_string()]);
        assert!(sql.contains("populated.work_authors"));
        assert!(sql.contains("family TEXT"));
        assert!(sql.contains("container_id INTEGER"));
        assert!(!sql.contains("given"));
    }
}
