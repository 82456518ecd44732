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

//! C7: the population planner and executor.
//!
//! The largest, most faithfully ported routine in this crate — a
//! near line-by-line restatement of `original_source`'s
//! `CrossrefMetaData.populate_database`: compute which columns a join
//! closure needs beyond what the caller asked for, materialize each
//! container's slice of every needed table as real temp tables, join
//! them into one `temp_combined`, and insert the caller's requested
//! columns into a persistent output database, per container, so the
//! whole corpus is never joined in one shot.

use std::collections::BTreeSet;

use rusqlite::Connection;

use crate::error::{Error, Result};
use crate::schema::Catalog;
use crate::tsort::topological_order;

/// A single `table.column` or `table.*` request from `--columns`.
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub table: String,
    pub column: Option<String>,
}

impl ColumnSpec {
    pub fn parse(spec: &str) -> Result<Self> {
        let (table, column) = spec
            .split_once('.')
            .ok_or_else(|| Error::InvalidColumnSpec(spec.to_string()))?;
        if table.is_empty() || column.is_empty() {
            return Err(Error::InvalidColumnSpec(spec.to_string()));
        }
        Ok(ColumnSpec {
            table: table.to_string(),
            column: if column == "*" { None } else { Some(column.to_string()) },
        })
    }
}

/// An index to create on a container's materialized slice of a table
/// before joining, e.g. to speed up a population `condition` that
/// filters on a non-key column.
#[derive(Debug, Clone)]
pub struct IndexSpec {
    pub table: String,
    pub columns: Vec<String>,
}

/// The join closure computed from a set of requested output columns
/// plus (if a row-selection condition was given) the columns that
/// condition reads: which tables participate, and (per table) which
/// columns are needed — the caller's requested columns, the
/// condition's own columns, and whatever primary/foreign keys the join
/// chain requires to connect them all, even if the caller never asked
/// for those keys.
pub struct PopulationPlan {
    pub tables_in_order: Vec<String>,
    pub requested_columns: Vec<ColumnSpec>,
    needed_columns: std::collections::HashMap<String, BTreeSet<String>>,
    condition_columns: Vec<(String, String)>,
}

impl PopulationPlan {
    /// Build the plan: start from the tables the caller's column specs
    /// name plus the tables/columns a row-selection condition reads
    /// (`condition_columns`, discovered by running C4 on the synthetic
    /// probing query of spec.md §4.7 step 3), then walk each involved
    /// table's parent chain up to the catalog root, adding every
    /// ancestor's primary key and every descendant's foreign key along
    /// the way (`original_source::set_join_columns`).
    pub fn build(
        catalog: &Catalog,
        requested_columns: &[ColumnSpec],
        condition_columns: &[(String, String)],
    ) -> Result<Self> {
        let mut needed_columns: std::collections::HashMap<String, BTreeSet<String>> =
            std::collections::HashMap::new();
        let mut tables_wanted: BTreeSet<String> = BTreeSet::new();

        for spec in requested_columns {
            let table = catalog.get(&spec.table)?;
            tables_wanted.insert(table.name.clone());
            let entry = needed_columns.entry(table.name.clone()).or_default();
            match &spec.column {
                Some(col) => {
                    table
                        .column(col)
                        .ok_or_else(|| Error::InvalidColumnSpec(format!("{}.{}", spec.table, col)))?;
                    entry.insert(col.clone());
                }
                None => {
                    for c in table.column_names() {
                        entry.insert(c.to_string());
                    }
                }
            }
        }

        for (table_name, column) in condition_columns {
            if !catalog.contains(table_name) {
                // The probing query's authorizer also fires for
                // `container_id`/`rowid`-style pseudo-columns that
                // aren't catalog tables proper; ignore those.
                continue;
            }
            let table = catalog.get(table_name)?;
            if table.column(column).is_none() {
                continue;
            }
            tables_wanted.insert(table.name.clone());
            needed_columns
                .entry(table.name.clone())
                .or_default()
                .insert(column.clone());
        }

        // Walk parent chains, adding join keys as we go.
        let mut frontier: Vec<String> = tables_wanted.iter().cloned().collect();
        while let Some(name) = frontier.pop() {
            let table = catalog.get(&name)?;
            if let Some(fk) = &table.foreign_key {
                needed_columns.entry(name.clone()).or_default().insert(fk.clone());
            }
            if let Some(parent_name) = &table.parent {
                tables_wanted.insert(parent_name.clone());
                let parent = catalog.get(parent_name)?;
                if let Some(pk) = &parent.primary_key {
                    needed_columns
                        .entry(parent_name.clone())
                        .or_default()
                        .insert(pk.clone());
                }
                if !tables_wanted.contains(parent_name) || frontier.contains(parent_name) {
                    continue;
                }
                frontier.push(parent_name.clone());
            }
        }

        let order = topological_order(catalog)
            .into_iter()
            .filter(|t| tables_wanted.contains(t))
            .collect();

        Ok(PopulationPlan {
            tables_in_order: order,
            requested_columns: requested_columns.to_vec(),
            needed_columns,
            condition_columns: condition_columns.to_vec(),
        })
    }

    /// Every `(table, column)` the plan's row-selection condition (if
    /// any) reads, as discovered by C4. Exposed so property tests can
    /// verify join-closure completeness (spec.md §8 property 3).
    pub fn condition_columns(&self) -> &[(String, String)] {
        &self.condition_columns
    }

    /// Every `(table, column)` the plan actually needs materialized,
    /// across all involved tables — the union `needed_columns` covers.
    /// Exposed for the same reason as `condition_columns`.
    pub fn query_columns(&self) -> BTreeSet<(String, String)> {
        self.needed_columns
            .iter()
            .flat_map(|(table, cols)| cols.iter().map(move |c| (table.clone(), c.clone())))
            .collect()
    }

    fn needed(&self, table: &str) -> Vec<String> {
        self.needed_columns
            .get(table)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn requested_for(&self, table: &str) -> Vec<String> {
        self.requested_columns
            .iter()
            .filter(|c| c.table == table)
            .flat_map(|c| match &c.column {
                Some(col) => vec![col.clone()],
                None => self
                    .needed_columns
                    .get(table)
                    .map(|s| s.iter().cloned().collect())
                    .unwrap_or_default(),
            })
            .collect()
    }
}

/// Run the population: create `populated.<table>` tables (idempotent —
/// dropped and recreated), then for each container materialize its
/// slice of every needed table, join them, and insert the caller's
/// requested rows.
pub fn populate(
    conn: &Connection,
    catalog: &Catalog,
    container_ids: &[i64],
    output_path: &str,
    plan: &PopulationPlan,
    condition: Option<&str>,
    indexes: &[IndexSpec],
) -> Result<()> {
    conn.execute_batch(&format!("ATTACH DATABASE '{output_path}' AS populated"))?;

    for table_name in &plan.tables_in_order {
        let table = catalog.get(table_name)?;
        let requested = plan.requested_for(table_name);
        if requested.is_empty() {
            continue;
        }
        conn.execute_batch(&format!("DROP TABLE IF EXISTS populated.{table_name}"))?;
        conn.execute_batch(&table.create_table_sql("populated.", &requested))?;
    }

    for &container_id in container_ids {
        for table_name in &plan.tables_in_order {
            let cols = plan.needed(table_name);
            let select_cols = if cols.is_empty() {
                "container_id".to_string()
            } else {
                format!("{}, container_id", cols.join(", "))
            };
            conn.execute_batch(&format!(
                "CREATE TEMP TABLE temp_{table_name} AS SELECT {select_cols} FROM {table_name} WHERE container_id = {container_id}"
            ))?;
        }
        for idx in indexes {
            if plan.tables_in_order.contains(&idx.table) {
                conn.execute_batch(&format!(
                    "CREATE INDEX idx_temp_{}_{} ON temp_{} ({})",
                    idx.table,
                    idx.columns.join("_"),
                    idx.table,
                    idx.columns.join(", ")
                ))?;
            }
        }

        build_temp_combined(conn, catalog, plan)?;

        let root_table = plan
            .tables_in_order
            .first()
            .ok_or_else(|| Error::Other("population plan has no involved tables".into()))?;
        let where_clause = condition
            .map(|c| format!(" WHERE {}", rewrite_condition(c, &plan.condition_columns)))
            .unwrap_or_default();
        for table_name in &plan.tables_in_order {
            let requested = plan.requested_for(table_name);
            if requested.is_empty() {
                continue;
            }
            let select_list: Vec<String> = requested
                .iter()
                .map(|c| format!("{table_name}_{c} AS {c}"))
                .collect();
            conn.execute_batch(&format!(
                "INSERT INTO populated.{table_name} ({cols}) SELECT DISTINCT {select}, {root_table}_container_id AS container_id FROM temp_combined{where_clause}",
                cols = requested.join(", "),
                select = select_list.join(", "),
            ))?;
        }

        for table_name in &plan.tables_in_order {
            conn.execute_batch(&format!("DROP TABLE IF EXISTS temp_{table_name}"))?;
        }
        conn.execute_batch("DROP TABLE IF EXISTS temp_combined")?;
    }

    conn.execute_batch("DETACH DATABASE populated")?;
    Ok(())
}

/// Build `temp_combined` as a left-join chain over the plan's tables in
/// topological order, aliasing every selected column as
/// `<table>_<column>` to keep names unambiguous across the join
/// (`original_source::joined_tables`).
fn build_temp_combined(conn: &Connection, catalog: &Catalog, plan: &PopulationPlan) -> Result<()> {
    let mut select_parts = Vec::new();
    let mut from_clause = String::new();
    for (i, table_name) in plan.tables_in_order.iter().enumerate() {
        let table = catalog.get(table_name)?;
        for col in plan.needed(table_name) {
            select_parts.push(format!("temp_{table_name}.{col} AS {table_name}_{col}"));
        }
        select_parts.push(format!(
            "temp_{table_name}.container_id AS {table_name}_container_id"
        ));
        if i == 0 {
            from_clause.push_str(&format!("temp_{table_name}"));
        } else if let (Some(parent), Some(fk)) = (&table.parent, &table.foreign_key) {
            let parent_table = catalog.get(parent)?;
            let pk = parent_table
                .primary_key
                .as_ref()
                .ok_or_else(|| Error::Other(format!("table '{parent}' has no primary key to join on")))?;
            from_clause.push_str(&format!(
                " LEFT JOIN temp_{table_name} ON temp_{parent}.{pk} = temp_{table_name}.{fk}"
            ));
        }
    }
    conn.execute_batch(&format!(
        "CREATE TEMP TABLE temp_combined AS SELECT {} FROM {}",
        select_parts.join(", "),
        from_clause
    ))?;
    Ok(())
}

/// Rewrite every `table.column` reference in `condition` that names one
/// of `pairs` into `table_column`, matching `temp_combined`'s column
/// aliasing. A user's row-selection condition is written against the
/// logical schema (`work_authors.orcid = '...'`), but `temp_combined`
/// has no table named `work_authors` to qualify against — only a flat
/// `work_authors_orcid` column — so the qualified form must be rewritten
/// before the condition is spliced into the final `INSERT ... WHERE`.
fn rewrite_condition(condition: &str, pairs: &[(String, String)]) -> String {
    let chars: Vec<char> = condition.chars().collect();
    let mut out = String::with_capacity(condition.len());
    let mut i = 0;
    let is_ident = |c: char| c.is_alphanumeric() || c == '_';
    while i < chars.len() {
        if is_ident(chars[i]) {
            let start = i;
            while i < chars.len() && is_ident(chars[i]) {
                i += 1;
            }
            let word1: String = chars[start..i].iter().collect();
            if i < chars.len() && chars[i] == '.' {
                let mut j = i + 1;
                let start2 = j;
                while j < chars.len() && is_ident(chars[j]) {
                    j += 1;
                }
                let word2: String = chars[start2..j].iter().collect();
                if !word2.is_empty() && pairs.iter().any(|(t, c)| t == &word1 && c == &word2) {
                    out.push_str(&word1);
                    out.push('_');
                    out.push_str(&word2);
                    i = j;
                    continue;
                }
            }
            out.push_str(&word1);
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_table_dot_column() {
        let spec = ColumnSpec::parse("works.title").unwrap();
        assert_eq!(spec.table, "works");
        assert_eq!(spec.column.as_deref(), Some("title"));
    }

    #[test]
    fn parses_wildcard() {
        let spec = ColumnSpec::parse("works.*").unwrap();
        assert_eq!(spec.column, None);
    }

    #[test]
    fn rejects_missing_dot() {
        assert!(ColumnSpec::parse("works").is_err());
    }

    #[test]
    fn plan_includes_ancestor_primary_key() {
        let catalog = Catalog::bibliographic();
        let specs = vec![ColumnSpec::parse("work_authors.family").unwrap()];
        let plan = PopulationPlan::build(&catalog, &specs, &[]).unwrap();
        assert!(plan.tables_in_order.contains(&"works".to_string()));
        assert!(plan.tables_in_order.contains(&"work_authors".to_string()));
        let works_idx = plan.tables_in_order.iter().position(|t| t == "works").unwrap();
        let authors_idx = plan
            .tables_in_order
            .iter()
            .position(|t| t == "work_authors")
            .unwrap();
        assert!(works_idx < authors_idx);
    }

    #[test]
    fn condition_column_pulls_in_table_and_its_join_keys() {
        let catalog = Catalog::bibliographic();
        let specs = vec![ColumnSpec::parse("works.doi").unwrap()];
        let condition_columns = vec![("work_authors".to_string(), "orcid".to_string())];
        let plan = PopulationPlan::build(&catalog, &specs, &condition_columns).unwrap();
        assert!(plan.tables_in_order.contains(&"work_authors".to_string()));
        let columns = plan.query_columns();
        assert!(columns.contains(&("work_authors".to_string(), "orcid".to_string())));
        assert!(columns.contains(&("work_authors".to_string(), "work_doi".to_string())));
        assert!(columns.contains(&("works".to_string(), "doi".to_string())));
    }

    #[test]
    fn rewrite_condition_replaces_known_pairs_only() {
        let pairs = vec![("work_authors".to_string(), "orcid".to_string())];
        let rewritten = rewrite_condition("work_authors.orcid = '0000-0001-0002-0003'", &pairs);
        assert_eq!(rewritten, "work_authors_orcid = '0000-0001-0002-0003'");
        // A dotted reference not in `pairs` is left untouched.
        let untouched = rewrite_condition("works.title LIKE 'A%'", &pairs);
        assert_eq!(untouched, "works.title LIKE 'A%'");
    }
}
