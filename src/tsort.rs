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

//! C5: topological ordering of schema tables, parent before child.
//!
//! `original_source` reaches for a third-party `tsort` package for this;
//! here it is folded into the core since the catalog's parent/child
//! forest is small and already fully known (spec.md's component table
//! lists this as one of the crate's own pieces, not a borrowed one).

use std::collections::{HashMap, HashSet};

use crate::schema::Catalog;

/// Order every table in `catalog` so that a table always appears after
/// its parent. Ties (tables with no ordering constraint between them)
/// break lexicographically by table name, so the result is
/// deterministic across runs.
pub fn topological_order(catalog: &Catalog) -> Vec<String> {
    let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut indegree: HashMap<&str, usize> = HashMap::new();
    for table in catalog.tables() {
        indegree.entry(&table.name).or_insert(0);
        if let Some(parent) = &table.parent {
            *indegree.entry(&table.name).or_insert(0) += 1;
            children.entry(parent.as_str()).or_default().push(&table.name);
        }
    }

    let mut ready: Vec<&str> = indegree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(&name, _)| name)
        .collect();
    ready.sort_unstable();

    let mut order = Vec::with_capacity(catalog.tables().len());
    let mut visited: HashSet<&str> = HashSet::new();
    let mut frontier = ready;
    while let Some(name) = frontier.first().copied() {
        frontier.remove(0);
        if !visited.insert(name) {
            continue;
        }
        order.push(name.to_string());
        let mut newly_ready = Vec::new();
        if let Some(kids) = children.get(name) {
            for &kid in kids {
                let deg = indegree.get_mut(kid).unwrap();
                *deg -= 1;
                if *deg == 0 {
                    newly_ready.push(kid);
                }
            }
        }
        newly_ready.sort_unstable();
        frontier.extend(newly_ready);
        frontier.sort_unstable();
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parents_precede_children() {
        let catalog = Catalog::bibliographic();
        let order = topological_order(&catalog);
        let pos = |name: &str| order.iter().position(|n| n == name).unwrap();
        assert!(pos("works") < pos("work_authors"));
        assert!(pos("work_authors") < pos("author_affiliations"));
        assert!(pos("works") < pos("work_funders"));
        assert!(pos("work_funders") < pos("funder_awards"));
    }

    #[test]
    fn order_is_deterministic() {
        let catalog = Catalog::bibliographic();
        let a = topological_order(&catalog);
        let b = topological_order(&catalog);
        assert_eq!(a, b);
    }
}
