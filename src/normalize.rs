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

//! C8: normalization of populated string-valued relations.
//!
//! Once a database has been populated (C7), `affiliation` and
//! `subject` values are repeated free text sitting directly on
//! `author_affiliations`/`work_subjects`. Normalizing rewrites each
//! into an `(id, name)` lookup table plus the many-to-many bridge
//! tables needed to reach both the owning row and, transitively, the
//! work it belongs to, matching `original_source::normalize_affiliations`/
//! `normalize_subjects`. All operations are idempotent: running them
//! twice against an already-normalized database leaves it unchanged,
//! since the bridge tables are built with `INSERT OR IGNORE` over
//! `DISTINCT` source rows and the lookup tables are rebuilt from
//! scratch each time.

use rusqlite::Connection;

use crate::error::Result;

/// Rewrite `author_affiliations(author_id, name)` into three tables:
/// `affiliation_names(id, name)`, `authors_affiliations(affiliation_id,
/// author_id)`, and `affiliations_works(affiliation_id, work_doi)` — the
/// distinct composition of `authors_affiliations` with `work_authors`
/// on `author_id = work_authors.id`, since an affiliation only
/// references an author, not the work directly.
pub fn normalize_affiliations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "DROP TABLE IF EXISTS affiliation_names;
         CREATE TABLE affiliation_names (
             id INTEGER PRIMARY KEY,
             name TEXT UNIQUE
         );
         INSERT INTO affiliation_names (name)
             SELECT DISTINCT name FROM author_affiliations ORDER BY name;

         DROP TABLE IF EXISTS authors_affiliations;
         CREATE TABLE authors_affiliations (
             affiliation_id INTEGER,
             author_id INTEGER,
             PRIMARY KEY (affiliation_id, author_id)
         );
         INSERT OR IGNORE INTO authors_affiliations (affiliation_id, author_id)
             SELECT an.id, aa.author_id
             FROM author_affiliations aa
             JOIN affiliation_names an ON an.name = aa.name;

         DROP TABLE IF EXISTS affiliations_works;
         CREATE TABLE affiliations_works (
             affiliation_id INTEGER,
             work_doi TEXT,
             PRIMARY KEY (affiliation_id, work_doi)
         );
         INSERT OR IGNORE INTO affiliations_works (affiliation_id, work_doi)
             SELECT DISTINCT aa.affiliation_id, wa.work_doi
             FROM authors_affiliations aa
             JOIN work_authors wa ON wa.id = aa.author_id;",
    )?;
    Ok(())
}

/// Rewrite `work_subjects(work_doi, name)` into `subject_names(id,
/// name)` and `works_subjects(work_doi, subject_id)`.
pub fn normalize_subjects(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "DROP TABLE IF EXISTS subject_names;
         CREATE TABLE subject_names (
             id INTEGER PRIMARY KEY,
             name TEXT UNIQUE
         );
         INSERT INTO subject_names (name)
             SELECT DISTINCT name FROM work_subjects ORDER BY name;

         DROP TABLE IF EXISTS works_subjects;
         CREATE TABLE works_subjects (
             work_doi TEXT,
             subject_id INTEGER,
             PRIMARY KEY (work_doi, subject_id)
         );
         INSERT OR IGNORE INTO works_subjects (work_doi, subject_id)
             SELECT ws.work_doi, sn.id
             FROM work_subjects ws
             JOIN subject_names sn ON sn.name = ws.name;",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE work_authors (id INTEGER, work_doi TEXT);
             INSERT INTO work_authors VALUES (1, '10.1/a'), (2, '10.1/a'), (3, '10.1/b');
             CREATE TABLE author_affiliations (author_id INTEGER, name TEXT);
             INSERT INTO author_affiliations VALUES (1, 'Acme University'), (2, 'Acme University'), (3, 'Other Lab');
             CREATE TABLE work_subjects (work_doi TEXT, name TEXT);
             INSERT INTO work_subjects VALUES ('10.1/a', 'Physics'), ('10.1/b', 'Physics'), ('10.1/c', 'Chemistry');",
        )
        .unwrap();
        conn
    }

    #[test]
    fn affiliations_deduplicate_into_lookup_table() {
        let conn = setup();
        normalize_affiliations(&conn).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM affiliation_names", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 2);
        let bridge_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM authors_affiliations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(bridge_count, 3);
        // Author 1 and 2 share "Acme University" and both cite work 10.1/a,
        // so the composition collapses to a single (affiliation, work) row.
        let works_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM affiliations_works", [], |r| r.get(0))
            .unwrap();
        assert_eq!(works_count, 2);
    }

    #[test]
    fn normalizing_twice_is_idempotent() {
        let conn = setup();
        normalize_subjects(&conn).unwrap();
        normalize_subjects(&conn).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM subject_names", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }
}
