//! Shared fixture-corpus helper for the integration test binaries.
//!
//! Mirrors `a3k::container::write_fixture_corpus` (which is gated
//! `cfg(test)` inside the library crate and so isn't visible here);
//! kept in lockstep with the `GzJsonSource` record format it feeds.

use std::io::Write;
use std::path::Path;

pub fn write_fixture_corpus(dir: &Path, containers: &[(i64, &str)]) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    for (id, json_lines) in containers {
        let path = dir.join(format!("{id}.jsonl.gz"));
        let file = std::fs::File::create(path)?;
        let mut enc = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        enc.write_all(json_lines.as_bytes())?;
        enc.finish()?;
    }
    Ok(())
}

/// A two-container fixture corpus used across spec.md §8's S1-S6
/// scenarios: container 0 has three `works`, container 1 has two.
/// Ada Lovelace (container 0, work `10.1/a1`) is the only author with
/// an ORCID, so conditions on `work_authors.orcid` isolate exactly her
/// row and her work.
pub fn write_scenario_corpus(dir: &Path) -> std::io::Result<()> {
    let container0 = "\
{\"doi\":\"10.1/a1\",\"title\":\"Alpha Paper\",\"published_year\":2020,\"authors\":[{\"id\":1,\"given\":\"Ada\",\"family\":\"Lovelace\",\"orcid\":\"0000-0001-0002-0003\",\"affiliations\":[\"Analytical Engines Ltd\"]}],\"subjects\":[\"Physics\"],\"funders\":[{\"id\":1,\"name\":\"NSF\",\"doi\":\"10.2/f1\",\"awards\":[\"AW1\"]}]}
{\"doi\":\"10.1/a2\",\"title\":\"Another Alpha\",\"published_year\":2021,\"authors\":[{\"id\":2,\"given\":\"Grace\",\"family\":\"Hopper\",\"orcid\":null,\"affiliations\":[\"Acme University\"]}],\"subjects\":[\"Physics\"]}
{\"doi\":\"10.1/b1\",\"title\":\"Beta Paper\",\"published_year\":2019,\"authors\":[{\"id\":3,\"given\":\"Alan\",\"family\":\"Turing\",\"orcid\":null,\"affiliations\":[\"Acme University\"]}],\"subjects\":[\"Math\"]}
";
    let container1 = "\
{\"doi\":\"10.1/c1\",\"title\":\"Gamma Paper\",\"published_year\":2018,\"authors\":[{\"id\":4,\"given\":\"Rosalind\",\"family\":\"Franklin\",\"orcid\":null,\"affiliations\":[\"Other Lab\"]}]}
{\"doi\":\"10.1/c2\",\"title\":\"Delta Paper\",\"published_year\":2022,\"authors\":[{\"id\":5,\"given\":\"Marie\",\"family\":\"Curie\",\"orcid\":null}]}
";
    write_fixture_corpus(dir, &[(0, container0), (1, container1)])
}
