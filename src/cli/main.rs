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

//! One-shot batch CLI mirroring `original_source`'s `argparse` surface
//! (spec.md §6). Unlike the teacher's `reedline` REPL, there is no
//! interactive mode — every invocation runs one command and exits.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use a3k::container::{CacheBound, ContainerSource, GzJsonSource};
use a3k::populate::{ColumnSpec, IndexSpec};
use a3k::sample;
use a3k::schema::{schema_list, Catalog};
use a3k::Corpus;

#[derive(Parser)]
#[command(name = "a3k", version, about = "SQL-queryable bibliographic metadata over compressed JSON containers")]
struct Args {
    /// Directory containing compressed JSON containers.
    #[arg(short = 'C', long = "crossref-directory")]
    corpus_directory: Option<PathBuf>,

    /// One or more `table.column`/`table.*` specifications (repeatable).
    #[arg(short = 'c', long = "columns")]
    columns: Vec<String>,

    /// Enable a debug category (repeatable): `perf`, `sql`.
    #[arg(short = 'D', long = "debug")]
    debug: Vec<String>,

    /// Output encoding (only "utf-8" is supported).
    #[arg(short = 'E', long = "output-encoding", default_value = "utf-8")]
    output_encoding: String,

    /// Output field separator.
    #[arg(short = 'F', long = "field-separator", default_value = ",")]
    field_separator: String,

    /// index specification `table:col1,col2` (repeatable).
    #[arg(short = 'i', long = "index")]
    index: Vec<String>,

    /// List the schema as `CREATE TABLE` statements and exit.
    #[arg(short = 'L', long = "list-schema")]
    list_schema: bool,

    /// Normalize free-text relations after populating: `affiliations`, `subjects`.
    #[arg(short = 'n', long = "normalize")]
    normalize: Vec<String>,

    /// Maximum cached bytes (mutually exclusive with --cached-file-number).
    #[arg(short = 'B', long = "cached-bytes")]
    cached_bytes: Option<usize>,

    /// Maximum cached container count (mutually exclusive with --cached-bytes).
    #[arg(short = 'N', long = "cached-file-number")]
    cached_file_number: Option<usize>,

    /// ORCID side-loading data path (not implemented; fails fast if given).
    #[arg(short = 'O', long = "orcid-data")]
    orcid_data: Option<PathBuf>,

    /// Output path: a populated database (with -c) or a result file (with -q/-Q).
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Partition query execution per container.
    #[arg(short = 'P', long = "partition")]
    partition: bool,

    /// Populate a database at this path instead of querying directly.
    #[arg(short = 'p', long = "populate-db-path")]
    populate_db_path: Option<PathBuf>,

    /// Read the query from a file.
    #[arg(short = 'Q', long = "query-file")]
    query_file: Option<PathBuf>,

    /// Inline SQL query.
    #[arg(short = 'q', long = "query")]
    query: Option<String>,

    /// Row-selection condition applied while populating.
    #[arg(short = 'r', long = "row-selection")]
    row_selection: Option<String>,

    /// Sampling expression over a `word` free variable (see `sample` mini-language).
    #[arg(short = 's', long = "sample")]
    sample: Option<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> a3k::Result<()> {
    let catalog = Catalog::bibliographic();

    if args.list_schema {
        schema_list(&catalog);
        return Ok(());
    }

    if let Some(path) = &args.orcid_data {
        a3k::orcid::load(path)?;
    }

    let directory = args
        .corpus_directory
        .ok_or(a3k::Error::MissingCorpusDirectory)?;
    let source: Arc<dyn ContainerSource> = Arc::new(GzJsonSource::new(&directory));

    let bound = match (args.cached_bytes, args.cached_file_number) {
        (Some(bytes), None) => CacheBound::Bytes(bytes),
        (None, Some(count)) => CacheBound::Count(count),
        (None, None) => CacheBound::Count(16),
        (Some(_), Some(_)) => {
            return Err(a3k::Error::Other(
                "--cached-bytes and --cached-file-number are mutually exclusive".into(),
            ))
        }
    };

    if !args.normalize.is_empty() && args.populate_db_path.is_none() {
        return Err(a3k::Error::MissingOutputPath);
    }

    let corpus = Corpus::open(catalog, source, bound)?;

    if let Some(populate_path) = &args.populate_db_path {
        let output_path = populate_path
            .to_str()
            .ok_or_else(|| a3k::Error::Other("non-utf8 populate path".into()))?;
        let specs: Vec<ColumnSpec> = args
            .columns
            .iter()
            .map(|c| ColumnSpec::parse(c))
            .collect::<a3k::Result<_>>()?;
        let plan = corpus.plan_population(&specs, args.row_selection.as_deref())?;
        let indexes: Vec<IndexSpec> = args
            .index
            .iter()
            .map(|spec| parse_index_spec(spec))
            .collect::<a3k::Result<_>>()?;
        corpus.populate(output_path, &plan, args.row_selection.as_deref(), &indexes)?;
        corpus.normalize(
            output_path,
            args.normalize.iter().any(|n| n == "affiliations"),
            args.normalize.iter().any(|n| n == "subjects"),
        )?;
        return Ok(());
    }

    let sql = match (&args.query, &args.query_file) {
        (Some(q), _) => q.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)?,
        (None, None) => return Err(a3k::Error::Other("one of -q/--query or -Q/--query-file is required".into())),
    };

    let sample_predicate = args.sample.as_deref().map(sample::parse).transpose()?;

    let rows = if args.partition {
        corpus.query_partitioned(&sql)?
    } else {
        corpus.query(&sql, sample_predicate.as_ref().map(|p| (p, 0)))?
    };

    let opts = a3k::csvout::CsvWriterOptions {
        delimiter: args
            .field_separator
            .as_bytes()
            .first()
            .copied()
            .unwrap_or(b','),
        encoding: args.output_encoding,
    };
    let header: Vec<String> = (0..rows.first().map(|r| r.len()).unwrap_or(0))
        .map(|i| format!("col{i}"))
        .collect();

    match &args.output {
        Some(path) => {
            let file = std::fs::File::create(path)?;
            a3k::csvout::write_rows(file, &header, &rows, &opts)?;
        }
        None => {
            a3k::csvout::write_rows(std::io::stdout(), &header, &rows, &opts)?;
        }
    }
    Ok(())
}

fn parse_index_spec(spec: &str) -> a3k::Result<IndexSpec> {
    let (table, columns) = spec
        .split_once(':')
        .ok_or_else(|| a3k::Error::Other(format!("invalid --index spec '{spec}' (expected table:col1,col2)")))?;
    Ok(IndexSpec {
        table: table.to_string(),
        columns: columns.split(',').map(|s| s.to_string()).collect(),
    })
}
