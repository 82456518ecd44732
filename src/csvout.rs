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

//! Result-set output, honoring `--field-separator` and
//! `--output-encoding` (spec.md §6).

use std::io::Write;

use rusqlite::types::Value;

use crate::error::{Error, Result};
use crate::exec::ResultRow;

pub struct CsvWriterOptions {
    pub delimiter: u8,
    /// Only "utf-8" is supported; anything else fails fast rather than
    /// silently mojibaking the output.
    pub encoding: String,
}

impl Default for CsvWriterOptions {
    fn default() -> Self {
        CsvWriterOptions {
            delimiter: b',',
            encoding: "utf-8".to_string(),
        }
    }
}

pub fn write_rows<W: Write>(
    out: W,
    header: &[String],
    rows: &[ResultRow],
    opts: &CsvWriterOptions,
) -> Result<()> {
    if opts.encoding.to_lowercase() != "utf-8" {
        return Err(Error::Other(format!(
            "unsupported --output-encoding '{}': only utf-8 is supported",
            opts.encoding
        )));
    }
    let mut writer = csv::WriterBuilder::new()
        .delimiter(opts.delimiter)
        .from_writer(out);
    writer.write_record(header)?;
    for row in rows {
        let fields: Vec<String> = row.iter().map(value_to_field).collect();
        writer.write_record(&fields)?;
    }
    writer.flush()?;
    Ok(())
}

fn value_to_field(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Integer(i) => i.to_string(),
        Value::Real(r) => r.to_string(),
        Value::Text(s) => s.clone(),
        Value::Blob(b) => format!("<{} bytes>", b.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_header_and_rows_with_custom_delimiter() {
        let rows = vec![vec![Value::Text("10.1/a".into()), Value::Integer(2020)]];
        let mut buf = Vec::new();
        let opts = CsvWriterOptions {
            delimiter: b'\t',
            encoding: "utf-8".into(),
        };
        write_rows(&mut buf, &["doi".into(), "published_year".into()], &rows, &opts).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("doi\tpublished_year"));
        assert!(text.contains("10.1/a\t2020"));
    }

    #[test]
    fn rejects_non_utf8_encoding() {
        let opts = CsvWriterOptions {
            delimiter: b',',
            encoding: "latin-1".into(),
        };
        let mut buf = Vec::new();
        assert!(write_rows(&mut buf, &[], &[], &opts).is_err());
    }
}
