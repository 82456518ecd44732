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

//! A small stopwatch for the `--debug perf` category, mirroring
//! `original_source::Perf`: report elapsed wall time for a named phase
//! via `tracing` instead of printing to stderr directly.

use std::time::Instant;

pub struct Perf {
    label: &'static str,
    start: Instant,
}

impl Perf {
    pub fn start(label: &'static str) -> Self {
        tracing::debug!(phase = label, "starting");
        Perf {
            label,
            start: Instant::now(),
        }
    }
}

impl Drop for Perf {
    fn drop(&mut self) {
        tracing::debug!(phase = self.label, elapsed_ms = self.start.elapsed().as_millis() as u64, "finished");
    }
}
