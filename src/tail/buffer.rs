// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

/// Lines received from the stream but not yet delivered.
#[derive(Debug)]
pub(crate) struct LineBuffer {
    lines: Vec<String>,
    limit: usize,
}

impl LineBuffer {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            lines: Vec::new(),
            limit: limit.max(1),
        }
    }

    /// Append a line; returns true once the buffer has reached its limit.
    pub(crate) fn push(&mut self, line: String) -> bool {
        self.lines.push(line);
        self.lines.len() >= self.limit
    }

    /// Drain the buffer as newline-terminated text.
    pub(crate) fn take(&mut self) -> Option<String> {
        if self.lines.is_empty() {
            return None;
        }
        let mut text = self.lines.join("\n");
        text.push('\n');
        self.lines.clear();
        Some(text)
    }

    pub(crate) fn clear(&mut self) {
        self.lines.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.lines.len()
    }
}
