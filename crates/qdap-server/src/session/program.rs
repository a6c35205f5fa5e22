//! Client conventions and the launched program.

use std::path::{Path, PathBuf};

/// Client description negotiated in `initialize`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub client_id: String,
    pub client_name: String,
    pub path_format: String,
    pub lines_start_at1: bool,
    pub columns_start_at1: bool,
}

impl ClientInfo {
    /// Convert a client line number to a zero-based line.
    pub fn line_from_client(&self, line: i64) -> Option<usize> {
        from_client(line, self.lines_start_at1)
    }

    pub fn line_to_client(&self, line: usize) -> i64 {
        to_client(line, self.lines_start_at1)
    }

    /// Convert a client column number to a zero-based column.
    pub fn column_from_client(&self, column: i64) -> Option<usize> {
        from_client(column, self.columns_start_at1)
    }

    pub fn column_to_client(&self, column: usize) -> i64 {
        to_client(column, self.columns_start_at1)
    }
}

fn from_client(value: i64, starts_at1: bool) -> Option<usize> {
    let zero_based = if starts_at1 { value - 1 } else { value };
    usize::try_from(zero_based).ok()
}

fn to_client(value: usize, starts_at1: bool) -> i64 {
    value as i64 + i64::from(starts_at1)
}

/// A breakpoint as requested by the client, in client line/column numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestedBreakpoint {
    pub line: i64,
    pub column: Option<i64>,
}

/// A requested breakpoint stored under its session-wide id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Breakpoint {
    pub id: i64,
    pub line: i64,
    pub column: Option<i64>,
}

/// The program loaded by `launch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    pub path: PathBuf,
    pub source: String,
    pub stop_on_entry: bool,
    pub no_debug: bool,
}

impl Program {
    pub fn new(path: impl Into<PathBuf>, source: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            source: source.into(),
            stop_on_entry: false,
            no_debug: false,
        }
    }

    /// File name shown in stack frames.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    pub fn is_source(&self, path: &Path) -> bool {
        self.path == path
    }

    /// Byte offset of a zero-based line and UTF-16 column. The column is
    /// clamped to the line.
    pub fn offset_of(&self, line: usize, column: usize) -> Option<usize> {
        let mut start = 0;
        for (index, text) in self.source.split_inclusive('\n').enumerate() {
            if index == line {
                let content = text.trim_end_matches(['\r', '\n']);
                let mut units = 0;
                for (byte, c) in content.char_indices() {
                    if units >= column {
                        return Some(start + byte);
                    }
                    units += c.len_utf16();
                }
                return Some(start + content.len());
            }
            start += text.len();
        }
        None
    }

    /// Zero-based line and UTF-16 column of a byte offset.
    pub fn line_col_of(&self, offset: usize) -> (usize, usize) {
        let offset = offset.min(self.source.len());
        let before = &self.source.as_bytes()[..offset];
        let line = before.iter().filter(|&&b| b == b'\n').count();
        let line_start = before
            .iter()
            .rposition(|&b| b == b'\n')
            .map(|i| i + 1)
            .unwrap_or(0);
        let column = self
            .source
            .get(line_start..offset)
            .map(|text| text.encode_utf16().count())
            .unwrap_or(offset - line_start);
        (line, column)
    }

    /// Source text between two inclusive byte offsets, trimmed.
    pub fn snippet(&self, start: usize, end: usize) -> &str {
        let end = (end + 1).min(self.source.len());
        self.source.get(start.min(end)..end).unwrap_or_default().trim()
    }
}
