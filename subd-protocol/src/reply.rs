//! Reply parsing.
//!
//! A reply is either a free-text status line or a table of newline-separated
//! rows with five tab-separated fields:
//!
//! ```text
//! id \t name \t group \t rating \t info
//! ```
//!
//! Rows with fewer than five fields are dropped; the rest of the table is
//! kept in order.

use crate::error::ProtocolError;

/// Token the server uses in successful status lines.
pub const SUCCESS_TOKEN: &str = "успешно";

/// Phrase the server uses when nothing is selected.
pub const NO_RECORDS_MARKER: &str = "Нет выбранных записей";

/// Number of fields in a well-formed row.
pub const ROW_FIELDS: usize = 5;

/// One row of a tabular reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub id: String,
    pub name: String,
    pub group: String,
    pub rating: String,
    pub info: String,
}

impl Record {
    /// Parses one tab-separated row. Fields past the fifth are ignored.
    pub fn parse_row(line: &str) -> Option<Self> {
        let mut fields = line.split('\t');
        let id = fields.next()?;
        let name = fields.next()?;
        let group = fields.next()?;
        let rating = fields.next()?;
        let info = fields.next()?;
        Some(Self {
            id: id.to_string(),
            name: name.to_string(),
            group: group.to_string(),
            rating: rating.to_string(),
            info: info.to_string(),
        })
    }
}

/// A classified reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// At least one well-formed row.
    Table(Vec<Record>),
    /// Anything else, verbatim.
    Status(String),
}

impl Reply {
    /// Classifies reply text.
    pub fn parse(text: &str) -> Self {
        let rows = parse_rows(text);
        if rows.is_empty() {
            Reply::Status(text.to_string())
        } else {
            Reply::Table(rows)
        }
    }
}

/// Decodes a reply payload, trimming trailing whitespace.
pub fn decode_text(payload: &[u8]) -> Result<String, ProtocolError> {
    let text = std::str::from_utf8(payload).map_err(|_| ProtocolError::MalformedReply)?;
    Ok(text.trim_end().to_string())
}

/// Extracts every well-formed row, in order.
pub fn parse_rows(text: &str) -> Vec<Record> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(Record::parse_row)
        .collect()
}

/// Guesses whether a status line reports success.
///
/// The server does not send a status code, only human-readable text, so this
/// is a case-insensitive search for [`SUCCESS_TOKEN`]. It is a heuristic and
/// must not be used to decide anything that matters for data integrity.
pub fn is_success(text: &str) -> bool {
    text.to_lowercase().contains(SUCCESS_TOKEN)
}

/// Returns true if the server reported an empty selection.
pub fn indicates_no_records(text: &str) -> bool {
    text.contains(NO_RECORDS_MARKER)
}
