//! Command builders.
//!
//! Every user action maps to exactly one command string with a fixed verb and
//! a deterministic argument order:
//!
//! ```text
//! open <path>
//! save
//! select   [id=N] [name="S"] [group=G] [rating=R]
//! reselect [id=N] [name="S"] [group=G] [rating=R]
//! add <name>\t<group>\t<rating>\t<info>
//! update [name="S"] [group=G] [rating=R] [info="S"]
//! remove
//! print [range=<start>-<end>]
//! ```
//!
//! Blank fields (empty after trimming) are omitted. The server matches
//! quoted values with `"[^"]*"`, so values containing `"` cannot be sent.

use crate::error::ProtocolError;
use std::fmt;
use std::str::FromStr;

/// Leading token of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Open,
    Save,
    Select,
    Reselect,
    Add,
    Update,
    Remove,
    Print,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Open => "open",
            Verb::Save => "save",
            Verb::Select => "select",
            Verb::Reselect => "reselect",
            Verb::Add => "add",
            Verb::Update => "update",
            Verb::Remove => "remove",
            Verb::Print => "print",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verb {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Verb::Open),
            "save" => Ok(Verb::Save),
            "select" => Ok(Verb::Select),
            "reselect" => Ok(Verb::Reselect),
            "add" => Ok(Verb::Add),
            "update" => Ok(Verb::Update),
            "remove" => Ok(Verb::Remove),
            "print" => Ok(Verb::Print),
            other => Err(ProtocolError::invalid(format!("unknown verb '{}'", other))),
        }
    }
}

/// Search criteria for `select` and `reselect`.
///
/// Values are passed through verbatim, so server-side patterns such as
/// `name=Ivan*` or `group=101-103` work unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    pub id: String,
    pub name: String,
    pub group: String,
    pub rating: String,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn with_rating(mut self, rating: impl Into<String>) -> Self {
        self.rating = rating.into();
        self
    }

    /// Returns true if no criterion is populated.
    pub fn is_empty(&self) -> bool {
        [&self.id, &self.name, &self.group, &self.rating]
            .iter()
            .all(|v| is_blank(v))
    }

    fn to_args(&self) -> Result<Vec<String>, ProtocolError> {
        let mut args = Vec::new();
        push_arg(&mut args, "id", &self.id, false)?;
        push_arg(&mut args, "name", &self.name, true)?;
        push_arg(&mut args, "group", &self.group, false)?;
        push_arg(&mut args, "rating", &self.rating, false)?;
        Ok(args)
    }
}

/// Editable record fields for `add` and `update`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFields {
    pub name: String,
    pub group: String,
    pub rating: String,
    pub info: String,
}

impl RecordFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn with_rating(mut self, rating: impl Into<String>) -> Self {
        self.rating = rating.into();
        self
    }

    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        self.info = info.into();
        self
    }

    /// Returns true if no field is populated.
    pub fn is_empty(&self) -> bool {
        [&self.name, &self.group, &self.rating, &self.info]
            .iter()
            .all(|v| is_blank(v))
    }
}

/// One-based, inclusive record range of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    pub start: u64,
    pub end: u64,
}

impl PageRange {
    /// Computes the range shown on `page` (clamped to at least 1).
    pub fn for_page(page: u32, page_size: u32) -> Self {
        let page = page.max(1) as u64;
        let size = page_size as u64;
        Self {
            start: (page - 1) * size + 1,
            end: page * size,
        }
    }
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// An immutable command string ready to be framed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    verb: Verb,
    text: String,
}

impl Command {
    fn bare(verb: Verb) -> Self {
        Self {
            verb,
            text: verb.as_str().to_string(),
        }
    }

    fn with_args(verb: Verb, args: &[String]) -> Self {
        if args.is_empty() {
            return Self::bare(verb);
        }
        Self {
            verb,
            text: format!("{} {}", verb, args.join(" ")),
        }
    }

    /// `open <path>`
    pub fn open(path: &str) -> Result<Self, ProtocolError> {
        let path = path.trim();
        if path.is_empty() {
            return Err(ProtocolError::invalid("open requires a file path"));
        }
        if path.contains(['\n', '\r']) {
            return Err(ProtocolError::invalid("file path must be a single line"));
        }
        Ok(Self {
            verb: Verb::Open,
            text: format!("open {}", path),
        })
    }

    /// `save`
    pub fn save() -> Self {
        Self::bare(Verb::Save)
    }

    /// `remove`, applied by the server to its current selection.
    pub fn remove() -> Self {
        Self::bare(Verb::Remove)
    }

    /// `select` over the whole dataset. An empty filter selects everything.
    pub fn select(filter: &Filter) -> Result<Self, ProtocolError> {
        Ok(Self::with_args(Verb::Select, &filter.to_args()?))
    }

    /// `reselect` within the current selection.
    ///
    /// An empty filter degrades to a plain `select`.
    pub fn reselect(filter: &Filter) -> Result<Self, ProtocolError> {
        if filter.is_empty() {
            return Ok(Self::bare(Verb::Select));
        }
        Ok(Self::with_args(Verb::Reselect, &filter.to_args()?))
    }

    /// `add <name>\t<group>\t<rating>\t<info>`
    pub fn add(fields: &RecordFields) -> Result<Self, ProtocolError> {
        let values = [&fields.name, &fields.group, &fields.rating, &fields.info];
        for value in values {
            if value.contains(['\t', '\n', '\r']) {
                return Err(ProtocolError::invalid(
                    "record fields must not contain tabs or line breaks",
                ));
            }
        }
        let record = values.map(|v| v.trim()).join("\t");
        Ok(Self {
            verb: Verb::Add,
            text: format!("add {}", record),
        })
    }

    /// `update` with the populated fields only.
    pub fn update(fields: &RecordFields) -> Result<Self, ProtocolError> {
        if fields.is_empty() {
            return Err(ProtocolError::NoChangesSpecified);
        }
        let mut args = Vec::new();
        push_arg(&mut args, "name", &fields.name, true)?;
        push_arg(&mut args, "group", &fields.group, false)?;
        push_arg(&mut args, "rating", &fields.rating, false)?;
        push_arg(&mut args, "info", &fields.info, true)?;
        Ok(Self::with_args(Verb::Update, &args))
    }

    /// `print range=<start>-<end>`
    pub fn print_range(range: PageRange) -> Self {
        Self {
            verb: Verb::Print,
            text: format!("print range={}", range),
        }
    }

    /// `print range=...` for a page number and size.
    pub fn print_page(page: u32, page_size: u32) -> Self {
        Self::print_range(PageRange::for_page(page, page_size))
    }

    /// `print` of the whole selection.
    pub fn print_all() -> Self {
        Self::bare(Verb::Print)
    }

    /// Wraps a hand-typed command after checking its verb.
    pub fn raw(text: &str) -> Result<Self, ProtocolError> {
        let text = text.trim();
        let verb: Verb = text.split_whitespace().next().unwrap_or("").parse()?;
        Ok(Self {
            verb,
            text: text.to_string(),
        })
    }

    pub fn verb(&self) -> Verb {
        self.verb
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

fn push_arg(
    args: &mut Vec<String>,
    key: &str,
    value: &str,
    always_quote: bool,
) -> Result<(), ProtocolError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(());
    }
    if value.contains('"') {
        return Err(ProtocolError::invalid(format!(
            "{} must not contain double quotes",
            key
        )));
    }
    if value.contains(['\n', '\r']) {
        return Err(ProtocolError::invalid(format!(
            "{} must be a single line",
            key
        )));
    }
    if always_quote || value.contains(char::is_whitespace) {
        args.push(format!("{}=\"{}\"", key, value));
    } else {
        args.push(format!("{}={}", key, value));
    }
    Ok(())
}
