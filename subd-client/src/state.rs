//! Pagination and query state.
//!
//! [`PageState`] tracks which page of the server-side selection is shown and
//! builds the `print range=...` command for it. [`StateStore`] keeps the
//! `{file, page, page_size}` triple on disk between runs.

use crate::error::ClientError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use subd_protocol::{Command, PageRange, ProtocolError, Record};

/// Default number of rows per page.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Page sizes offered to the user.
pub const PAGE_SIZE_CHOICES: [u32; 4] = [10, 20, 50, 100];

/// Default location of the state file.
pub const DEFAULT_STATE_FILE: &str = "client_state.json";

/// Query shown before the first load.
const INITIAL_QUERY: &str = "print all";

/// Request phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// No request outstanding.
    #[default]
    Idle,
    /// A `print range=...` was issued and its reply is pending.
    AwaitingReply,
}

/// Current file, page, and displayed rows.
#[derive(Debug, Clone)]
pub struct PageState {
    current_file: Option<String>,
    page: u32,
    page_size: u32,
    selected_id: Option<String>,
    last_query: String,
    phase: Phase,
    rows: Vec<Record>,
}

impl Default for PageState {
    fn default() -> Self {
        Self {
            current_file: None,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            selected_id: None,
            last_query: INITIAL_QUERY.to_string(),
            phase: Phase::Idle,
            rows: Vec::new(),
        }
    }
}

impl PageState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_file(&self) -> Option<&str> {
        self.current_file.as_deref()
    }

    pub fn set_current_file(&mut self, file: impl Into<String>) {
        self.current_file = Some(file.into());
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn selected_id(&self) -> Option<&str> {
        self.selected_id.as_deref()
    }

    /// The last range query issued (`print all` before the first load).
    pub fn last_query(&self) -> &str {
        &self.last_query
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    /// Range covered by the current page.
    pub fn range(&self) -> PageRange {
        PageRange::for_page(self.page, self.page_size)
    }

    /// Builds the reload command for the current page and enters
    /// [`Phase::AwaitingReply`].
    pub fn begin_reload(&mut self) -> Command {
        let command = Command::print_range(self.range());
        self.last_query = command.to_string();
        self.phase = Phase::AwaitingReply;
        command
    }

    /// Replaces the displayed rows and returns to [`Phase::Idle`].
    pub fn finish_reload(&mut self, rows: Vec<Record>) {
        self.rows = rows;
        self.selected_id = None;
        self.phase = Phase::Idle;
    }

    /// Clears the displayed rows and returns to [`Phase::Idle`].
    pub fn clear_rows(&mut self) {
        self.finish_reload(Vec::new());
    }

    /// Advances one page. There is no upper bound.
    pub fn next_page(&mut self) -> Command {
        self.page = self.page.saturating_add(1);
        self.begin_reload()
    }

    /// Goes back one page, or returns `None` on page 1.
    pub fn prev_page(&mut self) -> Option<Command> {
        if self.page <= 1 {
            return None;
        }
        self.page -= 1;
        Some(self.begin_reload())
    }

    /// Jumps to `page` (1-based).
    pub fn goto_page(&mut self, page: u32) -> Result<Command, ProtocolError> {
        if page == 0 {
            return Err(ProtocolError::InvalidArgument(
                "page numbers start at 1".to_string(),
            ));
        }
        self.page = page;
        Ok(self.begin_reload())
    }

    /// Changes the page size and returns to page 1.
    pub fn change_page_size(&mut self, page_size: u32) -> Result<Command, ProtocolError> {
        if page_size == 0 {
            return Err(ProtocolError::InvalidArgument(
                "page size must be positive".to_string(),
            ));
        }
        self.page_size = page_size;
        self.page = 1;
        Ok(self.begin_reload())
    }

    /// Marks the displayed row at `index` as selected and returns its id.
    pub fn select_row(&mut self, index: usize) -> Option<&str> {
        let id = self.rows.get(index)?.id.clone();
        self.selected_id = Some(id);
        self.selected_id.as_deref()
    }

    pub fn to_persisted(&self) -> PersistedState {
        PersistedState {
            file: self.current_file.clone().unwrap_or_default(),
            page: self.page,
            page_size: self.page_size,
        }
    }

    /// Restores from a persisted record, replacing invalid values with defaults.
    pub fn from_persisted(persisted: PersistedState) -> Self {
        let mut state = Self::default();
        if !persisted.file.trim().is_empty() {
            state.current_file = Some(persisted.file);
        }
        if persisted.page >= 1 {
            state.page = persisted.page;
        } else {
            tracing::warn!("Ignoring stored page {}", persisted.page);
        }
        if persisted.page_size >= 1 {
            state.page_size = persisted.page_size;
        } else {
            tracing::warn!("Ignoring stored page size {}", persisted.page_size);
        }
        state
    }
}

/// On-disk form of the session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub file: String,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            file: String::new(),
            page: default_page(),
            page_size: default_page_size(),
        }
    }
}

/// JSON file holding a [`PersistedState`].
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the stored state. A missing or unreadable file yields defaults.
    pub fn load(&self) -> PersistedState {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No state file at {}", self.path.display());
                return PersistedState::default();
            }
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", self.path.display(), e);
                return PersistedState::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!("Corrupt state file {}: {}", self.path.display(), e);
                PersistedState::default()
            }
        }
    }

    /// Writes the state, replacing the previous file.
    pub fn save(&self, state: &PersistedState) -> Result<(), ClientError> {
        let content =
            serde_json::to_string(state).map_err(|e| ClientError::State(e.to_string()))?;
        std::fs::write(&self.path, content).map_err(|e| {
            ClientError::State(format!("failed to write {}: {}", self.path.display(), e))
        })?;
        tracing::debug!("Saved state to {}", self.path.display());
        Ok(())
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(DEFAULT_STATE_FILE)
    }
}
