//! High-level client session.
//!
//! A [`Session`] combines the shared [`Connection`], the page state, and the
//! state store. Its typed methods return `Result` for programmatic callers;
//! [`Session::dispatch`] is the front-end entry point and turns every error
//! into a [`Status`] instead.

use crate::connection::Connection;
use crate::error::ClientError;
use crate::state::{PageState, StateStore};
use crate::stream::PeekStream;
use std::fmt;
use std::sync::Arc;
use subd_protocol::reply::{indicates_no_records, is_success};
use subd_protocol::{Command, Filter, RecordFields, Reply};
use tokio::net::TcpStream;

/// A message shown to the user after an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub text: String,
    pub ok: bool,
}

impl Status {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ok: true,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ok: false,
        }
    }

    /// Wraps server text, guessing success from its wording.
    pub fn from_reply(text: impl Into<String>) -> Self {
        let text = text.into();
        let ok = is_success(&text);
        Self { text, ok }
    }

    pub fn from_error(err: &ClientError) -> Self {
        let text = match err {
            ClientError::NotConnected => "Not connected to server".to_string(),
            ClientError::Protocol(subd_protocol::ProtocolError::NoChangesSpecified) => {
                "No changes specified".to_string()
            }
            other => other.to_string(),
        };
        Self::error(text)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// A user action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Open(String),
    /// Re-open the current file after a remote change.
    Reopen,
    Save,
    Select(Filter),
    Reselect(Filter),
    Add(RecordFields),
    Update(RecordFields),
    Remove,
    Reload,
    NextPage,
    PrevPage,
    GotoPage(u32),
    ChangePageSize(u32),
    SelectRow(usize),
    /// A hand-typed command.
    Raw(String),
}

/// Outcome of an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    pub status: Status,
    /// Whether the displayed rows were replaced.
    pub reloaded: bool,
}

impl Update {
    fn status(status: Status) -> Self {
        Self {
            status,
            reloaded: false,
        }
    }

    fn reloaded(status: Status) -> Self {
        Self {
            status,
            reloaded: true,
        }
    }
}

/// Client session state.
pub struct Session<S = TcpStream> {
    connection: Arc<Connection<S>>,
    state: PageState,
    store: Option<StateStore>,
}

impl<S: PeekStream> Session<S> {
    /// Creates a session, restoring page state from `store`.
    pub fn new(connection: Arc<Connection<S>>, store: StateStore) -> Self {
        let state = PageState::from_persisted(store.load());
        Self {
            connection,
            state,
            store: Some(store),
        }
    }

    /// Creates a session that never touches disk.
    pub fn ephemeral(connection: Arc<Connection<S>>) -> Self {
        Self {
            connection,
            state: PageState::new(),
            store: None,
        }
    }

    pub fn connection(&self) -> &Arc<Connection<S>> {
        &self.connection
    }

    pub fn state(&self) -> &PageState {
        &self.state
    }

    /// Opens `path` on the server and loads its first view.
    pub async fn open(&mut self, path: &str) -> Result<Update, ClientError> {
        let command = Command::open(path)?;
        self.state.set_current_file(path.trim());
        let sent = self.connection.send(&command).await;
        self.persist();
        self.with_reload(sent?).await
    }

    /// Opens the current file again, picking up changes made elsewhere.
    pub async fn reopen(&mut self) -> Result<Update, ClientError> {
        let file = self
            .state
            .current_file()
            .map(str::to_string)
            .ok_or_else(|| ClientError::State("no file is open".to_string()))?;
        self.open(&file).await
    }

    /// Writes the server's data to disk. Does not reload.
    pub async fn save(&mut self) -> Result<Update, ClientError> {
        let reply = self.connection.send(&Command::save()).await?;
        Ok(Update::status(Status::from_reply(reply)))
    }

    pub async fn select(&mut self, filter: &Filter) -> Result<Update, ClientError> {
        let command = Command::select(filter)?;
        self.run_and_reload(&command).await
    }

    pub async fn reselect(&mut self, filter: &Filter) -> Result<Update, ClientError> {
        let command = Command::reselect(filter)?;
        self.run_and_reload(&command).await
    }

    pub async fn add(&mut self, fields: &RecordFields) -> Result<Update, ClientError> {
        let command = Command::add(fields)?;
        self.run_and_reload(&command).await
    }

    /// Updates the server's current selection. Nothing is sent when every
    /// field is blank.
    pub async fn update(&mut self, fields: &RecordFields) -> Result<Update, ClientError> {
        let command = Command::update(fields)?;
        self.run_and_reload(&command).await
    }

    /// Removes the server's current selection.
    pub async fn remove(&mut self) -> Result<Update, ClientError> {
        self.run_and_reload(&Command::remove()).await
    }

    /// Fetches the current page again.
    pub async fn reload(&mut self) -> Result<Update, ClientError> {
        let command = self.state.begin_reload();
        self.load(command).await
    }

    pub async fn next_page(&mut self) -> Result<Update, ClientError> {
        let command = self.state.next_page();
        self.load(command).await
    }

    /// Goes back one page. On page 1 nothing is sent.
    pub async fn prev_page(&mut self) -> Result<Update, ClientError> {
        match self.state.prev_page() {
            Some(command) => self.load(command).await,
            None => Ok(Update::status(Status::ok("Already on the first page"))),
        }
    }

    pub async fn goto_page(&mut self, page: u32) -> Result<Update, ClientError> {
        let command = self.state.goto_page(page)?;
        self.load(command).await
    }

    pub async fn change_page_size(&mut self, page_size: u32) -> Result<Update, ClientError> {
        let command = self.state.change_page_size(page_size)?;
        self.load(command).await
    }

    /// Marks a displayed row as selected.
    pub fn select_row(&mut self, index: usize) -> Option<&str> {
        self.state.select_row(index)
    }

    /// Sends a hand-typed command. A tabular reply replaces the rows.
    pub async fn raw(&mut self, text: &str) -> Result<Update, ClientError> {
        let command = Command::raw(text)?;
        let reply = self.connection.send(&command).await?;
        match Reply::parse(&reply) {
            Reply::Table(rows) => {
                let status = Status::ok(format!("Loaded {} records", rows.len()));
                self.state.finish_reload(rows);
                Ok(Update::reloaded(status))
            }
            Reply::Status(text) => Ok(Update::status(Status::from_reply(text))),
        }
    }

    /// Runs an action, reporting failures as an error status.
    pub async fn dispatch(&mut self, action: Action) -> Update {
        tracing::debug!("Dispatching {:?}", action);

        let result = match action {
            Action::Open(path) => self.open(&path).await,
            Action::Reopen => self.reopen().await,
            Action::Save => self.save().await,
            Action::Select(filter) => self.select(&filter).await,
            Action::Reselect(filter) => self.reselect(&filter).await,
            Action::Add(fields) => self.add(&fields).await,
            Action::Update(fields) => self.update(&fields).await,
            Action::Remove => self.remove().await,
            Action::Reload => self.reload().await,
            Action::NextPage => self.next_page().await,
            Action::PrevPage => self.prev_page().await,
            Action::GotoPage(page) => self.goto_page(page).await,
            Action::ChangePageSize(size) => self.change_page_size(size).await,
            Action::SelectRow(index) => Ok(match self.select_row(index) {
                Some(id) => Update::status(Status::ok(format!("Selected record {}", id))),
                None => Update::status(Status::error(format!("No row {}", index))),
            }),
            Action::Raw(text) => self.raw(&text).await,
        };

        result.unwrap_or_else(|e| {
            tracing::debug!("Action failed: {} ({})", e, e.kind());
            Update::status(Status::from_error(&e))
        })
    }

    /// Saves the page state. Failures are logged, not returned.
    pub fn persist(&self) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save(&self.state.to_persisted()) {
                tracing::warn!("Failed to save session state: {}", e);
            }
        }
    }

    /// Saves state and closes the connection.
    pub async fn close(&mut self) -> Result<(), ClientError> {
        self.persist();
        self.connection.close().await
    }

    /// Sends a command, then reloads the current page.
    async fn run_and_reload(&mut self, command: &Command) -> Result<Update, ClientError> {
        let reply = self.connection.send(command).await?;
        self.with_reload(reply).await
    }

    /// Reloads and reports `reply` as the status, falling back to the
    /// reload status when the server said nothing.
    async fn with_reload(&mut self, reply: String) -> Result<Update, ClientError> {
        let reloaded = self.reload().await?;
        if reply.is_empty() {
            return Ok(reloaded);
        }
        Ok(Update::reloaded(Status::from_reply(reply)))
    }

    /// Sends a range query and replaces the displayed rows with the result.
    async fn load(&mut self, command: Command) -> Result<Update, ClientError> {
        let reply = match self.connection.send(&command).await {
            Ok(reply) => reply,
            Err(e) => {
                self.state.clear_rows();
                return Err(e);
            }
        };

        let status = if reply.is_empty() {
            self.state.clear_rows();
            Status::error("No data")
        } else if indicates_no_records(&reply) {
            self.state.clear_rows();
            Status::error(reply)
        } else {
            match Reply::parse(&reply) {
                Reply::Table(rows) => {
                    let status = Status::ok(format!("Loaded {} records", rows.len()));
                    self.state.finish_reload(rows);
                    status
                }
                Reply::Status(text) => {
                    self.state.clear_rows();
                    Status::from_reply(text)
                }
            }
        };

        self.persist();
        Ok(Update::reloaded(status))
    }
}
