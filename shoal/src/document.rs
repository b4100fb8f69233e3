//! Command documents
//!
//! A command is an ordered mapping whose first key is the command verb
//! (`{"collstats": "items", "scale": 1024}`). Key order is preserved through
//! serde_json's `preserve_order` map.

use crate::selector::ReadPreference;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Ordered field mapping exchanged with the server
pub type Document = Map<String, Value>;

/// Server-style truthiness: `true` and non-zero numbers
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        _ => false,
    }
}

/// What to run: a bare verb name or a pre-ordered document
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Name(String),
    Document(Document),
}

impl From<&str> for Command {
    fn from(name: &str) -> Self {
        Command::Name(name.to_string())
    }
}

impl From<String> for Command {
    fn from(name: String) -> Self {
        Command::Name(name)
    }
}

impl From<Document> for Command {
    fn from(document: Document) -> Self {
        Command::Document(document)
    }
}

/// Options for [`Database::command`](crate::Database::command)
#[derive(Debug, Clone)]
pub struct CommandOptions {
    /// Value of the verb when the command is given by name
    pub value: Value,
    /// Which member role may serve the command
    pub read_preference: ReadPreference,
    /// Fields appended after the verb
    pub extra: Document,
    /// Fail with `CommandFailed` when the reply's `ok` is not truthy
    pub check: bool,
    /// Error messages tolerated when `check` is set
    pub allowable_errors: Vec<String>,
}

impl Default for CommandOptions {
    fn default() -> Self {
        Self {
            value: Value::from(1),
            read_preference: ReadPreference::Primary,
            extra: Document::new(),
            check: true,
            allowable_errors: Vec::new(),
        }
    }
}

impl CommandOptions {
    pub fn value(mut self, value: impl Into<Value>) -> Self {
        self.value = value.into();
        self
    }

    pub fn read_preference(mut self, read_preference: ReadPreference) -> Self {
        self.read_preference = read_preference;
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn check(mut self, check: bool) -> Self {
        self.check = check;
        self
    }

    pub fn allow_error(mut self, message: impl Into<String>) -> Self {
        self.allowable_errors.push(message.into());
        self
    }
}

/// Finalized command, verb first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandDocument(Document);

impl CommandDocument {
    /// `{verb: value}`
    pub fn from_verb(verb: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut doc = Document::new();
        doc.insert(verb.into(), value.into());
        Self(doc)
    }

    /// Build from either form of [`Command`] and append `extra`.
    ///
    /// Extra keys already present keep their position and take the new value.
    pub fn build(command: Command, value: Value, extra: Document) -> Self {
        let mut doc = match command {
            Command::Name(name) => Self::from_verb(name, value),
            Command::Document(doc) => Self(doc),
        };
        doc.extend(extra);
        doc
    }

    pub fn extend(&mut self, fields: Document) {
        for (key, value) in fields {
            self.0.insert(key, value);
        }
    }

    /// The command verb (first key), if any
    pub fn verb(&self) -> Option<&str> {
        self.0.keys().next().map(String::as_str)
    }

    pub fn as_document(&self) -> &Document {
        &self.0
    }

    pub fn into_document(self) -> Document {
        self.0
    }
}

impl From<Document> for CommandDocument {
    fn from(doc: Document) -> Self {
        Self(doc)
    }
}
