//! Event model: the immutable dispatched event and its accumulator

use serde::Serialize;

/// A complete event read from the stream
///
/// Built by the stream parser at each blank line and handed to subscribers.
/// `id`, when present, never contains a NUL character.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServerEvent {
    /// Value of the last `id:` field
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Value of the last `event:` field
    #[serde(rename = "event", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// All `data:` lines joined with `\n`
    pub data: String,

    /// Reconnection interval hint in milliseconds
    #[serde(rename = "retry", skip_serializing_if = "Option::is_none")]
    pub retry: Option<u64>,
}

impl ServerEvent {
    /// Start building an event
    pub fn builder() -> EventBuilder {
        EventBuilder::default()
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn retry(&self) -> Option<u64> {
        self.retry
    }
}

/// Mutable accumulator for the event currently being read
#[derive(Debug, Clone, Default)]
pub struct EventBuilder {
    id: Option<String>,
    name: Option<String>,
    data: Option<String>,
    retry: Option<u64>,
}

impl EventBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the event name
    pub fn name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = Some(name.into());
        self
    }

    /// Overwrite the event id
    pub fn id(&mut self, id: impl Into<String>) -> &mut Self {
        self.id = Some(id.into());
        self
    }

    /// Set the reconnection hint
    pub fn retry(&mut self, millis: u64) -> &mut Self {
        self.retry = Some(millis);
        self
    }

    /// Append a data line, joining with `\n` after the first one
    pub fn append_data(&mut self, line: &str) -> &mut Self {
        match &mut self.data {
            Some(data) => {
                data.push('\n');
                data.push_str(line);
            }
            None => self.data = Some(line.to_string()),
        }
        self
    }

    /// Returns `true` if no field has been set since the last reset
    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.name.is_none() && self.data.is_none() && self.retry.is_none()
    }

    /// Snapshot the accumulated fields into an event
    pub fn build(&self) -> ServerEvent {
        ServerEvent {
            id: self.id.clone(),
            name: self.name.clone(),
            data: self.data.clone().unwrap_or_default(),
            retry: self.retry,
        }
    }

    /// Take the accumulated event and leave the builder empty
    pub fn take(&mut self) -> ServerEvent {
        let builder = std::mem::take(self);
        ServerEvent {
            id: builder.id,
            name: builder.name,
            data: builder.data.unwrap_or_default(),
            retry: builder.retry,
        }
    }
}
