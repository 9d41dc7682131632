use std::time::Duration;

/// A playable unit, as resolved by the audio node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    title: String,
    uri: String,
    duration: Duration,
    query: String,
    encoded: Option<String>,
}

impl Track {
    pub fn new(
        title: impl Into<String>,
        uri: impl Into<String>,
        duration: Duration,
        query: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            uri: uri.into(),
            duration,
            query: query.into(),
            encoded: None,
        }
    }

    /// Attach the node's encoded identifier, which lets the node play the track without
    /// resolving it again.
    pub fn with_encoded(mut self, encoded: impl Into<String>) -> Self {
        self.encoded = Some(encoded.into());
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// The text the track was found with
    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn encoded(&self) -> Option<&str> {
        self.encoded.as_deref()
    }

    /// Markdown link used in embeds
    pub fn markdown_link(&self) -> String {
        if self.uri.is_empty() {
            self.title.clone()
        } else {
            format!("[{}]({})", self.title, self.uri)
        }
    }
}

/// Identifies one start of one track within a session.
///
/// Handed to the audio node with every play request and echoed back in its events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlaybackId(pub u64);

impl std::fmt::Display for PlaybackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}
