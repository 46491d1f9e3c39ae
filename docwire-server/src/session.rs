//! Per-connection session state handed to command handlers.

use docwire_bson::Document;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// A client connection as seen by the command layer.
pub struct Session {
    /// Unique session ID.
    pub id: String,

    /// Sequential connection number, reported as `connectionId`.
    pub connection_id: u64,

    /// Remote address.
    pub remote_addr: SocketAddr,

    tls: bool,

    /// `client` metadata sent with the first hello.
    client_metadata: Option<Document>,

    request_count: u64,
    created_at: Instant,
    last_activity: Instant,
}

impl Session {
    /// Creates a new session.
    pub fn new(connection_id: u64, remote_addr: SocketAddr, tls: bool) -> Self {
        let now = Instant::now();
        Self {
            id: Uuid::new_v4().to_string(),
            connection_id,
            remote_addr,
            tls,
            client_metadata: None,
            request_count: 0,
            created_at: now,
            last_activity: now,
        }
    }

    /// Returns whether the connection is TLS-encrypted.
    pub fn is_tls(&self) -> bool {
        self.tls
    }

    /// Records the arrival of a request.
    pub fn touch(&mut self) {
        self.request_count += 1;
        self.last_activity = Instant::now();
    }

    pub fn request_count(&self) -> u64 {
        self.request_count
    }

    pub fn idle_duration(&self) -> Duration {
        self.last_activity.elapsed()
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Stores driver metadata. Only the first call has an effect, matching
    /// servers that reject metadata changes after the handshake.
    pub fn set_client_metadata(&mut self, metadata: Document) -> bool {
        if self.client_metadata.is_some() {
            return false;
        }
        self.client_metadata = Some(metadata);
        true
    }

    pub fn client_metadata(&self) -> Option<&Document> {
        self.client_metadata.as_ref()
    }

    /// Returns `client.application.name` if the driver sent one.
    pub fn app_name(&self) -> Option<&str> {
        self.client_metadata
            .as_ref()?
            .get_document("application")?
            .get_str("name")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docwire_bson::Value;

    fn session() -> Session {
        Session::new(1, "127.0.0.1:50000".parse().unwrap(), false)
    }

    #[test]
    fn test_new_session() {
        let s = session();
        assert_eq!(s.connection_id, 1);
        assert!(!s.is_tls());
        assert_eq!(s.request_count(), 0);
        assert!(s.client_metadata().is_none());
        assert_ne!(s.id, session().id);
    }

    #[test]
    fn test_touch() {
        let mut s = session();
        s.touch();
        s.touch();
        assert_eq!(s.request_count(), 2);
        assert!(s.idle_duration() <= s.age());
    }

    #[test]
    fn test_client_metadata_set_once() {
        let mut s = session();
        let app = Document::from_pairs([("name", "reporting")]).unwrap();
        let metadata =
            Document::from_pairs([("application", Value::Document(app))]).unwrap();

        assert!(s.set_client_metadata(metadata));
        assert_eq!(s.app_name(), Some("reporting"));
        assert!(!s.set_client_metadata(Document::new()));
        assert_eq!(s.app_name(), Some("reporting"));
    }
}
