//! Command dispatch.
//!
//! A [`Request`] is the logical command document pulled out of an OP_MSG
//! (with document sequences folded in) or a legacy OP_QUERY against
//! `<db>.$cmd`. A [`CommandHandler`] turns it into a reply document; the
//! connection loop frames that reply in the request's format.
//!
//! [`HandshakeHandler`] answers the commands drivers send while connecting
//! and during monitoring. Anything else is `CommandNotFound`.

use crate::error::ServerError;
use crate::session::Session;
use docwire_bson::{DateTime, Document, Value};
use docwire_protocol::{Message, Op, ProtocolError, MAX_MESSAGE_SIZE, MAX_WRITE_BATCH_SIZE};

/// Handles decoded commands.
pub trait CommandHandler: Send + Sync {
    /// Returns the reply body for `request`. Errors become error replies
    /// unless [`ServerError::is_fatal`] says otherwise.
    fn handle(&self, session: &mut Session, request: &Request) -> Result<Document, ServerError>;
}

/// A decoded command.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Request id from the message header.
    pub request_id: i32,
    /// Target database (`$db`, or the namespace of a legacy query).
    pub database: String,
    /// The command document. Its first key names the command.
    pub command: Document,
}

impl Request {
    /// Extracts the command from a request message.
    pub fn from_message(message: &Message) -> Result<Self, ServerError> {
        let (database, command) = match &message.op {
            Op::Msg(msg) => {
                // A sequence clashing with a body field is a bad command, not
                // a framing fault.
                let command = msg.clone().into_command().map_err(|e| match e {
                    ProtocolError::Bson { source, .. } => ServerError::Bson(source),
                    other => other.into(),
                })?;
                let database = match command.get("$db") {
                    Some(Value::String(db)) => db.clone(),
                    Some(other) => {
                        return Err(ServerError::TypeMismatch {
                            field: "$db".to_string(),
                            expected: "string",
                            found: other.element_type(),
                        })
                    }
                    None => {
                        return Err(ServerError::InvalidRequest(
                            "OP_MSG command has no $db field".to_string(),
                        ))
                    }
                };
                (database, command)
            }
            Op::Query(query) => {
                if !query.is_command() {
                    return Err(ServerError::InvalidRequest(format!(
                        "OP_QUERY is only supported against $cmd, not '{}'",
                        query.full_collection_name
                    )));
                }
                // Some drivers wrap the command when sending read preferences.
                let command = match query.query.get_document("$query") {
                    Some(inner) => inner.clone(),
                    None => query.query.clone(),
                };
                (query.database().to_string(), command)
            }
            Op::Reply(_) => {
                return Err(ServerError::InvalidRequest(
                    "OP_REPLY is not a request".to_string(),
                ))
            }
        };

        if command.is_empty() {
            return Err(ServerError::InvalidRequest(
                "empty command document".to_string(),
            ));
        }
        Ok(Self {
            request_id: message.request_id,
            database,
            command,
        })
    }

    /// Returns the command name.
    pub fn name(&self) -> &str {
        self.command.first().map(|(key, _)| key).unwrap_or_default()
    }
}

/// Builds an error reply: `{ok: 0.0, errmsg, code, codeName}`.
pub fn error_reply(err: &ServerError) -> Document {
    let code = err.error_code();
    let mut reply = Document::with_capacity(4);
    reply.set("ok", 0.0);
    reply.set("errmsg", err.to_string());
    reply.set("code", code.code());
    reply.set("codeName", code.name());
    reply
}

fn ok_reply(mut reply: Document) -> Document {
    reply.set("ok", 1.0);
    reply
}

/// Limits and version information advertised to drivers.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub version: String,
    pub max_bson_object_size: i32,
    pub max_message_size_bytes: i32,
    pub max_write_batch_size: i32,
    pub min_wire_version: i32,
    pub max_wire_version: i32,
    pub logical_session_timeout_minutes: i32,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            version: "6.0.0".to_string(),
            max_bson_object_size: docwire_bson::MAX_DOCUMENT_SIZE as i32,
            max_message_size_bytes: MAX_MESSAGE_SIZE as i32,
            max_write_batch_size: MAX_WRITE_BATCH_SIZE,
            min_wire_version: 0,
            max_wire_version: 17,
            logical_session_timeout_minutes: 30,
        }
    }
}

impl ServerInfo {
    /// Advertises a lower message size limit.
    pub fn with_max_message_size(mut self, max: usize) -> Self {
        self.max_message_size_bytes = i32::try_from(max.min(MAX_MESSAGE_SIZE)).unwrap_or(i32::MAX);
        self
    }

    fn version_array(&self) -> Vec<Value> {
        let mut parts: Vec<Value> = self
            .version
            .split('.')
            .map(|part| Value::Int32(part.parse().unwrap_or(0)))
            .collect();
        parts.resize(4, Value::Int32(0));
        parts
    }
}

/// Server parameters readable through `getParameter`.
const PARAMETERS: &[(&str, ParameterValue)] = &[
    ("logLevel", ParameterValue::Int(0)),
    ("quiet", ParameterValue::Bool(false)),
];

#[derive(Clone, Copy)]
enum ParameterValue {
    Int(i32),
    Bool(bool),
}

impl From<ParameterValue> for Value {
    fn from(value: ParameterValue) -> Self {
        match value {
            ParameterValue::Int(v) => Value::Int32(v),
            ParameterValue::Bool(v) => Value::Boolean(v),
        }
    }
}

/// Answers the connection handshake and monitoring commands.
#[derive(Debug, Clone, Default)]
pub struct HandshakeHandler {
    info: ServerInfo,
}

impl HandshakeHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_info(info: ServerInfo) -> Self {
        Self { info }
    }

    pub fn info(&self) -> &ServerInfo {
        &self.info
    }

    fn handle_hello(
        &self,
        session: &mut Session,
        request: &Request,
        legacy: bool,
    ) -> Result<Document, ServerError> {
        match request.command.get("client") {
            Some(Value::Document(metadata)) => {
                if session.set_client_metadata(metadata.clone()) {
                    tracing::debug!(
                        "[{}] Client metadata received (app={:?})",
                        session.remote_addr,
                        session.app_name()
                    );
                }
            }
            Some(other) => {
                return Err(ServerError::TypeMismatch {
                    field: "client".to_string(),
                    expected: "object",
                    found: other.element_type(),
                })
            }
            None => {}
        }

        let info = &self.info;
        let mut reply = Document::with_capacity(12);
        if legacy && request.command.get_bool("helloOk") == Some(true) {
            reply.set("helloOk", true);
        }
        reply.set(if legacy { "ismaster" } else { "isWritablePrimary" }, true);
        reply.set("maxBsonObjectSize", info.max_bson_object_size);
        reply.set("maxMessageSizeBytes", info.max_message_size_bytes);
        reply.set("maxWriteBatchSize", info.max_write_batch_size);
        reply.set("localTime", DateTime::now());
        reply.set(
            "logicalSessionTimeoutMinutes",
            info.logical_session_timeout_minutes,
        );
        reply.set("connectionId", session.connection_id as i64);
        reply.set("minWireVersion", info.min_wire_version);
        reply.set("maxWireVersion", info.max_wire_version);
        reply.set("readOnly", false);
        Ok(ok_reply(reply))
    }

    fn handle_build_info(&self) -> Result<Document, ServerError> {
        let info = &self.info;
        let mut reply = Document::with_capacity(9);
        reply.set("version", info.version.as_str());
        reply.set("gitVersion", "");
        reply.set("modules", Vec::<Value>::new());
        reply.set("sysInfo", "deprecated");
        reply.set("versionArray", info.version_array());
        reply.set("bits", 64i32);
        reply.set("debug", cfg!(debug_assertions));
        reply.set("maxBsonObjectSize", info.max_bson_object_size);
        Ok(ok_reply(reply))
    }

    fn handle_get_parameter(&self, request: &Request) -> Result<Document, ServerError> {
        let mut reply = Document::new();
        match request.command.get("getParameter") {
            Some(Value::String(s)) if s == "*" => {
                for (name, value) in PARAMETERS {
                    reply.set(*name, *value);
                }
                return Ok(ok_reply(reply));
            }
            Some(v) if v.as_number().is_some() || v.as_document().is_some() => {}
            Some(other) => {
                return Err(ServerError::TypeMismatch {
                    field: "getParameter".to_string(),
                    expected: "number or \"*\"",
                    found: other.element_type(),
                })
            }
            None => {}
        }

        for key in request.command.keys().skip(1) {
            if let Some((name, value)) = PARAMETERS.iter().find(|(name, _)| *name == key) {
                reply.set(*name, *value);
            }
        }
        if reply.is_empty() {
            return Err(ServerError::InvalidOption(
                "no option found to get".to_string(),
            ));
        }
        Ok(ok_reply(reply))
    }
}

impl CommandHandler for HandshakeHandler {
    fn handle(&self, session: &mut Session, request: &Request) -> Result<Document, ServerError> {
        match request.name() {
            "hello" => self.handle_hello(session, request, false),
            "isMaster" | "ismaster" => self.handle_hello(session, request, true),
            "ping" => Ok(ok_reply(Document::new())),
            "buildInfo" | "buildinfo" => self.handle_build_info(),
            "getParameter" => self.handle_get_parameter(request),
            "whatsmyuri" => {
                let mut reply = Document::new();
                reply.set("you", session.remote_addr.to_string());
                Ok(ok_reply(reply))
            }
            "endSessions" => Ok(ok_reply(Document::new())),
            other => Err(ServerError::CommandNotFound(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docwire_bson::ElementType;
    use docwire_protocol::{OpMsg, OpQuery, OpReply};

    fn session() -> Session {
        Session::new(7, "127.0.0.1:40000".parse().unwrap(), false)
    }

    fn command(pairs: Vec<(&str, Value)>) -> Request {
        let mut doc = Document::from_pairs(pairs).unwrap();
        doc.set("$db", "admin");
        let message = Message::new(1, 0, Op::Msg(OpMsg::new(doc)));
        Request::from_message(&message).unwrap()
    }

    fn run(pairs: Vec<(&str, Value)>) -> Result<Document, ServerError> {
        HandshakeHandler::new().handle(&mut session(), &command(pairs))
    }

    #[test]
    fn test_request_from_op_msg() {
        let body = Document::from_pairs([("insert", Value::from("users")), ("$db", "app".into())])
            .unwrap();
        let msg = OpMsg::new(body).with_sequence("documents", vec![Document::new()]);
        let request = Request::from_message(&Message::new(9, 0, Op::Msg(msg))).unwrap();

        assert_eq!(request.request_id, 9);
        assert_eq!(request.database, "app");
        assert_eq!(request.name(), "insert");
        assert_eq!(request.command.get_array("documents").unwrap().len(), 1);
    }

    #[test]
    fn test_request_requires_db() {
        let body = Document::from_pairs([("ping", 1i32)]).unwrap();
        let message = Message::new(1, 0, Op::Msg(OpMsg::new(body)));
        assert!(matches!(
            Request::from_message(&message),
            Err(ServerError::InvalidRequest(_))
        ));

        let body = Document::from_pairs([("ping", 1i32), ("$db", 5i32)]).unwrap();
        let message = Message::new(1, 0, Op::Msg(OpMsg::new(body)));
        assert!(matches!(
            Request::from_message(&message),
            Err(ServerError::TypeMismatch {
                found: ElementType::Int32,
                ..
            })
        ));
    }

    #[test]
    fn test_request_from_op_query() {
        let query = OpQuery::command("admin", Document::from_pairs([("isMaster", 1i32)]).unwrap());
        let request = Request::from_message(&Message::new(3, 0, Op::Query(query))).unwrap();
        assert_eq!(request.database, "admin");
        assert_eq!(request.name(), "isMaster");

        let inner = Document::from_pairs([("ping", 1i32)]).unwrap();
        let wrapped = Document::from_pairs([("$query", Value::Document(inner))]).unwrap();
        let query = OpQuery::command("admin", wrapped);
        let request = Request::from_message(&Message::new(4, 0, Op::Query(query))).unwrap();
        assert_eq!(request.name(), "ping");

        let mut query = OpQuery::command("app", Document::new());
        query.full_collection_name = "app.users".to_string();
        assert!(Request::from_message(&Message::new(5, 0, Op::Query(query))).is_err());
    }

    #[test]
    fn test_request_rejects_reply_and_empty() {
        let reply = Message::new(1, 0, Op::Reply(OpReply::new(vec![])));
        assert!(Request::from_message(&reply).is_err());

        let query = OpQuery::command("admin", Document::new());
        assert!(matches!(
            Request::from_message(&Message::new(1, 0, Op::Query(query))),
            Err(ServerError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_ping() {
        let reply = run(vec![("ping", Value::Int32(1))]).unwrap();
        assert_eq!(reply.get_f64("ok"), Some(1.0));
        assert_eq!(reply.len(), 1);
    }

    #[test]
    fn test_hello() {
        let reply = run(vec![("hello", Value::Int32(1))]).unwrap();
        assert_eq!(reply.get_bool("isWritablePrimary"), Some(true));
        assert!(!reply.contains_key("ismaster"));
        assert_eq!(reply.get_i32("maxBsonObjectSize"), Some(16 * 1024 * 1024));
        assert_eq!(reply.get_i32("maxMessageSizeBytes"), Some(48_000_000));
        assert_eq!(reply.get_i32("maxWriteBatchSize"), Some(100_000));
        assert_eq!(reply.get_i64("connectionId"), Some(7));
        assert_eq!(reply.get_i32("maxWireVersion"), Some(17));
        assert!(matches!(reply.get("localTime"), Some(Value::DateTime(_))));
        assert_eq!(reply.keys().last(), Some("ok"));
    }

    #[test]
    fn test_legacy_is_master() {
        let reply = run(vec![("isMaster", Value::Int32(1)), ("helloOk", true.into())]).unwrap();
        assert_eq!(reply.get_bool("ismaster"), Some(true));
        assert_eq!(reply.get_bool("helloOk"), Some(true));
        assert!(!reply.contains_key("isWritablePrimary"));

        let reply = run(vec![("ismaster", Value::Int32(1))]).unwrap();
        assert!(!reply.contains_key("helloOk"));
    }

    #[test]
    fn test_hello_records_client_metadata() {
        let app = Document::from_pairs([("name", "etl")]).unwrap();
        let client = Document::from_pairs([("application", Value::Document(app))]).unwrap();
        let request = command(vec![("hello", Value::Int32(1)), ("client", client.into())]);

        let mut session = session();
        HandshakeHandler::new().handle(&mut session, &request).unwrap();
        assert_eq!(session.app_name(), Some("etl"));

        let err = run(vec![("hello", Value::Int32(1)), ("client", "x".into())]).unwrap_err();
        assert!(matches!(err, ServerError::TypeMismatch { .. }));
    }

    #[test]
    fn test_advertised_message_size() {
        let handler =
            HandshakeHandler::with_info(ServerInfo::default().with_max_message_size(1 << 20));
        let reply = handler
            .handle(&mut session(), &command(vec![("hello", Value::Int32(1))]))
            .unwrap();
        assert_eq!(reply.get_i32("maxMessageSizeBytes"), Some(1 << 20));
    }

    #[test]
    fn test_build_info() {
        let reply = run(vec![("buildInfo", Value::Int32(1))]).unwrap();
        assert_eq!(reply.get_str("version"), Some("6.0.0"));
        let array = reply.get_array("versionArray").unwrap();
        assert_eq!(array.len(), 4);
        assert_eq!(reply.get_f64("ok"), Some(1.0));
    }

    #[test]
    fn test_get_parameter() {
        let reply = run(vec![("getParameter", Value::Int32(1)), ("logLevel", Value::Int32(1))])
            .unwrap();
        assert_eq!(reply.get_i32("logLevel"), Some(0));
        assert!(!reply.contains_key("quiet"));

        let reply = run(vec![("getParameter", "*".into())]).unwrap();
        assert!(reply.contains_key("logLevel"));
        assert!(reply.contains_key("quiet"));

        let err = run(vec![("getParameter", Value::Int32(1)), ("nope", Value::Int32(1))])
            .unwrap_err();
        assert!(matches!(err, ServerError::InvalidOption(_)));

        let err = run(vec![("getParameter", Value::Boolean(true))]).unwrap_err();
        assert!(matches!(err, ServerError::TypeMismatch { .. }));
    }

    #[test]
    fn test_whatsmyuri_and_end_sessions() {
        let reply = run(vec![("whatsmyuri", Value::Int32(1))]).unwrap();
        assert_eq!(reply.get_str("you"), Some("127.0.0.1:40000"));

        let reply = run(vec![("endSessions", Value::from(Vec::<Value>::new()))]).unwrap();
        assert_eq!(reply.get_f64("ok"), Some(1.0));
    }

    #[test]
    fn test_unknown_command() {
        let err = run(vec![("find", "users".into())]).unwrap_err();
        assert!(matches!(err, ServerError::CommandNotFound(ref name) if name == "find"));

        let reply = error_reply(&err);
        assert_eq!(reply.keys().collect::<Vec<_>>(), vec!["ok", "errmsg", "code", "codeName"]);
        assert_eq!(reply.get_f64("ok"), Some(0.0));
        assert_eq!(reply.get_i32("code"), Some(59));
        assert_eq!(reply.get_str("codeName"), Some("CommandNotFound"));
        assert_eq!(reply.get_str("errmsg"), Some("no such command: 'find'"));
    }
}
