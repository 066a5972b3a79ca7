//! The public client surface (§6): the hello handshake entry point, the
//! cross-cutting send/receive path, and the explicit `Client` context that
//! replaces the source's process-wide globals (§3 "Client context", §9
//! "Global mutable state").

use crate::callhome;
use crate::config;
use crate::dispatcher;
use crate::error::{NcError, NcResult};
use crate::handshake;
use crate::reply;
use crate::router::{self, RouterMessage};
use crate::rpc;
use crate::session::Session;
use crate::transport::{RawMessage, TcpTransport, Transport};
use nc_model::{Capability, Reply, Rpc, Status, BASE_NS};
use nc_schema::{SchemaContext, YinDirContext};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Fallback YANG search directory used when neither `schema_searchpath`
/// nor `NC_SCHEMA_SEARCHPATH` has been configured.
const DEFAULT_SCHEMA_SEARCHPATH: &str = "schemas";

/// One pre-bound call-home listen address, tracked by the application
/// rather than a process-wide table.
#[derive(Debug, Clone)]
pub struct CallHomeBind {
    pub address: String,
    pub port: u16,
}

/// Explicit, application-owned context (§3): the fallback schema search
/// path and the set of call-home binds currently configured. There is
/// exactly one of these per application, constructed and torn down by the
/// caller rather than hidden behind module-level statics.
pub struct Client {
    pub schema_searchpath: Option<PathBuf>,
    pub call_home_binds: Vec<CallHomeBind>,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    pub fn new() -> Self {
        Client {
            schema_searchpath: config::env_schema_searchpath(),
            call_home_binds: Vec::new(),
        }
    }

    /// Process-wide (well, context-wide) configuration of the fallback YANG
    /// search directory (§6). Overwrites any path set previously.
    pub fn schema_searchpath(&mut self, path: impl Into<PathBuf>) {
        self.schema_searchpath = Some(path.into());
    }

    /// Clears the fallback YANG search directory (§8 idempotence: calling
    /// this after `schema_searchpath(p)` frees the path; calling it twice
    /// in a row is safe and a no-op the second time).
    pub fn clear_schema_searchpath(&mut self) {
        self.schema_searchpath = None;
    }

    pub fn add_callhome_bind(&mut self, address: impl Into<String>, port: u16) {
        self.call_home_binds.push(CallHomeBind {
            address: address.into(),
            port,
        });
    }

    /// Builds the default `YinDirContext` rooted at `schema_searchpath`
    /// (falling back to `schemas/` when unset), used by `connect_inout`
    /// when the caller does not supply its own schema context.
    fn default_schema_context(&self) -> Arc<dyn SchemaContext> {
        let dir = self
            .schema_searchpath
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SCHEMA_SEARCHPATH));
        Arc::new(YinDirContext::new(dir))
    }

    /// Accepts a single inbound call-home connection on the first
    /// registered bind (§6 `accept_callhome`), trying each configured
    /// `(address, port)` pair in registration order until one connects or
    /// all have timed out.
    pub fn accept_callhome(&self, timeout: Duration) -> NcResult<TcpTransport> {
        if self.call_home_binds.is_empty() {
            return Err(NcError::Arg("no call-home binds registered on this client".to_string()));
        }
        let mut last_err = None;
        for bind in &self.call_home_binds {
            let addr = format!("{}:{}", bind.address, bind.port);
            match callhome::accept_callhome(&addr, timeout) {
                Ok(transport) => return Ok(transport),
                Err(err) => {
                    warn!(target: "client", address = %addr, %err, "call-home bind did not yield a connection");
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.expect("loop ran at least once since call_home_binds is non-empty"))
    }

    /// Performs the `<hello>` exchange over `transport` and fills the
    /// schema context from the peer's advertised capabilities (§4.E).
    /// Total failure to load the base `ietf-netconf` module is fatal;
    /// per-module failures are logged and the session still reaches
    /// `running` with a partial schema (§4.E.4). `schema_ctx` lets the
    /// caller supply its own context (e.g. preloaded with embedded
    /// modules); `None` builds the default one from `schema_searchpath`.
    pub fn connect_inout(
        &self,
        mut transport: Box<dyn Transport>,
        schema_ctx: Option<Arc<dyn SchemaContext>>,
        shared_ctx: bool,
        client_capabilities: &[Capability],
    ) -> NcResult<Arc<Session>> {
        let schema_ctx = schema_ctx.unwrap_or_else(|| self.default_schema_context());
        transport.send_msg(&build_hello(client_capabilities))?;
        let peer_hello = match transport.read_msg_poll(-1)? {
            Some(RawMessage::Hello(xml)) => xml,
            Some(_) => return Err(NcError::Protocol("expected <hello> as the first message".to_string())),
            None => return Err(NcError::Protocol("transport closed before <hello>".to_string())),
        };

        let session = Arc::new(Session::new(transport, schema_ctx, shared_ctx));
        session.lock().capabilities = parse_hello_capabilities(&peer_hello);

        let outcome = handshake::resolve_capabilities(&session).map_err(|err| {
            session.lock().status = Status::Invalid;
            err
        })?;
        session.lock().status = Status::Running;

        if outcome.loaded < outcome.requested {
            let partial = NcError::PartialSchema {
                loaded: outcome.loaded,
                requested: outcome.requested,
            };
            warn!(target: "client", "{partial}");
        }

        Ok(session)
    }

    /// Releases the explicit context. There is no hidden process-wide state
    /// left behind to clean up — dropping `self` is sufficient, but this
    /// method is kept as the named teardown call the public API specifies
    /// (§6 `client_destroy`).
    pub fn client_destroy(self) {}
}

/// The single base capability every client advertises; callers extend this
/// with module capabilities their own application supports.
pub fn default_client_capabilities() -> Vec<Capability> {
    vec![Capability("urn:ietf:params:netconf:base:1.0".to_string())]
}

/// Marks a still-open session `closing`. The session is not auto-closed on
/// any error path (§3 Lifecycle): the caller must call this once it is done
/// with the session and then drop its last `Arc<Session>`.
pub fn close(session: &Session) {
    session.lock().status = Status::Closing;
}

/// Builds, validates, and sends one RPC (§4 cross-cutting Send path):
/// acquire the lock with `timeout_ms`, assign the next `message-id`, write
/// the framed message, release the lock. Returns the RPC back to the
/// caller alongside the assigned id, as `(Rpc, msgid)`.
pub fn send_rpc(session: &Session, rpc: Rpc, timeout_ms: i64) -> NcResult<(Rpc, u64)> {
    let mut guard = session.lock_timed(timeout_ms)?;
    let msgid = guard.next_msgid + 1;
    let xml = rpc::build(&rpc, msgid, session.schema_ctx.as_ref())?;
    guard.transport.send_msg(&xml)?;
    guard.next_msgid = msgid;
    Ok((rpc, msgid))
}

/// Waits for the reply to `msgid`, routes it through the queues (§4.D),
/// and classifies it against the originating `rpc` (§4.G).
pub fn recv_reply(session: &Session, timeout_ms: i64, msgid: u64, rpc: &Rpc) -> NcResult<Reply> {
    match router::get_msg(session, timeout_ms, msgid)? {
        RouterMessage::Reply(xml) => reply::classify(&xml, rpc),
        RouterMessage::Notif(_) => Err(NcError::Internal(
            "router returned a notification for a reply request".to_string(),
        )),
    }
}

/// Waits for the next notification (§4.D, `wanted_msgid = 0`).
pub fn recv_notif(session: &Session, timeout_ms: i64) -> NcResult<String> {
    match router::get_msg(session, timeout_ms, router::WANT_NOTIF)? {
        RouterMessage::Notif(xml) => Ok(xml),
        RouterMessage::Reply(_) => Err(NcError::Internal(
            "router returned a reply for a notification request".to_string(),
        )),
    }
}

/// Spawns the (at most one) dispatcher thread for `session` (§4.H).
pub fn recv_notif_dispatch(session: Arc<Session>, callback: impl Fn(String) + Send + 'static) {
    dispatcher::spawn(session, Box::new(callback));
}

fn build_hello(capabilities: &[Capability]) -> String {
    let caps_xml: String = capabilities
        .iter()
        .map(|c| format!("<capability>{}</capability>", escape(&c.0)))
        .collect();
    format!(r#"<hello xmlns="{BASE_NS}"><capabilities>{caps_xml}</capabilities></hello>"#)
}

fn escape(value: &str) -> String {
    value.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn parse_hello_capabilities(xml: &str) -> Vec<Capability> {
    use quick_xml::events::Event;
    use quick_xml::reader::Reader;
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut caps = Vec::new();
    let mut in_capability = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(tag)) if tag.local_name().as_ref() == b"capability" => in_capability = true,
            Ok(Event::End(tag)) if tag.local_name().as_ref() == b"capability" => in_capability = false,
            Ok(Event::Text(t)) if in_capability => {
                if let Ok(text) = t.decode() {
                    caps.push(Capability(text.trim().to_string()));
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
    caps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryPipeTransport;
    use nc_schema::YinDirContext;

    fn yin(name: &str) -> String {
        format!(
            r#"<module name="{name}" xmlns="urn:ietf:params:xml:ns:yang:yin:1"><revision date="2011-06-01"/></module>"#
        )
    }

    #[test]
    fn default_capabilities_advertise_base_only() {
        let caps = default_client_capabilities();
        assert_eq!(caps.len(), 1);
        assert!(caps[0].is_base());
    }

    #[test]
    fn send_rpc_assigns_strictly_increasing_message_ids() {
        let (a, b) = MemoryPipeTransport::new_pair();
        let ctx = Arc::new(YinDirContext::new("/nonexistent"));
        ctx.preload("ietf-netconf", Some("2011-06-01"), &yin("ietf-netconf")).unwrap();
        let session = Session::new(Box::new(a), ctx, false);
        let _b = b; // keep the peer end alive so sends don't hit a disconnected channel

        let (_rpc1, id1) = send_rpc(&session, Rpc::Discard, -1).unwrap();
        let (_rpc2, id2) = send_rpc(&session, Rpc::Discard, -1).unwrap();
        assert_eq!(id1, 1);
        assert_eq!(id2, 2);
    }

    #[test]
    fn send_rpc_reports_would_block_when_lock_contended() {
        let (a, _b) = MemoryPipeTransport::new_pair();
        let ctx = Arc::new(YinDirContext::new("/nonexistent"));
        ctx.preload("ietf-netconf", Some("2011-06-01"), &yin("ietf-netconf")).unwrap();
        let session = Session::new(Box::new(a), ctx, false);
        let held = session.lock();
        let result = send_rpc(&session, Rpc::Discard, 20);
        drop(held);
        assert!(matches!(result, Err(NcError::WouldBlock(_))));
    }

    #[test]
    fn connect_inout_reaches_running_with_only_base_capability() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ietf-netconf.yin"), yin("ietf-netconf")).unwrap();
        let ctx: Arc<dyn SchemaContext> = Arc::new(YinDirContext::new(dir.path()));

        let (client_transport, mut server_transport) = MemoryPipeTransport::new_pair();
        let server = std::thread::spawn(move || {
            server_transport.read_msg_poll(-1).unwrap();
            server_transport
                .send_msg(
                    r#"<hello xmlns="urn:ietf:params:xml:ns:netconf:base:1.0"><capabilities><capability>urn:ietf:params:netconf:base:1.0</capability></capabilities></hello>"#,
                )
                .unwrap();
        });

        let client_api = Client::new();
        let session = client_api
            .connect_inout(Box::new(client_transport), Some(ctx), false, &default_client_capabilities())
            .unwrap();
        server.join().unwrap();
        assert!(matches!(session.status(), Status::Running));
        assert!(session.schema_ctx.has_module("ietf-netconf", None));
    }

    #[test]
    fn close_marks_session_closing() {
        let (a, _b) = MemoryPipeTransport::new_pair();
        let ctx = Arc::new(YinDirContext::new("/nonexistent"));
        let session = Session::new(Box::new(a), ctx, false);
        close(&session);
        assert!(matches!(session.status(), Status::Closing));
    }

    #[test]
    fn schema_searchpath_clear_is_idempotent() {
        let mut client = Client::new();
        client.schema_searchpath("/some/dir");
        assert_eq!(client.schema_searchpath, Some(PathBuf::from("/some/dir")));

        client.clear_schema_searchpath();
        assert_eq!(client.schema_searchpath, None);
        // A second clear is a safe no-op (§8 idempotence).
        client.clear_schema_searchpath();
        assert_eq!(client.schema_searchpath, None);
    }

    #[test]
    fn connect_inout_builds_default_context_from_schema_searchpath_when_none_supplied() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ietf-netconf.yin"), yin("ietf-netconf")).unwrap();

        let (client_transport, mut server_transport) = MemoryPipeTransport::new_pair();
        let server = std::thread::spawn(move || {
            server_transport.read_msg_poll(-1).unwrap();
            server_transport
                .send_msg(
                    r#"<hello xmlns="urn:ietf:params:xml:ns:netconf:base:1.0"><capabilities><capability>urn:ietf:params:netconf:base:1.0</capability></capabilities></hello>"#,
                )
                .unwrap();
        });

        let mut client_api = Client::new();
        client_api.schema_searchpath(dir.path());
        let session = client_api
            .connect_inout(Box::new(client_transport), None, false, &default_client_capabilities())
            .unwrap();
        server.join().unwrap();
        assert!(matches!(session.status(), Status::Running));
        assert!(session.schema_ctx.has_module("ietf-netconf", None));
    }

    #[test]
    fn accept_callhome_errors_with_no_binds_registered() {
        let client = Client::new();
        let result = client.accept_callhome(Duration::from_millis(10));
        assert!(matches!(result, Err(NcError::Arg(_))));
    }

    #[test]
    fn accept_callhome_reads_registered_binds() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let bound = listener.local_addr().unwrap();
        drop(listener);

        let connector = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            std::net::TcpStream::connect(bound).unwrap()
        });

        let mut client = Client::new();
        client.add_callhome_bind(bound.ip().to_string(), bound.port());
        let result = client.accept_callhome(Duration::from_secs(2));
        assert!(result.is_ok());
        connector.join().unwrap();
    }
}
