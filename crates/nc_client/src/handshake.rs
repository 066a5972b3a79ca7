//! The hello handshake and capability resolver (§4.E): turns the peer's
//! advertised capability URIs into a loaded, feature-enabled schema
//! context, installing a `<get-schema>`-backed module-fetch callback when
//! the peer supports `ietf-netconf-monitoring`.

use crate::client;
use crate::config;
use crate::error::NcError;
use crate::session::Session;
use nc_model::{Capability, GetSchemaFormat, ModuleRequest, Reply, Rpc};
use nc_schema::{ModuleFetchFn, SchemaContext, SchemaError};
use std::sync::Arc;
use tracing::warn;

/// Base-capability URI fragments mapped onto `ietf-netconf` feature names
/// (§4.E step 2: "Enable features keyed on base-capability URIs").
const BASE_FEATURE_FRAGMENTS: &[(&str, &str)] = &[
    (":writable-running:", "writable-running"),
    (":candidate:", "candidate"),
    (":confirmed-commit:", "confirmed-commit"),
    (":rollback-on-error:", "rollback-on-error"),
    (":validate:", "validate"),
    (":startup:", "startup"),
    (":url:", "url"),
    (":xpath:", "xpath"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOutcome {
    pub loaded: usize,
    pub requested: usize,
}

/// Resolves `session.capabilities()` into the schema context, per §4.E
/// steps 1-4. Returns the count of modules successfully loaded vs.
/// requested; the caller (`client::connect_inout`) decides whether a
/// partial result is fatal. The on-disk schema directory is not a
/// parameter here: it is baked into `session.schema_ctx` at construction.
pub fn resolve_capabilities(session: &Arc<Session>) -> Result<ResolveOutcome, NcError> {
    let caps = session.capabilities();
    let ctx = session.schema_ctx.clone();

    let monitors = caps
        .iter()
        .any(|c| matches!(c.module_request(), Some(req) if req.name == "ietf-netconf-monitoring"));
    if monitors {
        install_getschema_callback(session, &ctx);
    }

    let base_req = ModuleRequest {
        name: "ietf-netconf".to_string(),
        revision: None,
        features: Vec::new(),
        deviations: Vec::new(),
    };
    ctx.load_module(&base_req).map_err(|err| {
        NcError::Schema(SchemaError::LoadFailed {
            name: "ietf-netconf".to_string(),
            source: err.to_string(),
        })
    })?;
    for (fragment, feature) in BASE_FEATURE_FRAGMENTS {
        if caps.iter().any(|c| c.0.contains(fragment)) {
            if let Err(err) = ctx.enable_feature("ietf-netconf", feature) {
                warn!(target: "handshake", feature, %err, "could not enable base feature");
            }
        }
    }

    let module_caps: Vec<(Capability, ModuleRequest)> = caps
        .into_iter()
        .filter(|c| !c.is_base())
        .filter_map(|c| c.module_request().map(|req| (c, req)))
        .filter(|(_, req)| req.name != "ietf-netconf")
        .collect();

    let requested = module_caps.len();
    let mut loaded = 0usize;
    for (_cap, req) in module_caps {
        let result = match ctx.load_module(&req) {
            Ok(()) => Ok(()),
            Err(first_err) if monitors => {
                warn!(target: "handshake", module = %req.name, %first_err, "retrying module load with get-schema callback suspended");
                let prior = ctx.set_module_fetch_callback(None);
                let retry = ctx.load_module(&req);
                ctx.set_module_fetch_callback(prior);
                retry
            }
            Err(err) => Err(err),
        };
        match result {
            Ok(()) => {
                loaded += 1;
                for feature in &req.features {
                    if let Err(err) = ctx.enable_feature(&req.name, feature) {
                        warn!(target: "handshake", module = %req.name, feature, %err, "could not enable feature");
                    }
                }
            }
            Err(err) => warn!(target: "handshake", module = %req.name, %err, "module failed to load, continuing without it"),
        }
    }

    Ok(ResolveOutcome { loaded, requested })
}

/// Loads `ietf-netconf-monitoring` straight from disk (no callback is
/// installed yet) and, on success, installs a fetch callback that issues
/// `<get-schema>` over this same session for subsequent module requests.
fn install_getschema_callback(session: &Arc<Session>, ctx: &Arc<dyn SchemaContext>) {
    let req = ModuleRequest {
        name: "ietf-netconf-monitoring".to_string(),
        revision: None,
        features: Vec::new(),
        deviations: Vec::new(),
    };
    if let Err(err) = ctx.load_module(&req) {
        warn!(target: "handshake", %err, "failed to bootstrap ietf-netconf-monitoring; get-schema unavailable");
        return;
    }

    let bound_session = session.clone();
    let callback: ModuleFetchFn = Arc::new(move |name, revision| fetch_via_getschema(&bound_session, name, revision));
    ctx.set_module_fetch_callback(Some(callback));
}

/// The installed module-fetch callback (§4.E step 1): busy-waits on
/// `send_rpc` returning `would_block` with the configurable poll interval,
/// then receives with the fixed 250 ms budget.
fn fetch_via_getschema(session: &Arc<Session>, name: &str, revision: Option<&str>) -> Result<String, SchemaError> {
    let rpc = Rpc::GetSchema {
        identifier: name.to_string(),
        version: revision.map(str::to_string),
        format: Some(GetSchemaFormat::Yin),
    };

    let (sent_rpc, msgid) = loop {
        match client::send_rpc(session, rpc.clone(), 0) {
            Ok(pair) => break pair,
            Err(NcError::WouldBlock(_)) => {
                std::thread::sleep(config::getschema_poll_interval());
                continue;
            }
            Err(err) => {
                return Err(SchemaError::LoadFailed {
                    name: name.to_string(),
                    source: err.to_string(),
                })
            }
        }
    };

    let recv_timeout_ms = config::getschema_recv_timeout().as_millis() as i64;
    let reply = client::recv_reply(session, recv_timeout_ms, msgid, &sent_rpc).map_err(|err| SchemaError::LoadFailed {
        name: name.to_string(),
        source: err.to_string(),
    })?;

    match reply {
        Reply::Data(tree) => Ok(tree.xml),
        Reply::Error(errs) => Err(SchemaError::LoadFailed {
            name: name.to_string(),
            source: format!("get-schema rpc-error: {errs:?}"),
        }),
        Reply::Ok => Err(SchemaError::LoadFailed {
            name: name.to_string(),
            source: "get-schema returned <ok/> instead of module data".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MemoryPipeTransport, RawMessage};
    use crate::xmlutil::root_message_id;
    use nc_schema::YinDirContext;

    fn yin(name: &str) -> String {
        format!(
            r#"<module name="{name}" xmlns="urn:ietf:params:xml:ns:yang:yin:1"><revision date="2020-01-01"/></module>"#
        )
    }

    fn session_with_caps(caps: &[&str]) -> Arc<Session> {
        let (a, _b) = MemoryPipeTransport::new_pair();
        let ctx = Arc::new(YinDirContext::new("/nonexistent"));
        ctx.preload("ietf-netconf", Some("2020-01-01"), &yin("ietf-netconf")).unwrap();
        let session = Arc::new(Session::new(Box::new(a), ctx, false));
        {
            let mut guard = session.lock();
            guard.capabilities = caps.iter().map(|c| Capability(c.to_string())).collect();
        }
        session
    }

    #[test]
    fn base_module_is_always_loaded_and_features_enabled() {
        let session = session_with_caps(&[
            "urn:ietf:params:netconf:base:1.0",
            "urn:ietf:params:netconf:capability:candidate:1.0",
            "urn:ietf:params:netconf:capability:writable-running:1.0",
        ]);
        let outcome = resolve_capabilities(&session).unwrap();
        assert_eq!(outcome.requested, 0);
        let modules = session.schema_ctx.loaded_modules();
        let base = modules.iter().find(|m| m.name == "ietf-netconf").unwrap();
        assert!(base.features.contains("candidate"));
        assert!(base.features.contains("writable-running"));
    }

    #[test]
    fn missing_base_module_is_fatal() {
        let (a, _b) = MemoryPipeTransport::new_pair();
        let ctx: Arc<dyn SchemaContext> = Arc::new(YinDirContext::new("/nonexistent"));
        let session = Arc::new(Session::new(Box::new(a), ctx, false));
        let result = resolve_capabilities(&session);
        assert!(result.is_err());
    }

    /// §8 scenario 2: an unrecognized module capability advertised
    /// alongside `ietf-netconf-monitoring` is resolved through a live
    /// `<get-schema>` RPC round trip rather than the on-disk fallback.
    #[test]
    fn unrecognized_module_capability_loads_via_live_getschema_round_trip() {
        let (client_transport, server_transport) = MemoryPipeTransport::new_pair();
        let ctx = Arc::new(YinDirContext::new("/nonexistent"));
        ctx.preload("ietf-netconf", Some("2020-01-01"), &yin("ietf-netconf")).unwrap();
        ctx.preload(
            "ietf-netconf-monitoring",
            Some("2010-10-04"),
            &yin("ietf-netconf-monitoring"),
        )
        .unwrap();
        let client_session = Arc::new(Session::new(Box::new(client_transport), ctx, false));
        {
            let mut guard = client_session.lock();
            guard.capabilities = vec![
                Capability("urn:ietf:params:netconf:base:1.0".to_string()),
                Capability(
                    "urn:ietf:params:xml:ns:yang:ietf-netconf-monitoring?module=ietf-netconf-monitoring&revision=2010-10-04"
                        .to_string(),
                ),
                Capability("http://x.example/yang/foo?module=foo&revision=2020-01-01&features=a,b".to_string()),
            ];
        }

        let server_ctx: Arc<dyn SchemaContext> = Arc::new(YinDirContext::new("/nonexistent"));
        let server_session = Arc::new(Session::new(Box::new(server_transport), server_ctx, false));
        let server = std::thread::spawn(move || {
            let rpc_xml = loop {
                let mut guard = server_session.lock();
                match guard.transport.read_msg_poll(2_000).unwrap() {
                    Some(RawMessage::Rpc(xml)) => break xml,
                    Some(_) | None => continue,
                }
            };
            let msgid = root_message_id(&rpc_xml).expect("get-schema rpc carries a message-id");
            let reply = format!(
                r#"<rpc-reply message-id="{msgid}"><data>{}</data></rpc-reply>"#,
                yin("foo")
            );
            server_session.lock().transport.send_msg(&reply).unwrap();
        });

        let outcome = resolve_capabilities(&client_session).unwrap();
        server.join().unwrap();

        assert_eq!(outcome.loaded, outcome.requested);
        assert!(client_session.schema_ctx.has_module("foo", Some("2020-01-01")));
        let modules = client_session.schema_ctx.loaded_modules();
        let foo = modules.iter().find(|m| m.name == "foo").unwrap();
        assert!(foo.features.contains("a"));
        assert!(foo.features.contains("b"));
    }
}
