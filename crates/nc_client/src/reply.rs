//! The reply classifier (§4.G): maps a `<rpc-reply>` body to `Ok`,
//! structured `Error`, or `Data`, using the originating RPC to pick the
//! schema node a data reply is parsed under.

use crate::error::{NcError, NcResult};
use crate::xmlutil::{root_attr, root_local_name, top_level_children};
use nc_model::{DataTree, ErrorRecord, ErrorSeverity, ErrorTag, ErrorType, Reply, Rpc};
use quick_xml::escape::unescape;
use tracing::warn;

pub fn classify(reply_xml: &str, rpc: &Rpc) -> NcResult<Reply> {
    let children = top_level_children(reply_xml);
    if children.is_empty() {
        return Err(NcError::Protocol("malformed <rpc-reply>: no children".to_string()));
    }

    if children.iter().all(|(name, _)| name == "rpc-error") {
        let records = children.iter().map(|(_, raw)| parse_rpc_error(raw)).collect();
        return Ok(Reply::Error(records));
    }

    let ok_count = children.iter().filter(|(name, _)| name == "ok").count();
    if ok_count > 0 {
        return if children.len() == 1 {
            Ok(Reply::Ok)
        } else {
            Err(NcError::Protocol(
                "<ok/> reply carries unexpected sibling elements".to_string(),
            ))
        };
    }

    if !rpc.expects_data_reply() {
        return Err(NcError::Protocol(format!(
            "operation '{}' has no defined data output but the reply carries data",
            rpc.operation_name()
        )));
    }

    let schema_node = schema_hint(rpc);
    let xml = match rpc {
        Rpc::GetConfig { .. } | Rpc::Get { .. } | Rpc::GetSchema { .. } => children
            .iter()
            .find(|(name, _)| name == "data")
            .map(|(_, raw)| raw.clone())
            .unwrap_or_else(|| reply_xml.to_string()),
        _ => reply_xml.to_string(),
    };
    Ok(Reply::Data(DataTree { schema_node, xml }))
}

fn schema_hint(rpc: &Rpc) -> String {
    match rpc {
        Rpc::GetConfig { .. } => "get-config/data".to_string(),
        Rpc::Get { .. } => "get/data".to_string(),
        Rpc::GetSchema { .. } => "/ietf-netconf-monitoring:get-schema".to_string(),
        Rpc::Generic(payload) => root_local_name(payload).unwrap_or_else(|| "unknown".to_string()),
        _ => "unknown".to_string(),
    }
}

/// Decodes the text content of a single captured element, e.g.
/// `<error-tag>lock-denied</error-tag>` → `"lock-denied"`.
fn inner_text(raw: &str) -> String {
    use quick_xml::events::Event;
    use quick_xml::reader::Reader;
    let mut reader = Reader::from_str(raw);
    let mut buf = Vec::new();
    let mut text = String::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Text(t)) => {
                if let Ok(decoded) = unescape(&t.decode().unwrap_or_default()) {
                    text.push_str(&decoded);
                }
            }
            Ok(Event::CData(t)) => {
                text.push_str(&String::from_utf8_lossy(&t));
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
    text
}

/// Builds one `ErrorRecord` from a captured `<rpc-error>...</rpc-error>`
/// string (§4.G, §8 scenario 4). Unknown values are logged and ignored;
/// duplicate scalar fields are logged and the first wins; unrecognized
/// `error-info` children are preserved verbatim in `other_info`.
fn parse_rpc_error(raw: &str) -> ErrorRecord {
    let mut record = ErrorRecord::default();
    for (name, child_raw) in top_level_children(raw) {
        match name.as_str() {
            "error-type" => set_once(&mut record.error_type, || {
                let text = inner_text(&child_raw);
                match ErrorType::from_wire(&text) {
                    Some(v) => Some(v),
                    None => {
                        warn!(target: "reply", value = %text, "unknown error-type, ignored");
                        None
                    }
                }
            }),
            "error-tag" => set_once(&mut record.tag, || {
                let text = inner_text(&child_raw);
                match ErrorTag::from_wire(&text) {
                    Some(v) => Some(v),
                    None => {
                        warn!(target: "reply", value = %text, "unknown error-tag, ignored");
                        None
                    }
                }
            }),
            "error-severity" => set_once(&mut record.severity, || {
                let text = inner_text(&child_raw);
                match ErrorSeverity::from_wire(&text) {
                    Some(v) => Some(v),
                    None => {
                        warn!(target: "reply", value = %text, "unknown error-severity, ignored");
                        None
                    }
                }
            }),
            "error-app-tag" => set_once_string(&mut record.app_tag, inner_text(&child_raw)),
            "error-path" => set_once_string(&mut record.path, inner_text(&child_raw)),
            "error-message" => {
                set_once_string(&mut record.message, inner_text(&child_raw));
                if record.message_lang.is_none() {
                    record.message_lang = root_attr(&child_raw, "lang");
                }
            }
            "error-info" => parse_error_info(&child_raw, &mut record),
            other => warn!(target: "reply", element = other, "unknown rpc-error child, ignored"),
        }
    }
    record
}

fn parse_error_info(raw: &str, record: &mut ErrorRecord) {
    for (name, child_raw) in top_level_children(raw) {
        match name.as_str() {
            "session-id" => set_once_string(&mut record.session_id, inner_text(&child_raw)),
            "bad-attribute" => record.bad_attr.push(inner_text(&child_raw)),
            "bad-element" => record.bad_element.push(inner_text(&child_raw)),
            "bad-namespace" => record.bad_namespace.push(inner_text(&child_raw)),
            _ => record.other_info.push(child_raw),
        }
    }
}

fn set_once<T>(slot: &mut Option<T>, make: impl FnOnce() -> Option<T>) {
    if slot.is_some() {
        warn!(target: "reply", "duplicate rpc-error field, first wins");
        return;
    }
    *slot = make();
}

fn set_once_string(slot: &mut Option<String>, value: String) {
    if slot.is_some() {
        warn!(target: "reply", "duplicate rpc-error field, first wins");
        return;
    }
    *slot = Some(value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use nc_model::{Datastore, Filter};

    #[test]
    fn classifies_ok_with_no_siblings() {
        let reply = r#"<rpc-reply message-id="1"><ok/></rpc-reply>"#;
        let rpc = Rpc::Discard;
        assert_eq!(classify(reply, &rpc).unwrap(), Reply::Ok);
    }

    #[test]
    fn ok_with_siblings_is_protocol_error() {
        let reply = r#"<rpc-reply message-id="1"><ok/><data/></rpc-reply>"#;
        let rpc = Rpc::Get { filter: None, wd_mode: None };
        assert!(classify(reply, &rpc).is_err());
    }

    #[test]
    fn parses_structured_rpc_error() {
        let reply = r#"<rpc-reply message-id="1"><rpc-error><error-type>application</error-type><error-tag>lock-denied</error-tag><error-severity>error</error-severity><error-info><session-id>42</session-id></error-info></rpc-error></rpc-reply>"#;
        let rpc = Rpc::Lock { target: Datastore::Candidate };
        let reply = classify(reply, &rpc).unwrap();
        match reply {
            Reply::Error(errs) => {
                assert_eq!(errs.len(), 1);
                assert_eq!(errs[0].error_type, Some(ErrorType::Application));
                assert_eq!(errs[0].tag, Some(ErrorTag::LockDenied));
                assert_eq!(errs[0].severity, Some(ErrorSeverity::Error));
                assert_eq!(errs[0].session_id.as_deref(), Some("42"));
            }
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[test]
    fn get_config_data_is_classified_under_children_of_data() {
        let reply = r#"<rpc-reply message-id="9"><data><top xmlns="u"><a>1</a></top></data></rpc-reply>"#;
        let rpc = Rpc::GetConfig {
            source: Datastore::Running,
            filter: Some(Filter::from_raw("<top/>")),
            wd_mode: None,
        };
        match classify(reply, &rpc).unwrap() {
            Reply::Data(tree) => {
                assert_eq!(tree.schema_node, "get-config/data");
                assert!(tree.xml.contains("<top"));
            }
            other => panic!("expected Data, got {other:?}"),
        }
    }

    #[test]
    fn get_schema_data_is_classified_under_children_of_data() {
        let reply = r#"<rpc-reply message-id="4"><data><module name="foo" xmlns="urn:ietf:params:xml:ns:yang:yin:1"/></data></rpc-reply>"#;
        let rpc = Rpc::GetSchema {
            identifier: "foo".to_string(),
            version: None,
            format: None,
        };
        match classify(reply, &rpc).unwrap() {
            Reply::Data(tree) => {
                assert_eq!(tree.schema_node, "/ietf-netconf-monitoring:get-schema");
                assert!(tree.xml.contains("<module"));
                assert!(!tree.xml.contains("rpc-reply"));
            }
            other => panic!("expected Data, got {other:?}"),
        }
    }

    #[test]
    fn operation_with_no_output_receiving_data_is_protocol_error() {
        let reply = r#"<rpc-reply message-id="1"><some-unexpected-data/></rpc-reply>"#;
        let rpc = Rpc::Discard;
        assert!(classify(reply, &rpc).is_err());
    }

    #[test]
    fn duplicate_error_type_keeps_first() {
        let reply = r#"<rpc-reply message-id="1"><rpc-error><error-type>application</error-type><error-type>protocol</error-type><error-tag>operation-failed</error-tag></rpc-error></rpc-reply>"#;
        let rpc = Rpc::Discard;
        match classify(reply, &rpc).unwrap() {
            Reply::Error(errs) => assert_eq!(errs[0].error_type, Some(ErrorType::Application)),
            other => panic!("expected Error, got {other:?}"),
        }
    }
}
