//! Small, shallow XML helpers shared by the transport classifier, the
//! reply classifier, and the handshake resolver. Like `nc_schema`'s YIN
//! reader, these walk events with `quick_xml::Reader` rather than building
//! a full DOM — the core only ever needs the root tag, a handful of
//! attributes, and the raw text of top-level children.

use quick_xml::events::Event;
use quick_xml::reader::Reader;

/// The local (namespace-stripped) name of the document's root element.
pub fn root_local_name(xml: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(tag)) | Ok(Event::Empty(tag)) => {
                let local = tag.local_name();
                return Some(String::from_utf8_lossy(local.as_ref()).into_owned());
            }
            Ok(Event::Eof) => return None,
            Err(_) => return None,
            _ => {}
        }
        buf.clear();
    }
}

/// Reads a named attribute off the document's root element.
pub fn root_attr(xml: &str, attr_local_name: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(tag)) | Ok(Event::Empty(tag)) => {
                for attr in tag.attributes().flatten() {
                    if attr.key.local_name().as_ref() == attr_local_name.as_bytes() {
                        return Some(String::from_utf8_lossy(&attr.value).into_owned());
                    }
                }
                return None;
            }
            Ok(Event::Eof) => return None,
            Err(_) => return None,
            _ => {}
        }
        buf.clear();
    }
}

/// `message-id` off the root element, parsed to `u64` (§4.D, §7 "missing
/// message-id").
pub fn root_message_id(xml: &str) -> Option<u64> {
    root_attr(xml, "message-id").and_then(|v| v.parse().ok())
}

/// Splits the document's root element into its direct children, returning
/// `(local_name, raw_xml_of_that_child)` pairs in document order. Used by
/// the reply classifier (§4.G) to decide `ok` vs `rpc-error` vs data
/// without parsing the data payload itself.
pub fn top_level_children(xml: &str) -> Vec<(String, String)> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut depth = 0i32;
    let mut children = Vec::new();
    let mut current: Option<(String, usize)> = None; // (name, start offset into xml)

    loop {
        let pos_before = reader.buffer_position();
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(tag)) => {
                depth += 1;
                if depth == 2 {
                    let local = tag.local_name();
                    let name = String::from_utf8_lossy(local.as_ref()).into_owned();
                    current = Some((name, pos_before as usize));
                }
            }
            Ok(Event::Empty(tag)) => {
                if depth == 1 {
                    let local = tag.local_name();
                    let name = String::from_utf8_lossy(local.as_ref()).into_owned();
                    let end = reader.buffer_position() as usize;
                    let raw = xml.get(pos_before as usize..end).unwrap_or("").to_string();
                    children.push((name, raw));
                }
            }
            Ok(Event::End(_)) => {
                if depth == 2 {
                    if let Some((name, start)) = current.take() {
                        let end = reader.buffer_position() as usize;
                        let raw = xml.get(start..end).unwrap_or("").to_string();
                        children.push((name, raw));
                    }
                }
                depth -= 1;
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
    children
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_local_name_strips_namespace_prefix() {
        assert_eq!(
            root_local_name(r#"<rpc-reply message-id="3" xmlns="urn:x"><ok/></rpc-reply>"#),
            Some("rpc-reply".to_string())
        );
    }

    #[test]
    fn root_message_id_parses_numeric_attribute() {
        assert_eq!(
            root_message_id(r#"<rpc-reply message-id="42"><ok/></rpc-reply>"#),
            Some(42)
        );
        assert_eq!(root_message_id(r#"<rpc-reply><ok/></rpc-reply>"#), None);
    }

    #[test]
    fn top_level_children_splits_single_ok() {
        let children = top_level_children(r#"<rpc-reply message-id="1"><ok/></rpc-reply>"#);
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].0, "ok");
    }

    #[test]
    fn top_level_children_splits_multiple_errors() {
        let xml = r#"<rpc-reply message-id="1"><rpc-error><error-tag>lock-denied</error-tag></rpc-error><rpc-error><error-tag>in-use</error-tag></rpc-error></rpc-reply>"#;
        let children = top_level_children(xml);
        assert_eq!(children.len(), 2);
        assert!(children.iter().all(|(n, _)| n == "rpc-error"));
    }
}
