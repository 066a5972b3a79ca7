//! A minimal in-process NETCONF-speaking peer used only by the demo and its
//! integration tests, analogous to the teacher's `drivers/mock.rs`. It
//! accepts exactly one connection, performs the hello exchange, and then
//! answers whatever the demo CLI sends with a canned reply so the CLI is
//! runnable without a real NETCONF server.

use anyhow::{Context, Result};
use nc_client::transport::{RawMessage, Transport};
use nc_client::TcpTransport;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::net::TcpListener;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const FIXTURE_HELLO: &str = r#"<hello xmlns="urn:ietf:params:xml:ns:netconf:base:1.0"><capabilities><capability>urn:ietf:params:netconf:base:1.0</capability><capability>urn:ietf:params:netconf:base:1.0?module=ietf-netconf&amp;revision=2011-06-01&amp;features=candidate</capability></capabilities></hello>"#;

pub fn spawn(listener: TcpListener) -> JoinHandle<()> {
    thread::spawn(move || {
        if let Err(err) = run(listener) {
            tracing::warn!(target: "fixture", %err, "fixture peer exited with an error");
        }
    })
}

fn run(listener: TcpListener) -> Result<()> {
    let (stream, _peer) = listener.accept().context("accepting demo client connection")?;
    let mut transport = TcpTransport::new(stream);

    match transport.read_msg_poll(-1)? {
        Some(RawMessage::Hello(_)) => {}
        other => anyhow::bail!("expected <hello> first, got {other:?}"),
    }
    transport.send_msg(FIXTURE_HELLO)?;

    loop {
        let rpc_xml = match transport.read_msg_poll(-1) {
            Ok(Some(RawMessage::Rpc(xml))) => xml,
            Ok(Some(other)) => {
                tracing::warn!(target: "fixture", ?other, "unexpected message, ignoring");
                continue;
            }
            Ok(None) => continue,
            Err(_) => return Ok(()),
        };

        let msgid = extract_message_id(&rpc_xml).unwrap_or_else(|| "0".to_string());
        let op = first_child_name(&rpc_xml).unwrap_or_default();

        match op.as_str() {
            "get" | "get-config" => {
                transport.send_msg(&reply_data(&msgid))?;
            }
            "create-subscription" => {
                transport.send_msg(&reply_ok(&msgid))?;
                thread::sleep(Duration::from_millis(20));
                transport.send_msg(NOTIFICATION)?;
                thread::sleep(Duration::from_millis(20));
                transport.send_msg(NOTIFICATION_COMPLETE)?;
                return Ok(());
            }
            _ => {
                transport.send_msg(&reply_ok(&msgid))?;
            }
        }
    }
}

const NOTIFICATION: &str = r#"<notification xmlns="urn:ietf:params:xml:ns:netconf:notification:1.0"><eventTime>2026-07-27T00:00:00Z</eventTime><interface-up xmlns="urn:example:demo"><name>eth0</name></interface-up></notification>"#;
const NOTIFICATION_COMPLETE: &str = r#"<notificationComplete/>"#;

fn reply_ok(msgid: &str) -> String {
    format!(r#"<rpc-reply xmlns="urn:ietf:params:xml:ns:netconf:base:1.0" message-id="{msgid}"><ok/></rpc-reply>"#)
}

fn reply_data(msgid: &str) -> String {
    format!(
        r#"<rpc-reply xmlns="urn:ietf:params:xml:ns:netconf:base:1.0" message-id="{msgid}"><data><system xmlns="urn:example:demo"><hostname>demo-host</hostname></system></data></rpc-reply>"#
    )
}

fn extract_message_id(xml: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(tag)) | Ok(Event::Empty(tag)) => {
                for attr in tag.attributes().flatten() {
                    if attr.key.local_name().as_ref() == b"message-id" {
                        if let Ok(value) = attr.decode_and_unescape_value(reader.decoder()) {
                            return Some(value.to_string());
                        }
                    }
                }
                return None;
            }
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
    }
}

fn first_child_name(xml: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut depth = 0;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(tag)) => {
                depth += 1;
                if depth == 2 {
                    return Some(String::from_utf8_lossy(tag.local_name().as_ref()).to_string());
                }
            }
            Ok(Event::Empty(tag)) if depth == 1 => {
                return Some(String::from_utf8_lossy(tag.local_name().as_ref()).to_string());
            }
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
        buf.clear();
    }
}
