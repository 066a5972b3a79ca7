//! The message router (§4.D, `get_msg`): satisfies a caller waiting for
//! either a specific reply id or the next notification, draining the
//! session's queues first, then reading the wire and parking anything
//! addressed to a different waiter.

use crate::error::{NcError, NcResult};
use crate::session::Session;
use crate::transport::RawMessage;
use crate::xmlutil::root_message_id;
use nc_model::Status;
use std::time::{Duration, Instant};
use tracing::warn;

/// `wanted_msgid = 0` means "the next notification" (§4.D contract).
pub const WANT_NOTIF: u64 = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterMessage {
    Notif(String),
    Reply(String),
}

pub fn get_msg(session: &Session, timeout_ms: i64, wanted_msgid: u64) -> NcResult<RouterMessage> {
    let deadline = if timeout_ms < 0 {
        None
    } else {
        Some(Instant::now() + Duration::from_millis(timeout_ms as u64))
    };

    let mut first_attempt = true;
    loop {
        let remaining_ms = match deadline {
            None => -1,
            Some(dl) => {
                let now = Instant::now();
                if now >= dl && !first_attempt {
                    return Err(NcError::WouldBlock("get_msg".to_string()));
                }
                dl.saturating_duration_since(now).as_millis() as i64
            }
        };
        first_attempt = false;

        let mut guard = session.lock_timed(remaining_ms)?;

        // Drain path (§4.D step 2).
        if wanted_msgid == WANT_NOTIF {
            if let Some(xml) = guard.notif_queue.pop_front() {
                return Ok(RouterMessage::Notif(xml));
            }
        } else {
            let mut found = None;
            while let Some((mid, xml)) = guard.reply_queue.pop_front() {
                if mid == wanted_msgid {
                    found = Some(xml);
                    break;
                }
                warn!(
                    target: "router",
                    stray_msgid = mid,
                    wanted = wanted_msgid,
                    "dropping stranded reply with unmatched message-id"
                );
            }
            if let Some(xml) = found {
                return Ok(RouterMessage::Reply(xml));
            }
        }

        // Wire path (§4.D step 3): still holding the lock.
        let wire_remaining = match deadline {
            None => -1,
            Some(dl) => dl.saturating_duration_since(Instant::now()).as_millis() as i64,
        };
        let wire_msg = guard.transport.read_msg_poll(wire_remaining)?;

        match wire_msg {
            None => {
                // Nothing arrived this round; drop the lock and loop,
                // letting the top-of-loop deadline check decide whether to
                // give up.
                drop(guard);
                continue;
            }
            Some(unexpected @ (RawMessage::Hello(_) | RawMessage::Rpc(_))) => {
                let kind = unexpected.kind();
                guard.status = Status::Invalid;
                drop(guard);
                warn!(target: "router", ?kind, "received a message this side must never receive");
                return Err(NcError::Protocol(format!(
                    "client received a {kind:?} message, which is a protocol violation on this side"
                )));
            }
            Some(RawMessage::Reply(xml)) => {
                let msgid = root_message_id(&xml);
                if wanted_msgid != WANT_NOTIF && msgid == Some(wanted_msgid) {
                    return Ok(RouterMessage::Reply(xml));
                }
                match msgid {
                    Some(mid) => guard.reply_queue.push_back((mid, xml)),
                    None => warn!(target: "router", "dropping rpc-reply with no message-id"),
                }
            }
            Some(RawMessage::Notif(xml)) => {
                if wanted_msgid == WANT_NOTIF {
                    return Ok(RouterMessage::Notif(xml));
                }
                guard.notif_queue.push_back(xml);
            }
        }
        drop(guard);
        // Cross-parked: try again within the remaining budget (§4.D step 5).
    }
}
