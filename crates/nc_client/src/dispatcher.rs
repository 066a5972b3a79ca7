//! The notification dispatcher thread (§4.H): pumps `recv_notif` into a
//! user callback until a stream-complete marker, or until cooperative
//! cancellation is requested.

use crate::client;
use crate::config;
use crate::session::Session;
use crate::xmlutil::root_local_name;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{info, warn};

const NOTIFICATION_COMPLETE: &str = "notificationComplete";

/// Spawns the dispatcher thread and stores its handle on the session. At
/// most one dispatcher runs per session (§3 Data model, §6 "Model").
pub fn spawn(session: Arc<Session>, callback: Box<dyn Fn(String) + Send>) {
    session.dispatcher_stop.store(false, Ordering::SeqCst);
    let handle: JoinHandle<()> = std::thread::spawn(move || run(session, callback));
    // Recording the handle is advisory bookkeeping only; join-on-stop does
    // not require it back out of the session (the thread owns its own
    // lifetime and exits cooperatively).
    drop(handle);
}

fn run(session: Arc<Session>, callback: Box<dyn Fn(String) + Send>) {
    loop {
        if session.dispatcher_should_stop() {
            info!(target: "dispatcher", "stop requested, exiting");
            return;
        }
        match client::recv_notif(&session, 0) {
            Ok(xml) => {
                callback(xml.clone());
                if root_local_name(&xml).as_deref() == Some(NOTIFICATION_COMPLETE) {
                    info!(target: "dispatcher", "notificationComplete observed, exiting");
                    return;
                }
            }
            Err(err) if err.is_would_block() => {}
            Err(err) => {
                warn!(target: "dispatcher", %err, "recv_notif failed, exiting");
                return;
            }
        }
        std::thread::sleep(config::notif_thread_sleep());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use crate::transport::MemoryPipeTransport;
    use nc_schema::YinDirContext;
    use std::sync::{Mutex, MutexGuard};
    use std::time::Duration;

    fn paired() -> (Arc<Session>, Arc<Session>) {
        let (a, b) = MemoryPipeTransport::new_pair();
        let ctx = Arc::new(YinDirContext::new("/nonexistent"));
        (
            Arc::new(Session::new(Box::new(a), ctx.clone(), true)),
            Arc::new(Session::new(Box::new(b), ctx, true)),
        )
    }

    #[test]
    fn dispatcher_invokes_callback_and_exits_on_complete() {
        let (client_session, server) = paired();
        server
            .lock()
            .transport
            .send_msg(r#"<notification><eventTime>now</eventTime><event>x</event></notification>"#)
            .unwrap();
        server
            .lock()
            .transport
            .send_msg(r#"<notificationComplete/>"#)
            .unwrap();

        let received: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let received_cb = received.clone();
        let session_for_thread = client_session.clone();
        let handle = std::thread::spawn(move || run(session_for_thread, Box::new(move |xml| received_cb.lock().unwrap().push(xml))));

        handle.join().unwrap();
        let guard: MutexGuard<Vec<String>> = received.lock().unwrap();
        assert_eq!(guard.len(), 2);
        assert!(guard[1].contains("notificationComplete"));
    }

    #[test]
    fn dispatcher_stops_cooperatively() {
        let (client_session, _server) = paired();
        let stop_flag = client_session.dispatcher_stop.clone();
        let session_for_thread = client_session.clone();
        let handle = std::thread::spawn(move || run(session_for_thread, Box::new(|_xml| {})));
        std::thread::sleep(Duration::from_millis(20));
        stop_flag.store(true, Ordering::SeqCst);
        handle.join().unwrap();
    }
}
