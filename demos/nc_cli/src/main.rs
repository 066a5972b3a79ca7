//! Demo CLI driving `nc_client` against an in-process fixture peer, in the
//! shape of the teacher's `apps/nauto_cli`: a `clap::Parser` entry point,
//! `tracing-subscriber::EnvFilter` logging, and `anyhow` at the application
//! boundary.

mod fixture;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use nc_client::{Client, Datastore, Filter, Reply, Rpc};
use nc_schema::{SchemaContext, YinDirContext};
use std::net::TcpStream;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nc-cli", about = "Demo client for the NETCONF session core")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the fixture peer and report the negotiated capabilities.
    Connect,
    /// Send a <get> or <get-config> and print the returned data.
    Get {
        #[arg(long)]
        filter: Option<String>,
        #[arg(long)]
        config: bool,
    },
    /// Send an <edit-config> against the running datastore.
    EditConfig {
        config: String,
    },
    /// Subscribe to a notification stream and print what arrives.
    Subscribe {
        #[arg(long)]
        stream: Option<String>,
    },
}

const IETF_NETCONF_YIN: &str = r#"<module name="ietf-netconf" xmlns="urn:ietf:params:xml:ns:yang:yin:1"><revision date="2011-06-01"/><feature name="candidate"/><feature name="writable-running"/></module>"#;

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let listener = std::net::TcpListener::bind("127.0.0.1:0").context("binding demo loopback listener")?;
    let addr = listener.local_addr()?;
    let fixture_handle = fixture::spawn(listener);

    let schema_ctx: Arc<dyn SchemaContext> = {
        let ctx = YinDirContext::new("schemas");
        ctx.preload("ietf-netconf", Some("2011-06-01"), IETF_NETCONF_YIN)
            .context("preloading embedded ietf-netconf schema")?;
        Arc::new(ctx)
    };

    let stream = TcpStream::connect(addr).context("connecting to demo fixture peer")?;
    let transport = Box::new(nc_client::TcpTransport::new(stream));
    let client = Client::new();
    let session = client
        .connect_inout(transport, Some(schema_ctx), false, &nc_client::default_client_capabilities())
        .context("NETCONF hello handshake with fixture peer")?;

    tracing::info!(target: "demo", status = ?session.status(), "session established");

    match cli.command {
        Commands::Connect => {
            println!("status: {:?}", session.status());
            println!("capabilities: {:?}", session.capabilities());
        }
        Commands::Get { filter, config } => {
            let rpc = if config {
                Rpc::GetConfig {
                    source: Datastore::Running,
                    filter: filter.map(Filter::from_raw),
                    wd_mode: None,
                }
            } else {
                Rpc::Get {
                    filter: filter.map(Filter::from_raw),
                    wd_mode: None,
                }
            };
            let (sent_rpc, msgid) = nc_client::send_rpc(&session, rpc, -1)?;
            match nc_client::recv_reply(&session, -1, msgid, &sent_rpc)? {
                Reply::Data(tree) => println!("{}", tree.xml),
                Reply::Ok => println!("ok"),
                Reply::Error(errors) => {
                    for err in errors {
                        eprintln!("rpc-error: {err:?}");
                    }
                    bail!("peer returned one or more rpc-error elements");
                }
            }
        }
        Commands::EditConfig { config } => {
            let rpc = Rpc::EditConfig {
                target: Datastore::Running,
                default_op: None,
                test_opt: None,
                error_opt: None,
                edit_content: config,
            };
            let (sent_rpc, msgid) = nc_client::send_rpc(&session, rpc, -1)?;
            match nc_client::recv_reply(&session, -1, msgid, &sent_rpc)? {
                Reply::Ok => println!("ok"),
                Reply::Data(tree) => println!("{}", tree.xml),
                Reply::Error(errors) => {
                    for err in errors {
                        eprintln!("rpc-error: {err:?}");
                    }
                    bail!("peer returned one or more rpc-error elements");
                }
            }
        }
        Commands::Subscribe { stream } => {
            let rpc = Rpc::Subscribe {
                stream,
                filter: None,
                start: None,
                stop: None,
            };
            let (sent_rpc, msgid) = nc_client::send_rpc(&session, rpc, -1)?;
            match nc_client::recv_reply(&session, -1, msgid, &sent_rpc)? {
                Reply::Ok => {}
                other => bail!("create-subscription did not return <ok/>: {other:?}"),
            }

            let (done_tx, done_rx) = mpsc::channel();
            let dispatch_session = session.clone();
            nc_client::recv_notif_dispatch(dispatch_session, move |xml| {
                println!("{xml}");
                if xml.contains("notificationComplete") {
                    let _ = done_tx.send(());
                }
            });
            match done_rx.recv_timeout(Duration::from_secs(5)) {
                Ok(()) => {}
                Err(_) => tracing::warn!(target: "demo", "timed out waiting for notificationComplete"),
            }
        }
    }

    nc_client::close(&session);
    drop(session);
    let _ = fixture_handle.join();
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();
}
