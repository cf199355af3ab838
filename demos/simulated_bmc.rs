//! Serve one simulated node on 127.0.0.1: IPMI on UDP 6230, Redfish (plain
//! HTTP) on TCP 8443.
//!
//! ```text
//! ipmitool -I lanplus -H 127.0.0.1 -p 6230 -U cybozu -P cybozu power on
//! curl -X POST -d '{"ResetType":"ForceOff"}' \
//!     http://127.0.0.1:8443/redfish/v1/Systems/System.Embedded.1/Actions/ComputerSystem.Reset
//! ```
//!
//! Stop with Ctrl-C. Set `VBMC_DEBUG=1 RUST_LOG=trace` for datagram dumps.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use vbmc::{BmcInfo, BmcServer, NoopBinder, SimulatedMachine};

#[tokio::main]
async fn main() -> vbmc::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let server = BmcServer::builder()
        .ipmi_port(6230)
        .redfish_port(8443)
        .network("lo", "127.0.0.0/8".parse()?)
        .binder(NoopBinder)
        .machine("demo-0001", Arc::new(SimulatedMachine::default()))
        .build()?;

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        shutdown.shutdown();
    });

    let (events, registrations) = mpsc::channel(1);
    let _ = events
        .send(BmcInfo {
            serial: "demo-0001".to_string(),
            bmc_address: "127.0.0.1".to_string(),
        })
        .await;
    drop(events);

    server.run(registrations).await
}
