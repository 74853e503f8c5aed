// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Optional post-launch readiness probe.
//!
//! Deliberately separate from the supervisor: spawning never waits on
//! this, and nothing here can change spawn order or the launcher's exit
//! code. It exists only to give the operator an answer to "are the ports
//! up yet" without tailing three log files.

use std::net::SocketAddr;
use std::time::Duration;

use futures::future;
use tokio::net::TcpStream;
use tokio::time::{delay_for, Instant};
use tracing::debug;

use crate::config::ServiceSpec;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug)]
pub struct ReadinessReport {
    pub service: &'static str,
    pub port: u16,
    pub ready: bool,
}

/// Poll every service's port concurrently until it accepts a TCP
/// connection or the deadline passes. Advisory only.
pub async fn poll_services(specs: &[ServiceSpec], timeout: Duration) -> Vec<ReadinessReport> {
    let checks = specs.iter().map(|spec| check_port(spec, timeout));
    future::join_all(checks).await
}

async fn check_port(spec: &ServiceSpec, timeout: Duration) -> ReadinessReport {
    let addr = SocketAddr::from(([127, 0, 0, 1], spec.port()));
    // an absurd timeout saturates into "no deadline" instead of overflowing
    let deadline = Instant::now().checked_add(timeout);

    loop {
        match TcpStream::connect(addr).await {
            Ok(_) => {
                debug!(service = spec.name(), port = spec.port(), "port is up");
                return ReadinessReport {
                    service: spec.name(),
                    port: spec.port(),
                    ready: true,
                };
            }
            Err(err) => {
                if deadline.map_or(false, |deadline| Instant::now() >= deadline) {
                    debug!(service = spec.name(), port = spec.port(), %err, "gave up");
                    return ReadinessReport {
                        service: spec.name(),
                        port: spec.port(),
                        ready: false,
                    };
                }
                delay_for(POLL_INTERVAL).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceSpec;
    use std::net::TcpListener;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new()
            .basic_scheduler()
            .enable_io()
            .enable_time()
            .build()
            .expect("failed to initialize Tokio Runtime")
    }

    #[test]
    fn listening_port_reports_ready() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind failed");
        let port = listener.local_addr().expect("no local addr").port();
        let spec = ServiceSpec::new("q_serve", "serve", vec![], port);

        let mut rt = runtime();
        let reports =
            rt.block_on(poll_services(&[spec], Duration::from_secs(2)));

        assert_eq!(reports.len(), 1);
        assert!(reports[0].ready);
        assert_eq!(reports[0].port, port);
    }

    #[test]
    fn absurd_timeout_does_not_overflow() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind failed");
        let port = listener.local_addr().expect("no local addr").port();
        let spec = ServiceSpec::new("d_serve", "serve", vec![], port);

        let mut rt = runtime();
        let reports = rt.block_on(poll_services(&[spec], Duration::from_secs(u64::MAX)));

        assert!(reports[0].ready);
    }

    #[test]
    fn dead_port_reports_not_ready_after_deadline() {
        // bind then drop to find a port nobody is listening on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").expect("bind failed");
            listener.local_addr().expect("no local addr").port()
        };
        let spec = ServiceSpec::new("p_serve", "serve", vec![], port);

        let mut rt = runtime();
        let reports =
            rt.block_on(poll_services(&[spec], Duration::from_millis(300)));

        assert_eq!(reports.len(), 1);
        assert!(!reports[0].ready);
    }
}
