// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Spawns the resolved services as detached children.
//!
//! Launch and abandon: the supervisor guarantees the order of the spawn
//! calls and records pids, nothing more. It never waits for a child to
//! start listening and never waits for a child to exit; the children are
//! expected to outlive the launcher. The one known race (the aggregator
//! may dial its upstreams before they listen) is owned by the aggregator's
//! own connection retries, not by this module.

use std::io;
use std::process::Stdio;
use std::time::Instant;

use nix::unistd::setsid;
use tokio::process::Command;
use tracing::{info, warn};

use crate::config::ServiceSpec;
use crate::logs::LogDir;
use crate::Error;

/// Identity record for a spawned service.
///
/// Holds no ownership of the OS process: dropping this does not touch the
/// child, which has already been detached into its own session.
#[derive(Debug)]
pub struct ProcessHandle {
    spec: ServiceSpec,
    pid: u32,
    started: Instant,
}

impl ProcessHandle {
    pub fn spec(&self) -> &ServiceSpec {
        &self.spec
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn started(&self) -> Instant {
        self.started
    }
}

/// Result of one spawn attempt. A failure never rolls back siblings, so a
/// partial startup is a possible and observable end state.
#[derive(Debug)]
pub enum SpawnOutcome {
    Spawned(ProcessHandle),
    Failed { spec: ServiceSpec, error: Error },
}

impl SpawnOutcome {
    pub fn spec(&self) -> &ServiceSpec {
        match self {
            SpawnOutcome::Spawned(handle) => handle.spec(),
            SpawnOutcome::Failed { spec, .. } => spec,
        }
    }

    pub fn is_spawned(&self) -> bool {
        matches!(self, SpawnOutcome::Spawned(_))
    }
}

pub struct Supervisor<'a> {
    log_dir: &'a LogDir,
}

impl<'a> Supervisor<'a> {
    pub fn new(log_dir: &'a LogDir) -> Self {
        Self { log_dir }
    }

    /// Issue one spawn attempt per spec, in the order given.
    ///
    /// Must be called from within a tokio runtime. Returns an outcome for
    /// every spec: a failed spawn is reported and the remaining attempts
    /// are still issued.
    pub fn launch_all(&self, specs: &[ServiceSpec]) -> Vec<SpawnOutcome> {
        specs
            .iter()
            .map(|spec| match self.spawn_service(spec) {
                Ok(handle) => {
                    info!(
                        service = handle.spec().name(),
                        pid = handle.pid(),
                        port = handle.spec().port(),
                        "spawned"
                    );
                    SpawnOutcome::Spawned(handle)
                }
                Err(error) => {
                    warn!(service = spec.name(), %error, "spawn failed, continuing");
                    // the terminal warning dies with the terminal; the log
                    // file is where the failure must remain visible
                    let note =
                        format!("phraserve: failed to spawn {}: {}", spec.name(), error);
                    if let Err(log_error) = self.log_dir.append_note(spec, &note) {
                        warn!(
                            service = spec.name(),
                            %log_error,
                            "could not record the failure in the service log"
                        );
                    }
                    SpawnOutcome::Failed {
                        spec: spec.clone(),
                        error,
                    }
                }
            })
            .collect()
    }

    /// Spawn a single service detached from the launcher.
    fn spawn_service(&self, spec: &ServiceSpec) -> Result<ProcessHandle, Error> {
        let sink = self.log_dir.sink_for(spec)?;

        let mut command = Command::new(spec.program());
        command
            .args(spec.args())
            .stdin(Stdio::null())
            .stdout(sink.stdout)
            .stderr(sink.stderr);

        // New session, no controlling terminal: the child must survive the
        // launcher and its terminal going away.
        unsafe {
            command.pre_exec(|| {
                setsid()
                    .map(|_| ())
                    .map_err(|err| io::Error::new(io::ErrorKind::Other, err))
            });
        }

        let child = command
            .spawn()
            .map_err(|err| Error::spawn(spec.name(), err))?;
        let pid = child.id();

        // Drop the handle without killing: launch and abandon.
        drop(child);

        Ok(ProcessHandle {
            spec: spec.clone(),
            pid,
            started: Instant::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceSpec;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new()
            .basic_scheduler()
            .enable_io()
            .build()
            .expect("failed to initialize Tokio Runtime")
    }

    fn spec(name: &'static str, program: &str, port: u16) -> ServiceSpec {
        ServiceSpec::new(name, program, vec![], port)
    }

    #[test]
    fn spawns_and_records_a_pid() {
        let tmp = tempfile::tempdir().expect("no tempdir");
        let log_dir = LogDir::ensure(tmp.path().join("logs")).expect("ensure failed");

        let mut rt = runtime();
        let outcomes = rt.block_on(async {
            Supervisor::new(&log_dir).launch_all(&[spec("q_serve", "true", 9010)])
        });

        assert_eq!(outcomes.len(), 1);
        match &outcomes[0] {
            SpawnOutcome::Spawned(handle) => assert!(handle.pid() > 0),
            SpawnOutcome::Failed { error, .. } => panic!("spawn failed: {}", error),
        }
        assert!(log_dir.path().join("q_serve_9010.log").is_file());
    }

    #[test]
    fn failed_spawn_does_not_abort_siblings() {
        let tmp = tempfile::tempdir().expect("no tempdir");
        let log_dir = LogDir::ensure(tmp.path().join("logs")).expect("ensure failed");

        let specs = [
            spec("q_serve", "/this/does/not/exist", 9010),
            spec("d_serve", "true", 9020),
            spec("p_serve", "true", 9030),
        ];

        let mut rt = runtime();
        let outcomes = rt.block_on(async { Supervisor::new(&log_dir).launch_all(&specs) });

        assert_eq!(outcomes.len(), 3);
        assert!(!outcomes[0].is_spawned());
        assert!(outcomes[1].is_spawned());
        assert!(outcomes[2].is_spawned());

        match &outcomes[0] {
            SpawnOutcome::Failed { error, .. } => assert!(error.is_spawn()),
            SpawnOutcome::Spawned(_) => panic!("spawn of a missing executable succeeded"),
        }
    }

    #[test]
    fn failed_spawn_is_recorded_in_the_service_log() {
        let tmp = tempfile::tempdir().expect("no tempdir");
        let log_dir = LogDir::ensure(tmp.path().join("logs")).expect("ensure failed");

        let mut rt = runtime();
        let outcomes = rt.block_on(async {
            Supervisor::new(&log_dir).launch_all(&[spec("q_serve", "/this/does/not/exist", 9010)])
        });
        assert!(!outcomes[0].is_spawned());

        let contents = std::fs::read_to_string(log_dir.path().join("q_serve_9010.log"))
            .expect("log file missing");
        assert!(
            contents.contains("failed to spawn q_serve"),
            "no trace of the failure in the log: {:?}",
            contents
        );
    }

    #[test]
    fn outcomes_preserve_spec_order() {
        let tmp = tempfile::tempdir().expect("no tempdir");
        let log_dir = LogDir::ensure(tmp.path().join("logs")).expect("ensure failed");

        let specs = [
            spec("q_serve", "true", 9010),
            spec("d_serve", "true", 9020),
            spec("p_serve", "true", 9030),
        ];

        let mut rt = runtime();
        let outcomes = rt.block_on(async { Supervisor::new(&log_dir).launch_all(&specs) });

        let names: Vec<&str> = outcomes.iter().map(|o| o.spec().name()).collect();
        assert_eq!(names, ["q_serve", "d_serve", "p_serve"]);
    }
}
