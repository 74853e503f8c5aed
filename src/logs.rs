// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Routes each service's combined output into its own append-mode log file.
//!
//! The directory is guaranteed to exist before anything is spawned. Log
//! files persist across launches; nothing here cleans up on exit.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use crate::config::ServiceSpec;
use crate::Error;

#[derive(Debug)]
pub struct LogDir {
    path: PathBuf,
}

/// Output sinks for one service, both ends backed by the same log file.
pub struct LogSink {
    pub path: PathBuf,
    pub stdout: Stdio,
    pub stderr: Stdio,
}

impl LogDir {
    /// Create the directory if it is absent. Idempotent: relaunching never
    /// fails because the directory already exists.
    pub fn ensure(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        std::fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn log_path(&self, spec: &ServiceSpec) -> PathBuf {
        self.path.join(spec.log_file_name())
    }

    /// Append one launcher-side line to the spec's log file.
    ///
    /// When a service cannot be started at all there is no child to write
    /// anything, so the launcher leaves the trace itself: the log file is
    /// the only place a failure is still visible after the launcher exits.
    pub fn append_note(&self, spec: &ServiceSpec, note: &str) -> Result<(), Error> {
        use std::io::Write;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path(spec))?;
        writeln!(file, "{}", note)?;
        Ok(())
    }

    /// Open the spec's log file for append and bind stdout and stderr of
    /// the future child to it.
    pub fn sink_for(&self, spec: &ServiceSpec) -> Result<LogSink, Error> {
        let path = self.log_path(spec);
        let file: File = OpenOptions::new().create(true).append(true).open(&path)?;
        let stderr_file = file.try_clone()?;

        Ok(LogSink {
            path,
            stdout: Stdio::from(file),
            stderr: Stdio::from(stderr_file),
        })
    }
}
