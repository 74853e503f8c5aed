// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Human-readable launch summary for the invoking terminal.
//!
//! Advisory text only. Nothing downstream synchronizes on it, and a clean
//! summary does not mean the servers are ready: they still have models and
//! dumps to load.

use std::path::Path;

use crate::config::ServiceSpec;
use crate::logs::LogDir;
use crate::readiness::ReadinessReport;
use crate::spawn::SpawnOutcome;

/// One line per spawn attempt, then the warm-up note.
pub fn summary(outcomes: &[SpawnOutcome], log_dir: &LogDir) -> String {
    let mut out = String::new();

    for outcome in outcomes {
        let spec = outcome.spec();
        match outcome {
            SpawnOutcome::Spawned(handle) => {
                out.push_str(&format!(
                    "  {} on port {}: pid {}, log {}\n",
                    spec.name(),
                    spec.port(),
                    handle.pid(),
                    log_dir.log_path(spec).display(),
                ));
            }
            SpawnOutcome::Failed { error, .. } => {
                out.push_str(&format!(
                    "  {} on port {}: NOT STARTED ({})\n",
                    spec.name(),
                    spec.port(),
                    error,
                ));
            }
        }
    }

    let spawned = outcomes.iter().filter(|o| o.is_spawned()).count();
    out.push_str(&format!(
        "{}/{} servers spawned. Serving, will take a minute while the models load; check the logs for progress.\n",
        spawned,
        outcomes.len(),
    ));

    out
}

/// Rendering of what `up` would spawn.
///
/// Pure formatting over already-resolved specs: touches neither the
/// filesystem nor the process table.
pub fn plan(specs: &[ServiceSpec], log_dir: &Path) -> String {
    let mut out = String::new();

    for spec in specs {
        out.push_str(&format!(
            "{} (port {}, log {}): {} {}\n",
            spec.name(),
            spec.port(),
            log_dir.join(spec.log_file_name()).display(),
            spec.program().display(),
            spec.args().join(" "),
        ));
    }

    out
}

pub fn readiness_summary(reports: &[ReadinessReport]) -> String {
    let mut out = String::new();

    for report in reports {
        if report.ready {
            out.push_str(&format!(
                "  {} is accepting connections on port {}\n",
                report.service, report.port
            ));
        } else {
            out.push_str(&format!(
                "  {} is not answering on port {} yet\n",
                report.service, report.port
            ));
        }
    }

    out
}
