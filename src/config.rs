// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Resolves launcher parameters into per-service invocations.
//!
//! The serving stack is always the same three processes, spawned in this
//! order: the query encoder (`q_serve`), the document ranker (`d_serve`),
//! and the phrase-index aggregator (`p_serve`). The aggregator is a network
//! client of the other two, so its invocation carries their ports.

use std::path::{Path, PathBuf};

use crate::Error;

pub const Q_SERVE: &str = "q_serve";
pub const D_SERVE: &str = "d_serve";
pub const P_SERVE: &str = "p_serve";

/// Everything the launcher needs, carried explicitly rather than read from
/// the environment or the working directory.
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    /// The serving executable, invoked once per service with `--run-mode`.
    pub serve_bin: PathBuf,
    /// Encoder model artifact, loaded by `q_serve`.
    pub model_path: PathBuf,
    /// Phrase-index dump directory, read by `p_serve`.
    pub dump_dir: PathBuf,
    /// Ranker artifact identifier, loaded by `d_serve`.
    pub ranker: String,
    pub query_port: u16,
    pub doc_port: u16,
    pub agg_port: u16,
    pub log_dir: PathBuf,
}

/// A resolved, immutable invocation for one service.
#[derive(Debug, Clone)]
pub struct ServiceSpec {
    name: &'static str,
    program: PathBuf,
    args: Vec<String>,
    port: u16,
}

impl ServiceSpec {
    pub fn new(
        name: &'static str,
        program: impl Into<PathBuf>,
        args: Vec<String>,
        port: u16,
    ) -> Self {
        Self {
            name,
            program: program.into(),
            args,
            port,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Log file name, unique across a batch because ports are unique.
    pub fn log_file_name(&self) -> String {
        format!("{}_{}.log", self.name, self.port)
    }
}

/// Produce the ordered invocation batch for the three services.
///
/// All validation happens here, before anything is spawned: a bad
/// configuration must have zero side effects.
pub fn resolve_services(config: &LaunchConfig) -> Result<Vec<ServiceSpec>, Error> {
    validate(config)?;

    let query_port = config.query_port.to_string();
    let doc_port = config.doc_port.to_string();
    let agg_port = config.agg_port.to_string();

    let encoder = ServiceSpec::new(
        Q_SERVE,
        &config.serve_bin,
        vec![
            "--run-mode".to_owned(),
            Q_SERVE.to_owned(),
            "--model".to_owned(),
            config.model_path.display().to_string(),
            "--port".to_owned(),
            query_port.clone(),
        ],
        config.query_port,
    );

    let ranker = ServiceSpec::new(
        D_SERVE,
        &config.serve_bin,
        vec![
            "--run-mode".to_owned(),
            D_SERVE.to_owned(),
            "--ranker".to_owned(),
            config.ranker.clone(),
            "--port".to_owned(),
            doc_port.clone(),
        ],
        config.doc_port,
    );

    // the aggregator answers queries by calling back into the other two
    let aggregator = ServiceSpec::new(
        P_SERVE,
        &config.serve_bin,
        vec![
            "--run-mode".to_owned(),
            P_SERVE.to_owned(),
            "--dump-dir".to_owned(),
            config.dump_dir.display().to_string(),
            "--port".to_owned(),
            agg_port,
            "--query-port".to_owned(),
            query_port,
            "--doc-port".to_owned(),
            doc_port,
        ],
        config.agg_port,
    );

    Ok(vec![encoder, ranker, aggregator])
}

fn validate(config: &LaunchConfig) -> Result<(), Error> {
    if config.serve_bin.as_os_str().is_empty() {
        return Err(Error::config("serving executable path is empty"));
    }
    if config.model_path.as_os_str().is_empty() {
        return Err(Error::config("model artifact path is empty"));
    }
    if config.dump_dir.as_os_str().is_empty() {
        return Err(Error::config("dump directory path is empty"));
    }
    if config.ranker.is_empty() {
        return Err(Error::config("ranker identifier is empty"));
    }

    let ports = [
        (Q_SERVE, config.query_port),
        (D_SERVE, config.doc_port),
        (P_SERVE, config.agg_port),
    ];
    for (i, (name_a, port_a)) in ports.iter().enumerate() {
        for (name_b, port_b) in &ports[i + 1..] {
            if port_a == port_b {
                return Err(Error::config(format!(
                    "{} and {} are both configured for port {}",
                    name_a, name_b, port_a
                )));
            }
        }
    }

    Ok(())
}
