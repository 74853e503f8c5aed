// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Launcher entrypoint for the phrase-index serving stack.
//!
//! `phraserve up` spawns the query encoder, the document ranker and the
//! phrase-index aggregator as detached background processes, each with its
//! output routed to `<log-dir>/<name>_<port>.log`, and exits without
//! waiting on any of them. `phraserve plan` prints what `up` would do.

use std::path::PathBuf;
use std::time::Duration;

use clap::{App, Arg, ArgMatches, SubCommand};
use tokio::runtime;
use tracing_subscriber::EnvFilter;

use phraserve::config::{resolve_services, LaunchConfig};
use phraserve::logs::LogDir;
use phraserve::readiness;
use phraserve::report;
use phraserve::spawn::Supervisor;
use phraserve::Error;

const UP: &str = "up";
const PLAN: &str = "plan";

const SERVE_BIN: &str = "serve-bin";
const MODEL: &str = "model";
const DUMP_DIR: &str = "dump-dir";
const RANKER: &str = "ranker";
const QUERY_PORT: &str = "query-port";
const DOC_PORT: &str = "doc-port";
const PORT: &str = "port";
const LOG_DIR: &str = "log-dir";
const WAIT_READY: &str = "wait-ready";
const READY_TIMEOUT: &str = "ready-timeout";

trait SetupClapApp {
    fn setup_clap_app(self) -> Self;
    fn service_opts(self) -> Self;
}

impl<'a, 'b> SetupClapApp for App<'a, 'b> {
    fn setup_clap_app(self) -> Self {
        self.version(env!("CARGO_PKG_VERSION"))
            .author(env!("CARGO_PKG_AUTHORS"))
    }

    fn service_opts(self) -> Self {
        self.arg(
            Arg::with_name(SERVE_BIN)
                .long(SERVE_BIN)
                .value_name("PATH")
                .help("serving executable, invoked once per service")
                .takes_value(true)
                .default_value("serve"),
        )
        .arg(
            Arg::with_name(MODEL)
                .long(MODEL)
                .value_name("PATH")
                .help("encoder model artifact, loaded by q_serve")
                .takes_value(true)
                .required(true),
        )
        .arg(
            Arg::with_name(DUMP_DIR)
                .long(DUMP_DIR)
                .value_name("DIR")
                .help("phrase-index dump directory, read by p_serve")
                .takes_value(true)
                .required(true),
        )
        .arg(
            Arg::with_name(RANKER)
                .long(RANKER)
                .value_name("NAME")
                .help("ranker artifact identifier, loaded by d_serve")
                .takes_value(true)
                .required(true),
        )
        .arg(port_arg(QUERY_PORT, "9010", "query encoder port"))
        .arg(port_arg(DOC_PORT, "9020", "document ranker port"))
        .arg(port_arg(PORT, "9030", "phrase-index aggregator port"))
        .arg(
            Arg::with_name(LOG_DIR)
                .long(LOG_DIR)
                .value_name("DIR")
                .help("directory for per-service log files, created if absent")
                .takes_value(true)
                .default_value("logs"),
        )
    }
}

fn port_arg<'a, 'b>(name: &'a str, default: &'a str, help: &'a str) -> Arg<'a, 'b> {
    Arg::with_name(name)
        .long(name)
        .value_name("NUMBER")
        .help(help)
        .takes_value(true)
        .default_value(default)
        .validator(|value| {
            value
                .parse::<u16>()
                .map(|_| ())
                .map_err(|_| String::from("port number was expected"))
        })
}

fn up_sub_command() -> App<'static, 'static> {
    SubCommand::with_name(UP)
        .about("Spawn the three servers detached and return immediately")
        .service_opts()
        .arg(
            Arg::with_name(WAIT_READY)
                .long(WAIT_READY)
                .help("after spawning, poll each server's port and report readiness"),
        )
        .arg(
            Arg::with_name(READY_TIMEOUT)
                .long(READY_TIMEOUT)
                .value_name("SECONDS")
                .help("how long --wait-ready keeps polling before giving up")
                .takes_value(true)
                .default_value("30")
                .validator(|value| {
                    value
                        .parse::<u64>()
                        .map(|_| ())
                        .map_err(|_| String::from("number of seconds was expected"))
                }),
        )
}

fn plan_sub_command() -> App<'static, 'static> {
    SubCommand::with_name(PLAN)
        .about("Print the resolved service invocations without spawning anything")
        .service_opts()
}

fn main() -> Result<(), Error> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("phraserve=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = App::new(env!("CARGO_PKG_NAME"))
        .setup_clap_app()
        .about("Launcher for the phrase-index serving stack")
        .subcommand(up_sub_command().setup_clap_app())
        .subcommand(plan_sub_command().setup_clap_app())
        .get_matches();

    let mut runtime = runtime::Builder::new()
        .basic_scheduler()
        .enable_io()
        .enable_time()
        .build()
        .expect("failed to initialize Tokio Runtime");

    runtime.block_on(async move {
        match args.subcommand() {
            (UP, Some(args)) => up(args).await,
            (PLAN, Some(args)) => plan(args),
            ("", None) => {
                println!("command required");
                println!("{}", args.usage());
                std::process::exit(1);
            }
            (arg, _) => {
                println!("unexpected argument: {}", arg);
                println!("{}", args.usage());
                std::process::exit(2);
            }
        }
    })
}

/// Resolve, spawn all three in order, report, exit.
///
/// The exit code reflects configuration validity and that all spawn
/// attempts were issued; it says nothing about whether the servers came up.
async fn up(args: &ArgMatches<'_>) -> Result<(), Error> {
    let config = config_from_args(args)?;
    let specs = resolve_services(&config)?;

    let log_dir = LogDir::ensure(&config.log_dir)?;
    let supervisor = Supervisor::new(&log_dir);
    let outcomes = supervisor.launch_all(&specs);

    print!("{}", report::summary(&outcomes, &log_dir));

    if args.is_present(WAIT_READY) {
        let timeout = args
            .value_of(READY_TIMEOUT)
            .unwrap_or_default()
            .parse::<u64>()
            .map_err(|_| Error::config("ready-timeout is not a number"))?;

        let reports = readiness::poll_services(&specs, Duration::from_secs(timeout)).await;
        print!("{}", report::readiness_summary(&reports));
    }

    Ok(())
}

fn plan(args: &ArgMatches<'_>) -> Result<(), Error> {
    let config = config_from_args(args)?;
    let specs = resolve_services(&config)?;

    print!("{}", report::plan(&specs, &config.log_dir));

    Ok(())
}

fn config_from_args(args: &ArgMatches<'_>) -> Result<LaunchConfig, Error> {
    Ok(LaunchConfig {
        serve_bin: PathBuf::from(args.value_of(SERVE_BIN).unwrap_or_default()),
        model_path: PathBuf::from(args.value_of(MODEL).unwrap_or_default()),
        dump_dir: PathBuf::from(args.value_of(DUMP_DIR).unwrap_or_default()),
        ranker: args.value_of(RANKER).unwrap_or_default().to_owned(),
        query_port: port_from_args(args, QUERY_PORT)?,
        doc_port: port_from_args(args, DOC_PORT)?,
        agg_port: port_from_args(args, PORT)?,
        log_dir: PathBuf::from(args.value_of(LOG_DIR).unwrap_or_default()),
    })
}

fn port_from_args(args: &ArgMatches<'_>, name: &str) -> Result<u16, Error> {
    let value = args.value_of(name).unwrap_or_default();
    value
        .parse()
        .map_err(|_| Error::config(format!("{} is not a valid port: {}", name, value)))
}
