// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::io;

use thiserror::Error;

/// Failure classes of the launcher.
///
/// `Config` is always raised before any process is spawned; `Spawn` is
/// per-service and never aborts sibling spawn attempts. Anything that goes
/// wrong inside a running service is invisible here and only shows up in
/// that service's log file.
#[derive(Error, Debug)]
pub enum ErrorKind {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("failed to spawn {service}: {source}")]
    Spawn {
        service: String,
        #[source]
        source: io::Error,
    },
    #[error("io error")]
    IoError(#[from] io::Error),
}

#[derive(Error, Debug)]
#[error(transparent)]
pub struct Error(ErrorKind);

impl Error {
    fn from_kind(kind: ErrorKind) -> Self {
        Self(kind)
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self(ErrorKind::Config(msg.into()))
    }

    pub fn spawn(service: impl Into<String>, source: io::Error) -> Self {
        Self(ErrorKind::Spawn {
            service: service.into(),
            source,
        })
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.0
    }

    pub fn is_config(&self) -> bool {
        matches!(self.0, ErrorKind::Config(_))
    }

    pub fn is_spawn(&self) -> bool {
        matches!(self.0, ErrorKind::Spawn { .. })
    }
}

impl<E> From<E> for Error
where
    E: Into<ErrorKind>,
{
    fn from(err: E) -> Self {
        Self::from_kind(err.into())
    }
}
