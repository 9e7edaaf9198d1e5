// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error type returned by orchestrating operations.

use crate::resolver::ResolveError;
use crate::state::StoreError;
use rmemix_ipc::GatewayError;
use std::fmt;
use thiserror::Error;

/// Failure category, deciding how a caller should react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Static topology mismatch. Retrying cannot help.
    Configuration,
    /// Unknown or unsupported input such as a bad profile name.
    Validation,
    /// A profile switch or initialization is in flight.
    Busy,
    /// The gateway call failed or timed out.
    Boundary,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Validation => "validation",
            ErrorKind::Busy => "busy",
            ErrorKind::Boundary => "boundary",
        };
        f.write_str(s)
    }
}

/// Errors from mixer operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MixerError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl From<ResolveError> for MixerError {
    fn from(e: ResolveError) -> Self {
        MixerError::Store(StoreError::Resolve(e))
    }
}

impl MixerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MixerError::Store(e) => match e {
                StoreError::Resolve(_)
                | StoreError::UnknownChannel(_)
                | StoreError::OddChannelCoupling(_)
                | StoreError::NoStereoPartner(_)
                | StoreError::CoupledRightChannel(_) => ErrorKind::Configuration,
                StoreError::UnsupportedProfile(_)
                | StoreError::UnknownProfile(_)
                | StoreError::InvalidBufferSize(_) => ErrorKind::Validation,
                StoreError::Busy(_) | StoreError::NotReady => ErrorKind::Busy,
            },
            MixerError::Gateway(_) => ErrorKind::Boundary,
        }
    }

    /// Only boundary failures are worth retrying, and only by the caller.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Boundary
    }
}
