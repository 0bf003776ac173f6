use lanshare_common::network::interface::InterfaceError;
use thiserror::Error;

use crate::resolver::ProbeError;
use crate::share::ShareError;

/// Failures a front end has to tell apart.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Interface(#[from] InterfaceError),
    #[error(transparent)]
    Probe(#[from] ProbeError),
    #[error(transparent)]
    Share(#[from] ShareError),
    #[error("host {0} could not be resolved")]
    HostNotFound(String),
}

/// Which message a front end should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// The path is wrong or names an unknown host.
    CheckSharePath,
    /// Local networking failed.
    Unresolvable,
}

impl Error {
    pub fn category(&self) -> Category {
        match self {
            Self::Share(_) | Self::HostNotFound(_) => Category::CheckSharePath,
            Self::Interface(_) | Self::Probe(_) => Category::Unresolvable,
        }
    }
}
