use thiserror::Error;

use crate::api::RemoteError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Fetch failed: {0}")]
    Fetch(#[from] RemoteError),

    #[error("Local cache error: {0}")]
    Store(#[from] StoreError),

    #[error("Refresh superseded by a forced refresh")]
    Superseded,

    #[error("Not signed in")]
    NotAuthenticated,
}
