use std::io;

use dotenvy::dotenv;
use tracing::warn;

/// Attempt to load in the local `.env` if present and set any environment
/// variables specified inside of it, so every `PROVER_*` flag can be provided
/// from there.
///
/// To keep things simple, any IO error we will treat as the file not existing
/// and continue moving on without the `env` variables set.
pub fn load_dotenvy_vars_if_present() {
    match dotenv() {
        Ok(_) | Err(dotenvy::Error::Io(io::Error { .. })) => (),
        Err(e) => warn!("Found local `.env` file but was unable to parse it! (err: {e})",),
    }
}
