pub mod anchor;
pub mod backoff;
pub mod capacity;
pub mod config;
pub mod env;
pub mod evidence;
pub mod handler;
pub mod producer;
pub mod proof_types;
pub mod prover;
pub mod rpc;
pub mod sender;
pub mod server;
pub mod state;
pub mod submitter;
pub mod tracing;
pub mod trie_proof;

#[cfg(test)]
pub(crate) mod testing;

/// Size of the channels used to hand proof requests and proof results between
/// the event handlers, the proving tasks and the submitting tasks. A full
/// channel applies backpressure on the producing side.
pub const PROOF_CHANNEL_SIZE: usize = 128;

/// Common information for the `--version` CLI flags.
pub fn version() -> String {
    let pkg_name = env!("CARGO_PKG_NAME");
    let git_describe = env!("VERGEN_GIT_DESCRIBE");
    let timestamp = env!("VERGEN_BUILD_TIMESTAMP");
    format!("{pkg_name} ({git_describe}) [built: {timestamp}]")
}
