//! Job descriptors and their limits.

mod descriptor;
mod env;
mod limits;

pub use descriptor::{
    CommandSpec, JobDescriptor, LogPaths, RestartDecision, RestartPolicy, COLLECT_FEES,
    DISTRIBUTE, SWAP_TOKENS,
};
pub use env::{expand_env_vars, EnvOverrides};
pub use limits::{ByteSize, ByteSizeError};
