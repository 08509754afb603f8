//! Process supervision: spawn, stream, watch, terminate.

mod memory;
mod process;
mod signal;

pub use memory::{default_probe, MemoryProbe, NullProbe};
#[cfg(target_os = "linux")]
pub use memory::ProcfsProbe;
#[cfg(test)]
pub use memory::MockMemoryProbe;
pub use process::{Supervisor, SupervisorConfig};
#[cfg(unix)]
pub use signal::is_alive;
