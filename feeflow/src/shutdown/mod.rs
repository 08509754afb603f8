//! Process-wide shutdown signalling.

mod token;

pub use token::ShutdownToken;
