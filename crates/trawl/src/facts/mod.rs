//! Built-in Fact units
//!
//! Each unit's short name is the fact it produces.

pub mod host;
pub mod process;
pub mod terminal;
pub mod users;

pub use host::Hostname;
pub use process::{LogFiles, Pid, PidCwd, PidExe};
pub use terminal::{MaxUnitOutputWidth, TerminalWidth};
pub use users::OtherUsers;
