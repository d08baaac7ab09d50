//! Built-in Check units
//!
//! A check returns text only when it found something worth a human's time.

pub mod disk;
pub mod dmesg;
pub mod listing;
pub mod load;
pub mod memory;
pub mod network;
pub mod raid;
pub mod threads;
pub mod users;

pub use disk::DiskUsage;
pub use dmesg::Dmesg;
pub use listing::ListFacts;
pub use load::LoadAvg;
pub use memory::{BuddyInfo, MemUsage};
pub use network::NetIFace;
pub use raid::RaidStatus;
pub use threads::ThreadCount;
pub use users::OtherUsers;
