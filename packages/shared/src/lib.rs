//! Utilities shared by the CurryParty broker and session crates.

pub mod logger;
pub mod time;
