//! PeerRepository implementations.

pub mod inmemory;

pub use inmemory::InMemoryPeerRepository;
