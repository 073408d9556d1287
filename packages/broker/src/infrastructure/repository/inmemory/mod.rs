mod directory;

pub use directory::InMemoryPeerRepository;
