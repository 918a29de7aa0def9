//! In-memory caches the project rebuilds from disk at startup and keeps
//! consistent as commands mutate the tree.

pub mod card_cache;
pub mod resource_cache;

pub use card_cache::CardCache;
pub use resource_cache::{RegistryEntry, ResourceCache, ResourceFilter, ResourceSource};
