// Service exports
pub mod appwrite;
pub mod cache;
pub mod memory;
pub mod postgres;
pub mod store;

pub use appwrite::{AppwriteClient, AppwriteCollections, AppwriteError};
pub use cache::{CacheError, CacheKey, CacheManager, CacheStats};
pub use memory::{
    InMemoryBlockList, InMemoryDailyPickCache, InMemoryInteractionStore, InMemoryProfileDirectory, InMemoryUndoStore,
};
pub use postgres::{PostgresClient, PostgresError};
pub use store::{
    BlockList, DailyPickCache, InteractionStore, LikeQuota, ProfileSource, SaveOptions, SaveOutcome, StorageError,
    UndoRemoval, UndoStore,
};
