//! Persistence
//!
//! `Store` is the seam the engine talks to. `DatabasePool` backs it with
//! PostgreSQL; `MemoryStore` is the fallback when Postgres is disabled and the
//! store used by tests.

pub mod engagement;
pub mod memory;
pub mod pool;
pub mod requests;
pub mod resources;
pub mod store;
pub mod users;

pub use engagement::EngagementRepository;
pub use memory::MemoryStore;
pub use pool::DatabasePool;
pub use requests::RequestRepository;
pub use resources::ResourceRepository;
pub use store::Store;
pub use users::UserRepository;
