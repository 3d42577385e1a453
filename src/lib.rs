//! Resource Community
//!
//! Lifecycle and reputation engine for a community of shared
//! network-engineering resources (lab files, packet captures, documents):
//! ingestion with content-hash de-duplication and malware scanning,
//! moderation, ratings, a points wallet with derived levels, and a bounty
//! ledger with escrow.
//!
//! ## Module Structure
//!
//! ```text
//! src/
//! ├── lib.rs         - Crate root with re-exports
//! ├── main.rs        - Server entrypoint
//! ├── config.rs      - Configuration management
//! ├── error.rs       - Engine error taxonomy
//! ├── models/        - Users, resources, engagement records, bounty requests
//! ├── engine/        - Business operations
//! │   ├── ingestion.rs  - Upload validation, scanning, fingerprinting
//! │   ├── moderation.rs - Audit state machine and reports
//! │   ├── rating.rs     - Reviews, aggregates, recommendations
//! │   ├── bounty.rs     - Escrowed bounty requests
//! │   ├── engagement.rs - Browse, download, favorites, tags, progress
//! │   └── wallet.rs     - Points and levels
//! ├── database/      - Store trait, PostgreSQL and in-memory backends
//! ├── storage.rs     - Content store for uploaded bytes
//! ├── scanner.rs     - Malware scanner (clamd)
//! └── api/           - HTTP API endpoints and middleware
//! ```

pub mod api;
pub mod config;
pub mod database;
pub mod engine;
pub mod error;
pub mod models;
pub mod scanner;
pub mod storage;

// Re-export main types for convenience
pub use config::CommunityConfig;
pub use database::{DatabasePool, MemoryStore, Store};
pub use engine::{AdminToken, Caller, Engine, EngineConfig};
pub use error::{EngineError, EngineResult};
pub use scanner::{ClamdScanner, MalwareScanner, NoOpScanner, ScanVerdict};
pub use storage::{ContentStore, FsContentStore, MemoryContentStore};
