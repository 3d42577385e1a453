//! Entity types persisted by the relational store
//!
//! ```text
//! User ──owns──► Resource ◄──parent_id── Resource (next version)
//!   │               ▲
//!   ├── Review ─────┤  (score 1..=5, immutable)
//!   ├── Favorite ───┤  (presence = favorited)
//!   ├── DownloadLog ┤  (append-only)
//!   ├── Report ─────┘  (pending -> resolved)
//!   └── BountyRequest  (escrowed points)
//! ```

mod engagement;
mod request;
mod resource;
mod user;

pub use engagement::{
    DownloadLog, FavoriteToggle, LearningProgress, NewReport, NewReview, ProgressStatus, Report,
    ReportStatus, Review, TagCount,
};
pub use request::{BountyRequest, NewRequest, RequestStatus, Settlement};
pub use resource::{
    split_tags, NewResource, Resource, ResourceQuery, ResourceStatus, SortOrder, DEFAULT_VERSION,
    MAX_PAGE_SIZE,
};
pub use user::{level_for_points, NewUser, Role, User, UserSummary, POINTS_PER_LEVEL};
