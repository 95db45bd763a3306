//! One-way LDAP to Nextcloud synchronization engine.
//!
//! The engine reads identifiers and entries through [`DirectorySource`],
//! turns entries into user drafts with an [`EntryTransformer`], reconciles
//! them against a [`TargetPlatform`] and advances a per-profile watermark only
//! after a fully successful run.

pub mod config;
pub mod engine;
pub mod error;
pub mod mapper;
pub mod provisioner;
pub mod reconciler;
pub mod statistics;
pub mod traits;
pub mod transform;
pub mod watermark;
pub mod writer;

pub use config::SyncSettings;
pub use engine::{AlertSink, RunPhase, RunReport, SyncEngine, SyncOptions, SyncPlan};
pub use error::{SyncError, SyncResult};
pub use mapper::{AttributeMapConfig, AttributeMapper, CatalogConflict, CatalogGroup, Category, CategoryConfig};
pub use provisioner::GroupProvisioner;
pub use reconciler::{Decision, DecisionKind, DecisionReason, MembershipDiff};
pub use statistics::{RunStatistics, StatisticsTracker};
pub use traits::{DirectorySource, TargetPlatform};
pub use transform::{EntryTransformer, RhaiLimits, RhaiTransformer, TransformError, TransformOperation};
pub use watermark::{FileWatermarkStore, MemoryWatermarkStore, WatermarkStore};
pub use writer::PlatformWriter;
