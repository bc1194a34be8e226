//! # maturity-core
//!
//! The DevOps maturity assessment engine - THE LOGIC.
//!
//! A team answers a fixed questionnaire; the engine records the answers,
//! scores them per section and per subcategory, and exports the result.
//! Access to all of it is gated by role-based permissions scoped to teams
//! and groups of teams.
//!
//! ## Components
//!
//! - `catalog`: the immutable question model and advice, built from a source
//! - `ledger`: idempotent per-question response storage
//! - `scoring`: pure scoring over a catalog and a selection overlay
//! - `lifecycle`: the `in_progress -> completed` state machine
//! - `access`: session validation and team/group permission resolution
//! - `storage`: in-memory and redb repository backends
//!
//! ## Architectural Constraints
//!
//! - NO async, NO network dependencies (pure Rust)
//! - Storage is injected through the `repository` traits
//! - Scoring is a pure function of catalog and responses

// =============================================================================
// MODULES
// =============================================================================

pub mod access;
pub mod catalog;
pub mod export;
pub mod ledger;
pub mod lifecycle;
pub mod primitives;
pub mod repository;
pub mod scoring;
pub mod storage;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    Action, AnswerId, Assessment, AssessmentFilter, AssessmentId, AssessmentStatus, ErrorKind,
    Group, GroupId, MaturityError, Page, Permission, QuestionId, Resource, Response, Role, RoleId,
    SectionScore, Session, Team, TeamId, UserId,
};

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use access::AccessResolver;
pub use catalog::{
    Advice, AdviceCatalog, Catalog, CatalogSource, FileCatalogSource, Question, QuestionKind,
    Section, StaticCatalogSource,
};
pub use export::write_csv;
pub use ledger::ResponseLedger;
pub use lifecycle::{AssessmentLifecycle, FormSelections, HistoryEntry, Questionnaire, Results};
pub use repository::{AbortSignal, AssessmentRepository, DirectoryRepository, SessionRepository};
pub use scoring::{Selections, SubCategoryBreakdown};

// =============================================================================
// RE-EXPORTS: Storage
// =============================================================================

pub use storage::{MemoryStore, RedbStore};
