//! Relations between models
//!
//! - `descriptor`: declared relations and their JOIN rendering
//! - `planner`: join-or-defer classification of requested relation paths
//! - `loader`: batched follow-up queries for deferred relations

pub mod descriptor;
pub mod loader;
pub mod planner;

pub use descriptor::{ColumnSet, JoinTable, Predicate, RelationDescriptor, RelationKind};
pub(crate) use loader::load_deferred;
pub use loader::OWNER_INDEX;
pub use planner::{classify, DeferredRelation, PlannedJoin, PlannerState, RelationPlan, RelationPlanner};
