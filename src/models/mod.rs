//! Core data models: publications and harvest plans.

mod plan;
mod publication;

pub use plan::{Plan, PlanError, SitePlan};
pub use publication::{Publication, PublicationBuilder, PublicationKind, QueryOptions};
