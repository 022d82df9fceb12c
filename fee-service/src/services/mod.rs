//! Services module for fee-service.

pub mod calculator;
pub mod conflict;
pub mod database;
pub mod directory;
pub mod engine;
pub mod memory;
pub mod metrics;
pub mod planner;
pub mod resolver;
pub mod store;

pub use database::Database;
pub use directory::{PaymentsLedger, SchoolDirectory, StaticDirectory, StaticLedger};
pub use engine::{EngineSettings, FeeEngine, StructureCreation};
pub use memory::InMemoryStore;
pub use metrics::{get_metrics, init_metrics};
pub use store::{FeeStore, StructureBatch};
