//! Metadata-driven use cases: condition building, validation, data access and CRUD orchestration.

pub mod condition;
mod crud;
pub mod dao;
pub mod payload;
pub mod rules;
pub mod validation;

pub use condition::ConditionBuilder;
pub use crud::CrudService;
pub use dao::BaseDao;
pub use payload::Payload;
pub use rules::RuleValidator;
pub use validation::{FieldValidator, ValidationResult, Violation, ViolationKind};
