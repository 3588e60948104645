// Automation Engine
//
// Event-driven automation for the Cadence CRM: domain events fan out to
// active automations, each of which evaluates its conditions against the
// entity snapshot and runs its actions against the live entity through the
// collaborator stores. Every attempt is tracked as an enrollment and audited
// with one log row.

pub mod audit;
pub mod conditions;
pub mod dispatcher;
pub mod engine;
pub mod executor;
pub mod fields;
pub mod postgres;
pub mod store;
pub mod triggers;

pub use dispatcher::AutomationDispatcher;
pub use engine::AutomationEngine;
pub use executor::ActionExecutor;
pub use postgres::{PgCrmStore, PgEngineStore};
pub use store::{CrmStore, EngineStore, MailError, MailSender, NewLogEntry, StoreError};
pub use triggers::AutomationEvent;
