mod builtin;
pub mod composite;
pub mod error;
pub mod field_state;
pub mod history;
pub mod manager;
pub mod registry;
pub mod request;
pub mod session;

pub use composite::{BatchRequest, CompositeRequest};
pub use error::{CommitError, ReplayError, Result, TxnError};
pub use field_state::{FieldChange, FieldStateRequest};
pub use history::HistoryConfig;
pub use manager::{ManagerState, TransactionManager};
pub use registry::{RequestFactory, RequestRegistry, RequestSpec};
pub use request::{Request, RequestHandle, RequestId, RequestStatus, RequestType};
pub use session::{Session, SessionId, SessionOutcome, SessionState, overlapping_fields};

// Re-export so plugin requests can implement `Request` without a direct dependency
pub use async_trait::async_trait;
