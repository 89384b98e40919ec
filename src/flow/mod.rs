//! The discover-then-authorize flow.
//!
//! A call enters through one of the four [`FlowOrchestrator`] methods, loads
//! or creates the session's [`AuthConfig`], runs one backend step and turns
//! the resulting [`FlowStatus`] into a [`FlowResponse`] or a [`Page`].

pub mod backend;
pub mod config;
pub mod error;
pub mod interpret;
pub mod orchestrator;
pub mod render;
pub mod session;
pub mod status;

pub use backend::{AuthorizationBackend, DiscoveryBackend, FlowRequest};
pub use config::{AuthConfig, ClientSettings, SessionConfigStore};
pub use error::FlowError;
pub use interpret::{NextAction, Page};
pub use orchestrator::FlowOrchestrator;
pub use render::{FlowResponse, Outcome};
pub use session::{MemorySession, SessionHandle};
pub use status::{FailureDetail, FlowStatus};
