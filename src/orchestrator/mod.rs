pub mod executor;
pub mod registry;
pub mod router;
pub mod supervisor;

pub use executor::{DelegationExecutor, DelegationOutcome, DelegationTransport, SharedTransport};
pub use registry::{AgentDescriptor, AgentRegistry};
pub use router::{DelegationRequest, RouteOutcome, Router};
pub use supervisor::Supervisor;
