pub mod math;
pub mod text;
pub mod traits;

pub use math::MathAgent;
pub use text::TextAgent;
pub use traits::{AgentBehavior, AgentRequest, AgentResponse};
