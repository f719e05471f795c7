pub mod config;
pub mod error;
pub mod intent;
pub mod kernel;
pub mod outputs;
pub mod semantic;
pub mod services;

// Re-export the pieces a host needs to wire up a resolver.
pub use config::{HeuristicsConfig, ResolverConfig};
pub use kernel::resolver::{Collaborators, Resolver};
pub use kernel::result::{ConfidenceTier, ResolutionResult};
pub use outputs::{ActionTable, Route};
