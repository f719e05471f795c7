pub mod router;

pub use router::{ActionInput, ActionSpec, ActionTable, HandlerShape, Route};
