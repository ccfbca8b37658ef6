//! Onion middleware for the executor pipeline.
//!
//! Middlewares wrap module execution like an onion: `before` hooks run
//! in registration order on the way in, `after` hooks in reverse order
//! on the way out, and `on_error` hooks in reverse over the *executed
//! prefix* when something fails.
//!
//! ```text
//!        ┌───────────────────────────────────────┐
//!        │ A.before                              │
//!        │   ┌───────────────────────────────┐   │
//!        │   │ B.before                      │   │
//!        │   │   ┌───────────────────────┐   │   │
//!        │   │   │    module.execute     │   │   │
//!        │   │   └───────────────────────┘   │   │
//!        │   │ B.after                       │   │
//!        │   └───────────────────────────────┘   │
//!        │ A.after                               │
//!        └───────────────────────────────────────┘
//! ```

mod adapters;
mod base;
mod logging;
mod manager;

pub use adapters::{AfterMiddleware, BeforeMiddleware};
pub use base::Middleware;
pub use logging::LoggingMiddleware;
pub use manager::{MiddlewareChainError, MiddlewareManager};
