pub mod config;
pub mod context;
pub mod engine;
pub mod environment;
pub mod evaluator;
pub mod exception;
pub mod param;
pub mod request;
pub mod response;
pub mod scanner;
pub mod session;
pub mod signal;
pub mod util;

pub use config::Config;
pub use context::{Context, ContextBuilder};
pub use engine::Engine;
pub use environment::{Environment, MapEnvironment, ProcessEnvironment};
pub use evaluator::{DirectiveEvaluator, Evaluator};
pub use exception::Exception;
pub use param::SessionStatus;
pub use request::Request;
pub use response::Response;
pub use session::{FileSessionStore, MemorySessionStore, Session, SessionStore, SessionValue};
pub use signal::{Interrupt, Outcome};
pub use util::HtmlBuilder;
