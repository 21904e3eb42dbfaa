//! Company research pipeline
//!
//! - `ResearchBackend`: the external collaborators (research, levels,
//!   salary, contacts, reply drafting)
//! - `IsolatedBackend`: collaborators run as external commands under the
//!   isolated executor
//! - `Pipeline`: the cached stages built on a backend
//! - `CompanyResearchHandler` / `GenerateReplyHandler`: task entry points

mod backend;
mod handlers;
mod isolated_backend;
mod research;

pub use backend::{CompanyProfile, Contact, ResearchBackend, SalaryRow};
pub use handlers::{register_handlers, CompanyResearchHandler, GenerateReplyHandler};
pub use isolated_backend::IsolatedBackend;
pub use research::Pipeline;
