pub mod completions;
pub mod env;
pub mod exec;

pub use completions::CompletionsCommand;
pub use env::EnvCommand;
pub use exec::ExecCommand;
