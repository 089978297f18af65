//! A small interactive command interpreter built around a real job-control
//! execution core.
//!
//! The crate turns parsed command lines into operating-system processes:
//! pipelines are connected through real OS pipes, file redirections are
//! applied at the descriptor level, background pipelines are tracked as jobs
//! in a fixed-capacity table, terminated children are reaped without
//! blocking, and a one-level `if <cmd> then ... [else ...] fi` construct
//! branches on a child's real exit status.
//!
//! The main entry point is [`Interpreter`], which owns the [`Shell`] state
//! (variable store plus job table) and drives the REPL. The execution core
//! is exposed through [`exec::execute_line`], the job table through
//! [`jobs::JobTable`], and conditional blocks through
//! [`conditional::evaluate_block`].

mod builtin;
pub mod conditional;
pub mod env;
pub mod exec;
mod interpreter;
pub mod jobs;
pub mod parser;

pub use interpreter::{Interpreter, Shell};
