//! # Parley Core
//!
//! Domain types, traits, and error definitions for the Parley chat agent
//! runtime. This crate defines the domain model that all other crates
//! implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator the agent talks to is a trait here: the model backend,
//! the token counter, the tools. Implementations live elsewhere (or in tests),
//! so the agent can be driven by a stub model and a heuristic counter just as
//! easily as by a hosted API.

pub mod blocking;
pub mod error;
pub mod event;
pub mod message;
pub mod model;
pub mod token;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, ToolError};
pub use event::{DomainEvent, EventBus};
pub use message::{BackendRole, FunctionCallPayload, Image, ImageDetail, Message, RoleType, Turn};
pub use model::{
    Choice, FunctionCallRequest, ModelBackend, ModelConfig, ModelRequest, ModelResponse,
    StreamChunk, StubModel, ToolSchema, Usage,
};
pub use token::{HeuristicTokenCounter, TokenCounter};
pub use tool::{FunctionTool, ParamKind, Tool, ToolArgs, ToolOutput, ToolParam, ToolRegistry};
