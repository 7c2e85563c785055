//! # Augur Core
//!
//! Domain types, traits, and error definitions for the Augur market agent.
//! Nothing here performs I/O: the provider and the tools are traits whose
//! implementations live in their own crates, and the agent loop drives
//! them.
//!
//! ## Layout
//!
//! - [`message`]: messages and content blocks
//! - [`provider`]: the streaming language-model contract
//! - [`tool`]: the tool contract plus the registry/dispatcher
//! - [`event`]: domain events published by the loop
//! - [`error`]: error enums

pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod tool;

pub use error::{Error, ProviderError, Result, ToolError};
pub use event::{DomainEvent, EventBus};
pub use message::{ContentBlock, Message, Role, SessionId};
pub use provider::{
    BlockDelta, BlockKind, EventStream, Provider, ProviderRequest, StopReason, StreamEvent,
    ToolDefinition, Usage,
};
pub use tool::{InvocationMeta, Tool, ToolInvocationResult, ToolOutcome, ToolRegistry};
