//! Public DTOs for the routing gateway's inbound/outbound surface.

pub mod chat_request;
pub mod message;
pub mod model;
pub mod response;
pub mod tool;
pub mod validation;

pub use chat_request::{ChatCompletionRequest, ModelSelector};
pub use message::{ContentPart, ImageUrl, Message, MessageContent, Role};
pub use model::{ModelDefinition, ModelKind, ModelListEntry, ModelSpeed};
pub use response::{
    AttemptError, ChatCompletionChoice, ChatCompletionChunk, ChatCompletionResponse, ChunkChoice,
    ChunkDelta, FinishReason, RouterMetadata, Usage,
};
pub use tool::{FunctionDefinition, ToolCall, ToolCallFunction, ToolChoice, ToolDefinition};
pub use validation::validate_request;
