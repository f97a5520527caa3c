//! These models represent the objects passed around by the agent
//!
//! There are several related formats we need to interact with:
//! - request payloads sent from the web interface to the server
//! - streaming protocol lines, sent from the server back to the interface
//! - openai chat messages/tools, sent from the agent to the LLM
//! - tool calls, sent from the agent to the systems providing capabilities
//!
//! These overlap to varying degrees. Incoming and outgoing data is converted
//! to and from the internal structs at the edges, so the internal models are
//! not an exact match to any single wire format.
pub mod message;
pub mod role;
pub mod tool;
