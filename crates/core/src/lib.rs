//! Core domain for the DreamPool funding concierge.
//!
//! Everything here is synchronous and free of I/O: slot types and session
//! state, the pattern extractors and validators, the slot-fill transition
//! table, and the configuration/error/audit plumbing shared by the agent
//! runtime and the CLI.

pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod extract;
pub mod flows;
pub mod validate;

pub use domain::payload::{Clock, FixedClock, Payload, PayloadBuilder, SystemClock};
pub use domain::session::{SessionId, SessionState, Transcript, Turn};
pub use domain::slot::{SlotName, SlotValue, Slots};
pub use errors::{ApplicationError, DomainError};
pub use flows::{
    FixedOrderRouting, FlowAction, FlowContext, FlowEngine, FlowEvent, FlowState,
    FlowTransitionError, NextAction, RoutingContext, RoutingStrategy, SlotFillFlow, ToolKind,
    TransitionOutcome,
};
pub use validate::{FormatViolation, ValidationFailure};
