pub mod engine;
pub mod routing;
pub mod states;

pub use engine::{FlowDefinition, FlowEngine, FlowTransitionError, SlotFillFlow};
pub use routing::{FixedOrderRouting, NextAction, RoutingContext, RoutingStrategy, ToolKind};
pub use states::{FlowAction, FlowContext, FlowEvent, FlowState, TransitionOutcome};
