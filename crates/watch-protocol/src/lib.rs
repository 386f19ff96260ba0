//! Message schemas exchanged between the observer, the coordinator and the
//! presentation process, plus the outbound de-duplication/rate-limit gate.

mod gate;
mod messages;

pub use gate::{GateDecision, OutboundGate};
pub use messages::{
    CoordinatorNotice, Observation, ObserverMessage, StateSnapshot, UiRequest, UiResponse,
};
