//! Upstream Stream Processing
//!
//! Everything between raw response bytes and classified events:
//!
//! ```text
//!  Transport ──bytes──▶ LineDecoder ──lines──▶ DeltaClassifier ──▶ ClassifiedEvent
//!                                                   │
//!                                       Native  or  ThinkTagMachine
//! ```
//!
//! [`StreamAdapter`] wires the pieces together for one upstream call and
//! exposes the result as a lazy `Stream`.

mod adapter;
mod classifier;
mod decoder;
mod think;
mod types;

pub use adapter::{AdapterError, EventStream, StreamAdapter};
pub use classifier::{Delta, DeltaClassifier, LineOutcome, UpstreamProtocolError};
pub use decoder::{DecodeError, DecodedLine, LineDecoder, DONE_SENTINEL};
pub use think::{ThinkTagMachine, THINK_CLOSE, THINK_OPEN};
pub use types::{ClassifiedEvent, ClassifierMode, Phase, ReasoningPolicy};
