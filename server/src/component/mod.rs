pub mod common;
pub mod event_bus;

pub use common::{Attachable, Component, ConsumerPorts, Ports, PortsHandle, ProducerPorts};
pub use event_bus::{CloseReason, EventBus};
