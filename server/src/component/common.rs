use async_trait::async_trait;
use tokio::sync::{
    mpsc::{self, error::SendError},
    oneshot,
};
use tracing::{error, info, warn};

use crate::frame::EventFrame;

use super::event_bus::CloseReason;

/// Interface for a long-running worker that can be attached to the event bus.
pub trait Attachable {
    fn input(&mut self) -> Option<mpsc::Sender<EventFrame>>;
    fn output(&mut self) -> Option<mpsc::Receiver<EventFrame>>;
}

/// The group of channels used to talk to a spawned component from the outside.
pub struct PortsHandle {
    input_tx: Option<mpsc::Sender<EventFrame>>,
    output_rx: Option<mpsc::Receiver<EventFrame>>,
    close_rx: Option<oneshot::Receiver<CloseReason>>,
}

impl PortsHandle {
    pub async fn wait(&mut self) {
        let rx = self
            .close_rx
            .take()
            .expect("PortsHandle::wait called more than once");
        match rx.await {
            Ok(CloseReason::Complete) => (),
            Ok(CloseReason::Fault(e)) => error!("component closed with fault: {}", e),
            Err(_) => warn!("component dropped its close channel without reporting"),
        }
    }

    pub async fn send(&self, frame: EventFrame) {
        if let Some(ref input_tx) = self.input_tx {
            if let Err(e) = input_tx.send(frame).await {
                warn!("failed to send to component: {:?}", e);
            }
        }
    }

    pub async fn recv(&mut self) -> Option<EventFrame> {
        self.output_rx.as_mut()?.recv().await
    }
}

impl Attachable for PortsHandle {
    fn input(&mut self) -> Option<mpsc::Sender<EventFrame>> {
        self.input_tx.clone()
    }

    fn output(&mut self) -> Option<mpsc::Receiver<EventFrame>> {
        self.output_rx.take()
    }
}

pub trait Ports: Send {
    fn create() -> (Self, PortsHandle)
    where
        Self: Sized;

    fn close(self, reason: CloseReason);
}

/// Ports for a component that only consumes events (idle watcher, matchmaker).
pub struct ConsumerPorts {
    rx: mpsc::Receiver<EventFrame>,
    close: oneshot::Sender<CloseReason>,
}

impl ConsumerPorts {
    pub async fn recv(&mut self) -> Option<EventFrame> {
        self.rx.recv().await
    }
}

impl Ports for ConsumerPorts {
    fn create() -> (Self, PortsHandle) {
        let (input_tx, input_rx) = mpsc::channel(64);
        let (close_tx, close_rx) = oneshot::channel();
        (
            Self {
                rx: input_rx,
                close: close_tx,
            },
            PortsHandle {
                input_tx: Some(input_tx),
                output_rx: None,
                close_rx: Some(close_rx),
            },
        )
    }

    fn close(self, reason: CloseReason) {
        if self.close.send(reason).is_err() {
            warn!("failed to send close reason, receiver already dropped");
        }
    }
}

/// Ports for a component that only produces events (the broadcaster feeding the hub).
pub struct ProducerPorts {
    tx: mpsc::Sender<EventFrame>,
    close: oneshot::Sender<CloseReason>,
}

impl ProducerPorts {
    pub async fn try_send(&self, frame: EventFrame) -> Result<(), SendError<EventFrame>> {
        self.tx.send(frame).await
    }

    pub async fn send(&self, frame: EventFrame) {
        if let Err(e) = self.tx.send(frame).await {
            warn!("send error: {:?}", e);
        }
    }
}

impl Ports for ProducerPorts {
    fn create() -> (Self, PortsHandle) {
        let (output_tx, output_rx) = mpsc::channel(64);
        let (close_tx, close_rx) = oneshot::channel();
        (
            Self {
                tx: output_tx,
                close: close_tx,
            },
            PortsHandle {
                input_tx: None,
                output_rx: Some(output_rx),
                close_rx: Some(close_rx),
            },
        )
    }

    fn close(self, reason: CloseReason) {
        if self.close.send(reason).is_err() {
            warn!("failed to send close reason, receiver already dropped");
        }
    }
}

#[async_trait]
pub trait Component<P, C>
where
    P: Ports + 'static,
    C: Send + 'static,
{
    fn name(&self) -> &str;

    fn start(&self, context: C) -> PortsHandle {
        info!("starting component: {}", self.name());
        let (ports, attach) = P::create();
        tokio::spawn(async move {
            Self::run(ports, context).await;
        });
        attach
    }

    async fn run(ports: P, context: C);
}
