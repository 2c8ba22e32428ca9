use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex};
use tracing::{error, warn};
use wager_core::Error;

use crate::component::common::{Attachable, Ports};
use crate::frame::EventFrame;

/// Fans internal events (C12's `idle_events`/`game_events`) out to every
/// attached worker: the hub's broadcaster, the session manager, and anything
/// else that projects state off a terminal/idle transition. At-least-once
/// within this process; cross-process delivery is the ephemeral store's job.
pub struct EventBus {
    tx: mpsc::Sender<EventFrame>,
    attached_txs: Arc<Mutex<Vec<(String, mpsc::Sender<EventFrame>)>>>,
    close_rx: watch::Receiver<bool>,
}

impl EventBus {
    pub fn new() -> Self {
        let (close_tx, close_rx) = watch::channel(false);
        let (tx, mut rx) = mpsc::channel::<EventFrame>(128);
        let txs: Arc<Mutex<Vec<(String, mpsc::Sender<EventFrame>)>>> = Arc::new(Mutex::new(vec![]));
        let attached_txs = txs.clone();

        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let txs = attached_txs.lock().await;
                for (id, t) in txs.iter() {
                    if t.send(msg.clone()).await.is_err() {
                        warn!("failed to deliver {} to subscriber {}", msg, id);
                    }
                }
                if matches!(msg, EventFrame::Shutdown) {
                    let _ = close_tx.send(true);
                    break;
                }
            }
        });

        Self {
            tx,
            attached_txs: txs,
            close_rx,
        }
    }

    /// Attach a worker's input channel as a subscriber, and forward anything
    /// it produces on its own output channel back onto the bus.
    pub async fn attach<T: Attachable>(&self, name: &str, attachable: &mut T) {
        let mut close_rx = self.close_rx.clone();
        if let Some(mut rx) = attachable.output() {
            let tx = self.tx.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = close_rx.changed() => break,
                        msg = rx.recv() => {
                            match msg {
                                Some(msg) => {
                                    if tx.send(msg).await.is_err() {
                                        error!("event bus closed while forwarding a produced event");
                                        return;
                                    }
                                }
                                None => break,
                            }
                        }
                    }
                }
            });
        }

        if let Some(tx) = attachable.input() {
            let mut txs = self.attached_txs.lock().await;
            txs.push((name.to_string(), tx));
        }
    }

    pub async fn publish(&self, event: EventFrame) {
        if let Err(e) = self.tx.send(event).await {
            error!("failed to publish event: {}", e);
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Reason a component's run loop returned.
#[derive(Debug, Clone)]
pub enum CloseReason {
    Complete,
    Fault(Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::common::{Component, ConsumerPorts, ProducerPorts};

    struct Producer;

    #[async_trait::async_trait]
    impl Component<ProducerPorts, ()> for Producer {
        fn name(&self) -> &str {
            "test-producer"
        }

        async fn run(ports: ProducerPorts, _ctx: ()) {
            let _ = ports
                .try_send(EventFrame::IdleCanceled {
                    game_id: 1,
                    player_id: 2,
                })
                .await;
            ports.close(CloseReason::Complete);
        }
    }

    struct Consumer;

    #[async_trait::async_trait]
    impl Component<ConsumerPorts, mpsc::Sender<EventFrame>> for Consumer {
        fn name(&self) -> &str {
            "test-consumer"
        }

        async fn run(mut ports: ConsumerPorts, relay: mpsc::Sender<EventFrame>) {
            while let Some(frame) = ports.recv().await {
                let _ = relay.send(frame).await;
            }
            ports.close(CloseReason::Complete);
        }
    }

    #[tokio::test]
    async fn events_flow_from_producer_through_bus_to_consumer() {
        let bus = EventBus::new();
        let (relay_tx, mut relay_rx) = mpsc::channel(4);

        let producer = Producer;
        let mut producer_handle = producer.start(());
        bus.attach("producer", &mut producer_handle).await;

        let consumer = Consumer;
        let mut consumer_handle = consumer.start(relay_tx);
        bus.attach("consumer", &mut consumer_handle).await;

        let received = relay_rx.recv().await.unwrap();
        assert!(matches!(received, EventFrame::IdleCanceled { game_id: 1, player_id: 2 }));
    }
}
