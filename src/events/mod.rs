use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the channel is gone.
    /// Domain writes are already committed by the time events go out.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(err) = self.send(event).await {
            warn!(error = %err, "dropping domain event");
        }
    }
}

// Domain events emitted after a successful commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        order_id: Uuid,
        order_number: String,
        guest: bool,
    },
    OrderCancelled(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    PaymentStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    GuestOrderLinked {
        order_id: Uuid,
        user_id: Uuid,
    },
    UserRegistered(Uuid),
    StockAdjusted {
        product_id: Uuid,
        sku: String,
        stock: i32,
    },
    ProductCreated(Uuid),
    ProductUpdated(Uuid),
}

/// Drains the event channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderCreated {
                order_id,
                order_number,
                guest,
            } => info!(%order_id, %order_number, guest, "order created"),
            Event::OrderCancelled(order_id) => info!(%order_id, "order cancelled"),
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => info!(%order_id, %old_status, %new_status, "order status changed"),
            Event::PaymentStatusChanged {
                order_id,
                old_status,
                new_status,
            } => info!(%order_id, %old_status, %new_status, "payment status changed"),
            Event::GuestOrderLinked { order_id, user_id } => {
                info!(%order_id, %user_id, "guest order linked")
            }
            Event::UserRegistered(user_id) => info!(%user_id, "user registered"),
            Event::StockAdjusted {
                product_id,
                sku,
                stock,
            } => info!(%product_id, %sku, stock, "stock adjusted"),
            Event::ProductCreated(product_id) => info!(%product_id, "product created"),
            Event::ProductUpdated(product_id) => info!(%product_id, "product updated"),
        }
    }

    info!("Event processing loop stopped");
}
