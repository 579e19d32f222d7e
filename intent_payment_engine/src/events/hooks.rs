use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{EventHandler, EventProducer, Handler, IntentRevokedEvent, PaymentRunEvent, ReceiptRecordedEvent};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub receipt_recorded_producer: Vec<EventProducer<ReceiptRecordedEvent>>,
    pub intent_revoked_producer: Vec<EventProducer<IntentRevokedEvent>>,
    pub payment_run_producer: Vec<EventProducer<PaymentRunEvent>>,
}

pub struct EventHandlers {
    pub on_receipt_recorded: Option<EventHandler<ReceiptRecordedEvent>>,
    pub on_intent_revoked: Option<EventHandler<IntentRevokedEvent>>,
    pub on_payment_run: Option<EventHandler<PaymentRunEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_receipt_recorded = hooks.on_receipt_recorded.map(|f| EventHandler::new(buffer_size, f));
        let on_intent_revoked = hooks.on_intent_revoked.map(|f| EventHandler::new(buffer_size, f));
        let on_payment_run = hooks.on_payment_run.map(|f| EventHandler::new(buffer_size, f));
        Self { on_receipt_recorded, on_intent_revoked, on_payment_run }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_receipt_recorded {
            result.receipt_recorded_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_intent_revoked {
            result.intent_revoked_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_payment_run {
            result.payment_run_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_receipt_recorded {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_intent_revoked {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_payment_run {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_receipt_recorded: Option<Handler<ReceiptRecordedEvent>>,
    pub on_intent_revoked: Option<Handler<IntentRevokedEvent>>,
    pub on_payment_run: Option<Handler<PaymentRunEvent>>,
}

impl EventHooks {
    pub fn on_receipt_recorded<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(ReceiptRecordedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_receipt_recorded = Some(Arc::new(f));
        self
    }

    pub fn on_intent_revoked<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(IntentRevokedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_intent_revoked = Some(Arc::new(f));
        self
    }

    pub fn on_payment_run<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PaymentRunEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_payment_run = Some(Arc::new(f));
        self
    }
}
