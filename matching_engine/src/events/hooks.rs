use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{EventHandler, EventProducer, Handler, MatchingAcceptedEvent, MatchingCompletedEvent};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub matching_accepted_producer: Vec<EventProducer<MatchingAcceptedEvent>>,
    pub matching_completed_producer: Vec<EventProducer<MatchingCompletedEvent>>,
}

pub struct EventHandlers {
    pub on_matching_accepted: Option<EventHandler<MatchingAcceptedEvent>>,
    pub on_matching_completed: Option<EventHandler<MatchingCompletedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_matching_accepted = hooks.on_matching_accepted.map(|f| EventHandler::new(buffer_size, f));
        let on_matching_completed = hooks.on_matching_completed.map(|f| EventHandler::new(buffer_size, f));
        Self { on_matching_accepted, on_matching_completed }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_matching_accepted {
            result.matching_accepted_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_matching_completed {
            result.matching_completed_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_matching_accepted {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_matching_completed {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_matching_accepted: Option<Handler<MatchingAcceptedEvent>>,
    pub on_matching_completed: Option<Handler<MatchingCompletedEvent>>,
}

impl EventHooks {
    pub fn on_matching_accepted<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(MatchingAcceptedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_matching_accepted = Some(Arc::new(f));
        self
    }

    pub fn on_matching_completed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(MatchingCompletedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_matching_completed = Some(Arc::new(f));
        self
    }
}
