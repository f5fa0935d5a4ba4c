//! Shared helpers for unit tests.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use diagram_model::DiagramEvent;
use tracing::{Level, Subscriber};
use tracing_subscriber::{layer::Context, prelude::*, Layer};

use crate::event_manager::EventManager;

/// Counts log records at one level.
#[derive(Clone)]
pub struct LevelCounter {
    level: Level,
    count: Arc<AtomicUsize>,
}

impl LevelCounter {
    pub fn new(level: Level) -> Self {
        Self {
            level,
            count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Installs the counter as the default subscriber for the current thread
    /// until the guard is dropped.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        tracing::subscriber::set_default(tracing_subscriber::registry().with(self.clone()))
    }
}

impl<S: Subscriber> Layer<S> for LevelCounter {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == self.level {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Records every event delivered for the subscribed kinds.
#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<DiagramEvent>>>,
}

impl Recorder {
    pub fn attach(&self, events: &EventManager, kinds: &[diagram_model::EventKind]) {
        for kind in kinds {
            let sink = Arc::clone(&self.events);
            events.on(*kind, move |event| {
                sink.lock().expect("recorder lock").push(event.clone());
                Ok(())
            });
        }
    }

    pub fn events(&self) -> Vec<DiagramEvent> {
        self.events.lock().expect("recorder lock").clone()
    }

    pub fn kinds(&self) -> Vec<diagram_model::EventKind> {
        self.events().iter().map(DiagramEvent::kind).collect()
    }
}
