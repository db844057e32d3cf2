//! Pipeline events, event bus mechanics and operator notifications.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;
pub mod notification;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use notification::{
    InMemoryNotificationSink, Notification, NotificationLevel, NotificationSink, TracingNotificationSink,
};
