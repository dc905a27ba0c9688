/// Named channels: registration, firing and `sync_on`.
pub mod channel;
/// Settings loaded from files and `ZVON_` environment variables.
pub mod config;
/// Initialisation errors and re-exports of the bus error types.
pub mod error;
/// Events, structural matching and the compact notation.
pub mod event;
/// Task dispatch: bounded concurrency, neglect queue, failure hooks.
pub mod hub;
/// `tracing` subscriber setup.
pub mod logging;
/// Channel table and receiver resolution.
pub mod router;
/// Deferred and repeating fires.
pub mod scheduler;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

/// Channels and handlers.
pub use channel::{
    Channel, ChannelName, FireOptions, Handler, Lifetime, RegistrationView, SyncHelper,
};
/// Settings.
pub use config::Settings;
/// Error types and the crate result alias.
pub use error::{
    BusError, DispatchError, LoggingError, PatternError, SchedulerError, SettingsError,
    StackError, StatusCode, ZvonResult,
};
/// Events.
pub use event::{matches, Callback, Event, EventSpec, EventType, Kwargs, Value};
/// Dispatcher.
pub use hub::{FireTrace, HandlerFailure, Hub, HubConfig, Spawned, Task, TaskHandle};
/// Logging.
pub use logging::{init_logging, LogFormat, LoggingConfig, LoggingHandle};
/// Routing.
pub use router::{HookId, Router, RouterPolicy};
/// Scheduler.
pub use scheduler::{ItemBuilder, TimeScheduler, TimeSchedulerItem};
