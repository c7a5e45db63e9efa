pub mod inbox;
pub mod tracing_sink;

pub use inbox::AlertInbox;
pub use tracing_sink::TracingAlertSink;
