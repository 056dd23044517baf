pub mod clock;
pub mod interrupt;
pub mod telemetry;

pub use interrupt::InterruptHandle;
pub use telemetry::init_tracing;
