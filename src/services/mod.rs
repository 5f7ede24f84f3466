pub mod coordinator;
pub mod payment;
pub mod pricing;
pub mod reaper;

pub use coordinator::{
    ConfirmBooking, Confirmation, ExpireOutcome, ReservationCoordinator, SelectSeats, SelectionReceipt,
};
pub use payment::{PassthroughGateway, PaymentDecision, PaymentGateway, PaymentRequest, ScriptedGateway};
pub use reaper::{ExpiryReaper, SweepReport};
