pub mod booking;
pub mod money;
pub mod seat;
pub mod showtime;

pub use booking::{
    BookedSeat, Booking, BookingDraft, BookingStatus, Payment, PaymentMethod, PaymentStatus,
    TransitionExtra,
};
pub use money::Money;
pub use seat::{Seat, SeatId, SeatStatus, SeatType};
pub use showtime::{SeatLayout, SeatMapView, Showtime};
