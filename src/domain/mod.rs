pub mod booking;
pub mod commands;
pub mod errors;
pub mod log_entry;
pub mod resource;
pub mod scan;
pub mod value_objects;

pub use booking::{Booking, BookingStatus, NewBooking, ResourceLabel};
pub use errors::*;
pub use log_entry::*;
pub use resource::*;
pub use value_objects::*;
