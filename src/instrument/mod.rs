//! Instrument drivers.
//!
//! Each driver owns one [`Transport`](crate::adapters::Transport) and turns
//! typed calls into instrument command strings. Drivers are generic over the
//! transport, so tests run them against the mock bridge.

pub mod newport_1830c;
pub mod sr830;

pub use newport_1830c::{Newport1830C, PowerMeterStatus};
pub use sr830::{
    Channel, EndOfBuffer, ErrorStatus, InputCoupling, InputShield, LiaStatus, OffsetChannel,
    Output, ReferenceSource, ReferenceTrigger, SerialPollStatus, Sr830, StandardEventStatus,
};
