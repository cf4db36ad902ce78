pub mod availability;
pub mod company;
pub mod meeting;
pub mod session;
pub mod signal;

pub use availability::AvailabilityWindow;
pub use company::Company;
pub use meeting::{Meeting, MeetingStatus};
pub use session::{CallSession, CallState, EngineReply, TranscriptTurn, TurnRole};
pub use signal::{ProspectDetails, TurnReply, TurnSignal};
