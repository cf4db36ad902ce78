pub mod ai;
pub mod calendar;
pub mod call_flow;
pub mod ledger;
pub mod registry;
pub mod slots;
pub mod telephony;
