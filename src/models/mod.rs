// ABOUTME: Core data models for monitored sessions and paired devices

pub mod device;
pub mod session;

pub use device::{Device, DeviceSummary};
pub use session::{DiffStat, Pane, PaneType, PrInfo, Session, SessionStatus};
