pub mod classify;
pub mod domain;
pub mod error;
pub mod memory;
pub mod notify;
pub mod ports;
pub mod register;
pub mod session_manager;
pub mod token;

pub use classify::{AlwaysConfirm, SelfieRequired, StatusClassifier, SubmissionSignals};
pub use domain::{
    AttendanceRecord, AttendanceStatus, NewAttendance, NewSession, Session, Submission,
};
pub use error::{AttendanceError, AttendanceResult};
pub use memory::MemoryStore;
pub use notify::{Notification, NotificationChannel, Subscription};
pub use ports::{AttendanceStore, PortError, PortResult, SessionStore, UniqueConstraint};
pub use register::AttendanceRegister;
pub use session_manager::SessionManager;
