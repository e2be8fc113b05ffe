pub mod controller;
pub mod error;
pub mod events;
pub mod gate;
pub mod layout;
pub mod notify;
pub mod report;
pub mod session;
pub mod workflow;

pub use controller::{EditController, Phase};
pub use error::EditorError;
pub use events::{EditorEvent, Operation};
pub use layout::{layout_tree, node_label, Diagram, LayoutError, LayoutOptions};
pub use notify::{Notification, NotificationKind};
pub use session::EditorSession;
pub use workflow::{Stage, StageMachine, WorkflowError};

#[cfg(test)]
#[path = "tests/fake_service.rs"]
pub(crate) mod fake_service;
