pub mod broadcast;
pub mod lock;
pub mod presence;
pub mod registry;
pub mod router;

pub use broadcast::RoomBroadcaster;
pub use lock::LockManager;
pub use presence::PresenceTracker;
pub use registry::{ConnectionRegistry, EventSender};
pub use router::EventRouter;
