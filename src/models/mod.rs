pub mod invitation;
pub mod task;
pub mod team;
pub mod user;

pub use invitation::{Decision, Invitation, InvitationStatus, PendingInvitation};
pub use task::{Comment, Priority, Task, TaskChanges};
pub use team::Team;
pub use user::{ProfileChanges, User, UserProfile};

/// Fresh document id. Every collection keys `_id` by a v4 uuid string.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
