//! Push side of the vault: decrypted credential projections, push plans and
//! the targets that receive them.

mod plan;
mod projector;
mod target;

pub use plan::{HostPlan, PlanError, PushPlan};
pub use projector::SecretProjector;
pub use target::{FilePush, NoopPush, PushTarget};
