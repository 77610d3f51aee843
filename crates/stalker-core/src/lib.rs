pub mod control;
pub mod profile;
pub mod reconcile;

pub use profile::{
    IdentityError, ProfileAttributes, ProfileQuery, ProfileSnapshot, ProfileVisibility, SteamId,
    TrackedProfile,
};
pub use reconcile::{reconcile, NameChange, Reconciled};
