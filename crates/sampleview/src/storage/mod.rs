//! SQLite persistence of whole profiles.

mod reader;
mod schema;
mod writer;

pub use reader::{load_profile, open_profile, schema_version};
pub use schema::SCHEMA_VERSION;
pub use writer::{save_profile, write_profile};

use crate::error::Result;
use crate::profile::Profile;
use std::path::Path;

/// File name suffix of profile databases.
pub const PROFILE_SUFFIX: &str = ".sampleview.db";

/// Open and load the profile at `path`.
pub fn read_profile(path: &Path) -> Result<Profile> {
    let conn = open_profile(path)?;
    load_profile(&conn)
}
