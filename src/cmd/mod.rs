//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module   | Commands handled                                      |
//! |----------|-------------------------------------------------------|
//! | `run`    | `Run`                                                 |
//! | `cases`  | `List`, `Show`, `Log`                                 |
//! | `decide` | `Claim`, `Release`, `Resolve`, `Decide`, `Rebuttal`   |
//! | `admin`  | `Judges`, `Identity`, `Counter`, `Template`, `Override` |

pub mod admin;
pub mod cases;
pub mod decide;
pub mod run;

use anyhow::{Context, Result};

use gavel::config::GavelConfig;
use gavel::store::{CaseStore, DbHandle};

pub use admin::{
    cmd_counter, cmd_identity, cmd_identity_remove, cmd_identity_set, cmd_judges, cmd_judges_add,
    cmd_judges_remove, cmd_override, cmd_template, cmd_template_set,
};
pub use cases::{cmd_list, cmd_log, cmd_show};
pub use decide::{
    DecideArgs, cmd_claim, cmd_decide, cmd_rebuttal, cmd_release, cmd_resolve, parse_decision,
};
pub use run::cmd_run;

/// Open the configured case database.
pub(crate) fn open_store(config: &GavelConfig) -> Result<DbHandle> {
    let store = CaseStore::open(&config.storage.db_path).with_context(|| {
        format!(
            "Failed to open case database at {}",
            config.storage.db_path.display()
        )
    })?;
    Ok(DbHandle::new(store))
}
