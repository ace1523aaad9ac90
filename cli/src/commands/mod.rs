mod entries;
mod helpers;
mod log;
mod summary;

pub(crate) use entries::{cmd_delete, cmd_list};
pub(crate) use log::cmd_add;
pub(crate) use summary::{cmd_summary, cmd_today};
