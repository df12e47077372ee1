//! Handler for `pakt resolve`.
//!
//! Prints the plan as JSON on stdout. On a conflict the report is printed
//! as JSON instead and the command fails.

use std::path::Path;

use miette::Result;

use pakt_ops::ops_resolve::{self, InterruptGuard, Outcome};
use pakt_util::errors::PaktError;

pub async fn exec(manifest: Option<&Path>, no_dev: bool) -> Result<()> {
    let project = super::load_project(manifest)?;
    let guard = InterruptGuard::install();

    match ops_resolve::resolve_plan(&project, !no_dev, guard.token()).await? {
        Outcome::Done(plan) => {
            println!("{}", to_json(&plan)?);
            Ok(())
        }
        Outcome::Conflict(report) => {
            println!("{}", to_json(&serde_json::json!({ "conflict": &report }))?);
            Err(PaktError::Resolution {
                message: report.to_string(),
            }
            .into())
        }
        Outcome::Cancelled => Err(PaktError::Cancelled.into()),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| {
        PaktError::Generic {
            message: format!("failed to serialize output: {e}"),
        }
        .into()
    })
}
