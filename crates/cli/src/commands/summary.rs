use crate::commands::{application_failure, to_data, with_service, CommandResult};

pub fn run() -> CommandResult {
    with_service("summary", |service| async move {
        let summary = service.summary().await.map_err(|error| application_failure(&error))?;
        let message = format!(
            "{} total: {} pending, {} approved, {} rejected",
            summary.total, summary.pending, summary.approved, summary.rejected
        );
        Ok((message, Some(to_data(&summary)?)))
    })
}
