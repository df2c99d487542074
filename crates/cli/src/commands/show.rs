use clap::Args;
use serde_json::json;

use crate::commands::{application_failure, to_data, with_service, CommandResult};
use bushidage_core::domain::approval::ApprovalId;

#[derive(Debug, Clone, Args)]
pub struct ShowArgs {
    #[arg(help = "Approval request id")]
    pub id: String,
}

pub fn run(args: ShowArgs) -> CommandResult {
    let id = ApprovalId(args.id.trim().to_string());

    with_service("show", |service| async move {
        let request = service.get(&id).await.map_err(|error| application_failure(&error))?;
        let progress = request.progress_pct();
        let message = format!(
            "{} `{}` ({}): {} at step {}/{}",
            request.request_type.as_str(),
            request.title,
            request.id,
            request.status.as_str(),
            request.current_step,
            request.total_steps
        );
        let data = json!({ "request": to_data(&request)?, "progress_pct": progress });
        Ok((message, Some(data)))
    })
}
