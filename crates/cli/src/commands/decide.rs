use clap::Args;

use crate::commands::{
    application_failure, to_data, validation_failure, with_service, ActorArgs, CommandResult,
};
use bushidage_core::approvals::{Decision, DecisionInput};
use bushidage_core::domain::approval::ApprovalId;

#[derive(Debug, Clone, Args)]
pub struct DecideArgs {
    #[arg(help = "Approval request id")]
    pub id: String,
    #[arg(long, help = "approve|reject")]
    pub decision: String,
    #[arg(long)]
    pub comment: Option<String>,
    #[arg(long, help = "Fail with a conflict unless the request is still at this version")]
    pub expected_version: Option<u32>,
    #[command(flatten)]
    pub actor: ActorArgs,
}

fn parse_decision(raw: &str) -> Option<Decision> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "approve" | "approved" => Some(Decision::Approve),
        "reject" | "rejected" => Some(Decision::Reject),
        _ => None,
    }
}

pub fn run(args: DecideArgs) -> CommandResult {
    let Some(decision) = parse_decision(&args.decision) else {
        let (error_class, message, exit_code) = validation_failure(format!(
            "unsupported decision `{}` (expected approve|reject)",
            args.decision
        ));
        return CommandResult::failure("decide", error_class, message, exit_code);
    };

    let id = ApprovalId(args.id.trim().to_string());
    let mut input = DecisionInput::new(decision, args.actor.identity());
    input.comment = args.comment;
    input.expected_version = args.expected_version;

    with_service("decide", |service| async move {
        let request =
            service.decide(&id, input).await.map_err(|error| application_failure(&error))?;
        let message = format!(
            "request `{}` is {} at step {}/{} ({:.0}%)",
            request.id,
            request.status.as_str(),
            request.current_step,
            request.total_steps,
            request.progress_pct()
        );
        Ok((message, Some(to_data(&request)?)))
    })
}
