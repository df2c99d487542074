use std::str::FromStr;

use clap::Args;
use rust_decimal::Decimal;

use crate::commands::{
    application_failure, to_data, validation_failure, with_service, ActorArgs, CommandError,
    CommandResult,
};
use bushidage_core::approvals::NewApprovalRequest;
use bushidage_core::domain::approval::{Priority, RequestType};

#[derive(Debug, Clone, Args)]
pub struct SubmitArgs {
    #[arg(long = "type", help = "Request type: leave|expense|purchase|hiring")]
    pub request_type: String,
    #[arg(long)]
    pub title: String,
    #[arg(long)]
    pub description: String,
    #[arg(long, help = "Optional monetary amount, e.g. 12800.00")]
    pub amount: Option<String>,
    #[arg(long, default_value = "normal", help = "low|normal|high|urgent")]
    pub priority: String,
    #[command(flatten)]
    pub actor: ActorArgs,
}

impl SubmitArgs {
    fn draft(&self) -> Result<NewApprovalRequest, CommandError> {
        let request_type = RequestType::from_str(&self.request_type)
            .map_err(|error| validation_failure(error.to_string()))?;
        let priority = Priority::parse(&self.priority).ok_or_else(|| {
            validation_failure(format!(
                "unsupported priority `{}` (expected low|normal|high|urgent)",
                self.priority
            ))
        })?;
        let amount = self
            .amount
            .as_deref()
            .map(|raw| {
                Decimal::from_str(raw.trim())
                    .map_err(|error| validation_failure(format!("invalid amount `{raw}`: {error}")))
            })
            .transpose()?;

        Ok(NewApprovalRequest {
            title: self.title.clone(),
            request_type,
            description: self.description.clone(),
            amount,
            priority,
        })
    }
}

pub fn run(args: SubmitArgs) -> CommandResult {
    let draft = match args.draft() {
        Ok(draft) => draft,
        Err((error_class, message, exit_code)) => {
            return CommandResult::failure("submit", error_class, message, exit_code)
        }
    };
    let applicant = args.actor.identity();

    with_service("submit", |service| async move {
        let request =
            service.submit(draft, &applicant).await.map_err(|error| application_failure(&error))?;
        let message = format!(
            "submitted {} request `{}` awaiting {}",
            request.request_type.as_str(),
            request.id,
            request.current().map(|step| step.approver.as_str()).unwrap_or("nobody")
        );
        Ok((message, Some(to_data(&request)?)))
    })
}
