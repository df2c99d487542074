use clap::Args;

use crate::commands::{
    application_failure, to_data, validation_failure, with_service, CommandError, CommandResult,
};
use bushidage_core::approvals::ApprovalFilter;
use bushidage_core::domain::approval::{ApprovalStatus, RequestType};

#[derive(Debug, Clone, Default, Args)]
pub struct ListArgs {
    #[arg(long, help = "pending|approved|rejected")]
    pub status: Option<String>,
    #[arg(long = "type", help = "leave|expense|purchase|hiring")]
    pub request_type: Option<String>,
    #[arg(long, help = "Only requests submitted by this applicant id")]
    pub applicant: Option<String>,
    #[arg(long, help = "Only pending requests waiting on this approver name or role")]
    pub awaiting: Option<String>,
}

impl ListArgs {
    fn filter(&self) -> Result<ApprovalFilter, CommandError> {
        let status = self
            .status
            .as_deref()
            .map(|raw| {
                ApprovalStatus::parse(raw).ok_or_else(|| {
                    validation_failure(format!(
                        "unsupported status `{raw}` (expected pending|approved|rejected)"
                    ))
                })
            })
            .transpose()?;
        let request_type = self
            .request_type
            .as_deref()
            .map(|raw| {
                raw.parse::<RequestType>().map_err(|error| validation_failure(error.to_string()))
            })
            .transpose()?;

        Ok(ApprovalFilter {
            status,
            request_type,
            applicant_id: self.applicant.clone(),
            awaiting: self.awaiting.clone(),
        })
    }
}

pub fn run(args: ListArgs) -> CommandResult {
    let filter = match args.filter() {
        Ok(filter) => filter,
        Err((error_class, message, exit_code)) => {
            return CommandResult::failure("list", error_class, message, exit_code)
        }
    };

    with_service("list", |service| async move {
        let requests = service.list(&filter).await.map_err(|error| application_failure(&error))?;
        Ok((format!("{} request(s)", requests.len()), Some(to_data(&requests)?)))
    })
}
