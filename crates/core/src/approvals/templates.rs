use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::approval::RequestType;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateStep {
    pub approver: String,
    pub role: String,
}

impl TemplateStep {
    pub fn new(approver: impl Into<String>, role: impl Into<String>) -> Self {
        Self { approver: approver.into(), role: role.into() }
    }
}

/// Ordered approver slots that seed a new request of one type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowTemplate {
    pub request_type: RequestType,
    pub steps: Vec<TemplateStep>,
}

impl FlowTemplate {
    pub fn builtin(request_type: RequestType) -> Self {
        let steps = match request_type {
            RequestType::Leave => vec![
                TemplateStep::new("Department Manager", "department_manager"),
                TemplateStep::new("HR Director", "hr_director"),
            ],
            RequestType::Expense => vec![
                TemplateStep::new("Department Manager", "department_manager"),
                TemplateStep::new("Finance Manager", "finance_manager"),
                TemplateStep::new("General Manager", "general_manager"),
            ],
            RequestType::Purchase => vec![
                TemplateStep::new("Department Manager", "department_manager"),
                TemplateStep::new("Procurement Manager", "procurement_manager"),
                TemplateStep::new("General Manager", "general_manager"),
            ],
            RequestType::Hiring => vec![
                TemplateStep::new("Department Manager", "department_manager"),
                TemplateStep::new("HR Director", "hr_director"),
                TemplateStep::new("General Manager", "general_manager"),
            ],
        };
        Self { request_type, steps }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlowTemplates {
    templates: HashMap<RequestType, FlowTemplate>,
}

impl Default for FlowTemplates {
    fn default() -> Self {
        let templates = RequestType::ALL
            .into_iter()
            .map(|request_type| (request_type, FlowTemplate::builtin(request_type)))
            .collect();
        Self { templates }
    }
}

impl FlowTemplates {
    /// Builtin templates with the given per-type overrides applied on top.
    pub fn with_overrides(overrides: impl IntoIterator<Item = FlowTemplate>) -> Self {
        let mut registry = Self::default();
        for template in overrides {
            registry.templates.insert(template.request_type, template);
        }
        registry
    }

    pub fn template_for(&self, request_type: RequestType) -> FlowTemplate {
        self.templates
            .get(&request_type)
            .cloned()
            .unwrap_or_else(|| FlowTemplate::builtin(request_type))
    }

    pub fn roles(&self) -> Vec<String> {
        let mut roles: Vec<String> = self
            .templates
            .values()
            .flat_map(|template| template.steps.iter().map(|step| step.role.clone()))
            .collect();
        roles.sort();
        roles.dedup();
        roles
    }
}
