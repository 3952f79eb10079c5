//! Template expansion for resource-group member names.
//!
//! Member values are literal templates over a fixed two-variable
//! namespace: `{root}` (the group's root name) and `{scratch}` (the
//! producing job's scratch directory). This is an explicit substitution
//! step, never a general-purpose evaluator.

use crate::error::{PlanError, PlanResult};

/// The fixed variable namespace available to group templates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateVars<'a> {
    /// The group's root name
    pub root: &'a str,
    /// The producing job's scratch directory
    pub scratch: &'a str,
}

impl<'a> TemplateVars<'a> {
    fn lookup(&self, name: &str) -> Option<&'a str> {
        match name {
            "root" => Some(self.root),
            "scratch" => Some(self.scratch),
            _ => None,
        }
    }
}

/// Expand `template` for group member `member` against `vars`.
///
/// # Errors
///
/// Fails with a descriptive configuration error on an unknown variable
/// or an unterminated `{`.
pub fn expand(member: &str, template: &str, vars: &TemplateVars<'_>) -> PlanResult<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        let literal = &rest[..open];
        if let Some(stray) = literal.find('}') {
            return Err(PlanError::Template {
                member: member.to_string(),
                reason: format!("stray '}}' at byte {stray} of '{rest}'"),
            });
        }
        out.push_str(literal);
        let tail = &rest[open + 1..];
        let close = tail.find('}').ok_or_else(|| PlanError::Template {
            member: member.to_string(),
            reason: format!("unterminated '{{' in template '{template}'"),
        })?;
        let name = &tail[..close];
        let value = vars.lookup(name).ok_or_else(|| PlanError::Template {
            member: member.to_string(),
            reason: format!("unknown variable '{{{name}}}'; only {{root}} and {{scratch}} are available"),
        })?;
        out.push_str(value);
        rest = &tail[close + 1..];
    }
    if let Some(stray) = rest.find('}') {
        return Err(PlanError::Template {
            member: member.to_string(),
            reason: format!("stray '}}' at byte {stray} of '{rest}'"),
        });
    }
    out.push_str(rest);
    Ok(out)
}
