use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRequest {
    pub name: String,
    pub company_web: Option<String>,
    pub email: String,
    pub phone: Option<String>,
    pub topic: Option<String>,
    pub description: Option<String>,
}

impl ContactRequest {
    /// Trims every field and rejects requests without a name or a plausible email.
    pub fn normalized(self) -> Result<Self, DomainError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(DomainError::InvariantViolation("contact name is required".to_string()));
        }

        let email = self.email.trim().to_string();
        if !is_plausible_email(&email) {
            return Err(DomainError::InvariantViolation(format!(
                "`{email}` is not a valid email address"
            )));
        }

        Ok(Self {
            name,
            company_web: trim_optional(self.company_web),
            email,
            phone: trim_optional(self.phone),
            topic: trim_optional(self.topic),
            description: trim_optional(self.description),
        })
    }
}

fn trim_optional(value: Option<String>) -> Option<String> {
    value.map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn is_plausible_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };

    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain.split('.').count() >= 2
        && domain.split('.').all(|label| !label.is_empty())
}
