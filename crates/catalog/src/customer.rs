use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pos_core::{CustomerId, DomainError, DomainResult};

/// Contact information for a customer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl ContactInfo {
    fn validate(&self) -> DomainResult<()> {
        if let Some(email) = &self.email {
            if !email.contains('@') {
                return Err(DomainError::validation("email must contain '@'"));
            }
        }
        Ok(())
    }
}

/// Customer record. Orders reference it; they never own it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub name: String,
    pub contact: ContactInfo,
    pub created_at: DateTime<Utc>,
}

impl Customer {
    pub fn apply_update(&mut self, cmd: &UpdateCustomer) -> DomainResult<()> {
        cmd.validate()?;
        self.name = cmd.name.trim().to_string();
        self.contact = cmd.contact.clone();
        Ok(())
    }
}

/// Command: CreateCustomer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateCustomer {
    pub name: String,
    #[serde(default)]
    pub contact: ContactInfo,
}

impl CreateCustomer {
    pub fn validate(&self) -> DomainResult<()> {
        validate_name(&self.name)?;
        self.contact.validate()
    }

    pub fn into_customer(self, id: CustomerId, created_at: DateTime<Utc>) -> DomainResult<Customer> {
        self.validate()?;
        Ok(Customer {
            id,
            name: self.name.trim().to_string(),
            contact: self.contact,
            created_at,
        })
    }
}

/// Command: UpdateCustomer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCustomer {
    pub name: String,
    #[serde(default)]
    pub contact: ContactInfo,
}

impl UpdateCustomer {
    pub fn validate(&self) -> DomainResult<()> {
        validate_name(&self.name)?;
        self.contact.validate()
    }
}

fn validate_name(name: &str) -> DomainResult<()> {
    if name.trim().is_empty() {
        return Err(DomainError::validation("name cannot be empty"));
    }
    Ok(())
}
