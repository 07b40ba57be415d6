use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Card,
    EcoCash,
    Omari,
    InnBucks,
    SmileCash,
}

impl PaymentMethod {
    /// Card payments complete on a hosted page; everything else is a
    /// mobile wallet push to the payer's phone.
    pub fn is_redirect(self) -> bool {
        matches!(self, PaymentMethod::Card)
    }

    pub fn requires_phone(self) -> bool {
        matches!(
            self,
            PaymentMethod::EcoCash | PaymentMethod::Omari | PaymentMethod::SmileCash
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::EcoCash => "ecocash",
            PaymentMethod::Omari => "omari",
            PaymentMethod::InnBucks => "innbucks",
            PaymentMethod::SmileCash => "smilecash",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Cancelled,
    TimedOut,
}

impl PaymentStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::TimedOut => "timed_out",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub method: PaymentMethod,
    pub amount: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_currency() -> String {
    "USD".to_string()
}

/// What the backend hands back when a payment is started.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentInitiation {
    pub reference: String,
    #[serde(default)]
    pub redirect_url: Option<String>,
    #[serde(default)]
    pub auth_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentSession {
    pub id: Uuid,
    pub method: PaymentMethod,
    pub amount: f64,
    pub currency: String,
    pub reference: String,
    pub redirect_url: Option<String>,
    pub auth_code: Option<String>,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
