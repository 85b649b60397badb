// Messages exchanged between the popup, content and page contexts.
// Field names follow the JSON the page-side script has always spoken.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::BridgeError;

/// A UI intent. Closed set: adding a kind is a compile-checked change to
/// every `match` over it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum Request {
    #[serde(rename = "CONNECT_WALLET")]
    Connect,

    #[serde(rename = "GET_BALANCE")]
    GetBalance {
        #[serde(rename = "adminAddr")]
        admin: String,
        #[serde(rename = "studentAddr")]
        subject: String,
    },

    #[serde(rename = "AWARD_POINTS")]
    Award {
        #[serde(rename = "adminAddr")]
        admin: String,
        #[serde(rename = "studentAddr")]
        subject: String,
        amount: u64,
    },

    #[serde(rename = "REDEEM_POINTS")]
    Redeem {
        #[serde(rename = "adminAddr")]
        admin: String,
        #[serde(rename = "studentAddr")]
        subject: String,
        amount: u64,
    },

    #[serde(rename = "REGISTER_STUDENT")]
    Register {
        #[serde(rename = "adminAddr")]
        admin: String,
    },

    #[serde(rename = "SET_MERCHANT")]
    SetMerchant {
        #[serde(rename = "adminAddr")]
        admin: String,
        #[serde(rename = "merchantAddr")]
        merchant: String,
        approved: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Connect,
    GetBalance,
    Award,
    Redeem,
    Register,
    SetMerchant,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestKind::Connect => "CONNECT_WALLET",
            RequestKind::GetBalance => "GET_BALANCE",
            RequestKind::Award => "AWARD_POINTS",
            RequestKind::Redeem => "REDEEM_POINTS",
            RequestKind::Register => "REGISTER_STUDENT",
            RequestKind::SetMerchant => "SET_MERCHANT",
        };
        f.write_str(name)
    }
}

impl Request {
    pub fn kind(&self) -> RequestKind {
        match self {
            Request::Connect => RequestKind::Connect,
            Request::GetBalance { .. } => RequestKind::GetBalance,
            Request::Award { .. } => RequestKind::Award,
            Request::Redeem { .. } => RequestKind::Redeem,
            Request::Register { .. } => RequestKind::Register,
            Request::SetMerchant { .. } => RequestKind::SetMerchant,
        }
    }

    /// `(admin, subject)` of a balance read. Balance reads are the only
    /// requests that can be served without the page context.
    pub fn balance_target(&self) -> Option<(&str, &str)> {
        match self {
            Request::GetBalance { admin, subject } => Some((admin.as_str(), subject.as_str())),
            _ => None,
        }
    }
}

/// Result of one request. Produced exactly once per [`Request`].
///
/// Build it through the constructors: they keep `success` and `error`
/// consistent.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decimals: Option<u8>,
    /// `None` when the balance came from the view call and store presence is
    /// unknown. Always serialized, as `null` when unknown.
    #[serde(default)]
    pub has_store: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn from_error(err: &BridgeError) -> Self {
        Self {
            hash: err.hash().map(str::to_string),
            ..Self::failure(err.to_string())
        }
    }

    /// Successful, confirmed transaction.
    pub fn confirmed(hash: impl Into<String>) -> Self {
        Self {
            hash: Some(hash.into()),
            ..Self::ok()
        }
    }

    pub fn connected(account: impl Into<String>, network: &str) -> Self {
        Self {
            account: Some(account.into()),
            message: Some(format!("Connected to {}", network)),
            ..Self::ok()
        }
    }

    /// `success=true` carries no error; `success=false` always carries one.
    pub fn is_well_formed(&self) -> bool {
        self.success == self.error.is_none()
    }
}

impl From<BridgeError> for Response {
    fn from(err: BridgeError) -> Self {
        Response::from_error(&err)
    }
}

/// Cross-context post-message envelope.
///
/// `requestId` is echoed from request to response so a reply that arrives
/// after its relay gave up cannot be taken for the answer to a later one.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Envelope {
    ExtensionMessage {
        #[serde(default, rename = "requestId", skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
        data: Request,
    },
    PageResponse {
        #[serde(default, rename = "requestId", skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
        response: Response,
    },
}
