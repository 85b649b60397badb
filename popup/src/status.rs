// Turns bridge responses into the status lines the popup shows.

use greenpoints_bridge::Response;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub message: String,
    pub is_error: bool,
}

impl Status {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            is_error: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            is_error: true,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.is_error { "❌" } else { "✅" };
        write!(f, "{} {}", mark, self.message)
    }
}

pub const UNREGISTERED_HINT: &str =
    "No CoinStore found for this student. Run \"register\" with that wallet, then award again.";

/// Positive whole number of points.
pub fn parse_amount(input: &str) -> Result<u64, Status> {
    match input.trim().parse::<u64>() {
        Ok(amount) if amount > 0 => Ok(amount),
        _ => Err(Status::error("Please enter a valid amount")),
    }
}

/// First 10 characters of a hash, e.g. `0x12345678...`
pub fn short_hash(hash: &str) -> String {
    let prefix: String = hash.chars().take(10).collect();
    format!("{}...", prefix)
}

fn error_or(resp: &Response, fallback: &str) -> Status {
    Status::error(resp.error.clone().unwrap_or_else(|| fallback.to_string()))
}

pub fn connect_status(resp: &Response) -> Vec<Status> {
    if !resp.success {
        return vec![
            error_or(resp, "Failed to connect wallet"),
            Status::error("Connection Failed"),
        ];
    }

    let network = resp
        .message
        .as_deref()
        .and_then(|m| m.split(' ').next_back())
        .filter(|n| !n.is_empty())
        .unwrap_or("network");

    let wallet = match resp.account.as_deref() {
        Some(account) if !account.is_empty() => {
            let prefix: String = account.chars().take(6).collect();
            format!("Connected: {}... on {}", prefix, network)
        }
        _ => format!("Connected on {}", network),
    };

    vec![
        Status::info(format!("Successfully connected to {}", network)),
        Status::info(wallet),
    ]
}

pub fn balance_status(resp: &Response) -> Vec<Status> {
    if !resp.success {
        return vec![
            Status::error("Balance: --"),
            error_or(resp, "Failed to get balance"),
        ];
    }

    let mut out = vec![Status::info(format!(
        "Balance: {} GPNT",
        resp.balance.unwrap_or_default()
    ))];
    if resp.has_store == Some(false) {
        out.push(Status::error(UNREGISTERED_HINT));
    }
    out
}

pub fn registration_status(registered: bool) -> Status {
    if registered {
        Status::info("Registered for GreenPoints")
    } else {
        Status::info("Not registered for GreenPoints. Run \"register\" with this wallet.")
    }
}

/// `done` is the success sentence, e.g. "Successfully awarded 5 points!".
pub fn action_status(resp: &Response, done: &str, fallback: &str) -> Status {
    if !resp.success {
        return error_or(resp, fallback);
    }
    match resp.hash.as_deref() {
        Some(hash) => Status::info(format!("{} Tx: {}", done, short_hash(hash))),
        None => Status::info(done),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("25"), Ok(25));
        assert_eq!(parse_amount(" 7 "), Ok(7));
        assert!(parse_amount("0").is_err());
        assert!(parse_amount("-3").is_err());
        assert!(parse_amount("ten").is_err());
    }

    #[test]
    fn test_action_status_shortens_hash() {
        let status = action_status(
            &Response::confirmed("0x1234567890abcdef"),
            "Successfully awarded 5 points!",
            "Failed to award points",
        );
        assert_eq!(
            status,
            Status::info("Successfully awarded 5 points! Tx: 0x12345678...")
        );

        let failed = action_status(&Response::default(), "ok", "Failed to award points");
        assert_eq!(failed, Status::error("Failed to award points"));
    }

    #[test]
    fn test_balance_status_hint_only_without_store() {
        let with_store = Response {
            balance: Some(5.0),
            has_store: Some(true),
            ..Response::ok()
        };
        assert_eq!(balance_status(&with_store), vec![Status::info("Balance: 5 GPNT")]);

        let from_view = Response {
            balance: Some(1.5),
            ..Response::ok()
        };
        assert_eq!(balance_status(&from_view).len(), 1);

        let unregistered = Response {
            balance: Some(0.0),
            has_store: Some(false),
            ..Response::ok()
        };
        let lines = balance_status(&unregistered);
        assert_eq!(lines[1], Status::error(UNREGISTERED_HINT));
    }

    #[test]
    fn test_connect_status() {
        let lines = connect_status(&Response::connected("0xabcdef0123", "Devnet"));
        assert_eq!(lines[0], Status::info("Successfully connected to Devnet"));
        assert_eq!(lines[1], Status::info("Connected: 0xabcd... on Devnet"));

        let rejected = connect_status(&Response::failure("Connection rejected by user."));
        assert_eq!(rejected[0], Status::error("Connection rejected by user."));
    }

    #[test]
    fn test_registration_status_is_informational() {
        assert_eq!(
            registration_status(true),
            Status::info("Registered for GreenPoints")
        );
        let missing = registration_status(false);
        assert!(!missing.is_error);
        assert!(missing.message.contains("register"));
    }

    #[test]
    fn test_display_marks_errors() {
        assert_eq!(Status::error("x").to_string(), "❌ x");
        assert_eq!(Status::info("y").to_string(), "✅ y");
    }
}
