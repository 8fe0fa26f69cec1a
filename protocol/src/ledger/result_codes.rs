//! Human-readable rendering of ledger result codes.
//!
//! A rejected transaction comes back as a transaction-level code plus one
//! code per operation. Callers get both the raw codes (for machines) and a
//! composite sentence (for people):
//!
//! ```text
//! Transaction: Transaction failed. Operation 1: Destination has no trustline
//! ```

use super::types::ResultCodes;

/// Describe a single code. Unknown codes pass through verbatim.
pub fn describe_code(code: &str) -> &str {
    match code {
        "tx_failed" => "Transaction failed",
        "tx_insufficient_fee" => "Insufficient transaction fee",
        "tx_too_early" => "Transaction submitted too early",
        "tx_too_late" => "Transaction expired",
        "tx_missing_operation" => "Transaction missing operations",
        "tx_bad_auth" => "Transaction authentication failed",
        "tx_bad_auth_extra" => "Transaction has extra signatures",
        "op_underfunded" => "Account has insufficient balance",
        "op_low_reserve" => "Account minimum reserve not met",
        "op_line_full" => "Trustline limit reached",
        "op_no_trust" => "Destination has no trustline",
        "op_not_authorized" => "Operation not authorized",
        "op_no_issuer" => "Issuer account does not exist",
        "op_success" => "Operation succeeded",
        other => other,
    }
}

/// Composite message for a full set of result codes.
pub fn describe(codes: &ResultCodes) -> String {
    let mut parts = Vec::with_capacity(1 + codes.operations.len());
    if !codes.transaction.is_empty() {
        parts.push(format!("Transaction: {}", describe_code(&codes.transaction)));
    }
    for (i, op) in codes.operations.iter().enumerate() {
        parts.push(format!("Operation {}: {}", i + 1, describe_code(op)));
    }
    if parts.is_empty() {
        "Transaction failed on the ledger".to_string()
    } else {
        parts.join(". ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_composite_message() {
        let codes = ResultCodes::with_operations(
            "tx_failed",
            vec!["op_success".into(), "op_no_trust".into()],
        );
        assert_eq!(
            describe(&codes),
            "Transaction: Transaction failed. Operation 1: Operation succeeded. \
             Operation 2: Destination has no trustline"
        );
    }

    #[test]
    fn test_unknown_codes_pass_through() {
        assert_eq!(describe_code("tx_bad_seq"), "tx_bad_seq");
        assert_eq!(
            describe(&ResultCodes::tx("tx_bad_seq")),
            "Transaction: tx_bad_seq"
        );
    }

    #[test]
    fn test_empty_codes() {
        assert_eq!(
            describe(&ResultCodes::default()),
            "Transaction failed on the ledger"
        );
    }
}
