//! Savings account operations

use super::{backend_date, localized, Args, Operation, ParamDefault, ParamKind, ParamSpec};
use crate::gateway::BackendCall;
use crate::models::Domain;
use crate::Result;
use chrono::NaiveDate;
use serde_json::{json, Value};

const DEFAULT_PRODUCT_ID: i64 = 1;
const DEFAULT_CHARGE_ID: i64 = 1;
const PAYMENT_TYPE_DEPOSIT: i64 = 1;
const PAYMENT_TYPE_WITHDRAWAL: i64 = 2;
const MONTH_DAY_FORMAT: &str = "dd MMMM";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavingsOperation {
    GetAccount,
    GetTransactions,
    Create,
    ApproveAndActivate,
    Close,
    Deposit,
    Withdraw,
    ApplyCharge,
    PostInterest,
}

impl SavingsOperation {
    pub const ALL: [SavingsOperation; 9] = [
        SavingsOperation::GetAccount,
        SavingsOperation::GetTransactions,
        SavingsOperation::Create,
        SavingsOperation::ApproveAndActivate,
        SavingsOperation::Close,
        SavingsOperation::Deposit,
        SavingsOperation::Withdraw,
        SavingsOperation::ApplyCharge,
        SavingsOperation::PostInterest,
    ];
}

const ACCOUNT_ID: ParamSpec =
    ParamSpec::required("account_id", ParamKind::Integer, "Numeric savings account ID");

const ACCOUNT_PARAMS: &[ParamSpec] = &[ACCOUNT_ID];
const CREATE_PARAMS: &[ParamSpec] = &[
    ParamSpec::required("client_id", ParamKind::Integer, "Account holder's client ID"),
    ParamSpec::defaulted(
        "product_id",
        ParamKind::Integer,
        "Savings product ID",
        ParamDefault::Integer(DEFAULT_PRODUCT_ID),
    ),
];
const AMOUNT_PARAMS: &[ParamSpec] = &[
    ACCOUNT_ID,
    ParamSpec::required("amount", ParamKind::Number, "Transaction amount"),
];
const CHARGE_PARAMS: &[ParamSpec] = &[
    ACCOUNT_ID,
    ParamSpec::required("amount", ParamKind::Number, "Charge amount"),
    ParamSpec::defaulted(
        "charge_id",
        ParamKind::Integer,
        "Charge definition ID",
        ParamDefault::Integer(DEFAULT_CHARGE_ID),
    ),
];

impl Operation for SavingsOperation {
    fn name(&self) -> &'static str {
        match self {
            SavingsOperation::GetAccount => "get_savings_account",
            SavingsOperation::GetTransactions => "get_savings_transactions",
            SavingsOperation::Create => "create_savings_account",
            SavingsOperation::ApproveAndActivate => "approve_and_activate_savings",
            SavingsOperation::Close => "close_savings_account",
            SavingsOperation::Deposit => "deposit_savings",
            SavingsOperation::Withdraw => "withdraw_savings",
            SavingsOperation::ApplyCharge => "apply_savings_charge",
            SavingsOperation::PostInterest => "calculate_and_post_interest",
        }
    }

    fn domain(&self) -> Domain {
        Domain::Savings
    }

    fn description(&self) -> &'static str {
        match self {
            SavingsOperation::GetAccount => {
                "Get a savings account's status and current balance."
            }
            SavingsOperation::GetTransactions => {
                "List the deposits, withdrawals and charges posted to a savings account."
            }
            SavingsOperation::Create => "Open a savings account application for a client.",
            SavingsOperation::ApproveAndActivate => {
                "Approve a savings application and activate it today. Activation only happens if approval succeeds."
            }
            SavingsOperation::Close => "Close a savings account with a zero balance.",
            SavingsOperation::Deposit => "Deposit cash into a savings account.",
            SavingsOperation::Withdraw => "Withdraw money from a savings account.",
            SavingsOperation::ApplyCharge => "Add a fee to a savings account, due today.",
            SavingsOperation::PostInterest => {
                "Calculate accrued interest on a savings account and post it."
            }
        }
    }

    fn parameters(&self) -> &'static [ParamSpec] {
        match self {
            SavingsOperation::Create => CREATE_PARAMS,
            SavingsOperation::Deposit | SavingsOperation::Withdraw => AMOUNT_PARAMS,
            SavingsOperation::ApplyCharge => CHARGE_PARAMS,
            _ => ACCOUNT_PARAMS,
        }
    }

    fn backend_calls(&self, args: &Args, today: NaiveDate) -> Result<Vec<BackendCall>> {
        let date = backend_date(today);

        let account = || -> Result<String> {
            Ok(format!("savingsaccounts/{}", args.int("account_id")?))
        };
        let transaction = |command: &str, payment_type: i64| -> Result<BackendCall> {
            Ok(BackendCall::post(
                format!("{}/transactions", account()?),
                localized(json!({
                    "transactionDate": date,
                    "transactionAmount": args.number("amount")?,
                    "paymentTypeId": payment_type,
                })),
            )
            .command(command))
        };

        let calls = match self {
            SavingsOperation::GetAccount => vec![BackendCall::get(account()?)],

            SavingsOperation::GetTransactions => {
                vec![BackendCall::get(account()?).with_query("associations", "transactions")]
            }

            SavingsOperation::Create => vec![BackendCall::post(
                "savingsaccounts",
                localized(json!({
                    "clientId": args.int("client_id")?,
                    "productId": args.int("product_id")?,
                    "submittedOnDate": date,
                })),
            )],

            SavingsOperation::ApproveAndActivate => vec![
                BackendCall::post(account()?, localized(json!({ "approvedOnDate": date })))
                    .command("approve"),
                BackendCall::post(account()?, localized(json!({ "activatedOnDate": date })))
                    .command("activate"),
            ],

            SavingsOperation::Close => vec![BackendCall::post(
                account()?,
                localized(json!({ "closedOnDate": date })),
            )
            .command("close")],

            SavingsOperation::Deposit => vec![transaction("deposit", PAYMENT_TYPE_DEPOSIT)?],

            SavingsOperation::Withdraw => vec![transaction("withdrawal", PAYMENT_TYPE_WITHDRAWAL)?],

            SavingsOperation::ApplyCharge => {
                let mut body = localized(json!({
                    "chargeId": args.int("charge_id")?,
                    "amount": args.number("amount")?,
                    "dueDate": date,
                    "feeOnMonthDay": today.format("%d %B").to_string(),
                }));
                body["monthDayFormat"] = json!(MONTH_DAY_FORMAT);
                vec![BackendCall::post(format!("{}/charges", account()?), body)]
            }

            SavingsOperation::PostInterest => {
                vec![BackendCall::post(account()?, json!({})).command("postInterest")]
            }
        };

        Ok(calls)
    }

    fn shape_response(&self, response: Value) -> Value {
        match self {
            SavingsOperation::GetTransactions => response
                .get("transactions")
                .cloned()
                .unwrap_or_else(|| json!([])),
            _ => response,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::OperationContext;
    use crate::gateway::StubBackend;
    use crate::models::{FailureKind, OperationOutput};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
    }

    #[tokio::test]
    async fn test_deposit_and_withdraw_payment_types() {
        let backend = StubBackend::new();
        let ctx = OperationContext::with_date(&backend, today());

        SavingsOperation::Deposit
            .execute(&json!({"account_id": 3, "amount": 200}), &ctx)
            .await
            .unwrap();
        SavingsOperation::Withdraw
            .execute(&json!({"account_id": 3, "amount": "50"}), &ctx)
            .await
            .unwrap();

        let calls = backend.calls();
        assert_eq!(calls[0].path, "savingsaccounts/3/transactions");
        assert_eq!(calls[0].query_value("command"), Some("deposit"));
        assert_eq!(calls[0].body.as_ref().unwrap()["paymentTypeId"], 1);
        assert_eq!(calls[1].query_value("command"), Some("withdrawal"));
        let withdrawal = calls[1].body.as_ref().unwrap();
        assert_eq!(withdrawal["paymentTypeId"], 2);
        assert_eq!(withdrawal["transactionAmount"], 50.0);
        assert_eq!(withdrawal["transactionDate"], "16 October 2026");
        assert_eq!(withdrawal["locale"], "en");
    }

    #[tokio::test]
    async fn test_insufficient_balance_is_error_value() {
        let backend = StubBackend::new().respond(
            "POST",
            "savingsaccounts/3/transactions",
            OperationOutput::failure(
                FailureKind::Rejected { status: 400 },
                "Validation Error: Insufficient balance",
            ),
        );
        let ctx = OperationContext::with_date(&backend, today());

        let output = SavingsOperation::Withdraw
            .execute(&json!({"account_id": 3, "amount": 1000000}), &ctx)
            .await
            .unwrap();

        assert_eq!(
            output.to_value(),
            json!({"error": "Validation Error: Insufficient balance"})
        );
    }

    #[tokio::test]
    async fn test_approve_then_activate() {
        let backend = StubBackend::new();
        let ctx = OperationContext::with_date(&backend, today());
        SavingsOperation::ApproveAndActivate
            .execute(&json!({"account_id": 9}), &ctx)
            .await
            .unwrap();

        let calls = backend.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].query_value("command"), Some("approve"));
        assert_eq!(calls[0].body.as_ref().unwrap()["approvedOnDate"], "16 October 2026");
        assert_eq!(calls[1].query_value("command"), Some("activate"));
        assert_eq!(calls[1].body.as_ref().unwrap()["activatedOnDate"], "16 October 2026");
    }

    #[tokio::test]
    async fn test_charge_carries_month_day() {
        let backend = StubBackend::new();
        let ctx = OperationContext::with_date(&backend, today());
        SavingsOperation::ApplyCharge
            .execute(&json!({"account_id": 9, "amount": 5}), &ctx)
            .await
            .unwrap();

        let calls = backend.calls();
        let body = calls[0].body.as_ref().unwrap();
        assert_eq!(calls[0].path, "savingsaccounts/9/charges");
        assert_eq!(body["feeOnMonthDay"], "16 October");
        assert_eq!(body["monthDayFormat"], "dd MMMM");
        assert_eq!(body["dueDate"], "16 October 2026");
    }

    #[tokio::test]
    async fn test_transactions_extracted_or_empty() {
        let backend = StubBackend::new().respond(
            "GET",
            "savingsaccounts/4",
            OperationOutput::Success(json!({"id": 4, "transactions": [{"id": 1, "amount": 200.0}]})),
        );
        let ctx = OperationContext::with_date(&backend, today());
        let output = SavingsOperation::GetTransactions
            .execute(&json!({"account_id": 4}), &ctx)
            .await
            .unwrap();
        assert_eq!(output, OperationOutput::Success(json!([{"id": 1, "amount": 200.0}])));

        let output = SavingsOperation::GetTransactions
            .execute(&json!({"account_id": 5}), &ctx)
            .await
            .unwrap();
        assert_eq!(output, OperationOutput::Success(json!([])));
    }

    #[tokio::test]
    async fn test_post_interest_sends_empty_body() {
        let backend = StubBackend::new();
        let ctx = OperationContext::with_date(&backend, today());
        SavingsOperation::PostInterest
            .execute(&json!({"account_id": 2}), &ctx)
            .await
            .unwrap();
        let calls = backend.calls();
        assert_eq!(calls[0].query_value("command"), Some("postInterest"));
        assert_eq!(calls[0].body, Some(json!({})));
    }
}
