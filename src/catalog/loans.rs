//! Loan lifecycle operations

use super::{backend_date, localized, Args, Operation, ParamDefault, ParamKind, ParamSpec};
use crate::gateway::BackendCall;
use crate::models::Domain;
use crate::Result;
use chrono::NaiveDate;
use serde_json::{json, Value};

const DEFAULT_PRODUCT_ID: i64 = 1;
const DEFAULT_CHARGE_ID: i64 = 1;
const PAYMENT_TYPE_CASH: i64 = 1;
/// Fineract frequency code for months.
const FREQUENCY_MONTHS: i64 = 2;
const INTEREST_RATE_PER_PERIOD: f64 = 5.0;
const APPROVAL_NOTE: &str = "AI Approved";
const REJECTION_NOTE: &str = "Rejected via AI Agent due to risk profile";
const WAIVER_NOTE: &str = "AI Authorized Waiver";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoanOperation {
    GetDetails,
    GetRepaymentSchedule,
    Create,
    ApproveAndDisburse,
    Reject,
    MakeRepayment,
    ApplyLateFee,
    WaiveInterest,
}

impl LoanOperation {
    pub const ALL: [LoanOperation; 8] = [
        LoanOperation::GetDetails,
        LoanOperation::GetRepaymentSchedule,
        LoanOperation::Create,
        LoanOperation::ApproveAndDisburse,
        LoanOperation::Reject,
        LoanOperation::MakeRepayment,
        LoanOperation::ApplyLateFee,
        LoanOperation::WaiveInterest,
    ];
}

const LOAN_ID: ParamSpec = ParamSpec::required("loan_id", ParamKind::Integer, "Numeric loan ID");

const LOAN_ID_PARAMS: &[ParamSpec] = &[LOAN_ID];
const CREATE_PARAMS: &[ParamSpec] = &[
    ParamSpec::required("client_id", ParamKind::Integer, "Borrowing client ID"),
    ParamSpec::required("principal", ParamKind::Number, "Principal amount"),
    ParamSpec::required("months", ParamKind::Integer, "Term in months, one installment per month"),
    ParamSpec::defaulted(
        "product_id",
        ParamKind::Integer,
        "Loan product ID",
        ParamDefault::Integer(DEFAULT_PRODUCT_ID),
    ),
];
const DISBURSE_PARAMS: &[ParamSpec] = &[
    LOAN_ID,
    ParamSpec::optional(
        "amount",
        ParamKind::Number,
        "Amount to disburse; defaults to the approved principal",
    ),
];
const REJECT_PARAMS: &[ParamSpec] = &[
    LOAN_ID,
    ParamSpec::defaulted(
        "note",
        ParamKind::String,
        "Reason recorded on the application",
        ParamDefault::Text(REJECTION_NOTE),
    ),
];
const REPAYMENT_PARAMS: &[ParamSpec] = &[
    LOAN_ID,
    ParamSpec::required("amount", ParamKind::Number, "Repayment amount"),
];
const LATE_FEE_PARAMS: &[ParamSpec] = &[
    LOAN_ID,
    ParamSpec::required("fee_amount", ParamKind::Number, "Fee amount"),
    ParamSpec::defaulted(
        "charge_id",
        ParamKind::Integer,
        "Charge definition ID",
        ParamDefault::Integer(DEFAULT_CHARGE_ID),
    ),
];
const WAIVE_PARAMS: &[ParamSpec] = &[
    LOAN_ID,
    ParamSpec::required("amount", ParamKind::Number, "Interest amount to waive"),
    ParamSpec::defaulted(
        "note",
        ParamKind::String,
        "Justification for the waiver",
        ParamDefault::Text(WAIVER_NOTE),
    ),
];

impl Operation for LoanOperation {
    fn name(&self) -> &'static str {
        match self {
            LoanOperation::GetDetails => "get_loan_details",
            LoanOperation::GetRepaymentSchedule => "get_repayment_schedule",
            LoanOperation::Create => "create_loan",
            LoanOperation::ApproveAndDisburse => "approve_and_disburse_loan",
            LoanOperation::Reject => "reject_loan_application",
            LoanOperation::MakeRepayment => "make_loan_repayment",
            LoanOperation::ApplyLateFee => "apply_late_fee",
            LoanOperation::WaiveInterest => "waive_interest",
        }
    }

    fn domain(&self) -> Domain {
        Domain::Loans
    }

    fn description(&self) -> &'static str {
        match self {
            LoanOperation::GetDetails => {
                "Get a loan's status, principal, outstanding balance and arrears."
            }
            LoanOperation::GetRepaymentSchedule => {
                "Get the installment-by-installment repayment schedule of a loan."
            }
            LoanOperation::Create => {
                "Submit a new loan application with monthly equal installments."
            }
            LoanOperation::ApproveAndDisburse => {
                "Approve a submitted loan and disburse it today. Disbursement only happens if approval succeeds."
            }
            LoanOperation::Reject => "Reject a submitted loan application.",
            LoanOperation::MakeRepayment => "Record a cash repayment against a loan.",
            LoanOperation::ApplyLateFee => "Add a penalty charge to a loan, due today.",
            LoanOperation::WaiveInterest => "Waive part of the interest due on a loan.",
        }
    }

    fn parameters(&self) -> &'static [ParamSpec] {
        match self {
            LoanOperation::GetDetails | LoanOperation::GetRepaymentSchedule => LOAN_ID_PARAMS,
            LoanOperation::Create => CREATE_PARAMS,
            LoanOperation::ApproveAndDisburse => DISBURSE_PARAMS,
            LoanOperation::Reject => REJECT_PARAMS,
            LoanOperation::MakeRepayment => REPAYMENT_PARAMS,
            LoanOperation::ApplyLateFee => LATE_FEE_PARAMS,
            LoanOperation::WaiveInterest => WAIVE_PARAMS,
        }
    }

    fn backend_calls(&self, args: &Args, today: NaiveDate) -> Result<Vec<BackendCall>> {
        let date = backend_date(today);

        let loan = || -> Result<String> { Ok(format!("loans/{}", args.int("loan_id")?)) };

        let calls = match self {
            LoanOperation::GetDetails => vec![BackendCall::get(loan()?)],

            LoanOperation::GetRepaymentSchedule => {
                vec![BackendCall::get(loan()?).with_query("associations", "repaymentSchedule")]
            }

            LoanOperation::Create => {
                let months = args.int("months")?;
                let body = json!({
                    "clientId": args.int("client_id")?,
                    "productId": args.int("product_id")?,
                    "principal": args.number("principal")?.to_string(),
                    "loanTermFrequency": months,
                    "loanTermFrequencyType": FREQUENCY_MONTHS,
                    "numberOfRepayments": months,
                    "repaymentEvery": 1,
                    "repaymentFrequencyType": FREQUENCY_MONTHS,
                    "interestRatePerPeriod": INTEREST_RATE_PER_PERIOD,
                    "amortizationType": 1,
                    "interestType": 0,
                    "interestCalculationPeriodType": 1,
                    "transactionProcessingStrategyCode": "mifos-standard-strategy",
                    "expectedDisbursementDate": date,
                    "submittedOnDate": date,
                    "loanType": "individual",
                });
                vec![BackendCall::post("loans", localized(body))]
            }

            LoanOperation::ApproveAndDisburse => {
                let loan = loan()?;
                let approve = BackendCall::post(
                    loan.clone(),
                    localized(json!({ "approvedOnDate": date, "note": APPROVAL_NOTE })),
                )
                .command("approve");

                let mut disburse_body = json!({ "actualDisbursementDate": date });
                if let Some(amount) = args.opt_number("amount").filter(|a| *a != 0.0) {
                    disburse_body["transactionAmount"] = json!(amount);
                }
                let disburse = BackendCall::post(loan, localized(disburse_body)).command("disburse");

                vec![approve, disburse]
            }

            LoanOperation::Reject => vec![BackendCall::post(
                loan()?,
                localized(json!({ "rejectedOnDate": date, "note": args.text("note")? })),
            )
            .command("reject")],

            LoanOperation::MakeRepayment => vec![BackendCall::post(
                format!("{}/transactions", loan()?),
                localized(json!({
                    "transactionDate": date,
                    "transactionAmount": args.number("amount")?,
                    "paymentTypeId": PAYMENT_TYPE_CASH,
                })),
            )
            .command("repayment")],

            LoanOperation::ApplyLateFee => vec![BackendCall::post(
                format!("{}/charges", loan()?),
                localized(json!({
                    "chargeId": args.int("charge_id")?,
                    "amount": args.number("fee_amount")?,
                    "dueDate": date,
                })),
            )],

            LoanOperation::WaiveInterest => vec![BackendCall::post(
                format!("{}/transactions", loan()?),
                localized(json!({
                    "transactionDate": date,
                    "transactionAmount": args.number("amount")?,
                    "note": args.text("note")?,
                })),
            )
            .command("waiveinterest")],
        };

        Ok(calls)
    }

    fn shape_response(&self, response: Value) -> Value {
        match self {
            LoanOperation::GetRepaymentSchedule => response
                .get("repaymentSchedule")
                .cloned()
                .unwrap_or_else(|| json!({})),
            _ => response,
        }
    }
}
