//! Client and group lifecycle operations

use super::{backend_date, localized, Args, Operation, ParamDefault, ParamKind, ParamSpec};
use crate::gateway::BackendCall;
use crate::models::Domain;
use crate::Result;
use chrono::NaiveDate;
use serde_json::json;

const DEFAULT_OFFICE_ID: i64 = 1;
/// Fineract's stock "Other" closure reason.
const DEFAULT_CLOSURE_REASON_ID: i64 = 17;
const LEGAL_FORM_PERSON: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientOperation {
    // ===== Lookups =====
    SearchByName,
    GetDetails,
    GetAccounts,
    GetGroup,

    // ===== Lifecycle =====
    Create,
    Activate,
    UpdateMobile,
    Close,
    CreateGroup,
}

impl ClientOperation {
    /// Registration order.
    pub const ALL: [ClientOperation; 9] = [
        ClientOperation::SearchByName,
        ClientOperation::GetDetails,
        ClientOperation::GetAccounts,
        ClientOperation::Create,
        ClientOperation::Activate,
        ClientOperation::UpdateMobile,
        ClientOperation::Close,
        ClientOperation::CreateGroup,
        ClientOperation::GetGroup,
    ];
}

const CLIENT_ID: ParamSpec = ParamSpec::required("client_id", ParamKind::Integer, "Numeric client ID");

const SEARCH_PARAMS: &[ParamSpec] = &[ParamSpec::required(
    "name_query",
    ParamKind::String,
    "Full or partial client name",
)];
const CLIENT_ID_PARAMS: &[ParamSpec] = &[CLIENT_ID];
const CREATE_PARAMS: &[ParamSpec] = &[
    ParamSpec::required("firstname", ParamKind::String, "Client first name"),
    ParamSpec::required("lastname", ParamKind::String, "Client last name"),
    ParamSpec::optional("mobile_no", ParamKind::String, "Mobile phone number"),
    ParamSpec::defaulted(
        "office_id",
        ParamKind::Integer,
        "Office the client is registered at",
        ParamDefault::Integer(DEFAULT_OFFICE_ID),
    ),
    ParamSpec::defaulted(
        "is_active",
        ParamKind::Boolean,
        "Activate the client immediately",
        ParamDefault::Boolean(true),
    ),
];
const MOBILE_PARAMS: &[ParamSpec] = &[
    CLIENT_ID,
    ParamSpec::required("new_mobile_no", ParamKind::String, "New mobile phone number"),
];
const CLOSE_PARAMS: &[ParamSpec] = &[
    CLIENT_ID,
    ParamSpec::defaulted(
        "closure_reason_id",
        ParamKind::Integer,
        "Code value ID of the closure reason",
        ParamDefault::Integer(DEFAULT_CLOSURE_REASON_ID),
    ),
];
const GROUP_CREATE_PARAMS: &[ParamSpec] = &[
    ParamSpec::required("name", ParamKind::String, "Group name"),
    ParamSpec::defaulted(
        "office_id",
        ParamKind::Integer,
        "Office the group belongs to",
        ParamDefault::Integer(DEFAULT_OFFICE_ID),
    ),
    ParamSpec::optional(
        "client_members",
        ParamKind::IntegerList,
        "Client IDs to enrol as members",
    ),
];
const GROUP_ID_PARAMS: &[ParamSpec] = &[ParamSpec::required(
    "group_id",
    ParamKind::Integer,
    "Numeric group ID",
)];

impl Operation for ClientOperation {
    fn name(&self) -> &'static str {
        match self {
            ClientOperation::SearchByName => "search_clients_by_name",
            ClientOperation::GetDetails => "get_client_details",
            ClientOperation::GetAccounts => "get_client_accounts",
            ClientOperation::Create => "create_client",
            ClientOperation::Activate => "activate_client",
            ClientOperation::UpdateMobile => "update_client_mobile",
            ClientOperation::Close => "close_client",
            ClientOperation::CreateGroup => "create_group",
            ClientOperation::GetGroup => "get_group_details",
        }
    }

    fn domain(&self) -> Domain {
        Domain::Clients
    }

    fn description(&self) -> &'static str {
        match self {
            ClientOperation::SearchByName => {
                "Search clients by full or partial name. Use this to find a client ID before any other client action."
            }
            ClientOperation::GetDetails => {
                "Get a client's profile: name, status, office, mobile number and activation date."
            }
            ClientOperation::GetAccounts => {
                "List all loan and savings accounts held by a client."
            }
            ClientOperation::Create => {
                "Register a new client. Active immediately unless is_active is false."
            }
            ClientOperation::Activate => "Activate a pending client as of today.",
            ClientOperation::UpdateMobile => "Change the mobile phone number on a client record.",
            ClientOperation::Close => {
                "Close a client record. Fails while the client still has open accounts."
            }
            ClientOperation::CreateGroup => {
                "Create an active group, optionally enrolling existing clients as members."
            }
            ClientOperation::GetGroup => "Get a group and its client members.",
        }
    }

    fn parameters(&self) -> &'static [ParamSpec] {
        match self {
            ClientOperation::SearchByName => SEARCH_PARAMS,
            ClientOperation::GetDetails
            | ClientOperation::GetAccounts
            | ClientOperation::Activate => CLIENT_ID_PARAMS,
            ClientOperation::Create => CREATE_PARAMS,
            ClientOperation::UpdateMobile => MOBILE_PARAMS,
            ClientOperation::Close => CLOSE_PARAMS,
            ClientOperation::CreateGroup => GROUP_CREATE_PARAMS,
            ClientOperation::GetGroup => GROUP_ID_PARAMS,
        }
    }

    fn backend_calls(&self, args: &Args, today: NaiveDate) -> Result<Vec<BackendCall>> {
        let date = backend_date(today);

        let call = match self {
            ClientOperation::SearchByName => BackendCall::get("search")
                .with_query("query", args.text("name_query")?)
                .with_query("resource", "clients")
                .with_query("exactMatch", "false"),

            ClientOperation::GetDetails => {
                BackendCall::get(format!("clients/{}", args.int("client_id")?))
            }

            ClientOperation::GetAccounts => {
                BackendCall::get(format!("clients/{}/accounts", args.int("client_id")?))
            }

            ClientOperation::Create => {
                let mut body = json!({
                    "officeId": args.int("office_id")?,
                    "firstname": args.text("firstname")?,
                    "lastname": args.text("lastname")?,
                    "legalFormId": LEGAL_FORM_PERSON,
                });
                if args.flag("is_active")? {
                    body["active"] = json!(true);
                    body["activationDate"] = json!(date);
                } else {
                    body["active"] = json!(false);
                }
                if let Some(mobile) = args.opt_text("mobile_no").filter(|m| !m.trim().is_empty()) {
                    body["mobileNo"] = json!(mobile);
                }
                BackendCall::post("clients", localized(body))
            }

            ClientOperation::Activate => BackendCall::post(
                format!("clients/{}", args.int("client_id")?),
                localized(json!({ "activationDate": date })),
            )
            .command("activate"),

            ClientOperation::UpdateMobile => BackendCall::put(
                format!("clients/{}", args.int("client_id")?),
                json!({ "mobileNo": args.text("new_mobile_no")? }),
            ),

            ClientOperation::Close => BackendCall::post(
                format!("clients/{}", args.int("client_id")?),
                localized(json!({
                    "closureDate": date,
                    "closureReasonId": args.int("closure_reason_id")?,
                })),
            )
            .command("close"),

            ClientOperation::CreateGroup => {
                let mut body = json!({
                    "officeId": args.int("office_id")?,
                    "name": args.text("name")?,
                    "active": true,
                    "activationDate": date,
                });
                if let Some(members) = args.int_list("client_members") {
                    body["clientMembers"] = json!(members);
                }
                BackendCall::post("groups", localized(body))
            }

            ClientOperation::GetGroup => {
                BackendCall::get(format!("groups/{}", args.int("group_id")?))
                    .with_query("associations", "clientMembers")
            }
        };

        Ok(vec![call])
    }
}
